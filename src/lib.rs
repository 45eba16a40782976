pub mod codec;
pub mod config;
pub mod connection;
pub mod datatypes;
pub mod error;
pub mod gateway;
mod macros;
pub mod model;

// Re-export codec types for direct access
pub use codec::{CodecError, Decodable, Encodable, Frame, PduHeader, PduRegistry};
pub use error::{ErrorKind, GatewayError, GatewayResult};

/// Error returned by most functions.
///
/// When writing a real application, one might want to consider a specialized
/// error handling crate or defining an error type as an `enum` of causes.
/// However, for our example, using a boxed `std::error::Error` is sufficient.
///
/// For performance reasons, boxing is avoided in any hot path. For example, in
/// `parse`, a custom error `enum` is defined. This is because the error is hit
/// and handled during normal execution when a partial frame is received on a
/// socket. `std::error::Error` is implemented for `parse::Error` which allows
/// it to be converted to `Box<dyn std::error::Error>`.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// A specialized `Result` type for non-gateway-specific operations.
///
/// This is defined as a convenience.
pub type Result<T> = std::result::Result<T, Error>;
