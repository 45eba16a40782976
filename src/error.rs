//! Gateway-wide error taxonomy.
//!
//! Every subsystem in the gateway reports failures through [`GatewayError`],
//! which groups errors by the kind of handling they need rather than by
//! which module raised them: validation failures are dropped and logged,
//! transient transport failures are retried, permanent ones are terminal.

use thiserror::Error;

/// Coarse-grained error kind used to decide how a failure should be handled,
/// independent of the specific variant that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input: invalid E.164, empty text, missing log id. Drop and log at warn.
    Validation,
    /// Bad bind, missing API key, wrong realm. Respond with the protocol's
    /// failure code; never leak the reason to the peer.
    Auth,
    /// SMPP socket write, SMTP 4xx, DB timeout. Retry with backoff up to the cap.
    TransientTransport,
    /// SMTP 5xx, session unavailable past threshold, carrier rejection. Terminal.
    PermanentTransport,
    /// A policy decision, not an error. Record and drop with a structured reason.
    RateLimited,
    /// Decode failure of a persisted item, surrogate in stored text. Remove and
    /// emit a structured incident; never retried indefinitely.
    Corruption,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("authentication failed")]
    Auth,

    #[error("transient transport error: {0}")]
    TransientTransport(String),

    #[error("permanent transport error: {0}")]
    PermanentTransport(String),

    #[error("rate limited: scope={scope} period={period:?} used={used} limit={limit}")]
    RateLimited {
        scope: &'static str,
        period: crate::gateway::ratelimit::Period,
        used: i64,
        limit: i64,
    },

    #[error("corrupted record: {0}")]
    Corruption(String),

    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Validation(_) => ErrorKind::Validation,
            GatewayError::Auth => ErrorKind::Auth,
            GatewayError::TransientTransport(_) | GatewayError::Io(_) => {
                ErrorKind::TransientTransport
            }
            GatewayError::PermanentTransport(_) => ErrorKind::PermanentTransport,
            GatewayError::RateLimited { .. } => ErrorKind::RateLimited,
            GatewayError::Corruption(_) => ErrorKind::Corruption,
            GatewayError::Codec(_) => ErrorKind::Validation,
        }
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
