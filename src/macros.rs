// ABOUTME: This module provides macros to reduce boilerplate in SMPP PDU implementations
// ABOUTME: Used for the builder-pattern setters shared by the bind PDUs

/// Macro for generating builder setter methods
///
/// This macro generates fluent setter methods for builder patterns,
/// where each method takes a value, sets the corresponding field,
/// and returns self for method chaining.
///
/// # Arguments
/// * `$($field:ident: $type:ty),*` - Field name and type pairs
///
/// # Generated code
/// For each field, generates:
/// ```rust
/// pub fn $field(mut self, $field: $type) -> Self {
///     self.$field = $field;
///     self
/// }
/// ```
macro_rules! builder_setters {
    ($($field:ident: $type:ty),* $(,)?) => {
        $(
            pub fn $field(mut self, $field: $type) -> Self {
                self.$field = $field;
                self
            }
        )*
    };
}

// Make macros available to the rest of the crate
pub(crate) use builder_setters;
