use super::OptNumber;

/// The field of a message that a [`SetError`] is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
  /// The message [`Token`](super::Token)
  Token,
  /// An option, identified by its number
  Option(OptNumber),
}

/// Errors encounterable while constructing or mutating a message.
///
/// These are reported synchronously, at the call that attempted the invalid mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SetError {
  /// A value's length (or magnitude, for integer values)
  /// was outside of the allowed range for the field
  ValueOutOfRange {
    /// The field that was being set
    field: Field,
    /// The length or value that was rejected
    actual: u64,
    /// Minimum allowed (inclusive)
    min: u64,
    /// Maximum allowed (inclusive)
    max: u64,
  },
  /// The value was well-sized but not acceptable
  InvalidArgument {
    /// The field that was being set
    field: Field,
    /// Why the value was rejected
    reason: &'static str,
  },
}

impl SetError {
  /// The field that failed validation
  pub fn field(&self) -> Field {
    match self {
      | Self::ValueOutOfRange { field, .. } | Self::InvalidArgument { field, .. } => *field,
    }
  }
}
