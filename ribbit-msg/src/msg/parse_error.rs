use super::opt::parse_error::OptParseError;

/// Errors encounterable while parsing a message from bytes
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Eq, Ord, Hash)]
pub enum MessageParseError {
  /// Reached end of stream before parsing was finished
  UnexpectedEndOfStream,

  /// The version field was not 1
  InvalidVersion(u8),

  /// Token length was > 8
  InvalidTokenLength(u8),

  /// The code byte was in a class reserved by CoAP over UDP (1, 6 or 7)
  InvalidCode(u8),

  /// An Empty (0.00) message carried a token, options or a payload
  EmptyMessageNotEmpty,

  /// A payload marker (0xFF) was the last byte of the message
  PayloadMarkerWithoutPayload,

  /// Error parsing option
  OptParseError(OptParseError),

  /// The message type is invalid (see [`Type`](super::Type) for information & valid values)
  InvalidType(u8),
}

impl MessageParseError {
  /// Shorthand for [`MessageParseError::UnexpectedEndOfStream`]
  pub fn eof() -> Self {
    Self::UnexpectedEndOfStream
  }
}

impl From<OptParseError> for MessageParseError {
  fn from(e: OptParseError) -> Self {
    Self::OptParseError(e)
  }
}
