use super::OptNumber;

/// Errors encounterable while parsing an option from bytes
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Eq, Ord, Hash)]
pub enum OptParseError {
  /// Reached end of stream before parsing was finished
  UnexpectedEndOfStream,

  /// Option Delta was set to 15, which is invalid.
  OptionDeltaReservedValue(u8),

  /// Value Length was set to 15, which is invalid.
  ValueLengthReservedValue(u8),

  /// Option number exceeded the largest number representable
  /// by the wire format (65804 for RFC 7252)
  OptionNumberOverflow,

  /// A pre-RFC message used an option number that has no
  /// counterpart in this crate's option registry
  UnknownLegacyOption(OptNumber),

  /// A pre-RFC message carried a Token option longer than 8 bytes
  LegacyTokenTooLong(usize),

  /// Not a true failure case; only means we tried to read the payload marker byte (0xFF)
  /// as an option header.
  OptionsExhausted,
}

impl OptParseError {
  /// Shorthand for [`OptParseError::UnexpectedEndOfStream`]
  pub fn eof() -> Self {
    Self::UnexpectedEndOfStream
  }
}
