use core::fmt;

use super::MessageParseError;

/// The 2-bit message type.
///
/// The same four types (and the same wire values) are shared by
/// RFC 7252 and the drafts this crate speaks.
///
/// ```
/// use ribbit_msg::Type;
///
/// assert_eq!(Type::try_from(2).unwrap(), Type::Ack);
/// assert_eq!(u8::from(Type::Reset), 3);
/// assert!(Type::try_from(4).is_err());
/// ```
#[derive(Copy, Clone, Hash, Eq, Ord, PartialEq, PartialOrd, Debug)]
pub enum Type {
  /// Non-confirmable; fire and forget
  Non,
  /// Confirmable; retransmitted until the peer
  /// answers with [`Type::Ack`] or [`Type::Reset`]
  Con,
  /// Acknowledges a [`Type::Con`] with the same message id,
  /// and may carry a piggybacked response
  Ack,
  /// The peer got our message but has no context to process it.
  ///
  /// Also the answer to an empty [`Type::Con`] ("ping").
  Reset,
}

impl Type {
  /// Does a message of this type close the exchange of the
  /// Confirmable message with the same id?
  pub fn answers_con(&self) -> bool {
    matches!(self, Type::Ack | Type::Reset)
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
                  | Type::Con => "CON",
                  | Type::Non => "NON",
                  | Type::Ack => "ACK",
                  | Type::Reset => "RST",
                })
  }
}

impl TryFrom<u8> for Type {
  type Error = MessageParseError;

  fn try_from(b: u8) -> Result<Self, Self::Error> {
    match b {
      | 0 => Ok(Type::Con),
      | 1 => Ok(Type::Non),
      | 2 => Ok(Type::Ack),
      | 3 => Ok(Type::Reset),
      | _ => Err(MessageParseError::InvalidType(b)),
    }
  }
}

impl From<Type> for u8 {
  fn from(t: Type) -> u8 {
    match t {
      | Type::Con => 0,
      | Type::Non => 1,
      | Type::Ack => 2,
      | Type::Reset => 3,
    }
  }
}
