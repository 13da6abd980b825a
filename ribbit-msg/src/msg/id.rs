use core::fmt;

use super::MessageParseError;
use crate::cursor::Cursor;
use crate::from_bytes::TryConsumeBytes;

/// 16-bit message id, sent big-endian.
///
/// Pairs an ACK or RST with the CON it answers, and lets a receiver
/// recognize retransmissions of a message it already processed.
/// It says nothing about which request a response belongs to;
/// that is the job of the [`Token`](crate::Token).
#[derive(Copy, Clone, Hash, PartialEq, PartialOrd, Debug, Eq, Ord, Default)]
pub struct Id(pub u16);

impl Id {
  /// Create an Id from a big-endian 2-byte unsigned int
  pub fn from_be_bytes(bs: [u8; 2]) -> Self {
    Self(u16::from_be_bytes(bs))
  }

  /// The id following this one, wrapping at `u16::MAX`
  ///
  /// ```
  /// use ribbit_msg::Id;
  ///
  /// assert_eq!(Id(1).next(), Id(2));
  /// assert_eq!(Id(u16::MAX).next(), Id(0));
  /// ```
  pub fn next(&self) -> Self {
    Self(self.0.wrapping_add(1))
  }
}

impl fmt::Display for Id {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<Id> for [u8; 2] {
  fn from(id: Id) -> [u8; 2] {
    id.0.to_be_bytes()
  }
}

impl<Bytes: AsRef<[u8]>> TryConsumeBytes<Bytes> for Id {
  type Error = MessageParseError;

  fn try_consume_bytes(bytes: &mut Cursor<Bytes>) -> Result<Self, Self::Error> {
    bytes.take_exact(2)
         .map(|bs| Id::from_be_bytes([bs[0], bs[1]]))
         .ok_or_else(MessageParseError::eof)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn consume() {
    let mut cur = Cursor::new([0x12u8, 0x34, 0x56]);
    assert_eq!(Id::try_consume_bytes(&mut cur), Ok(Id(0x1234)));
    assert_eq!(Id::try_consume_bytes(&mut cur), Err(MessageParseError::eof()));
  }
}
