use std_alloc::vec::Vec;

use tinyvec::ArrayVec;

use crate::codec::{Codec, Rfc7252};
use crate::*;

/// Trait allowing fallible conversion into bytes
pub trait TryIntoBytes {
  /// Error type yielded if conversion fails
  type Error;

  /// Try to convert into a collection of bytes
  ///
  /// ```
  /// use ribbit_msg::{Code, Message, MessageOptions, TryIntoBytes, Type};
  ///
  /// let mut msg = Message::new(Type::Con, Code::GET);
  /// msg.add_uri_path("hello").unwrap();
  ///
  /// let bytes: Vec<u8> = msg.try_into_bytes().unwrap();
  /// assert_eq!(bytes, vec![0b0100_0000, 0b0000_0001, 0, 0, 0b1011_0101, b'h', b'e', b'l', b'l', b'o']);
  /// ```
  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error>;
}

/// Errors encounterable serializing to bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageToBytesError {
  /// An option value was longer than the wire format can represent
  #[allow(missing_docs)]
  OptionTooLong { number: OptNumber, size: usize, max: usize },
  /// Option number exceeded the largest number representable by the wire format
  OptionNumberTooLarge(OptNumber),
  /// More options than the wire format's option count can represent
  #[allow(missing_docs)]
  TooManyOptions { count: usize, max: usize },
  /// The option has no number in the protocol revision being used
  UnsupportedOption(OptNumber),
}

impl TryIntoBytes for Message {
  type Error = MessageToBytesError;

  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error> {
    Rfc7252.encode(&self)
  }
}

impl<'a> TryIntoBytes for &'a Message {
  type Error = MessageToBytesError;

  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error> {
    Rfc7252.encode(self)
  }
}

pub(crate) fn opt_len_or_delta(val: u32) -> (u8, Option<ArrayVec<[u8; 2]>>) {
  match val {
    | n if n >= 269 => {
      let mut bytes = ArrayVec::new();
      bytes.extend(((n - 269) as u16).to_be_bytes());
      (14, Some(bytes))
    },
    | n if n >= 13 => {
      let mut bytes = ArrayVec::new();
      bytes.push((n as u8) - 13);
      (13, Some(bytes))
    },
    | n => (n as u8, None),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::msg::Byte1;
  use crate::{assert_eqb, assert_eqb_iter};

  #[test]
  fn msg() {
    let (m, expected) = crate::test_msg();
    let actual: Vec<u8> = m.try_into_bytes().unwrap();
    assert_eqb_iter!(actual, expected);
  }

  #[test]
  fn header_bytes() {
    let byte1: u8 = Byte1 { ver: Version(1),
                            ty: Type::Non,
                            tkl: 8 }.into();
    assert_eqb!(byte1, 0b_01_01_1000u8);

    let code: u8 = Code::new(4, 4).into();
    assert_eqb!(code, 0b100_00100u8);

    let id: [u8; 2] = Id(0x0102).into();
    assert_eq!(id, [1, 2]);
  }

  #[test]
  fn extended_nibbles() {
    let ext = |bs: &[u8]| Some(bs.iter().copied().collect::<ArrayVec<[u8; 2]>>());

    assert_eq!(opt_len_or_delta(0), (0, None));
    assert_eq!(opt_len_or_delta(12), (12, None));
    assert_eq!(opt_len_or_delta(13), (13, ext(&[0])));
    assert_eq!(opt_len_or_delta(268), (13, ext(&[255])));
    assert_eq!(opt_len_or_delta(269), (14, ext(&[0, 0])));
    assert_eq!(opt_len_or_delta(1034), (14, ext(&[0x02, 0xfd])));
  }

  #[test]
  fn opt_with_extended_delta_and_length() {
    let opt = Opt { delta: OptDelta(20),
                    value: OptValue(vec![7; 280]) };
    let mut actual = Vec::<u8>::new();
    opt.extend_bytes(&mut actual);

    assert_eq!(&actual[..4], &[0b1101_1110, 20 - 13, 0, (280u16 - 269) as u8]);
    assert_eq!(actual.len(), 4 + 280);
  }

  #[test]
  fn empty_payload_has_no_marker() {
    let mut msg = Message::new(Type::Ack, Code::new(2, 3));
    msg.id = Id(9);
    let bytes = msg.try_into_bytes().unwrap();

    assert_eq!(bytes, vec![0b0110_0000, 0b010_00011, 0, 9]);
  }
}
