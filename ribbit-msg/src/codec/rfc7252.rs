use std_alloc::vec::Vec;

use super::Codec;
use crate::cursor::Cursor;
use crate::from_bytes::TryConsumeBytes;
use crate::msg::Byte1;
use crate::*;

/// Largest option number reachable with the 2-byte extended delta
/// of a single option.
const MAX_DELTA: u32 = 65535 + 269;

/// Largest value length representable by the 2-byte extended length
const MAX_VALUE_LEN: usize = 65535 + 269;

/// The message format of [RFC 7252 section 3](https://www.rfc-editor.org/rfc/rfc7252#section-3)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |Ver| T |  TKL  |      Code     |          Message ID           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Token (if any, TKL bytes) ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Options (if any) ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |1 1 1 1 1 1 1 1|    Payload (if any) ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rfc7252;

impl Codec for Rfc7252 {
  fn encode(&self, msg: &Message) -> Result<Vec<u8>, MessageToBytesError> {
    let mut bytes = Vec::with_capacity(4 + msg.token.0.len() + msg.payload.0.len() + 16);

    let byte1 = Byte1 { ver: msg.ver,
                        ty: msg.ty,
                        tkl: msg.token.0.len() as u8 };
    bytes.push(byte1.into());
    bytes.push(msg.code.into());
    bytes.extend(<[u8; 2]>::from(msg.id));
    bytes.extend_from_slice(msg.token.as_bytes());

    let mut prev = 0u32;
    for (number, value) in msg.opts_to_send() {
      let delta = number.0 - prev;
      if delta > MAX_DELTA {
        return Err(MessageToBytesError::OptionNumberTooLarge(number));
      }

      if value.0.len() > MAX_VALUE_LEN {
        return Err(MessageToBytesError::OptionTooLong { number,
                                                        size: value.0.len(),
                                                        max: MAX_VALUE_LEN });
      }

      Opt { delta: OptDelta(delta),
            value: value.clone() }.extend_bytes(&mut bytes);
      prev = number.0;
    }

    if !msg.payload.0.is_empty() {
      bytes.push(0b1111_1111);
      bytes.extend(&msg.payload.0);
    }

    Ok(bytes)
  }

  fn decode(&self, bytes: &[u8]) -> Result<Message, MessageParseError> {
    let mut bytes = Cursor::new(bytes);

    let Byte1 { ver, ty, tkl } = bytes.next().ok_or_else(MessageParseError::eof)?.try_into()?;

    if ver != Version(1) {
      return Err(MessageParseError::InvalidVersion(ver.0));
    }

    if tkl > 8 {
      return Err(MessageParseError::InvalidTokenLength(tkl));
    }

    let code_byte = bytes.next().ok_or_else(MessageParseError::eof)?;
    let code = Code::from(code_byte);
    if code.kind() == CodeKind::Reserved {
      return Err(MessageParseError::InvalidCode(code_byte));
    }

    let id = Id::try_consume_bytes(&mut bytes)?;

    let token = bytes.take_exact(tkl as usize)
                     .ok_or_else(MessageParseError::eof)?;
    let token = Token::try_from_slice(token).map_err(|_| MessageParseError::InvalidTokenLength(tkl))?;

    if code == Code::EMPTY && (tkl != 0 || !bytes.is_exhausted()) {
      return Err(MessageParseError::EmptyMessageNotEmpty);
    }

    let mut opts = OptionMap::new();
    let mut number = 0u32;
    let payload = loop {
      match bytes.peek_byte() {
        | None => break Vec::new(),
        | Some(0b1111_1111) => {
          bytes.next();
          if bytes.is_exhausted() {
            return Err(MessageParseError::PayloadMarkerWithoutPayload);
          }
          break bytes.take_until_end().to_vec();
        },
        | Some(_) => {
          let Opt { delta, value } = Opt::try_consume_bytes(&mut bytes)?;
          number = number.checked_add(delta.0)
                         .ok_or(OptParseError::OptionNumberOverflow)?;
          opts.entry(OptNumber(number)).or_default().push(value);
        },
      }
    };

    Ok(Message { id,
                 ty,
                 ver,
                 token,
                 code,
                 opts,
                 payload: Payload(payload) })
  }
}

#[cfg(test)]
mod tests {
  use std_alloc::vec;

  use super::*;
  use crate::assert_eqb_iter;

  #[test]
  fn decode_test_msg() {
    let (msg, bytes) = crate::test_msg();
    assert_eq!(Rfc7252.decode(&bytes), Ok(msg));
  }

  #[test]
  fn encode_test_msg() {
    let (msg, bytes) = crate::test_msg();
    let actual = Rfc7252.encode(&msg).unwrap();
    assert_eqb_iter!(actual, bytes);
  }

  #[test]
  fn temperature_request() {
    // CON GET /temperature, id 0x7d34, no token
    let mut msg = Message::new(Type::Con, Code::GET);
    msg.id = Id(0x7d34);
    msg.add_uri_path("temperature").unwrap();

    let expected = [[0x40, 0x01, 0x7d, 0x34, 0xbb].as_ref(), b"temperature"].concat();
    assert_eq!(Rfc7252.encode(&msg).unwrap(), expected);
    assert_eq!(Rfc7252.decode(&expected).unwrap(), msg);
  }

  #[test]
  fn extended_deltas() {
    let mut msg = Message::new(Type::Non, Code::GET);
    msg.set_option(OptNumber(1), OptValue(vec![])).unwrap();
    msg.add_uri_path("a").unwrap();
    msg.add_uri_path("b").unwrap();
    msg.set_size1(12).unwrap();

    let bytes = Rfc7252.encode(&msg).unwrap();
    let opts = &bytes[4..];
    assert_eq!(opts,
               &[0b0001_0000, // If-Match, delta 1, empty
                 0b1010_0001,
                 b'a', // Uri-Path, delta 10
                 0b0000_0001,
                 b'b', // Uri-Path, delta 0
                 0b1101_0001,
                 49 - 13,
                 12 /* Size1, delta 49 */]);
    assert_eq!(Rfc7252.decode(&bytes).unwrap(), msg);
  }

  #[test]
  fn large_option_numbers() {
    let mut msg = Message::new(Type::Non, Code::GET);
    msg.set_option(OptNumber(2048), OptValue(vec![1])).unwrap();
    msg.set_option(OptNumber(65000), OptValue(vec![2])).unwrap();

    let bytes = Rfc7252.encode(&msg).unwrap();
    assert_eq!(&bytes[4..7], &[0b1110_0001, 0x06, 0xf3]);
    assert_eq!(Rfc7252.decode(&bytes).unwrap(), msg);
  }

  #[test]
  fn option_number_too_large() {
    let mut msg = Message::new(Type::Non, Code::GET);
    msg.opts.insert(OptNumber(MAX_DELTA + 1), vec![OptValue(vec![1])]);
    assert_eq!(Rfc7252.encode(&msg),
               Err(MessageToBytesError::OptionNumberTooLarge(OptNumber(MAX_DELTA + 1))));
  }

  #[test]
  fn trailing_payload_marker() {
    let bytes = [0x40, 0x01, 0x00, 0x01, 0xff];
    assert_eq!(Rfc7252.decode(&bytes),
               Err(MessageParseError::PayloadMarkerWithoutPayload));
  }

  #[test]
  fn bad_header() {
    assert_eq!(Rfc7252.decode(&[0x80, 0x01, 0x00, 0x01]),
               Err(MessageParseError::InvalidVersion(2)));
    assert_eq!(Rfc7252.decode(&[0x49, 0x01, 0x00, 0x01]),
               Err(MessageParseError::InvalidTokenLength(9)));
    assert_eq!(Rfc7252.decode(&[0x40, 0x20, 0x00, 0x01]),
               Err(MessageParseError::InvalidCode(0x20)));
    assert_eq!(Rfc7252.decode(&[0x40, 0x01, 0x00]),
               Err(MessageParseError::UnexpectedEndOfStream));
    assert_eq!(Rfc7252.decode(&[0x42, 0x01, 0x00, 0x01, 0xaa]),
               Err(MessageParseError::UnexpectedEndOfStream));
    assert_eq!(Rfc7252.decode(&[]), Err(MessageParseError::UnexpectedEndOfStream));
  }

  #[test]
  fn empty_message_must_be_empty() {
    assert!(Rfc7252.decode(&[0x40, 0x00, 0x12, 0x34]).unwrap().is_empty());
    assert_eq!(Rfc7252.decode(&[0x41, 0x00, 0x12, 0x34, 0x01]),
               Err(MessageParseError::EmptyMessageNotEmpty));
    assert_eq!(Rfc7252.decode(&[0x40, 0x00, 0x12, 0x34, 0xff, 0x01]),
               Err(MessageParseError::EmptyMessageNotEmpty));
  }

  #[test]
  fn truncated_option_value() {
    assert_eq!(Rfc7252.decode(&[0x40, 0x01, 0x00, 0x01, 0xb5, b'h', b'i']),
               Err(MessageParseError::OptParseError(OptParseError::UnexpectedEndOfStream)));
  }

  #[test]
  fn agrees_with_coap_lite() {
    use coap_lite::{CoapOption, MessageClass, MessageType, Packet, RequestType};

    let mut packet = Packet::new();
    packet.header.set_version(1);
    packet.header.set_type(MessageType::Confirmable);
    packet.header.code = MessageClass::Request(RequestType::Put);
    packet.header.message_id = 513;
    packet.set_token(vec![1, 2, 3]);
    packet.add_option(CoapOption::UriPath, b"lights".to_vec());
    packet.add_option(CoapOption::UriPath, b"kitchen".to_vec());
    packet.add_option(CoapOption::UriQuery, b"on=1".to_vec());
    packet.payload = b"{}".to_vec();
    let theirs = packet.to_bytes().unwrap();

    let mut msg = Message::new(Type::Con, Code::PUT);
    msg.id = Id(513);
    msg.token = Token::try_from_slice(&[1, 2, 3]).unwrap();
    msg.set_uri_path_string("lights/kitchen").unwrap();
    msg.add_uri_query("on=1").unwrap();
    msg.payload = Payload(b"{}".to_vec());
    let ours = Rfc7252.encode(&msg).unwrap();

    assert_eqb_iter!(ours, theirs);
    assert_eq!(Rfc7252.decode(&theirs).unwrap(), msg);
  }
}
