use std_alloc::vec::Vec;

use super::Codec;
use crate::cursor::Cursor;
use crate::from_bytes::TryConsumeBytes;
use crate::*;

/// Option deltas in the drafts are 4 bits, with 15 reserved.
const MAX_DELTA: u32 = 14;

/// Options at multiples of this number carry no meaning,
/// and only exist to bridge gaps larger than [`MAX_DELTA`].
const FENCEPOST: u32 = 14;

/// The draft option number the token is carried in
const TOKEN: u32 = 11;

/// Draft-12 "end of options" marker, used when the option count is 15
const END_OF_OPTIONS: u8 = 0xF0;

/// Option numbers as (RFC 7252, draft) pairs.
const NUMBERS: [(u32, u32); 16] = [(12, 1),  // Content-Type
                                   (14, 2),  // Max-Age
                                   (35, 3),  // Proxy-Uri
                                   (4, 4),   // ETag
                                   (3, 5),   // Uri-Host
                                   (8, 6),   // Location-Path
                                   (7, 7),   // Uri-Port
                                   (20, 8),  // Location-Query
                                   (11, 9),  // Uri-Path
                                   (6, 10),  // Observe
                                   (17, 12), // Accept
                                   (1, 13),  // If-Match
                                   (15, 15), // Uri-Query
                                   (23, 17), // Block2
                                   (27, 19), // Block1
                                   (5, 21)   /* If-None-Match */];

fn to_draft(n: OptNumber) -> Option<u32> {
  NUMBERS.iter().find(|(rfc, _)| *rfc == n.0).map(|(_, d)| *d)
}

fn from_draft(n: u32) -> Option<OptNumber> {
  NUMBERS.iter()
         .find(|(_, draft)| *draft == n)
         .map(|(rfc, _)| OptNumber(*rfc))
}

/// How a draft represents option value lengths of 15 or more,
/// and how many options it can fit in a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rules {
  /// One extension byte; lengths up to 270, at most 15 options
  Draft08,
  /// A run of extension bytes ended by one below 255; an option count of 15
  /// means "options end with 0xF0"
  Draft12,
}

impl Rules {
  fn extend_len(&self, number: OptNumber, len: usize, bytes: &mut Vec<u8>) -> Result<(), MessageToBytesError> {
    match self {
      | Rules::Draft08 if len > 15 + 255 => Err(MessageToBytesError::OptionTooLong { number,
                                                                                   size: len,
                                                                                   max: 15 + 255 }),
      | Rules::Draft08 => {
        bytes.push((len - 15) as u8);
        Ok(())
      },
      | Rules::Draft12 => {
        let mut rest = len - 15;
        while rest >= 255 {
          bytes.push(255);
          rest -= 255;
        }
        bytes.push(rest as u8);
        Ok(())
      },
    }
  }

  fn consume_len(&self, bytes: &mut Cursor<&[u8]>) -> Result<usize, OptParseError> {
    match self {
      | Rules::Draft08 => bytes.next()
                               .map(|b| 15 + b as usize)
                               .ok_or_else(OptParseError::eof),
      | Rules::Draft12 => {
        let mut len = 15usize;
        loop {
          let b = bytes.next().ok_or_else(OptParseError::eof)?;
          len += b as usize;
          if b < 255 {
            break Ok(len);
          }
        }
      },
    }
  }

  fn encode(&self, msg: &Message) -> Result<Vec<u8>, MessageToBytesError> {
    let mut opts = msg.opts_to_send()
                      .map(|(n, v)| {
                        to_draft(n).map(|d| (d, v.as_bytes()))
                                   .ok_or(MessageToBytesError::UnsupportedOption(n))
                      })
                      .collect::<Result<Vec<_>, _>>()?;

    if !msg.token.is_empty() {
      opts.push((TOKEN, msg.token.as_bytes()));
    }

    // stable; repeated options keep their order
    opts.sort_by_key(|(n, _)| *n);

    let mut deltas: Vec<(u32, u32, &[u8])> = Vec::with_capacity(opts.len());
    let mut prev = 0u32;
    for (n, value) in opts {
      while n - prev > MAX_DELTA {
        let fencepost = (prev / FENCEPOST + 1) * FENCEPOST;
        deltas.push((fencepost, fencepost - prev, &[][..]));
        prev = fencepost;
      }

      deltas.push((n, n - prev, value));
      prev = n;
    }

    let count = deltas.len();
    let oc = match self {
      | Rules::Draft08 if count > 15 => {
        return Err(MessageToBytesError::TooManyOptions { count, max: 15 })
      },
      | Rules::Draft12 if count >= 15 => 15,
      | _ => count as u8,
    };

    let mut bytes = Vec::with_capacity(4 + msg.payload.0.len() + 16);
    bytes.push((msg.ver.0 << 6) | (u8::from(msg.ty) << 4) | oc);
    bytes.push(msg.code.into());
    bytes.extend(<[u8; 2]>::from(msg.id));

    for (n, delta, value) in deltas {
      let number = from_draft(n).unwrap_or(OptNumber(n));
      let len_nibble = value.len().min(15) as u8;
      bytes.push(((delta as u8) << 4) | len_nibble);
      if len_nibble == 15 {
        self.extend_len(number, value.len(), &mut bytes)?;
      }
      bytes.extend_from_slice(value);
    }

    if oc == 15 {
      bytes.push(END_OF_OPTIONS);
    }

    bytes.extend(&msg.payload.0);
    Ok(bytes)
  }

  fn decode(&self, bytes: &[u8]) -> Result<Message, MessageParseError> {
    let mut bytes = Cursor::new(bytes);

    let byte1 = bytes.next().ok_or_else(MessageParseError::eof)?;
    let ver = Version(byte1 >> 6);
    let ty = Type::try_from((byte1 >> 4) & 0b11)?;
    let oc = byte1 & 0b1111;

    if ver != Version(1) {
      return Err(MessageParseError::InvalidVersion(ver.0));
    }

    let code_byte = bytes.next().ok_or_else(MessageParseError::eof)?;
    let code = Code::from(code_byte);
    if code.kind() == CodeKind::Reserved {
      return Err(MessageParseError::InvalidCode(code_byte));
    }

    let id = Id::try_consume_bytes(&mut bytes)?;

    if code == Code::EMPTY && (oc != 0 || !bytes.is_exhausted()) {
      return Err(MessageParseError::EmptyMessageNotEmpty);
    }

    let terminated = *self == Rules::Draft12 && oc == 15;
    let mut token = Token::default();
    let mut opts = OptionMap::new();
    let mut number = 0u32;
    let mut seen = 0u8;

    loop {
      if terminated {
        match bytes.peek_byte() {
          | Some(END_OF_OPTIONS) => {
            bytes.next();
            break;
          },
          | None => return Err(OptParseError::eof().into()),
          | _ => (),
        }
      } else if seen == oc {
        break;
      }

      let header = bytes.next().ok_or_else(OptParseError::eof)?;
      let delta = (header >> 4) as u32;
      if delta > MAX_DELTA {
        return Err(OptParseError::OptionDeltaReservedValue(header >> 4).into());
      }

      let len = match header & 0b1111 {
        | 15 => self.consume_len(&mut bytes)?,
        | n => n as usize,
      };
      let value = bytes.take_exact(len).ok_or_else(OptParseError::eof)?;

      number += delta;
      seen = seen.saturating_add(1);

      match number {
        | n if n % FENCEPOST == 0 => continue,
        | TOKEN => {
          token = Token::try_from_slice(value).map_err(|_| OptParseError::LegacyTokenTooLong(value.len()))?;
        },
        | n => {
          let n = from_draft(n).ok_or(OptParseError::UnknownLegacyOption(OptNumber(n)))?;
          opts.entry(n).or_default().push(OptValue(value.to_vec()));
        },
      }
    }

    Ok(Message { id,
                 ty,
                 ver,
                 token,
                 code,
                 opts,
                 payload: Payload(bytes.take_until_end().to_vec()) })
  }
}

/// The message format of [draft-ietf-core-coap-08](https://datatracker.ietf.org/doc/html/draft-ietf-core-coap-08#section-3)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |Ver| T |  OC   |      Code     |          Message ID           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Options (if any) ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Payload (if any) ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The token is carried as option 11, option numbers differ from RFC 7252,
/// and there is no payload marker. Options without a draft number
/// (e.g. Size1) cannot be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Draft08;

/// The message format of [draft-ietf-core-coap-12](https://datatracker.ietf.org/doc/html/draft-ietf-core-coap-12#section-3)
///
/// Identical to [`Draft08`] except that value lengths may be extended
/// without limit, and messages with 15 or more options set the option count
/// to 15 and end their options with `0xF0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Draft12;

impl Codec for Draft08 {
  fn encode(&self, msg: &Message) -> Result<Vec<u8>, MessageToBytesError> {
    Rules::Draft08.encode(msg)
  }

  fn decode(&self, bytes: &[u8]) -> Result<Message, MessageParseError> {
    Rules::Draft08.decode(bytes)
  }
}

impl Codec for Draft12 {
  fn encode(&self, msg: &Message) -> Result<Vec<u8>, MessageToBytesError> {
    Rules::Draft12.encode(msg)
  }

  fn decode(&self, bytes: &[u8]) -> Result<Message, MessageParseError> {
    Rules::Draft12.decode(bytes)
  }
}
