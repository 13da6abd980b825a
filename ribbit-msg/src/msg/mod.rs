use toad_macros::rfc_7252_doc;

/// Request methods and response codes
pub mod code;
/// Why bytes couldn't be decoded
pub mod parse_error;
/// Why a field couldn't be set
pub mod set_error;
/// Message ids
pub mod id;
/// Options and their typed accessors
pub mod opt;
/// Message types
pub mod ty;
/// Tokens
pub mod token;
/// Protocol version
pub mod ver;

pub use code::*;
pub use id::*;
pub use opt::*;
pub use parse_error::*;
pub use set_error::*;
pub use token::*;
pub use ty::*;
pub use ver::*;

use crate::codec::{Codec, Rfc7252};
use crate::TryFromBytes;

/// Message body
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Payload(pub std_alloc::vec::Vec<u8>);

/// The first header byte: `VV TT LLLL`.
///
/// `VV` is the protocol version, `TT` the [`Type`] and `LLLL` the
/// token length. Pre-RFC drafts put the number of options in `LLLL` instead.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub(crate) struct Byte1 {
  pub(crate) ver: Version,
  pub(crate) ty: Type,
  pub(crate) tkl: u8,
}

impl TryFrom<u8> for Byte1 {
  type Error = MessageParseError;

  fn try_from(b: u8) -> Result<Self, Self::Error> {
    Ok(Byte1 { ver: Version(b >> 6),
               ty: Type::try_from((b >> 4) & 0b11)?,
               tkl: b & 0x0F })
  }
}

impl From<Byte1> for u8 {
  fn from(b: Byte1) -> u8 {
    (b.ver.0 << 6) | (u8::from(b.ty) << 4) | (b.tkl & 0x0F)
  }
}

/// A CoAP message.
///
/// Options are stored in an [`OptionMap`], so they are always visited in
/// ascending option number order; see [`MessageOptions`] for typed accessors.
///
/// [`TryFromBytes`] and [`TryIntoBytes`](crate::TryIntoBytes) speak RFC 7252;
/// use a [`Codec`] (e.g. [`SpecVersion`](crate::SpecVersion)) for the drafts.
///
/// <details>
/// <summary><b>RFC7252 - CoAP Messaging Model</b></summary>
#[doc = concat!("\n#", rfc_7252_doc!("2.1"))]
/// </details>
///
/// ```
/// use ribbit_msg::*;
///
/// // CON 2.05, token [0xfe], id 1, Content-Format: 50 (json), payload "{}"
/// let packet = [0x41, 0x45, 0x00, 0x01, 0xfe, 0xc1, 50, 0xff, b'{', b'}'];
/// let msg = Message::try_from_bytes(packet).unwrap();
///
/// assert_eq!(msg.ty, Type::Con);
/// assert_eq!(msg.code, Code::new(2, 5));
/// assert_eq!(msg.id, Id(1));
/// assert_eq!(msg.token.0.as_slice(), &[0xfe]);
/// assert_eq!(msg.content_format(), Some(ContentFormat::Json));
/// assert_eq!(msg.payload, Payload(b"{}".to_vec()));
/// ```
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Message {
  /// Pairs CON with ACK/RST and detects duplicates
  pub id: Id,
  /// CON, NON, ACK or RST
  pub ty: Type,
  /// Protocol version; always 1
  pub ver: Version,
  /// Matches responses to requests
  pub token: Token,
  /// Method or response code
  pub code: Code,
  /// Options, keyed by number
  pub opts: OptionMap,
  /// Body; may be empty
  pub payload: Payload,
}

impl Message {
  /// Create a message with no token, options or payload, and message id 0
  pub fn new(ty: Type, code: Code) -> Self {
    Self { id: Id(0),
           ty,
           ver: Version::default(),
           token: Token::default(),
           code,
           opts: OptionMap::new(),
           payload: Payload::default() }
  }

  /// Create a new message that ACKs this one.
  ///
  /// The ACK is an Empty message echoing this message's [`Id`].
  ///
  /// ```
  /// use ribbit_msg::{Code, Id, Message, Type};
  ///
  /// let mut con = Message::new(Type::Con, Code::new(2, 5));
  /// con.id = Id(12);
  ///
  /// let ack = con.ack();
  /// assert_eq!(ack.id, Id(12));
  /// assert_eq!(ack.ty, Type::Ack);
  /// assert!(ack.is_empty());
  /// ```
  pub fn ack(&self) -> Self {
    Self { id: self.id,
           ..Self::new(Type::Ack, Code::EMPTY) }
  }

  /// Create a new message that rejects this one with a Reset.
  pub fn reset(&self) -> Self {
    Self { id: self.id,
           ..Self::new(Type::Reset, Code::EMPTY) }
  }

  /// Create a CoAP ping (Empty CON)
  pub fn ping(id: Id) -> Self {
    Self { id,
           ..Self::new(Type::Con, Code::EMPTY) }
  }

  /// Is this an Empty message? (code 0.00)
  pub fn is_empty(&self) -> bool {
    self.code == Code::EMPTY
  }

  /// Is this message a request?
  pub fn is_request(&self) -> bool {
    self.code.kind() == CodeKind::Request
  }

  /// Is this message a response?
  pub fn is_response(&self) -> bool {
    self.code.kind() == CodeKind::Response
  }

  /// The payload, if it is UTF-8
  pub fn payload_str(&self) -> Option<&str> {
    core::str::from_utf8(&self.payload.0).ok()
  }

  /// Options as they would be serialized; in order,
  /// and without options set to their default value.
  pub fn opts_to_send(&self) -> impl Iterator<Item = (OptNumber, &OptValue)> {
    self.opts
        .iter()
        .flat_map(|(n, vs)| vs.iter().map(move |v| (*n, v)))
        .filter(|(n, v)| {
          !OptionDef::lookup(*n).map(|def| def.is_default(v))
                                .unwrap_or(false)
        })
  }
}

impl MessageOptions for Message {
  fn opts(&self) -> &OptionMap {
    &self.opts
  }

  fn opts_mut(&mut self) -> &mut OptionMap {
    &mut self.opts
  }
}

impl<Bytes: AsRef<[u8]>> TryFromBytes<Bytes> for Message {
  type Error = MessageParseError;

  fn try_from_bytes(bytes: Bytes) -> Result<Self, Self::Error> {
    Rfc7252.decode(bytes.as_ref())
  }
}
