//! Low-level representation of CoAP messages.
//!
//! The most notable item in `ribbit_msg` is [`Message`];
//! a CoAP message with its options stored in ascending option-number order,
//! the way they are laid out on the wire.
//!
//! ## Options
//! Options (in http terms: headers) are stored in an [`OptionMap`], a map
//! from [`OptNumber`] to the ordered list of values for that number.
//!
//! Typed accessors for every option registered in RFC 7252, RFC 7641 and RFC 7959
//! live on the [`MessageOptions`] trait, which validates lengths as values are set:
//!
//! ```
//! use ribbit_msg::{ContentFormat, Message, MessageOptions, Type, Code};
//!
//! let mut msg = Message::new(Type::Con, Code::GET);
//! msg.set_uri_path_string("sensors/temperature").unwrap();
//! msg.set_accept(ContentFormat::Json).unwrap();
//!
//! assert_eq!(msg.uri_path_string(), "sensors/temperature");
//! assert!(msg.add_uri_path(&"x".repeat(256)).is_err());
//! ```
//!
//! ## Wire formats
//! [`Message`] can be serialized using any of the protocol revisions in [`SpecVersion`].
//! RFC 7252 is the default used by [`TryFromBytes`] and [`TryIntoBytes`]; the pre-RFC
//! drafts are available through the [`Codec`] trait.
//!
//! ```
//! use ribbit_msg::{Codec, Code, Id, Message, SpecVersion, Type};
//!
//! let mut msg = Message::new(Type::Non, Code::GET);
//! msg.id = Id(7);
//!
//! for version in SpecVersion::ALL {
//!   let bytes = version.encode(&msg).unwrap();
//!   assert_eq!(version.decode(&bytes).unwrap(), msg);
//! }
//! ```
//!
//! ## Performance
//! This crate uses `criterion` to compare encoding & decoding with `coap_lite::Packet`
//! (`cargo bench -p ribbit-msg`).

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(not(test), warn(missing_debug_implementations, unreachable_pub))]
#![cfg_attr(not(test), deny(unsafe_code))]
#![cfg_attr(any(docsrs, feature = "docs"), feature(doc_cfg))]
#![warn(missing_docs)]

extern crate alloc as std_alloc;

pub(crate) mod cursor;

#[doc(hidden)]
pub mod from_bytes;

/// Message structs
pub mod msg;

/// Wire codecs for each supported protocol revision
pub mod codec;

#[doc(hidden)]
pub mod to_bytes;

#[doc(inline)]
pub use codec::{Codec, SpecVersion};
#[doc(inline)]
pub use from_bytes::TryFromBytes;
#[doc(inline)]
pub use msg::*;
#[doc(inline)]
pub use to_bytes::{MessageToBytesError, TryIntoBytes};

/// `NON GET /a/bc?x=1` with token `[1, 2]`, id 0x1234 and payload "hi"
#[cfg(test)]
pub(crate) fn test_msg() -> (Message, Vec<u8>) {
  use std_alloc::collections::BTreeMap;

  let bytes = vec![0b01_01_0010, 0x01, 0x12, 0x34, // header
                   1, 2, // token
                   0xB1, b'a', // Uri-Path (11)
                   0x02, b'b', b'c', // Uri-Path
                   0x43, b'x', b'=', b'1', // Uri-Query (15)
                   0xFF, b'h', b'i'];

  let msg = Message { id: Id(0x1234),
                      ty: Type::Non,
                      ver: Version(1),
                      token: Token(tinyvec::array_vec!([u8; 8] => 1, 2)),
                      opts: BTreeMap::from([(OptNumber(11),
                                             vec![OptValue::string("a"), OptValue::string("bc")]),
                                            (OptNumber(15), vec![OptValue::string("x=1")])]),
                      code: Code::GET,
                      payload: Payload(b"hi".to_vec()) };
  (msg, bytes)
}

#[cfg(test)]
pub(crate) mod tests {
  #[macro_export]
  macro_rules! assert_eqb {
    ($actual:expr, $expected:expr) => {
      if $actual != $expected {
        panic!("expected {:08b} to equal {:08b}", $actual, $expected)
      }
    };
  }

  #[macro_export]
  macro_rules! assert_eqb_iter {
    ($actual:expr, $expected:expr) => {
      if $actual.iter().ne($expected.iter()) {
        panic!("expected {:?} to equal {:?}",
               $actual.into_iter()
                      .map(|b| format!("{:08b}", b))
                      .collect::<Vec<_>>(),
               $expected.into_iter()
                        .map(|b| format!("{:08b}", b))
                        .collect::<Vec<_>>())
      }
    };
  }
}
