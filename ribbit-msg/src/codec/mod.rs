use std_alloc::vec::Vec;

use crate::{Message, MessageParseError, MessageToBytesError};

mod draft;
mod rfc7252;

pub use draft::{Draft08, Draft12};
pub use rfc7252::Rfc7252;

/// A wire format for [`Message`]s.
///
/// Every protocol revision implements this trait, so that the
/// revision can be chosen once (e.g. per endpoint) and the rest of the
/// system never needs to know which one is in use.
///
/// Decoding never panics; bytes that are not a well-formed message
/// for the revision yield a [`MessageParseError`].
pub trait Codec {
  /// Serialize a message
  fn encode(&self, msg: &Message) -> Result<Vec<u8>, MessageToBytesError>;

  /// Deserialize a message
  fn decode(&self, bytes: &[u8]) -> Result<Message, MessageParseError>;
}

/// The protocol revisions messages can be encoded with.
///
/// ```
/// use ribbit_msg::SpecVersion;
///
/// assert_eq!(SpecVersion::default(), SpecVersion::Rfc7252);
/// assert_eq!("draft-12".parse::<SpecVersion>(), Ok(SpecVersion::Draft12));
/// assert_eq!(SpecVersion::Draft08.to_string(), "draft-08");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SpecVersion {
  /// [RFC 7252](https://www.rfc-editor.org/rfc/rfc7252)
  #[default]
  Rfc7252,
  /// [draft-ietf-core-coap-12](https://datatracker.ietf.org/doc/html/draft-ietf-core-coap-12)
  Draft12,
  /// [draft-ietf-core-coap-08](https://datatracker.ietf.org/doc/html/draft-ietf-core-coap-08)
  Draft08,
}

impl SpecVersion {
  /// Every supported revision, newest first
  pub const ALL: [SpecVersion; 3] = [SpecVersion::Rfc7252, SpecVersion::Draft12, SpecVersion::Draft08];

  /// The codec implementing this revision
  pub fn codec(&self) -> &'static dyn Codec {
    match self {
      | SpecVersion::Rfc7252 => &rfc7252::Rfc7252,
      | SpecVersion::Draft12 => &draft::Draft12,
      | SpecVersion::Draft08 => &draft::Draft08,
    }
  }

  fn name(&self) -> &'static str {
    match self {
      | SpecVersion::Rfc7252 => "rfc7252",
      | SpecVersion::Draft12 => "draft-12",
      | SpecVersion::Draft08 => "draft-08",
    }
  }
}

impl Codec for SpecVersion {
  fn encode(&self, msg: &Message) -> Result<Vec<u8>, MessageToBytesError> {
    self.codec().encode(msg)
  }

  fn decode(&self, bytes: &[u8]) -> Result<Message, MessageParseError> {
    self.codec().decode(bytes)
  }
}

impl core::fmt::Display for SpecVersion {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.write_str(self.name())
  }
}

/// A string that is not the name of a [`SpecVersion`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownSpecVersion;

impl core::str::FromStr for SpecVersion {
  type Err = UnknownSpecVersion;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    SpecVersion::ALL.into_iter()
                    .find(|v| v.name().eq_ignore_ascii_case(s))
                    .ok_or(UnknownSpecVersion)
  }
}
