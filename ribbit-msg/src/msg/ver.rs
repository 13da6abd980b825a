/// Version of the CoAP protocol that the message adheres to.
///
/// Every revision this crate speaks (RFC 7252 and the drafts preceding it)
/// puts `1` in this field; anything else is rejected when parsing.
///
/// See [RFC7252 - Message Details](https://datatracker.ietf.org/doc/html/rfc7252#section-3) for context
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Version(pub u8);

impl Default for Version {
  fn default() -> Self {
    Version(1)
  }
}
