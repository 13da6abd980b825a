use std_alloc::collections::BTreeMap;
use std_alloc::vec::Vec;

use crate::cursor::Cursor;
use crate::from_bytes::*;

pub mod parse_error;
pub use parse_error::*;

/// Typed accessors for known options
pub mod accessors;
pub use accessors::*;

/// Known options, their numbers & value formats
pub mod known;
pub use known::*;

/// Options of a message, keyed by number.
///
/// Iteration yields numbers in ascending order, and
/// values for a given number in insertion order.
pub type OptionMap = BTreeMap<OptNumber, Vec<OptValue>>;

pub(crate) fn parse_opt_len_or_delta<A: AsRef<[u8]>>(head: u8,
                                                     bytes: &mut Cursor<A>,
                                                     reserved_err: OptParseError)
                                                     -> Result<u32, OptParseError> {
  match head {
    | 13 => {
      let n = bytes.next().ok_or_else(OptParseError::eof)?;
      Ok((n as u32) + 13)
    },
    | 14 => match bytes.take_exact(2) {
      | Some(&[a, b]) => Ok(u16::from_be_bytes([a, b]) as u32 + 269),
      | _ => Err(OptParseError::eof()),
    },
    | 15 => Err(reserved_err),
    | _ => Ok(head as u32),
  }
}

/// One option as laid out on the wire: its number is stored as the
/// difference from the previous option's number.
///
/// [`Message`](crate::Message) keeps its options by number in an [`OptionMap`];
/// `Opt`s only exist while a message is being encoded or decoded
/// (see [`opts_with_deltas`]).
#[derive(Clone, PartialEq, PartialOrd, Debug, Default)]
pub struct Opt {
  /// Distance from the previous option's number
  pub delta: OptDelta,
  /// Raw value bytes
  pub value: OptValue,
}

impl Opt {
  /// Append the wire form of this option (header nibbles,
  /// extended delta, extended length, value) to `bytes`
  pub fn extend_bytes(self, bytes: &mut impl Extend<u8>) {
    let (delta_nibble, delta_ext) = crate::to_bytes::opt_len_or_delta(self.delta.0);
    let (len_nibble, len_ext) = crate::to_bytes::opt_len_or_delta(self.value.0.len() as u32);

    bytes.extend(Some((delta_nibble << 4) | len_nibble));
    bytes.extend(delta_ext.into_iter().flatten());
    bytes.extend(len_ext.into_iter().flatten());
    bytes.extend(self.value.0);
  }

  /// Number of bytes this option occupies on the wire
  pub fn wire_size(&self) -> usize {
    let ext_size = |n: u32| match n {
      | n if n >= 269 => 2,
      | n if n >= 13 => 1,
      | _ => 0,
    };

    1 + ext_size(self.delta.0) + ext_size(self.value.0.len() as u32) + self.value.0.len()
  }
}

/// Difference between an option's number and the number of the option before it
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct OptDelta(pub u32);

/// An option number.
///
/// The low bits of the number say how a recipient that doesn't
/// know the option must treat it
/// ([RFC 7252 section 5.4.6](https://www.rfc-editor.org/rfc/rfc7252#section-5.4.6)).
///
/// ```
/// use ribbit_msg::OptNumber;
///
/// let uri_host = OptNumber(3);
/// assert!(uri_host.is_critical());
/// assert!(uri_host.is_unsafe());
///
/// let size1 = OptNumber(60);
/// assert!(!size1.is_critical());
/// assert!(size1.is_no_cache_key());
/// ```
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct OptNumber(pub u32);

impl OptNumber {
  /// Odd numbers are critical: a message carrying one we don't
  /// understand must be rejected rather than processed.
  pub fn is_critical(&self) -> bool {
    self.0 & 0b1 == 1
  }

  /// A proxy that doesn't understand this option must not forward it
  pub fn is_unsafe(&self) -> bool {
    self.0 & 0b10 != 0
  }

  /// Safe-to-forward options with bits 2..5 all set are left out of
  /// a proxy's cache key
  pub fn is_no_cache_key(&self) -> bool {
    (self.0 >> 2) & 0b111 == 0b111
  }
}

/// An option's value: empty, an unsigned integer in as few big-endian
/// bytes as possible, UTF-8 text or opaque bytes, depending on the option.
#[derive(Default, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct OptValue(pub Vec<u8>);

impl OptValue {
  /// Encode an integer using the fewest bytes possible.
  ///
  /// Leading zero bytes are never emitted, and `0` is encoded as
  /// the empty value.
  ///
  /// ```
  /// use ribbit_msg::OptValue;
  ///
  /// assert_eq!(OptValue::uint(0).0, Vec::<u8>::new());
  /// assert_eq!(OptValue::uint(60).0, vec![60]);
  /// assert_eq!(OptValue::uint(256).0, vec![1, 0]);
  /// ```
  pub fn uint(n: u64) -> Self {
    let bytes = n.to_be_bytes();
    let leading_zeros = bytes.iter().take_while(|b| **b == 0).count();
    Self(bytes[leading_zeros..].to_vec())
  }

  /// Read this value as a big-endian unsigned integer.
  ///
  /// Yields `None` if the value is longer than 8 bytes.
  pub fn as_uint(&self) -> Option<u64> {
    if self.0.len() > 8 {
      None
    } else {
      Some(self.0.iter().fold(0u64, |n, b| (n << 8) | (*b as u64)))
    }
  }

  /// Create a value from UTF-8 text
  pub fn string(s: &str) -> Self {
    Self(s.as_bytes().to_vec())
  }

  /// Read this value as UTF-8 text
  pub fn as_str(&self) -> Option<&str> {
    core::str::from_utf8(&self.0).ok()
  }

  /// Read this value as raw bytes
  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }
}

impl<Bytes: AsRef<[u8]>> TryConsumeBytes<Bytes> for Opt {
  type Error = OptParseError;

  fn try_consume_bytes(bytes: &mut Cursor<Bytes>) -> Result<Self, Self::Error> {
    let head = match bytes.next() {
      | None | Some(0xFF) => return Err(OptParseError::OptionsExhausted),
      | Some(b) => b,
    };

    // extended delta bytes precede extended length bytes
    let delta = OptDelta(parse_opt_len_or_delta(head >> 4,
                                                bytes,
                                                OptParseError::OptionDeltaReservedValue(15))?);
    let len = parse_opt_len_or_delta(head & 0x0F,
                                     bytes,
                                     OptParseError::ValueLengthReservedValue(15))?
              as usize;

    let value = bytes.take_exact(len)
                     .ok_or(OptParseError::UnexpectedEndOfStream)?
                     .to_vec();

    Ok(Opt { delta,
             value: OptValue(value) })
  }
}

/// Turn an [`OptionMap`] into the sequence of delta-encoded [`Opt`]s
/// it is serialized as, in ascending option number order.
///
/// ```
/// use ribbit_msg::{opts_with_deltas, OptNumber, OptValue, OptionMap};
///
/// let mut opts = OptionMap::new();
/// opts.insert(OptNumber(11), vec![OptValue::string("a"), OptValue::string("b")]);
/// opts.insert(OptNumber(1), vec![OptValue(vec![])]);
/// opts.insert(OptNumber(60), vec![OptValue::uint(12)]);
///
/// let deltas = opts_with_deltas(&opts).map(|o| o.delta.0).collect::<Vec<_>>();
/// assert_eq!(deltas, vec![1, 10, 0, 49]);
/// ```
pub fn opts_with_deltas(opts: &OptionMap) -> impl Iterator<Item = Opt> + '_ {
  let mut prev = 0u32;
  opts.iter()
      .flat_map(|(num, values)| values.iter().map(move |v| (*num, v)))
      .map(move |(num, value)| {
        let delta = OptDelta(num.0 - prev);
        prev = num.0;
        Opt { delta,
              value: value.clone() }
      })
}
