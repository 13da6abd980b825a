use crate::{Field, OptNumber, OptValue, SetError};

/// Content-Format values
pub mod content_format;
pub use content_format::*;

/// Block1 & Block2 values
pub mod block;
pub use block::*;

/// Observe values
pub mod observe;
pub use observe::*;

/// The format of an option's value, used to validate
/// and interpret its raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptionFormat {
  /// A zero-length sequence of bytes
  Empty,
  /// An opaque sequence of bytes
  Opaque,
  /// A non-negative integer in network byte order, using the fewest bytes possible
  Uint,
  /// A UTF-8 string
  String,
}

/// Everything this crate knows about an option number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionDef {
  /// The option number
  pub number: OptNumber,
  /// The option's name as it appears in the registry (e.g. `"Uri-Path"`)
  pub name: &'static str,
  /// Value format
  pub format: OptionFormat,
  /// Minimum length of the value, in bytes
  pub min_len: usize,
  /// Maximum length of the value, in bytes
  pub max_len: usize,
  /// May the option occur more than once in a message?
  pub repeatable: bool,
  /// Value the option takes when absent.
  ///
  /// Options set to their default are not serialized.
  pub default: Option<u64>,
}

macro_rules! known_opts {
  ($(#[doc = $doc:expr]
     $name:ident = $n:literal, $str:literal, $fmt:ident, $min:literal..=$max:literal, repeat: $rep:literal, default: $default:expr;)*) => {
    /// Option numbers registered by RFC 7252, RFC 7641 & RFC 7959
    pub mod number {
      $(
        #[doc = $doc]
        pub const $name: crate::OptNumber = crate::OptNumber($n);
      )*
    }

    /// All options known to this crate, in ascending order
    pub const KNOWN: &[OptionDef] = &[$(OptionDef { number: OptNumber($n),
                                                    name: $str,
                                                    format: OptionFormat::$fmt,
                                                    min_len: $min,
                                                    max_len: $max,
                                                    repeatable: $rep,
                                                    default: $default }),*];
  };
}

known_opts! {
  #[doc = toad_macros::rfc_7252_doc!("5.10.8.1")]
  IF_MATCH = 1, "If-Match", Opaque, 0..=8, repeat: true, default: None;
  #[doc = toad_macros::rfc_7252_doc!("5.10.1")]
  URI_HOST = 3, "Uri-Host", String, 1..=255, repeat: false, default: None;
  #[doc = toad_macros::rfc_7252_doc!("5.10.6")]
  ETAG = 4, "ETag", Opaque, 1..=8, repeat: true, default: None;
  #[doc = toad_macros::rfc_7252_doc!("5.10.8.2")]
  IF_NONE_MATCH = 5, "If-None-Match", Empty, 0..=0, repeat: false, default: None;
  #[doc = "[RFC 7641 Observe](https://www.rfc-editor.org/rfc/rfc7641#section-2)"]
  OBSERVE = 6, "Observe", Uint, 0..=3, repeat: false, default: None;
  #[doc = "See [`URI_HOST`]"]
  URI_PORT = 7, "Uri-Port", Uint, 0..=2, repeat: false, default: None;
  #[doc = toad_macros::rfc_7252_doc!("5.10.7")]
  LOCATION_PATH = 8, "Location-Path", String, 0..=255, repeat: true, default: None;
  #[doc = "See [`URI_HOST`]"]
  URI_PATH = 11, "Uri-Path", String, 0..=255, repeat: true, default: None;
  #[doc = toad_macros::rfc_7252_doc!("5.10.3")]
  CONTENT_FORMAT = 12, "Content-Format", Uint, 0..=2, repeat: false, default: None;
  #[doc = toad_macros::rfc_7252_doc!("5.10.5")]
  MAX_AGE = 14, "Max-Age", Uint, 0..=4, repeat: false, default: Some(60);
  #[doc = "See [`URI_HOST`]"]
  URI_QUERY = 15, "Uri-Query", String, 0..=255, repeat: true, default: None;
  #[doc = toad_macros::rfc_7252_doc!("5.10.4")]
  ACCEPT = 17, "Accept", Uint, 0..=2, repeat: false, default: None;
  #[doc = "See [`LOCATION_PATH`]"]
  LOCATION_QUERY = 20, "Location-Query", String, 0..=255, repeat: true, default: None;
  #[doc = "[RFC 7959 Block2](https://www.rfc-editor.org/rfc/rfc7959#section-2.2)"]
  BLOCK2 = 23, "Block2", Uint, 0..=3, repeat: false, default: None;
  #[doc = "[RFC 7959 Block1](https://www.rfc-editor.org/rfc/rfc7959#section-2.2)"]
  BLOCK1 = 27, "Block1", Uint, 0..=3, repeat: false, default: None;
  #[doc = "[RFC 7959 Size2](https://www.rfc-editor.org/rfc/rfc7959#section-4)"]
  SIZE2 = 28, "Size2", Uint, 0..=4, repeat: false, default: None;
  #[doc = toad_macros::rfc_7252_doc!("5.10.2")]
  PROXY_URI = 35, "Proxy-Uri", String, 1..=1034, repeat: false, default: None;
  #[doc = "See [`PROXY_URI`]"]
  PROXY_SCHEME = 39, "Proxy-Scheme", String, 1..=255, repeat: false, default: None;
  #[doc = toad_macros::rfc_7252_doc!("5.10.9")]
  SIZE1 = 60, "Size1", Uint, 0..=4, repeat: false, default: None;
}

impl OptionDef {
  /// Find the definition of an option number
  ///
  /// ```
  /// use ribbit_msg::{number, OptionDef, OptionFormat};
  ///
  /// let max_age = OptionDef::lookup(number::MAX_AGE).unwrap();
  /// assert_eq!(max_age.name, "Max-Age");
  /// assert_eq!(max_age.format, OptionFormat::Uint);
  /// assert_eq!(max_age.default, Some(60));
  ///
  /// assert!(OptionDef::lookup(ribbit_msg::OptNumber(2)).is_none());
  /// ```
  pub fn lookup(number: OptNumber) -> Option<&'static OptionDef> {
    KNOWN.binary_search_by_key(&number, |def| def.number)
         .ok()
         .map(|ix| &KNOWN[ix])
  }

  /// Is `value` this option's default (and so should not be serialized)?
  pub fn is_default(&self, value: &OptValue) -> bool {
    match (self.default, self.format) {
      | (Some(default), OptionFormat::Uint) => value.as_uint() == Some(default),
      | _ => false,
    }
  }

  /// Check that `value` is a legal value for this option
  pub fn validate(&self, value: &OptValue) -> Result<(), SetError> {
    let len = value.0.len();
    if len < self.min_len || len > self.max_len {
      return Err(SetError::ValueOutOfRange { field: Field::Option(self.number),
                                             actual: len as u64,
                                             min: self.min_len as u64,
                                             max: self.max_len as u64 });
    }

    match self.format {
      | OptionFormat::String if value.as_str().is_none() => {
        Err(SetError::InvalidArgument { field: Field::Option(self.number),
                                        reason: "value is not valid UTF-8" })
      },
      | OptionFormat::Uint if value.0.first() == Some(&0) => {
        Err(SetError::InvalidArgument { field: Field::Option(self.number),
                                        reason: "integer has a leading zero byte" })
      },
      | _ => Ok(()),
    }
  }
}

/// Is this option number one this crate knows how to interpret?
pub fn is_known(number: OptNumber) -> bool {
  OptionDef::lookup(number).is_some()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn table_is_sorted() {
    assert!(KNOWN.windows(2).all(|w| w[0].number < w[1].number));
  }

  #[test]
  fn numbers() {
    assert_eq!(number::IF_MATCH, OptNumber(1));
    assert_eq!(number::URI_HOST, OptNumber(3));
    assert_eq!(number::ETAG, OptNumber(4));
    assert_eq!(number::OBSERVE, OptNumber(6));
    assert_eq!(number::URI_PATH, OptNumber(11));
    assert_eq!(number::CONTENT_FORMAT, OptNumber(12));
    assert_eq!(number::MAX_AGE, OptNumber(14));
    assert_eq!(number::URI_QUERY, OptNumber(15));
    assert_eq!(number::ACCEPT, OptNumber(17));
    assert_eq!(number::BLOCK2, OptNumber(23));
    assert_eq!(number::BLOCK1, OptNumber(27));
    assert_eq!(number::SIZE2, OptNumber(28));
    assert_eq!(number::PROXY_URI, OptNumber(35));
    assert_eq!(number::PROXY_SCHEME, OptNumber(39));
    assert_eq!(number::SIZE1, OptNumber(60));
  }

  #[test]
  fn validate() {
    let if_match = OptionDef::lookup(number::IF_MATCH).unwrap();
    assert!(if_match.validate(&OptValue(vec![0; 8])).is_ok());
    assert_eq!(if_match.validate(&OptValue(vec![0; 9])),
               Err(SetError::ValueOutOfRange { field: Field::Option(number::IF_MATCH),
                                               actual: 9,
                                               min: 0,
                                               max: 8 }));

    let host = OptionDef::lookup(number::URI_HOST).unwrap();
    assert!(host.validate(&OptValue(vec![])).is_err());
    assert!(host.validate(&OptValue(vec![0xff, 0xfe])).is_err());

    let max_age = OptionDef::lookup(number::MAX_AGE).unwrap();
    assert!(max_age.is_default(&OptValue::uint(60)));
    assert!(!max_age.is_default(&OptValue::uint(61)));
  }
}
