/// Content-Format
///
/// Numeric identifiers from the
/// [CoAP Content-Formats registry](https://www.iana.org/assignments/core-parameters/core-parameters.xhtml#content-formats),
/// along with their media types.
///
/// ```
/// use ribbit_msg::ContentFormat;
///
/// assert_eq!(u16::from(&ContentFormat::LinkFormat), 40);
/// assert_eq!(ContentFormat::LinkFormat.mime(), Some("application/link-format"));
/// assert_eq!(ContentFormat::from_mime("application/json"), Some(ContentFormat::Json));
/// assert_eq!(ContentFormat::from(9999u16), ContentFormat::Other(9999));
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContentFormat {
  /// `text/plain; charset=utf-8`
  Text,
  /// `application/link-format`
  LinkFormat,
  /// `application/xml`
  Xml,
  /// `application/octet-stream`
  OctetStream,
  /// `application/exi`
  Exi,
  /// `application/json`
  Json,
  /// `application/cbor`
  Cbor,
  /// Another content format
  Other(u16),
}

const REGISTRY: [(ContentFormat, u16, &str); 7] =
  [(ContentFormat::Text, 0, "text/plain; charset=utf-8"),
   (ContentFormat::LinkFormat, 40, "application/link-format"),
   (ContentFormat::Xml, 41, "application/xml"),
   (ContentFormat::OctetStream, 42, "application/octet-stream"),
   (ContentFormat::Exi, 47, "application/exi"),
   (ContentFormat::Json, 50, "application/json"),
   (ContentFormat::Cbor, 60, "application/cbor")];

impl ContentFormat {
  /// Convert this content format to the CoAP byte value
  pub fn bytes(&self) -> [u8; 2] {
    u16::from(self).to_be_bytes()
  }

  /// The media type of this content format, if it is one we know
  pub fn mime(&self) -> Option<&'static str> {
    REGISTRY.iter()
            .find(|(f, _, _)| f == self)
            .map(|(_, _, mime)| *mime)
  }

  /// Find the content format for a media type.
  ///
  /// Parameters and whitespace around `;` are ignored when comparing,
  /// so `"text/plain;charset=utf-8"` finds [`ContentFormat::Text`].
  pub fn from_mime(mime: &str) -> Option<Self> {
    let normalize = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<std_alloc::string::String>();
    let mime = normalize(mime);

    REGISTRY.iter()
            .find(|(_, _, m)| normalize(m).eq_ignore_ascii_case(&mime))
            .map(|(f, _, _)| *f)
  }
}

impl<'a> From<&'a ContentFormat> for u16 {
  fn from(f: &'a ContentFormat) -> Self {
    match *f {
      | ContentFormat::Other(n) => n,
      | known => REGISTRY.iter()
                         .find(|(f, _, _)| *f == known)
                         .map(|(_, n, _)| *n)
                         .unwrap_or_default(),
    }
  }
}

impl From<u16> for ContentFormat {
  fn from(n: u16) -> Self {
    REGISTRY.iter()
            .find(|(_, id, _)| *id == n)
            .map(|(f, _, _)| *f)
            .unwrap_or(ContentFormat::Other(n))
  }
}

impl<'a> IntoIterator for &'a ContentFormat {
  type Item = u8;

  type IntoIter = <[u8; 2] as IntoIterator>::IntoIter;

  fn into_iter(self) -> Self::IntoIter {
    self.bytes().into_iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn numbers() {
    assert_eq!(u16::from(&ContentFormat::Text), 0);
    assert_eq!(u16::from(&ContentFormat::Xml), 41);
    assert_eq!(u16::from(&ContentFormat::OctetStream), 42);
    assert_eq!(u16::from(&ContentFormat::Exi), 47);
    assert_eq!(u16::from(&ContentFormat::Json), 50);
    assert_eq!(u16::from(&ContentFormat::Cbor), 60);
    assert_eq!(u16::from(&ContentFormat::Other(11542)), 11542);
  }

  #[test]
  fn mime() {
    assert_eq!(ContentFormat::from_mime("text/plain;charset=utf-8"),
               Some(ContentFormat::Text));
    assert_eq!(ContentFormat::from_mime("image/png"), None);
    assert_eq!(ContentFormat::Other(1).mime(), None);
  }
}
