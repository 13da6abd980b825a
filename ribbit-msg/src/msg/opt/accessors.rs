use std_alloc::string::String;
use std_alloc::vec::Vec;

use super::known::{number, Block, ContentFormat, ObserveAction, OptionDef, MAX_OBSERVE_SEQ};
use super::{OptNumber, OptValue, OptionMap};
use crate::{Field, SetError};

fn uint_value(number: OptNumber, n: u64, max: u64) -> Result<OptValue, SetError> {
  if n > max {
    Err(SetError::ValueOutOfRange { field: Field::Option(number),
                                    actual: n,
                                    min: 0,
                                    max })
  } else {
    Ok(OptValue::uint(n))
  }
}

/// Operations & typed accessors for the options of a message.
///
/// Implementors only need to provide access to their [`OptionMap`];
/// every accessor is written in terms of [`MessageOptions::opts`] and [`MessageOptions::opts_mut`].
///
/// Setters validate values against the option registry ([`OptionDef`]) and fail
/// with [`SetError`] without modifying the message when a value is illegal.
///
/// ```
/// use ribbit_msg::{number, Code, Message, MessageOptions, OptValue, Type};
///
/// let mut msg = Message::new(Type::Con, Code::GET);
/// msg.add_uri_path("a").unwrap();
/// msg.add_uri_path("b").unwrap();
/// msg.set_max_age(30).unwrap();
///
/// assert_eq!(msg.get_options(number::URI_PATH).len(), 2);
/// assert_eq!(msg.uri_path_string(), "a/b");
/// assert_eq!(msg.max_age(), 30);
///
/// msg.remove_options(number::MAX_AGE);
/// assert_eq!(msg.max_age(), 60);
/// ```
pub trait MessageOptions {
  /// Borrow the options of this message
  fn opts(&self) -> &OptionMap;

  /// Mutably borrow the options of this message
  fn opts_mut(&mut self) -> &mut OptionMap;

  /// Add a value for an option, after any existing values for the same number.
  ///
  /// Values for known options are validated, and adding a second value
  /// for a non-repeatable option is an [`SetError::InvalidArgument`].
  /// Unknown options are stored as-is.
  fn add_option(&mut self, number: OptNumber, value: OptValue) -> Result<(), SetError> {
    if let Some(def) = OptionDef::lookup(number) {
      def.validate(&value)?;

      if !def.repeatable && self.has_option(number) {
        return Err(SetError::InvalidArgument { field: Field::Option(number),
                                               reason: "option is not repeatable" });
      }
    }

    self.opts_mut().entry(number).or_default().push(value);
    Ok(())
  }

  /// Replace all values of an option with a single value
  fn set_option(&mut self, number: OptNumber, value: OptValue) -> Result<(), SetError> {
    if let Some(def) = OptionDef::lookup(number) {
      def.validate(&value)?;
    }

    self.opts_mut().insert(number, Vec::from([value]));
    Ok(())
  }

  /// Remove all values of an option, yielding them if there were any
  fn remove_options(&mut self, number: OptNumber) -> Option<Vec<OptValue>> {
    self.opts_mut().remove(&number)
  }

  /// All values of an option, in insertion order
  fn get_options(&self, number: OptNumber) -> &[OptValue] {
    self.opts().get(&number).map(|vs| vs.as_slice()).unwrap_or(&[])
  }

  /// The first value of an option
  fn get_option(&self, number: OptNumber) -> Option<&OptValue> {
    self.get_options(number).first()
  }

  /// Does the message have at least one value for this option?
  fn has_option(&self, number: OptNumber) -> bool {
    !self.get_options(number).is_empty()
  }

  /// First critical option that is not in the option registry.
  ///
  /// A message carrying one of these must be rejected by the receiver.
  fn unrecognized_critical(&self) -> Option<OptNumber> {
    self.opts()
        .keys()
        .copied()
        .find(|n| n.is_critical() && OptionDef::lookup(*n).is_none())
  }

  /// Read a uint option
  ///
  /// Values longer than a known option allows read as absent.
  fn get_uint(&self, number: OptNumber) -> Option<u64> {
    let max_len = OptionDef::lookup(number).map_or(8, |def| def.max_len);
    self.get_option(number)
        .filter(|v| v.0.len() <= max_len)
        .and_then(OptValue::as_uint)
  }

  /// Read all values of a string option, skipping any that aren't UTF-8
  fn get_strs(&self, number: OptNumber) -> Vec<&str> {
    self.get_options(number)
        .iter()
        .filter_map(OptValue::as_str)
        .collect()
  }

  /// If-Match values
  fn if_match(&self) -> &[OptValue] {
    self.get_options(number::IF_MATCH)
  }

  /// Add an If-Match value (at most 8 bytes)
  fn add_if_match(&mut self, etag: &[u8]) -> Result<(), SetError> {
    self.add_option(number::IF_MATCH, OptValue(etag.to_vec()))
  }

  /// Uri-Host
  fn uri_host(&self) -> Option<&str> {
    self.get_option(number::URI_HOST).and_then(OptValue::as_str)
  }

  /// Set Uri-Host (1 to 255 bytes)
  fn set_uri_host(&mut self, host: &str) -> Result<(), SetError> {
    self.set_option(number::URI_HOST, OptValue::string(host))
  }

  /// ETag values
  fn etags(&self) -> &[OptValue] {
    self.get_options(number::ETAG)
  }

  /// Add an ETag (1 to 8 bytes)
  fn add_etag(&mut self, etag: &[u8]) -> Result<(), SetError> {
    self.add_option(number::ETAG, OptValue(etag.to_vec()))
  }

  /// Is If-None-Match present?
  fn if_none_match(&self) -> bool {
    self.has_option(number::IF_NONE_MATCH)
  }

  /// Add or remove If-None-Match
  fn set_if_none_match(&mut self, present: bool) -> Result<(), SetError> {
    if present {
      self.set_option(number::IF_NONE_MATCH, OptValue::default())
    } else {
      self.remove_options(number::IF_NONE_MATCH);
      Ok(())
    }
  }

  /// Observe value (registration action in requests, sequence number in notifications)
  fn observe(&self) -> Option<u32> {
    self.get_uint(number::OBSERVE).map(|n| n as u32)
  }

  /// Set Observe (at most 2^24 - 1)
  fn set_observe(&mut self, seq: u32) -> Result<(), SetError> {
    let value = uint_value(number::OBSERVE, seq as u64, MAX_OBSERVE_SEQ as u64)?;
    self.set_option(number::OBSERVE, value)
  }

  /// Observe interpreted as a request's registration action
  fn observe_action(&self) -> Option<ObserveAction> {
    self.observe().and_then(ObserveAction::from_value)
  }

  /// Ask to register or deregister as an observer
  fn set_observe_action(&mut self, action: ObserveAction) -> Result<(), SetError> {
    self.set_observe(action.value())
  }

  /// Uri-Port
  fn uri_port(&self) -> Option<u16> {
    self.get_uint(number::URI_PORT).map(|n| n as u16)
  }

  /// Set Uri-Port
  fn set_uri_port(&mut self, port: u16) -> Result<(), SetError> {
    self.set_option(number::URI_PORT, OptValue::uint(port as u64))
  }

  /// Location-Path segments
  fn location_path(&self) -> Vec<&str> {
    self.get_strs(number::LOCATION_PATH)
  }

  /// Location-Path segments joined by `/`
  fn location_path_string(&self) -> String {
    self.location_path().join("/")
  }

  /// Add a Location-Path segment (at most 255 bytes)
  fn add_location_path(&mut self, segment: &str) -> Result<(), SetError> {
    self.add_option(number::LOCATION_PATH, OptValue::string(segment))
  }

  /// Uri-Path segments
  fn uri_path(&self) -> Vec<&str> {
    self.get_strs(number::URI_PATH)
  }

  /// Uri-Path segments joined by `/`
  fn uri_path_string(&self) -> String {
    self.uri_path().join("/")
  }

  /// Add a Uri-Path segment (at most 255 bytes)
  fn add_uri_path(&mut self, segment: &str) -> Result<(), SetError> {
    self.add_option(number::URI_PATH, OptValue::string(segment))
  }

  /// Replace Uri-Path with the segments of a `/`-separated path.
  ///
  /// Leading & trailing slashes are ignored. If any segment is too long,
  /// the message is left unchanged.
  fn set_uri_path_string(&mut self, path: &str) -> Result<(), SetError> {
    let segments = path.trim_matches('/')
                       .split('/')
                       .filter(|s| !s.is_empty())
                       .map(OptValue::string)
                       .collect::<Vec<_>>();

    if let Some(def) = OptionDef::lookup(number::URI_PATH) {
      segments.iter().try_for_each(|s| def.validate(s))?;
    }

    self.remove_options(number::URI_PATH);
    if !segments.is_empty() {
      self.opts_mut().insert(number::URI_PATH, segments);
    }
    Ok(())
  }

  /// Content-Format
  fn content_format(&self) -> Option<ContentFormat> {
    self.get_uint(number::CONTENT_FORMAT)
        .map(|n| ContentFormat::from(n as u16))
  }

  /// Set Content-Format
  fn set_content_format(&mut self, format: ContentFormat) -> Result<(), SetError> {
    self.set_option(number::CONTENT_FORMAT,
                    OptValue::uint(u16::from(&format) as u64))
  }

  /// Max-Age in seconds, defaulting to 60 when absent
  fn max_age(&self) -> u32 {
    self.get_uint(number::MAX_AGE).map(|n| n as u32).unwrap_or(60)
  }

  /// Set Max-Age in seconds
  fn set_max_age(&mut self, seconds: u32) -> Result<(), SetError> {
    self.set_option(number::MAX_AGE, OptValue::uint(seconds as u64))
  }

  /// Uri-Query parameters
  fn uri_query(&self) -> Vec<&str> {
    self.get_strs(number::URI_QUERY)
  }

  /// Uri-Query parameters joined by `&`
  fn uri_query_string(&self) -> String {
    self.uri_query().join("&")
  }

  /// Add a Uri-Query parameter (at most 255 bytes)
  fn add_uri_query(&mut self, param: &str) -> Result<(), SetError> {
    self.add_option(number::URI_QUERY, OptValue::string(param))
  }

  /// Accept
  fn accept(&self) -> Option<ContentFormat> {
    self.get_uint(number::ACCEPT)
        .map(|n| ContentFormat::from(n as u16))
  }

  /// Set Accept
  fn set_accept(&mut self, format: ContentFormat) -> Result<(), SetError> {
    self.set_option(number::ACCEPT, OptValue::uint(u16::from(&format) as u64))
  }

  /// Location-Query parameters
  fn location_query(&self) -> Vec<&str> {
    self.get_strs(number::LOCATION_QUERY)
  }

  /// Add a Location-Query parameter (at most 255 bytes)
  fn add_location_query(&mut self, param: &str) -> Result<(), SetError> {
    self.add_option(number::LOCATION_QUERY, OptValue::string(param))
  }

  /// Block2
  fn block2(&self) -> Option<Block> {
    self.get_uint(number::BLOCK2).map(|n| Block::from(n as u32))
  }

  /// Set Block2
  fn set_block2(&mut self, block: Block) -> Result<(), SetError> {
    self.set_option(number::BLOCK2, OptValue::uint(u32::from(block) as u64))
  }

  /// Block1
  fn block1(&self) -> Option<Block> {
    self.get_uint(number::BLOCK1).map(|n| Block::from(n as u32))
  }

  /// Set Block1
  fn set_block1(&mut self, block: Block) -> Result<(), SetError> {
    self.set_option(number::BLOCK1, OptValue::uint(u32::from(block) as u64))
  }

  /// Size2
  fn size2(&self) -> Option<u32> {
    self.get_uint(number::SIZE2).map(|n| n as u32)
  }

  /// Set Size2
  fn set_size2(&mut self, size: u32) -> Result<(), SetError> {
    self.set_option(number::SIZE2, OptValue::uint(size as u64))
  }

  /// Size1
  fn size1(&self) -> Option<u32> {
    self.get_uint(number::SIZE1).map(|n| n as u32)
  }

  /// Set Size1
  fn set_size1(&mut self, size: u32) -> Result<(), SetError> {
    self.set_option(number::SIZE1, OptValue::uint(size as u64))
  }

  /// Proxy-Uri
  fn proxy_uri(&self) -> Option<&str> {
    self.get_option(number::PROXY_URI).and_then(OptValue::as_str)
  }

  /// Set Proxy-Uri (1 to 1034 bytes)
  fn set_proxy_uri(&mut self, uri: &str) -> Result<(), SetError> {
    self.set_option(number::PROXY_URI, OptValue::string(uri))
  }

  /// Proxy-Scheme
  fn proxy_scheme(&self) -> Option<&str> {
    self.get_option(number::PROXY_SCHEME)
        .and_then(OptValue::as_str)
  }

  /// Set Proxy-Scheme (1 to 255 bytes)
  fn set_proxy_scheme(&mut self, scheme: &str) -> Result<(), SetError> {
    self.set_option(number::PROXY_SCHEME, OptValue::string(scheme))
  }
}

impl MessageOptions for OptionMap {
  fn opts(&self) -> &OptionMap {
    self
  }

  fn opts_mut(&mut self) -> &mut OptionMap {
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::TryFromBytes;

  #[test]
  fn length_limits() {
    let mut opts = OptionMap::new();

    let long = "x".repeat(256);
    assert_eq!(opts.add_uri_path(&long),
               Err(SetError::ValueOutOfRange { field: Field::Option(number::URI_PATH),
                                               actual: 256,
                                               min: 0,
                                               max: 255 }));
    assert!(opts.add_uri_path(&long[..255]).is_ok());

    assert!(opts.add_if_match(&[0; 9]).is_err());
    assert!(opts.add_etag(&[]).is_err());
    assert!(opts.set_uri_host("").is_err());
    assert!(opts.set_proxy_uri(&"p".repeat(1035)).is_err());
    assert!(opts.set_proxy_uri(&"p".repeat(1034)).is_ok());
  }

  #[test]
  fn observe_range() {
    let mut opts = OptionMap::new();
    assert!(opts.set_observe(MAX_OBSERVE_SEQ).is_ok());
    assert_eq!(opts.observe(), Some(MAX_OBSERVE_SEQ));
    assert_eq!(opts.set_observe(MAX_OBSERVE_SEQ + 1).map_err(|e| e.field()),
               Err(Field::Option(number::OBSERVE)));
    assert_eq!(opts.observe(), Some(MAX_OBSERVE_SEQ));

    opts.set_observe(0).unwrap();
    assert_eq!(opts.get_option(number::OBSERVE), Some(&OptValue(vec![])));
    assert_eq!(opts.observe(), Some(0));
    assert_eq!(opts.observe_action(), Some(ObserveAction::Register));

    opts.set_observe_action(ObserveAction::Deregister).unwrap();
    assert_eq!(opts.observe(), Some(1));

    opts.set_observe(2).unwrap();
    assert_eq!(opts.observe_action(), None);
  }

  #[test]
  fn oversized_uints_read_as_absent() {
    // CON GET id 1, Block2 (23) with a 4-byte value
    let bytes = [0x40u8, 0x01, 0x00, 0x01, 0xD4, 10, 0x00, 0x00, 0x01, 0x0E];
    let msg = crate::Message::try_from_bytes(bytes).unwrap();

    assert_eq!(msg.get_option(number::BLOCK2).map(|v| v.0.len()), Some(4));
    assert_eq!(msg.block2(), None);

    let mut opts = OptionMap::new();
    opts.insert(number::OBSERVE, vec![OptValue(vec![1, 0, 0, 0])]);
    assert_eq!(opts.observe(), None);
    opts.insert(number::OBSERVE, vec![OptValue(vec![1, 0, 0])]);
    assert_eq!(opts.observe(), Some(0x01_00_00));
  }

  #[test]
  fn not_repeatable() {
    let mut opts = OptionMap::new();
    opts.add_option(number::CONTENT_FORMAT, OptValue::uint(0))
        .unwrap();
    assert!(matches!(opts.add_option(number::CONTENT_FORMAT, OptValue::uint(50)),
                     Err(SetError::InvalidArgument { .. })));

    opts.set_content_format(ContentFormat::Json).unwrap();
    assert_eq!(opts.content_format(), Some(ContentFormat::Json));
  }

  #[test]
  fn uri_path_string() {
    let mut opts = OptionMap::new();
    opts.set_uri_path_string("/.well-known/core/").unwrap();
    assert_eq!(opts.uri_path(), vec![".well-known", "core"]);

    opts.set_uri_path_string("").unwrap();
    assert!(!opts.has_option(number::URI_PATH));

    let bad = format!("ok/{}", "x".repeat(300));
    opts.set_uri_path_string("keep/me").unwrap();
    assert!(opts.set_uri_path_string(&bad).is_err());
    assert_eq!(opts.uri_path_string(), "keep/me");
  }

  #[test]
  fn unrecognized_critical() {
    let mut opts = OptionMap::new();
    opts.add_option(OptNumber(2048), OptValue(vec![1])).unwrap();
    assert_eq!(opts.unrecognized_critical(), None);

    opts.add_option(OptNumber(2049), OptValue(vec![1])).unwrap();
    assert_eq!(opts.unrecognized_critical(), Some(OptNumber(2049)));
  }

  #[test]
  fn blocks() {
    let mut opts = OptionMap::new();
    opts.set_block2(Block::new(64, 3, true)).unwrap();
    assert_eq!(opts.block2(), Some(Block::new(64, 3, true)));
    assert_eq!(opts.block1(), None);

    assert!(opts.set_block1(Block::new(16, 1 << 20, false)).is_err());
  }
}
