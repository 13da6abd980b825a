use std::net::SocketAddr;

use ribbit_msg::{Block, ContentFormat, MessageOptions, ObserveAction, OptNumber, OptValue,
                 SetError, Token};

use super::{Method, Req};

/// Build a request
///
/// The first option that fails validation is remembered,
/// and yielded by [`ReqBuilder::build`].
///
/// ```
/// use ribbit::req::ReqBuilder;
/// use ribbit::resp::Resp;
/// use ribbit::{ContentFormat, MessageOptions};
///
/// let payload = r#"{ "name": "Jameson", "say": "Hello" }"#;
///
/// let request = ReqBuilder::post("127.0.0.1:1234".parse().unwrap(), "say_stuff")
///   .accept(ContentFormat::Text)
///   .content_format(ContentFormat::Json)
///   .payload(payload)
///   .build()
///   .unwrap();
///
/// assert_eq!(request.content_format(), Some(ContentFormat::Json));
/// assert_eq!(request.payload_str(), Some(payload));
///
/// let too_long = ReqBuilder::get("127.0.0.1:1234".parse().unwrap(), "").query(&"x".repeat(300))
///                                                                    .build();
/// assert!(too_long.is_err());
/// ```
#[derive(Clone, Debug)]
pub struct ReqBuilder {
  inner: Result<Req, SetError>,
}

impl ReqBuilder {
  fn new(method: Method, dest: SocketAddr, path: impl AsRef<str>) -> Self {
    Self { inner: Req::try_new(method, dest, path) }
  }

  /// Creates a GET request
  pub fn get(dest: SocketAddr, path: impl AsRef<str>) -> Self {
    Self::new(Method::GET, dest, path)
  }

  /// Creates a PUT request
  pub fn put(dest: SocketAddr, path: impl AsRef<str>) -> Self {
    Self::new(Method::PUT, dest, path)
  }

  /// Creates a POST request
  pub fn post(dest: SocketAddr, path: impl AsRef<str>) -> Self {
    Self::new(Method::POST, dest, path)
  }

  /// Creates a DELETE request
  pub fn delete(dest: SocketAddr, path: impl AsRef<str>) -> Self {
    Self::new(Method::DELETE, dest, path)
  }

  fn try_modify(mut self, f: impl FnOnce(&mut Req) -> Result<(), SetError>) -> Self {
    self.inner = self.inner.and_then(|mut req| f(&mut req).map(|_| req));
    self
  }

  /// Insert or update an option value - use this for non-Repeatable Options.
  pub fn option(self, number: OptNumber, value: OptValue) -> Self {
    self.try_modify(|req| req.set_option(number, value))
  }

  /// Add an instance of a repeatable option
  pub fn add_option(self, number: OptNumber, value: OptValue) -> Self {
    self.try_modify(|req| req.add_option(number, value))
  }

  /// Set the Accept option
  pub fn accept(self, format: ContentFormat) -> Self {
    self.try_modify(|req| req.set_accept(format))
  }

  /// Set the Content-Format of the payload
  pub fn content_format(self, format: ContentFormat) -> Self {
    self.try_modify(|req| req.set_content_format(format))
  }

  /// Add a Uri-Query parameter (e.g. `"rt=temperature"`)
  pub fn query(self, param: &str) -> Self {
    self.try_modify(|req| req.add_uri_query(param))
  }

  /// Register interest in the resource; see [`observe`](crate::observe)
  pub fn observe(self) -> Self {
    self.try_modify(|req| req.set_observe_action(ObserveAction::Register))
  }

  /// Ask the server to respond in blocks of (at most) `size` bytes
  /// from the first response on.
  pub fn block2(self, size: u16) -> Self {
    self.try_modify(|req| req.set_block2(Block::new(size, 0, false)))
  }

  /// Use a specific token
  pub fn token(self, token: Token) -> Self {
    self.try_modify(|req| {
          req.set_token(token);
          Ok(())
        })
  }

  /// Send as non-confirmable
  pub fn non(self) -> Self {
    self.try_modify(|req| {
          req.non();
          Ok(())
        })
  }

  /// Set the request payload
  pub fn payload(self, payload: impl Into<Vec<u8>>) -> Self {
    let payload = payload.into();
    self.try_modify(|req| {
          req.set_payload(payload);
          Ok(())
        })
  }

  /// Finish building, yielding the first error encountered if any
  pub fn build(self) -> Result<Req, SetError> {
    self.inner
  }
}
