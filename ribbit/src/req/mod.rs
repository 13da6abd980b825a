use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use ribbit_msg::{Id, Message, MessageOptions, OptionMap, Payload, SetError, Token, Type};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::{Host, Url};

/// Request methods
pub mod method;

#[doc(inline)]
pub use method::Method;

/// Building requests fluently
pub mod builder;

#[doc(inline)]
pub use builder::*;

/// Default CoAP port
pub const DEFAULT_PORT: u16 = 5683;

/// Errors encounterable turning a URI into a [`Req`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriError {
  /// The string was not a URI
  Parse(url::ParseError),
  /// Only `coap://` URIs can be requested directly
  UnsupportedScheme(String),
  /// The URI has no host
  MissingHost,
  /// The host could not be resolved to an IP address
  UnresolvableHost(String),
  /// A host, path segment or query parameter was not a valid option value
  Option(SetError),
  /// A path segment or query parameter was not UTF-8 once percent-decoded
  NotUtf8(String),
}

impl From<SetError> for UriError {
  fn from(e: SetError) -> Self {
    UriError::Option(e)
  }
}

/// A request that has been, or will be, sent to `dest`.
///
/// The message id and token are assigned by the
/// [`Endpoint`](crate::core::Endpoint) when the request is sent,
/// unless a token was set explicitly.
///
/// Requests to multicast addresses are always non-confirmable.
///
/// A path segment that cannot be a Uri-Path option (longer than 255 bytes)
/// makes the request invalid: see [`Req::check`]. The endpoint refuses to send it.
///
/// ```
/// use ribbit::req::{Method, Req};
/// use ribbit::MessageOptions;
///
/// let req = Req::from_uri(Method::GET, "coap://127.0.0.1:1234/sensors/temp?unit=c").unwrap();
///
/// assert_eq!(req.dest(), "127.0.0.1:1234".parse().unwrap());
/// assert_eq!(req.uri_path_string(), "sensors/temp");
/// assert_eq!(req.uri_query(), vec!["unit=c"]);
/// assert_eq!(req.id(), None);
/// assert_eq!(req.uri().unwrap().as_str(), "coap://127.0.0.1:1234/sensors/temp?unit=c");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Req {
  msg: Message,
  dest: SocketAddr,
  multicast: bool,
  id: Option<Id>,
  token: Option<Token>,
  invalid: Option<SetError>,
}

impl Req {
  /// Create a confirmable request for the resource at `path` on `dest`.
  ///
  /// A segment too long for Uri-Path is not added; see [`Req::check`].
  pub fn new(method: Method, dest: SocketAddr, path: impl AsRef<str>) -> Self {
    let multicast = dest.ip().is_multicast();
    let ty = if multicast { Type::Non } else { Type::Con };

    let mut msg = Message::new(ty, method.code());
    let invalid = path.as_ref()
                      .split('/')
                      .filter(|seg| !seg.is_empty())
                      .try_for_each(|seg| msg.add_uri_path(seg))
                      .err();

    Self { msg,
           dest,
           multicast,
           id: None,
           token: None,
           invalid }
  }

  /// Create a request for `path` on `dest`, failing if
  /// any segment of `path` is not a legal Uri-Path
  pub fn try_new(method: Method, dest: SocketAddr, path: impl AsRef<str>) -> Result<Self, SetError> {
    let req = Self::new(method, dest, path);
    req.check().map(|_| req)
  }

  /// Why the request cannot be sent, if it can't.
  ///
  /// ```
  /// use ribbit::req::Req;
  ///
  /// let dest = "127.0.0.1:5683".parse().unwrap();
  /// assert!(Req::get(dest, "a/b").check().is_ok());
  /// assert!(Req::get(dest, "a/".to_string() + &"b".repeat(256)).check().is_err());
  /// ```
  pub fn check(&self) -> Result<(), SetError> {
    match self.invalid {
      | Some(e) => Err(e),
      | None => Ok(()),
    }
  }

  /// Creates a new GET request
  pub fn get(dest: SocketAddr, path: impl AsRef<str>) -> Self {
    Self::new(Method::GET, dest, path)
  }

  /// Creates a new POST request
  pub fn post(dest: SocketAddr, path: impl AsRef<str>) -> Self {
    Self::new(Method::POST, dest, path)
  }

  /// Creates a new PUT request
  pub fn put(dest: SocketAddr, path: impl AsRef<str>) -> Self {
    Self::new(Method::PUT, dest, path)
  }

  /// Creates a new DELETE request
  pub fn delete(dest: SocketAddr, path: impl AsRef<str>) -> Self {
    Self::new(Method::DELETE, dest, path)
  }

  /// Create a request from a `coap://` URI.
  ///
  /// Host names are resolved with the system resolver and
  /// sent along in a Uri-Host option; IP literals are not.
  pub fn from_uri(method: Method, uri: &str) -> Result<Self, UriError> {
    let url = Url::parse(uri).map_err(UriError::Parse)?;

    if url.scheme() != "coap" {
      return Err(UriError::UnsupportedScheme(url.scheme().to_string()));
    }

    let port = url.port().unwrap_or(DEFAULT_PORT);
    let (ip, host_name) = match url.host().ok_or(UriError::MissingHost)? {
      | Host::Ipv4(ip) => (IpAddr::V4(ip), None),
      | Host::Ipv6(ip) => (IpAddr::V6(ip), None),
      | Host::Domain(d) => match d.parse::<IpAddr>() {
        | Ok(ip) => (ip, None),
        | Err(_) => (resolve(d, port)?, Some(d.to_string())),
      },
    };

    let mut req = Self::new(method, SocketAddr::new(ip, port), "");

    if let Some(host) = host_name {
      req.msg.set_uri_host(&host)?;
    }

    url.path_segments()
       .into_iter()
       .flatten()
       .filter(|seg| !seg.is_empty())
       .try_for_each(|seg| {
         req.msg
            .add_uri_path(&percent_decode(seg)?)
            .map_err(UriError::from)
       })?;

    url.query()
       .into_iter()
       .flat_map(|q| q.split('&'))
       .filter(|param| !param.is_empty())
       .try_for_each(|param| {
         req.msg
            .add_uri_query(&percent_decode(param)?)
            .map_err(UriError::from)
       })?;

    Ok(req)
  }

  /// Reconstruct the URI this request targets
  pub fn uri(&self) -> Result<Url, url::ParseError> {
    let authority = match self.msg.uri_host() {
      | Some(host) => format!("{}:{}", host, self.msg.uri_port().unwrap_or(self.dest.port())),
      | None => self.dest.to_string(),
    };

    let mut url = Url::parse(&format!("coap://{}", authority))?;
    url.set_path(&self.msg
                      .uri_path()
                      .into_iter()
                      .map(percent_encode)
                      .collect::<Vec<_>>()
                      .join("/"));

    let query = self.msg.uri_query();
    if !query.is_empty() {
      url.set_query(Some(&query.into_iter()
                               .map(percent_encode)
                               .collect::<Vec<_>>()
                               .join("&")));
    }

    Ok(url)
  }

  /// The request method
  pub fn method(&self) -> Method {
    Method(self.msg.code)
  }

  /// Where the request is going
  pub fn dest(&self) -> SocketAddr {
    self.dest
  }

  /// Is the request addressed to a multicast group?
  pub fn is_multicast(&self) -> bool {
    self.multicast
  }

  /// Message type the request will be sent as
  pub fn ty(&self) -> Type {
    self.msg.ty
  }

  /// Send this request as non-confirmable; it will not be retransmitted
  pub fn non(&mut self) {
    self.msg.ty = Type::Non;
  }

  /// Send this request as confirmable (the default for unicast requests).
  ///
  /// Has no effect on multicast requests.
  pub fn con(&mut self) {
    if !self.multicast {
      self.msg.ty = Type::Con;
    }
  }

  /// The message id, once the request has been sent
  pub fn id(&self) -> Option<Id> {
    self.id
  }

  /// The token, once the request has been sent or if it was set explicitly
  pub fn token(&self) -> Option<Token> {
    self.token
  }

  /// Use a specific token rather than letting the endpoint generate one
  pub fn set_token(&mut self, token: Token) {
    self.token = Some(token);
    self.msg.token = token;
  }

  /// The request body
  pub fn payload(&self) -> &[u8] {
    &self.msg.payload.0
  }

  /// The request body, if it is UTF-8
  pub fn payload_str(&self) -> Option<&str> {
    self.msg.payload_str()
  }

  /// Replace the request body
  pub fn set_payload(&mut self, payload: impl Into<Vec<u8>>) {
    self.msg.payload = Payload(payload.into());
  }

  /// Borrow the message that will be sent
  pub fn msg(&self) -> &Message {
    &self.msg
  }

  pub(crate) fn assign(&mut self, id: Id, token: Token) {
    self.id = Some(id);
    self.token = Some(token);
    self.msg.id = id;
    self.msg.token = token;
  }
}

impl MessageOptions for Req {
  fn opts(&self) -> &OptionMap {
    &self.msg.opts
  }

  fn opts_mut(&mut self) -> &mut OptionMap {
    &mut self.msg.opts
  }
}

fn resolve(host: &str, port: u16) -> Result<IpAddr, UriError> {
  (host, port).to_socket_addrs()
              .ok()
              .and_then(|mut addrs| addrs.next())
              .map(|addr| addr.ip())
              .ok_or_else(|| UriError::UnresolvableHost(host.to_string()))
}

/// Characters left as-is in a Uri-Path segment or Uri-Query parameter
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-')
                                                  .remove(b'.')
                                                  .remove(b'_')
                                                  .remove(b'~')
                                                  .remove(b'=')
                                                  .remove(b':')
                                                  .remove(b'@');

fn percent_decode(s: &str) -> Result<String, UriError> {
  percent_decode_str(s).decode_utf8()
                       .map(|decoded| decoded.into_owned())
                       .map_err(|_| UriError::NotUtf8(s.to_string()))
}

fn percent_encode(s: &str) -> String {
  utf8_percent_encode(s, URI_COMPONENT).to_string()
}
