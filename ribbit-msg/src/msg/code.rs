use toad_macros::rfc_7252_doc;

/// # Message Code
/// 8-bit unsigned integer, split into a 3-bit class (most
/// significant bits) and a 5-bit detail (least significant bits),
/// documented as "c.dd" where "c" is a digit from 0 to 7 for the
/// 3-bit subfield and "dd" are two digits from 00 to 31 for the
/// 5-bit subfield.
///
/// The class can indicate a request (0), a success response (2),
/// a client error response (4), or a server error response (5).
/// (All other class values are reserved.)
///
/// As a special case, Code 0.00 indicates an Empty message.
///
/// ```
/// use ribbit_msg::Code;
///
/// let content = Code::new(2, 5);
/// assert_eq!(u8::from(content), 69);
/// assert_eq!(Code::from(69u8), content);
/// assert_eq!(content.to_string(), "2.05");
/// ```
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct Code {
  /// The "class" of message codes identify it as a request or response, and provides the class of response status:
  ///
  /// |class|meaning|
  /// |---|---|
  /// |`0`|Message is a request|
  /// |`2`|Message is a success response|
  /// |`4`|Message is a client error response|
  /// |`5`|Message is a server error response|
  pub class: u8,

  /// 2-digit integer (range `[0, 32)`) that provides granular information about the response status.
  ///
  /// Will always be `0` for requests.
  pub detail: u8,
}

/// Whether a code is for a request, response, or empty message
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum CodeKind {
  /// A request code (0.xx)
  Request,
  /// A response code ([2-5].xx)
  Response,
  /// EMPTY (0.00)
  Empty,
  /// A class CoAP over UDP does not define (1, 6, 7)
  Reserved,
}

impl Code {
  /// Create a new Code
  ///
  /// ```
  /// use ribbit_msg::Code;
  ///
  /// let content = Code::new(2, 05);
  /// ```
  pub const fn new(class: u8, detail: u8) -> Self {
    Self { class, detail }
  }

  /// 0.00, the code of Empty messages (bare ACK, RST & CoAP ping)
  pub const EMPTY: Self = Self::new(0, 0);

  #[doc = rfc_7252_doc!("5.8.1")]
  pub const GET: Self = Self::new(0, 1);

  #[doc = rfc_7252_doc!("5.8.2")]
  pub const POST: Self = Self::new(0, 2);

  #[doc = rfc_7252_doc!("5.8.3")]
  pub const PUT: Self = Self::new(0, 3);

  #[doc = rfc_7252_doc!("5.8.4")]
  pub const DELETE: Self = Self::new(0, 4);

  /// Get the human string representation of a message code
  ///
  /// # Returns
  /// A `char` array
  ///
  /// This is to avoid unnecessary heap allocation,
  /// you can create a `String` with `FromIterator::<String>::from_iter`,
  /// or if the `std` feature is enabled you can use the `to_string` method.
  ///
  /// ```
  /// use ribbit_msg::Code;
  ///
  /// let code = Code { class: 2,
  ///                   detail: 5 };
  /// let chars = code.to_human();
  /// let string = String::from_iter(chars);
  /// assert_eq!(string, "2.05".to_string());
  /// ```
  pub fn to_human(&self) -> [char; 4] {
    let to_char = |d: u8| char::from_digit(d.into(), 10).unwrap_or('?');
    [to_char(self.class),
     '.',
     to_char(self.detail / 10),
     to_char(self.detail % 10)]
  }

  /// Get whether this code is for a request, response, or empty message
  ///
  /// ```
  /// use ribbit_msg::{Code, CodeKind};
  ///
  /// let empty: Code = Code::new(0, 0);
  /// assert_eq!(empty.kind(), CodeKind::Empty);
  ///
  /// let req = Code::new(0, 1); // GET
  /// assert_eq!(req.kind(), CodeKind::Request);
  ///
  /// let resp = Code::new(2, 5); // OK CONTENT
  /// assert_eq!(resp.kind(), CodeKind::Response);
  /// ```
  pub fn kind(&self) -> CodeKind {
    match self.class {
      | 0 if self.detail == 0 => CodeKind::Empty,
      | 0 => CodeKind::Request,
      | 2..=5 => CodeKind::Response,
      | _ => CodeKind::Reserved,
    }
  }

  /// 2.xx
  pub fn is_success(&self) -> bool {
    self.class == 2
  }

  /// 4.xx
  pub fn is_client_error(&self) -> bool {
    self.class == 4
  }

  /// 5.xx
  pub fn is_server_error(&self) -> bool {
    self.class == 5
  }
}

impl core::fmt::Display for Code {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    self.to_human().iter().try_for_each(|c| write!(f, "{}", c))
  }
}

impl From<u8> for Code {
  fn from(b: u8) -> Self {
    // xxx => class
    let class = b >> 5;

    // xxxxx => detail
    let detail = b & 0b0011111;

    Code { class, detail }
  }
}

impl From<Code> for u8 {
  fn from(code: Code) -> u8 {
    let class = code.class << 5;
    let detail = code.detail & 0b0011111;

    class | detail
  }
}
