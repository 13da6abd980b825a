use ribbit_msg::Code;

use crate::code;

/// Request method
///
/// ```
/// use ribbit::req::Method;
///
/// assert_eq!(Method::PUT.to_string(), "PUT");
/// assert_eq!(Method::try_from(ribbit::Code::new(0, 2)), Ok(Method::POST));
/// assert!(Method::try_from(ribbit::Code::new(2, 5)).is_err());
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Method(pub(crate) Code);

impl core::fmt::Display for Method {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self.0 {
      | Code { class: 0, detail: 1 } => write!(f, "GET"),
      | Code { class: 0, detail: 2 } => write!(f, "POST"),
      | Code { class: 0, detail: 3 } => write!(f, "PUT"),
      | Code { class: 0, detail: 4 } => write!(f, "DELETE"),
      | c => write!(f, "{}", c),
    }
  }
}

impl TryFrom<Code> for Method {
  type Error = Code;

  fn try_from(code: Code) -> Result<Self, Self::Error> {
    if code.kind() == ribbit_msg::CodeKind::Request {
      Ok(Method(code))
    } else {
      Err(code)
    }
  }
}

impl Method {
  code!(rfc7252("5.8.1") GET    = Method(0 * 01));
  code!(rfc7252("5.8.2") POST   = Method(0 * 02));
  code!(rfc7252("5.8.3") PUT    = Method(0 * 03));
  code!(rfc7252("5.8.4") DELETE = Method(0 * 04));

  /// The code of request messages using this method
  pub fn code(&self) -> Code {
    self.0
  }
}
