use std::net::SocketAddr;

use ribbit_msg::{Id, MessageParseError, MessageToBytesError, SetError, Token};

/// The context that an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
  /// We were polling the socket or timers when the error occurred
  Polling,
  /// We were sending a message
  SendingMessage(Option<SocketAddr>, Id, Token),
  /// No particular context
  None,
}

impl When {
  /// Construct a specific error from the context the error occurred in
  pub fn what<E>(self, what: What<E>) -> Error<E> {
    Error { when: self, what }
  }
}

/// An error encounterable from within an [`Endpoint`](super::Endpoint).
///
/// `E` is the error type of the endpoint's [`Socket`](crate::net::Socket).
#[derive(Debug, Clone, PartialEq)]
pub struct Error<E> {
  /// What happened?
  pub what: What<E>,
  /// What were we doing when it happened?
  pub when: When,
}

impl<E> Error<E> {
  /// Is this error `FromBytes`?
  pub fn message_parse_error(&self) -> Option<&MessageParseError> {
    match self.what {
      | What::FromBytes(ref e) => Some(e),
      | _ => None,
    }
  }

  /// Is this error a socket error?
  pub fn sock_error(&self) -> Option<&E> {
    match self.what {
      | What::SockError(ref e) => Some(e),
      | _ => None,
    }
  }
}

/// A contextless error with some additional debug data attached.
#[derive(Debug, Clone, PartialEq)]
pub enum What<E> {
  /// Some socket operation (e.g. sending a datagram) failed
  SockError(E),
  /// Deserializing a message from bytes failed
  FromBytes(MessageParseError),
  /// Serializing a message to bytes failed
  ToBytes(MessageToBytesError),
  /// The request carried an illegal option (e.g. an overlong path segment),
  /// or one the endpoint adds (Block1, Size1, Observe) could not be set
  InvalidOption(SetError),
  /// The request was given an explicit token that belongs to
  /// another request still in flight
  TokenInUse(Token),
  /// The clock failed to provide timing.
  ///
  /// See [`embedded_time::clock::Error`]
  ClockError,
  /// The exchange is not (or no longer) known to the endpoint
  NotFound,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accessors() {
    let parse = When::Polling.what::<()>(What::FromBytes(MessageParseError::eof()));
    assert_eq!(parse.message_parse_error(),
               Some(&MessageParseError::UnexpectedEndOfStream));
    assert_eq!(parse.sock_error(), None);

    let sock = When::None.what(What::SockError("refused"));
    assert_eq!(sock.sock_error(), Some(&"refused"));
    assert_eq!(sock.when, When::None);
  }
}
