use std::net::SocketAddr;

use embedded_time::duration::Milliseconds;
use ribbit_msg::{Message, MessageOptions, OptionMap, Payload, Type};

use crate::time::Millis;

/// Response codes
pub mod code;

/// A response to a request we sent.
///
/// Besides the message itself, a `Resp` knows who sent it, how long after
/// the (latest) transmission of its request it arrived, and whether it
/// is the last response the request will get.
///
/// Notifications of an observed resource are `Resp`s that are not
/// [`last`](Resp::is_last); a response without an Observe option
/// ends the relation.
///
/// ```
/// use ribbit::req::Req;
/// use ribbit::resp::{code, Resp};
/// use ribbit::MessageOptions;
///
/// let req = Req::get("127.0.0.1:5683".parse().unwrap(), "hello");
/// let mut resp = Resp::for_request(req.msg(), req.dest()).unwrap();
/// resp.set_code(code::CONTENT);
/// resp.set_payload("hi!");
///
/// assert_eq!(resp.payload_str(), Some("hi!"));
/// assert!(resp.is_last());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Resp {
  msg: Message,
  source: SocketAddr,
  rtt: Millis,
  last: bool,
}

impl Resp {
  pub(crate) fn new(msg: Message, source: SocketAddr, rtt: Millis, last: bool) -> Self {
    Self { msg,
           source,
           rtt,
           last }
  }

  /// Create a response to a request message, as a server would.
  ///
  /// CON requests get a piggybacked ACK response, NON requests a NON response;
  /// either way the token is copied from the request and the code defaults to 2.05.
  /// Yields `None` for messages that are not requests.
  pub fn for_request(req: &Message, source: SocketAddr) -> Option<Self> {
    if !req.is_request() {
      return None;
    }

    let ty = match req.ty {
      | Type::Con => Type::Ack,
      | _ => Type::Non,
    };

    let mut msg = Message::new(ty, code::CONTENT);
    msg.token = req.token;
    if ty == Type::Ack {
      msg.id = req.id;
    }

    Some(Self::new(msg, source, Milliseconds(0), true))
  }

  /// The response's code
  pub fn code(&self) -> ribbit_msg::Code {
    self.msg.code
  }

  /// Change the response code
  pub fn set_code(&mut self, code: ribbit_msg::Code) {
    self.msg.code = code;
  }

  /// Message type of the response (a piggybacked response is an ACK)
  pub fn ty(&self) -> Type {
    self.msg.ty
  }

  /// Response payload
  pub fn payload(&self) -> &[u8] {
    &self.msg.payload.0
  }

  /// Response payload, if it is UTF-8
  pub fn payload_str(&self) -> Option<&str> {
    self.msg.payload_str()
  }

  /// Replace the payload
  pub fn set_payload(&mut self, payload: impl Into<Vec<u8>>) {
    self.msg.payload = Payload(payload.into());
  }

  /// Address the response came from
  pub fn source(&self) -> SocketAddr {
    self.source
  }

  /// Time between the last transmission of the request and
  /// the arrival of this response
  pub fn rtt(&self) -> Millis {
    self.rtt
  }

  /// Is this the final response to the request?
  ///
  /// `false` for notifications of an observation that is still active.
  pub fn is_last(&self) -> bool {
    self.last
  }

  /// Observe sequence number, if this is a notification
  pub fn notification_seq(&self) -> Option<u32> {
    self.msg.observe()
  }

  /// Borrow the underlying message
  pub fn msg(&self) -> &Message {
    &self.msg
  }

  /// Take the underlying message
  pub fn into_msg(self) -> Message {
    self.msg
  }
}

impl MessageOptions for Resp {
  fn opts(&self) -> &OptionMap {
    &self.msg.opts
  }

  fn opts_mut(&mut self) -> &mut OptionMap {
    &mut self.msg.opts
  }
}

#[cfg(test)]
mod tests {
  use ribbit_msg::{Code, Id, Token};

  use super::*;
  use crate::test::peer;

  #[test]
  fn for_con_request_is_piggybacked() {
    let mut req = Message::new(Type::Con, Code::GET);
    req.id = Id(12);
    req.token = Token::try_from_slice(&[1, 2]).unwrap();

    let resp = Resp::for_request(&req, peer(5683)).unwrap();
    assert_eq!(resp.ty(), Type::Ack);
    assert_eq!(resp.msg().id, Id(12));
    assert_eq!(resp.msg().token, req.token);
    assert_eq!(resp.code(), code::CONTENT);
  }

  #[test]
  fn for_non_request() {
    let req = Message::new(Type::Non, Code::GET);
    let resp = Resp::for_request(&req, peer(5683)).unwrap();
    assert_eq!(resp.ty(), Type::Non);
  }

  #[test]
  fn not_for_responses() {
    let not_req = Message::new(Type::Con, code::CONTENT);
    assert!(Resp::for_request(&not_req, peer(5683)).is_none());
  }
}
