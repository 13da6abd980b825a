use ribbit_msg::Message;

/// Target every log record of this crate is emitted under
pub(crate) const TARGET: &str = "ribbit";

pub(crate) fn msg_summary(msg: &Message) -> String {
  format!("{:?}: {} {} (id {}, token {}) with {} byte payload",
          msg.code.kind(),
          msg.ty,
          msg.code,
          msg.id.0,
          msg.token,
          msg.payload.0.len())
}

#[cfg(test)]
mod tests {
  use ribbit_msg::{Code, Id, Payload, Token, Type};

  use super::*;

  #[test]
  fn summary() {
    let mut msg = Message::new(Type::Con, Code::new(2, 5));
    msg.id = Id(7);
    msg.token = Token::try_from_slice(&[0xab]).unwrap();
    msg.payload = Payload(b"abc".to_vec());

    assert_eq!(msg_summary(&msg),
               "Response: CON 2.05 (id 7, token ab) with 3 byte payload");
  }
}
