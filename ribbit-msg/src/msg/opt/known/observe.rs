/// Largest Observe sequence number (the option is at most 3 bytes)
pub const MAX_OBSERVE_SEQ: u32 = (1 << 24) - 1;

/// What an Observe option in a GET request asks of the server
/// ([RFC 7641 section 2](https://www.rfc-editor.org/rfc/rfc7641#section-2)).
///
/// In a response, the same option is a notification sequence number instead.
///
/// ```
/// use ribbit_msg::{Code, Message, MessageOptions, ObserveAction, Type};
///
/// let mut get = Message::new(Type::Con, Code::new(0, 1));
/// get.set_observe_action(ObserveAction::Register).unwrap();
///
/// assert_eq!(get.observe(), Some(0));
/// assert_eq!(get.observe_action(), Some(ObserveAction::Register));
/// ```
#[derive(Hash, Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum ObserveAction {
  /// `0`: add us to the resource's observers
  Register,
  /// `1`: remove us from the resource's observers
  Deregister,
}

impl ObserveAction {
  /// Interpret the value of a request's Observe option
  pub fn from_value(value: u32) -> Option<Self> {
    match value {
      | 0 => Some(Self::Register),
      | 1 => Some(Self::Deregister),
      | _ => None,
    }
  }

  /// The value of the Observe option expressing this action
  pub fn value(&self) -> u32 {
    match self {
      | Self::Register => 0,
      | Self::Deregister => 1,
    }
  }
}
