//! Observing resources ([RFC 7641](https://www.rfc-editor.org/rfc/rfc7641)).
//!
//! A GET with Observe=0 asks the server to keep sending the resource's
//! representation as it changes. Notifications travel over an unreliable
//! transport and may be reordered, so every notification carries a 24-bit
//! sequence number and the [`NotificationOrderer`] only lets through those
//! that are fresher than the freshest one seen so far.

use embedded_time::Instant;
use ribbit_msg::{MessageOptions, ObserveAction, SetError};

use crate::config;
use crate::req::Req;
use crate::resp::Resp;
use crate::time::{Clock, Millis, Stamped};

/// Half of the 24-bit sequence number space
pub const SEQ_HALF: u32 = 1 << 23;

/// Is sequence number `candidate` newer than `current`?
///
/// Sequence numbers wrap around at 2^24; a number is newer if it is
/// ahead of the current one by less than half the sequence number space.
///
/// ```
/// use ribbit::observe::is_newer;
///
/// assert!(is_newer(11, 10));
/// assert!(!is_newer(10, 10));
/// assert!(!is_newer(5, 10));
/// assert!(is_newer(2, (1 << 24) - 3));
/// ```
pub fn is_newer(candidate: u32, current: u32) -> bool {
  (current < candidate && candidate - current < SEQ_HALF)
  || (current > candidate && current - candidate > SEQ_HALF)
}

/// Decides which notifications of an observation are fresh.
///
/// Remembers the sequence number & arrival time of the freshest
/// notification so far. A candidate is accepted if nothing was accepted
/// yet, if its sequence number [is newer](is_newer), or if it arrived
/// more than `max_age` after the freshest one (after that long, the
/// sequence numbers of the two can no longer be compared).
#[derive(Debug)]
pub struct NotificationOrderer<C: Clock> {
  last: Option<Stamped<C, u32>>,
  max_age: Millis,
}

impl<C: Clock> NotificationOrderer<C> {
  /// An orderer that has not accepted anything
  pub fn new(max_age: Millis) -> Self {
    Self { last: None,
           max_age }
  }

  /// Would a notification with sequence number `seq` arriving at `now` be accepted?
  pub fn is_fresh(&self, seq: u32, now: Instant<C>) -> bool {
    match &self.last {
      | None => true,
      | Some(last) => is_newer(seq, *last.data()) || last.age_millis(now) > self.max_age.0,
    }
  }

  /// Accept the notification if it is fresh, remembering it as the freshest.
  ///
  /// Stale notifications leave the orderer untouched.
  pub fn accept(&mut self, seq: u32, now: Instant<C>) -> bool {
    let fresh = self.is_fresh(seq, now);
    if fresh {
      self.last = Some(Stamped(seq, now));
    }
    fresh
  }

  /// Sequence number of the freshest notification
  pub fn last_seq(&self) -> Option<u32> {
    self.last.as_ref().map(|s| *s.data())
  }
}

/// The client side of an observation: the registering request, the
/// notifications accepted so far and whether we've lost interest.
#[derive(Debug)]
pub struct ObserveRelation<C: Clock> {
  req: Req,
  current: Option<Stamped<C, Resp>>,
  orderer: NotificationOrderer<C>,
  cancelled: bool,
  config: config::Observe,
}

impl<C: Clock> ObserveRelation<C> {
  /// Start tracking an observation registered by `req`
  pub fn new(req: Req, config: config::Observe) -> Self {
    Self { req,
           current: None,
           orderer: NotificationOrderer::new(config.notification_max_age),
           cancelled: false,
           config }
  }

  /// The request that registered the observation
  pub fn req(&self) -> &Req {
    &self.req
  }

  /// The most recently accepted notification
  pub fn current(&self) -> Option<&Resp> {
    self.current.as_ref().map(|s| s.data())
  }

  /// See [`NotificationOrderer`]
  pub fn orderer(&self) -> &NotificationOrderer<C> {
    &self.orderer
  }

  /// Has the relation been cancelled?
  pub fn is_cancelled(&self) -> bool {
    self.cancelled
  }

  /// Lose interest in the resource.
  ///
  /// The next notification will be answered with a Reset, which
  /// makes the server forget about us.
  pub fn cancel(&mut self) {
    self.cancelled = true;
  }

  /// Would a notification with sequence number `seq` be accepted now?
  pub fn is_fresh(&self, seq: u32, now: Instant<C>) -> bool {
    !self.cancelled && self.orderer.is_fresh(seq, now)
  }

  /// Offer a notification to the relation.
  ///
  /// Yields whether it was accepted (and should be forwarded to the caller).
  /// Responses without an Observe option are always accepted; they end the relation.
  pub fn notify(&mut self, resp: Resp, now: Instant<C>) -> bool {
    if self.cancelled {
      return false;
    }

    let accepted = match resp.notification_seq() {
      | Some(seq) => self.orderer.accept(seq, now),
      | None => true,
    };

    if accepted {
      self.current = Some(Stamped(resp, now));
    }

    accepted
  }

  /// Start over with a fresh orderer, yielding the request to re-send.
  ///
  /// The request keeps its token; the endpoint gives it a new message id.
  pub fn reregister(&mut self) -> Req {
    self.orderer = NotificationOrderer::new(self.config.notification_max_age);
    self.current = None;
    self.req.clone()
  }

  /// Has the latest notification outlived its Max-Age (plus the configured backoff)?
  ///
  /// Never due before the first notification, or when automatic
  /// re-registration is disabled.
  pub fn reregistration_due(&self, now: Instant<C>) -> bool {
    self.config.auto_reregister
    && !self.cancelled
    && self.current.as_ref().map_or(false, |cur| {
                                let max_age_ms = cur.data().max_age() as u64 * 1000;
                                cur.age_millis(now)
                                > max_age_ms + self.config.reregistration_backoff.0
                              })
  }

  /// The GET that asks the server to forget us (Observe=1, same token)
  pub fn deregister_request(&self) -> Result<Req, SetError> {
    let mut req = self.req.clone();
    req.set_observe_action(ObserveAction::Deregister)?;
    Ok(req)
  }
}

#[cfg(test)]
mod tests {
  use embedded_time::duration::Milliseconds;
  use embedded_time::Clock as _;
  use ribbit_msg::{Message, Type};

  use super::*;
  use crate::resp::code;
  use crate::test::{peer, ClockMock};

  fn notification(seq: Option<u32>) -> Resp {
    let mut msg = Message::new(Type::Non, code::CONTENT);
    if let Some(seq) = seq {
      msg.set_observe(seq).unwrap();
    }
    Resp::new(msg, peer(5683), Milliseconds(0), seq.is_none())
  }

  #[test]
  fn orderer_scenario() {
    let clock = ClockMock::new();
    let now = || clock.try_now().unwrap();
    let mut orderer = NotificationOrderer::<ClockMock>::new(Milliseconds(128_000));

    assert!(orderer.accept(10, now()));
    clock.advance(1);
    assert!(orderer.accept(11, now()));

    clock.advance(5);
    assert!(!orderer.accept(5, now()));
    assert_eq!(orderer.last_seq(), Some(11));

    clock.advance(128_001);
    assert!(orderer.accept(5, now()));
    assert_eq!(orderer.last_seq(), Some(5));
  }

  #[test]
  fn orderer_wraps() {
    let clock = ClockMock::new();
    let now = || clock.try_now().unwrap();
    let mut orderer = NotificationOrderer::<ClockMock>::new(Milliseconds(128_000));

    assert!(orderer.accept((1 << 24) - 1, now()));
    assert!(orderer.accept(0, now()));
    assert!(!orderer.accept((1 << 24) - 1, now()));
    assert!(!orderer.accept(SEQ_HALF + 1, now()));
  }

  #[test]
  fn relation_forwards_fresh_only() {
    let clock = ClockMock::new();
    let now = || clock.try_now().unwrap();
    let req = Req::get(peer(5683), "temp");
    let mut rel = ObserveRelation::<ClockMock>::new(req, Default::default());

    assert!(rel.notify(notification(Some(3)), now()));
    assert!(!rel.notify(notification(Some(2)), now()));
    assert_eq!(rel.current().and_then(Resp::notification_seq), Some(3));

    rel.cancel();
    assert!(!rel.notify(notification(Some(4)), now()));
    assert!(!rel.is_fresh(4, now()));
  }

  #[test]
  fn reregister_replaces_orderer() {
    let clock = ClockMock::new();
    let now = || clock.try_now().unwrap();
    let mut rel = ObserveRelation::<ClockMock>::new(Req::get(peer(5683), "temp"), Default::default());

    assert!(rel.notify(notification(Some(100)), now()));
    rel.reregister();
    assert_eq!(rel.orderer().last_seq(), None);
    assert!(rel.notify(notification(Some(1)), now()));
  }

  #[test]
  fn reregistration_due_after_max_age() {
    let clock = ClockMock::new();
    let now = || clock.try_now().unwrap();
    let mut rel = ObserveRelation::<ClockMock>::new(Req::get(peer(5683), "temp"), Default::default());

    assert!(!rel.reregistration_due(now()));
    rel.notify(notification(Some(1)), now());

    // default Max-Age 60s + 2s backoff
    clock.set(62_000);
    assert!(!rel.reregistration_due(now()));
    clock.set(62_001);
    assert!(rel.reregistration_due(now()));
  }

  #[test]
  fn deregister_keeps_token() {
    let mut req = Req::get(peer(5683), "temp");
    req.set_observe(0).unwrap();
    req.set_token(ribbit_msg::Token::try_from_slice(&[9]).unwrap());

    let rel = ObserveRelation::<ClockMock>::new(req.clone(), Default::default());
    let dereg = rel.deregister_request().unwrap();

    assert_eq!(dereg.observe(), Some(1));
    assert_eq!(dereg.token(), req.token());
    assert_eq!(dereg.uri_path_string(), "temp");
  }
}
