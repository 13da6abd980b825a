//! The caller's handle on a request in flight.
//!
//! An [`Exchange`] is a promise shared between the caller and the
//! [`Endpoint`](crate::core::Endpoint). The endpoint records what happens
//! to the request; the caller can block on it ([`Exchange::wait`]) or
//! register callbacks ([`Exchange::on_response`], [`Exchange::on_failure`]).
//!
//! An exchange is **resolved** once a response or a failure has been recorded,
//! which releases every waiter. It is **closed** once nothing more can
//! happen to it; for a plain request that's the same moment, while an
//! observation stays open (receiving notifications) until it ends or is cancelled.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use ribbit_msg::Token;

use crate::listeners::Listeners;
use crate::resp::Resp;
use crate::time::Timeout;

/// Why a request did not (or will no longer) get a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Failure {
  /// The peer answered with a Reset, or sent something we had to reject
  Rejected,
  /// No response arrived in time
  TimedOut,
  /// The request was cancelled locally
  Cancelled,
}

/// What finally happened to a request
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
  /// A response arrived (for observations; the latest accepted notification)
  Delivered(Resp),
  /// See [`Failure`]
  Failed(Failure),
}

#[derive(Debug, Default)]
struct State {
  current: Option<Resp>,
  failure: Option<Failure>,
  closed: bool,
  unread: VecDeque<Resp>,
  /// Stamp of the latest delivery made with [`Exchange::deliver_in_order`]
  last_stamp: Option<u64>,
}

impl State {
  fn resolved(&self) -> bool {
    self.current.is_some() || self.failure.is_some()
  }
}

struct Inner {
  token: Token,
  state: Mutex<State>,
  changed: Condvar,
  on_response: Mutex<Listeners<Resp>>,
  on_failure: Mutex<Listeners<Failure>>,
}

/// A request in flight; cheap to clone, every clone refers to the same exchange.
///
/// Callbacks are invoked on whichever thread drives the endpoint, after the
/// endpoint has released its own locks, so they may freely send new requests.
/// They must not register further callbacks on the exchange that invoked them.
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use ribbit::exchange::{Exchange, Failure};
/// use ribbit::time::Timeout;
///
/// let ex = Exchange::new(Default::default());
/// let failures = Arc::new(Mutex::new(vec![]));
///
/// let f = failures.clone();
/// ex.on_failure(move |fail| f.lock().unwrap().push(*fail));
///
/// assert!(ex.cancel());
/// assert!(!ex.cancel());
///
/// assert_eq!(ex.wait(Timeout::Never), None);
/// assert_eq!(*failures.lock().unwrap(), vec![Failure::Cancelled]);
/// ```
#[derive(Clone)]
pub struct Exchange(Arc<Inner>);

impl core::fmt::Debug for Exchange {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Exchange")
     .field("token", &self.0.token)
     .field("state", &*self.state())
     .finish()
  }
}

impl Exchange {
  /// A new, unresolved exchange for the request with `token`
  pub fn new(token: Token) -> Self {
    Self(Arc::new(Inner { token,
                          state: Mutex::new(State::default()),
                          changed: Condvar::new(),
                          on_response: Mutex::new(Listeners::new()),
                          on_failure: Mutex::new(Listeners::new()) }))
  }

  fn state(&self) -> MutexGuard<'_, State> {
    self.0.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn response_listeners(&self) -> MutexGuard<'_, Listeners<Resp>> {
    self.0
        .on_response
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
  }

  fn failure_listeners(&self) -> MutexGuard<'_, Listeners<Failure>> {
    self.0
        .on_failure
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
  }

  /// Token of the request
  pub fn token(&self) -> Token {
    self.0.token
  }

  /// Do `self` and `other` refer to the same exchange?
  pub fn same_as(&self, other: &Exchange) -> bool {
    Arc::ptr_eq(&self.0, &other.0)
  }

  /// Has a response or failure been recorded?
  pub fn is_resolved(&self) -> bool {
    self.state().resolved()
  }

  /// Is the exchange finished, so that nothing more will be recorded?
  pub fn is_closed(&self) -> bool {
    self.state().closed
  }

  /// The latest response, if any arrived
  pub fn response(&self) -> Option<Resp> {
    self.state().current.clone()
  }

  /// The failure, if the exchange failed
  pub fn failure(&self) -> Option<Failure> {
    self.state().failure
  }

  /// The terminal outcome, once the exchange is closed
  pub fn outcome(&self) -> Option<Outcome> {
    let state = self.state();
    if !state.closed {
      return None;
    }

    match (&state.failure, &state.current) {
      | (Some(f), _) => Some(Outcome::Failed(*f)),
      | (None, Some(resp)) => Some(Outcome::Delivered(resp.clone())),
      | (None, None) => None,
    }
  }

  /// Block until the exchange is resolved or `timeout` elapses.
  ///
  /// Yields the (latest) response, or `None` if the exchange failed
  /// or the timeout elapsed first; see [`Exchange::failure`] to tell those apart.
  pub fn wait(&self, timeout: Timeout) -> Option<Resp> {
    let state = self.state();
    let pending = |s: &mut State| !s.resolved() && !s.closed;

    let state = match timeout.duration() {
      | Some(dur) => {
        self.0
            .changed
            .wait_timeout_while(state, dur, pending)
            .unwrap_or_else(PoisonError::into_inner)
            .0
      },
      | None => self.0
                    .changed
                    .wait_while(state, pending)
                    .unwrap_or_else(PoisonError::into_inner),
    };

    state.current.clone()
  }

  /// Block until a notification that has not been read yet arrives,
  /// the exchange closes, or `timeout` elapses.
  ///
  /// Every response delivered to the exchange is yielded exactly once
  /// by this method, in the order they were accepted.
  pub fn next_notification(&self, timeout: Timeout) -> Option<Resp> {
    let state = self.state();
    let pending = |s: &mut State| s.unread.is_empty() && !s.closed;

    let mut state = match timeout.duration() {
      | Some(dur) => {
        self.0
            .changed
            .wait_timeout_while(state, dur, pending)
            .unwrap_or_else(PoisonError::into_inner)
            .0
      },
      | None => self.0
                    .changed
                    .wait_while(state, pending)
                    .unwrap_or_else(PoisonError::into_inner),
    };

    state.unread.pop_front()
  }

  /// Invoke `f` with every response accepted for this exchange.
  ///
  /// If a response was already delivered, `f` is invoked with it
  /// immediately. For observations, `f` stays registered and is
  /// invoked again with every accepted notification.
  pub fn on_response(&self, f: impl FnMut(&Resp) + Send + 'static) {
    let mut f = f;
    let mut ears = self.response_listeners();
    let (current, closed) = {
      let state = self.state();
      (state.current.clone(), state.closed)
    };

    if let Some(resp) = current.as_ref() {
      f(resp);
    }

    if !closed {
      ears.add(f);
    }
  }

  /// Invoke `f` if the exchange fails; immediately if it already has
  pub fn on_failure(&self, f: impl FnMut(&Failure) + Send + 'static) {
    let mut f = f;
    let mut ears = self.failure_listeners();
    let failure = self.state().failure;

    match failure {
      | Some(fail) => f(&fail),
      | None => ears.add(f),
    }
  }

  /// Stop waiting for a response.
  ///
  /// Yields `false` if the exchange was already closed.
  /// Responses delivered before cancellation stay available.
  pub fn cancel(&self) -> bool {
    self.fail(Failure::Cancelled)
  }

  /// Record a response.
  ///
  /// A response that is `last` closes the exchange. Yields `false`
  /// (and records nothing) when the exchange is already closed.
  pub(crate) fn deliver(&self, resp: Resp) -> bool {
    self.record(resp, None)
  }

  /// Record a response the endpoint stamped while deciding to deliver it.
  ///
  /// Threads polling the same endpoint can perform deliveries in a different
  /// order than they were decided in; a response stamped older than one
  /// already recorded is dropped, like any stale notification.
  pub(crate) fn deliver_in_order(&self, resp: Resp, stamp: u64) -> bool {
    self.record(resp, Some(stamp))
  }

  fn record(&self, resp: Resp, stamp: Option<u64>) -> bool {
    let mut ears = self.response_listeners();
    {
      let mut state = self.state();
      if state.closed {
        return false;
      }

      if let Some(stamp) = stamp {
        if state.last_stamp.map_or(false, |last| stamp <= last) {
          return false;
        }
        state.last_stamp = Some(stamp);
      }

      state.closed = resp.is_last();
      state.current = Some(resp.clone());
      state.unread.push_back(resp.clone());
      self.0.changed.notify_all();
    }

    ears.notify(&resp);
    true
  }

  /// Record a failure, closing the exchange.
  ///
  /// Yields `false` (and records nothing) when the exchange is already closed.
  pub(crate) fn fail(&self, failure: Failure) -> bool {
    let mut ears = self.failure_listeners();
    {
      let mut state = self.state();
      if state.closed {
        return false;
      }

      state.closed = true;
      state.failure = Some(failure);
      self.0.changed.notify_all();
    }

    ears.notify(&failure);
    true
  }

  /// Close the exchange without recording a failure,
  /// e.g. when a multicast request stops collecting responses.
  pub(crate) fn close(&self) -> bool {
    let mut state = self.state();
    if state.closed {
      return false;
    }

    state.closed = true;
    self.0.changed.notify_all();
    true
  }

  /// Hand every callback of this exchange over to `successor`, then close this one
  pub(crate) fn supersede(&self, successor: &Exchange) {
    self.response_listeners()
        .transfer_to(&mut successor.response_listeners());
    self.failure_listeners()
        .transfer_to(&mut successor.failure_listeners());
    self.close();
  }
}
