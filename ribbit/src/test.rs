//! In-memory clock & socket, for driving an [`Endpoint`](crate::core::Endpoint)
//! deterministically in tests.

use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use embedded_time::rate::Fraction;
use embedded_time::Instant;
use ribbit_msg::{Codec, Message, SpecVersion};

use crate::net::{Addrd, Socket};

/// A clock that only moves when told to, counting milliseconds.
///
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ClockMock(pub Arc<AtomicU64>);

impl ClockMock {
  /// A clock reading 0ms
  pub fn new() -> Self {
    Self::default()
  }

  /// Jump to a point in time
  pub fn set(&self, to_millis: u64) {
    self.0.store(to_millis, Ordering::SeqCst);
  }

  /// Move the clock forward
  pub fn advance(&self, by_millis: u64) {
    self.0.fetch_add(by_millis, Ordering::SeqCst);
  }

  /// The current time
  pub fn millis(&self) -> u64 {
    self.0.load(Ordering::SeqCst)
  }
}

impl embedded_time::Clock for ClockMock {
  type T = u64;

  const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000);

  fn try_now(&self) -> Result<Instant<Self>, embedded_time::clock::Error> {
    Ok(Instant::new(self.millis()))
  }
}

type Dgrams = Arc<Mutex<VecDeque<Addrd<Vec<u8>>>>>;

/// A mocked socket
///
/// Clones share the same queues, so a test can keep a handle
/// to the socket it gave away.
#[derive(Debug, Clone)]
pub struct SockMock {
  addr: SocketAddr,
  /// Inbound bytes from remote sockets. Address represents the sender
  pub rx: Dgrams,
  /// Outbound bytes to remote sockets. Address represents the destination
  pub tx: Dgrams,
}

impl Default for SockMock {
  fn default() -> Self {
    Self::new()
  }
}

impl SockMock {
  /// A socket "bound" to `127.0.0.1:5683`
  pub fn new() -> Self {
    Self { addr: SocketAddr::from(([127, 0, 0, 1], 5683)),
           rx: Default::default(),
           tx: Default::default() }
  }

  /// Queue a datagram as if it had been sent to us by `from`
  pub fn push_rx(&self, dgram: Addrd<Vec<u8>>) {
    self.rx
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push_back(dgram);
  }

  /// Encode `msg` with RFC 7252 and queue it as if `from` had sent it
  pub fn push_msg(&self, msg: &Message, from: SocketAddr) {
    self.push_msg_with(SpecVersion::Rfc7252, msg, from)
  }

  /// Encode `msg` with `version` and queue it as if `from` had sent it
  pub fn push_msg_with(&self, version: SpecVersion, msg: &Message, from: SocketAddr) {
    let bytes = version.encode(msg)
                       .unwrap_or_else(|e| panic!("mock could not encode {:?}: {:?}", msg, e));
    self.push_rx(Addrd(bytes, from))
  }

  /// Remove & return every datagram sent so far
  pub fn take_tx(&self) -> Vec<Addrd<Vec<u8>>> {
    self.tx
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain(..)
        .collect()
  }

  /// Remove & decode (as RFC 7252) every datagram sent so far
  pub fn take_sent(&self) -> Vec<Addrd<Message>> {
    self.take_sent_with(SpecVersion::Rfc7252)
  }

  /// Remove & decode every datagram sent so far
  pub fn take_sent_with(&self, version: SpecVersion) -> Vec<Addrd<Message>> {
    self.take_tx()
        .into_iter()
        .map(|dgram| {
          dgram.map(|bytes| {
                 version.decode(&bytes)
                        .unwrap_or_else(|e| panic!("endpoint sent garbage {:?}: {:?}", bytes, e))
               })
        })
        .collect()
  }
}

impl Socket for SockMock {
  type Error = ();

  fn local_addr(&self) -> SocketAddr {
    self.addr
  }

  fn recv(&self, buf: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error> {
    let dgram = self.rx
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop_front()
                    .ok_or(nb::Error::WouldBlock)?;

    let n = dgram.data().len().min(buf.len());
    buf[..n].copy_from_slice(&dgram.data()[..n]);

    Ok(dgram.map(|_| n))
  }

  fn send(&self, buf: Addrd<&[u8]>) -> nb::Result<(), Self::Error> {
    self.tx
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push_back(buf.map(Vec::from));
    Ok(())
  }

  fn join_multicast(&self, _: IpAddr) -> Result<(), Self::Error> {
    Ok(())
  }
}

/// A socket address for a fake remote peer
pub fn peer(port: u16) -> SocketAddr {
  SocketAddr::from(([192, 168, 0, 2], port))
}
