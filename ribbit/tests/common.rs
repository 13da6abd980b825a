#![allow(dead_code)]

use std::net::SocketAddr;

use embedded_time::duration::Milliseconds;
use ribbit::config::Config;
use ribbit::core::Endpoint;
use ribbit::net::Addrd;
use ribbit::resp::Resp;
use ribbit::retry::Strategy;
use ribbit::test::{peer, ClockMock, SockMock};
use ribbit_msg::{Message, Payload};

pub type Ep = Endpoint<ClockMock, SockMock>;

/// Every test talks to this "server"
pub fn server() -> SocketAddr {
  peer(5683)
}

/// The default config without retransmission jitter:
/// retransmissions at 1s, 3s, 7s & 15s, timing out at 31s
pub fn config() -> Config {
  let mut config = Config::default();
  config.msg.con.unacked_retry_strategy = Strategy::Exponential { init_min: Milliseconds(1_000),
                                                                  init_max: Milliseconds(1_000),
                                                                  factor: 2 };
  config
}

pub struct Harness {
  pub endpoint: Ep,
  pub clock: ClockMock,
  pub sock: SockMock,
}

pub fn harness() -> Harness {
  harness_with(config())
}

pub fn harness_with(config: Config) -> Harness {
  // RUST_LOG=trace shows the endpoint's view of a failing test;
  // the logger can only be installed once per test binary
  simple_logger::init_with_env().ok();

  let clock = ClockMock::new();
  let sock = SockMock::new();
  let endpoint = Endpoint::new(config, clock.clone(), sock.clone());

  Harness { endpoint,
            clock,
            sock }
}

impl Harness {
  pub fn poll(&self) {
    self.endpoint.poll().unwrap();
  }

  /// Everything the endpoint sent since the last call
  pub fn sent(&self) -> Vec<Addrd<Message>> {
    self.sock.take_sent()
  }

  /// The one message the endpoint sent since the last call
  pub fn sent_one(&self) -> Addrd<Message> {
    let mut sent = self.sent();
    assert_eq!(sent.len(), 1, "expected exactly one message, got {:?}", sent);
    sent.remove(0)
  }

  /// Deliver `msg` from the server & poll
  pub fn recv(&self, msg: &Message) {
    self.recv_from(msg, server());
  }

  pub fn recv_from(&self, msg: &Message, from: SocketAddr) {
    self.sock.push_msg(msg, from);
    self.poll();
  }
}

/// A piggybacked 2.05 answering `req`
pub fn piggyback(req: &Message, payload: &str) -> Message {
  let mut msg = Resp::for_request(req, server()).unwrap().into_msg();
  msg.payload = Payload(payload.as_bytes().to_vec());
  msg
}
