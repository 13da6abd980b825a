use embedded_time::duration::Milliseconds;
use ribbit_msg::SpecVersion;

use crate::retry::{Attempts, Strategy};
use crate::time::Millis;

/// Configuration options related to outbound CON requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Con {
  /// Retry strategy for CON requests that
  /// have not yet been ACKed.
  ///
  /// The first retransmission happens after a random delay between
  /// `ACK_TIMEOUT` and `ACK_TIMEOUT * ACK_RANDOM_FACTOR`, and
  /// the delay doubles with each retransmission after that.
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use ribbit::config::Con;
  /// use ribbit::retry::Strategy;
  ///
  /// assert_eq!(Con::default().unacked_retry_strategy,
  ///            Strategy::Exponential { init_min: Milliseconds(2_000),
  ///                                    init_max: Milliseconds(3_000),
  ///                                    factor: 2 });
  /// ```
  pub unacked_retry_strategy: Strategy,
  /// Number of times we are allowed to resend a CON request
  /// before it times out (`MAX_RETRANSMIT`).
  ///
  /// ```
  /// use ribbit::config::Con;
  /// use ribbit::retry::Attempts;
  ///
  /// assert_eq!(Con::default().max_retransmits, Attempts(4));
  /// ```
  pub max_retransmits: Attempts,
}

impl Con {
  /// Total transmissions allowed for a CON message; the original plus retransmissions
  pub fn max_transmissions(&self) -> Attempts {
    Attempts(self.max_retransmits.0.saturating_add(1))
  }

  /// The smallest delay before the first retransmission (`ACK_TIMEOUT`)
  pub fn ack_timeout(&self) -> Millis {
    Milliseconds(*self.unacked_retry_strategy.range().start())
  }
}

/// Configuration options related to outbound NON requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Non {
  /// NON requests are never retransmitted; this is
  /// how long we wait for a response before giving up.
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use ribbit::config::Non;
  ///
  /// assert_eq!(Non::default().response_timeout, Milliseconds(145_000u64));
  /// ```
  pub response_timeout: Millis,
}

/// Configuration options related to parsing & handling messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Msg {
  /// Seed used to generate message [`Token`](ribbit_msg::Token)s,
  /// customizable to allow for your application to generate tokens
  /// less guessably.
  ///
  /// _e.g. if you're developing a swarm of
  /// smart CoAP-enabled thermostats, each one would ideally
  /// have a distinct token seed._
  ///
  /// ```
  /// use ribbit::config::Msg;
  ///
  /// assert_eq!(Msg::default().token_seed, 0);
  /// ```
  pub token_seed: u16,

  /// Draw tokens from the endpoint's random number generator
  /// instead of hashing the seed, timestamp and a counter.
  ///
  /// ```
  /// use ribbit::config::Msg;
  ///
  /// assert!(!Msg::default().randomize_tokens);
  /// ```
  pub randomize_tokens: bool,

  /// Protocol revision used to encode and decode datagrams.
  ///
  /// ```
  /// use ribbit::config::Msg;
  /// use ribbit_msg::SpecVersion;
  ///
  /// assert_eq!(Msg::default().spec_version, SpecVersion::Rfc7252);
  /// ```
  pub spec_version: SpecVersion,

  /// Size of the buffer inbound datagrams are read into.
  /// Bytes past this length are dropped by the socket.
  ///
  /// ```
  /// use ribbit::config::Msg;
  ///
  /// assert_eq!(Msg::default().max_dgram_size, 1152);
  /// ```
  pub max_dgram_size: usize,

  /// See [`Con`]
  pub con: Con,

  /// See [`Non`]
  pub non: Non,
}

/// Configuration for block-wise transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block {
  /// Size exponent of blocks we send, and propose for blocks we receive.
  ///
  /// The block size is `2^(szx + 4)`; request payloads
  /// larger than this are uploaded with Block1.
  ///
  /// ```
  /// use ribbit::config::Block;
  ///
  /// assert_eq!(Block::default().szx, 6);
  /// assert_eq!(Block::default().size(), 1024);
  /// ```
  pub szx: u8,
}

impl Block {
  /// Block size in bytes
  pub fn size(&self) -> u16 {
    ribbit_msg::decode_szx(self.szx.min(6))
  }
}

/// Configuration for observe relations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Observe {
  /// How long a notification's sequence number is authoritative.
  ///
  /// A notification arriving more than this long after the last
  /// accepted one is accepted regardless of its sequence number.
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use ribbit::config::Observe;
  ///
  /// assert_eq!(Observe::default().notification_max_age, Milliseconds(128_000u64));
  /// ```
  pub notification_max_age: Millis,

  /// Re-register an observation whose latest notification has outlived
  /// its Max-Age (plus [`Observe::reregistration_backoff`]).
  ///
  /// ```
  /// use ribbit::config::Observe;
  ///
  /// assert!(Observe::default().auto_reregister);
  /// ```
  pub auto_reregister: bool,

  /// Grace period after a notification's Max-Age elapses before re-registering.
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use ribbit::config::Observe;
  ///
  /// assert_eq!(Observe::default().reregistration_backoff, Milliseconds(2_000u64));
  /// ```
  pub reregistration_backoff: Millis,
}

impl Default for Con {
  fn default() -> Self {
    Con { unacked_retry_strategy: Strategy::Exponential { init_min: Milliseconds(2_000),
                                                          init_max: Milliseconds(3_000),
                                                          factor: 2 },
          max_retransmits: Attempts(4) }
  }
}

impl Default for Non {
  fn default() -> Self {
    Non { response_timeout: Milliseconds(145_000) }
  }
}

impl Default for Msg {
  fn default() -> Self {
    Msg { token_seed: 0,
          randomize_tokens: false,
          spec_version: SpecVersion::default(),
          max_dgram_size: 1152,
          con: Con::default(),
          non: Non::default() }
  }
}

impl Default for Block {
  fn default() -> Self {
    Block { szx: 6 }
  }
}

impl Default for Observe {
  fn default() -> Self {
    Observe { notification_max_age: Milliseconds(128_000),
              auto_reregister: true,
              reregistration_backoff: Milliseconds(2_000) }
  }
}

/// Runtime config
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Config {
  /// See [`Msg`]
  pub msg: Msg,
  /// See [`Block`]
  pub block: Block,
  /// See [`Observe`]
  pub observe: Observe,
}

impl Config {
  /// `MAX_TRANSMIT_SPAN`; the longest time from the first to the
  /// last transmission of a CON message
  pub fn max_transmit_span_millis(&self) -> u64 {
    self.msg
        .con
        .unacked_retry_strategy
        .max_time(self.msg.con.max_retransmits)
        .0
  }

  /// `MAX_TRANSMIT_WAIT`; the longest time from the first transmission of a
  /// CON message to giving up on receiving an acknowledgement
  pub fn max_transmit_wait_millis(&self) -> u64 {
    self.msg
        .con
        .unacked_retry_strategy
        .max_time(self.msg.con.max_transmissions())
        .0
  }

  // TODO: adjust these on the fly based on actual timings?
  pub(crate) fn max_latency_millis(&self) -> u64 {
    100_000
  }

  pub(crate) fn expected_processing_delay_millis(&self) -> u64 {
    self.msg.con.ack_timeout().0
  }

  /// `EXCHANGE_LIFETIME`; how long a message id stays in use,
  /// and how long we wait for a separate response after an empty ACK.
  ///
  /// ```
  /// use ribbit::config::Config;
  ///
  /// assert_eq!(Config::default().exchange_lifetime_millis(), 247_000);
  /// ```
  pub fn exchange_lifetime_millis(&self) -> u64 {
    self.max_transmit_span_millis()
    + (2 * self.max_latency_millis())
    + self.expected_processing_delay_millis()
  }
}
