use core::ops::RangeInclusive;

use embedded_time::duration::Milliseconds;
use embedded_time::Instant;
use rand::{Rng, SeedableRng};

use crate::time::{millis_between, millis_since_epoch, Clock};

/// Non-blocking retransmission schedule for one outbound message.
///
/// The timer counts transmissions; the first one happens before the timer
/// is ever consulted. Each time [`RetryTimer::what_should_i_do`] says
/// [`YouShould::Retry`] the caller is expected to transmit again.
/// Once `max_attempts` transmissions have been made and the last window
/// has elapsed without success, the timer says [`YouShould::Cry`].
///
/// ```
/// use embedded_time::clock::Clock;
/// use embedded_time::duration::Milliseconds;
/// use ribbit::retry;
///
/// let clock = ribbit::std::Clock::new();
/// let now = || clock.try_now().unwrap();
/// let strategy = retry::Strategy::Delay { min: Milliseconds(1),
///                                         max: Milliseconds(2) };
/// let mut retry = retry::RetryTimer::new(now(), strategy, retry::Attempts(2));
///
/// let mut failures = 0;
/// let mut fails_once = || {
///   failures += 1;
///   if failures == 1 { Err(()) } else { Ok(()) }
/// };
///
/// while let Err(_) = fails_once() {
///   match nb::block!(retry.what_should_i_do(now())) {
///     | Ok(retry::YouShould::Retry) => continue,
///     | Ok(retry::YouShould::Cry) => panic!("gave up after 2 attempts"),
///     | Err(_) => unreachable!(),
///   }
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RetryTimer<C: Clock> {
  start: Instant<C>,
  init: Milliseconds<u64>,
  strategy: Strategy,
  attempts: Attempts,
  max_attempts: Attempts,
}

/// Count of transmissions
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Attempts(pub u16);

impl core::ops::Sub for Attempts {
  type Output = Attempts;

  fn sub(self, rhs: Self) -> Self::Output {
    Attempts(self.0.saturating_sub(rhs.0))
  }
}

/// Verdict of [`RetryTimer::what_should_i_do`] once the current window has elapsed
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum YouShould {
  /// Out of attempts; give up on the message
  Cry,
  /// Transmit again
  Retry,
}

impl<C: Clock> RetryTimer<C> {
  /// Create a new retrier, seeding the jitter from the start time
  pub fn new(start: Instant<C>, strategy: Strategy, max_attempts: Attempts) -> Self {
    Self::seeded(start, strategy, max_attempts, millis_since_epoch(start))
  }

  /// Create a new retrier, drawing the initial delay with
  /// a generator seeded by `seed`
  pub fn seeded(start: Instant<C>, strategy: Strategy, max_attempts: Attempts, seed: u64) -> Self {
    let init = if strategy.has_jitter() {
      let mut rand = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
      Milliseconds(rand.gen_range(strategy.range()))
    } else {
      Milliseconds(*strategy.range().start())
    };

    Self { start,
           init,
           strategy,
           max_attempts,
           attempts: Attempts(1) }
  }

  /// The delay drawn for the first retransmission
  pub fn init(&self) -> Milliseconds<u64> {
    self.init
  }

  /// Number of transmissions so far, including the first
  pub fn attempts(&self) -> Attempts {
    self.attempts
  }

  /// Ask whether to retransmit now.
  ///
  /// `WouldBlock` while the window after the latest transmission
  /// is still open. A [`YouShould::Retry`] counts as a transmission.
  pub fn what_should_i_do(&mut self,
                          now: Instant<C>)
                          -> nb::Result<YouShould, core::convert::Infallible> {
    if !self.is_ready(Milliseconds(millis_between(self.start, now)), self.attempts) {
      Err(nb::Error::WouldBlock)
    } else if self.attempts >= self.max_attempts {
      Ok(YouShould::Cry)
    } else {
      self.attempts.0 += 1;
      Ok(YouShould::Retry)
    }
  }

  /// Milliseconds after `start` at which the window following
  /// transmission number `attempts` closes
  pub fn deadline(&self, attempts: Attempts) -> Milliseconds<u64> {
    Milliseconds(self.strategy.total_delay(self.init, attempts.0))
  }

  /// Has the window after transmission number `attempts` closed, `time_passed` after `start`?
  pub fn is_ready(&self, Milliseconds(time_passed): Milliseconds<u64>, attempts: Attempts) -> bool {
    time_passed >= self.deadline(attempts).0
  }
}

/// How the delay between transmissions evolves
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strategy {
  /// First delay drawn from `init_min..=init_max`,
  /// each following delay `factor` times the previous one
  Exponential {
    /// Lower bound of the first delay
    init_min: Milliseconds<u64>,
    /// Upper bound (inclusive) of the first delay
    init_max: Milliseconds<u64>,
    /// Growth of the delay between consecutive attempts
    factor: u16,
  },
  /// The same delay, drawn once from `min..=max`, between every transmission
  Delay {
    /// Lower bound of the delay
    min: Milliseconds<u64>,
    /// Upper bound (inclusive) of the delay
    max: Milliseconds<u64>,
  },
}

impl Strategy {
  /// Is there more than one possible first delay?
  pub fn has_jitter(&self) -> bool {
    let range = self.range();
    range.start() != range.end()
  }

  /// Bounds of the first delay
  pub fn range(&self) -> RangeInclusive<u64> {
    match self {
      | &Self::Delay { min: Milliseconds(min),
                       max: Milliseconds(max), } => (min..=max.max(min)),

      | &Self::Exponential { init_min: Milliseconds(min),
                             init_max: Milliseconds(max),
                             .. } => (min..=max.max(min)),
    }
  }

  /// Time from the first transmission until `attempts` transmissions
  /// have all gone unanswered, assuming the largest first delay
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use ribbit::retry::{Attempts, Strategy};
  ///
  /// let exp = Strategy::Exponential { init_min: Milliseconds(2_000),
  ///                                   init_max: Milliseconds(3_000),
  ///                                   factor: 2 };
  /// assert_eq!(exp.max_time(Attempts(4)), Milliseconds(45_000u64));
  /// ```
  pub fn max_time(&self, attempts: Attempts) -> Milliseconds<u64> {
    Milliseconds(self.total_delay(Milliseconds(*self.range().end()), attempts.0))
  }

  /// Milliseconds after the first transmission at which the
  /// window following transmission number `attempts` closes
  fn total_delay(&self, Milliseconds(init): Milliseconds<u64>, attempts: u16) -> u64 {
    match self {
      | Self::Delay { .. } => init.saturating_mul(attempts as u64),
      // | attempts | total delay                   |
      // | 1        | init                          |
      // | 2        | init + init*f                 |
      // | n        | init * (1 + f + ... + f^(n-1)) |
      | Self::Exponential { factor, .. } => {
        (0..attempts as u32).fold(0u64, |total, n| {
                              let step = (*factor as u64).saturating_pow(n).saturating_mul(init);
                              total.saturating_add(step)
                            })
      },
    }
  }
}
