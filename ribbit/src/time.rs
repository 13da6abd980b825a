use embedded_time::duration::Milliseconds;
use embedded_time::Instant;

/// A duration, in milliseconds
pub type Millis = Milliseconds<u64>;

/// Any [`embedded_time::Clock`] counting in `u64` ticks
pub trait Clock: embedded_time::Clock<T = u64> {}
impl<C: embedded_time::Clock<T = u64>> Clock for C {}

/// How long a blocking wait may take
///
/// ```
/// use ribbit::time::Timeout;
///
/// assert_eq!(Timeout::Millis(1500).duration(),
///            Some(std::time::Duration::from_millis(1500)));
/// assert_eq!(Timeout::Never.duration(), None);
/// ```
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub enum Timeout {
  /// Give up after this many milliseconds
  Millis(u64),
  /// Wait forever
  Never,
}

impl Timeout {
  /// The timeout as a [`core::time::Duration`], `None` if it never elapses
  pub fn duration(&self) -> Option<core::time::Duration> {
    match self {
      | Timeout::Millis(ms) => Some(core::time::Duration::from_millis(*ms)),
      | Timeout::Never => None,
    }
  }
}

/// Milliseconds elapsed between two instants.
///
/// Yields zero when `later` is actually earlier than `earlier`,
/// which can happen when instants are taken by different threads.
pub(crate) fn millis_between<C: Clock>(earlier: Instant<C>, later: Instant<C>) -> u64 {
  later.checked_duration_since(&earlier)
       .and_then(|dur| Millis::try_from(dur).ok())
       .map(|Milliseconds(ms)| ms)
       .unwrap_or(0)
}

/// Milliseconds since the clock's epoch
pub(crate) fn millis_since_epoch<C: Clock>(instant: Instant<C>) -> u64 {
  Millis::try_from(instant.duration_since_epoch()).map(|Milliseconds(ms)| ms)
                                                  .unwrap_or(0)
}

/// A value and the instant it was received
pub struct Stamped<C: Clock, T>(pub T, pub Instant<C>);

impl<C: Clock, T: core::fmt::Debug> core::fmt::Debug for Stamped<C, T> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "{:?} @ {}ms", self.0, millis_since_epoch(self.1))
  }
}

impl<C: Clock, T> Stamped<C, T> {
  /// The value
  pub fn data(&self) -> &T {
    &self.0
  }

  /// Milliseconds between the stamp and `now`
  pub fn age_millis(&self, now: Instant<C>) -> u64 {
    millis_between(self.1, now)
  }
}

#[cfg(test)]
mod tests {
  use embedded_time::Clock as _;

  use super::*;
  use crate::test::ClockMock;

  #[test]
  fn millis_between_saturates() {
    let clock = ClockMock::new();
    clock.set(1000);
    let a = clock.try_now().unwrap();
    clock.set(2500);
    let b = clock.try_now().unwrap();

    assert_eq!(millis_between(a, b), 1500);
    assert_eq!(millis_between(b, a), 0);
  }

  #[test]
  fn stamped_age() {
    let clock = ClockMock::new();
    clock.set(10);
    let stamped = Stamped("hi", clock.try_now().unwrap());
    clock.set(40);

    assert_eq!(stamped.age_millis(clock.try_now().unwrap()), 30);
    assert_eq!(format!("{:?}", stamped), "\"hi\" @ 10ms");
  }
}
