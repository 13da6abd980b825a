use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use embedded_time::rate::Fraction;

use crate::config::Config;
use crate::net::{Addrd, Socket};
use crate::time;

/// An [`Endpoint`](crate::core::Endpoint) talking UDP,
/// timed by the system's monotonic clock
pub type Endpoint = crate::core::Endpoint<Clock, UdpSocket>;

impl Endpoint {
  /// Bind a UDP socket to `addr` and create an endpoint on it
  ///
  /// ```
  /// let endpoint = ribbit::std::Endpoint::bind("127.0.0.1:0", Default::default()).unwrap();
  /// assert!(endpoint.local_addr().ip().is_loopback());
  /// ```
  pub fn bind(addr: impl ToSocketAddrs, config: Config) -> io::Result<Self> {
    let sock = UdpSocket::bind(addr)?;
    sock.set_nonblocking(true)?;

    log::info!(target: crate::logging::TARGET,
               "bound {} ({})",
               sock.local_addr()?,
               config.msg.spec_version);

    Ok(Self::new(config, Clock::new(), sock))
  }
}

pub(crate) fn io_to_nb(err: io::Error) -> nb::Error<io::Error> {
  match err.kind() {
    | io::ErrorKind::WouldBlock => nb::Error::WouldBlock,
    | _ => nb::Error::Other(err),
  }
}

impl Socket for UdpSocket {
  type Error = io::Error;

  fn local_addr(&self) -> SocketAddr {
    UdpSocket::local_addr(self).unwrap_or_else(|_| SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
  }

  fn send(&self, msg: Addrd<&[u8]>) -> nb::Result<(), Self::Error> {
    self.send_to(msg.data(), msg.addr())
        .map(|_| ())
        .map_err(io_to_nb)
  }

  fn recv(&self, buffer: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error> {
    self.set_nonblocking(true).map_err(nb::Error::Other)?;
    self.recv_from(buffer)
        .map(|(n, addr)| Addrd(n, addr))
        .map_err(io_to_nb)
  }

  fn join_multicast(&self, addr: IpAddr) -> Result<(), Self::Error> {
    match addr {
      | IpAddr::V4(addr) => self.join_multicast_v4(&addr, &Ipv4Addr::UNSPECIFIED),
      | IpAddr::V6(addr) => self.join_multicast_v6(&addr, 0),
    }
  }
}

/// Implement [`embedded_time::Clock`] using [`std::time`] primitives
#[derive(Debug, Clone, Copy)]
pub struct Clock(std::time::Instant);

impl Default for Clock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock {
  /// Create a new clock
  pub fn new() -> Self {
    Self(std::time::Instant::now())
  }
}

impl embedded_time::Clock for Clock {
  type T = u64;

  // microseconds
  const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

  fn try_now(&self) -> Result<embedded_time::Instant<Self>, embedded_time::clock::Error> {
    let now = std::time::Instant::now();
    let elapsed = now.duration_since(self.0);
    Ok(embedded_time::Instant::new(elapsed.as_micros() as u64))
  }
}

/// Polls an endpoint on a background thread until stopped (or dropped).
///
/// ```no_run
/// use std::sync::Arc;
///
/// let endpoint = Arc::new(ribbit::std::Endpoint::bind("0.0.0.0:0", Default::default()).unwrap());
/// let driver = ribbit::std::Driver::spawn(endpoint.clone()).unwrap();
///
/// // ... send requests & wait on them ...
///
/// driver.stop();
/// ```
#[derive(Debug)]
pub struct Driver {
  stop: Arc<AtomicBool>,
  thread: Option<JoinHandle<()>>,
}

impl Driver {
  /// How long the driver sleeps between polls, by default
  pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1);

  /// Poll `endpoint` every [`Driver::DEFAULT_INTERVAL`]
  pub fn spawn<C, S>(endpoint: Arc<crate::core::Endpoint<C, S>>) -> io::Result<Self>
    where C: time::Clock + Send + Sync + 'static,
          S: Socket + Send + Sync + 'static
  {
    Self::spawn_every(endpoint, Self::DEFAULT_INTERVAL)
  }

  /// Poll `endpoint`, sleeping `interval` whenever there was nothing to read
  pub fn spawn_every<C, S>(endpoint: Arc<crate::core::Endpoint<C, S>>,
                           interval: Duration)
                           -> io::Result<Self>
    where C: time::Clock + Send + Sync + 'static,
          S: Socket + Send + Sync + 'static
  {
    let stop = Arc::new(AtomicBool::new(false));
    let stopped = stop.clone();

    let thread = thread::Builder::new().name("ribbit-driver".into())
                                       .spawn(move || {
                                         while !stopped.load(Ordering::Relaxed) {
                                           if let Err(e) = endpoint.poll() {
                                             log::error!(target: crate::logging::TARGET,
                                                         "polling failed: {:?}",
                                                         e);
                                           }
                                           thread::sleep(interval);
                                         }
                                       })?;

    Ok(Self { stop,
              thread: Some(thread) })
  }

  /// Stop polling and wait for the background thread to finish
  pub fn stop(mut self) {
    self.shutdown();
  }

  fn shutdown(&mut self) {
    self.stop.store(true, Ordering::Relaxed);
    if let Some(thread) = self.thread.take() {
      if thread.join().is_err() {
        log::error!(target: crate::logging::TARGET, "driver thread panicked");
      }
    }
  }
}

impl Drop for Driver {
  fn drop(&mut self) {
    self.shutdown();
  }
}

#[cfg(test)]
mod tests {
  use embedded_time::Clock as _;
  use ribbit_msg::{Codec, SpecVersion, Type};

  use super::*;
  use crate::time::Timeout;

  #[test]
  fn clock_moves_forward() {
    let clock = Clock::new();
    let a = clock.try_now().unwrap();
    thread::sleep(Duration::from_millis(2));
    let b = clock.try_now().unwrap();

    assert!(time::millis_between(a, b) >= 2);
  }

  #[test]
  fn udp_ping_pong() {
    // a bare socket standing in for a server that resets pings
    let server = UdpSocket::bind("127.0.0.1:0").unwrap();
    server.set_read_timeout(Some(Duration::from_secs(5)))
          .unwrap();

    let endpoint = Arc::new(Endpoint::bind("127.0.0.1:0", Config::default()).unwrap());
    let driver = Driver::spawn(endpoint.clone()).unwrap();

    let exchange = endpoint.ping(server.local_addr().unwrap()).unwrap();

    let mut buf = [0u8; 64];
    let (n, from) = server.recv_from(&mut buf).unwrap();
    let ping = SpecVersion::Rfc7252.decode(&buf[..n]).unwrap();
    let rst = SpecVersion::Rfc7252.encode(&ping.reset()).unwrap();
    server.send_to(&rst, from).unwrap();

    let pong = exchange.wait(Timeout::Millis(5_000)).unwrap();
    assert_eq!(pong.ty(), Type::Reset);

    driver.stop();
    assert_eq!(endpoint.in_flight(), 0);
  }
}
