use std::net::{IpAddr, SocketAddr};

/// Data that came from (or is going to) a network socket
///
/// ```
/// use ribbit::net::Addrd;
///
/// let addr = "127.0.0.1:5683".parse().unwrap();
/// let dgram = Addrd(vec![1u8, 2, 3], addr);
///
/// assert_eq!(dgram.as_ref().map(|bytes| bytes.len()), Addrd(3, addr));
/// assert_eq!(dgram.unwrap(), vec![1, 2, 3]);
/// ```
#[derive(PartialEq, PartialOrd, Eq, Ord, Hash, Debug, Clone, Copy)]
pub struct Addrd<T>(pub T, pub SocketAddr);

impl<T> Addrd<T> {
  /// Borrow the data, keeping the address
  pub fn as_ref(&self) -> Addrd<&T> {
    Addrd(&self.0, self.1)
  }

  /// Drop the address
  pub fn unwrap(self) -> T {
    self.0
  }

  /// Transform the data, keeping the address
  pub fn map<R>(self, f: impl FnOnce(T) -> R) -> Addrd<R> {
    let Addrd(t, addr) = self;
    Addrd(f(t), addr)
  }

  /// The data
  pub fn data(&self) -> &T {
    &self.0
  }

  /// The peer the data came from or is headed to
  pub fn addr(&self) -> SocketAddr {
    self.1
  }
}

/// A datagram socket an [`Endpoint`](crate::core::Endpoint) can talk over.
///
/// Implemented for [`std::net::UdpSocket`], and for in-memory
/// sockets in tests. Every operation takes `&self` so that one
/// socket can be shared by every thread driving an endpoint.
pub trait Socket {
  /// Error from the underlying transport
  type Error: core::fmt::Debug;

  /// The address this socket is bound to
  fn local_addr(&self) -> SocketAddr;

  /// Send one datagram to the address it is paired with
  fn send(&self, msg: Addrd<&[u8]>) -> nb::Result<(), Self::Error>;

  /// Read one waiting datagram into `buffer`, yielding its length
  /// and sender. Bytes that don't fit in `buffer` are discarded.
  fn recv(&self, buffer: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error>;

  /// Poll the socket for a datagram, reading at most `max` bytes of it.
  ///
  /// Yields `Ok(None)` when nothing is waiting to be read.
  fn poll(&self, max: usize) -> Result<Option<Addrd<Vec<u8>>>, Self::Error> {
    let mut buf = vec![0u8; max];

    match self.recv(&mut buf) {
      | Ok(Addrd(n, addr)) => {
        buf.truncate(n);
        Ok(Some(Addrd(buf, addr)))
      },
      | Err(nb::Error::WouldBlock) => Ok(None),
      | Err(nb::Error::Other(e)) => Err(e),
    }
  }

  /// Join a multicast group
  fn join_multicast(&self, addr: IpAddr) -> Result<(), Self::Error>;
}
