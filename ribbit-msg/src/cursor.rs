/// A cursor over a byte buffer, used by every decoder in this crate.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor<T> {
  t: T,
  cursor: usize,
  len: usize,
}

impl<T: AsRef<[u8]>> Cursor<T> {
  pub(crate) fn new(t: T) -> Cursor<T> {
    let len = t.as_ref().len();
    Cursor { t, cursor: 0, len }
  }

  fn peek_(len: usize, cursor: usize, t: &T, n: usize) -> Option<&[u8]> {
    if n > len - cursor {
      None
    } else {
      Some(&t.as_ref()[cursor..cursor + n])
    }
  }

  /// Take the next byte, or None when exhausted.
  pub(crate) fn next(&mut self) -> Option<u8> {
    self.take_exact(1).and_then(|a| match a {
                        | &[a] => Some(a),
                        | _ => None,
                      })
  }

  /// Take `n` bytes, returning None if fewer than `n` remain
  /// (in which case nothing is consumed).
  pub(crate) fn take_exact(&mut self, n: usize) -> Option<&[u8]> {
    Self::peek_(self.len, self.cursor, &self.t, n).map(|a| {
                                                    self.cursor += n;
                                                    a
                                                  })
  }

  /// Look at the next byte without consuming it
  pub(crate) fn peek_byte(&self) -> Option<u8> {
    Self::peek_(self.len, self.cursor, &self.t, 1).map(|a| a[0])
  }

  /// Consume everything left in the buffer
  pub(crate) fn take_until_end(&mut self) -> &[u8] {
    let start = self.cursor;
    self.cursor = self.len;
    &self.t.as_ref()[start..]
  }

  pub(crate) fn is_exhausted(&self) -> bool {
    self.cursor >= self.len
  }

  pub(crate) fn remaining(&self) -> usize {
    self.len - self.cursor
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn next() {
    let mut cur = Cursor::new(vec![1]);
    assert_eq!(cur.next(), Some(1));
    assert_eq!(cur.next(), None);
    assert!(cur.is_exhausted());
  }

  #[test]
  fn take_exact() {
    let mut cur = Cursor::new(vec![1, 2, 3]);
    assert_eq!(cur.take_exact(2), Some([1, 2].as_ref()));
    assert_eq!(cur.take_exact(2), None);
    assert_eq!(cur.remaining(), 1);
    assert_eq!(cur.take_exact(1), Some([3].as_ref()));
    assert!(cur.is_exhausted());
  }

  #[test]
  fn until_end() {
    let mut cur = Cursor::new([9u8, 8, 7]);
    assert_eq!(cur.peek_byte(), Some(9));
    cur.next();
    assert_eq!(cur.take_until_end(), &[8, 7]);
    assert_eq!(cur.take_until_end(), &[] as &[u8]);
    assert_eq!(cur.peek_byte(), None);
  }
}
