/// Largest block number representable in the 3-byte Block1/Block2 option
pub const MAX_BLOCK_NUM: u32 = (1 << 20) - 1;

/// Turn a block size in bytes into a size exponent (SZX).
///
/// Sizes are rounded down to the nearest power of two,
/// then clamped to `16..=1024` (`SZX` `0..=6`).
///
/// ```
/// use ribbit_msg::encode_szx;
///
/// assert_eq!(encode_szx(0), 0);
/// assert_eq!(encode_szx(16), 0);
/// assert_eq!(encode_szx(100), 2);
/// assert_eq!(encode_szx(1024), 6);
/// assert_eq!(encode_szx(4096), 6);
/// ```
pub const fn encode_szx(size: usize) -> u8 {
  if size < 16 {
    0
  } else if size > 1024 {
    6
  } else {
    // floor(log2(size)) - 4
    (usize::BITS - 1 - size.leading_zeros()) as u8 - 4
  }
}

/// Turn a size exponent into a block size in bytes (`16 << szx`).
///
/// `7` is reserved, and is treated as `6`.
///
/// ```
/// use ribbit_msg::decode_szx;
///
/// assert_eq!(decode_szx(0), 16);
/// assert_eq!(decode_szx(6), 1024);
/// ```
pub const fn decode_szx(szx: u8) -> u16 {
  let szx = if szx > 6 { 6 } else { szx };
  16 << szx
}

/// Three items of information may need to be transferred in a
/// Block (Block1 or Block2) option:
/// * the size of the block ([`Block::size`])
/// * whether more blocks are following ([`Block::more`])
/// * the relative number of the block ([`Block::num`]) within a sequence of blocks with the given size.
///
/// These are packed into a single integer; `(NUM << 4) | (M << 3) | SZX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(u32);

impl Block {
  /// Create a block from a size in bytes (see [`encode_szx`]), block number and more flag
  pub fn new(size: u16, num: u32, more: bool) -> Self {
    Self::from_szx(encode_szx(size as usize), num, more)
  }

  /// Create a block from a size exponent, block number and more flag
  pub fn from_szx(szx: u8, num: u32, more: bool) -> Self {
    let num = num << 4;
    let more = u32::from(more) << 3;
    let szx = u32::from(szx.min(6));

    Self(num | more | szx)
  }

  /// Size of the block, in bytes
  pub fn size(&self) -> u16 {
    decode_szx(self.szx())
  }

  /// The size exponent
  pub fn szx(&self) -> u8 {
    (self.0 & 0b111) as u8
  }

  /// Whether more blocks follow this one
  pub fn more(&self) -> bool {
    (self.0 & 0b1000) >> 3 == 1
  }

  /// Block number (0-based)
  pub fn num(&self) -> u32 {
    self.0 >> 4
  }

  /// Offset of this block's first byte within the whole body
  pub fn offset(&self) -> usize {
    self.num() as usize * self.size() as usize
  }

  /// Describe the same byte offset at a smaller block size.
  ///
  /// Used when a peer asks for smaller blocks than we started with;
  /// the block number is rescaled so that no bytes are skipped or repeated.
  ///
  /// ```
  /// use ribbit_msg::Block;
  ///
  /// let b = Block::new(1024, 1, true);
  /// let smaller = b.resized(256);
  /// assert_eq!(smaller.num(), 4);
  /// assert_eq!(smaller.size(), 256);
  /// assert_eq!(smaller.offset(), b.offset());
  /// ```
  pub fn resized(&self, size: u16) -> Self {
    let szx = encode_szx(size as usize).min(self.szx());
    let num = (self.offset() / decode_szx(szx) as usize) as u32;
    Self::from_szx(szx, num, self.more())
  }
}

impl From<Block> for u32 {
  fn from(b: Block) -> Self {
    b.0
  }
}

impl From<u32> for Block {
  fn from(n: u32) -> Self {
    Block(n)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn block() {
    let b = Block(33);
    assert_eq!(b.size(), 32);
    assert_eq!(b.num(), 2);
    assert_eq!(b.more(), false);

    let b = Block(59);
    assert_eq!(b.size(), 128);
    assert_eq!(b.num(), 3);
    assert_eq!(b.more(), true);

    assert_eq!(Block::new(32, 2, false), Block(33));
    assert_eq!(Block::new(128, 3, true), Block(59));
  }

  #[test]
  fn size_rounds_down_to_nearest_power_of_two() {
    assert_eq!(Block::new(0, 1, false).size(), 16);
    assert_eq!(Block::new(10, 1, false).size(), 16);
    assert_eq!(Block::new(17, 1, false).size(), 16);
    assert_eq!(Block::new(31, 1, false).size(), 16);
    assert_eq!(Block::new(33, 1, false).size(), 32);
    assert_eq!(Block::new(64, 1, false).size(), 64);
    assert_eq!(Block::new(1024, 1, false).size(), 1024);
    assert_eq!(Block::new(2048, 1, false).size(), 1024);
  }

  #[test]
  fn szx_roundtrip() {
    let sizes = (0..=6u8).map(decode_szx).collect::<Vec<_>>();
    assert_eq!(sizes, vec![16, 32, 64, 128, 256, 512, 1024]);

    (0..=6u8).for_each(|szx| assert_eq!(encode_szx(decode_szx(szx) as usize), szx));
  }

  #[test]
  fn szx_clamps() {
    (0..16).for_each(|size| assert_eq!(encode_szx(size), 0));
    [1025, 2048, usize::MAX].into_iter()
                            .for_each(|size| assert_eq!(encode_szx(size), 6));
    assert_eq!(decode_szx(7), 1024);
  }

  #[test]
  fn pack() {
    let b = Block::from_szx(2, 1, false);
    assert_eq!(u32::from(b), (1 << 4) | 2);
    assert_eq!(b.offset(), 64);
  }
}
