//! Bodies too big for one datagram travel in blocks.
//!
//! - [`Upload`] slices a request body into Block1 pieces, following the
//!   server's lead if it asks for smaller blocks.
//! - [`Assembler`] glues the Block2 pieces of a response body back together,
//!   and says which block to ask for next.
//!
//! Neither touches the network; the [`Endpoint`](crate::core::Endpoint)
//! turns their decisions into follow-up requests.

use ribbit_msg::Block;

/// A block arrived that does not continue the body received so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfOrder {
  /// Offset of the next byte we were waiting for
  pub expected_offset: usize,
  /// The block that arrived instead
  pub got: Block,
}

/// Outcome of feeding a block to an [`Assembler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
  /// More blocks follow; request this one next
  Incomplete(Block),
  /// That was the last block; here is the whole body
  Complete(Vec<u8>),
}

/// Reassembles a response body from Block2 pieces.
///
/// Pieces must arrive in order; the block number of the next request
/// is `bytes received / server's block size`, so a server may switch
/// to a smaller block size partway through.
///
/// ```
/// use ribbit::block::{Assembler, Piece};
/// use ribbit_msg::Block;
///
/// let mut asm = Assembler::default();
/// assert_eq!(asm.push(Block::new(32, 0, true), &[0; 32]),
///            Ok(Piece::Incomplete(Block::new(32, 1, false))));
///
/// // server drops to 16 byte blocks
/// assert_eq!(asm.push(Block::new(16, 2, true), &[1; 16]),
///            Ok(Piece::Incomplete(Block::new(16, 3, false))));
///
/// match asm.push(Block::new(16, 3, false), &[2; 5]) {
///   | Ok(Piece::Complete(body)) => assert_eq!(body.len(), 53),
///   | other => panic!("{:?}", other),
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembler {
  body: Vec<u8>,
}

impl Assembler {
  /// Bytes received so far
  pub fn received(&self) -> usize {
    self.body.len()
  }

  /// Add a block to the body
  pub fn push(&mut self, block: Block, payload: &[u8]) -> Result<Piece, OutOfOrder> {
    if block.offset() != self.body.len() {
      return Err(OutOfOrder { expected_offset: self.body.len(),
                              got: block });
    }

    self.body.extend_from_slice(payload);

    if block.more() {
      let size = block.size();
      let num = (self.body.len() / size as usize) as u32;
      Ok(Piece::Incomplete(Block::new(size, num, false)))
    } else {
      Ok(Piece::Complete(core::mem::take(&mut self.body)))
    }
  }
}

/// Uploads a request body in Block1 pieces.
///
/// ```
/// use ribbit::block::Upload;
/// use ribbit_msg::Block;
///
/// let mut up = Upload::new(vec![7; 100], 64);
/// assert_eq!(up.current(), (Block::new(64, 0, true), &[7u8; 64][..]));
///
/// // server acknowledges block 0 and asks for 32 byte blocks
/// assert!(up.advance(Block::new(32, 0, true)));
/// assert_eq!(up.current(), (Block::new(32, 2, true), &[7u8; 32][..]));
///
/// assert!(up.advance(Block::new(32, 2, true)));
/// assert_eq!(up.current(), (Block::new(32, 3, false), &[7u8; 4][..]));
///
/// assert!(!up.advance(Block::new(32, 3, false)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
  body: Vec<u8>,
  size: u16,
  offset: usize,
}

impl Upload {
  /// Prepare to upload `body` in blocks of `size` bytes
  pub fn new(body: Vec<u8>, size: u16) -> Self {
    Self { body,
           size: Block::new(size, 0, false).size(),
           offset: 0 }
  }

  /// Does a body of `len` bytes need to be split into blocks of `size`?
  pub fn needed(len: usize, size: u16) -> bool {
    len > Block::new(size, 0, false).size() as usize
  }

  /// Length of the whole body (sent as Size1)
  pub fn total_len(&self) -> usize {
    self.body.len()
  }

  /// The Block1 option & payload of the block to send now
  pub fn current(&self) -> (Block, &[u8]) {
    let size = self.size as usize;
    let end = (self.offset + size).min(self.body.len());
    let block = Block::new(self.size,
                           (self.offset / size) as u32,
                           end < self.body.len());

    (block, &self.body[self.offset.min(end)..end])
  }

  /// The server accepted the current block (it answered 2.31 Continue
  /// echoing `ack`). Moves on to the next block, adopting the
  /// server's block size if it is smaller than ours.
  ///
  /// Yields `false` when the body has been sent completely.
  pub fn advance(&mut self, ack: Block) -> bool {
    let (sent, payload) = self.current();
    self.offset = sent.offset() + payload.len();
    self.size = self.size.min(ack.size());
    self.offset < self.body.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn assembler_rejects_gaps() {
    let mut asm = Assembler::default();
    asm.push(Block::new(16, 0, true), &[0; 16]).unwrap();

    assert_eq!(asm.push(Block::new(16, 2, true), &[0; 16]),
               Err(OutOfOrder { expected_offset: 16,
                                got: Block::new(16, 2, true) }));
    assert_eq!(asm.received(), 16);
  }

  #[test]
  fn assembler_single_block() {
    let mut asm = Assembler::default();
    assert_eq!(asm.push(Block::new(1024, 0, false), b"hi"),
               Ok(Piece::Complete(b"hi".to_vec())));
    assert_eq!(asm.received(), 0);
  }

  #[test]
  fn upload_blocks_cover_body_once() {
    let body = (0..=255u8).cycle().take(1000).collect::<Vec<_>>();
    let mut up = Upload::new(body.clone(), 256);
    let mut sent = Vec::new();

    loop {
      let (block, payload) = up.current();
      assert_eq!(block.offset(), sent.len());
      sent.extend_from_slice(payload);
      if !up.advance(block) {
        break;
      }
    }

    assert_eq!(sent, body);
  }

  #[test]
  fn upload_threshold() {
    assert!(!Upload::needed(1024, 1024));
    assert!(Upload::needed(1025, 1024));
    assert!(Upload::needed(17, 16));
  }
}
