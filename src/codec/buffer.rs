// src/codec/buffer.rs

//! The linked-block byte buffer serialized values travel in.

use crate::cell::CellRef;
use crate::error::ApiaryError;

use static_assertions::const_assert;
use std::fmt;

/// Fixed size of every block in the chain.
pub(crate) const BLOCK_SIZE: usize = 128;

/// The first bytes of the first block hold the total stream length
/// (prefix included) as a little-endian u32.
pub(crate) const LENGTH_PREFIX: usize = 4;

const_assert!(BLOCK_SIZE > LENGTH_PREFIX);

pub(crate) struct Block {
  next: Option<Box<Block>>,
  data: [u8; BLOCK_SIZE],
}

impl Block {
  fn boxed() -> Box<Block> {
    Box::new(Block {
      next: None,
      data: [0u8; BLOCK_SIZE],
    })
  }
}

impl Drop for Block {
  fn drop(&mut self) {
    // Unlink iteratively so a long chain cannot overflow the stack.
    let mut next = self.next.take();
    while let Some(mut block) = next {
      next = block.next.take();
    }
  }
}

/// An owned serialized buffer: a chain of fixed-size blocks plus the cell
/// references grabbed while encoding.
///
/// Move-only by construction: it is produced once by [`crate::codec::encode`]
/// and consumed by value, exactly once, by [`crate::codec::decode`]. Dropping
/// an undecoded payload releases its blocks and its reference counts, so
/// "never decoded" degrades to a clean discard instead of a leak.
pub struct Payload {
  pub(crate) head: Option<Box<Block>>,
  pub(crate) len: usize,
  /// Keeps every cell referenced by the stream alive (and counted) while
  /// the buffer is in flight.
  pub(crate) refs: Vec<CellRef>,
}

impl Payload {
  /// Total stream length in bytes, length prefix included.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len <= LENGTH_PREFIX
  }
}

impl fmt::Debug for Payload {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Payload")
      .field("len", &self.len)
      .field("cell_refs", &self.refs.len())
      .finish()
  }
}

/// Accumulates encoded bytes across block boundaries.
pub(crate) struct BlockWriter {
  blocks: Vec<Box<Block>>,
  /// Write offset into the last block.
  ptr: usize,
  /// Total bytes written, length prefix included.
  len: usize,
  refs: Vec<CellRef>,
}

impl BlockWriter {
  pub fn new() -> Self {
    let mut writer = Self {
      blocks: vec![Block::boxed()],
      ptr: 0,
      len: 0,
      refs: Vec::new(),
    };
    // Placeholder for the length prefix, patched in finish().
    writer.push_bytes(&[0u8; LENGTH_PREFIX]);
    writer
  }

  pub fn push_bytes(&mut self, mut buf: &[u8]) {
    loop {
      if self.ptr == BLOCK_SIZE {
        self.blocks.push(Block::boxed());
        self.ptr = 0;
      }
      let take = (BLOCK_SIZE - self.ptr).min(buf.len());
      let block = self.blocks.last_mut().expect("writer always holds a block");
      block.data[self.ptr..self.ptr + take].copy_from_slice(&buf[..take]);
      self.ptr += take;
      self.len += take;
      buf = &buf[take..];
      if buf.is_empty() {
        return;
      }
    }
  }

  /// Records a reference grabbed for an encoded cell value. Dropped (and
  /// thereby released) with the writer if encoding aborts.
  pub fn hold_ref(&mut self, r: CellRef) {
    self.refs.push(r);
  }

  /// Seals the stream: patches the length prefix and links the blocks into
  /// the final chain.
  pub fn finish(mut self) -> Payload {
    let total = self.len as u32;
    self.blocks[0].data[..LENGTH_PREFIX].copy_from_slice(&total.to_le_bytes());

    let mut head: Option<Box<Block>> = None;
    while let Some(mut block) = self.blocks.pop() {
      block.next = head;
      head = Some(block);
    }
    Payload {
      head,
      len: self.len,
      refs: std::mem::take(&mut self.refs),
    }
  }
}

/// Consumes a block chain, freeing each block as soon as it has been read.
pub(crate) struct BlockReader {
  current: Option<Box<Block>>,
  /// Read offset into the current block.
  ptr: usize,
  /// Payload bytes left to read (prefix excluded).
  remaining: usize,
}

impl BlockReader {
  pub fn new(head: Box<Block>) -> Result<Self, ApiaryError> {
    let stored = u32::from_le_bytes(
      head.data[..LENGTH_PREFIX]
        .try_into()
        .expect("prefix fits in the first block"),
    ) as usize;
    if stored < LENGTH_PREFIX {
      return Err(ApiaryError::protocol("stream length prefix is corrupt"));
    }
    Ok(Self {
      current: Some(head),
      ptr: LENGTH_PREFIX,
      remaining: stored - LENGTH_PREFIX,
    })
  }

  pub fn is_empty(&self) -> bool {
    self.remaining == 0
  }

  /// Copies exactly `buf.len()` bytes out of the chain, crossing and freeing
  /// block boundaries as needed. Errors if the declared stream length or the
  /// chain itself runs out first.
  pub fn read(&mut self, buf: &mut [u8]) -> Result<(), ApiaryError> {
    if buf.len() > self.remaining {
      return Err(ApiaryError::protocol(format!(
        "truncated stream: wanted {} bytes, {} left",
        buf.len(),
        self.remaining
      )));
    }
    let mut off = 0;
    while off < buf.len() {
      if self.ptr == BLOCK_SIZE {
        self.current = self.current.as_mut().and_then(|b| b.next.take());
        self.ptr = 0;
      }
      let Some(block) = self.current.as_ref() else {
        return Err(ApiaryError::protocol("stream ended inside a value"));
      };
      let take = (BLOCK_SIZE - self.ptr).min(buf.len() - off);
      buf[off..off + take].copy_from_slice(&block.data[self.ptr..self.ptr + take]);
      self.ptr += take;
      off += take;
      self.remaining -= take;
    }
    Ok(())
  }

  pub fn read_u8(&mut self) -> Result<u8, ApiaryError> {
    let mut b = [0u8; 1];
    self.read(&mut b)?;
    Ok(b[0])
  }

  pub fn read_u16(&mut self) -> Result<u16, ApiaryError> {
    let mut b = [0u8; 2];
    self.read(&mut b)?;
    Ok(u16::from_le_bytes(b))
  }

  pub fn read_u32(&mut self) -> Result<u32, ApiaryError> {
    let mut b = [0u8; 4];
    self.read(&mut b)?;
    Ok(u32::from_le_bytes(b))
  }

  pub fn read_i32(&mut self) -> Result<i32, ApiaryError> {
    let mut b = [0u8; 4];
    self.read(&mut b)?;
    Ok(i32::from_le_bytes(b))
  }

  pub fn read_u64(&mut self) -> Result<u64, ApiaryError> {
    let mut b = [0u8; 8];
    self.read(&mut b)?;
    Ok(u64::from_le_bytes(b))
  }

  pub fn read_f64(&mut self) -> Result<f64, ApiaryError> {
    let mut b = [0u8; 8];
    self.read(&mut b)?;
    Ok(f64::from_le_bytes(b))
  }

  pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>, ApiaryError> {
    let mut v = vec![0u8; len];
    self.read(&mut v)?;
    Ok(v)
  }
}
