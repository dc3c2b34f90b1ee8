//! sdspi-store - Block Device support
//!
//! Generic code for handling block devices.

use core::ops::Range;

mod block;
pub use block::*;

/// Storage addressed in 512 byte blocks. Block indices are `u32`, so the
/// largest device is 2 TiB.
pub trait BlockDevice {
    type Error: core::fmt::Debug;

    /// Fill `blocks` from consecutive blocks beginning at `start`. `reason`
    /// only shows up in trace logs.
    fn read(
        &mut self,
        blocks: &mut [Block],
        start: BlockIdx,
        reason: &str,
    ) -> Result<(), Self::Error>;

    /// Store `blocks` at consecutive blocks beginning at `start`.
    fn write(&mut self, blocks: &[Block], start: BlockIdx) -> Result<(), Self::Error>;

    /// Size of the device.
    fn num_blocks(&mut self) -> Result<BlockCount, Self::Error>;

    fn read_block(&mut self, idx: BlockIdx) -> Result<Block, Self::Error> {
        let mut buffer = [Block::new()];
        self.read(&mut buffer, idx, "read_block")?;
        let [block] = buffer;
        Ok(block)
    }
}

impl<T> BlockDevice for &mut T
where
    T: BlockDevice,
{
    type Error = T::Error;

    fn read(
        &mut self,
        blocks: &mut [Block],
        start: BlockIdx,
        reason: &str,
    ) -> Result<(), T::Error> {
        (**self).read(blocks, start, reason)
    }

    fn write(&mut self, blocks: &[Block], start: BlockIdx) -> Result<(), T::Error> {
        (**self).write(blocks, start)
    }

    fn num_blocks(&mut self) -> Result<BlockCount, T::Error> {
        (**self).num_blocks()
    }
}

/// The errors a `MemoryBlockDevice` can return.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The access ran past the end of the backing buffer.
    OutOfRange {
        /// First block of the failed access.
        start: BlockIdx,
        /// Number of blocks the access covered.
        len: u32,
    },
}

/// A block device backed by an owned byte buffer. Handy for disk images and
/// tests.
#[derive(Debug, Clone)]
pub struct MemoryBlockDevice {
    memory: Vec<u8>,
}

impl MemoryBlockDevice {
    /// Wrap an image. Trailing bytes that do not fill a whole block are
    /// ignored.
    pub fn new(memory: Vec<u8>) -> Self {
        Self { memory }
    }

    /// An all-zero device of `num_blocks` blocks.
    pub fn zeroed(num_blocks: u32) -> Self {
        Self::new(vec![0u8; num_blocks as usize * Block::LEN])
    }

    /// Byte range covered by `count` blocks from `start`.
    fn span(&self, start: BlockIdx, count: usize) -> Result<Range<usize>, MemoryError> {
        let from = start.0 as usize * Block::LEN;
        let to = from + count * Block::LEN;
        if to > self.memory.len() {
            return Err(MemoryError::OutOfRange {
                start,
                len: count as u32,
            });
        }
        Ok(from..to)
    }
}

impl BlockDevice for MemoryBlockDevice {
    type Error = MemoryError;

    fn read(
        &mut self,
        blocks: &mut [Block],
        start: BlockIdx,
        _reason: &str,
    ) -> Result<(), MemoryError> {
        let span = self.span(start, blocks.len())?;
        let source = self.memory[span].chunks_exact(Block::LEN);
        for (block, bytes) in blocks.iter_mut().zip(source) {
            block.contents.copy_from_slice(bytes);
        }
        Ok(())
    }

    fn write(&mut self, blocks: &[Block], start: BlockIdx) -> Result<(), MemoryError> {
        let span = self.span(start, blocks.len())?;
        let target = self.memory[span].chunks_exact_mut(Block::LEN);
        for (bytes, block) in target.zip(blocks) {
            bytes.copy_from_slice(&block.contents);
        }
        Ok(())
    }

    fn num_blocks(&mut self) -> Result<BlockCount, MemoryError> {
        Ok(BlockCount((self.memory.len() / Block::LEN) as u32))
    }
}
