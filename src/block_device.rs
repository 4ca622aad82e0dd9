//! 512-byte block storage addressed by byte offset

use crate::config::BLOCK_SIZE;
use crate::error::{Error, Result};

pub type Block = [u8; BLOCK_SIZE];

/// Single-block read/write. Offsets are byte offsets on the medium and are
/// expected to be block aligned.
pub trait BlockDevice {
    fn read_block(&mut self, offset: u32, block: &mut Block) -> Result<()>;

    /// Write `data` (at most one block) at `offset`; a short slice is
    /// zero-padded to a full block.
    fn write_block(&mut self, offset: u32, data: &[u8]) -> Result<()>;
}

impl<T: BlockDevice + ?Sized> BlockDevice for &mut T {
    fn read_block(&mut self, offset: u32, block: &mut Block) -> Result<()> {
        (**self).read_block(offset, block)
    }

    fn write_block(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        (**self).write_block(offset, data)
    }
}

/// In-memory device over a borrowed image.
pub struct RamDisk<'a> {
    buf: &'a mut [u8],
    writes: usize,
}

impl<'a> RamDisk<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, writes: 0 }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Block writes performed so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn as_slice(&self) -> &[u8] {
        self.buf
    }

    fn range(&self, offset: u32) -> Result<core::ops::Range<usize>> {
        let start = offset as usize;
        let end = start + BLOCK_SIZE;
        if end > self.buf.len() {
            return Err(Error::OutOfRange(offset));
        }
        Ok(start..end)
    }
}

impl BlockDevice for RamDisk<'_> {
    fn read_block(&mut self, offset: u32, block: &mut Block) -> Result<()> {
        let r = self.range(offset)?;
        block.copy_from_slice(&self.buf[r]);
        Ok(())
    }

    fn write_block(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        if data.len() > BLOCK_SIZE {
            return Err(Error::BufferOverflow);
        }
        let r = self.range(offset)?;
        let dst = &mut self.buf[r];
        dst[..data.len()].copy_from_slice(data);
        dst[data.len()..].fill(0);
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_write_is_zero_padded() {
        let mut img = [0xAAu8; 1024];
        let mut disk = RamDisk::new(&mut img);
        disk.write_block(512, b"abc").unwrap();
        let mut blk = [0u8; BLOCK_SIZE];
        disk.read_block(512, &mut blk).unwrap();
        assert_eq!(&blk[..3], b"abc");
        assert!(blk[3..].iter().all(|&b| b == 0));
        disk.read_block(0, &mut blk).unwrap();
        assert!(blk.iter().all(|&b| b == 0xAA));
        assert_eq!(disk.writes(), 1);
    }

    #[test]
    fn out_of_range() {
        let mut img = [0u8; 512];
        let mut disk = RamDisk::new(&mut img);
        let mut blk = [0u8; BLOCK_SIZE];
        assert_eq!(disk.read_block(512, &mut blk), Err(Error::OutOfRange(512)));
        assert_eq!(disk.write_block(0, &[0u8; 513]), Err(Error::BufferOverflow));
    }
}
