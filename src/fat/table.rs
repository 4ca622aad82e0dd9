//! FAT cell access: allocation, linking, chain walks

use super::Volume;
use crate::block_device::BlockDevice;
use crate::config::BLOCK_SIZE;
use crate::error::{Error, Result};
use crate::time::TimeSource;

pub const FAT_FREE: u16 = 0x0000;
pub const FAT_TERMINAL: u16 = 0xFFFF;
/// Cells at or above this value end a chain
const FAT_END_MIN: u16 = 0xFFF8;

const CELLS_PER_BLOCK: u32 = BLOCK_SIZE as u32 / 2;

impl<D: BlockDevice, T: TimeSource> Volume<D, T> {
    fn check_cluster(&self, cluster: u16) -> Result<()> {
        if cluster < 2 || cluster as u32 >= self.geometry.cluster_limit() {
            return Err(Error::InvalidCluster(cluster));
        }
        Ok(())
    }

    /// Byte offset of the FAT block holding `cluster`, relative to the FAT start.
    fn fat_block_of(cluster: u16) -> (u32, usize) {
        let byte = cluster as u32 * 2;
        (byte - byte % BLOCK_SIZE as u32, (byte % BLOCK_SIZE as u32) as usize)
    }

    /// Write the scratch block to the same place in every FAT copy.
    fn write_fat_block(&mut self, rel: u32) -> Result<()> {
        for copy in 0..self.geometry.fat_count as u32 {
            let offset = self.geometry.fat_offset + copy * self.geometry.fat_size + rel;
            self.device.write_block(offset, &self.block)?;
        }
        Ok(())
    }

    /// Allocate the first free cluster. The cell is marked terminal in every
    /// FAT copy before the index is returned, so it can never be handed out
    /// twice.
    pub fn find_cluster(&mut self) -> Result<u16> {
        let limit = self.geometry.cluster_limit();
        let mut cluster = 2u32;
        while cluster < limit {
            let (rel, _) = Self::fat_block_of(cluster as u16);
            self.device
                .read_block(self.geometry.fat_offset + rel, &mut self.block)?;
            let block_end = (rel / 2 + CELLS_PER_BLOCK).min(limit);
            while cluster < block_end {
                let at = (cluster * 2 % BLOCK_SIZE as u32) as usize;
                if self.block[at] == 0 && self.block[at + 1] == 0 {
                    self.block[at..at + 2].copy_from_slice(&FAT_TERMINAL.to_le_bytes());
                    self.write_fat_block(rel)?;
                    trace!("allocated cluster {}", cluster);
                    return Ok(cluster as u16);
                }
                cluster += 1;
            }
        }
        warn!("no free cluster among {}", limit.saturating_sub(2));
        Err(Error::DiskFull)
    }

    /// Point `cluster`'s cell at `next` in every FAT copy.
    pub fn update_fat(&mut self, cluster: u16, next: u16) -> Result<()> {
        self.check_cluster(cluster)?;
        let (rel, at) = Self::fat_block_of(cluster);
        self.device
            .read_block(self.geometry.fat_offset + rel, &mut self.block)?;
        self.block[at..at + 2].copy_from_slice(&next.to_le_bytes());
        self.write_fat_block(rel)?;
        trace!("FAT[{}] = {}", cluster, next);
        Ok(())
    }

    /// Value of `cluster`'s cell in the first FAT.
    pub fn read_fat(&mut self, cluster: u16) -> Result<u16> {
        self.check_cluster(cluster)?;
        let (rel, at) = Self::fat_block_of(cluster);
        self.device
            .read_block(self.geometry.fat_offset + rel, &mut self.block)?;
        Ok(u16::from_le_bytes([self.block[at], self.block[at + 1]]))
    }

    /// Copy the chain starting at `start` into `out`, stopping at the end
    /// marker, when `out` is full, or when the walk returns to `start`.
    /// Returns the number of clusters written.
    pub fn follow_chain(&mut self, start: u16, out: &mut [u16]) -> Result<usize> {
        let mut n = 0;
        let mut cur = start;
        while n < out.len() {
            out[n] = cur;
            n += 1;
            let next = self.read_fat(cur)?;
            if next >= FAT_END_MIN || next == start {
                break;
            }
            if next == FAT_FREE {
                return Err(Error::InvalidCluster(cur));
            }
            cur = next;
        }
        Ok(n)
    }

    /// Return every cluster of a chain (open or closed ring) to the free pool.
    pub fn release_chain(&mut self, start: u16) -> Result<u32> {
        let mut freed = 0;
        let mut cur = start;
        let limit = self.geometry.cluster_limit();
        while freed < limit {
            let next = self.read_fat(cur)?;
            self.update_fat(cur, FAT_FREE)?;
            freed += 1;
            if next >= FAT_END_MIN || next == FAT_FREE || next == start {
                break;
            }
            cur = next;
        }
        debug!("released {} clusters from {}", freed, start);
        Ok(freed)
    }
}
