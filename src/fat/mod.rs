//! FAT16 write path: mount, cluster allocation, chain update, directory publish

mod boot;
mod dir;
mod format;
mod table;

pub use boot::{read_boot_sector, Geometry, MountState};
pub use dir::{file_name, DirEntry, FileKind};
pub use format::{format, FormatOptions};
pub use table::{FAT_FREE, FAT_TERMINAL};

use crate::block_device::{Block, BlockDevice};
use crate::config::BLOCK_SIZE;
use crate::error::{Error, Result};
use crate::time::TimeSource;

fn mount_failed(state: MountState, e: Error) -> Error {
    error!("mount failed in {:?}: {:?}", state, e);
    e
}

/// A mounted FAT16 volume. Geometry is fixed once mounted.
pub struct Volume<D, T> {
    device: D,
    time: T,
    geometry: Geometry,
    /// Scratch sector for FAT and directory read-modify-write
    block: Block,
}

impl<D: BlockDevice, T: TimeSource> Volume<D, T> {
    pub fn mount(mut device: D, time: T) -> Result<Self> {
        let mut block = [0u8; BLOCK_SIZE];
        let boot_offset = read_boot_sector(&mut device, &mut block)
            .map_err(|e| mount_failed(MountState::Uninitialized, e))?;
        trace!("mount: {:?}", MountState::BootRead);
        let geometry = Geometry::parse(&block, boot_offset)
            .map_err(|e| mount_failed(MountState::BootRead, e))?;
        trace!("mount: {:?}", MountState::BootParsed);
        info!(
            "FAT16 mounted: {} sectors/cluster, {} FATs, {} clusters, data at {}",
            geometry.sectors_per_cluster,
            geometry.fat_count,
            geometry.cluster_count,
            geometry.data_offset
        );
        Ok(Self {
            device,
            time,
            geometry,
            block,
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn release(self) -> (D, T) {
        (self.device, self.time)
    }

    pub fn cluster_offset(&self, cluster: u16) -> Result<u32> {
        self.geometry.cluster_offset(cluster)
    }

    /// Write one data block (`data.len() <= 512`, zero-padded).
    pub fn write_block(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        self.device.write_block(offset, data)
    }

    pub fn read_block(&mut self, offset: u32, block: &mut Block) -> Result<()> {
        self.device.read_block(offset, block)
    }

    /// Read block `index` of a file by walking its chain from `start`.
    pub fn read_file_block(&mut self, start: u16, index: u32, block: &mut Block) -> Result<()> {
        let spc = self.geometry.sectors_per_cluster as u32;
        let mut cluster = start;
        for _ in 0..index / spc {
            cluster = self.read_fat(cluster)?;
        }
        let offset = self.cluster_offset(cluster)? + (index % spc) * BLOCK_SIZE as u32;
        self.device.read_block(offset, block)
    }
}
