//! Quick format: fresh boot sector, empty FATs, empty root directory

use super::boot::{Geometry, BOOT_SIG, BOOT_SIG_OFFSET, DIR_ENTRY_SIZE, FS_TYPE_OFFSET, MBR_PART0_LBA};
use crate::block_device::BlockDevice;
use crate::config::BLOCK_SIZE;
use crate::error::{Error, Result};

const MEDIA_FIXED: u8 = 0xF8;
const PART_TYPE_FAT16: u8 = 0x06;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// Sectors in the volume, hidden sectors excluded
    pub total_sectors: u32,
    pub sectors_per_cluster: u8,
    pub fat_count: u8,
    pub root_entries: u16,
    pub reserved_sectors: u16,
    /// Sectors before the volume; non-zero writes an MBR at sector 0
    pub hidden_sectors: u32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            total_sectors: 0,
            sectors_per_cluster: 4,
            fat_count: 2,
            root_entries: 512,
            reserved_sectors: 1,
            hidden_sectors: 0,
        }
    }
}

impl FormatOptions {
    fn sectors_per_fat(&self) -> u32 {
        let sector = BLOCK_SIZE as u32;
        let root = (self.root_entries as u32 * DIR_ENTRY_SIZE).div_ceil(sector);
        let data = self
            .total_sectors
            .saturating_sub(self.reserved_sectors as u32 + root);
        let clusters = data / self.sectors_per_cluster as u32;
        ((clusters + 2) * 2).div_ceil(sector)
    }
}

/// Lay down an empty FAT16 volume and return its geometry.
pub fn format<D: BlockDevice>(dev: &mut D, opts: &FormatOptions) -> Result<Geometry> {
    let spf = opts.sectors_per_fat();
    if opts.sectors_per_cluster == 0
        || opts.fat_count == 0
        || opts.reserved_sectors == 0
        || spf > u16::MAX as u32
    {
        return Err(Error::UnsupportedFilesystem);
    }
    let sector = BLOCK_SIZE as u32;
    let boot_offset = opts.hidden_sectors * sector;

    let mut block = [0u8; BLOCK_SIZE];
    if opts.hidden_sectors > 0 {
        // Zeroed boot code marks sector 0 as an MBR
        block[MBR_PART0_LBA - 4] = PART_TYPE_FAT16;
        block[MBR_PART0_LBA..MBR_PART0_LBA + 4].copy_from_slice(&opts.hidden_sectors.to_le_bytes());
        block[MBR_PART0_LBA + 4..MBR_PART0_LBA + 8].copy_from_slice(&opts.total_sectors.to_le_bytes());
        block[BOOT_SIG_OFFSET..].copy_from_slice(&BOOT_SIG);
        dev.write_block(0, &block)?;
        block.fill(0);
    }

    block[..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
    block[3..11].copy_from_slice(b"MSDOS5.0");
    block[0x0B..0x0D].copy_from_slice(&(BLOCK_SIZE as u16).to_le_bytes());
    block[0x0D] = opts.sectors_per_cluster;
    block[0x0E..0x10].copy_from_slice(&opts.reserved_sectors.to_le_bytes());
    block[0x10] = opts.fat_count;
    block[0x11..0x13].copy_from_slice(&opts.root_entries.to_le_bytes());
    if opts.total_sectors <= u16::MAX as u32 {
        block[0x13..0x15].copy_from_slice(&(opts.total_sectors as u16).to_le_bytes());
    } else {
        block[0x20..0x24].copy_from_slice(&opts.total_sectors.to_le_bytes());
    }
    block[0x15] = MEDIA_FIXED;
    block[0x16..0x18].copy_from_slice(&(spf as u16).to_le_bytes());
    block[0x1C..0x20].copy_from_slice(&opts.hidden_sectors.to_le_bytes());
    block[0x24] = 0x80;
    block[0x26] = 0x29;
    block[0x2B..0x36].copy_from_slice(b"NO NAME    ");
    block[FS_TYPE_OFFSET..FS_TYPE_OFFSET + 8].copy_from_slice(b"FAT16   ");
    block[BOOT_SIG_OFFSET..].copy_from_slice(&BOOT_SIG);
    dev.write_block(boot_offset, &block)?;
    let geometry = Geometry::parse(&block, boot_offset)?;

    let zero = [0u8; BLOCK_SIZE];
    for copy in 0..geometry.fat_count as u32 {
        let base = geometry.fat_offset + copy * geometry.fat_size;
        let mut head = zero;
        head[..4].copy_from_slice(&[MEDIA_FIXED, 0xFF, 0xFF, 0xFF]);
        dev.write_block(base, &head)?;
        for s in 1..spf {
            dev.write_block(base + s * sector, &zero)?;
        }
    }
    let mut rel = 0;
    while rel < geometry.dir_size {
        dev.write_block(geometry.dir_offset + rel, &zero)?;
        rel += sector;
    }
    info!(
        "formatted FAT16: {} sectors, {} clusters",
        opts.total_sectors, geometry.cluster_count
    );
    Ok(geometry)
}
