//! Boot sector location, validation and geometry

use crate::block_device::{Block, BlockDevice};
use crate::config::BLOCK_SIZE;
use crate::error::{Error, Result};

pub const BOOT_SIG_OFFSET: usize = 0x1FE;
pub const BOOT_SIG: [u8; 2] = [0x55, 0xAA];
/// LBA of the first partition in an MBR
pub const MBR_PART0_LBA: usize = 0x1C6;
pub const FS_TYPE_OFFSET: usize = 0x36;
pub const FS_TYPE_FAT16: &[u8; 5] = b"FAT16";
pub const DIR_ENTRY_SIZE: u32 = 32;

/// Steps of mounting a volume. A failure at any step ends the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum MountState {
    Uninitialized,
    BootRead,
    BootParsed,
    Ready,
}

/// Where everything lives on the card. All offsets are byte offsets from
/// the start of the medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct Geometry {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub root_entries: u16,
    pub sectors_per_fat: u16,
    pub hidden_sectors: u32,
    pub total_sectors: u32,
    pub boot_offset: u32,
    pub fat_size: u32,
    pub fat_offset: u32,
    pub dir_offset: u32,
    pub dir_size: u32,
    pub data_offset: u32,
    /// Data clusters backed by sectors, counted from cluster 2
    pub cluster_count: u32,
}

/// Read the boot sector into `block`, following the MBR when sector 0 is
/// not itself a boot sector. Returns the boot sector's byte offset.
pub fn read_boot_sector<D: BlockDevice>(dev: &mut D, block: &mut Block) -> Result<u32> {
    dev.read_block(0, block)?;
    let mut boot_offset = 0;
    if block[0] == 0x00 {
        let hidden = u32::from_le_bytes([
            block[MBR_PART0_LBA],
            block[MBR_PART0_LBA + 1],
            block[MBR_PART0_LBA + 2],
            block[MBR_PART0_LBA + 3],
        ]);
        boot_offset = hidden
            .checked_mul(BLOCK_SIZE as u32)
            .ok_or(Error::BadBootSignature)?;
        debug!("sector 0 is an MBR, boot sector at {}", boot_offset);
        dev.read_block(boot_offset, block)?;
    }
    if block[BOOT_SIG_OFFSET..BOOT_SIG_OFFSET + 2] != BOOT_SIG {
        return Err(Error::BadBootSignature);
    }
    Ok(boot_offset)
}

fn le16(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

fn le32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

impl Geometry {
    /// Parse a FAT16 BPB read from `boot_offset`.
    pub fn parse(block: &Block, boot_offset: u32) -> Result<Self> {
        if &block[FS_TYPE_OFFSET..FS_TYPE_OFFSET + 5] != FS_TYPE_FAT16 {
            return Err(Error::UnsupportedFilesystem);
        }
        let bytes_per_sector = le16(block, 0x0B);
        if bytes_per_sector as usize != BLOCK_SIZE {
            return Err(Error::UnsupportedSectorSize(bytes_per_sector));
        }
        let sectors_per_cluster = block[0x0D];
        let reserved_sectors = le16(block, 0x0E);
        let fat_count = block[0x10];
        let root_entries = le16(block, 0x11);
        let small_sectors = le16(block, 0x13);
        let sectors_per_fat = le16(block, 0x16);
        let hidden_sectors = le32(block, 0x1C);
        let total_sectors = match small_sectors {
            0 => le32(block, 0x20),
            n => n as u32,
        };
        if sectors_per_cluster == 0 || fat_count == 0 || sectors_per_fat == 0 {
            return Err(Error::UnsupportedFilesystem);
        }

        // offsets are 32-bit byte addresses; a layout past 4 GiB cannot be reached
        let sector = BLOCK_SIZE as u32;
        let fat_size = sector * sectors_per_fat as u32;
        let dir_size = root_entries as u32 * DIR_ENTRY_SIZE;
        let fat_offset = (reserved_sectors as u32 * sector)
            .checked_add(boot_offset)
            .ok_or(Error::UnsupportedFilesystem)?;
        let dir_offset = fat_size
            .checked_mul(fat_count as u32)
            .and_then(|fats| fats.checked_add(fat_offset))
            .ok_or(Error::UnsupportedFilesystem)?;
        let data_offset = dir_offset
            .checked_add(dir_size)
            .ok_or(Error::UnsupportedFilesystem)?;

        let used = (data_offset - boot_offset).div_ceil(sector);
        let cluster_count = total_sectors.saturating_sub(used) / sectors_per_cluster as u32;

        Ok(Self {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            fat_count,
            root_entries,
            sectors_per_fat,
            hidden_sectors,
            total_sectors,
            boot_offset,
            fat_size,
            fat_offset,
            dir_offset,
            dir_size,
            data_offset,
            cluster_count,
        })
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.sectors_per_cluster as u32 * BLOCK_SIZE as u32
    }

    /// One past the highest cluster number that may be allocated.
    pub fn cluster_limit(&self) -> u32 {
        let cells = self.fat_size / 2;
        if self.total_sectors == 0 {
            return cells;
        }
        cells.min(self.cluster_count + 2)
    }

    pub fn cluster_offset(&self, cluster: u16) -> Result<u32> {
        if cluster < 2 || cluster as u32 >= self.cluster_limit() {
            return Err(Error::InvalidCluster(cluster));
        }
        (cluster as u32 - 2)
            .checked_mul(self.bytes_per_cluster())
            .and_then(|rel| rel.checked_add(self.data_offset))
            .ok_or(Error::InvalidCluster(cluster))
    }
}
