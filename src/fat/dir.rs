//! Root directory: 8.3 entries, file numbering, publishing

use super::boot::DIR_ENTRY_SIZE;
use super::Volume;
use crate::block_device::BlockDevice;
use crate::capture::SensorKind;
use crate::config::BLOCK_SIZE;
use crate::error::{Error, Result};
use crate::time::TimeSource;

const END_OF_TABLE: u8 = 0x00;
const DELETED: u8 = 0xE5;
const ATTR_VOLUME_ID: u8 = 0x08;
const ATTR_LONG_NAME: u8 = 0x0F;
const ATTR_ARCHIVE: u8 = 0x20;

const ENTRY: usize = DIR_ENTRY_SIZE as usize;

/// What a logging session produces; decides the 8.3 name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum FileKind {
    Accel,
    Gyro,
    Audio,
}

impl FileKind {
    pub const fn prefix(self) -> &'static [u8; 4] {
        match self {
            Self::Accel => b"ACCL",
            Self::Gyro => b"GYRO",
            Self::Audio => b"DATA",
        }
    }

    pub const fn extension(self) -> &'static [u8; 3] {
        match self {
            Self::Accel | Self::Gyro => b"CSV",
            Self::Audio => b"WAV",
        }
    }
}

impl From<SensorKind> for FileKind {
    fn from(kind: SensorKind) -> Self {
        match kind {
            SensorKind::Accel => Self::Accel,
            SensorKind::Gyro => Self::Gyro,
            SensorKind::Microphone => Self::Audio,
        }
    }
}

/// Space-padded 8.3 name, e.g. `ACCL012 CSV`. Numbers wrap at 1000 to 1.
pub fn file_name(kind: FileKind, num: u16) -> [u8; 11] {
    let mut name = *b"DATA000    ";
    let n = match num % 1000 {
        0 => 1,
        v => v,
    };
    name[..4].copy_from_slice(kind.prefix());
    name[4] = b'0' + (n / 100) as u8;
    name[5] = b'0' + (n / 10 % 10) as u8;
    name[6] = b'0' + (n % 10) as u8;
    name[8..].copy_from_slice(kind.extension());
    name
}

/// Three ASCII digits at bytes 4..7 of a name
fn parse_suffix(name: &[u8]) -> Option<u16> {
    name[4..7].iter().try_fold(0u16, |acc, &d| {
        d.is_ascii_digit().then(|| acc * 10 + (d - b'0') as u16)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct DirEntry {
    pub name: [u8; 11],
    pub attr: u8,
    pub create_time: u16,
    pub create_date: u16,
    pub write_time: u16,
    pub write_date: u16,
    pub start_cluster: u16,
    pub size: u32,
}

impl DirEntry {
    pub fn parse(raw: &[u8]) -> Self {
        let le16 = |at: usize| u16::from_le_bytes([raw[at], raw[at + 1]]);
        let mut name = [0u8; 11];
        name.copy_from_slice(&raw[..11]);
        Self {
            name,
            attr: raw[11],
            create_time: le16(14),
            create_date: le16(16),
            write_time: le16(22),
            write_date: le16(24),
            start_cluster: le16(26),
            size: u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]),
        }
    }

    pub fn write_to(&self, raw: &mut [u8]) {
        raw[..ENTRY].fill(0);
        raw[..11].copy_from_slice(&self.name);
        raw[11] = self.attr;
        raw[14..16].copy_from_slice(&self.create_time.to_le_bytes());
        raw[16..18].copy_from_slice(&self.create_date.to_le_bytes());
        raw[18..20].copy_from_slice(&self.write_date.to_le_bytes());
        raw[22..24].copy_from_slice(&self.write_time.to_le_bytes());
        raw[24..26].copy_from_slice(&self.write_date.to_le_bytes());
        raw[26..28].copy_from_slice(&self.start_cluster.to_le_bytes());
        raw[28..32].copy_from_slice(&self.size.to_le_bytes());
    }

    /// Regular 8.3 entry (not a long-name fragment or the volume label).
    pub fn is_file(&self) -> bool {
        self.attr != ATTR_LONG_NAME && self.attr & ATTR_VOLUME_ID == 0
    }
}

/// Whether a directory scan should keep going.
enum Scan<R> {
    Continue,
    Done(R),
}

impl<D: BlockDevice, T: TimeSource> Volume<D, T> {
    /// Visit live entries in table order until `f` is done or the end
    /// marker is hit. Each sector is read once; entries never straddle
    /// sectors since 512 is a multiple of 32.
    fn scan_dir<R>(&mut self, mut f: impl FnMut(u32, &[u8]) -> Scan<R>) -> Result<Option<R>> {
        let dir_offset = self.geometry.dir_offset;
        let mut rel = 0;
        while rel < self.geometry.dir_size {
            let sector = dir_offset + rel;
            self.device.read_block(sector, &mut self.block)?;
            for at in (0..BLOCK_SIZE).step_by(ENTRY) {
                if rel + at as u32 >= self.geometry.dir_size {
                    break;
                }
                let raw = &self.block[at..at + ENTRY];
                if let Scan::Done(r) = f(sector + at as u32, raw) {
                    return Ok(Some(r));
                }
                if raw[0] == END_OF_TABLE {
                    return Ok(None);
                }
            }
            rel += BLOCK_SIZE as u32;
        }
        Ok(None)
    }

    /// Publish a finished file in the first free or deleted slot.
    pub fn update_dir_table(
        &mut self,
        start_cluster: u16,
        size: u32,
        suffix: u16,
        kind: FileKind,
    ) -> Result<()> {
        let slot = self.scan_dir(|offset, raw| match raw[0] {
            END_OF_TABLE | DELETED => Scan::Done(offset),
            _ => Scan::Continue,
        })?;
        let Some(offset) = slot else {
            warn!("directory table full");
            return Err(Error::DirectoryFull);
        };

        let now = self.time.get_timestamp();
        let entry = DirEntry {
            name: file_name(kind, suffix),
            attr: ATTR_ARCHIVE,
            create_time: now.fat_time(),
            create_date: now.fat_date(),
            write_time: now.fat_time(),
            write_date: now.fat_date(),
            start_cluster,
            size,
        };

        let at = (offset % BLOCK_SIZE as u32) as usize;
        let sector = offset - at as u32;
        // scan_dir left this sector in the scratch block
        entry.write_to(&mut self.block[at..at + ENTRY]);
        self.device.write_block(sector, &self.block)?;
        info!(
            "published {:?} #{}: start {}, {} bytes",
            kind, suffix, start_cluster, size
        );
        Ok(())
    }

    /// One more than the highest three-digit suffix in use, wrapping at 1000.
    pub fn get_file_num(&mut self) -> Result<u16> {
        let mut max = 0u16;
        self.scan_dir::<()>(|_, raw| {
            if raw[0] != END_OF_TABLE && raw[0] != DELETED {
                let entry = DirEntry::parse(raw);
                if entry.is_file() {
                    if let Some(n) = parse_suffix(&entry.name) {
                        max = max.max(n);
                    }
                }
            }
            Scan::Continue
        })?;
        Ok(match (max + 1) % 1000 {
            0 => 1,
            n => n,
        })
    }

    /// Look up a live entry by its space-padded 8.3 name.
    pub fn find_entry(&mut self, name: &[u8; 11]) -> Result<Option<DirEntry>> {
        self.scan_dir(|_, raw| {
            if raw[0] == END_OF_TABLE || raw[0] == DELETED {
                return Scan::Continue;
            }
            let entry = DirEntry::parse(raw);
            if entry.is_file() && &entry.name == name {
                Scan::Done(entry)
            } else {
                Scan::Continue
            }
        })
    }
}
