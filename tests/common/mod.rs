#![allow(dead_code)]

use fat16_logger::config::BLOCK_SIZE;
use fat16_logger::fat::{format, DirEntry, FormatOptions, FAT_FREE};
use fat16_logger::session::{Clock, Watchdog};
use fat16_logger::time::Timestamp;
use fat16_logger::{RamDisk, Volume};

pub type TestVolume<'a> = Volume<RamDisk<'a>, Timestamp>;

/// 200 sectors, 4 per cluster, one FAT, one root directory sector: 49 data
/// clusters numbered 2..=50.
pub fn small_options() -> FormatOptions {
    FormatOptions {
        total_sectors: 200,
        sectors_per_cluster: 4,
        fat_count: 1,
        root_entries: 16,
        ..FormatOptions::default()
    }
}

/// A freshly formatted card image.
pub fn image(opts: &FormatOptions) -> Vec<u8> {
    let sectors = (opts.hidden_sectors + opts.total_sectors) as usize;
    let mut img = vec![0u8; sectors * BLOCK_SIZE];
    format(&mut RamDisk::new(&mut img), opts).expect("format failed");
    img
}

pub fn mount(img: &mut [u8]) -> TestVolume<'_> {
    Volume::mount(RamDisk::new(img), Timestamp::EPOCH).expect("mount failed")
}

/// Raw FAT cell from the first FAT copy.
pub fn fat_cell(img: &[u8], cluster: u16) -> u16 {
    let fat = BLOCK_SIZE + cluster as usize * 2;
    u16::from_le_bytes([img[fat], img[fat + 1]])
}

/// Live file entries of the root directory, in table order.
pub fn dir_entries(img: &[u8], opts: &FormatOptions) -> Vec<DirEntry> {
    let dir = (opts.hidden_sectors as usize
        + opts.reserved_sectors as usize
        + opts.fat_count as usize * fat_sectors(img, opts))
        * BLOCK_SIZE;
    let len = opts.root_entries as usize * 32;
    img[dir..dir + len]
        .chunks(32)
        .take_while(|raw| raw[0] != 0x00)
        .filter(|raw| raw[0] != 0xE5)
        .map(DirEntry::parse)
        .filter(DirEntry::is_file)
        .collect()
}

fn fat_sectors(img: &[u8], opts: &FormatOptions) -> usize {
    let boot = opts.hidden_sectors as usize * BLOCK_SIZE;
    u16::from_le_bytes([img[boot + 0x16], img[boot + 0x17]]) as usize
}

/// Read a whole file back through its cluster chain.
pub fn read_file(vol: &mut TestVolume<'_>, entry: &DirEntry) -> Vec<u8> {
    let mut out = Vec::new();
    let mut block = [0u8; BLOCK_SIZE];
    let mut index = 0;
    while out.len() < entry.size as usize {
        vol.read_file_block(entry.start_cluster, index, &mut block)
            .expect("read failed");
        let take = (entry.size as usize - out.len()).min(BLOCK_SIZE);
        out.extend_from_slice(&block[..take]);
        index += 1;
    }
    out
}

/// Take `n` clusters so the card looks nearly full. Each is a one-cluster
/// chain owned by the caller.
pub fn fill_card(vol: &mut TestVolume<'_>, n: usize) -> Vec<u16> {
    (0..n).map(|_| vol.find_cluster().expect("card already full")).collect()
}

/// Every allocated FAT cell must sit on the chain of a file in the root
/// directory or on one of the `live` chains (fillers, an open ring).
pub fn assert_no_lost_clusters(vol: &mut TestVolume<'_>, live: &[u16]) {
    let g = *vol.geometry();
    let limit = g.cluster_limit() as usize;
    let mut starts = live.to_vec();
    let mut block = [0u8; BLOCK_SIZE];
    'dir: for off in (0..g.dir_size).step_by(BLOCK_SIZE) {
        vol.read_block(g.dir_offset + off, &mut block)
            .expect("directory read failed");
        for raw in block.chunks(32) {
            match raw[0] {
                0x00 => break 'dir,
                0xE5 => continue,
                _ => {}
            }
            let entry = DirEntry::parse(raw);
            if entry.is_file() {
                starts.push(entry.start_cluster);
            }
        }
    }

    let mut owned = vec![false; limit];
    let mut chain = vec![0u16; limit];
    for start in starts {
        let n = vol.follow_chain(start, &mut chain).expect("broken chain");
        for &c in &chain[..n] {
            assert!(!owned[c as usize], "cluster {} is on two chains", c);
            owned[c as usize] = true;
        }
    }
    for c in 2..limit {
        let cell = vol.read_fat(c as u16).expect("FAT read failed");
        assert!(
            cell == FAT_FREE || owned[c],
            "cluster {} is allocated ({:#06x}) but nothing refers to it",
            c,
            cell
        );
    }
}

#[derive(Default)]
pub struct CountingWatchdog {
    pub feeds: u32,
}

impl Watchdog for CountingWatchdog {
    fn feed(&mut self) {
        self.feeds += 1;
    }
}

/// Advances by a fixed step on every read.
pub struct StepClock {
    pub now: u32,
    pub step: u32,
}

impl Clock for StepClock {
    fn now_ticks(&mut self) -> u32 {
        let t = self.now;
        self.now = self.now.wrapping_add(self.step);
        t
    }
}
