//! Circular pre-record: a closed ring of clusters overwritten continuously,
//! copied oldest-first into a new WAVE file on demand

use crate::block_device::{Block, BlockDevice};
use crate::capture::{Consumer, Event, EventFlags};
use crate::config::{BLOCK_SIZE, CAPTURE_BUF_SIZE, WORK_BUF_SIZE};
use crate::error::{Error, Result};
use crate::fat::{Volume, FAT_FREE};
use crate::session::{
    begin_wave, discard_all, disk_full_or, finish_wave, BlockAccumulator, Outcome, SessionSummary,
    Watchdog,
};
use crate::time::TimeSource;
use crate::wave::WaveFormat;

/// Upper bound on ring length
pub const MAX_RING_CLUSTERS: usize = 16;

pub struct PreRecorder {
    ring: [u16; MAX_RING_CLUSTERS],
    clusters: usize,
    sectors_per_cluster: u32,
    /// Ring block the next write goes to; also the oldest block once full
    next: u32,
    /// Blocks holding data, saturates at capacity
    filled: u32,
}

impl PreRecorder {
    /// Allocate `clusters` clusters and link them into a closed chain.
    pub fn new<D: BlockDevice, T: TimeSource>(
        vol: &mut Volume<D, T>,
        clusters: u16,
    ) -> Result<Self> {
        let n = clusters as usize;
        if n == 0 || n > MAX_RING_CLUSTERS {
            return Err(Error::BufferOverflow);
        }
        let mut ring = [0u16; MAX_RING_CLUSTERS];
        for i in 0..n {
            match vol.find_cluster() {
                Ok(c) => ring[i] = c,
                Err(e) => {
                    // give back what was taken so far
                    for &c in &ring[..i] {
                        vol.update_fat(c, FAT_FREE)?;
                    }
                    return Err(e);
                }
            }
        }
        for (i, &c) in ring[..n].iter().enumerate() {
            vol.update_fat(c, ring[(i + 1) % n])?;
        }
        info!("pre-record ring of {} clusters from {}", n, ring[0]);
        Ok(Self {
            ring,
            clusters: n,
            sectors_per_cluster: vol.geometry().sectors_per_cluster as u32,
            next: 0,
            filled: 0,
        })
    }

    pub fn clusters(&self) -> &[u16] {
        &self.ring[..self.clusters]
    }

    pub fn capacity(&self) -> u32 {
        self.clusters as u32 * self.sectors_per_cluster
    }

    /// Blocks currently holding audio.
    pub fn filled(&self) -> u32 {
        self.filled
    }

    fn offset<D: BlockDevice, T: TimeSource>(
        &self,
        vol: &Volume<D, T>,
        index: u32,
    ) -> Result<u32> {
        let cluster = self.ring[(index / self.sectors_per_cluster) as usize];
        Ok(vol.cluster_offset(cluster)?
            + (index % self.sectors_per_cluster) * BLOCK_SIZE as u32)
    }

    /// Overwrite the oldest ring block.
    pub fn record_block<D: BlockDevice, T: TimeSource>(
        &mut self,
        vol: &mut Volume<D, T>,
        data: &[u8],
    ) -> Result<()> {
        let offset = self.offset(vol, self.next)?;
        vol.write_block(offset, data)?;
        self.next = (self.next + 1) % self.capacity();
        self.filled = (self.filled + 1).min(self.capacity());
        Ok(())
    }

    /// Copy the ring into a new WAVE file, oldest block first, and publish it.
    /// The ring itself is left untouched and keeps recording afterwards.
    /// A card with no room for the copy ends with `Outcome::DiskFull` and
    /// nothing published.
    pub fn save<D: BlockDevice, T: TimeSource, W: Watchdog>(
        &mut self,
        vol: &mut Volume<D, T>,
        format: WaveFormat,
        watchdog: &mut W,
    ) -> Result<SessionSummary> {
        let bookmark = self.next;
        let count = self.filled;
        let first = if count < self.capacity() { 0 } else { bookmark };
        info!("saving {} ring blocks from {}", count, first);

        let mut acc = BlockAccumulator::<WORK_BUF_SIZE>::new();
        let Some(mut file) = begin_wave(vol, format, &mut acc)? else {
            return Ok(SessionSummary::NOTHING_WRITTEN);
        };
        let mut outcome = Outcome::Stopped;
        let mut block: Block = [0; BLOCK_SIZE];
        for i in 0..count {
            watchdog.feed();
            let copied = self
                .offset(vol, (first + i) % self.capacity())
                .and_then(|offset| vol.read_block(offset, &mut block))
                .and_then(|()| acc.push(&block))
                .and_then(|()| disk_full_or(acc.write_full(vol, &mut file)));
            match copied {
                Ok(None) => {}
                Ok(Some(o)) => {
                    outcome = o;
                    break;
                }
                Err(e) => {
                    discard_all(vol, core::iter::once(&file));
                    return Err(e);
                }
            }
        }
        finish_wave(vol, &mut file, &mut acc, outcome)
    }

    /// Return the ring's clusters to the free pool.
    pub fn close<D: BlockDevice, T: TimeSource>(self, vol: &mut Volume<D, T>) -> Result<()> {
        vol.release_chain(self.ring[0])?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct PrerecordSummary {
    pub files_saved: u16,
    pub last: Option<SessionSummary>,
    pub outcome: Outcome,
}

/// Keep the last `clusters` clusters of audio in a ring until stopped;
/// each save event writes the ring out as a new file. The ring is released
/// on every way out, errors included.
pub fn run_prerecord<D, T, W>(
    vol: &mut Volume<D, T>,
    consumer: &mut Consumer<'_, CAPTURE_BUF_SIZE>,
    events: &EventFlags,
    watchdog: &mut W,
    format: WaveFormat,
    clusters: u16,
) -> Result<PrerecordSummary>
where
    D: BlockDevice,
    T: TimeSource,
    W: Watchdog,
{
    let mut ring = PreRecorder::new(vol, clusters)?;
    let res = ring_loop(vol, &mut ring, consumer, events, watchdog, format);
    let closed = ring.close(vol);
    let summary = match res {
        Ok(summary) => summary,
        Err(e) => {
            error!("pre-record aborted: {:?}", e);
            if let Err(close_err) = closed {
                error!("ring not released: {:?}", close_err);
            }
            return Err(e);
        }
    };
    closed?;
    info!(
        "pre-record ended: {:?}, {} file(s) saved",
        summary.outcome, summary.files_saved
    );
    Ok(summary)
}

fn ring_loop<D, T, W>(
    vol: &mut Volume<D, T>,
    ring: &mut PreRecorder,
    consumer: &mut Consumer<'_, CAPTURE_BUF_SIZE>,
    events: &EventFlags,
    watchdog: &mut W,
    format: WaveFormat,
) -> Result<PrerecordSummary>
where
    D: BlockDevice,
    T: TimeSource,
    W: Watchdog,
{
    let mut summary = PrerecordSummary {
        files_saved: 0,
        last: None,
        outcome: Outcome::Stopped,
    };
    let mut block: Block = [0; BLOCK_SIZE];

    loop {
        watchdog.feed();
        if let Some(buf) = consumer.poll() {
            block.copy_from_slice(&buf[..]);
            drop(buf);
            ring.record_block(vol, &block)?;
        }
        if events.take(Event::LowBattery) {
            summary.outcome = Outcome::LowBattery;
            return Ok(summary);
        }
        // a save pressed together with stop is still honoured
        if events.take(Event::Save) {
            let saved = ring.save(vol, format, watchdog)?;
            if saved.published() {
                summary.files_saved += 1;
                summary.last = Some(saved);
            }
            if saved.outcome == Outcome::DiskFull {
                summary.outcome = Outcome::DiskFull;
                return Ok(summary);
            }
        }
        if events.take(Event::Stop) {
            return Ok(summary);
        }
    }
}
