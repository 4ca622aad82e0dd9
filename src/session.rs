//! Logging sessions: cluster chain growth, block writes, finalization

use crate::block_device::BlockDevice;
use crate::capture::{Consumer, Event, EventFlags, SensorKind};
use crate::config::{BLOCK_SIZE, CSV_MAX_RECORD, WORK_BUF_SIZE};
use crate::csv::{format_record, ByteWriter};
use crate::error::{Error, Result};
use crate::fat::{FileKind, Volume};
use crate::sensor::Sensor;
use crate::time::TimeSource;
use crate::wave::{patch_sizes, WaveFormat, WaveHeader, WAVE_HEADER_LEN};

/// Sensors one session can log at once
pub const MAX_SENSORS: usize = 2;

/// Serviced on every polling spin.
pub trait Watchdog {
    fn feed(&mut self);
}

/// Free-running tick counter for CSV delta timestamps.
pub trait Clock {
    fn now_ticks(&mut self) -> u32;
}

/// How a session ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Outcome {
    Stopped,
    DiskFull,
    LowBattery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct SessionSummary {
    /// Number the session's files were published under; 0 when the card
    /// filled before anything could be written
    pub file_num: u16,
    /// Bytes published, summed over all files of the session
    pub bytes: u32,
    pub outcome: Outcome,
}

impl SessionSummary {
    /// Card full before the first cluster: nothing allocated, nothing published.
    pub(crate) const NOTHING_WRITTEN: Self = Self {
        file_num: 0,
        bytes: 0,
        outcome: Outcome::DiskFull,
    };

    pub fn published(&self) -> bool {
        self.file_num != 0
    }
}

/// Working buffer that emits whole blocks and carries the overflow.
pub struct BlockAccumulator<const N: usize> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> BlockAccumulator<N> {
    pub const fn new() -> Self {
        Self { buf: [0; N], len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<()> {
        let end = self.len + bytes.len();
        if end > N {
            error!("accumulator overflow: {} + {} > {}", self.len, bytes.len(), N);
            return Err(Error::BufferOverflow);
        }
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }

    /// Write every complete block.
    pub fn write_full<D: BlockDevice, T: TimeSource>(
        &mut self,
        vol: &mut Volume<D, T>,
        file: &mut FileWriter,
    ) -> Result<()> {
        while self.len >= BLOCK_SIZE {
            file.write_block(vol, &self.buf[..BLOCK_SIZE])?;
            self.buf.copy_within(BLOCK_SIZE..self.len, 0);
            self.len -= BLOCK_SIZE;
        }
        Ok(())
    }

    /// Write whatever is left as a final short block.
    pub fn flush<D: BlockDevice, T: TimeSource>(
        &mut self,
        vol: &mut Volume<D, T>,
        file: &mut FileWriter,
    ) -> Result<()> {
        self.write_full(vol, file)?;
        if self.len > 0 {
            file.write_block(vol, &self.buf[..self.len])?;
            self.len = 0;
        }
        Ok(())
    }
}

impl<const N: usize> Default for BlockAccumulator<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Position of one file being written: start of its chain, the cluster
/// being filled and the next block in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileWriter {
    kind: FileKind,
    start: u16,
    cluster: u16,
    block: u8,
    bytes: u32,
}

impl FileWriter {
    /// Allocate the start cluster.
    pub fn create<D: BlockDevice, T: TimeSource>(
        vol: &mut Volume<D, T>,
        kind: FileKind,
    ) -> Result<Self> {
        let start = vol.find_cluster()?;
        debug!("{:?} file starts at cluster {}", kind, start);
        Ok(Self {
            kind,
            start,
            cluster: start,
            block: 0,
            bytes: 0,
        })
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn start_cluster(&self) -> u16 {
        self.start
    }

    /// Bytes that made it onto the card.
    pub fn bytes(&self) -> u32 {
        self.bytes
    }

    /// Append one block (short only for the last one). The next cluster is
    /// allocated and linked only when this block does not fit the current.
    pub fn write_block<D: BlockDevice, T: TimeSource>(
        &mut self,
        vol: &mut Volume<D, T>,
        data: &[u8],
    ) -> Result<()> {
        if self.block >= vol.geometry().sectors_per_cluster {
            let next = vol.find_cluster()?;
            vol.update_fat(self.cluster, next)?;
            self.cluster = next;
            self.block = 0;
        }
        let offset = vol.cluster_offset(self.cluster)? + self.block as u32 * BLOCK_SIZE as u32;
        vol.write_block(offset, data)?;
        self.block += 1;
        self.bytes += data.len() as u32;
        Ok(())
    }

    pub fn publish<D: BlockDevice, T: TimeSource>(
        &self,
        vol: &mut Volume<D, T>,
        file_num: u16,
    ) -> Result<()> {
        vol.update_dir_table(self.start, self.bytes, file_num, self.kind)
    }

    /// Give the file's clusters back without publishing it.
    pub fn discard<D: BlockDevice, T: TimeSource>(self, vol: &mut Volume<D, T>) -> Result<()> {
        let freed = vol.release_chain(self.start)?;
        warn!("{:?} file discarded, {} cluster(s) freed", self.kind, freed);
        Ok(())
    }
}

/// Release the clusters of files that will never be published. Used on
/// abort paths, where the original error is the one worth reporting.
pub(crate) fn discard_all<'a, D, T>(
    vol: &mut Volume<D, T>,
    files: impl Iterator<Item = &'a FileWriter>,
) where
    D: BlockDevice,
    T: TimeSource,
{
    for file in files {
        if let Err(e) = file.discard(vol) {
            error!("cannot free cluster chain at {}: {:?}", file.start_cluster(), e);
        }
    }
}

/// Turn disk-full into an outcome; everything else stays an error.
pub(crate) fn disk_full_or(res: Result<()>) -> Result<Option<Outcome>> {
    match res {
        Ok(()) => Ok(None),
        Err(Error::DiskFull) => Ok(Some(Outcome::DiskFull)),
        Err(e) => Err(e),
    }
}

struct SensorLog {
    kind: SensorKind,
    file: FileWriter,
    acc: BlockAccumulator<WORK_BUF_SIZE>,
    last_tick: Option<u32>,
}

impl SensorLog {
    fn record<D: BlockDevice, T: TimeSource>(
        &mut self,
        vol: &mut Volume<D, T>,
        tick: u32,
        axes: &[i16; 3],
    ) -> Result<()> {
        let dt = tick.wrapping_sub(self.last_tick.unwrap_or(tick));
        self.last_tick = Some(tick);
        let mut line = [0u8; CSV_MAX_RECORD];
        let mut w = ByteWriter::new(&mut line);
        format_record(&mut w, dt, axes).map_err(|_| Error::BufferOverflow)?;
        self.acc.push(w.as_bytes())?;
        self.acc.write_full(vol, &mut self.file)
    }
}

/// Header bytes queued ahead of a sensor's first record.
fn csv_header(sensor: &dyn Sensor) -> Result<BlockAccumulator<WORK_BUF_SIZE>> {
    let mut acc = BlockAccumulator::new();
    let mut head = [0u8; 96];
    let mut w = ByteWriter::new(&mut head);
    sensor
        .header()
        .write(&mut w)
        .map_err(|_| Error::BufferOverflow)?;
    acc.push(w.as_bytes())?;
    Ok(acc)
}

/// Log one or two motion sensors to CSV files sharing one file number.
///
/// Runs until a stop or low-battery event, or until the card fills up.
/// Each data-ready flag asks for one read of that sensor.
pub fn log_sensors<D, T, C, W>(
    vol: &mut Volume<D, T>,
    sensors: &mut [&mut dyn Sensor],
    events: &EventFlags,
    clock: &mut C,
    watchdog: &mut W,
) -> Result<SessionSummary>
where
    D: BlockDevice,
    T: TimeSource,
    C: Clock,
    W: Watchdog,
{
    if sensors.is_empty() || sensors.len() > MAX_SENSORS {
        return Err(Error::BufferOverflow);
    }

    // nothing is allocated until every sensor is up
    for sensor in sensors.iter_mut() {
        sensor.configure()?;
    }
    let mut logs: [Option<SensorLog>; MAX_SENSORS] = [None, None];
    for i in 0..sensors.len() {
        let acc = csv_header(&*sensors[i])?;
        let kind = sensors[i].kind();
        match FileWriter::create(vol, kind.into()) {
            Ok(file) => {
                logs[i] = Some(SensorLog {
                    kind,
                    file,
                    acc,
                    last_tick: None,
                })
            }
            Err(e) => {
                discard_all(vol, logs.iter().flatten().map(|l| &l.file));
                for sensor in sensors.iter_mut() {
                    sensor.power_down()?;
                }
                if e == Error::DiskFull {
                    warn!("card full, sensor session not started");
                    return Ok(SessionSummary::NOTHING_WRITTEN);
                }
                return Err(e);
            }
        }
    }
    info!("sensor session started with {} sensor(s)", sensors.len());

    let mut outcome = match sample_loop(vol, sensors, &mut logs, events, clock, watchdog) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("sensor session aborted: {:?}", e);
            discard_all(vol, logs.iter().flatten().map(|l| &l.file));
            return Err(e);
        }
    };

    // finish the partial block of every file before publishing
    let flushed: Result<()> = logs.iter_mut().flatten().try_for_each(|log| {
        watchdog.feed();
        if let Some(o) = disk_full_or(log.acc.flush(vol, &mut log.file))? {
            outcome = o;
        }
        Ok(())
    });
    let file_num = match flushed.and_then(|()| vol.get_file_num()) {
        Ok(n) => n,
        Err(e) => {
            discard_all(vol, logs.iter().flatten().map(|l| &l.file));
            return Err(e);
        }
    };
    let mut bytes = 0;
    for (n, log) in logs.iter().flatten().enumerate() {
        if let Err(e) = log.file.publish(vol, file_num) {
            // files already in the directory keep their clusters
            discard_all(vol, logs.iter().flatten().skip(n).map(|l| &l.file));
            return Err(e);
        }
        bytes += log.file.bytes();
    }
    for sensor in sensors.iter_mut() {
        sensor.power_down()?;
    }
    info!(
        "sensor session #{} ended: {:?}, {} bytes",
        file_num, outcome, bytes
    );
    Ok(SessionSummary {
        file_num,
        bytes,
        outcome,
    })
}

/// Service data-ready flags until the session has to end. Stop and low
/// battery are checked once per pass, between records.
fn sample_loop<D, T, C, W>(
    vol: &mut Volume<D, T>,
    sensors: &mut [&mut dyn Sensor],
    logs: &mut [Option<SensorLog>],
    events: &EventFlags,
    clock: &mut C,
    watchdog: &mut W,
) -> Result<Outcome>
where
    D: BlockDevice,
    T: TimeSource,
    C: Clock,
    W: Watchdog,
{
    loop {
        watchdog.feed();
        if events.take(Event::LowBattery) {
            return Ok(Outcome::LowBattery);
        }
        if events.take(Event::Stop) {
            return Ok(Outcome::Stopped);
        }
        for (sensor, log) in sensors.iter_mut().zip(logs.iter_mut()) {
            let Some(log) = log.as_mut() else {
                continue;
            };
            if !events.take(Event::DataReady(log.kind)) {
                continue;
            }
            let axes = sensor.read_axes()?;
            let tick = clock.now_ticks();
            if let Some(o) = disk_full_or(log.record(vol, tick, &axes))? {
                return Ok(o);
            }
        }
    }
}

/// Start a WAVE file: queue a header with an unknown size, then allocate.
/// `Ok(None)` when the card has no cluster left for it.
pub(crate) fn begin_wave<D: BlockDevice, T: TimeSource, const N: usize>(
    vol: &mut Volume<D, T>,
    format: WaveFormat,
    acc: &mut BlockAccumulator<N>,
) -> Result<Option<FileWriter>> {
    acc.push(&WaveHeader::new(format, 0).encode())?;
    match FileWriter::create(vol, FileKind::Audio) {
        Ok(file) => Ok(Some(file)),
        Err(Error::DiskFull) => {
            warn!("card full, no room for a new recording");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Flush the tail and patch the header sizes in the first block.
fn seal_wave<D: BlockDevice, T: TimeSource, const N: usize>(
    vol: &mut Volume<D, T>,
    file: &mut FileWriter,
    acc: &mut BlockAccumulator<N>,
    mut outcome: Outcome,
) -> Result<Outcome> {
    if let Some(o) = disk_full_or(acc.flush(vol, file))? {
        outcome = o;
    }
    if file.bytes() >= WAVE_HEADER_LEN as u32 {
        let mut first = [0u8; BLOCK_SIZE];
        vol.read_file_block(file.start_cluster(), 0, &mut first)?;
        patch_sizes(&mut first, file.bytes() - WAVE_HEADER_LEN as u32);
        let len = (file.bytes() as usize).min(BLOCK_SIZE);
        let offset = vol.cluster_offset(file.start_cluster())?;
        vol.write_block(offset, &first[..len])?;
    }
    Ok(outcome)
}

/// Seal and publish the file. If that fails its clusters are released.
pub(crate) fn finish_wave<D: BlockDevice, T: TimeSource, const N: usize>(
    vol: &mut Volume<D, T>,
    file: &mut FileWriter,
    acc: &mut BlockAccumulator<N>,
    outcome: Outcome,
) -> Result<SessionSummary> {
    let res = seal_wave(vol, file, acc, outcome).and_then(|outcome| {
        let file_num = vol.get_file_num()?;
        file.publish(vol, file_num)?;
        Ok(SessionSummary {
            file_num,
            bytes: file.bytes(),
            outcome,
        })
    });
    if res.is_err() {
        discard_all(vol, core::iter::once(&*file));
    }
    res
}

/// Record the microphone straight into a growing WAVE file.
pub fn record_audio<D, T, W, const N: usize>(
    vol: &mut Volume<D, T>,
    consumer: &mut Consumer<'_, N>,
    events: &EventFlags,
    watchdog: &mut W,
    format: WaveFormat,
) -> Result<SessionSummary>
where
    D: BlockDevice,
    T: TimeSource,
    W: Watchdog,
{
    let mut acc = BlockAccumulator::<WORK_BUF_SIZE>::new();
    let Some(mut file) = begin_wave(vol, format, &mut acc)? else {
        return Ok(SessionSummary::NOTHING_WRITTEN);
    };
    info!("audio session started at cluster {}", file.start_cluster());

    let outcome = match capture_loop(vol, consumer, events, watchdog, &mut file, &mut acc) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("audio session aborted: {:?}", e);
            discard_all(vol, core::iter::once(&file));
            return Err(e);
        }
    };

    let summary = finish_wave(vol, &mut file, &mut acc, outcome)?;
    if consumer.overruns() > 0 {
        warn!("{} capture overruns during session", consumer.overruns());
    }
    info!(
        "audio session #{} ended: {:?}, {} bytes",
        summary.file_num, summary.outcome, summary.bytes
    );
    Ok(summary)
}

fn capture_loop<D, T, W, const N: usize>(
    vol: &mut Volume<D, T>,
    consumer: &mut Consumer<'_, N>,
    events: &EventFlags,
    watchdog: &mut W,
    file: &mut FileWriter,
    acc: &mut BlockAccumulator<WORK_BUF_SIZE>,
) -> Result<Outcome>
where
    D: BlockDevice,
    T: TimeSource,
    W: Watchdog,
{
    loop {
        watchdog.feed();
        if let Some(buf) = consumer.poll() {
            acc.push(&buf[..])?;
            drop(buf);
            if let Some(o) = disk_full_or(acc.write_full(vol, file))? {
                return Ok(o);
            }
        }
        if events.take(Event::LowBattery) {
            return Ok(Outcome::LowBattery);
        }
        if events.take(Event::Stop) {
            return Ok(Outcome::Stopped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_guard() {
        let mut acc = BlockAccumulator::<8>::new();
        acc.push(&[1; 6]).unwrap();
        assert_eq!(acc.push(&[2; 3]), Err(Error::BufferOverflow));
        assert_eq!(acc.len(), 6);
    }

    #[test]
    fn disk_full_becomes_outcome() {
        assert_eq!(disk_full_or(Ok(())), Ok(None));
        assert_eq!(
            disk_full_or(Err(Error::DiskFull)),
            Ok(Some(Outcome::DiskFull))
        );
        assert_eq!(
            disk_full_or(Err(Error::DirectoryFull)),
            Err(Error::DirectoryFull)
        );
    }
}
