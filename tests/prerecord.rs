mod common;

use common::{
    assert_no_lost_clusters, fill_card, image, mount, read_file, small_options, CountingWatchdog,
};
use fat16_logger::capture::{DoubleBuffer, Event, EventFlags, Producer};
use fat16_logger::config::CAPTURE_BUF_SIZE;
use fat16_logger::fat::FAT_FREE;
use fat16_logger::prerecord::{run_prerecord, PreRecorder};
use fat16_logger::session::{Outcome, Watchdog};
use fat16_logger::wave::WaveFormat;
use fat16_logger::Error;

fn block(n: u8) -> [u8; 512] {
    [n; 512]
}

fn assert_blocks(data: &[u8], first: u8) {
    for (i, chunk) in data.chunks(512).enumerate() {
        let want = first + i as u8;
        assert!(chunk.iter().all(|&b| b == want), "block {} is not {}", i, want);
    }
}

#[test]
fn ring_is_a_closed_chain() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    let ring = PreRecorder::new(&mut vol, 5).unwrap();
    assert_eq!(ring.clusters(), &[2, 3, 4, 5, 6]);
    assert_eq!(ring.capacity(), 20);
    assert_eq!(vol.read_fat(6), Ok(2));

    let mut chain = [0u16; 16];
    assert_eq!(vol.follow_chain(2, &mut chain), Ok(5));

    ring.close(&mut vol).unwrap();
    for c in 2..=6 {
        assert_eq!(vol.read_fat(c), Ok(FAT_FREE));
    }
}

#[test]
fn save_after_wrap_copies_oldest_first() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    let mut ring = PreRecorder::new(&mut vol, 5).unwrap();
    for n in 0..23 {
        ring.record_block(&mut vol, &block(n)).unwrap();
    }
    assert_eq!(ring.filled(), 20);

    let mut watchdog = CountingWatchdog::default();
    let summary = ring.save(&mut vol, WaveFormat::default(), &mut watchdog).unwrap();
    assert_eq!(summary.outcome, Outcome::Stopped);
    assert_eq!(summary.file_num, 1);
    assert_eq!(summary.bytes, 44 + 20 * 512);
    assert_eq!(watchdog.feeds, 20);

    let entry = vol.find_entry(b"DATA001 WAV").unwrap().expect("no file");
    assert_eq!(entry.start_cluster, 7);
    let data = read_file(&mut vol, &entry);
    assert_eq!(&data[40..44], &(20 * 512u32).to_le_bytes());
    assert_blocks(&data[44..], 3);

    // the ring keeps going after a save
    ring.record_block(&mut vol, &block(23)).unwrap();
    let second = ring.save(&mut vol, WaveFormat::default(), &mut watchdog).unwrap();
    assert_eq!(second.file_num, 2);
    let entry = vol.find_entry(b"DATA002 WAV").unwrap().expect("no file");
    assert_blocks(&read_file(&mut vol, &entry)[44..], 4);

    ring.close(&mut vol).unwrap();
    assert_eq!(vol.find_cluster(), Ok(2));
}

#[test]
fn save_before_wrap_starts_at_first_block() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    let mut ring = PreRecorder::new(&mut vol, 5).unwrap();
    for n in 1..=7 {
        ring.record_block(&mut vol, &block(n)).unwrap();
    }
    let summary = ring
        .save(&mut vol, WaveFormat::default(), &mut CountingWatchdog::default())
        .unwrap();
    assert_eq!(summary.bytes, 44 + 7 * 512);
    let entry = vol.find_entry(b"DATA001 WAV").unwrap().expect("no file");
    assert_blocks(&read_file(&mut vol, &entry)[44..], 1);
}

#[test]
fn save_stops_when_card_fills() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    // five clusters for the ring, two left for the copy
    let mut filler = fill_card(&mut vol, 42);
    let mut ring = PreRecorder::new(&mut vol, 5).unwrap();
    for n in 0..20 {
        ring.record_block(&mut vol, &block(n)).unwrap();
    }
    let summary = ring
        .save(&mut vol, WaveFormat::default(), &mut CountingWatchdog::default())
        .unwrap();
    assert_eq!(summary.outcome, Outcome::DiskFull);
    assert_eq!(summary.bytes, 8 * 512);

    let entry = vol.find_entry(b"DATA001 WAV").unwrap().expect("no file");
    assert_eq!(entry.size, 8 * 512);
    let data = read_file(&mut vol, &entry);
    assert_eq!(&data[40..44], &(8 * 512 - 44u32).to_le_bytes());
    assert_eq!(&data[44..44 + 512], &block(0)[..]);

    let start = ring.clusters()[0];
    filler.push(start);
    assert_no_lost_clusters(&mut vol, &filler);
    filler.pop();
    ring.close(&mut vol).unwrap();
    assert_no_lost_clusters(&mut vol, &filler);
}

#[test]
fn ring_needs_room() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    let filler = fill_card(&mut vol, 46);
    assert_eq!(PreRecorder::new(&mut vol, 5).err(), Some(Error::DiskFull));
    assert_no_lost_clusters(&mut vol, &filler);
    // the three clusters it did take were given back
    assert_eq!(vol.find_cluster(), Ok(48));
    assert_eq!(PreRecorder::new(&mut vol, 0).err(), Some(Error::BufferOverflow));
}

/// Streams numbered capture buffers, then asks for one save and a stop.
struct Microphone<'a> {
    producer: Producer<'a, CAPTURE_BUF_SIZE>,
    events: &'a EventFlags,
    blocks: u8,
    total: u8,
}

impl Watchdog for Microphone<'_> {
    fn feed(&mut self) {
        if self.blocks < self.total {
            self.producer.push_slice(&block(self.blocks));
            self.blocks += 1;
            if self.blocks == self.total {
                self.events.raise(Event::Save);
                self.events.raise(Event::Stop);
            }
        }
    }
}

#[test]
fn prerecord_loop_saves_last_clusters() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    let mut capture = DoubleBuffer::<CAPTURE_BUF_SIZE>::new();
    let (producer, mut consumer) = capture.split();
    let events = EventFlags::new();
    let mut mic = Microphone {
        producer,
        events: &events,
        blocks: 0,
        total: 25,
    };

    let summary = run_prerecord(
        &mut vol,
        &mut consumer,
        &events,
        &mut mic,
        WaveFormat::default(),
        5,
    )
    .unwrap();
    assert_eq!(summary.outcome, Outcome::Stopped);
    assert_eq!(summary.files_saved, 1);
    let saved = summary.last.expect("nothing saved");
    assert_eq!(saved.bytes, 44 + 20 * 512);
    assert_eq!(consumer.overruns(), 0);

    let entry = vol.find_entry(b"DATA001 WAV").unwrap().expect("no file");
    assert_blocks(&read_file(&mut vol, &entry)[44..], 5);

    // ring released, saved file kept
    for c in 2..=6 {
        assert_eq!(vol.read_fat(c), Ok(FAT_FREE));
    }
    assert_ne!(vol.read_fat(entry.start_cluster), Ok(FAT_FREE));
    assert_no_lost_clusters(&mut vol, &[]);
}

#[test]
fn save_on_full_card_releases_ring() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    // exactly enough room for the ring, none for a copy
    let filler = fill_card(&mut vol, 44);
    let mut capture = DoubleBuffer::<CAPTURE_BUF_SIZE>::new();
    let (producer, mut consumer) = capture.split();
    let events = EventFlags::new();
    let mut mic = Microphone {
        producer,
        events: &events,
        blocks: 0,
        total: 3,
    };

    let summary = run_prerecord(
        &mut vol,
        &mut consumer,
        &events,
        &mut mic,
        WaveFormat::default(),
        5,
    )
    .unwrap();
    assert_eq!(summary.outcome, Outcome::DiskFull);
    assert_eq!(summary.files_saved, 0);
    assert_eq!(summary.last, None);
    assert_eq!(vol.find_entry(b"DATA001 WAV"), Ok(None));
    for c in 46..=50 {
        assert_eq!(vol.read_fat(c), Ok(FAT_FREE));
    }
    assert_no_lost_clusters(&mut vol, &filler);
}

#[test]
fn direct_save_on_full_card_publishes_nothing() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    let filler = fill_card(&mut vol, 44);
    let mut ring = PreRecorder::new(&mut vol, 5).unwrap();
    ring.record_block(&mut vol, &block(1)).unwrap();
    let summary = ring
        .save(&mut vol, WaveFormat::default(), &mut CountingWatchdog::default())
        .unwrap();
    assert_eq!(summary.outcome, Outcome::DiskFull);
    assert!(!summary.published());
    ring.close(&mut vol).unwrap();
    assert_no_lost_clusters(&mut vol, &filler);
}

#[test]
fn low_battery_closes_ring() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    let mut capture = DoubleBuffer::<CAPTURE_BUF_SIZE>::new();
    let (_producer, mut consumer) = capture.split();
    let events = EventFlags::new();
    events.raise(Event::LowBattery);
    let summary = run_prerecord(
        &mut vol,
        &mut consumer,
        &events,
        &mut CountingWatchdog::default(),
        WaveFormat::default(),
        5,
    )
    .unwrap();
    assert_eq!(summary.outcome, Outcome::LowBattery);
    assert_eq!(summary.files_saved, 0);
    assert_eq!(vol.find_cluster(), Ok(2));
}
