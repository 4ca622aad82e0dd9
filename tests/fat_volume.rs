mod common;

use std::collections::HashSet;

use common::{dir_entries, fat_cell, image, mount, small_options};
use fat16_logger::config::BLOCK_SIZE;
use fat16_logger::fat::{FileKind, FormatOptions, FAT_FREE, FAT_TERMINAL};
use fat16_logger::time::Timestamp;
use fat16_logger::{Error, RamDisk, Volume};

#[test]
fn first_allocation_is_cluster_two() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    assert_eq!(vol.geometry().cluster_count, 49);
    assert_eq!(vol.find_cluster(), Ok(2));
    assert_eq!(vol.find_cluster(), Ok(3));
    drop(vol);
    assert_eq!(fat_cell(&img, 2), FAT_TERMINAL);
    assert_eq!(fat_cell(&img, 3), FAT_TERMINAL);
    assert_eq!(fat_cell(&img, 4), FAT_FREE);
}

#[test]
fn allocation_never_repeats_and_ends_in_disk_full() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    let mut seen = HashSet::new();
    loop {
        match vol.find_cluster() {
            Ok(c) => assert!(seen.insert(c), "cluster {} handed out twice", c),
            Err(e) => {
                assert_eq!(e, Error::DiskFull);
                break;
            }
        }
    }
    assert_eq!(seen.len(), 49);
    assert!(seen.iter().all(|&c| (2..=50).contains(&c)));
    // still full on a second attempt, nothing was touched
    assert_eq!(vol.find_cluster(), Err(Error::DiskFull));
}

#[test]
fn freed_cluster_is_reused() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    let a = vol.find_cluster().unwrap();
    let b = vol.find_cluster().unwrap();
    vol.update_fat(a, FAT_FREE).unwrap();
    assert_eq!(vol.find_cluster(), Ok(a));
    assert_eq!(vol.find_cluster(), Ok(b + 1));
}

#[test]
fn every_fat_copy_is_updated() {
    let opts = FormatOptions {
        fat_count: 2,
        ..small_options()
    };
    let mut img = image(&opts);
    let mut vol = mount(&mut img);
    let g = *vol.geometry();
    let a = vol.find_cluster().unwrap();
    let b = vol.find_cluster().unwrap();
    vol.update_fat(a, b).unwrap();
    drop(vol);
    let first = &img[g.fat_offset as usize..(g.fat_offset + g.fat_size) as usize];
    let second = &img[(g.fat_offset + g.fat_size) as usize..g.dir_offset as usize];
    assert_eq!(first, second);
    assert_eq!(&first[a as usize * 2..a as usize * 2 + 2], &b.to_le_bytes());
}

#[test]
fn out_of_range_cells_are_rejected() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    assert_eq!(vol.update_fat(1, 5), Err(Error::InvalidCluster(1)));
    assert_eq!(vol.update_fat(51, 5), Err(Error::InvalidCluster(51)));
    assert_eq!(vol.read_fat(0), Err(Error::InvalidCluster(0)));
}

#[test]
fn chain_walk_and_release() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    let a = vol.find_cluster().unwrap();
    let b = vol.find_cluster().unwrap();
    let c = vol.find_cluster().unwrap();
    vol.update_fat(a, b).unwrap();
    vol.update_fat(b, c).unwrap();

    let mut chain = [0u16; 8];
    let n = vol.follow_chain(a, &mut chain).unwrap();
    assert_eq!(&chain[..n], &[a, b, c]);

    // output slice bounds the walk
    let mut short = [0u16; 2];
    assert_eq!(vol.follow_chain(a, &mut short), Ok(2));

    assert_eq!(vol.release_chain(a), Ok(3));
    for cl in [a, b, c] {
        assert_eq!(vol.read_fat(cl), Ok(FAT_FREE));
    }
}

#[test]
fn closed_ring_walk_stops_at_start() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    let ring: Vec<u16> = (0..4).map(|_| vol.find_cluster().unwrap()).collect();
    for i in 0..ring.len() {
        vol.update_fat(ring[i], ring[(i + 1) % ring.len()]).unwrap();
    }
    let mut chain = [0u16; 16];
    let n = vol.follow_chain(ring[0], &mut chain).unwrap();
    assert_eq!(&chain[..n], &ring[..]);
    assert_eq!(vol.release_chain(ring[0]), Ok(4));
    assert_eq!(vol.find_cluster(), Ok(ring[0]));
}

#[test]
fn mounts_through_partition_table() {
    let opts = FormatOptions {
        hidden_sectors: 8,
        ..small_options()
    };
    let mut img = image(&opts);
    assert_eq!(img[0], 0x00);
    assert_eq!(&img[0x1FE..0x200], &[0x55, 0xAA]);

    let mut vol = mount(&mut img);
    let g = *vol.geometry();
    assert_eq!(g.boot_offset, 8 * BLOCK_SIZE as u32);
    assert_eq!(g.fat_offset, 9 * BLOCK_SIZE as u32);
    assert_eq!(g.data_offset, 11 * BLOCK_SIZE as u32);
    assert_eq!(vol.find_cluster(), Ok(2));
    vol.update_dir_table(2, 10, 1, FileKind::Audio).unwrap();
    drop(vol);
    let entries = dir_entries(&img, &opts);
    assert_eq!(entries.len(), 1);
    assert_eq!(&entries[0].name, b"DATA001 WAV");
}

#[test]
fn missing_signature_fails_mount() {
    let mut img = vec![0u8; 64 * BLOCK_SIZE];
    let res = Volume::mount(RamDisk::new(&mut img), Timestamp::EPOCH);
    assert_eq!(res.err(), Some(Error::BadBootSignature));
}

#[test]
fn other_filesystems_fail_mount() {
    let mut img = image(&small_options());
    img[0x36..0x3B].copy_from_slice(b"FAT32");
    let res = Volume::mount(RamDisk::new(&mut img), Timestamp::EPOCH);
    assert_eq!(res.err(), Some(Error::UnsupportedFilesystem));
}

#[test]
fn publish_and_find() {
    let opts = small_options();
    let mut img = image(&opts);
    let mut vol = mount(&mut img);
    assert_eq!(vol.get_file_num(), Ok(1));
    vol.update_dir_table(2, 4096, 1, FileKind::Accel).unwrap();
    vol.update_dir_table(4, 1500, 1, FileKind::Gyro).unwrap();
    assert_eq!(vol.get_file_num(), Ok(2));

    let gyro = vol.find_entry(b"GYRO001 CSV").unwrap().expect("entry missing");
    assert_eq!(gyro.start_cluster, 4);
    assert_eq!(gyro.size, 1500);
    assert_eq!(gyro.attr, 0x20);
    assert_eq!(gyro.write_date, Timestamp::EPOCH.fat_date());
    assert_eq!(vol.find_entry(b"CONFIG  INI"), Ok(None));
    drop(vol);

    let names: Vec<[u8; 11]> = dir_entries(&img, &opts).iter().map(|e| e.name).collect();
    assert_eq!(names, vec![*b"ACCL001 CSV", *b"GYRO001 CSV"]);
}

#[test]
fn deleted_slot_is_reused_and_numbers_keep_rising() {
    let opts = small_options();
    let mut img = image(&opts);
    let mut vol = mount(&mut img);
    for n in 1..=3 {
        vol.update_dir_table(2, 0, n, FileKind::Audio).unwrap();
    }
    // delete the first two entries
    let dir = vol.geometry().dir_offset;
    let mut block = [0u8; BLOCK_SIZE];
    vol.read_block(dir, &mut block).unwrap();
    block[0] = 0xE5;
    block[32] = 0xE5;
    vol.write_block(dir, &block).unwrap();

    assert_eq!(vol.get_file_num(), Ok(4));
    vol.update_dir_table(2, 0, 4, FileKind::Audio).unwrap();
    assert_eq!(vol.get_file_num(), Ok(5));
    drop(vol);

    // one reserved sector and one single-sector FAT precede the directory
    let dir = 2 * BLOCK_SIZE;
    assert_eq!(&img[dir..dir + 11], b"DATA004 WAV");
    let names: Vec<[u8; 11]> = dir_entries(&img, &opts).iter().map(|e| e.name).collect();
    assert_eq!(names, vec![*b"DATA004 WAV", *b"DATA003 WAV"]);
}

#[test]
fn numbering_wraps_after_999() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    vol.update_dir_table(2, 0, 999, FileKind::Accel).unwrap();
    assert_eq!(vol.get_file_num(), Ok(1));
}

#[test]
fn full_directory_is_reported() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    for n in 1..=16 {
        vol.update_dir_table(2, 0, n, FileKind::Audio).unwrap();
    }
    assert_eq!(
        vol.update_dir_table(2, 0, 17, FileKind::Audio),
        Err(Error::DirectoryFull)
    );
}

#[test]
fn labels_and_long_names_do_not_count() {
    let mut img = image(&small_options());
    let mut vol = mount(&mut img);
    let dir = vol.geometry().dir_offset;
    let mut block = [0u8; BLOCK_SIZE];
    block[..11].copy_from_slice(b"LOGG500    ");
    block[11] = 0x08;
    block[32..43].copy_from_slice(b"ACCL700 CSV");
    block[43] = 0x0F;
    vol.write_block(dir, &block).unwrap();
    assert_eq!(vol.get_file_num(), Ok(1));
    assert_eq!(vol.find_entry(b"ACCL700 CSV"), Ok(None));
    // new entries go after them
    vol.update_dir_table(2, 0, 1, FileKind::Accel).unwrap();
    assert!(vol.find_entry(b"ACCL001 CSV").unwrap().is_some());
}
