//! Sensor and audio logger core for a raw microSD card.
//!
//! Layers, leaves first:
//!
//! * [`transport`]: byte exchange over SPI with manual chip-select
//! * [`sdcard`]: SD init handshake and single 512-byte block transfers
//! * [`fat`]: FAT16 mount, cluster allocation, chain update, directory publish
//! * [`capture`]: interrupt-filled double buffer and event flags
//! * [`session`] / [`prerecord`]: the write loops that tie them together
//!
//! ## Features
//!
//! * `log` (default): log through the `log` facade.
//! * `defmt-log`: log through `defmt` instead.
//! * `rp2350`: board support and the firmware binaries.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod block_device;
pub mod capture;
pub mod config;
pub mod csv;
pub mod error;
pub mod fat;
pub mod prerecord;
pub mod sdcard;
pub mod sensor;
pub mod session;
pub mod time;
pub mod transport;
pub mod wave;

#[cfg(feature = "rp2350")]
pub mod board;

pub use crate::block_device::{Block, BlockDevice, RamDisk};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::fat::Volume;
pub use crate::sdcard::{CardKind, SdCard};
pub use crate::transport::{SpiTransport, Transport};
