//! Configuration constants and sensor settings for the logger

/// Sector size; the only one the volume driver accepts
pub const BLOCK_SIZE: usize = 512;

/// Capture buffer size (one block per swap)
pub const CAPTURE_BUF_SIZE: usize = BLOCK_SIZE;

/// Session working buffer: one block plus the tail carried into the next
pub const WORK_BUF_SIZE: usize = 600;

/// Longest CSV record: "4294967295,-32768,-32768,-32768\n"
pub const CSV_MAX_RECORD: usize = 32;

/// Idle clocks before CMD0, in bytes (80 cycles ≥ 74 required)
pub const SD_IDLE_CLOCK_BYTES: usize = 10;

/// CMD0 attempts before the card is declared absent
pub const SD_GO_IDLE_RETRIES: u8 = 10;

/// ACMD41 polls while the card leaves the idle state
pub const SD_INIT_POLLS: u16 = 0x1000;

/// R1 polls after a command frame
pub const SD_R1_POLLS: u16 = 0xFF;

/// Polls for the 0xFE start token of a read
pub const SD_START_TOKEN_POLLS: u16 = 500;

/// Polls while the card holds the line low after a write
pub const SD_BUSY_POLLS: u32 = 0x4_0000;

/// SD SPI initialization frequency (slow for card init)
pub const SD_SPI_INIT_FREQ: u32 = 400_000;

/// SD SPI working frequency after init
pub const SD_SPI_WORK_FREQ: u32 = 16_000_000;

/// Sensor SPI frequency
pub const SENSOR_SPI_FREQ: u32 = 1_000_000;

/// Max retries for SD card initialization (each one is a full power cycle)
pub const SD_INIT_RETRIES: u8 = 3;

/// Microphone sample rate, Hz
pub const AUDIO_SAMPLE_RATE: u32 = 8_000;

/// Clusters kept in the audio pre-record ring
pub const PRERECORD_CLUSTERS: u16 = 5;

/// Watchdog period, ms
pub const WATCHDOG_TIMEOUT_MS: u64 = 5_000;

/// Accelerometer full scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum AccelRange {
    #[default]
    G2,
    G6,
}

impl AccelRange {
    /// Map a configured value in g; anything unknown keeps the default.
    pub fn from_value(g: u16) -> Self {
        match g {
            6 => Self::G6,
            _ => Self::G2,
        }
    }

    /// CTRL_REG2 FS bit
    pub const fn bits(self) -> u8 {
        match self {
            Self::G2 => 0,
            Self::G6 => 1,
        }
    }

    pub const fn value(self) -> u16 {
        match self {
            Self::G2 => 2,
            Self::G6 => 6,
        }
    }
}

/// Accelerometer output data rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum AccelRate {
    #[default]
    Hz40,
    Hz160,
    Hz640,
    Hz2560,
}

impl AccelRate {
    pub fn from_value(hz: u16) -> Self {
        match hz {
            160 => Self::Hz160,
            640 => Self::Hz640,
            2560 => Self::Hz2560,
            _ => Self::Hz40,
        }
    }

    /// CTRL_REG1 DF bits
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

/// Gyroscope full scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum GyroRange {
    #[default]
    Dps250,
    Dps500,
    Dps2000,
}

impl GyroRange {
    pub fn from_value(dps: u16) -> Self {
        match dps {
            500 => Self::Dps500,
            2000 => Self::Dps2000,
            _ => Self::Dps250,
        }
    }

    /// CTRL_REG4 FS bits
    pub const fn bits(self) -> u8 {
        self as u8
    }

    pub const fn value(self) -> u16 {
        match self {
            Self::Dps250 => 250,
            Self::Dps500 => 500,
            Self::Dps2000 => 2000,
        }
    }
}

/// Gyroscope output data rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum GyroRate {
    #[default]
    Hz100,
    Hz200,
    Hz400,
    Hz800,
}

impl GyroRate {
    pub fn from_value(hz: u16) -> Self {
        match hz {
            200 => Self::Hz200,
            400 => Self::Hz400,
            800 => Self::Hz800,
            _ => Self::Hz100,
        }
    }

    /// CTRL_REG1 DR bits
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct AccelConfig {
    pub range: AccelRange,
    pub rate: AccelRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct GyroConfig {
    pub range: GyroRange,
    pub rate: GyroRate,
}

/// Sensor settings used when no configuration is supplied
pub const DEFAULT_ACCEL: AccelConfig = AccelConfig {
    range: AccelRange::G2,
    rate: AccelRate::Hz40,
};
pub const DEFAULT_GYRO: GyroConfig = GyroConfig {
    range: GyroRange::Dps250,
    rate: GyroRate::Hz100,
};
