//! Error taxonomy shared by the card driver, the FAT16 volume and the session controller.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Deviation from the SD SPI command/data framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum ProtocolError {
    #[error("command {cmd} rejected with R1 {response:#04x}")]
    CommandRejected { cmd: u8, response: u8 },
    #[error("interface condition echo mismatch")]
    BadInterfaceCondition,
    #[error("data response token {0:#04x}")]
    DataRejected(u8),
    #[error("no start token from card")]
    StartTokenTimeout,
    #[error("error token {0:#04x} instead of start token")]
    UnexpectedToken(u8),
    #[error("card stayed busy")]
    BusyTimeout,
    /// CMD13 after a write: R1, then the second status byte
    #[error("status after write reported R1 {r1:#04x}, R2 {r2:#04x}")]
    StatusError { r1: u8, r2: u8 },
}

/// Everything that can go wrong below the outer power-cycle loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Error {
    /// The bus or chip-select pin reported a failure.
    #[error("transport failure")]
    Transport,
    /// Card absent, identification failed or init was never run.
    #[error("device not ready")]
    DeviceNotReady,
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("boot sector signature missing")]
    BadBootSignature,
    #[error("filesystem is not FAT16")]
    UnsupportedFilesystem,
    #[error("unsupported sector size {0}")]
    UnsupportedSectorSize(u16),
    #[error("offset {0:#x} beyond end of device")]
    OutOfRange(u32),
    #[error("cluster {0} is outside the data region")]
    InvalidCluster(u16),
    #[error("no free cluster left")]
    DiskFull,
    #[error("root directory has no free entry")]
    DirectoryFull,
    /// Internal guard; reaching it is a firmware defect.
    #[error("working buffer overflow")]
    BufferOverflow,
}

/// Coarse classification the control loop acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum ErrorKind {
    /// Power-cycle the peripherals, then retry from the top.
    DeviceNotReady,
    /// Abort the current session.
    Protocol,
    /// The volume cannot be used as laid out.
    Filesystem,
    /// Finalize what was written and stop.
    DiskFull,
    /// Halt visibly.
    BufferOverflow,
}

impl Error {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport | Self::DeviceNotReady => ErrorKind::DeviceNotReady,
            Self::Protocol(_) | Self::OutOfRange(_) => ErrorKind::Protocol,
            Self::BadBootSignature
            | Self::UnsupportedFilesystem
            | Self::UnsupportedSectorSize(_)
            | Self::InvalidCluster(_)
            | Self::DirectoryFull => ErrorKind::Filesystem,
            Self::DiskFull => ErrorKind::DiskFull,
            Self::BufferOverflow => ErrorKind::BufferOverflow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(Error::Transport.kind(), ErrorKind::DeviceNotReady);
        assert_eq!(
            Error::from(ProtocolError::BusyTimeout).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(Error::DirectoryFull.kind(), ErrorKind::Filesystem);
        assert_eq!(Error::DiskFull.kind(), ErrorKind::DiskFull);
        assert_eq!(Error::BufferOverflow.kind(), ErrorKind::BufferOverflow);
    }
}
