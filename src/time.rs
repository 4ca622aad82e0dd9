//! Timestamps for directory entries

/// Calendar time with FAT's two-second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

impl Timestamp {
    /// Base date for boards without an RTC.
    pub const EPOCH: Self = Self {
        year: 2025,
        month: 1,
        day: 1,
        hours: 0,
        minutes: 0,
        seconds: 0,
    };

    /// Base date plus uptime. Days advance within 28-day months so the
    /// result is always a valid date; files still sort by creation order.
    pub fn from_uptime_secs(uptime_secs: u64) -> Self {
        let days = uptime_secs / 86_400;
        let rem = uptime_secs % 86_400;
        let months = days / 28;
        Self {
            year: Self::EPOCH.year + (months / 12).min(100) as u16,
            month: 1 + (months % 12) as u8,
            day: 1 + (days % 28) as u8,
            hours: (rem / 3600) as u8,
            minutes: ((rem % 3600) / 60) as u8,
            seconds: (rem % 60) as u8,
        }
    }

    /// Packed FAT date: years since 1980, month, day.
    pub fn fat_date(&self) -> u16 {
        (self.year.saturating_sub(1980).min(127) << 9)
            | ((self.month as u16 & 0x0F) << 5)
            | (self.day as u16 & 0x1F)
    }

    /// Packed FAT time: hours, minutes, seconds / 2.
    pub fn fat_time(&self) -> u16 {
        ((self.hours as u16 & 0x1F) << 11)
            | ((self.minutes as u16 & 0x3F) << 5)
            | ((self.seconds as u16 / 2) & 0x1F)
    }
}

pub trait TimeSource {
    fn get_timestamp(&self) -> Timestamp;
}

/// A fixed timestamp is its own source.
impl TimeSource for Timestamp {
    fn get_timestamp(&self) -> Timestamp {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing() {
        let t = Timestamp {
            year: 2025,
            month: 3,
            day: 14,
            hours: 15,
            minutes: 9,
            seconds: 27,
        };
        assert_eq!(t.fat_date(), (45 << 9) | (3 << 5) | 14);
        assert_eq!(t.fat_time(), (15 << 11) | (9 << 5) | 13);
    }

    #[test]
    fn uptime_stays_valid() {
        assert_eq!(Timestamp::from_uptime_secs(0), Timestamp::EPOCH);
        let t = Timestamp::from_uptime_secs(29 * 86_400 + 3_725);
        assert_eq!((t.month, t.day), (2, 2));
        assert_eq!((t.hours, t.minutes, t.seconds), (1, 2, 5));
        let t = Timestamp::from_uptime_secs(400 * 86_400);
        assert!(t.month >= 1 && t.month <= 12 && t.day <= 28);
        assert_eq!(t.year, 2026);
    }
}
