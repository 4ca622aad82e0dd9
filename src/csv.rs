//! CSV text for sensor logs

use core::fmt::{self, Write};

/// `fmt::Write` into a fixed byte slice; fails instead of truncating.
pub struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
}

impl Write for ByteWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.pos + s.len();
        if end > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.pos..end].copy_from_slice(s.as_bytes());
        self.pos = end;
        Ok(())
    }
}

/// Leading lines of a sensor CSV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvHeader {
    /// Full-scale value, e.g. 2 for ±2 g
    pub range: u16,
    pub unit: &'static str,
    /// Duration of one `dt` tick, e.g. "1 us"
    pub dt_units: &'static str,
}

impl CsvHeader {
    pub fn write<W: Write>(&self, w: &mut W) -> fmt::Result {
        write!(
            w,
            "range: +/-{} {} (+/-32768)\ndt units: {}\ndt,x,y,z\n",
            self.range, self.unit, self.dt_units
        )
    }
}

/// `dt,x,y,z\n` with signed decimal axes.
pub fn format_record<W: Write>(w: &mut W, dt: u32, axes: &[i16]) -> fmt::Result {
    write!(w, "{}", dt)?;
    for a in axes {
        write!(w, ",{}", a)?;
    }
    w.write_char('\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CSV_MAX_RECORD;

    #[test]
    fn header() {
        let mut buf = [0u8; 128];
        let mut w = ByteWriter::new(&mut buf);
        CsvHeader {
            range: 250,
            unit: "dps",
            dt_units: "1 us",
        }
        .write(&mut w)
        .unwrap();
        assert_eq!(
            w.as_bytes(),
            b"range: +/-250 dps (+/-32768)\ndt units: 1 us\ndt,x,y,z\n"
        );
    }

    #[test]
    fn records() {
        let mut buf = [0u8; 64];
        let mut w = ByteWriter::new(&mut buf);
        format_record(&mut w, 1250, &[-32768, 0, 17]).unwrap();
        format_record(&mut w, 7, &[5]).unwrap();
        assert_eq!(w.as_bytes(), b"1250,-32768,0,17\n7,5\n");
    }

    #[test]
    fn longest_record_fits() {
        let mut buf = [0u8; CSV_MAX_RECORD];
        let mut w = ByteWriter::new(&mut buf);
        format_record(&mut w, u32::MAX, &[i16::MIN; 3]).unwrap();
        assert_eq!(w.len(), CSV_MAX_RECORD);
    }

    #[test]
    fn overflow_is_an_error() {
        let mut buf = [0u8; 4];
        let mut w = ByteWriter::new(&mut buf);
        assert!(format_record(&mut w, 12345, &[]).is_err());
    }
}
