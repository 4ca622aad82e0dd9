//! RIFF/WAVE header for PCM audio

use crate::config::AUDIO_SAMPLE_RATE;

pub const WAVE_HEADER_LEN: usize = 44;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub struct WaveFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl Default for WaveFormat {
    /// 8-bit mono at the microphone rate
    fn default() -> Self {
        Self {
            sample_rate: AUDIO_SAMPLE_RATE,
            channels: 1,
            bits_per_sample: 8,
        }
    }
}

impl WaveFormat {
    pub fn block_align(&self) -> u16 {
        self.channels * self.bits_per_sample.div_ceil(8)
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveHeader {
    pub format: WaveFormat,
    /// Payload bytes after the header
    pub data_len: u32,
}

impl WaveHeader {
    pub fn new(format: WaveFormat, data_len: u32) -> Self {
        Self { format, data_len }
    }

    pub fn encode(&self) -> [u8; WAVE_HEADER_LEN] {
        let f = &self.format;
        let mut h = [0u8; WAVE_HEADER_LEN];
        h[0..4].copy_from_slice(b"RIFF");
        h[8..12].copy_from_slice(b"WAVE");
        h[12..16].copy_from_slice(b"fmt ");
        h[16..20].copy_from_slice(&16u32.to_le_bytes());
        h[20..22].copy_from_slice(&1u16.to_le_bytes());
        h[22..24].copy_from_slice(&f.channels.to_le_bytes());
        h[24..28].copy_from_slice(&f.sample_rate.to_le_bytes());
        h[28..32].copy_from_slice(&f.byte_rate().to_le_bytes());
        h[32..34].copy_from_slice(&f.block_align().to_le_bytes());
        h[34..36].copy_from_slice(&f.bits_per_sample.to_le_bytes());
        h[36..40].copy_from_slice(b"data");
        patch_sizes(&mut h, self.data_len);
        h
    }
}

/// Rewrite the RIFF and data sizes of a header at the front of `buf`.
pub fn patch_sizes(buf: &mut [u8], data_len: u32) {
    let riff = data_len.saturating_add(WAVE_HEADER_LEN as u32 - 8);
    buf[4..8].copy_from_slice(&riff.to_le_bytes());
    buf[40..44].copy_from_slice(&data_len.to_le_bytes());
}
