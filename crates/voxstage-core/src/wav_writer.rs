//! In-memory WAV encoder
//!
//! Turns normalized floating-point samples into a 16-bit PCM mono RIFF/WAVE
//! byte buffer with the canonical 44-byte header.

use std::io::Write;

use crate::error::{VoxError, VoxResult};

/// Size of the RIFF/WAVE header written before the samples
pub const WAV_HEADER_LEN: usize = 44;

/// PCM format parameters of the encoded output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    /// Number of audio channels
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bits per sample
    pub bit_depth: u16,
}

impl WavSpec {
    /// 16-bit PCM mono at `sample_rate`
    #[must_use]
    pub const fn pcm16_mono(sample_rate: u32) -> Self {
        Self {
            channels: 1,
            sample_rate,
            bit_depth: 16,
        }
    }

    const fn bytes_per_sample(&self) -> u16 {
        self.bit_depth / 8
    }

    /// Bytes per second
    #[must_use]
    pub const fn byte_rate(&self) -> u32 {
        self.sample_rate * self.channels as u32 * self.bytes_per_sample() as u32
    }

    /// Bytes per sample frame
    #[must_use]
    pub const fn block_align(&self) -> u16 {
        self.channels * self.bytes_per_sample()
    }
}

/// Convert one normalized sample to a 16-bit PCM value.
///
/// Clamps to [-1, 1], scales negatives by 32768 and non-negatives by 32767,
/// then truncates toward zero. NaN maps to silence.
#[must_use]
pub fn sample_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
    // `as` truncates toward zero and saturates at the i16 bounds.
    scaled as i16
}

/// Encode `samples` as a 16-bit PCM mono WAV file
///
/// # Errors
///
/// Returns an error if `sample_rate` is zero, if its byte rate does not fit
/// the header's 32-bit field, or if the clip is too long for a RIFF size field.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> VoxResult<Vec<u8>> {
    if sample_rate == 0 {
        return Err(VoxError::invalid_input("Sample rate must be positive"));
    }
    if sample_rate > u32::MAX / 2 {
        return Err(VoxError::invalid_input(format!(
            "Sample rate {sample_rate} is too high"
        )));
    }

    let spec = WavSpec::pcm16_mono(sample_rate);
    let data_size = samples
        .len()
        .checked_mul(usize::from(spec.block_align()))
        .and_then(|size| u32::try_from(size).ok())
        .filter(|size| size.checked_add(36).is_some())
        .ok_or_else(|| {
            VoxError::invalid_input(format!(
                "Clip of {} samples is too long for WAV",
                samples.len()
            ))
        })?;

    let mut buffer = Vec::with_capacity(WAV_HEADER_LEN + data_size as usize);
    write_header(&mut buffer, &spec, data_size)?;
    for &sample in samples {
        buffer.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
    }

    Ok(buffer)
}

/// Write the 44-byte RIFF/WAVE header
fn write_header<W: Write>(writer: &mut W, spec: &WavSpec, data_size: u32) -> VoxResult<()> {
    // RIFF chunk
    writer.write_all(b"RIFF")?;
    writer.write_all(&(36 + data_size).to_le_bytes())?;
    writer.write_all(b"WAVE")?;

    // fmt chunk
    writer.write_all(b"fmt ")?;
    writer.write_all(&16u32.to_le_bytes())?;
    writer.write_all(&1u16.to_le_bytes())?; // PCM
    writer.write_all(&spec.channels.to_le_bytes())?;
    writer.write_all(&spec.sample_rate.to_le_bytes())?;
    writer.write_all(&spec.byte_rate().to_le_bytes())?;
    writer.write_all(&spec.block_align().to_le_bytes())?;
    writer.write_all(&spec.bit_depth.to_le_bytes())?;

    // data chunk
    writer.write_all(b"data")?;
    writer.write_all(&data_size.to_le_bytes())?;
    Ok(())
}
