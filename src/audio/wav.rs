// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use super::asset::AudioAsset;

/// Size of the canonical RIFF/WAVE header written before the sample data.
pub const HEADER_LEN: usize = 44;

const BYTES_PER_SAMPLE: u16 = 2;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("cannot encode {0} channels")]
    Channels(u16),

    #[error("{0} bytes of audio do not fit in a WAV file")]
    TooLarge(usize),
}

/// Quantizes a float sample to 16 bits. Negative values scale by 32768 and positive
/// values by 32767 so both ends of the range are reachable.
pub fn quantize(sample: f32) -> i16 {
    let sample = sample.clamp(-1.0, 1.0);
    if sample < 0.0 {
        (sample * 32768.0) as i16
    } else {
        (sample * 32767.0) as i16
    }
}

/// Encodes interleaved samples as a 16-bit PCM WAV file with a plain format 1 header,
/// whatever the channel count. Trailing partial frames are dropped.
pub fn encode_wav(
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
) -> Result<Vec<u8>, EncodeError> {
    if channels == 0 {
        return Err(EncodeError::Channels(channels));
    }
    let frames = samples.len() / channels as usize;
    let samples = &samples[..frames * channels as usize];

    let data_len = samples.len() * BYTES_PER_SAMPLE as usize;
    let data_size = u32::try_from(data_len).map_err(|_| EncodeError::TooLarge(data_len))?;
    let riff_size = data_size
        .checked_add(HEADER_LEN as u32 - 8)
        .ok_or(EncodeError::TooLarge(data_len))?;
    let block_align = channels
        .checked_mul(BYTES_PER_SAMPLE)
        .ok_or(EncodeError::Channels(channels))?;
    let byte_rate = sample_rate
        .checked_mul(block_align as u32)
        .ok_or(EncodeError::TooLarge(data_len))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + data_len);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&riff_size.to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&(BYTES_PER_SAMPLE * 8).to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_size.to_le_bytes());
    for sample in samples {
        bytes.extend_from_slice(&quantize(*sample).to_le_bytes());
    }
    Ok(bytes)
}

/// Encodes a whole asset at its own rate and channel count.
pub fn encode_asset(asset: &AudioAsset) -> Result<Vec<u8>, EncodeError> {
    encode_wav(&asset.interleaved(), asset.channels(), asset.sample_rate())
}
