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
use std::future::Future;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::audio::Signal;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to decode audio: {0}")]
    Decode(String),

    #[error("audio file error: {0}")]
    Audio(#[from] SymphoniaError),

    #[error("decode was superseded by a newer upload")]
    Superseded,

    #[error("decode worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// A decoded, immutable audio buffer. Voices share it through an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAsset {
    sample_rate: u32,
    /// One vector per channel, all the same length.
    planes: Vec<Vec<f32>>,
}

impl AudioAsset {
    /// Creates an asset from planar data.
    pub fn new(sample_rate: u32, planes: Vec<Vec<f32>>) -> Result<AudioAsset, LoadError> {
        if sample_rate == 0 {
            return Err(LoadError::Decode("sample rate must be positive".into()));
        }
        if planes.is_empty() || planes.len() > u16::MAX as usize {
            return Err(LoadError::Decode(format!(
                "unsupported channel count {}",
                planes.len()
            )));
        }
        let frames = planes[0].len();
        if planes.iter().any(|plane| plane.len() != frames) {
            return Err(LoadError::Decode("channels differ in length".into()));
        }
        Ok(AudioAsset {
            sample_rate,
            planes,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.planes.len() as u16
    }

    /// Number of frames per channel.
    pub fn frames(&self) -> usize {
        self.planes[0].len()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.planes[index]
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Returns the samples interleaved frame by frame.
    pub fn interleaved(&self) -> Vec<f32> {
        let mut samples = Vec::with_capacity(self.frames() * self.planes.len());
        for frame in 0..self.frames() {
            for plane in self.planes.iter() {
                samples.push(plane[frame]);
            }
        }
        samples
    }
}

/// Decodes a complete in-memory file. `extension` is a format hint such as "wav".
pub fn decode(bytes: Vec<u8>, extension: Option<&str>) -> Result<AudioAsset, LoadError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| LoadError::Decode("no audio track found".into()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| LoadError::Decode("sample rate not specified".into()))?;
    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut planes: Vec<Vec<f32>> = Vec::new();
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt packet is skipped; the rest of the file is still usable.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let mut buffer = decoded.make_equivalent::<f32>();
        decoded.convert(&mut buffer);
        let channels = buffer.spec().channels.count();
        if planes.is_empty() {
            planes = vec![Vec::new(); channels];
        }
        for (index, plane) in planes.iter_mut().enumerate().take(channels) {
            plane.extend_from_slice(buffer.chan(index));
        }
    }

    if planes.is_empty() {
        return Err(LoadError::Decode("no audio frames decoded".into()));
    }
    AudioAsset::new(sample_rate, planes)
}

/// Decodes uploads on the blocking pool. A newer upload supersedes any decode still in
/// flight: the older one resolves to `LoadError::Superseded`.
#[derive(Clone, Default)]
pub struct AssetLoader {
    generation: Arc<AtomicU64>,
}

impl AssetLoader {
    pub fn new() -> AssetLoader {
        AssetLoader::default()
    }

    /// Starts decoding. The upload is registered as the newest one immediately, before the
    /// returned future is first polled.
    pub fn load(
        &self,
        bytes: Vec<u8>,
        extension: Option<String>,
    ) -> impl Future<Output = Result<AudioAsset, LoadError>> + Send + 'static {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let current = self.generation.clone();
        async move {
            let result =
                tokio::task::spawn_blocking(move || decode(bytes, extension.as_deref())).await?;
            if current.load(Ordering::Acquire) != generation {
                debug!(generation, "Discarding superseded decode");
                return Err(LoadError::Superseded);
            }
            let asset = result?;
            info!(
                channels = asset.channels(),
                sample_rate = asset.sample_rate(),
                duration = ?asset.duration(),
                "Decoded audio asset"
            );
            Ok(asset)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav::encode_wav;

    fn wav_bytes(samples: &[f32], channels: u16, sample_rate: u32) -> Vec<u8> {
        encode_wav(samples, channels, sample_rate).expect("encode wav")
    }

    #[test]
    fn test_asset_rejects_ragged_channels() {
        assert!(AudioAsset::new(44100, vec![vec![0.0; 4], vec![0.0; 3]]).is_err());
        assert!(AudioAsset::new(44100, vec![]).is_err());
        assert!(AudioAsset::new(0, vec![vec![0.0]]).is_err());
    }

    #[test]
    fn test_interleaving() {
        let asset = AudioAsset::new(10, vec![vec![0.0, 0.5], vec![1.0, -1.0]]).expect("asset");
        assert_eq!(2, asset.frames());
        assert_eq!(&[0.0, 0.5], asset.channel(0));
        assert_eq!(vec![0.0, 1.0, 0.5, -1.0], asset.interleaved());
        assert_eq!(Duration::from_millis(200), asset.duration());
    }

    #[test]
    fn test_decode_wav() {
        let bytes = wav_bytes(&[0.0, 0.5, -0.5, 1.0, 0.0, -1.0], 2, 22050);
        let asset = decode(bytes, Some("wav")).expect("decode");
        assert_eq!(2, asset.channels());
        assert_eq!(22050, asset.sample_rate());
        assert_eq!(3, asset.frames());
        assert!((asset.channel(0)[1] + 0.5).abs() < 1e-3);
        assert!((asset.channel(1)[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_float_wav() {
        let bytes = crate::testutil::write_wav(&[vec![0.25, -0.75, 0.5]], 48000).expect("wav");
        let asset = decode(bytes, Some("wav")).expect("decode");
        assert_eq!(1, asset.channels());
        assert_eq!(48000, asset.sample_rate());
        assert_eq!(&[0.25, -0.75, 0.5], asset.channel(0));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode(b"definitely not audio".to_vec(), None).is_err());
    }

    #[tokio::test]
    async fn test_newer_upload_supersedes() {
        let loader = AssetLoader::new();
        let first = loader.load(wav_bytes(&[0.1; 8], 1, 8000), Some("wav".into()));
        let second = loader.load(wav_bytes(&[0.2; 4], 1, 8000), Some("wav".into()));

        let (first, second) = tokio::join!(first, second);
        assert!(matches!(first, Err(LoadError::Superseded)));
        assert_eq!(4, second.expect("second upload").frames());
    }

    #[tokio::test]
    async fn test_failed_decode_reports_error() {
        let loader = AssetLoader::new();
        let result = loader.load(b"nope".to_vec(), None).await;
        assert!(matches!(result, Err(LoadError::Audio(_)) | Err(LoadError::Decode(_))));
    }
}
