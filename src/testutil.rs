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
use std::{
    error::Error,
    io::Cursor,
    thread,
    time::{Duration, SystemTime},
};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::audio::AudioAsset;

/// A mono asset holding `value` for `frames` frames.
pub fn constant_asset(value: f32, sample_rate: u32, frames: usize) -> AudioAsset {
    AudioAsset::new(sample_rate, vec![vec![value; frames]]).expect("valid asset")
}

/// A mono asset where second `n` holds the value `(n + 1) / 100`, so each region of the
/// asset can be told apart in the mixed output.
pub fn stepped_asset(sample_rate: u32, seconds: usize) -> AudioAsset {
    let mut plane = Vec::with_capacity(seconds * sample_rate as usize);
    for second in 0..seconds {
        plane.extend(vec![(second + 1) as f32 / 100.0; sample_rate as usize]);
    }
    AudioAsset::new(sample_rate, vec![plane]).expect("valid asset")
}

/// Encodes planar float samples as an in-memory 32-bit float WAV file.
pub fn write_wav(samples: &[Vec<f32>], sample_rate: u32) -> Result<Vec<u8>, Box<dyn Error>> {
    let num_channels = samples.len();
    assert!(num_channels <= u16::MAX.into(), "Too many channels!");
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(
            &mut cursor,
            WavSpec {
                channels: num_channels as u16,
                sample_rate,
                bits_per_sample: 32,
                sample_format: SampleFormat::Float,
            },
        )?;

        let frames = samples.first().map(|plane| plane.len()).unwrap_or(0);
        for frame in 0..frames {
            for plane in samples {
                writer.write_sample(plane[frame])?;
            }
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Polls the predicate with backoff until it holds, panicking after a timeout.
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = SystemTime::now();
    let mut tick = Duration::from_millis(5);
    let timeout = Duration::from_secs(10);
    let max_tick = Duration::from_millis(100);

    loop {
        let elapsed = start.elapsed().expect("System time error");
        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }

        thread::sleep(tick);
        tick = std::cmp::min(tick * 2, max_tick);
    }
}
