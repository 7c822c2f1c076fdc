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
use std::{error::Error, fmt, thread, time::Duration};

use tracing::{info, span, Level};

use crate::audio::{mixer::AudioMixer, OutputStream};
use crate::playsync::CancelHandle;

/// Frames rendered per block by the software clock.
const BLOCK_FRAMES: usize = 512;

/// A mock device. Renders the mixer in real time and discards the output.
#[derive(Clone)]
pub struct Device {
    name: String,
    sample_rate: u32,
    channels: u16,
    capture: bool,
}

impl Device {
    /// Gets the given mock device.
    pub fn new(name: &str, sample_rate: u32, channels: u16, capture: bool) -> Device {
        Device {
            name: name.to_string(),
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            capture,
        }
    }
}

impl crate::audio::Device for Device {
    fn open(&self, mixer: AudioMixer) -> Result<OutputStream, Box<dyn Error>> {
        let cancel_handle = CancelHandle::new();
        let block_duration =
            Duration::from_secs_f64(BLOCK_FRAMES as f64 / self.sample_rate as f64);
        let name = self.name.clone();

        {
            let cancel_handle = cancel_handle.clone();
            thread::Builder::new()
                .name("mock audio".into())
                .spawn(move || {
                    let span = span!(Level::INFO, "mock audio");
                    let _enter = span.enter();
                    info!(device = name, "Rendering to mock device.");

                    let mut block = vec![0.0f32; BLOCK_FRAMES * mixer.num_channels() as usize];
                    while !cancel_handle.is_cancelled() {
                        mixer.process_into(&mut block);
                        thread::sleep(block_duration);
                    }
                })?;
        }

        Ok(OutputStream::software(cancel_handle))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn supports_capture(&self) -> bool {
        self.capture
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}

#[cfg(test)]
mod tests {
    use crate::audio::Device as _;
    use crate::testutil::eventually;

    use super::*;

    #[test]
    fn test_mock_device_advances_the_clock_until_dropped() {
        let device = Device::new("mock", 44100, 2, true);
        assert!(device.supports_capture());
        assert_eq!("mock (Mock)", device.to_string());

        let mixer = AudioMixer::new(device.channels(), device.sample_rate());
        let stream = device.open(mixer.clone()).expect("open");
        eventually(
            || mixer.current_sample() > 0,
            "mock device never rendered",
        );

        drop(stream);
        thread::sleep(Duration::from_millis(50));
        let stopped_at = mixer.current_sample();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(stopped_at, mixer.current_sample());
    }
}
