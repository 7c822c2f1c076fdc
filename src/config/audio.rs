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
use serde::Deserialize;

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_MAX_VOICES: usize = 32;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Audio {
    /// The audio device. "default" picks the host's default output, names starting with
    /// "mock" pick the mock device.
    device: Option<String>,

    /// Sample rate in Hz for the mock device, and a hint for real ones (default: 44100).
    sample_rate: Option<u32>,

    /// Number of output channels (default: 2).
    channels: Option<u16>,

    /// Most voices that may sound at once before the oldest is stolen (default: 32).
    max_voices: Option<usize>,

    /// Whether the master bus may be recorded (default: true).
    capture: Option<bool>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: Some(device.to_string()),
            ..Default::default()
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Overrides the device, e.g. from the command line.
    pub fn set_device(&mut self, device: &str) {
        self.device = Some(device.to_string());
    }

    /// Returns the sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the number of output channels (default: 2), at least 1.
    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS).max(1)
    }

    /// Returns the global voice limit (default: 32), at least 1.
    pub fn max_voices(&self) -> usize {
        self.max_voices.unwrap_or(DEFAULT_MAX_VOICES).max(1)
    }

    /// Returns whether recording is allowed (default: true).
    pub fn capture(&self) -> bool {
        self.capture.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use config::{Config, File, FileFormat};

    use super::*;

    #[test]
    fn test_defaults() {
        let audio = Audio::default();
        assert_eq!("default", audio.device());
        assert_eq!(44100, audio.sample_rate());
        assert_eq!(2, audio.channels());
        assert_eq!(32, audio.max_voices());
        assert!(audio.capture());
    }

    #[test]
    fn test_deserialize() {
        let yaml = r#"
            device: mock-device
            sample_rate: 48000
            channels: 0
            max_voices: 8
            capture: false
        "#;

        let mut audio: Audio = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!("mock-device", audio.device());
        assert_eq!(48000, audio.sample_rate());
        assert_eq!(1, audio.channels());
        assert_eq!(8, audio.max_voices());
        assert!(!audio.capture());

        audio.set_device("hw:1");
        assert_eq!("hw:1", audio.device());
        assert_eq!("mock", Audio::new("mock").device());
    }
}
