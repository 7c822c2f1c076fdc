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
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::Deserialize;

use crate::drums::{MAX_TRACKS, MIN_TRACKS};

mod audio;
mod drums;
mod error;
mod export;
mod sequencer;

pub use self::audio::Audio;
pub use self::drums::{Drum, Drums};
pub use self::error::ConfigError;
pub use self::export::Export;
pub use self::sequencer::Sequencer;

/// The sampler configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct SamplerConfig {
    #[serde(default)]
    audio: Audio,

    #[serde(default)]
    sequencer: Sequencer,

    #[serde(default)]
    drums: Drums,

    #[serde(default)]
    export: Export,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl SamplerConfig {
    /// Parse the sampler configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<SamplerConfig, ConfigError> {
        let mut config = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<SamplerConfig>()?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let tracks = self.sequencer.tracks();
        if !(MIN_TRACKS..=MAX_TRACKS).contains(&tracks) {
            return Err(ConfigError::Invalid(format!(
                "sequencer tracks must be between {} and {}, got {}",
                MIN_TRACKS, MAX_TRACKS, tracks
            )));
        }
        if self.drums.tracks().len() > tracks {
            return Err(ConfigError::Invalid(format!(
                "{} drum tracks configured but the kit has {}",
                self.drums.tracks().len(),
                tracks
            )));
        }
        Ok(())
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut Audio {
        &mut self.audio
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn drums(&self) -> &Drums {
        &self.drums
    }

    pub fn export(&self) -> &Export {
        &self.export
    }

    /// The directory drum samples are resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}
