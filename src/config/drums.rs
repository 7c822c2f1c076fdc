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

use serde::Deserialize;

use crate::drums::{EqSettings, DEFAULT_DRUM_GAIN_DB};

/// A YAML representation of one drum track.
#[derive(Deserialize, Clone, Debug)]
pub struct Drum {
    /// Display name. Defaults to the built-in name for the track.
    name: Option<String>,

    /// One-shot sample, relative to the config file.
    file: Option<String>,

    /// Three-band EQ in dB.
    #[serde(default)]
    eq: EqSettings,
}

impl Drum {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the sample path resolved against the given directory.
    pub fn file(&self, base: &Path) -> Option<PathBuf> {
        self.file.as_ref().map(|file| base.join(file))
    }

    pub fn eq(&self) -> EqSettings {
        self.eq
    }
}

/// A YAML representation of the drum kit.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Drums {
    /// Gain applied to every drum hit (default: -6 dB).
    gain_db: Option<f32>,

    /// Tracks in order. Missing tracks keep their defaults.
    #[serde(default)]
    tracks: Vec<Drum>,
}

impl Drums {
    pub fn gain_db(&self) -> f32 {
        self.gain_db.unwrap_or(DEFAULT_DRUM_GAIN_DB)
    }

    pub fn tracks(&self) -> &[Drum] {
        &self.tracks
    }
}
