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

use crate::drums::MAX_TRACKS;
use crate::sequencer::{clamp_bpm, DEFAULT_BPM};

/// A YAML representation of the sequencer settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Sequencer {
    /// Starting tempo (default: 120), clamped to 40..=240.
    bpm: Option<f64>,

    /// Number of drum tracks (default: 6). Must be 3 to 6.
    tracks: Option<usize>,
}

impl Sequencer {
    pub fn bpm(&self) -> f64 {
        clamp_bpm(self.bpm.unwrap_or(DEFAULT_BPM))
    }

    pub fn tracks(&self) -> usize {
        self.tracks.unwrap_or(MAX_TRACKS)
    }
}
