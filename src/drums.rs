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
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audio::effects::{db_to_gain, eq_stages, EffectSpec};
use crate::audio::AudioAsset;

/// Fewest drum tracks a kit may have.
pub const MIN_TRACKS: usize = 3;
/// Most drum tracks a kit may have.
pub const MAX_TRACKS: usize = 6;
/// Gain every drum voice is played at.
pub const DEFAULT_DRUM_GAIN_DB: f32 = -6.0;
/// Largest EQ boost or cut, in dB.
pub const EQ_RANGE_DB: f32 = 12.0;

/// Track names, in track order.
pub const TRACK_NAMES: [&str; MAX_TRACKS] =
    ["Kick", "Snare", "Closed Hat", "Open Hat", "Clap", "Perc"];

/// Three-band EQ gains for a drum track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EqSettings {
    #[serde(default, alias = "low")]
    pub low_db: f32,
    #[serde(default, alias = "mid")]
    pub mid_db: f32,
    #[serde(default, alias = "high")]
    pub high_db: f32,
}

impl EqSettings {
    pub fn new(low_db: f32, mid_db: f32, high_db: f32) -> EqSettings {
        EqSettings {
            low_db,
            mid_db,
            high_db,
        }
    }

    /// Returns the settings with each band clamped to ±12 dB. NaN is treated as flat.
    pub fn clamped(self) -> EqSettings {
        let clamp = |db: f32| {
            if db.is_nan() {
                0.0
            } else {
                db.clamp(-EQ_RANGE_DB, EQ_RANGE_DB)
            }
        };
        EqSettings {
            low_db: clamp(self.low_db),
            mid_db: clamp(self.mid_db),
            high_db: clamp(self.high_db),
        }
    }

    /// Filter stages, low to high, without flat bands.
    pub fn stages(&self) -> Vec<EffectSpec> {
        eq_stages(self.low_db, self.mid_db, self.high_db)
    }
}

/// One drum track: a one-shot sample and its EQ.
#[derive(Clone, Debug)]
pub struct DrumTrack {
    pub index: usize,
    pub name: String,
    pub sample: Option<Arc<AudioAsset>>,
    pub eq: EqSettings,
}

/// The fixed, ordered set of drum tracks shared by the pads and the sequencer.
#[derive(Clone, Debug)]
pub struct DrumKit {
    tracks: Vec<DrumTrack>,
    gain_db: f32,
}

impl Default for DrumKit {
    fn default() -> Self {
        DrumKit::new(MAX_TRACKS)
    }
}

impl DrumKit {
    /// Creates a kit with the given number of tracks, clamped to 3..=6.
    pub fn new(track_count: usize) -> DrumKit {
        let track_count = track_count.clamp(MIN_TRACKS, MAX_TRACKS);
        DrumKit {
            tracks: TRACK_NAMES[..track_count]
                .iter()
                .enumerate()
                .map(|(index, name)| DrumTrack {
                    index,
                    name: name.to_string(),
                    sample: None,
                    eq: EqSettings::default(),
                })
                .collect(),
            gain_db: DEFAULT_DRUM_GAIN_DB,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn track(&self, index: usize) -> Option<&DrumTrack> {
        self.tracks.get(index)
    }

    pub fn tracks(&self) -> &[DrumTrack] {
        &self.tracks
    }

    /// Renames a track. Returns false if the track does not exist.
    pub fn set_name(&mut self, index: usize, name: &str) -> bool {
        match self.tracks.get_mut(index) {
            Some(track) => {
                track.name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Replaces a track's sample. Returns false if the track does not exist.
    pub fn set_sample(&mut self, index: usize, sample: Arc<AudioAsset>) -> bool {
        match self.tracks.get_mut(index) {
            Some(track) => {
                track.sample = Some(sample);
                true
            }
            None => false,
        }
    }

    /// Replaces a track's EQ, clamped. Returns the applied settings.
    pub fn set_eq(&mut self, index: usize, eq: EqSettings) -> Option<EqSettings> {
        let track = self.tracks.get_mut(index)?;
        track.eq = eq.clamped();
        Some(track.eq)
    }

    pub fn set_gain_db(&mut self, gain_db: f32) {
        self.gain_db = gain_db;
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    /// The effect chain of a hit on the given track: kit gain, then the EQ bands.
    pub fn stages(&self, index: usize) -> Option<Vec<EffectSpec>> {
        let track = self.tracks.get(index)?;
        let mut stages = vec![EffectSpec::Gain {
            gain: db_to_gain(self.gain_db),
        }];
        stages.extend(track.eq.stages());
        Some(stages)
    }
}
