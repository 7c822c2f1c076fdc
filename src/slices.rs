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
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// The highest slice number. Slices are numbered 1 through this.
pub const MAX_SLICES: u8 = 9;

/// Fill color given to accepted regions in the waveform view.
pub const SLICE_REGION_COLOR: &str = "rgba(135, 206, 235, 0.3)";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SliceError {
    #[error("maximum 9 slices allowed")]
    CapacityExceeded,

    #[error("invalid region {start}..{end}")]
    InvalidRegion { start: f64, end: f64 },

    #[error("slice {0} not found")]
    NotFound(u8),
}

/// A span of the loaded asset, in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SliceRegion {
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl SliceRegion {
    /// Creates a region, rejecting empty, reversed, negative and non-finite spans.
    pub fn new(start_seconds: f64, end_seconds: f64) -> Result<SliceRegion, SliceError> {
        if !start_seconds.is_finite()
            || !end_seconds.is_finite()
            || start_seconds < 0.0
            || start_seconds >= end_seconds
        {
            return Err(SliceError::InvalidRegion {
                start: start_seconds,
                end: end_seconds,
            });
        }
        Ok(SliceRegion {
            start_seconds,
            end_seconds,
        })
    }

    pub fn length_seconds(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}

/// How a slice voice behaves once it reaches the end of its region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SliceMode {
    #[default]
    Classic,
    Oneshot,
    Loop,
}

impl fmt::Display for SliceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self {
            SliceMode::Classic => "classic",
            SliceMode::Oneshot => "oneshot",
            SliceMode::Loop => "loop",
        };
        write!(f, "{}", mode)
    }
}

/// Per-slice playback settings. They only affect the next trigger.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SliceSettings {
    /// Linear gain, 0 to 1.
    pub volume: f32,
    /// Speed multiplier, 0.5 to 2.
    pub tempo: f32,
    /// Pitch shift in semitones, -12 to 12.
    pub transpose_semitones: f32,
    /// Reverb send level, 0 to 1.
    pub reverb_mix: f32,
    pub mode: SliceMode,
}

impl Default for SliceSettings {
    fn default() -> Self {
        SliceSettings {
            volume: 1.0,
            tempo: 1.0,
            transpose_semitones: 0.0,
            reverb_mix: 0.0,
            mode: SliceMode::Classic,
        }
    }
}

/// Clamps into range; NaN falls back to the default.
fn clamp_or(value: f32, min: f32, max: f32, default: f32) -> f32 {
    if value.is_nan() {
        default
    } else {
        value.clamp(min, max)
    }
}

impl SliceSettings {
    /// Returns the settings with every value clamped into its range.
    pub fn clamped(self) -> SliceSettings {
        let default = SliceSettings::default();
        SliceSettings {
            volume: clamp_or(self.volume, 0.0, 1.0, default.volume),
            tempo: clamp_or(self.tempo, 0.5, 2.0, default.tempo),
            transpose_semitones: clamp_or(
                self.transpose_semitones,
                -12.0,
                12.0,
                default.transpose_semitones,
            ),
            reverb_mix: clamp_or(self.reverb_mix, 0.0, 1.0, default.reverb_mix),
            mode: self.mode,
        }
    }

    /// `2^(transpose / 12) * tempo`.
    pub fn playback_rate(&self) -> f64 {
        2f64.powf(self.transpose_semitones as f64 / 12.0) * self.tempo as f64
    }
}

/// A numbered slice.
#[derive(Clone, Debug, PartialEq)]
pub struct Slice {
    pub id: u8,
    pub region: SliceRegion,
    pub settings: SliceSettings,
}

/// Options the engine applies to a region in the waveform view.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionOptions {
    /// Label drawn on the region.
    pub content: String,
    pub color: String,
    pub drag: bool,
    pub resize: bool,
}

impl RegionOptions {
    /// The options for an accepted slice.
    pub fn for_slice(id: u8) -> RegionOptions {
        RegionOptions {
            content: id.to_string(),
            color: SLICE_REGION_COLOR.to_string(),
            drag: true,
            resize: true,
        }
    }
}

/// A region drawn in the waveform view. Only the operations the engine needs.
pub trait WaveformRegion {
    fn start(&self) -> f64;
    fn end(&self) -> f64;
    /// Removes the region from the view.
    fn remove(&mut self);
    fn set_options(&mut self, options: RegionOptions);
}

/// Slice number to region and settings. Holds at most nine slices and always numbers a new
/// slice with the lowest free id.
#[derive(Debug, Default)]
pub struct SliceRegistry {
    slices: BTreeMap<u8, Slice>,
}

impl SliceRegistry {
    pub fn new() -> SliceRegistry {
        SliceRegistry::default()
    }

    /// The id the next slice would get, if there is room.
    pub fn next_free_id(&self) -> Option<u8> {
        (1..=MAX_SLICES).find(|id| !self.slices.contains_key(id))
    }

    /// Adds a slice with default settings. A full registry is left untouched.
    pub fn create_slice(&mut self, region: SliceRegion) -> Result<u8, SliceError> {
        let region = SliceRegion::new(region.start_seconds, region.end_seconds)?;
        let id = self.next_free_id().ok_or(SliceError::CapacityExceeded)?;
        self.slices.insert(
            id,
            Slice {
                id,
                region,
                settings: SliceSettings::default(),
            },
        );
        debug!(
            slice = id,
            start = region.start_seconds,
            end = region.end_seconds,
            "Slice created"
        );
        Ok(id)
    }

    pub fn delete_slice(&mut self, id: u8) -> Result<Slice, SliceError> {
        let slice = self.slices.remove(&id).ok_or(SliceError::NotFound(id))?;
        debug!(slice = id, "Slice deleted");
        Ok(slice)
    }

    /// Replaces a slice's settings, clamping out-of-range values.
    pub fn update_settings(
        &mut self,
        id: u8,
        settings: SliceSettings,
    ) -> Result<SliceSettings, SliceError> {
        let slice = self.slices.get_mut(&id).ok_or(SliceError::NotFound(id))?;
        slice.settings = settings.clamped();
        Ok(slice.settings)
    }

    /// Moves or resizes a slice.
    pub fn update_region(&mut self, id: u8, region: SliceRegion) -> Result<(), SliceError> {
        let region = SliceRegion::new(region.start_seconds, region.end_seconds)?;
        let slice = self.slices.get_mut(&id).ok_or(SliceError::NotFound(id))?;
        slice.region = region;
        Ok(())
    }

    pub fn get(&self, id: u8) -> Option<&Slice> {
        self.slices.get(&id)
    }

    /// Slices in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Slice> {
        self.slices.values()
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn clear(&mut self) {
        self.slices.clear();
    }
}
