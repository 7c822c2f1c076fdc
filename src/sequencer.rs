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
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Steps in a pattern.
pub const STEPS: usize = 16;
/// Slowest tempo.
pub const MIN_BPM: f64 = 40.0;
/// Fastest tempo.
pub const MAX_BPM: f64 = 240.0;
/// Tempo used when nothing else is configured.
pub const DEFAULT_BPM: f64 = 120.0;

#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    #[error("track {0} is out of range")]
    TrackOutOfRange(usize),

    #[error("step {0} is out of range")]
    StepOutOfRange(usize),

    #[error("no pattern is mapped to {0}")]
    NotMapped(SequenceKey),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("pattern JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Clamps a tempo into the supported range. NaN becomes the default tempo.
pub fn clamp_bpm(bpm: f64) -> f64 {
    if bpm.is_nan() {
        DEFAULT_BPM
    } else {
        bpm.clamp(MIN_BPM, MAX_BPM)
    }
}

/// Time between steps: a sixteenth note, `60 / bpm / 4` seconds.
pub fn step_interval(bpm: f64) -> Duration {
    Duration::from_secs_f64(60.0 / clamp_bpm(bpm) / 4.0)
}

/// The keys a pattern can be mapped to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SequenceKey {
    H,
    J,
    K,
}

impl SequenceKey {
    pub const ALL: [SequenceKey; 3] = [SequenceKey::H, SequenceKey::J, SequenceKey::K];

    /// Case-insensitive.
    pub fn from_char(c: char) -> Option<SequenceKey> {
        match c.to_ascii_lowercase() {
            'h' => Some(SequenceKey::H),
            'j' => Some(SequenceKey::J),
            'k' => Some(SequenceKey::K),
            _ => None,
        }
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self {
            SequenceKey::H => "H",
            SequenceKey::J => "J",
            SequenceKey::K => "K",
        };
        write!(f, "{}", key)
    }
}

/// A 16-step on/off grid per drum track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    tracks: Vec<[bool; STEPS]>,
}

impl Pattern {
    pub fn new(track_count: usize) -> Pattern {
        Pattern {
            tracks: vec![[false; STEPS]; track_count],
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn check(&self, track: usize, step: usize) -> Result<(), SequencerError> {
        if track >= self.tracks.len() {
            return Err(SequencerError::TrackOutOfRange(track));
        }
        if step >= STEPS {
            return Err(SequencerError::StepOutOfRange(step));
        }
        Ok(())
    }

    /// Flips a step. Returns its new state.
    pub fn toggle(&mut self, track: usize, step: usize) -> Result<bool, SequencerError> {
        self.check(track, step)?;
        let cell = &mut self.tracks[track][step];
        *cell = !*cell;
        Ok(*cell)
    }

    pub fn set(&mut self, track: usize, step: usize, on: bool) -> Result<(), SequencerError> {
        self.check(track, step)?;
        self.tracks[track][step] = on;
        Ok(())
    }

    pub fn is_on(&self, track: usize, step: usize) -> bool {
        self.tracks
            .get(track)
            .and_then(|steps| steps.get(step))
            .copied()
            .unwrap_or(false)
    }

    /// Tracks with the given step on, in track order.
    pub fn active_tracks(&self, step: usize) -> Vec<usize> {
        (0..self.tracks.len())
            .filter(|track| self.is_on(*track, step))
            .collect()
    }

    pub fn clear(&mut self) {
        for steps in self.tracks.iter_mut() {
            *steps = [false; STEPS];
        }
    }

    pub fn rows(&self) -> Vec<Vec<bool>> {
        self.tracks.iter().map(|steps| steps.to_vec()).collect()
    }

    /// Builds a pattern from rows of exactly 16 steps.
    pub fn from_rows(rows: &[Vec<bool>]) -> Result<Pattern, SequencerError> {
        let mut pattern = Pattern::new(rows.len());
        for (track, row) in rows.iter().enumerate() {
            if row.len() != STEPS {
                return Err(SequencerError::InvalidPattern(format!(
                    "track {} has {} steps, expected {}",
                    track,
                    row.len(),
                    STEPS
                )));
            }
            pattern.tracks[track].copy_from_slice(row);
        }
        Ok(pattern)
    }
}

/// Position within a pattern. Starts before step 0 so the first advance plays step 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepCursor {
    position: Option<usize>,
}

impl StepCursor {
    /// Moves to the next step and returns it.
    pub fn advance(&mut self) -> usize {
        let next = match self.position {
            Some(step) => (step + 1) % STEPS,
            None => 0,
        };
        self.position = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.position = None;
    }

    /// The step played last, if any.
    pub fn position(&self) -> Option<usize> {
        self.position
    }
}

/// The drum hits of one sequencer tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tick {
    pub step: usize,
    pub tracks: Vec<usize>,
}

/// What pressing a mapped key did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MappedToggle {
    /// The key's sequence started, stopping the previous one if there was one.
    Started { stopped: Option<SequenceKey> },
    /// The key's sequence was playing and has stopped.
    Stopped,
}

/// The JSON pattern dump.
#[derive(Debug, Serialize, Deserialize)]
struct PatternDump {
    pattern: Vec<Vec<bool>>,
    bpm: f64,
}

/// The live pattern and its clock, plus patterns mapped to keys. Timing lives with the
/// caller: it asks for a tick whenever the step interval elapses.
#[derive(Debug)]
pub struct Sequencer {
    pattern: Pattern,
    bpm: f64,
    running: bool,
    cursor: StepCursor,
    mappings: BTreeMap<SequenceKey, Pattern>,
    active_mapping: Option<(SequenceKey, StepCursor)>,
}

impl Sequencer {
    pub fn new(track_count: usize, bpm: f64) -> Sequencer {
        Sequencer {
            pattern: Pattern::new(track_count),
            bpm: clamp_bpm(bpm),
            running: false,
            cursor: StepCursor::default(),
            mappings: BTreeMap::new(),
            active_mapping: None,
        }
    }

    /// Starts the live clock at the given tempo. Returns false if it was already running.
    pub fn start(&mut self, bpm: f64) -> bool {
        self.set_bpm(bpm);
        if self.running {
            return false;
        }
        self.running = true;
        self.cursor.reset();
        info!(bpm = self.bpm, "Sequencer started");
        true
    }

    /// Stops the live clock and rewinds it. Returns false if it was not running.
    pub fn stop(&mut self) -> bool {
        self.cursor.reset();
        if !self.running {
            return false;
        }
        self.running = false;
        info!("Sequencer stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Advances the live cursor and returns the hits for the new step.
    pub fn tick(&mut self) -> Option<Tick> {
        if !self.running {
            return None;
        }
        let step = self.cursor.advance();
        Some(Tick {
            step,
            tracks: self.pattern.active_tracks(step),
        })
    }

    /// The step the live cursor played last.
    pub fn current_step(&self) -> Option<usize> {
        self.cursor.position()
    }

    pub fn toggle_step(&mut self, track: usize, step: usize) -> Result<bool, SequencerError> {
        let on = self.pattern.toggle(track, step)?;
        debug!(track, step, on, "Step toggled");
        Ok(on)
    }

    pub fn clear(&mut self) {
        self.pattern.clear();
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Sets the tempo, clamped to 40..=240. Returns the applied tempo.
    pub fn set_bpm(&mut self, bpm: f64) -> f64 {
        self.bpm = clamp_bpm(bpm);
        self.bpm
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn interval(&self) -> Duration {
        step_interval(self.bpm)
    }

    /// Snapshots the live pattern under a key, replacing any earlier mapping.
    pub fn map_current_pattern_to(&mut self, key: SequenceKey) {
        self.mappings.insert(key, self.pattern.clone());
        info!(key = %key, "Pattern mapped");
    }

    /// Removes a mapping, stopping its sequence if it is the active one.
    pub fn clear_mapping(&mut self, key: SequenceKey) -> Result<(), SequencerError> {
        self.mappings
            .remove(&key)
            .ok_or(SequencerError::NotMapped(key))?;
        if self.active_mapped_key() == Some(key) {
            self.active_mapping = None;
        }
        Ok(())
    }

    pub fn is_mapped(&self, key: SequenceKey) -> bool {
        self.mappings.contains_key(&key)
    }

    pub fn mapped_pattern(&self, key: SequenceKey) -> Option<&Pattern> {
        self.mappings.get(&key)
    }

    /// Presses a mapped key: starts its sequence, or stops it if it is the active one.
    /// At most one mapped sequence plays at a time.
    pub fn toggle_mapped(&mut self, key: SequenceKey) -> Result<MappedToggle, SequencerError> {
        if !self.mappings.contains_key(&key) {
            return Err(SequencerError::NotMapped(key));
        }
        match self.active_mapped_key() {
            Some(active) if active == key => {
                self.active_mapping = None;
                info!(key = %key, "Mapped sequence stopped");
                Ok(MappedToggle::Stopped)
            }
            previous => {
                self.active_mapping = Some((key, StepCursor::default()));
                info!(key = %key, "Mapped sequence started");
                Ok(MappedToggle::Started { stopped: previous })
            }
        }
    }

    /// Stops the active mapped sequence. Returns its key.
    pub fn stop_mapped(&mut self) -> Option<SequenceKey> {
        self.active_mapping.take().map(|(key, _)| key)
    }

    pub fn active_mapped_key(&self) -> Option<SequenceKey> {
        self.active_mapping.as_ref().map(|(key, _)| *key)
    }

    /// Advances the mapped sequence for `key`, if it is the active one.
    pub fn mapped_tick(&mut self, key: SequenceKey) -> Option<Tick> {
        let (active, cursor) = self.active_mapping.as_mut()?;
        if *active != key {
            return None;
        }
        let pattern = self.mappings.get(&key)?;
        let step = cursor.advance();
        Some(Tick {
            step,
            tracks: pattern.active_tracks(step),
        })
    }

    /// Serializes the live pattern and tempo as `{"pattern": [[bool]], "bpm": n}`.
    pub fn to_json(&self) -> Result<String, SequencerError> {
        Ok(serde_json::to_string_pretty(&PatternDump {
            pattern: self.pattern.rows(),
            bpm: self.bpm,
        })?)
    }

    /// Loads a pattern dump. Rows beyond the kit's tracks are dropped and missing rows
    /// are left empty.
    pub fn load_json(&mut self, json: &str) -> Result<(), SequencerError> {
        let dump: PatternDump = serde_json::from_str(json)?;
        let loaded = Pattern::from_rows(&dump.pattern)?;

        let mut pattern = Pattern::new(self.pattern.track_count());
        for track in 0..pattern.track_count().min(loaded.track_count()) {
            pattern.tracks[track] = loaded.tracks[track];
        }
        self.pattern = pattern;
        self.set_bpm(dump.bpm);
        Ok(())
    }

    /// File name for a dump of the current pattern.
    pub fn dump_file_name(&self) -> String {
        format!("pattern_{}bpm.json", self.bpm.round())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bpm_is_clamped() {
        assert_eq!(40.0, clamp_bpm(10.0));
        assert_eq!(240.0, clamp_bpm(1000.0));
        assert_eq!(120.0, clamp_bpm(f64::NAN));
        assert_eq!(Duration::from_millis(125), step_interval(120.0));

        let mut sequencer = Sequencer::new(6, 500.0);
        assert_eq!(240.0, sequencer.bpm());
        assert_eq!(90.0, sequencer.set_bpm(90.0));
    }

    #[test]
    fn test_ticks_walk_the_pattern_from_step_zero() {
        let mut sequencer = Sequencer::new(6, 120.0);
        sequencer.toggle_step(0, 0).expect("toggle");
        sequencer.toggle_step(1, 4).expect("toggle");
        sequencer.toggle_step(0, 15).expect("toggle");

        assert_eq!(None, sequencer.tick());
        assert!(sequencer.start(120.0));
        assert!(!sequencer.start(120.0));

        let ticks: Vec<Tick> = (0..17).filter_map(|_| sequencer.tick()).collect();
        let steps: Vec<usize> = ticks.iter().map(|t| t.step).collect();
        assert_eq!((0..16).chain(0..1).collect::<Vec<_>>(), steps);
        assert_eq!(vec![0], ticks[0].tracks);
        assert_eq!(vec![1], ticks[4].tracks);
        assert_eq!(vec![0], ticks[15].tracks);
        assert!(ticks[1].tracks.is_empty());
    }

    #[test]
    fn test_stop_rewinds() {
        let mut sequencer = Sequencer::new(3, 120.0);
        sequencer.start(120.0);
        sequencer.tick();
        sequencer.tick();
        assert_eq!(Some(1), sequencer.current_step());

        assert!(sequencer.stop());
        assert!(!sequencer.stop());
        assert_eq!(None, sequencer.current_step());
        sequencer.start(120.0);
        assert_eq!(Some(0), sequencer.tick().map(|t| t.step));
    }

    #[test]
    fn test_toggle_bounds() {
        let mut sequencer = Sequencer::new(3, 120.0);
        assert!(matches!(
            sequencer.toggle_step(3, 0),
            Err(SequencerError::TrackOutOfRange(3))
        ));
        assert!(matches!(
            sequencer.toggle_step(0, 16),
            Err(SequencerError::StepOutOfRange(16))
        ));
        assert!(sequencer.toggle_step(2, 15).expect("toggle"));
        assert!(!sequencer.toggle_step(2, 15).expect("toggle"));
    }

    #[test]
    fn test_mapping_is_a_snapshot() {
        let mut sequencer = Sequencer::new(6, 120.0);
        sequencer.toggle_step(0, 0).expect("toggle");
        sequencer.map_current_pattern_to(SequenceKey::H);

        sequencer.toggle_step(0, 0).expect("toggle");
        sequencer.toggle_step(1, 1).expect("toggle");
        let mapped = sequencer.mapped_pattern(SequenceKey::H).expect("mapped");
        assert!(mapped.is_on(0, 0));
        assert!(!mapped.is_on(1, 1));

        sequencer.clear();
        assert!(sequencer.pattern().active_tracks(1).is_empty());
        assert!(sequencer
            .mapped_pattern(SequenceKey::H)
            .expect("mapped")
            .is_on(0, 0));
    }

    #[test]
    fn test_one_mapped_sequence_at_a_time() {
        let mut sequencer = Sequencer::new(6, 120.0);
        assert!(matches!(
            sequencer.toggle_mapped(SequenceKey::J),
            Err(SequencerError::NotMapped(SequenceKey::J))
        ));

        sequencer.map_current_pattern_to(SequenceKey::H);
        sequencer.map_current_pattern_to(SequenceKey::J);

        assert_eq!(
            MappedToggle::Started { stopped: None },
            sequencer.toggle_mapped(SequenceKey::H).expect("toggle")
        );
        assert_eq!(
            MappedToggle::Started {
                stopped: Some(SequenceKey::H)
            },
            sequencer.toggle_mapped(SequenceKey::J).expect("toggle")
        );
        assert_eq!(None, sequencer.mapped_tick(SequenceKey::H));
        assert_eq!(
            MappedToggle::Stopped,
            sequencer.toggle_mapped(SequenceKey::J).expect("toggle")
        );
        assert_eq!(None, sequencer.active_mapped_key());
    }

    #[test]
    fn test_mapped_tick_has_its_own_cursor() {
        let mut sequencer = Sequencer::new(6, 120.0);
        sequencer.toggle_step(2, 1).expect("toggle");
        sequencer.map_current_pattern_to(SequenceKey::K);
        sequencer.start(120.0);
        sequencer.tick();
        sequencer.tick();
        sequencer.tick();

        sequencer.toggle_mapped(SequenceKey::K).expect("toggle");
        assert_eq!(
            Some(Tick {
                step: 0,
                tracks: vec![]
            }),
            sequencer.mapped_tick(SequenceKey::K)
        );
        assert_eq!(
            Some(Tick {
                step: 1,
                tracks: vec![2]
            }),
            sequencer.mapped_tick(SequenceKey::K)
        );
        assert_eq!(Some(2), sequencer.current_step());
    }

    #[test]
    fn test_clear_mapping_stops_active_sequence() {
        let mut sequencer = Sequencer::new(6, 120.0);
        sequencer.map_current_pattern_to(SequenceKey::H);
        sequencer.toggle_mapped(SequenceKey::H).expect("toggle");

        sequencer.clear_mapping(SequenceKey::H).expect("clear");
        assert_eq!(None, sequencer.active_mapped_key());
        assert!(!sequencer.is_mapped(SequenceKey::H));
        assert!(sequencer.clear_mapping(SequenceKey::H).is_err());
    }

    #[test]
    fn test_json_dump() {
        let mut sequencer = Sequencer::new(3, 128.0);
        sequencer.toggle_step(1, 2).expect("toggle");
        assert_eq!("pattern_128bpm.json", sequencer.dump_file_name());

        let json = sequencer.to_json().expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(128.0, value["bpm"].as_f64().expect("bpm"));
        assert_eq!(3, value["pattern"].as_array().expect("pattern").len());
        assert_eq!(Some(true), value["pattern"][1][2].as_bool());

        let mut other = Sequencer::new(3, 120.0);
        other.load_json(&json).expect("load");
        assert_eq!(sequencer.pattern(), other.pattern());
        assert_eq!(128.0, other.bpm());
    }

    #[test]
    fn test_load_rejects_bad_rows() {
        let mut sequencer = Sequencer::new(3, 120.0);
        assert!(matches!(
            sequencer.load_json(r#"{"pattern": [[true]], "bpm": 100}"#),
            Err(SequencerError::InvalidPattern(_))
        ));
        assert!(matches!(
            sequencer.load_json("not json"),
            Err(SequencerError::Json(_))
        ));
    }
}
