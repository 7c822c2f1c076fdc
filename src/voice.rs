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

//! Voice bookkeeping for the performance engine.
//!
//! Handles slice exclusivity, drum polyphony and voice stealing. The audio itself lives on
//! the mixer; this side only tracks what is playing and hands back the cancel handles of
//! voices that must stop.

use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use crate::playsync::CancelHandle;

/// What a voice was triggered as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceKind {
    /// A slice played from a key, pad or touch.
    Slice { id: u8 },
    /// A drum pad hit.
    Drum { track: usize },
    /// A drum hit fired by the step sequencer.
    SequenceStep { track: usize },
    /// A slice replayed by the loop player.
    LoopEvent { slice: u8 },
    /// A full-length preview of a rendered asset.
    CleanPreview,
}

/// The owner class of a voice. Slice voices are exclusive, the rest are polyphonic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceClass {
    Slice,
    Drum,
    Preview,
}

/// How a new voice treats voices of the same class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetriggerBehavior {
    /// Stop every other voice of the class.
    Cut,
    /// Play alongside them.
    Polyphonic,
}

impl VoiceKind {
    pub fn class(&self) -> VoiceClass {
        match self {
            VoiceKind::Slice { .. } | VoiceKind::LoopEvent { .. } => VoiceClass::Slice,
            VoiceKind::Drum { .. } | VoiceKind::SequenceStep { .. } => VoiceClass::Drum,
            VoiceKind::CleanPreview => VoiceClass::Preview,
        }
    }

    pub fn retrigger(&self) -> RetriggerBehavior {
        match self.class() {
            VoiceClass::Slice => RetriggerBehavior::Cut,
            VoiceClass::Drum | VoiceClass::Preview => RetriggerBehavior::Polyphonic,
        }
    }

    /// The slice this voice plays, if it plays one.
    pub fn slice(&self) -> Option<u8> {
        match self {
            VoiceKind::Slice { id } => Some(*id),
            VoiceKind::LoopEvent { slice } => Some(*slice),
            _ => None,
        }
    }

    /// The drum track this voice plays, if it plays one.
    pub fn drum_track(&self) -> Option<usize> {
        match self {
            VoiceKind::Drum { track } | VoiceKind::SequenceStep { track } => Some(*track),
            _ => None,
        }
    }
}

impl fmt::Display for VoiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoiceKind::Slice { id } => write!(f, "slice {}", id),
            VoiceKind::Drum { track } => write!(f, "drum {}", track),
            VoiceKind::SequenceStep { track } => write!(f, "step drum {}", track),
            VoiceKind::LoopEvent { slice } => write!(f, "loop slice {}", slice),
            VoiceKind::CleanPreview => write!(f, "clean preview"),
        }
    }
}

/// What the caller gets back from a trigger.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoiceHandle {
    /// Same as the mixer source ID.
    pub id: u64,
    pub kind: VoiceKind,
    pub playback_rate: f64,
    /// How long the voice plays if nothing stops it. None for looping voices.
    pub scheduled_duration: Option<Duration>,
    /// Audio sample at which the voice becomes audible.
    pub start_at_sample: u64,
}

/// An active voice.
pub struct Voice {
    handle: VoiceHandle,
    cancel_handle: CancelHandle,
}

impl Voice {
    pub fn new(handle: VoiceHandle, cancel_handle: CancelHandle) -> Self {
        Self {
            handle,
            cancel_handle,
        }
    }

    pub fn id(&self) -> u64 {
        self.handle.id
    }

    pub fn kind(&self) -> VoiceKind {
        self.handle.kind
    }

    pub fn handle(&self) -> VoiceHandle {
        self.handle
    }

    /// Returns a clone of this voice's cancel handle.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel_handle.clone()
    }
}

/// Manages active voices.
pub struct VoiceManager {
    /// Active voices, oldest first.
    voices: Vec<Voice>,
    /// Global maximum voices limit.
    max_voices: usize,
}

impl VoiceManager {
    /// Creates a new voice manager.
    pub fn new(max_voices: usize) -> Self {
        Self {
            voices: Vec::new(),
            max_voices: max_voices.max(1),
        }
    }

    /// Adds a new voice. Returns the cancel handles of the voices it replaces, which the
    /// caller cuts at the new voice's start sample so nothing overlaps.
    pub fn add_voice(&mut self, voice: Voice) -> Vec<CancelHandle> {
        let mut voices_to_stop = Vec::new();
        let class = voice.kind().class();

        if voice.kind().retrigger() == RetriggerBehavior::Cut {
            for v in self.voices.iter().filter(|v| v.kind().class() == class) {
                debug!(voice = v.id(), kind = %v.kind(), "Cutting voice");
                voices_to_stop.push(v.cancel_handle());
            }
            self.voices.retain(|v| v.kind().class() != class);
        }

        // Steal the oldest voice once the global limit is reached.
        if self.voices.len() >= self.max_voices {
            let oldest = self.voices.remove(0);
            warn!(
                max_voices = self.max_voices,
                voice = oldest.id(),
                "Global voice limit reached, stealing oldest"
            );
            voices_to_stop.push(oldest.cancel_handle());
        }

        self.voices.push(voice);
        voices_to_stop
    }

    /// Forgets a voice that ended on its own.
    pub fn remove(&mut self, id: u64) -> Option<Voice> {
        let index = self.voices.iter().position(|v| v.id() == id)?;
        Some(self.voices.remove(index))
    }

    /// Stops a voice. Stopping a voice that already ended returns None.
    pub fn stop(&mut self, id: u64) -> Option<CancelHandle> {
        self.remove(id).map(|voice| voice.cancel_handle())
    }

    /// Stops every voice playing the given slice.
    pub fn stop_slice(&mut self, slice: u8) -> Vec<CancelHandle> {
        self.stop_matching(|kind| kind.slice() == Some(slice))
    }

    fn stop_matching<F: Fn(&VoiceKind) -> bool>(&mut self, matches: F) -> Vec<CancelHandle> {
        let handles = self
            .voices
            .iter()
            .filter(|v| matches(&v.kind()))
            .map(|v| v.cancel_handle())
            .collect();
        self.voices.retain(|v| !matches(&v.kind()));
        handles
    }

    /// Returns true if any voice of the class is active.
    pub fn has_class(&self, class: VoiceClass) -> bool {
        self.voices.iter().any(|v| v.kind().class() == class)
    }

    /// Active voices, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Voice> {
        self.voices.iter()
    }

    /// Returns the current number of active voices.
    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    /// Clears all voices.
    /// Returns the cancel handles for all voices that should be stopped.
    pub fn clear(&mut self) -> Vec<CancelHandle> {
        let handles: Vec<CancelHandle> = self.voices.iter().map(|v| v.cancel_handle()).collect();
        self.voices.clear();
        handles
    }
}

impl fmt::Debug for VoiceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceManager")
            .field("active_voices", &self.voices.len())
            .field("max_voices", &self.max_voices)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_voice(id: u64, kind: VoiceKind) -> Voice {
        Voice::new(
            VoiceHandle {
                id,
                kind,
                playback_rate: 1.0,
                scheduled_duration: Some(Duration::from_secs(1)),
                start_at_sample: 0,
            },
            CancelHandle::new(),
        )
    }

    #[test]
    fn test_kind_classes() {
        assert_eq!(VoiceClass::Slice, VoiceKind::LoopEvent { slice: 2 }.class());
        assert_eq!(VoiceClass::Drum, VoiceKind::SequenceStep { track: 0 }.class());
        assert_eq!(Some(2), VoiceKind::LoopEvent { slice: 2 }.slice());
        assert_eq!(Some(4), VoiceKind::Drum { track: 4 }.drum_track());
        assert_eq!(None, VoiceKind::CleanPreview.slice());
    }

    #[test]
    fn test_slice_voices_are_exclusive() {
        let mut manager = VoiceManager::new(32);

        let stopped = manager.add_voice(make_voice(1, VoiceKind::Slice { id: 1 }));
        assert!(stopped.is_empty());
        manager.add_voice(make_voice(2, VoiceKind::Drum { track: 0 }));

        // A loop event is a slice voice too.
        let stopped = manager.add_voice(make_voice(3, VoiceKind::LoopEvent { slice: 2 }));
        assert_eq!(1, stopped.len());
        assert_eq!(2, manager.active_count());
        assert!(manager.iter().all(|v| v.id() != 1));
    }

    #[test]
    fn test_drum_voices_are_polyphonic() {
        let mut manager = VoiceManager::new(32);
        for id in 1..=4 {
            let stopped = manager.add_voice(make_voice(id, VoiceKind::Drum { track: 0 }));
            assert!(stopped.is_empty());
        }
        manager.add_voice(make_voice(5, VoiceKind::SequenceStep { track: 0 }));
        assert_eq!(5, manager.active_count());
    }

    #[test]
    fn test_voice_manager_global_limit() {
        let mut manager = VoiceManager::new(3);

        for id in 1..=3 {
            let stopped = manager.add_voice(make_voice(id, VoiceKind::Drum { track: 1 }));
            assert!(stopped.is_empty());
        }

        // Add 4th voice - should steal oldest globally
        let stopped = manager.add_voice(make_voice(4, VoiceKind::CleanPreview));
        assert_eq!(1, stopped.len());
        assert_eq!(3, manager.active_count());
        assert_eq!(Some(2), manager.iter().next().map(|v| v.id()));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut manager = VoiceManager::new(32);
        manager.add_voice(make_voice(1, VoiceKind::Drum { track: 0 }));

        assert!(manager.stop(1).is_some());
        assert!(manager.stop(1).is_none());
        assert!(manager.remove(1).is_none());
    }

    #[test]
    fn test_stop_slice() {
        let mut manager = VoiceManager::new(32);
        manager.add_voice(make_voice(1, VoiceKind::Slice { id: 4 }));
        manager.add_voice(make_voice(2, VoiceKind::Drum { track: 0 }));
        manager.add_voice(make_voice(3, VoiceKind::CleanPreview));

        assert!(manager.stop_slice(5).is_empty());
        assert_eq!(1, manager.stop_slice(4).len());
        assert!(!manager.has_class(VoiceClass::Slice));

        assert_eq!(2, manager.clear().len());
        assert_eq!(0, manager.active_count());
    }
}
