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
use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::sequencer::SequenceKey;

/// Drum pad keys, in track order.
pub const DRUM_KEYS: [char; 3] = ['d', 'f', 'g'];

/// A key as the router sees it. Letters are folded to lowercase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Space,
}

impl Key {
    /// Builds a key from a typed character, folding case.
    pub fn from_char(c: char) -> Key {
        if c == ' ' {
            Key::Space
        } else {
            Key::Char(c.to_ascii_lowercase())
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{}", c.to_ascii_uppercase()),
            Key::Space => write!(f, "Space"),
        }
    }
}

/// Modifier keys held with a key press.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: false,
    };

    pub const SHIFT: Modifiers = Modifiers {
        shift: true,
        ctrl: false,
        alt: false,
    };
}

/// What an input asks the engine to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    TriggerSlice(u8),
    TriggerDrum(usize),
    /// Start or stop the sequence mapped to a key.
    ToggleMappedSequence(SequenceKey),
    /// Snapshot the live pattern onto a key.
    MapPattern(SequenceKey),
    /// Advance the loop recorder: record, play, stop.
    LoopStep,
    /// Stop every voice, the sequencer, mapped sequences and the looper at once.
    GlobalStop,
}

/// How a pointer reached an on-screen key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerKind {
    TouchStart,
    Click,
}

/// Maps a key to its action, without repeat handling.
pub fn resolve(key: Key, modifiers: Modifiers) -> Option<Action> {
    // Ctrl and Alt chords belong to the host (and Alt+wheel zoom to the waveform view).
    if modifiers.ctrl || modifiers.alt {
        return None;
    }
    match key {
        Key::Space => Some(Action::GlobalStop),
        Key::Char(c) => {
            if let Some(slice) = c.to_digit(10).filter(|d| (1..=9).contains(d)) {
                return Some(Action::TriggerSlice(slice as u8));
            }
            if let Some(track) = DRUM_KEYS.iter().position(|k| *k == c) {
                return Some(Action::TriggerDrum(track));
            }
            if let Some(sequence) = SequenceKey::from_char(c) {
                return Some(if modifiers.shift {
                    Action::MapPattern(sequence)
                } else {
                    Action::ToggleMappedSequence(sequence)
                });
            }
            if c == 'l' {
                return Some(Action::LoopStep);
            }
            None
        }
    }
}

/// Turns raw key and pointer events into actions. A held key fires once per physical
/// press no matter how many repeats the platform sends.
#[derive(Debug, Default)]
pub struct InputRouter {
    held: HashSet<Key>,
    touch_capable: bool,
}

impl InputRouter {
    pub fn new(touch_capable: bool) -> InputRouter {
        InputRouter {
            held: HashSet::new(),
            touch_capable,
        }
    }

    /// Handles a key press or repeat.
    pub fn key_down(&mut self, key: Key, modifiers: Modifiers) -> Option<Action> {
        let action = resolve(key, modifiers)?;
        if !self.held.insert(key) {
            return None;
        }
        debug!(key = %key, action = ?action, "Key pressed");
        Some(action)
    }

    /// Handles a key release.
    pub fn key_up(&mut self, key: Key) {
        self.held.remove(&key);
    }

    /// Forgets every held key, e.g. when focus is lost.
    pub fn release_all(&mut self) {
        self.held.clear();
    }

    pub fn is_held(&self, key: Key) -> bool {
        self.held.contains(&key)
    }

    /// Handles a press on an on-screen key. Touch devices synthesize a click after each
    /// touch, so clicks are ignored there.
    pub fn pointer(&mut self, kind: PointerKind, key: Key) -> Option<Action> {
        if kind == PointerKind::Click && self.touch_capable {
            return None;
        }
        resolve(key, Modifiers::NONE)
    }
}
