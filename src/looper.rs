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
use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

/// Silence added after the last recorded trigger before the loop restarts.
pub const LOOP_TAIL: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LoopError {
    #[error("nothing was recorded")]
    EmptyRecording,
}

/// The loop control's position in its Idle, Recording, Playing cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Recording,
    Playing,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            LoopState::Idle => "idle",
            LoopState::Recording => "recording",
            LoopState::Playing => "playing",
        };
        write!(f, "{}", state)
    }
}

/// A slice trigger captured while recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopEvent {
    pub slice: u8,
    /// Time since recording started.
    pub offset: Duration,
}

/// A finished recording: its events and the length of one cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopRecording {
    pub events: Vec<LoopEvent>,
    pub duration: Duration,
}

impl LoopRecording {
    fn new(events: Vec<LoopEvent>) -> Result<LoopRecording, LoopError> {
        let last = events.last().ok_or(LoopError::EmptyRecording)?;
        let duration = last.offset + LOOP_TAIL;
        Ok(LoopRecording { events, duration })
    }
}

/// What a press of the loop control did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopTransition {
    RecordingStarted,
    /// Playback begins; the caller schedules the first cycle.
    PlaybackStarted(LoopRecording),
    Stopped,
}

#[derive(Debug)]
enum Inner {
    Idle,
    Recording {
        started_at: Duration,
        events: Vec<LoopEvent>,
    },
    Playing {
        recording: LoopRecording,
    },
}

/// The loop recorder and player state machine. Timing is the caller's: it passes the
/// current time in and schedules the replays itself.
#[derive(Debug)]
pub struct Looper {
    inner: Inner,
}

impl Default for Looper {
    fn default() -> Self {
        Looper { inner: Inner::Idle }
    }
}

impl Looper {
    pub fn new() -> Looper {
        Looper::default()
    }

    pub fn state(&self) -> LoopState {
        match self.inner {
            Inner::Idle => LoopState::Idle,
            Inner::Recording { .. } => LoopState::Recording,
            Inner::Playing { .. } => LoopState::Playing,
        }
    }

    /// Advances the state machine one step. Stopping a recording with no events fails
    /// and leaves the looper idle.
    pub fn step(&mut self, now: Duration) -> Result<LoopTransition, LoopError> {
        match std::mem::replace(&mut self.inner, Inner::Idle) {
            Inner::Idle => {
                self.inner = Inner::Recording {
                    started_at: now,
                    events: Vec::new(),
                };
                info!("Loop recording started");
                Ok(LoopTransition::RecordingStarted)
            }
            Inner::Recording { events, .. } => match LoopRecording::new(events) {
                Ok(recording) => {
                    info!(
                        events = recording.events.len(),
                        duration = ?recording.duration,
                        "Loop playback started"
                    );
                    self.inner = Inner::Playing {
                        recording: recording.clone(),
                    };
                    Ok(LoopTransition::PlaybackStarted(recording))
                }
                Err(e) => {
                    warn!("Loop recording was empty");
                    Err(e)
                }
            },
            Inner::Playing { .. } => {
                info!("Loop playback stopped");
                Ok(LoopTransition::Stopped)
            }
        }
    }

    /// Records a slice trigger if recording. Returns true if it was captured.
    pub fn record_trigger(&mut self, slice: u8, now: Duration) -> bool {
        match &mut self.inner {
            Inner::Recording { started_at, events } => {
                events.push(LoopEvent {
                    slice,
                    offset: now.saturating_sub(*started_at),
                });
                true
            }
            _ => false,
        }
    }

    /// Returns to idle from any state, discarding the buffer. Returns the previous state.
    pub fn stop(&mut self) -> LoopState {
        let previous = self.state();
        self.inner = Inner::Idle;
        previous
    }

    /// The recording being played.
    pub fn recording(&self) -> Option<&LoopRecording> {
        match &self.inner {
            Inner::Playing { recording } => Some(recording),
            _ => None,
        }
    }

    /// Number of triggers captured so far while recording.
    pub fn recorded_events(&self) -> usize {
        match &self.inner {
            Inner::Recording { events, .. } => events.len(),
            Inner::Playing { recording } => recording.events.len(),
            Inner::Idle => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_full_cycle() {
        let mut looper = Looper::new();
        assert_eq!(LoopState::Idle, looper.state());
        assert!(!looper.record_trigger(1, ms(0)));

        assert_eq!(Ok(LoopTransition::RecordingStarted), looper.step(ms(1000)));
        assert!(looper.record_trigger(1, ms(1000)));
        assert!(looper.record_trigger(2, ms(1300)));
        assert_eq!(2, looper.recorded_events());

        let expected = LoopRecording {
            events: vec![
                LoopEvent {
                    slice: 1,
                    offset: ms(0),
                },
                LoopEvent {
                    slice: 2,
                    offset: ms(300),
                },
            ],
            duration: ms(800),
        };
        assert_eq!(
            Ok(LoopTransition::PlaybackStarted(expected.clone())),
            looper.step(ms(2000))
        );
        assert_eq!(Some(&expected), looper.recording());
        assert!(!looper.record_trigger(3, ms(2100)));

        assert_eq!(Ok(LoopTransition::Stopped), looper.step(ms(3000)));
        assert_eq!(LoopState::Idle, looper.state());
        assert_eq!(None, looper.recording());
    }

    #[test]
    fn test_empty_recording_returns_to_idle() {
        let mut looper = Looper::new();
        looper.step(ms(0)).expect("record");
        assert_eq!(Err(LoopError::EmptyRecording), looper.step(ms(500)));
        assert_eq!(LoopState::Idle, looper.state());
    }

    #[test]
    fn test_rerecording_starts_fresh() {
        let mut looper = Looper::new();
        looper.step(ms(0)).expect("record");
        looper.record_trigger(4, ms(100));
        looper.step(ms(200)).expect("play");
        looper.step(ms(300)).expect("stop");

        looper.step(ms(400)).expect("record");
        assert_eq!(0, looper.recorded_events());
        looper.record_trigger(5, ms(450));
        match looper.step(ms(600)).expect("play") {
            LoopTransition::PlaybackStarted(recording) => {
                assert_eq!(
                    vec![LoopEvent {
                        slice: 5,
                        offset: ms(50)
                    }],
                    recording.events
                );
                assert_eq!(ms(550), recording.duration);
            }
            other => panic!("unexpected transition {:?}", other),
        }
    }

    #[test]
    fn test_stop_from_any_state() {
        let mut looper = Looper::new();
        assert_eq!(LoopState::Idle, looper.stop());
        looper.step(ms(0)).expect("record");
        looper.record_trigger(1, ms(10));
        assert_eq!(LoopState::Recording, looper.stop());
        assert_eq!(0, looper.recorded_events());
    }
}
