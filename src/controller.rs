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
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, Sender};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, span, warn, Instrument, Level};

use crate::engine::PerformanceEngine;
use crate::input::{InputRouter, Key, Modifiers};
use crate::scheduler::SystemClock;

pub mod keyboard;

/// How far one tempo nudge moves the sequencer.
const BPM_STEP: f64 = 5.0;

/// How long the controller waits for input when no timer is pending.
const IDLE_POLL: Duration = Duration::from_millis(20);

/// Controller events that will trigger behavior in the engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Event {
    /// A key was pressed, or the platform repeated a held key.
    KeyDown(Key, Modifiers),

    /// A key was released.
    KeyUp(Key),

    /// The input surface lost focus. Every held key counts as released.
    FocusLost,

    /// A command that sits outside the performance key map.
    Command(Command),
}

/// Session commands handled by the controller itself.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// Starts or stops the live sequencer.
    ToggleSequencer,

    /// Nudges the tempo up.
    BpmUp,

    /// Nudges the tempo down.
    BpmDown,

    /// Plays the last triggered slice again.
    ReplayLast,

    /// Clears every step of the live pattern.
    ClearPattern,

    /// Starts capturing the master bus, or stops and keeps the take.
    ToggleRecording,

    /// Writes the last take to the export directory.
    ExportRecording,

    /// Writes the live pattern as JSON to the export directory.
    DumpPattern,

    /// Stops the engine and ends the session.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Drives a performance engine from a driver's events and the engine's timers.
pub struct Controller {
    handle: JoinHandle<PerformanceEngine>,
}

impl Controller {
    /// Creates a new controller with the given driver. Exports land in `export_dir`.
    pub fn new(
        engine: PerformanceEngine,
        clock: Arc<SystemClock>,
        driver: Arc<dyn Driver>,
        export_dir: PathBuf,
    ) -> Controller {
        let session = Session {
            engine,
            router: InputRouter::new(false),
            clock,
            export_dir,
        };
        Controller {
            handle: tokio::spawn(
                session
                    .run(driver)
                    .instrument(span!(Level::INFO, "controller")),
            ),
        }
    }

    /// Join will block until the controller finishes, handing the engine back.
    pub async fn join(self) -> Result<PerformanceEngine, JoinError> {
        self.handle.await
    }
}

struct Session {
    engine: PerformanceEngine,
    router: InputRouter,
    clock: Arc<SystemClock>,
    export_dir: PathBuf,
}

impl Session {
    async fn run(mut self, driver: Arc<dyn Driver>) -> PerformanceEngine {
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let join_handle = driver.monitor_events(events_tx);

        info!(
            slices = self.engine.slices().len(),
            bpm = self.engine.sequencer().bpm(),
            "Controller started."
        );

        loop {
            self.engine.poll();
            let wake = match self.engine.next_deadline() {
                Some(deadline) => Instant::from_std(self.clock.instant_at(deadline)),
                None => Instant::now() + IDLE_POLL,
            };

            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else {
                        info!("Event source closed.");
                        break;
                    };
                    if !self.handle_event(event) {
                        break;
                    }
                }
                _ = sleep_until(wake) => {}
            }
        }

        info!("Controller closing.");
        self.engine.shutdown();
        drop(events_rx);
        if let Err(e) = join_handle.await {
            error!("Error waiting for event monitor to stop: {}", e);
        }
        self.engine
    }

    /// Handles one event. Returns false when the session should end.
    fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::KeyDown(key, modifiers) => {
                if let Some(action) = self.router.key_down(key, modifiers) {
                    if let Err(e) = self.engine.dispatch(action) {
                        warn!(action = ?action, err = %e, "Action failed");
                    }
                }
            }
            Event::KeyUp(key) => self.router.key_up(key),
            Event::FocusLost => self.router.release_all(),
            Event::Command(Command::Quit) => return false,
            Event::Command(command) => self.handle_command(command),
        }
        true
    }

    fn handle_command(&mut self, command: Command) {
        info!(command = ?command, "Received command.");
        match command {
            Command::ToggleSequencer => self.engine.toggle_sequencer(),
            Command::BpmUp => {
                let bpm = self.engine.set_bpm(self.engine.sequencer().bpm() + BPM_STEP);
                info!(bpm, "Tempo changed");
            }
            Command::BpmDown => {
                let bpm = self.engine.set_bpm(self.engine.sequencer().bpm() - BPM_STEP);
                info!(bpm, "Tempo changed");
            }
            Command::ReplayLast => {
                if let Err(e) = self.engine.replay_last_slice() {
                    warn!(err = %e, "Nothing to replay");
                }
            }
            Command::ClearPattern => self.engine.clear_pattern(),
            Command::ToggleRecording => {
                if self.engine.snapshot().recording {
                    match self.engine.stop_recording() {
                        Ok(duration) => info!(duration = ?duration, "Recording stopped"),
                        Err(e) => warn!(err = %e, "Failed to stop recording"),
                    }
                } else if let Err(e) = self.engine.start_recording() {
                    warn!(err = %e, "Failed to start recording");
                }
            }
            Command::ExportRecording => match self.engine.export_recording() {
                Ok(export) => self.write(export),
                Err(e) => warn!(err = %e, "Export failed"),
            },
            Command::DumpPattern => match self.engine.pattern_dump() {
                Ok(export) => self.write(export),
                Err(e) => warn!(err = %e, "Pattern dump failed"),
            },
            Command::Quit => {}
        }
    }

    fn write(&self, export: crate::export::Export) {
        match export.write_to(&self.export_dir) {
            Ok(path) => info!(path = %path.display(), "Wrote export"),
            Err(e) => error!(err = %e, "Failed to write export"),
        }
    }
}

#[cfg(test)]
mod test {
    use std::{io, sync::Arc};

    use tokio::{sync::mpsc::Sender, task::JoinHandle};

    use crate::{
        audio::AudioMixer,
        engine::{EngineOptions, PerformanceEngine},
        input::{Key, Modifiers},
        scheduler::SystemClock,
        slices::SliceRegion,
        testutil::stepped_asset,
    };

    use super::{Command, Controller, Driver, Event};

    /// Replays a fixed list of events, then closes.
    struct ScriptedDriver {
        events: Vec<Event>,
    }

    impl Driver for ScriptedDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let events = self.events.clone();
            tokio::task::spawn_blocking(move || {
                for event in events {
                    if events_tx.blocking_send(event).is_err() {
                        break;
                    }
                }
                Ok(())
            })
        }
    }

    fn run(events: Vec<Event>, export_dir: &std::path::Path) -> Controller {
        let clock = Arc::new(SystemClock::new());
        let mut engine = PerformanceEngine::new(
            AudioMixer::new(1, 1000),
            clock.clone(),
            EngineOptions::default(),
        );
        engine.load_asset(stepped_asset(1000, 4));
        engine
            .create_slice(SliceRegion::new(0.0, 1.0).expect("region"))
            .expect("slice");
        Controller::new(
            engine,
            clock,
            Arc::new(ScriptedDriver { events }),
            export_dir.to_path_buf(),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_key_events_reach_engine() {
        let dir = tempfile::tempdir().expect("tempdir");
        let controller = run(
            vec![
                Event::KeyDown(Key::Char('1'), Modifiers::NONE),
                Event::KeyDown(Key::Char('1'), Modifiers::NONE),
                Event::Command(Command::ToggleSequencer),
                Event::Command(Command::BpmUp),
                Event::Command(Command::Quit),
            ],
            dir.path(),
        );

        let mut engine = controller.join().await.expect("join");
        let snapshot = engine.snapshot();
        assert_eq!(Some(1), snapshot.last_played_slice);
        assert_eq!(125.0, snapshot.bpm);
        // Shutdown stops everything on the way out.
        assert!(!snapshot.sequencer_running);
        assert_eq!(0, snapshot.active_voices);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_closed_driver_ends_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let controller = run(vec![Event::FocusLost], dir.path());
        let mut engine = controller.join().await.expect("join");
        assert_eq!(None, engine.snapshot().last_played_slice);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pattern_dump_is_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let controller = run(
            vec![
                Event::Command(Command::DumpPattern),
                Event::Command(Command::Quit),
            ],
            dir.path(),
        );
        controller.join().await.expect("join");

        let written: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .collect();
        assert_eq!(1, written.len());
    }
}
