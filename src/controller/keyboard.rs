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
use std::time::{Duration, Instant};

use crossterm::event::{self, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{debug, info, span, Level};

use super::{Command, Event};
use crate::input::{Key, Modifiers};

/// How often the driver checks whether the controller has gone away.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Without release reports, a key counts as released once no press or repeat has
/// arrived for this long. Longer than the usual delay before auto-repeat starts.
pub const RELEASE_TIMEOUT: Duration = Duration::from_millis(600);

/// A controller that plays the engine from the terminal keyboard. The terminal must
/// already be in raw mode.
pub struct Driver {
    /// Whether the terminal reports key releases.
    reports_releases: bool,
}

impl Driver {
    pub fn new(reports_releases: bool) -> Driver {
        Driver { reports_releases }
    }
}

/// Turns terminal events into controller events.
///
/// Terminals that cannot report releases send a held key as a stream of presses. The
/// translator then keeps the last key held until a different key arrives or the stream
/// goes quiet for [`RELEASE_TIMEOUT`], so a held key fires once.
#[derive(Debug)]
struct Translator {
    reports_releases: bool,
    /// The key assumed held, and when it was last seen.
    pending: Option<(Key, Instant)>,
}

impl Translator {
    fn new(reports_releases: bool) -> Translator {
        Translator {
            reports_releases,
            pending: None,
        }
    }

    fn translate(&mut self, event: event::Event, now: Instant) -> Vec<Event> {
        match event {
            event::Event::Key(key) => self.translate_key(key, now),
            event::Event::FocusLost => {
                self.pending = None;
                vec![Event::FocusLost]
            }
            _ => vec![],
        }
    }

    /// Releases the pending key once it has gone quiet.
    fn expire(&mut self, now: Instant) -> Vec<Event> {
        match self.pending {
            Some((key, seen)) if now.saturating_duration_since(seen) >= RELEASE_TIMEOUT => {
                self.pending = None;
                vec![Event::KeyUp(key)]
            }
            _ => vec![],
        }
    }

    fn translate_key(&mut self, key: KeyEvent, now: Instant) -> Vec<Event> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return vec![Event::Command(Command::Quit)];
        }

        if let Some(command) = command(key.code) {
            return match key.kind {
                KeyEventKind::Press => {
                    let mut events = self.release_pending();
                    events.push(Event::Command(command));
                    events
                }
                _ => vec![],
            };
        }
        let KeyCode::Char(c) = key.code else {
            return vec![];
        };
        let performance_key = Key::from_char(c);

        match key.kind {
            KeyEventKind::Release => vec![Event::KeyUp(performance_key)],
            KeyEventKind::Press | KeyEventKind::Repeat => {
                let modifiers = Modifiers {
                    shift: key.modifiers.contains(KeyModifiers::SHIFT)
                        || (key.modifiers.is_empty() && matches!(c, 'H' | 'J' | 'K')),
                    ctrl: key.modifiers.contains(KeyModifiers::CONTROL),
                    alt: key.modifiers.contains(KeyModifiers::ALT),
                };
                if self.reports_releases {
                    return vec![Event::KeyDown(performance_key, modifiers)];
                }

                let mut events = match self.pending {
                    Some((held, _)) if held == performance_key => vec![],
                    _ => self.release_pending(),
                };
                self.pending = Some((performance_key, now));
                events.push(Event::KeyDown(performance_key, modifiers));
                events
            }
        }
    }

    fn release_pending(&mut self) -> Vec<Event> {
        match self.pending.take() {
            Some((key, _)) => vec![Event::KeyUp(key)],
            None => vec![],
        }
    }
}

fn command(code: KeyCode) -> Option<Command> {
    match code {
        KeyCode::Esc => Some(Command::Quit),
        KeyCode::Enter => Some(Command::ToggleSequencer),
        KeyCode::Up => Some(Command::BpmUp),
        KeyCode::Down => Some(Command::BpmDown),
        KeyCode::Backspace => Some(Command::ClearPattern),
        KeyCode::Char('p') | KeyCode::Char('P') => Some(Command::ReplayLast),
        KeyCode::Char('r') | KeyCode::Char('R') => Some(Command::ToggleRecording),
        KeyCode::Char('e') | KeyCode::Char('E') => Some(Command::ExportRecording),
        KeyCode::Char('s') | KeyCode::Char('S') => Some(Command::DumpPattern),
        _ => None,
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        let reports_releases = self.reports_releases;
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!(reports_releases, "Keyboard driver started.");

            let mut translator = Translator::new(reports_releases);
            while !events_tx.is_closed() {
                let mut events = if event::poll(POLL_INTERVAL)? {
                    translator.translate(event::read()?, Instant::now())
                } else {
                    vec![]
                };
                events.extend(translator.expire(Instant::now()));

                for event in events {
                    debug!(event = ?event, "Keyboard event");
                    let quit = event == Event::Command(Command::Quit);
                    if events_tx.blocking_send(event).is_err() || quit {
                        return Ok(());
                    }
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use crossterm::event::{
        Event as TerminalEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers,
    };

    use crate::controller::{Command, Event};
    use crate::input::{Action, InputRouter, Key, Modifiers};

    use super::{Translator, RELEASE_TIMEOUT};

    fn key(code: KeyCode, modifiers: KeyModifiers, kind: KeyEventKind) -> TerminalEvent {
        TerminalEvent::Key(KeyEvent::new_with_kind(code, modifiers, kind))
    }

    fn press(code: KeyCode) -> TerminalEvent {
        key(code, KeyModifiers::NONE, KeyEventKind::Press)
    }

    /// Feeds events through the router the way the controller does.
    fn route(router: &mut InputRouter, events: Vec<Event>) -> Vec<Action> {
        let mut actions = Vec::new();
        for event in events {
            match event {
                Event::KeyDown(key, modifiers) => actions.extend(router.key_down(key, modifiers)),
                Event::KeyUp(key) => router.key_up(key),
                Event::FocusLost => router.release_all(),
                Event::Command(_) => {}
            }
        }
        actions
    }

    #[test]
    fn test_press_and_release() {
        let mut translator = Translator::new(true);
        let now = Instant::now();
        let one = Key::Char('1');
        assert_eq!(
            vec![Event::KeyDown(one, Modifiers::NONE)],
            translator.translate(press(KeyCode::Char('1')), now)
        );
        assert_eq!(
            vec![Event::KeyUp(one)],
            translator.translate(
                key(KeyCode::Char('1'), KeyModifiers::NONE, KeyEventKind::Release),
                now
            )
        );
        assert_eq!(
            vec![Event::KeyDown(Key::Space, Modifiers::NONE)],
            translator.translate(
                key(KeyCode::Char(' '), KeyModifiers::NONE, KeyEventKind::Repeat),
                now
            )
        );
        assert!(translator.expire(now + RELEASE_TIMEOUT * 2).is_empty());
    }

    #[test]
    fn test_repeated_presses_fire_once_without_releases() {
        let mut translator = Translator::new(false);
        let mut router = InputRouter::new(false);
        let start = Instant::now();

        let mut actions = Vec::new();
        for i in 0..5 {
            let now = start + Duration::from_millis(30 * i);
            actions.extend(route(
                &mut router,
                translator.translate(press(KeyCode::Char('1')), now),
            ));
            actions.extend(route(&mut router, translator.expire(now)));
        }
        assert_eq!(vec![Action::TriggerSlice(1)], actions);

        // Once the repeats stop the key is released and plays again.
        let later = start + Duration::from_millis(120) + RELEASE_TIMEOUT;
        assert_eq!(
            vec![Event::KeyUp(Key::Char('1'))],
            translator.expire(later)
        );
        router.key_up(Key::Char('1'));
        assert_eq!(
            vec![Action::TriggerSlice(1)],
            route(&mut router, translator.translate(press(KeyCode::Char('1')), later))
        );
    }

    #[test]
    fn test_another_key_releases_the_held_one() {
        let mut translator = Translator::new(false);
        let now = Instant::now();
        translator.translate(press(KeyCode::Char('d')), now);
        assert_eq!(
            vec![
                Event::KeyUp(Key::Char('d')),
                Event::KeyDown(Key::Char('f'), Modifiers::NONE)
            ],
            translator.translate(press(KeyCode::Char('f')), now)
        );
        assert_eq!(
            vec![Event::KeyUp(Key::Char('f')), Event::Command(Command::ToggleSequencer)],
            translator.translate(press(KeyCode::Enter), now)
        );
    }

    #[test]
    fn test_shift_detection() {
        let mut translator = Translator::new(true);
        let now = Instant::now();
        assert_eq!(
            vec![Event::KeyDown(Key::Char('j'), Modifiers::SHIFT)],
            translator.translate(
                key(KeyCode::Char('J'), KeyModifiers::SHIFT, KeyEventKind::Press),
                now
            )
        );
        // Terminals that drop the modifier still map with uppercase H, J and K.
        assert_eq!(
            vec![Event::KeyDown(Key::Char('h'), Modifiers::SHIFT)],
            translator.translate(press(KeyCode::Char('H')), now)
        );
        // Other uppercase letters, e.g. with Caps Lock, are plain presses.
        assert_eq!(
            vec![Event::KeyDown(Key::Char('d'), Modifiers::NONE)],
            translator.translate(press(KeyCode::Char('D')), now)
        );
    }

    #[test]
    fn test_commands() {
        let mut translator = Translator::new(true);
        let now = Instant::now();
        assert_eq!(
            vec![Event::Command(Command::Quit)],
            translator.translate(press(KeyCode::Esc), now)
        );
        assert_eq!(
            vec![Event::Command(Command::Quit)],
            translator.translate(
                key(KeyCode::Char('c'), KeyModifiers::CONTROL, KeyEventKind::Press),
                now
            )
        );
        assert_eq!(
            vec![Event::Command(Command::ToggleRecording)],
            translator.translate(press(KeyCode::Char('r')), now)
        );
        // Commands fire on press only.
        assert!(translator
            .translate(
                key(KeyCode::Char('r'), KeyModifiers::NONE, KeyEventKind::Release),
                now
            )
            .is_empty());
        assert!(translator.translate(press(KeyCode::Tab), now).is_empty());
    }

    #[test]
    fn test_focus_lost_forgets_the_held_key() {
        let mut translator = Translator::new(false);
        let now = Instant::now();
        translator.translate(press(KeyCode::Char('l')), now);
        assert_eq!(
            vec![Event::FocusLost],
            translator.translate(TerminalEvent::FocusLost, now)
        );
        assert!(translator.expire(now + RELEASE_TIMEOUT).is_empty());
    }
}
