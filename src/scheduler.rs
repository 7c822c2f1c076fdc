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
// Wall-clock timers for the sequencer and the loop player. The control loop polls the
// queue; nothing here spawns threads or tasks.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic clock measured from an arbitrary epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// The real monotonic clock.
#[derive(Clone, Debug)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock {
            epoch: Instant::now(),
        }
    }

    /// Converts a clock reading back to an instant, for sleeping until a deadline.
    pub fn instant_at(&self, at: Duration) -> Instant {
        self.epoch + at
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> ManualClock {
        ManualClock::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::AcqRel);
    }

    pub fn set(&self, to: Duration) {
        self.nanos.store(to.as_nanos() as u64, Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}

/// Deadline-ordered timers. Timers with the same deadline fire in the order they were
/// scheduled.
#[derive(Debug)]
pub struct TimerQueue<A> {
    timers: BTreeMap<(Duration, u64), A>,
    next_seq: u64,
}

impl<A> Default for TimerQueue<A> {
    fn default() -> Self {
        TimerQueue {
            timers: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl<A> TimerQueue<A> {
    pub fn new() -> TimerQueue<A> {
        TimerQueue::default()
    }

    pub fn schedule(&mut self, at: Duration, action: A) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.insert((at, seq), action);
    }

    /// Cancels every timer whose action matches.
    pub fn cancel_where<F: Fn(&A) -> bool>(&mut self, matches: F) -> usize {
        let doomed: Vec<(Duration, u64)> = self
            .timers
            .iter()
            .filter(|(_, action)| matches(action))
            .map(|(key, _)| *key)
            .collect();
        for key in doomed.iter() {
            self.timers.remove(key);
        }
        doomed.len()
    }

    /// Removes and returns the earliest timer due at `now`, with its deadline.
    pub fn pop_due(&mut self, now: Duration) -> Option<(Duration, A)> {
        let (&(at, seq), _) = self.timers.first_key_value()?;
        if at > now {
            return None;
        }
        self.timers.remove(&(at, seq)).map(|action| (at, action))
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.keys().next().map(|(at, _)| *at)
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_pops_in_deadline_then_schedule_order() {
        let mut queue = TimerQueue::new();
        queue.schedule(ms(20), "late");
        queue.schedule(ms(10), "first");
        queue.schedule(ms(10), "second");

        assert_eq!(Some(ms(10)), queue.next_deadline());
        assert_eq!(None, queue.pop_due(ms(9)));
        assert_eq!(Some((ms(10), "first")), queue.pop_due(ms(15)));
        assert_eq!(Some((ms(10), "second")), queue.pop_due(ms(15)));
        assert_eq!(None, queue.pop_due(ms(15)));
        assert_eq!(Some((ms(20), "late")), queue.pop_due(ms(100)));
        assert_eq!(None, queue.next_deadline());
    }

    #[test]
    fn test_cancel_where() {
        let mut queue = TimerQueue::new();
        queue.schedule(ms(5), 1);
        queue.schedule(ms(6), 2);
        queue.schedule(ms(7), 1);

        assert_eq!(2, queue.cancel_where(|action| *action == 1));
        assert_eq!(0, queue.cancel_where(|action| *action == 1));
        assert_eq!(Some(ms(6)), queue.next_deadline());

        queue.clear();
        assert_eq!(None, queue.next_deadline());
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        let shared = clock.clone();
        assert_eq!(Duration::ZERO, clock.now());
        clock.advance(ms(250));
        assert_eq!(ms(250), shared.now());
        shared.set(ms(10));
        assert_eq!(ms(10), clock.now());
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
        assert!(clock.instant_at(second) >= clock.instant_at(first));
    }
}
