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
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

/// Sentinel for "no scheduled cut".
const NO_CUT: u64 = u64::MAX;

/// A cancel handle is shared between a voice entry in the engine and the source that the
/// audio callback renders. The audio thread polls it once per block, so it has to stay
/// lock-free.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    /// Set once the voice should stop immediately.
    cancelled: Arc<AtomicBool>,
    /// Audio sample at which the voice should stop. Used for sample-accurate cuts.
    cut_at_sample: Arc<AtomicU64>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    /// Creates a new cancel handle.
    pub fn new() -> CancelHandle {
        CancelHandle {
            cancelled: Arc::new(AtomicBool::new(false)),
            cut_at_sample: Arc::new(AtomicU64::new(NO_CUT)),
        }
    }

    /// Returns true if the voice has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Cancels the voice. Cancelling twice is a no-op.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Schedules the voice to stop at the given audio sample. An earlier cut always wins.
    pub fn cut_at(&self, sample: u64) {
        self.cut_at_sample.fetch_min(sample, Ordering::AcqRel);
    }

    /// Returns the scheduled cut sample, if any.
    pub fn scheduled_cut(&self) -> Option<u64> {
        match self.cut_at_sample.load(Ordering::Acquire) {
            NO_CUT => None,
            sample => Some(sample),
        }
    }

    /// Returns true if the voice should not produce audio at the given sample.
    pub fn is_stopped_at(&self, sample: u64) -> bool {
        self.is_cancelled() || self.scheduled_cut().is_some_and(|cut| sample >= cut)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cancel_is_idempotent() {
        let cancel_handle = CancelHandle::new();
        assert!(!cancel_handle.is_cancelled());

        cancel_handle.cancel();
        cancel_handle.cancel();
        assert!(cancel_handle.is_cancelled());
        assert!(cancel_handle.clone().is_cancelled());
    }

    #[test]
    fn test_scheduled_cut() {
        let cancel_handle = CancelHandle::new();
        assert_eq!(None, cancel_handle.scheduled_cut());
        assert!(!cancel_handle.is_stopped_at(1_000_000));

        cancel_handle.cut_at(512);
        assert!(!cancel_handle.is_stopped_at(511));
        assert!(cancel_handle.is_stopped_at(512));

        // A later cut does not push an earlier one back.
        cancel_handle.cut_at(1024);
        assert_eq!(Some(512), cancel_handle.scheduled_cut());
    }
}
