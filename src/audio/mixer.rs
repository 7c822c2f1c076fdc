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
// The master bus. Every voice ends up here, and the running sample counter is the audio
// clock that voice starts and cuts are scheduled against.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::error;

use crate::playsync::CancelHandle;

/// Something that can be rendered onto the master bus one frame at a time.
pub trait VoiceSource: Send {
    /// Adds one frame of audio into `frame` (one value per output channel).
    /// Returns false once the source has nothing left to play.
    fn render_frame(&mut self, frame: &mut [f32]) -> bool;
}

/// Represents an active audio source in the mixer
pub struct ActiveSource {
    /// Unique ID for this source
    pub id: u64,
    /// The voice being rendered
    pub source: Box<dyn VoiceSource>,
    /// Audio sample at which this source becomes audible
    pub start_at_sample: u64,
    /// Cancel handle for this source (also carries the scheduled cut)
    pub cancel_handle: CancelHandle,
}

/// Core audio mixing logic that's independent of any audio backend
#[derive(Clone)]
pub struct AudioMixer {
    /// Active audio sources currently playing
    active_sources: Arc<Mutex<Vec<ActiveSource>>>,
    /// Sources waiting to be picked up by the next block
    incoming_tx: Sender<ActiveSource>,
    incoming_rx: Receiver<ActiveSource>,
    /// IDs of sources that were removed from the bus
    finished_tx: Sender<u64>,
    finished_rx: Receiver<u64>,
    /// Number of frames rendered so far
    current_sample: Arc<AtomicU64>,
    /// Copy of the mixed output while recording
    capture: Arc<Mutex<Option<Vec<f32>>>>,
    /// Number of output channels
    num_channels: u16,
    /// Sample rate
    sample_rate: u32,
}

impl AudioMixer {
    /// Creates a new audio mixer
    pub fn new(num_channels: u16, sample_rate: u32) -> Self {
        let (incoming_tx, incoming_rx) = crossbeam_channel::unbounded();
        let (finished_tx, finished_rx) = crossbeam_channel::unbounded();
        Self {
            active_sources: Arc::new(Mutex::new(Vec::new())),
            incoming_tx,
            incoming_rx,
            finished_tx,
            finished_rx,
            current_sample: Arc::new(AtomicU64::new(0)),
            capture: Arc::new(Mutex::new(None)),
            num_channels: num_channels.max(1),
            sample_rate,
        }
    }

    /// Queues a source. The audio callback picks it up at the start of its next block, so
    /// this never contends with mixing.
    pub fn add_source(&self, source: ActiveSource) {
        if let Err(e) = self.incoming_tx.send(source) {
            error!(error = %e, "Failed to queue source for the mixer");
        }
    }

    /// Removes every source from the bus, reporting each one as finished.
    pub fn clear(&self) {
        let mut sources = self.active_sources.lock();
        sources.extend(self.incoming_rx.try_iter());
        for source in sources.drain(..) {
            source.cancel_handle.cancel();
            let _ = self.finished_tx.send(source.id);
        }
    }

    /// Mixes the next block into `output`, which holds interleaved frames.
    pub fn process_into(&self, output: &mut [f32]) {
        output.fill(0.0);
        let channels = self.num_channels as usize;
        let num_frames = output.len() / channels;
        let block_start = self.current_sample.load(Ordering::Acquire);

        {
            let mut sources = self.active_sources.lock();
            sources.extend(self.incoming_rx.try_iter());

            let finished_tx = &self.finished_tx;
            sources.retain_mut(|active_source| {
                if active_source.cancel_handle.is_cancelled() {
                    let _ = finished_tx.send(active_source.id);
                    return false;
                }

                for (frame_index, frame) in output.chunks_exact_mut(channels).enumerate() {
                    let sample = block_start + frame_index as u64;
                    if sample < active_source.start_at_sample {
                        continue;
                    }
                    if active_source.cancel_handle.is_stopped_at(sample)
                        || !active_source.source.render_frame(frame)
                    {
                        let _ = finished_tx.send(active_source.id);
                        return false;
                    }
                }
                true
            });
        }

        self.current_sample
            .fetch_add(num_frames as u64, Ordering::AcqRel);

        if let Some(captured) = self.capture.lock().as_mut() {
            captured.extend_from_slice(&output[..num_frames * channels]);
        }
    }

    /// Processes multiple frames of audio mixing
    pub fn process_frames(&self, num_frames: usize) -> Vec<f32> {
        let mut frames = vec![0.0f32; num_frames * self.num_channels as usize];
        self.process_into(&mut frames);
        frames
    }

    /// Returns the IDs of sources that left the bus since the last call.
    pub fn take_finished(&self) -> Vec<u64> {
        self.finished_rx.try_iter().collect()
    }

    /// Starts copying the master bus output into a capture buffer.
    pub fn start_capture(&self) {
        *self.capture.lock() = Some(Vec::new());
    }

    /// Stops capturing and returns the interleaved samples recorded so far.
    pub fn stop_capture(&self) -> Option<Vec<f32>> {
        self.capture.lock().take()
    }

    /// Returns true while the master bus is being captured.
    pub fn is_capturing(&self) -> bool {
        self.capture.lock().is_some()
    }

    /// The audio clock: the number of frames rendered so far.
    pub fn current_sample(&self) -> u64 {
        self.current_sample.load(Ordering::Acquire)
    }

    /// Returns the number of sources on the bus, including queued ones.
    pub fn source_count(&self) -> usize {
        self.active_sources.lock().len() + self.incoming_rx.len()
    }

    /// Gets the number of output channels
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Gets the sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Emits a constant value for a fixed number of frames.
    struct ConstantSource {
        value: f32,
        remaining: usize,
    }

    impl VoiceSource for ConstantSource {
        fn render_frame(&mut self, frame: &mut [f32]) -> bool {
            if self.remaining == 0 {
                return false;
            }
            self.remaining -= 1;
            for sample in frame.iter_mut() {
                *sample += self.value;
            }
            true
        }
    }

    fn constant(id: u64, value: f32, frames: usize, start_at_sample: u64) -> ActiveSource {
        ActiveSource {
            id,
            source: Box::new(ConstantSource {
                value,
                remaining: frames,
            }),
            start_at_sample,
            cancel_handle: CancelHandle::new(),
        }
    }

    #[test]
    fn test_basic_mixing() {
        let mixer = AudioMixer::new(2, 44100);
        mixer.add_source(constant(1, 0.5, 2, 0));

        let frames = mixer.process_frames(3);
        assert_eq!(vec![0.5, 0.5, 0.5, 0.5, 0.0, 0.0], frames);
        assert_eq!(3, mixer.current_sample());
        assert_eq!(vec![1], mixer.take_finished());
        assert_eq!(0, mixer.source_count());
    }

    #[test]
    fn test_multiple_source_mixing() {
        let mixer = AudioMixer::new(1, 44100);
        mixer.add_source(constant(1, 0.5, 4, 0));
        mixer.add_source(constant(2, 0.2, 4, 0));

        let frame = mixer.process_frames(1);
        assert!((frame[0] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_scheduled_start_and_cut() {
        let mixer = AudioMixer::new(1, 44100);
        let source = constant(1, 1.0, 100, 2);
        source.cancel_handle.cut_at(4);
        mixer.add_source(source);

        let frames = mixer.process_frames(6);
        assert_eq!(vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0], frames);
        assert_eq!(vec![1], mixer.take_finished());
    }

    #[test]
    fn test_cancelled_source_is_removed() {
        let mixer = AudioMixer::new(1, 44100);
        let source = constant(7, 1.0, 100, 0);
        let cancel_handle = source.cancel_handle.clone();
        mixer.add_source(source);

        mixer.process_frames(1);
        cancel_handle.cancel();
        let frames = mixer.process_frames(2);
        assert_eq!(vec![0.0, 0.0], frames);
        assert_eq!(vec![7], mixer.take_finished());
    }

    #[test]
    fn test_capture_taps_output() {
        let mixer = AudioMixer::new(1, 44100);
        mixer.add_source(constant(1, 0.25, 2, 0));

        mixer.process_frames(1);
        mixer.start_capture();
        assert!(mixer.is_capturing());
        let frames = mixer.process_frames(2);

        let captured = mixer.stop_capture().expect("capture buffer");
        assert_eq!(frames, captured);
        assert!(!mixer.is_capturing());
        assert_eq!(None, mixer.stop_capture());
    }

    #[test]
    fn test_clear_reports_every_source() {
        let mixer = AudioMixer::new(2, 44100);
        mixer.add_source(constant(1, 0.5, 100, 0));
        mixer.process_frames(1);
        mixer.add_source(constant(2, 0.5, 100, 0));

        mixer.clear();
        let mut finished = mixer.take_finished();
        finished.sort();
        assert_eq!(vec![1, 2], finished);
        assert_eq!(0, mixer.source_count());
    }
}
