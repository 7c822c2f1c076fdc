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

//! The performance engine.
//!
//! Owns the mixer and every piece of performance state: slices, the drum kit, active
//! voices, the sequencer and the looper. It is driven from a single control loop, which
//! hands it actions and calls [`PerformanceEngine::poll`] whenever the mixer reports
//! finished voices or a timer comes due. The UI only ever sees an [`EngineSnapshot`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::audio::effects::{EffectSpec, FADE_IN};
use crate::audio::mixer::ActiveSource;
use crate::audio::voice_source::{RegionPlayback, RegionSource};
use crate::audio::{self, AudioAsset, AudioMixer};
use crate::drums::{DrumKit, EqSettings, DEFAULT_DRUM_GAIN_DB, MAX_TRACKS};
use crate::export::{self, Export, ExportError, ExportGate, StaticExportGate, CLEAN_FILE_NAME};
use crate::input::Action;
use crate::looper::{LoopError, LoopState, LoopTransition, Looper};
use crate::playsync::CancelHandle;
use crate::scheduler::{Clock, TimerQueue};
use crate::sequencer::{MappedToggle, SequenceKey, Sequencer, SequencerError, DEFAULT_BPM};
use crate::slices::{
    SliceError, SliceMode, SliceRegion, SliceRegistry, SliceSettings, WaveformRegion,
};
use crate::voice::{Voice, VoiceClass, VoiceHandle, VoiceKind, VoiceManager};


#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no audio is loaded")]
    NoAsset,

    #[error("no slice has been played yet")]
    NothingToReplay,

    #[error("drum track {0} does not exist")]
    NoTrack(usize),

    #[error("drum track {0} has no sample")]
    NoDrumSample(usize),

    #[error("nothing to preview")]
    NoPreview,

    #[error(transparent)]
    Slice(#[from] SliceError),

    #[error(transparent)]
    Sequencer(#[from] SequencerError),

    #[error(transparent)]
    Loop(#[from] LoopError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("the output device cannot be recorded")]
    DeviceUnsupported,

    #[error("not recording")]
    NotRecording,

    #[error("nothing has been recorded")]
    NothingRecorded,
}

/// Work scheduled on the wall clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimerAction {
    SequencerTick,
    MappedSequenceTick(SequenceKey),
    LoopEvent { slice: u8 },
    LoopCycle,
}

impl TimerAction {
    fn is_loop(&self) -> bool {
        matches!(self, TimerAction::LoopEvent { .. } | TimerAction::LoopCycle)
    }
}

/// Construction options for the engine.
pub struct EngineOptions {
    pub max_voices: usize,
    pub drum_tracks: usize,
    pub drum_gain_db: f32,
    pub bpm: f64,
    /// Whether the output device allows recording the master bus.
    pub capture_supported: bool,
    pub export_gate: Box<dyn ExportGate>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            max_voices: 32,
            drum_tracks: MAX_TRACKS,
            drum_gain_db: DEFAULT_DRUM_GAIN_DB,
            bpm: DEFAULT_BPM,
            capture_supported: true,
            export_gate: Box::new(StaticExportGate::default()),
        }
    }
}

/// A finished recording of the master bus.
#[derive(Clone, Debug, PartialEq)]
pub struct PerformanceRecording {
    /// Interleaved samples.
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
    /// Tempo when the recording stopped, used to name the export.
    pub bpm: f64,
}

impl PerformanceRecording {
    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() / self.channels.max(1) as usize;
        Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64)
    }
}

/// A read-only view of the engine for the visual layer.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSnapshot {
    pub asset_loaded: bool,
    pub slice_count: usize,
    pub currently_playing_slice: Option<u8>,
    pub last_played_slice: Option<u8>,
    pub active_slice: Option<u8>,
    pub currently_playing_drum: Option<usize>,
    pub active_voices: usize,
    pub sequencer_running: bool,
    pub current_step: Option<usize>,
    pub bpm: f64,
    pub loop_state: LoopState,
    pub active_mapped_key: Option<SequenceKey>,
    pub recording: bool,
    pub has_recording: bool,
}

/// The effect chain of a slice voice: fade-in, volume, then the reverb send when the
/// mix is above zero.
pub fn slice_stages(settings: &SliceSettings) -> Vec<EffectSpec> {
    let mut stages = vec![
        EffectSpec::FadeIn { duration: FADE_IN },
        EffectSpec::Gain {
            gain: settings.volume,
        },
    ];
    stages.extend(EffectSpec::reverb(settings.reverb_mix));
    stages
}

/// Everything needed to start a voice.
struct VoicePlan {
    asset: Arc<AudioAsset>,
    playback: RegionPlayback,
    stages: Vec<EffectSpec>,
}

impl VoicePlan {
    fn scheduled_duration(&self) -> Option<Duration> {
        if self.playback.looping || self.playback.playback_rate <= 0.0 {
            return None;
        }
        let length = self.playback.end_seconds - self.playback.start_seconds;
        Some(Duration::from_secs_f64(
            length.max(0.0) / self.playback.playback_rate,
        ))
    }
}

/// The real-time performance engine.
pub struct PerformanceEngine {
    mixer: AudioMixer,
    clock: Arc<dyn Clock>,
    voices: VoiceManager,
    slices: SliceRegistry,
    kit: DrumKit,
    sequencer: Sequencer,
    looper: Looper,
    timers: TimerQueue<TimerAction>,
    asset: Option<Arc<AudioAsset>>,
    preview: Option<Arc<AudioAsset>>,
    currently_playing_slice: Option<u8>,
    last_played_slice: Option<u8>,
    active_slice: Option<u8>,
    currently_playing_drum: Option<usize>,
    capture_supported: bool,
    recording: Option<PerformanceRecording>,
    export_gate: Box<dyn ExportGate>,
}

impl PerformanceEngine {
    pub fn new(mixer: AudioMixer, clock: Arc<dyn Clock>, options: EngineOptions) -> Self {
        let mut kit = DrumKit::new(options.drum_tracks);
        kit.set_gain_db(options.drum_gain_db);
        let sequencer = Sequencer::new(kit.len(), options.bpm);
        PerformanceEngine {
            mixer,
            clock,
            voices: VoiceManager::new(options.max_voices),
            slices: SliceRegistry::new(),
            kit,
            sequencer,
            looper: Looper::new(),
            timers: TimerQueue::new(),
            asset: None,
            preview: None,
            currently_playing_slice: None,
            last_played_slice: None,
            active_slice: None,
            currently_playing_drum: None,
            capture_supported: options.capture_supported,
            recording: None,
            export_gate: options.export_gate,
        }
    }

    pub fn mixer(&self) -> &AudioMixer {
        &self.mixer
    }

    pub fn slices(&self) -> &SliceRegistry {
        &self.slices
    }

    pub fn kit(&self) -> &DrumKit {
        &self.kit
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn asset(&self) -> Option<&Arc<AudioAsset>> {
        self.asset.as_ref()
    }

    /// Active voices, oldest first.
    pub fn voices(&self) -> impl Iterator<Item = VoiceHandle> + '_ {
        self.voices.iter().map(|voice| voice.handle())
    }

    /// The UI-facing state. Voices that already left the bus are collected first so the
    /// playing markers are current even between polls.
    pub fn snapshot(&mut self) -> EngineSnapshot {
        self.reap_finished();
        EngineSnapshot {
            asset_loaded: self.asset.is_some(),
            slice_count: self.slices.len(),
            currently_playing_slice: self.currently_playing_slice,
            last_played_slice: self.last_played_slice,
            active_slice: self.active_slice,
            currently_playing_drum: self.currently_playing_drum,
            active_voices: self.voices.active_count(),
            sequencer_running: self.sequencer.is_running(),
            current_step: self.sequencer.current_step(),
            bpm: self.sequencer.bpm(),
            loop_state: self.looper.state(),
            active_mapped_key: self.sequencer.active_mapped_key(),
            recording: self.mixer.is_capturing(),
            has_recording: self.recording.is_some(),
        }
    }

    /// Replaces the sliced asset. Every voice stops, the bus is cleared and all slices are
    /// dropped along with the loop, since its events point at them.
    pub fn load_asset(&mut self, asset: AudioAsset) {
        self.stop_all_voices();
        self.mixer.clear();
        self.stop_loop();
        self.slices.clear();
        self.last_played_slice = None;
        self.active_slice = None;
        info!(
            channels = asset.channels(),
            sample_rate = asset.sample_rate(),
            duration = ?asset.duration(),
            "Asset loaded"
        );
        self.asset = Some(Arc::new(asset));
    }

    /// Starts a voice. Slice voices cut any playing slice voice at exactly the sample the
    /// new one starts; the other kinds are polyphonic.
    pub fn trigger(&mut self, kind: VoiceKind) -> Result<VoiceHandle, EngineError> {
        let plan = self.plan(kind)?;
        let start_at_sample = self.mixer.current_sample();
        let id = audio::next_source_id();
        let cancel_handle = CancelHandle::new();
        let handle = VoiceHandle {
            id,
            kind,
            playback_rate: plan.playback.playback_rate,
            scheduled_duration: plan.scheduled_duration(),
            start_at_sample,
        };

        // Cut first so the bus never sees the old and new voice together.
        for replaced in self
            .voices
            .add_voice(Voice::new(handle, cancel_handle.clone()))
        {
            replaced.cut_at(start_at_sample);
        }

        let source = RegionSource::new(
            plan.asset,
            plan.playback,
            &plan.stages,
            self.mixer.sample_rate(),
            self.mixer.num_channels(),
        );
        self.mixer.add_source(ActiveSource {
            id,
            source: Box::new(source),
            start_at_sample,
            cancel_handle,
        });
        debug!(
            voice = id,
            kind = %kind,
            rate = handle.playback_rate,
            start = start_at_sample,
            "Voice started"
        );

        match kind {
            VoiceKind::Slice { id: slice } => {
                self.currently_playing_slice = Some(slice);
                self.last_played_slice = Some(slice);
                self.active_slice = Some(slice);
                self.looper.record_trigger(slice, self.clock.now());
            }
            VoiceKind::LoopEvent { slice } => self.currently_playing_slice = Some(slice),
            VoiceKind::Drum { track } | VoiceKind::SequenceStep { track } => {
                self.currently_playing_drum = Some(track)
            }
            VoiceKind::CleanPreview => {}
        }
        Ok(handle)
    }

    fn plan(&self, kind: VoiceKind) -> Result<VoicePlan, EngineError> {
        match kind {
            VoiceKind::Slice { id: slice } | VoiceKind::LoopEvent { slice } => {
                let asset = self.asset.clone().ok_or(EngineError::NoAsset)?;
                let slice = self.slices.get(slice).ok_or(SliceError::NotFound(slice))?;
                Ok(VoicePlan {
                    asset,
                    playback: RegionPlayback {
                        start_seconds: slice.region.start_seconds,
                        end_seconds: slice.region.end_seconds,
                        playback_rate: slice.settings.playback_rate(),
                        looping: slice.settings.mode == SliceMode::Loop,
                    },
                    stages: slice_stages(&slice.settings),
                })
            }
            VoiceKind::Drum { track } | VoiceKind::SequenceStep { track } => {
                let drum = self.kit.track(track).ok_or(EngineError::NoTrack(track))?;
                let asset = drum.sample.clone().ok_or(EngineError::NoDrumSample(track))?;
                let stages = self.kit.stages(track).ok_or(EngineError::NoTrack(track))?;
                Ok(VoicePlan {
                    playback: full_length(&asset),
                    asset,
                    stages,
                })
            }
            VoiceKind::CleanPreview => {
                let asset = self.preview.clone().ok_or(EngineError::NoPreview)?;
                Ok(VoicePlan {
                    playback: full_length(&asset),
                    asset,
                    stages: vec![EffectSpec::FadeIn { duration: FADE_IN }],
                })
            }
        }
    }

    pub fn trigger_slice(&mut self, id: u8) -> Result<VoiceHandle, EngineError> {
        self.trigger(VoiceKind::Slice { id })
    }

    pub fn trigger_drum(&mut self, track: usize) -> Result<VoiceHandle, EngineError> {
        self.trigger(VoiceKind::Drum { track })
    }

    /// Plays the last triggered slice again.
    pub fn replay_last_slice(&mut self) -> Result<VoiceHandle, EngineError> {
        let id = self.last_played_slice.ok_or(EngineError::NothingToReplay)?;
        self.trigger_slice(id)
    }

    /// Plays a rendered asset, e.g. a cleaned copy of the loaded audio, from start to end.
    pub fn play_preview(&mut self, asset: Arc<AudioAsset>) -> Result<VoiceHandle, EngineError> {
        self.preview = Some(asset);
        self.trigger(VoiceKind::CleanPreview)
    }

    /// Stops a voice. Stopping a voice that already ended does nothing.
    pub fn stop_voice(&mut self, id: u64) -> bool {
        match self.voices.stop(id) {
            Some(cancel_handle) => {
                cancel_handle.cancel();
                self.refresh_playing();
                true
            }
            None => false,
        }
    }

    fn stop_all_voices(&mut self) {
        for cancel_handle in self.voices.clear() {
            cancel_handle.cancel();
        }
        self.currently_playing_slice = None;
        self.currently_playing_drum = None;
    }

    /// Clears the playing markers once nothing of theirs is left on the bus.
    fn refresh_playing(&mut self) {
        if !self.voices.has_class(VoiceClass::Slice) {
            self.currently_playing_slice = None;
        }
        if let Some(track) = self.currently_playing_drum {
            if !self
                .voices
                .iter()
                .any(|voice| voice.kind().drum_track() == Some(track))
            {
                self.currently_playing_drum = None;
            }
        }
    }

    /// Stops every voice, the sequencer, the mapped sequence and the looper at once.
    pub fn global_stop(&mut self) {
        self.stop_all_voices();
        self.sequencer.stop();
        self.sequencer.stop_mapped();
        self.looper.stop();
        self.timers.clear();
        info!("Global stop");
    }

    /// Stops everything and empties the bus, including recording.
    pub fn shutdown(&mut self) {
        self.global_stop();
        self.mixer.clear();
        self.mixer.stop_capture();
    }

    /// Handles a region drawn in the waveform view: accepted regions are labeled with
    /// their slice number, rejected ones are removed from the view.
    pub fn on_region_created(
        &mut self,
        region: &mut dyn WaveformRegion,
    ) -> Result<u8, SliceError> {
        let created = SliceRegion::new(region.start(), region.end())
            .and_then(|bounds| self.slices.create_slice(bounds));
        match created {
            Ok(id) => {
                region.set_options(crate::slices::RegionOptions::for_slice(id));
                info!(slice = id, "Slice created");
                Ok(id)
            }
            Err(e) => {
                warn!(err = %e, "Region rejected");
                region.remove();
                Err(e)
            }
        }
    }

    pub fn create_slice(&mut self, region: SliceRegion) -> Result<u8, SliceError> {
        self.slices.create_slice(region)
    }

    /// Deletes a slice, stopping its voice first.
    pub fn delete_slice(&mut self, id: u8) -> Result<(), SliceError> {
        if self.slices.get(id).is_none() {
            return Err(SliceError::NotFound(id));
        }
        for cancel_handle in self.voices.stop_slice(id) {
            cancel_handle.cancel();
        }
        self.slices.delete_slice(id)?;
        if self.active_slice == Some(id) {
            self.active_slice = None;
        }
        if self.currently_playing_slice == Some(id) {
            self.currently_playing_slice = None;
        }
        info!(slice = id, "Slice deleted");
        Ok(())
    }

    /// Changes a slice's settings. Playing voices keep the settings they started with.
    pub fn update_slice_settings(
        &mut self,
        id: u8,
        settings: SliceSettings,
    ) -> Result<SliceSettings, SliceError> {
        self.slices.update_settings(id, settings)
    }

    pub fn update_slice_region(&mut self, id: u8, region: SliceRegion) -> Result<(), SliceError> {
        self.slices.update_region(id, region)
    }

    /// Selects a slice for editing.
    pub fn select_slice(&mut self, id: u8) -> Result<(), SliceError> {
        if self.slices.get(id).is_none() {
            return Err(SliceError::NotFound(id));
        }
        self.active_slice = Some(id);
        Ok(())
    }

    pub fn set_drum_sample(&mut self, track: usize, asset: AudioAsset) -> Result<(), EngineError> {
        if !self.kit.set_sample(track, Arc::new(asset)) {
            return Err(EngineError::NoTrack(track));
        }
        info!(track, "Drum sample loaded");
        Ok(())
    }

    /// Changes a drum track's EQ. Applies from the next hit.
    pub fn set_drum_eq(&mut self, track: usize, eq: EqSettings) -> Result<EqSettings, EngineError> {
        self.kit.set_eq(track, eq).ok_or(EngineError::NoTrack(track))
    }

    pub fn set_drum_name(&mut self, track: usize, name: &str) -> Result<(), EngineError> {
        if !self.kit.set_name(track, name) {
            return Err(EngineError::NoTrack(track));
        }
        Ok(())
    }

    /// Starts the live sequencer. The first tick fires immediately and plays step 0.
    pub fn start_sequencer(&mut self, bpm: f64) {
        if self.sequencer.start(bpm) {
            self.timers
                .schedule(self.clock.now(), TimerAction::SequencerTick);
        }
    }

    pub fn stop_sequencer(&mut self) {
        self.sequencer.stop();
        self.timers
            .cancel_where(|action| *action == TimerAction::SequencerTick);
    }

    /// Starts the live sequencer at the current tempo, or stops it.
    pub fn toggle_sequencer(&mut self) {
        if self.sequencer.is_running() {
            self.stop_sequencer();
        } else {
            self.start_sequencer(self.sequencer.bpm());
        }
    }

    /// Changes the tempo. The new interval applies from the next scheduled tick.
    pub fn set_bpm(&mut self, bpm: f64) -> f64 {
        self.sequencer.set_bpm(bpm)
    }

    pub fn toggle_step(&mut self, track: usize, step: usize) -> Result<bool, SequencerError> {
        self.sequencer.toggle_step(track, step)
    }

    pub fn clear_pattern(&mut self) {
        self.sequencer.clear();
    }

    pub fn map_pattern(&mut self, key: SequenceKey) {
        self.sequencer.map_current_pattern_to(key);
    }

    pub fn clear_mapping(&mut self, key: SequenceKey) -> Result<(), SequencerError> {
        self.sequencer.clear_mapping(key)?;
        self.timers
            .cancel_where(|action| *action == TimerAction::MappedSequenceTick(key));
        Ok(())
    }

    /// Starts the sequence mapped to `key`, or stops it if it is the one playing.
    pub fn toggle_mapped_sequence(
        &mut self,
        key: SequenceKey,
    ) -> Result<MappedToggle, SequencerError> {
        let toggle = self.sequencer.toggle_mapped(key)?;
        self.cancel_mapped_timers();
        if let MappedToggle::Started { .. } = toggle {
            self.timers
                .schedule(self.clock.now(), TimerAction::MappedSequenceTick(key));
        }
        Ok(toggle)
    }

    fn cancel_mapped_timers(&mut self) {
        self.timers
            .cancel_where(|action| matches!(action, TimerAction::MappedSequenceTick(_)));
    }

    /// Serializes the live pattern as a JSON export named after the tempo.
    pub fn pattern_dump(&self) -> Result<Export, SequencerError> {
        Ok(Export {
            file_name: self.sequencer.dump_file_name(),
            bytes: self.sequencer.to_json()?.into_bytes(),
        })
    }

    pub fn load_pattern(&mut self, json: &str) -> Result<(), SequencerError> {
        self.sequencer.load_json(json)
    }

    /// Steps the looper: Idle to Recording, Recording to Playing, Playing to Idle.
    pub fn loop_step(&mut self) -> Result<LoopState, LoopError> {
        let now = self.clock.now();
        match self.looper.step(now)? {
            LoopTransition::RecordingStarted => {}
            LoopTransition::PlaybackStarted(_) => {
                self.timers.schedule(now, TimerAction::LoopCycle);
            }
            LoopTransition::Stopped => {
                self.timers.cancel_where(TimerAction::is_loop);
            }
        }
        Ok(self.looper.state())
    }

    fn stop_loop(&mut self) {
        self.looper.stop();
        self.timers.cancel_where(TimerAction::is_loop);
    }

    /// Starts recording the master bus.
    pub fn start_recording(&mut self) -> Result<(), RecordError> {
        if !self.capture_supported {
            return Err(RecordError::DeviceUnsupported);
        }
        if self.mixer.is_capturing() {
            debug!("Already recording");
            return Ok(());
        }
        self.mixer.start_capture();
        info!("Recording started");
        Ok(())
    }

    /// Stops recording and keeps the result for export.
    pub fn stop_recording(&mut self) -> Result<Duration, RecordError> {
        let samples = self
            .mixer
            .stop_capture()
            .ok_or(RecordError::NotRecording)?;
        let recording = PerformanceRecording {
            samples,
            channels: self.mixer.num_channels(),
            sample_rate: self.mixer.sample_rate(),
            bpm: self.sequencer.bpm(),
        };
        let duration = recording.duration();
        info!(duration = ?duration, "Recording stopped");
        self.recording = Some(recording);
        Ok(duration)
    }

    pub fn recording(&self) -> Option<&PerformanceRecording> {
        self.recording.as_ref()
    }

    /// Exports the last recording as WAV, if the export gate allows it.
    pub fn export_recording(&self) -> Result<Export, EngineError> {
        if self.mixer.is_capturing() {
            return Err(RecordError::NothingRecorded.into());
        }
        let recording = self.recording.as_ref().ok_or(RecordError::NothingRecorded)?;
        Ok(export::export_samples(
            self.export_gate.as_ref(),
            &recording.samples,
            recording.channels,
            recording.sample_rate,
            &export::performance_file_name(recording.bpm),
        )?)
    }

    /// Exports a rendered asset, e.g. a cleaned copy of the loaded audio.
    pub fn export_clean(&self, asset: &AudioAsset) -> Result<Export, ExportError> {
        export::export_asset(self.export_gate.as_ref(), asset, CLEAN_FILE_NAME)
    }

    /// Carries out an input action.
    pub fn dispatch(&mut self, action: Action) -> Result<(), EngineError> {
        match action {
            Action::TriggerSlice(id) => {
                self.trigger_slice(id)?;
            }
            Action::TriggerDrum(track) => {
                self.trigger_drum(track)?;
            }
            Action::ToggleMappedSequence(key) => {
                self.toggle_mapped_sequence(key)?;
            }
            Action::MapPattern(key) => self.map_pattern(key),
            Action::LoopStep => {
                self.loop_step()?;
            }
            Action::GlobalStop => self.global_stop(),
        }
        Ok(())
    }

    /// Collects finished voices and fires every timer that is due.
    pub fn poll(&mut self) {
        self.reap_finished();

        let now = self.clock.now();
        while let Some((at, action)) = self.timers.pop_due(now) {
            self.fire(at, action);
        }
    }

    fn reap_finished(&mut self) {
        for id in self.mixer.take_finished() {
            if let Some(voice) = self.voices.remove(id) {
                debug!(voice = id, kind = %voice.kind(), "Voice ended");
            }
        }
        self.refresh_playing();
    }

    /// The next time `poll` has timer work to do.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    /// The first step deadline after `at` that is still ahead of the clock. Steps missed
    /// while the control loop was stalled are dropped rather than played in a burst.
    fn next_tick(&self, at: Duration) -> Duration {
        let interval = self.sequencer.interval();
        let now = self.clock.now();
        let mut next = at + interval;
        if interval.is_zero() {
            return next;
        }
        let mut missed = 0u32;
        while next <= now {
            next += interval;
            missed += 1;
        }
        if missed > 0 {
            debug!(missed, "Skipped late sequencer steps");
        }
        next
    }

    fn fire(&mut self, at: Duration, action: TimerAction) {
        match action {
            TimerAction::SequencerTick => {
                if let Some(tick) = self.sequencer.tick() {
                    for track in tick.tracks {
                        self.trigger_quietly(VoiceKind::SequenceStep { track });
                    }
                    let next = self.next_tick(at);
                    self.timers.schedule(next, TimerAction::SequencerTick);
                }
            }
            TimerAction::MappedSequenceTick(key) => {
                if let Some(tick) = self.sequencer.mapped_tick(key) {
                    for track in tick.tracks {
                        self.trigger_quietly(VoiceKind::SequenceStep { track });
                    }
                    let next = self.next_tick(at);
                    self.timers
                        .schedule(next, TimerAction::MappedSequenceTick(key));
                }
            }
            TimerAction::LoopEvent { slice } => {
                self.trigger_quietly(VoiceKind::LoopEvent { slice });
            }
            TimerAction::LoopCycle => {
                let Some(recording) = self.looper.recording() else {
                    return;
                };
                let events: Vec<_> = recording
                    .events
                    .iter()
                    .map(|event| (at + event.offset, event.slice))
                    .collect();
                let next_cycle = at + recording.duration;
                for (event_at, slice) in events {
                    self.timers
                        .schedule(event_at, TimerAction::LoopEvent { slice });
                }
                self.timers.schedule(next_cycle, TimerAction::LoopCycle);
            }
        }
    }

    /// Triggers from a timer. Missing samples and deleted slices are skipped.
    fn trigger_quietly(&mut self, kind: VoiceKind) {
        if let Err(e) = self.trigger(kind) {
            debug!(kind = %kind, err = %e, "Skipped scheduled trigger");
        }
    }
}

/// The whole asset at its own speed.
fn full_length(asset: &AudioAsset) -> RegionPlayback {
    RegionPlayback {
        start_seconds: 0.0,
        end_seconds: asset.duration().as_secs_f64(),
        playback_rate: 1.0,
        looping: false,
    }
}
