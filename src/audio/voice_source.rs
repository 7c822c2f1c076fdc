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
use std::sync::Arc;

use super::asset::AudioAsset;
use super::effects::{Effect, EffectSpec};
use super::mixer::VoiceSource;

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

/// Where and how a region is played.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionPlayback {
    pub start_seconds: f64,
    pub end_seconds: f64,
    /// Relative to real time: at 1.0 the region lasts exactly its length in seconds
    /// whatever the asset and output rates are.
    pub playback_rate: f64,
    pub looping: bool,
}

/// Plays a region of a shared asset onto the master bus, reading with linear interpolation
/// and running the voice's effect chain on every frame.
pub struct RegionSource {
    asset: Arc<AudioAsset>,
    /// First frame of the region in the asset.
    start: usize,
    /// One past the last frame of the region in the asset.
    end: usize,
    /// Read position in asset frames, relative to `start`.
    position: f64,
    /// Asset frames advanced per output frame.
    step: f64,
    looping: bool,
    effects: Vec<Box<dyn Effect>>,
    /// Silent frames still to be fed through the effects once the region ends.
    tail: usize,
    /// Scratch frame so effects only see this voice's signal.
    scratch: Vec<f32>,
}

impl RegionSource {
    /// Creates a source for `[start_seconds, end_seconds)` of the asset.
    pub fn new(
        asset: Arc<AudioAsset>,
        playback: RegionPlayback,
        effects: &[EffectSpec],
        output_sample_rate: u32,
        output_channels: u16,
    ) -> RegionSource {
        let asset_rate = asset.sample_rate() as f64;
        let frames = asset.frames();
        let start =
            ((playback.start_seconds.max(0.0) * asset_rate).round() as usize).min(frames);
        let end = ((playback.end_seconds.max(0.0) * asset_rate).round() as usize)
            .clamp(start, frames);
        let step =
            playback.playback_rate.max(0.0) * asset_rate / output_sample_rate.max(1) as f64;
        let channels = output_channels.max(1) as usize;
        let effects: Vec<Box<dyn Effect>> = effects
            .iter()
            .map(|spec| spec.to_effect(output_sample_rate, channels))
            .collect();
        let tail = effects.iter().map(|effect| effect.tail_frames()).sum();

        RegionSource {
            asset,
            start,
            end,
            position: 0.0,
            step,
            looping: playback.looping,
            effects,
            tail,
            scratch: vec![0.0; channels],
        }
    }

    fn length(&self) -> usize {
        self.end - self.start
    }

    fn read(&self, channel: usize, position: f64) -> f32 {
        let data = self.asset.channel(channel % self.asset.channels() as usize);
        let index = position as usize;
        let frac = (position - index as f64) as f32;
        let i0 = self.start + index;
        let s0 = data[i0];
        // Interpolate toward the next frame; the region edge holds the last value
        // unless the voice wraps.
        let next = if i0 + 1 < self.end {
            i0 + 1
        } else if self.looping {
            self.start
        } else {
            i0
        };
        lerp(s0, data[next], frac)
    }
}

impl VoiceSource for RegionSource {
    fn render_frame(&mut self, frame: &mut [f32]) -> bool {
        let length = self.length();
        if length == 0 || self.step <= 0.0 {
            return false;
        }
        if self.position >= length as f64 {
            if !self.looping {
                return self.render_tail(frame);
            }
            self.position %= length as f64;
        }

        for channel in 0..self.scratch.len() {
            self.scratch[channel] = self.read(channel, self.position);
        }
        self.process_into(frame);
        self.position += self.step;
        true
    }
}

impl RegionSource {
    /// Drains the effect tails with silence after the region has been read.
    fn render_tail(&mut self, frame: &mut [f32]) -> bool {
        if self.tail == 0 {
            return false;
        }
        self.tail -= 1;
        self.scratch.fill(0.0);
        self.process_into(frame);
        true
    }

    fn process_into(&mut self, frame: &mut [f32]) {
        for effect in self.effects.iter_mut() {
            effect.process(&mut self.scratch);
        }
        for (out, sample) in frame.iter_mut().zip(self.scratch.iter()) {
            *out += *sample;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_asset(frames: usize, sample_rate: u32) -> Arc<AudioAsset> {
        let data = (0..frames).map(|i| i as f32).collect();
        Arc::new(AudioAsset::new(sample_rate, vec![data]).expect("asset"))
    }

    fn region(
        start_seconds: f64,
        end_seconds: f64,
        playback_rate: f64,
        looping: bool,
    ) -> RegionPlayback {
        RegionPlayback {
            start_seconds,
            end_seconds,
            playback_rate,
            looping,
        }
    }

    fn render(source: &mut RegionSource, channels: usize, max_frames: usize) -> Vec<Vec<f32>> {
        let mut frames = Vec::new();
        for _ in 0..max_frames {
            let mut frame = vec![0.0; channels];
            if !source.render_frame(&mut frame) {
                break;
            }
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_plays_region_once() {
        let asset = ramp_asset(10, 10);
        let mut source = RegionSource::new(asset, region(0.2, 0.5, 1.0, false), &[], 10, 1);
        let frames = render(&mut source, 1, 100);
        assert_eq!(vec![vec![2.0], vec![3.0], vec![4.0]], frames);
    }

    #[test]
    fn test_interpolates_at_half_rate() {
        let asset = ramp_asset(10, 10);
        let mut source = RegionSource::new(asset, region(0.0, 0.2, 0.5, false), &[], 10, 1);
        let frames = render(&mut source, 1, 100);
        assert_eq!(vec![vec![0.0], vec![0.5], vec![1.0], vec![1.0]], frames);
    }

    #[test]
    fn test_rate_conversion_keeps_real_time() {
        // A 1 s region of a 20 Hz asset lasts 10 frames at a 10 Hz output rate.
        let asset = ramp_asset(40, 20);
        let mut source = RegionSource::new(asset, region(1.0, 2.0, 1.0, false), &[], 10, 1);
        let frames = render(&mut source, 1, 100);
        assert_eq!(10, frames.len());
        assert_eq!(vec![20.0], frames[0]);
        assert_eq!(vec![22.0], frames[1]);
    }

    #[test]
    fn test_loop_wraps_until_stopped() {
        let asset = ramp_asset(10, 10);
        let mut source = RegionSource::new(asset, region(0.0, 0.3, 1.0, true), &[], 10, 1);
        let frames = render(&mut source, 1, 7);
        let values: Vec<f32> = frames.into_iter().map(|f| f[0]).collect();
        assert_eq!(vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0], values);
    }

    #[test]
    fn test_mono_asset_fills_every_output_channel() {
        let asset = ramp_asset(10, 10);
        let mut source = RegionSource::new(
            asset,
            region(0.5, 0.6, 1.0, false),
            &[EffectSpec::Gain { gain: 0.5 }],
            10,
            2,
        );
        let frames = render(&mut source, 2, 10);
        assert_eq!(vec![vec![2.5, 2.5]], frames);
    }

    #[test]
    fn test_reverb_tail_outlasts_region() {
        let asset = Arc::new(AudioAsset::new(1000, vec![vec![1.0; 200]]).expect("asset"));
        let reverb = EffectSpec::reverb(1.0).expect("send");
        let mut source =
            RegionSource::new(asset, region(0.0, 0.2, 1.0, false), &[reverb], 1000, 1);
        let output: Vec<f32> = render(&mut source, 1, 10_000)
            .into_iter()
            .map(|f| f[0])
            .collect();

        // Region plus 50 frames of first echo plus ten feedback passes.
        assert_eq!(200 + 550, output.len());
        // Fully wet: the region comes out one delay late, building up through feedback,
        // and its last 50 frames land after the region ends.
        assert_eq!(0.0, output[49]);
        assert_eq!(1.0, output[50]);
        assert_eq!(1.5, output[100]);
        assert_eq!(1.875, output[249]);
        let tail_start: f32 = output[250..300].iter().sum::<f32>() / 50.0;
        let tail_end: f32 = output[700..].iter().map(|s| s.abs()).fold(0.0, f32::max);
        assert!(tail_start > 0.4, "first echo {}", tail_start);
        assert!(tail_end < 0.01, "tail end {}", tail_end);
    }

    #[test]
    fn test_empty_region_ends_immediately() {
        let asset = ramp_asset(10, 10);
        let mut source = RegionSource::new(asset, region(2.0, 3.0, 1.0, true), &[], 10, 1);
        assert!(render(&mut source, 1, 10).is_empty());
    }
}
