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
use std::f32::consts::PI;
use std::fmt;
use std::time::Duration;

/// Length of the fade applied to the start of slice voices.
pub const FADE_IN: Duration = Duration::from_millis(5);

/// Delay time of the reverb send.
pub const REVERB_DELAY: Duration = Duration::from_millis(50);

/// Corner frequency of the low EQ band.
pub const EQ_LOW_FREQ: f32 = 250.0;
/// Center frequency of the mid EQ band.
pub const EQ_MID_FREQ: f32 = 1000.0;
/// Q of the mid EQ band.
pub const EQ_MID_Q: f32 = 0.7;
/// Corner frequency of the high EQ band.
pub const EQ_HIGH_FREQ: f32 = 3000.0;

/// One stage of a voice's effect chain. Voices carry an ordered list of these and build
/// the processing state only when they start playing.
#[derive(Clone, Debug, PartialEq)]
pub enum EffectSpec {
    Gain {
        gain: f32,
    },
    FadeIn {
        duration: Duration,
    },
    LowShelf {
        freq: f32,
        gain_db: f32,
    },
    Peaking {
        freq: f32,
        gain_db: f32,
        q: f32,
    },
    HighShelf {
        freq: f32,
        gain_db: f32,
    },
    /// Parallel feedback delay: `out = dry * in + wet * delayed`.
    FeedbackDelay {
        delay: Duration,
        feedback: f32,
        dry: f32,
        wet: f32,
    },
}

impl EffectSpec {
    /// The reverb send for the given mix, or None when the mix is silent.
    pub fn reverb(mix: f32) -> Option<EffectSpec> {
        let mix = mix.clamp(0.0, 1.0);
        if mix <= 0.0 {
            return None;
        }
        Some(EffectSpec::FeedbackDelay {
            delay: REVERB_DELAY,
            feedback: mix * 0.5,
            dry: 1.0 - mix,
            wet: mix,
        })
    }

    /// Builds the processing state for this stage.
    pub fn to_effect(&self, sample_rate: u32, channels: usize) -> Box<dyn Effect> {
        let sample_rate = sample_rate as f32;
        match self {
            EffectSpec::Gain { gain } => Box::new(Gain { gain: *gain }),
            EffectSpec::FadeIn { duration } => Box::new(FadeIn::new(
                (duration.as_secs_f32() * sample_rate).round() as usize,
            )),
            EffectSpec::LowShelf { freq, gain_db } => Box::new(Biquad::new(
                BiquadCoeffs::low_shelf(*freq, *gain_db, sample_rate),
                channels,
            )),
            EffectSpec::Peaking { freq, gain_db, q } => Box::new(Biquad::new(
                BiquadCoeffs::peaking(*freq, *gain_db, *q, sample_rate),
                channels,
            )),
            EffectSpec::HighShelf { freq, gain_db } => Box::new(Biquad::new(
                BiquadCoeffs::high_shelf(*freq, *gain_db, sample_rate),
                channels,
            )),
            EffectSpec::FeedbackDelay {
                delay,
                feedback,
                dry,
                wet,
            } => Box::new(FeedbackDelay::new(
                ((delay.as_secs_f32() * sample_rate).round() as usize).max(1),
                *feedback,
                *dry,
                *wet,
                channels,
            )),
        }
    }
}

impl fmt::Display for EffectSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectSpec::Gain { gain } => write!(f, "Gain({:.2})", gain),
            EffectSpec::FadeIn { duration } => write!(f, "FadeIn({:?})", duration),
            EffectSpec::LowShelf { freq, gain_db } => {
                write!(f, "LowShelf({}Hz, {:+.1}dB)", freq, gain_db)
            }
            EffectSpec::Peaking { freq, gain_db, q } => {
                write!(f, "Peaking({}Hz, {:+.1}dB, Q{})", freq, gain_db, q)
            }
            EffectSpec::HighShelf { freq, gain_db } => {
                write!(f, "HighShelf({}Hz, {:+.1}dB)", freq, gain_db)
            }
            EffectSpec::FeedbackDelay { delay, wet, .. } => {
                write!(f, "FeedbackDelay({:?}, wet {:.2})", delay, wet)
            }
        }
    }
}

/// The three-band EQ stages for the given gains, low to high. Flat bands are omitted.
pub fn eq_stages(low_db: f32, mid_db: f32, high_db: f32) -> Vec<EffectSpec> {
    let mut stages = Vec::with_capacity(3);
    if low_db != 0.0 {
        stages.push(EffectSpec::LowShelf {
            freq: EQ_LOW_FREQ,
            gain_db: low_db,
        });
    }
    if mid_db != 0.0 {
        stages.push(EffectSpec::Peaking {
            freq: EQ_MID_FREQ,
            gain_db: mid_db,
            q: EQ_MID_Q,
        });
    }
    if high_db != 0.0 {
        stages.push(EffectSpec::HighShelf {
            freq: EQ_HIGH_FREQ,
            gain_db: high_db,
        });
    }
    stages
}

/// Converts decibels to a linear gain factor.
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Level below which a decaying tail counts as silent (-60 dB).
const TAIL_FLOOR: f32 = 0.001;

/// Processes audio one interleaved frame at a time.
pub trait Effect: Send {
    fn process(&mut self, frame: &mut [f32]);

    /// Frames of output this stage still produces after its input goes silent.
    fn tail_frames(&self) -> usize {
        0
    }
}

struct Gain {
    gain: f32,
}

impl Effect for Gain {
    fn process(&mut self, frame: &mut [f32]) {
        for sample in frame.iter_mut() {
            *sample *= self.gain;
        }
    }
}

/// Linear ramp from silence to unity.
struct FadeIn {
    length: usize,
    position: usize,
}

impl FadeIn {
    fn new(length: usize) -> FadeIn {
        FadeIn {
            length,
            position: 0,
        }
    }
}

impl Effect for FadeIn {
    fn process(&mut self, frame: &mut [f32]) {
        if self.position >= self.length {
            return;
        }
        let gain = self.position as f32 / self.length as f32;
        for sample in frame.iter_mut() {
            *sample *= gain;
        }
        self.position += 1;
    }
}

/// Biquad filter coefficients (RBJ cookbook, normalized by a0).
#[derive(Debug, Clone, Copy)]
struct BiquadCoeffs {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl BiquadCoeffs {
    /// Shelf slope used by both shelving filters.
    const SHELF_SLOPE: f32 = 0.9;

    fn shelf_alpha(a: f32, sin_w0: f32) -> f32 {
        sin_w0 / 2.0 * ((a + 1.0 / a) * (1.0 / Self::SHELF_SLOPE - 1.0) + 2.0).sqrt()
    }

    fn low_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = Self::shelf_alpha(a, w0.sin());
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
        Self {
            b0: (a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha)) / a0,
            b1: (2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha)) / a0,
            a1: (-2.0 * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha) / a0,
        }
    }

    fn peaking(freq: f32, gain_db: f32, q: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_w0) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha / a) / a0,
        }
    }

    fn high_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = Self::shelf_alpha(a, w0.sin());
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
        Self {
            b0: (a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha)) / a0,
            b1: (-2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha)) / a0,
            a1: (2.0 * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha) / a0,
        }
    }
}

/// Direct form I history for one channel.
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

struct Biquad {
    coeffs: BiquadCoeffs,
    state: Vec<BiquadState>,
}

impl Biquad {
    fn new(coeffs: BiquadCoeffs, channels: usize) -> Biquad {
        Biquad {
            coeffs,
            state: vec![BiquadState::default(); channels.max(1)],
        }
    }
}

impl Effect for Biquad {
    fn process(&mut self, frame: &mut [f32]) {
        let c = self.coeffs;
        for (sample, s) in frame.iter_mut().zip(self.state.iter_mut()) {
            let input = *sample;
            let out = c.b0 * input + c.b1 * s.x1 + c.b2 * s.x2 - c.a1 * s.y1 - c.a2 * s.y2;
            s.x2 = s.x1;
            s.x1 = input;
            s.y2 = s.y1;
            s.y1 = out;
            *sample = out;
        }
    }
}

/// Per-channel ring buffer with feedback.
struct FeedbackDelay {
    buffers: Vec<Vec<f32>>,
    write_pos: usize,
    feedback: f32,
    dry: f32,
    wet: f32,
}

impl FeedbackDelay {
    fn new(delay_samples: usize, feedback: f32, dry: f32, wet: f32, channels: usize) -> Self {
        FeedbackDelay {
            buffers: vec![vec![0.0; delay_samples]; channels.max(1)],
            write_pos: 0,
            feedback,
            dry,
            wet,
        }
    }
}

impl Effect for FeedbackDelay {
    fn process(&mut self, frame: &mut [f32]) {
        for (sample, buffer) in frame.iter_mut().zip(self.buffers.iter_mut()) {
            let delayed = buffer[self.write_pos];
            buffer[self.write_pos] = *sample + delayed * self.feedback;
            *sample = self.dry * *sample + self.wet * delayed;
        }
        self.write_pos = (self.write_pos + 1) % self.buffers[0].len();
    }

    /// One delay for the first echo, then one more per feedback pass until the echo
    /// falls under the floor.
    fn tail_frames(&self) -> usize {
        let delay = self.buffers[0].len();
        let feedback = self.feedback.abs();
        let passes = if feedback <= TAIL_FLOOR {
            0
        } else if feedback >= 1.0 {
            return 0;
        } else {
            (TAIL_FLOOR.ln() / feedback.ln()).ceil() as usize
        };
        delay * (passes + 1)
    }
}
