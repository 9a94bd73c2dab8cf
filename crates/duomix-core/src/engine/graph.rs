//! Sample chain - persistent per-deck processing graph
//!
//! Each sample-backed deck owns one fixed chain: input gain, low shelf,
//! mid peak, high shelf, morphing filter, output gain. Control changes
//! never step parameters directly; they set targets that ramp with a
//! short one-pole smoother so the chain stays click-free. The chain is
//! the only component that touches playback state - everyone else only
//! computes intended values.

use std::sync::Arc;

use crate::engine::mixer::EffectiveOutput;
use crate::library::ItemId;
use crate::params::{cents_to_rate, clamp_tempo_ratio, FilterSpec};
use crate::types::{AudioClip, DeckId, Sample, StereoBuffer, StereoSample, DEFAULT_SAMPLE_RATE};

/// Parameter ramp time constant in seconds
pub const SMOOTH_TIME_SEC: f32 = 0.010;

/// EQ band centers for the shelf/peak chain
const EQ_LO_FREQ: f32 = 100.0;
const EQ_MID_FREQ: f32 = 1000.0;
const EQ_HI_FREQ: f32 = 10000.0;
const EQ_MID_Q: f32 = 0.7;

/// Neutral cutoffs used while the morphing filter is bypassed
const LP_NEUTRAL_HZ: f32 = 20000.0;
const HP_NEUTRAL_HZ: f32 = 20.0;

/// One-pole parameter smoother
#[derive(Debug, Clone)]
pub struct Smoother {
    current: f32,
    target: f32,
    coeff: f32,
}

impl Smoother {
    /// Create a smoother at the given initial value
    pub fn new(initial: f32, sample_rate: u32) -> Self {
        Self {
            current: initial,
            target: initial,
            coeff: Self::coeff_for(sample_rate),
        }
    }

    fn coeff_for(sample_rate: u32) -> f32 {
        1.0 - (-1.0 / (sample_rate as f32 * SMOOTH_TIME_SEC)).exp()
    }

    /// Rebuild the ramp coefficient for a new sample rate
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.coeff = Self::coeff_for(sample_rate);
    }

    /// Set the ramp target
    pub fn set_target(&mut self, value: f32) {
        self.target = value;
    }

    /// Jump straight to a value (used on load, not during playback)
    pub fn snap(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    /// Current ramp target
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Current smoothed value without advancing
    pub fn value(&self) -> f32 {
        self.current
    }

    /// Advance one sample toward the target
    #[inline]
    pub fn next(&mut self) -> f32 {
        self.current += self.coeff * (self.target - self.current);
        self.current
    }

    /// Advance n samples at once (block-rate parameters)
    pub fn advance(&mut self, samples: usize) -> f32 {
        let keep = (1.0 - self.coeff).powi(samples as i32);
        self.current = self.target + (self.current - self.target) * keep;
        self.current
    }
}

/// Biquad filter state (stereo)
#[derive(Debug, Clone, Default)]
struct BiquadState {
    x1_l: f32, x2_l: f32, y1_l: f32, y2_l: f32,
    x1_r: f32, x2_r: f32, y1_r: f32, y2_r: f32,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input_l: f32, input_r: f32, coeffs: &BiquadCoeffs) -> (f32, f32) {
        let out_l = coeffs.b0 * input_l + coeffs.b1 * self.x1_l + coeffs.b2 * self.x2_l
            - coeffs.a1 * self.y1_l - coeffs.a2 * self.y2_l;
        self.x2_l = self.x1_l;
        self.x1_l = input_l;
        self.y2_l = self.y1_l;
        self.y1_l = out_l;

        let out_r = coeffs.b0 * input_r + coeffs.b1 * self.x1_r + coeffs.b2 * self.x2_r
            - coeffs.a1 * self.y1_r - coeffs.a2 * self.y2_r;
        self.x2_r = self.x1_r;
        self.x1_r = input_r;
        self.y2_r = self.y1_r;
        self.y1_r = out_r;

        (out_l, out_r)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Biquad filter coefficients
#[derive(Debug, Clone)]
struct BiquadCoeffs {
    b0: f32, b1: f32, b2: f32,
    a1: f32, a2: f32,
}

impl BiquadCoeffs {
    /// Low shelf boost/cut at the given frequency
    fn low_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / 2.0 * ((a + 1.0 / a) * (1.0 / 0.9 - 1.0) + 2.0).sqrt();

        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        Self {
            b0: (a * ((a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha)) / a0,
            b1: (2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha)) / a0,
            a1: (-2.0 * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha) / a0,
        }
    }

    /// Peaking EQ at the given frequency
    fn peaking(freq: f32, gain_db: f32, q: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_w0) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha / a) / a0,
        }
    }

    /// High shelf boost/cut at the given frequency
    fn high_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / 2.0 * ((a + 1.0 / a) * (1.0 / 0.9 - 1.0) + 2.0).sqrt();

        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        Self {
            b0: (a * ((a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha)) / a0,
            b1: (-2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha)) / a0,
            a1: (2.0 * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha) / a0,
        }
    }

    /// Passthrough (unity gain, no filtering)
    fn passthrough() -> Self {
        Self { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 }
    }
}

/// Which shelf/peak shape an EQ stage uses
#[derive(Debug, Clone, Copy)]
enum EqShape {
    LowShelf,
    Peak,
    HighShelf,
}

/// One EQ stage: smoothed dB target plus cached coefficients
#[derive(Debug)]
struct EqStage {
    shape: EqShape,
    db: Smoother,
    coeffs: BiquadCoeffs,
    state: BiquadState,
    coeffs_db: f32,
}

impl EqStage {
    fn new(shape: EqShape, sample_rate: u32) -> Self {
        Self {
            shape,
            db: Smoother::new(0.0, sample_rate),
            coeffs: BiquadCoeffs::passthrough(),
            state: BiquadState::default(),
            coeffs_db: 0.0,
        }
    }

    /// Advance the smoothed dB over the block and refresh coefficients
    fn update_block(&mut self, block_len: usize, sample_rate: f32) {
        let db = self.db.advance(block_len);
        if (db - self.coeffs_db).abs() < 0.05 {
            return;
        }
        self.coeffs_db = db;
        self.coeffs = if db.abs() < 0.1 {
            BiquadCoeffs::passthrough()
        } else {
            match self.shape {
                EqShape::LowShelf => BiquadCoeffs::low_shelf(EQ_LO_FREQ, db, sample_rate),
                EqShape::Peak => BiquadCoeffs::peaking(EQ_MID_FREQ, db, EQ_MID_Q, sample_rate),
                EqShape::HighShelf => BiquadCoeffs::high_shelf(EQ_HI_FREQ, db, sample_rate),
            }
        };
    }

    #[inline]
    fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        self.state.process(left, right, &self.coeffs)
    }

    fn reset(&mut self) {
        self.state.reset();
    }
}

/// Continuous lowpass/highpass morph
///
/// Both one-pole sections always run; bypass just ramps the cutoffs to
/// their neutral extremes, so engaging the filter never clicks.
#[derive(Debug)]
struct MorphFilter {
    lp_cutoff: Smoother,
    hp_cutoff: Smoother,
    lp_l: f32,
    lp_r: f32,
    hp_l: f32,
    hp_r: f32,
    sample_rate: f32,
}

impl MorphFilter {
    fn new(sample_rate: u32) -> Self {
        Self {
            lp_cutoff: Smoother::new(LP_NEUTRAL_HZ, sample_rate),
            hp_cutoff: Smoother::new(HP_NEUTRAL_HZ, sample_rate),
            lp_l: 0.0,
            lp_r: 0.0,
            hp_l: 0.0,
            hp_r: 0.0,
            sample_rate: sample_rate as f32,
        }
    }

    fn set_spec(&mut self, spec: FilterSpec) {
        let (lp, hp) = match spec {
            FilterSpec::Bypass => (LP_NEUTRAL_HZ, HP_NEUTRAL_HZ),
            FilterSpec::Lowpass { cutoff_hz } => (cutoff_hz, HP_NEUTRAL_HZ),
            FilterSpec::Highpass { cutoff_hz } => (LP_NEUTRAL_HZ, cutoff_hz),
        };
        self.lp_cutoff.set_target(lp);
        self.hp_cutoff.set_target(hp);
    }

    fn cutoff_to_coeff(&self, cutoff: f32) -> f32 {
        let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff);
        let dt = 1.0 / self.sample_rate;
        dt / (rc + dt)
    }

    fn process_block(&mut self, samples: &mut [StereoSample]) {
        let lp_cutoff = self.lp_cutoff.advance(samples.len());
        let hp_cutoff = self.hp_cutoff.advance(samples.len());
        let lp_coeff = self.cutoff_to_coeff(lp_cutoff);
        let hp_coeff = self.cutoff_to_coeff(hp_cutoff);

        for sample in samples.iter_mut() {
            let mut left = sample.left;
            let mut right = sample.right;

            self.lp_l += lp_coeff * (left - self.lp_l);
            self.lp_r += lp_coeff * (right - self.lp_r);
            left = self.lp_l;
            right = self.lp_r;

            self.hp_l += hp_coeff * (left - self.hp_l);
            self.hp_r += hp_coeff * (right - self.hp_r);
            left -= self.hp_l;
            right -= self.hp_r;

            *sample = StereoSample::new(left, right);
        }
    }

    fn reset(&mut self) {
        self.lp_l = 0.0;
        self.lp_r = 0.0;
        self.hp_l = 0.0;
        self.hp_r = 0.0;
    }
}

/// Active loop region in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopRegion {
    pub start_sec: f64,
    pub end_sec: f64,
}

/// Per-deck sample playback chain
pub struct SamplerChain {
    deck: DeckId,
    clip: Option<Arc<AudioClip>>,
    loaded_item: Option<ItemId>,
    sample_rate: u32,
    /// Playhead in clip frames (fractional for rate conversion)
    position: f64,
    playing: bool,
    rate: f64,
    detune_cents: f64,
    loop_region: Option<LoopRegion>,
    input_gain: Smoother,
    eq_low: EqStage,
    eq_mid: EqStage,
    eq_high: EqStage,
    filter: MorphFilter,
    output_gain: Smoother,
}

impl SamplerChain {
    /// Create an empty chain for a deck
    pub fn new(deck: DeckId) -> Self {
        let sr = DEFAULT_SAMPLE_RATE;
        Self {
            deck,
            clip: None,
            loaded_item: None,
            sample_rate: sr,
            position: 0.0,
            playing: false,
            rate: 1.0,
            detune_cents: 0.0,
            loop_region: None,
            input_gain: Smoother::new(1.0, sr),
            eq_low: EqStage::new(EqShape::LowShelf, sr),
            eq_mid: EqStage::new(EqShape::Peak, sr),
            eq_high: EqStage::new(EqShape::HighShelf, sr),
            filter: MorphFilter::new(sr),
            output_gain: Smoother::new(1.0, sr),
        }
    }

    // --- Transport ---

    /// Load a clip, or unload with None
    ///
    /// Loading the already-loaded item id is a no-op so repeated load
    /// requests cannot restart playback. Any load clears position and
    /// loop state.
    pub fn load(&mut self, source: Option<(ItemId, Arc<AudioClip>)>) {
        match source {
            Some((item, clip)) => {
                if self.loaded_item == Some(item) {
                    log::debug!("graph {}: item {} already loaded", self.deck, item);
                    return;
                }
                self.sample_rate = clip.sample_rate;
                self.input_gain.set_sample_rate(clip.sample_rate);
                self.output_gain.set_sample_rate(clip.sample_rate);
                log::info!(
                    "graph {}: loaded item {} ({:.1}s @ {} Hz)",
                    self.deck,
                    item,
                    clip.duration_sec(),
                    clip.sample_rate
                );
                self.clip = Some(clip);
                self.loaded_item = Some(item);
            }
            None => {
                if self.clip.is_some() {
                    log::info!("graph {}: unloaded", self.deck);
                }
                self.clip = None;
                self.loaded_item = None;
            }
        }
        self.position = 0.0;
        self.playing = false;
        self.loop_region = None;
        self.eq_low.reset();
        self.eq_mid.reset();
        self.eq_high.reset();
        self.filter.reset();
    }

    /// Whether a clip is loaded
    pub fn is_loaded(&self) -> bool {
        self.clip.is_some()
    }

    /// Id of the loaded item, if any
    pub fn loaded_item(&self) -> Option<ItemId> {
        self.loaded_item
    }

    /// Start playback (no-op without a clip)
    pub fn play(&mut self) {
        if self.clip.is_some() {
            self.playing = true;
        }
    }

    /// Pause playback
    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Whether the chain is currently playing
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Jump to a position in seconds, clamped to the clip
    pub fn seek_sec(&mut self, seconds: f64) {
        let Some(clip) = &self.clip else {
            return;
        };
        let max_frame = clip.buffer.len().saturating_sub(1) as f64;
        self.position = (seconds.max(0.0) * self.sample_rate as f64).min(max_frame);
    }

    /// Shift the playhead by a signed number of seconds
    pub fn nudge_sec(&mut self, delta: f64) {
        let now = self.current_time_sec();
        self.seek_sec(now + delta);
    }

    /// Set the playback rate (tempo ratio)
    pub fn set_playback_rate(&mut self, rate: f64) {
        self.rate = clamp_tempo_ratio(rate);
    }

    /// Set the transient detune in cents
    pub fn set_detune_cents(&mut self, cents: f64) {
        self.detune_cents = cents;
    }

    /// Set or clear the loop region
    pub fn set_loop(&mut self, region: Option<LoopRegion>) {
        if let Some(r) = &region {
            if r.end_sec <= r.start_sec {
                return;
            }
        }
        self.loop_region = region;
    }

    /// Active loop region
    pub fn loop_region(&self) -> Option<LoopRegion> {
        self.loop_region
    }

    /// Playhead position in seconds
    pub fn current_time_sec(&self) -> f64 {
        self.position / self.sample_rate as f64
    }

    /// Duration of the loaded clip in seconds (0 when empty)
    pub fn duration_sec(&self) -> f64 {
        self.clip.as_ref().map(|c| c.duration_sec()).unwrap_or(0.0)
    }

    // --- Parameter updates ---

    /// Push new smoothed targets from the mixer bus
    pub fn set_targets(&mut self, out: &EffectiveOutput) {
        self.input_gain.set_target(out.trim_gain);
        self.output_gain.set_target(out.post_gain);
        self.eq_low.db.set_target(out.eq_db[0]);
        self.eq_mid.db.set_target(out.eq_db[1]);
        self.eq_high.db.set_target(out.eq_db[2]);
        self.filter.set_spec(out.filter);
    }

    // --- Processing ---

    /// Render one block into the output buffer
    ///
    /// Fills with silence when stopped or unloaded. Advances the
    /// playhead at rate x detune, wrapping through the loop region and
    /// stopping at the end of the clip.
    pub fn process(&mut self, output: &mut StereoBuffer) {
        output.fill_silence();
        let Some(clip) = self.clip.clone() else {
            return;
        };
        if !self.playing {
            return;
        }

        let frames = clip.buffer.len();
        let advance = self.rate * cents_to_rate(self.detune_cents);
        let loop_frames = self.loop_region.map(|r| {
            (
                r.start_sec * self.sample_rate as f64,
                r.end_sec * self.sample_rate as f64,
            )
        });

        let block_len = output.len();
        self.eq_low.update_block(block_len, self.sample_rate as f32);
        self.eq_mid.update_block(block_len, self.sample_rate as f32);
        self.eq_high.update_block(block_len, self.sample_rate as f32);

        for sample in output.iter_mut() {
            if self.position >= frames as f64 {
                self.playing = false;
                log::debug!("graph {}: end of clip", self.deck);
                break;
            }

            // Linear interpolation read
            let base = self.position.floor() as usize;
            let frac = (self.position - base as f64) as Sample;
            let s0 = clip.buffer[base];
            let s1 = if base + 1 < frames { clip.buffer[base + 1] } else { s0 };
            let mut left = s0.left + (s1.left - s0.left) * frac;
            let mut right = s0.right + (s1.right - s0.right) * frac;

            let in_gain = self.input_gain.next();
            left *= in_gain;
            right *= in_gain;

            (left, right) = self.eq_low.process(left, right);
            (left, right) = self.eq_mid.process(left, right);
            (left, right) = self.eq_high.process(left, right);

            let out_gain = self.output_gain.next();
            *sample = StereoSample::new(left * out_gain, right * out_gain);

            self.position += advance;
            if let Some((start, end)) = loop_frames {
                if self.position >= end {
                    self.position = start;
                }
            }
        }

        self.filter.process_block(output.as_mut_slice());
    }
}
