//! Expression compiler - deck state to pattern program text
//!
//! Generative decks are rendered by an external pattern evaluator. The
//! compiler turns the current deck + mixer state into one declarative
//! program string: base pattern, tempo wrap, filter, parallel EQ
//! sub-bands, loudness, pad voices, and effect wraps. It tracks the
//! last desired and last applied text so unchanged programs never hit
//! the backend twice.

use crate::engine::deck::DeckState;
use crate::engine::mixer::EffectiveOutput;
use crate::library::GenerativeItem;
use crate::params::FilterSpec;
use crate::types::{FxKind, NUM_PADS};

/// Layer the combined program is applied to
pub const PROGRAM_LAYER: &str = "master";

/// Program text used when no deck is audible
pub const SILENCE_PROGRAM: &str = "silence";

/// Decks below this effective gain are dropped from the program
pub const AUDIBLE_GAIN: f32 = 0.001;

/// Tempo ratios within this distance of 1.0 skip the rate wrap
pub const RATE_EPSILON: f64 = 0.01;

/// Cents below this magnitude skip the master pitch wrap
pub const PITCH_EPSILON: f32 = 1.0;

/// One-shot voices stacked in by sampler pads
pub const SAMPLER_VOICES: [&str; NUM_PADS] = [
    "note(\"c2\").s(\"square\").decay(0.08).lpf(150).gain(0.9)",
    "note(\"c3\").s(\"square\").hpf(400).decay(0.06).gain(0.7)",
    "note(\"c6*8\").s(\"pink\").hpf(8000).decay(0.02).gain(0.4)",
    "note(\"c4\").s(\"triangle\").decay(0.3).sustain(0.2).gain(0.5)",
];

/// Wrap a fragment in an fx pad's assigned effect operator
fn fx_wrap(kind: FxKind, fragment: String) -> String {
    match kind {
        FxKind::Reverb => format!("{}.room(0.6)", fragment),
        FxKind::Echo => format!("{}.delay(0.5)", fragment),
        FxKind::Roll => format!("{}.ply(2)", fragment),
        FxKind::Filter => format!("{}.lpf(600)", fragment),
    }
}

/// Compiler state: desired vs applied program text
#[derive(Debug, Default)]
pub struct PatternCompiler {
    desired: String,
    applied: Option<String>,
}

impl PatternCompiler {
    /// Create a compiler with no program yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one deck's program fragment
    ///
    /// Returns None when the deck is stopped or inaudible; the deck
    /// then contributes nothing to the combined program.
    pub fn deck_fragment(
        deck: &DeckState,
        item: &GenerativeItem,
        out: &EffectiveOutput,
    ) -> Option<String> {
        if !deck.is_playing() || out.gain <= AUDIBLE_GAIN {
            return None;
        }

        // Base pattern plus any sampler pad voices, as one parallel stack
        let mut parts = vec![item.program.clone()];
        for (pad, voice) in SAMPLER_VOICES.iter().enumerate() {
            if deck.sampler_pad(pad) {
                parts.push((*voice).to_string());
            }
        }
        let mut fragment = if parts.len() > 1 {
            format!("stack({})", parts.join(", "))
        } else {
            parts.remove(0)
        };

        // Tempo wrap
        let ratio = deck.tempo_ratio();
        if (ratio - 1.0).abs() > RATE_EPSILON {
            fragment = format!("{}.fast({:.3})", fragment, ratio);
        }

        // Single-sided filter
        match out.filter {
            FilterSpec::Bypass => {}
            FilterSpec::Lowpass { cutoff_hz } => {
                fragment = format!("{}.lpf({:.0})", fragment, cutoff_hz);
            }
            FilterSpec::Highpass { cutoff_hz } => {
                fragment = format!("{}.hpf({:.0})", fragment, cutoff_hz);
            }
        }

        // EQ as three parallel weighted sub-band copies, only when a
        // band actually deviates from unity
        let [low, mid, high] = out.eq_gain;
        if low != 1.0 || mid != 1.0 || high != 1.0 {
            fragment = format!(
                "stack({f}.lpf(200).gain({:.3}), {f}.bandf(1000).gain({:.3}), {f}.hpf(4000).gain({:.3}))",
                low,
                mid,
                high,
                f = fragment
            );
        }

        // Final loudness
        fragment = format!("{}.gain({:.3})", fragment, out.gain);

        // Effect wraps from active fx pads, in pad order
        for pad in 0..NUM_PADS {
            if deck.fx_pad(pad) {
                fragment = fx_wrap(deck.fx_assignment(pad), fragment);
            }
        }

        Some(fragment)
    }

    /// Combine deck fragments and the master pitch into one program
    pub fn compose(fragments: &[String], master_pitch_cents: f32) -> String {
        let mut program = match fragments.len() {
            0 => SILENCE_PROGRAM.to_string(),
            1 => fragments[0].clone(),
            _ => format!("stack({})", fragments.join(", ")),
        };

        if master_pitch_cents.abs() >= PITCH_EPSILON && program != SILENCE_PROGRAM {
            program = format!("({}).transpose({:.2})", program, master_pitch_cents / 100.0);
        }

        program
    }

    /// Store the newly computed program text as desired
    pub fn set_desired(&mut self, program: String) {
        if program != self.desired {
            log::debug!("compiler: program -> {}", program);
        }
        self.desired = program;
    }

    /// The current desired program text
    pub fn desired(&self) -> &str {
        &self.desired
    }

    /// Whether the desired program differs from the last applied one
    pub fn needs_apply(&self) -> bool {
        self.applied.as_deref() != Some(self.desired.as_str())
    }

    /// Record that the desired program reached the backend
    pub fn mark_applied(&mut self) {
        self.applied = Some(self.desired.clone());
    }
}
