//! Mixer bus - per-deck effective output from deck + mixer state
//!
//! The mixer owns the cross-deck controls (crossfader, master volume,
//! master pitch, the follow-sync assignment) and computes each deck's
//! effective loudness. Tone passes through the parameter math
//! untouched: the mixer balances levels, it never reshapes EQ/filter.

use std::time::{Duration, Instant};

use crate::engine::deck::DeckState;
use crate::params::{crossfade_gains, eq_db, eq_gain, filter_cutoff, FilterSpec};
use crate::types::{DeckId, NUM_DECKS};

/// Gain multiplier applied while a deck's reverb-exit flag is set
pub const REVERB_EXIT_DUCK: f32 = 0.35;

/// How long the reverb-exit duck holds before self-clearing
pub const REVERB_EXIT_HOLD: Duration = Duration::from_millis(700);

/// Cross-deck mixer state
#[derive(Debug)]
pub struct MixerState {
    /// Crossfader position (-1 = full A, 1 = full B)
    crossfader: f32,
    /// Master volume (0..1)
    master_volume: f32,
    /// Master pitch knob (0..1, 0.5 = no shift)
    master_pitch: f32,
    /// Which deck's tempo follows the other, if any
    ///
    /// A single optional field instead of two booleans: the mutual
    /// exclusion invariant cannot be misrepresented.
    follow: Option<DeckId>,
    /// Per-deck reverb-exit duck deadlines
    reverb_exit: [Option<Instant>; NUM_DECKS],
}

impl Default for MixerState {
    fn default() -> Self {
        Self {
            crossfader: 0.0,
            master_volume: 1.0,
            master_pitch: 0.5,
            follow: None,
            reverb_exit: [None; NUM_DECKS],
        }
    }
}

impl MixerState {
    /// Create a mixer with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Crossfader position (-1..1)
    pub fn crossfader(&self) -> f32 {
        self.crossfader
    }

    /// Set the crossfader position
    pub fn set_crossfader(&mut self, value: f32) {
        self.crossfader = value.clamp(-1.0, 1.0);
    }

    /// Master volume (0..1)
    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// Set the master volume
    pub fn set_master_volume(&mut self, value: f32) {
        self.master_volume = value.clamp(0.0, 1.0);
    }

    /// Master pitch knob position (0..1)
    pub fn master_pitch(&self) -> f32 {
        self.master_pitch
    }

    /// Set the master pitch knob position
    pub fn set_master_pitch(&mut self, value: f32) {
        self.master_pitch = value.clamp(0.0, 1.0);
    }

    /// Which deck follows the other's tempo, if any
    pub fn follow(&self) -> Option<DeckId> {
        self.follow
    }

    /// Enable or disable follow-sync for a deck
    ///
    /// Enabling on one deck structurally clears the other: there is
    /// only one slot.
    pub fn set_follow(&mut self, deck: DeckId, enabled: bool) {
        let next = if enabled {
            Some(deck)
        } else if self.follow == Some(deck) {
            None
        } else {
            self.follow
        };
        if next != self.follow {
            log::info!(
                "mixer: follow-sync -> {}",
                next.map(|d| d.name()).unwrap_or("off")
            );
            self.follow = next;
        }
    }

    /// Start the reverb-exit duck for a deck
    pub fn flag_reverb_exit(&mut self, deck: DeckId, now: Instant) {
        self.reverb_exit[deck.index()] = Some(now + REVERB_EXIT_HOLD);
        log::debug!("mixer: reverb-exit duck on deck {}", deck);
    }

    /// Whether a deck's reverb-exit duck is currently held
    pub fn reverb_exit_active(&self, deck: DeckId, now: Instant) -> bool {
        matches!(self.reverb_exit[deck.index()], Some(deadline) if now < deadline)
    }

    /// Clear expired duck deadlines (idempotent, called from the tick)
    pub fn tick(&mut self, now: Instant) {
        for slot in &mut self.reverb_exit {
            if matches!(slot, Some(deadline) if now >= *deadline) {
                *slot = None;
            }
        }
    }

    /// This deck's crossfade share, honoring a cue preview override
    pub fn crossfade_share(&self, deck: DeckId, cue_override: Option<DeckId>) -> f32 {
        if let Some(cue) = cue_override {
            return if cue == deck { 1.0 } else { 0.0 };
        }
        let (a, b) = crossfade_gains(self.crossfader);
        match deck {
            DeckId::A => a,
            DeckId::B => b,
        }
    }
}

/// Per-deck effective output computed by the mixer bus
#[derive(Debug, Clone, Copy)]
pub struct EffectiveOutput {
    /// Combined loudness: trim x fader x master x crossfade x duck
    pub gain: f32,
    /// Input-stage gain for the sample chain (trim only)
    pub trim_gain: f32,
    /// Output-stage gain for the sample chain (everything after trim)
    pub post_gain: f32,
    /// EQ as linear gains (pattern backend)
    pub eq_gain: [f32; 3],
    /// EQ in decibels (shelf/peak chain)
    pub eq_db: [f32; 3],
    /// Resolved filter setting
    pub filter: FilterSpec,
}

/// Compute a deck's effective output from deck + mixer state
pub fn compute_effective(
    deck: &DeckState,
    mixer: &MixerState,
    cue_override: Option<DeckId>,
    now: Instant,
) -> EffectiveOutput {
    let share = mixer.crossfade_share(deck.id(), cue_override);
    let duck = if mixer.reverb_exit_active(deck.id(), now) {
        REVERB_EXIT_DUCK
    } else {
        1.0
    };

    let trim_gain = deck.trim();
    let post_gain = deck.fader() * mixer.master_volume() * share * duck;
    let eq = deck.eq_positions();

    EffectiveOutput {
        gain: trim_gain * post_gain,
        trim_gain,
        post_gain,
        eq_gain: [eq_gain(eq[0]), eq_gain(eq[1]), eq_gain(eq[2])],
        eq_db: [eq_db(eq[0]), eq_db(eq[1]), eq_db(eq[2])],
        filter: filter_cutoff(deck.filter()),
    }
}
