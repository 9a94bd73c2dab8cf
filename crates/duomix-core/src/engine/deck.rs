//! Deck state - per-deck control model
//!
//! A deck holds no audio resources. It is the mutable control state the
//! mixer bus, sync engine, compiler, and sample chain all read from:
//! source descriptor, transport flag, tempo ratio, tone positions, and
//! the pad-mode state machine data. Pad press/release orchestration
//! lives in the engine because it needs the library and the chain; the
//! setters here only normalize and store.

use std::time::{Duration, Instant};

use crate::library::SourceDescriptor;
use crate::params::clamp_tempo_ratio;
use crate::types::{DeckId, EqBand, FxKind, PadMode, NUM_PADS};

/// Number of hot cue slots per deck
pub const HOTCUE_SLOTS: usize = 4;

/// Transient detune per pad while pitch-play is held, in cents
pub const PITCH_PLAY_CENTS: [f64; NUM_PADS] = [0.0, 300.0, 700.0, 1200.0];

/// Loop length per pad, in beats
pub const LOOP_PAD_BEATS: [f64; NUM_PADS] = [1.0, 2.0, 4.0, 8.0];

/// Maximum time a pitch-play hold stays active without a release event
pub const PITCH_PLAY_MAX_HOLD: Duration = Duration::from_secs(8);

/// Active pitch-play hold state
#[derive(Debug, Clone, Copy)]
pub struct PitchPlay {
    /// Pad index being held
    pub pad: usize,
    /// Hold expires at this instant even without a release
    pub deadline: Instant,
}

/// Per-deck control state
#[derive(Debug)]
pub struct DeckState {
    id: DeckId,
    source: SourceDescriptor,
    playing: bool,
    tempo_ratio: f64,
    trim: f32,
    fader: f32,
    eq: [f32; 3],
    filter: f32,
    pad_mode: PadMode,
    hotcues: [Option<f64>; HOTCUE_SLOTS],
    active_loop_pad: Option<usize>,
    sampler_pads: [bool; NUM_PADS],
    fx_pads: [bool; NUM_PADS],
    fx_assign: [FxKind; NUM_PADS],
    shift_held: bool,
    pitch_play: Option<PitchPlay>,
}

impl DeckState {
    /// Create a deck pointing at the given source
    pub fn new(id: DeckId, source: SourceDescriptor) -> Self {
        Self {
            id,
            source,
            playing: false,
            tempo_ratio: 1.0,
            trim: 1.0,
            fader: 1.0,
            eq: [0.5; 3],
            filter: 0.5,
            pad_mode: PadMode::default(),
            hotcues: [None; HOTCUE_SLOTS],
            active_loop_pad: None,
            sampler_pads: [false; NUM_PADS],
            fx_pads: [false; NUM_PADS],
            fx_assign: [FxKind::default(); NUM_PADS],
            shift_held: false,
            pitch_play: None,
        }
    }

    /// Deck identifier
    pub fn id(&self) -> DeckId {
        self.id
    }

    // --- Source and transport ---

    /// Current source descriptor
    pub fn source(&self) -> SourceDescriptor {
        self.source
    }

    /// Point the deck at a new source
    pub fn set_source(&mut self, source: SourceDescriptor) {
        log::info!("deck {}: source -> item {}", self.id, source.item_id);
        self.source = source;
    }

    /// Whether the deck is playing
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Set the playing flag
    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    /// Flip the playing flag, returning the new value
    pub fn toggle_play(&mut self) -> bool {
        self.playing = !self.playing;
        self.playing
    }

    // --- Tempo ---

    /// Current tempo ratio
    pub fn tempo_ratio(&self) -> f64 {
        self.tempo_ratio
    }

    /// Set the tempo ratio, normalized through the clamp
    pub fn set_tempo_ratio(&mut self, ratio: f64) {
        self.tempo_ratio = clamp_tempo_ratio(ratio);
    }

    // --- Tone ---

    /// Trim gain (0..1)
    pub fn trim(&self) -> f32 {
        self.trim
    }

    /// Set trim gain
    pub fn set_trim(&mut self, value: f32) {
        self.trim = value.clamp(0.0, 1.0);
    }

    /// Line fader (0..1)
    pub fn fader(&self) -> f32 {
        self.fader
    }

    /// Set line fader
    pub fn set_fader(&mut self, value: f32) {
        self.fader = value.clamp(0.0, 1.0);
    }

    /// EQ band position (0..1, 0.5 = unity)
    pub fn eq(&self, band: EqBand) -> f32 {
        self.eq[band.index()]
    }

    /// All three EQ positions in low/mid/high order
    pub fn eq_positions(&self) -> [f32; 3] {
        self.eq
    }

    /// Set an EQ band position
    pub fn set_eq(&mut self, band: EqBand, value: f32) {
        self.eq[band.index()] = value.clamp(0.0, 1.0);
    }

    /// Filter knob position (0..1, 0.5 = bypass)
    pub fn filter(&self) -> f32 {
        self.filter
    }

    /// Set the filter knob position
    pub fn set_filter(&mut self, value: f32) {
        self.filter = value.clamp(0.0, 1.0);
    }

    // --- Pad machine ---

    /// Current pad mode
    pub fn pad_mode(&self) -> PadMode {
        self.pad_mode
    }

    /// Switch pad mode, clearing all pad toggle and assignment state
    pub fn set_pad_mode(&mut self, mode: PadMode) {
        if mode == self.pad_mode {
            return;
        }
        log::info!("deck {}: pad mode -> {}", self.id, mode.name());
        self.pad_mode = mode;
        self.sampler_pads = [false; NUM_PADS];
        self.fx_pads = [false; NUM_PADS];
        self.fx_assign = [FxKind::default(); NUM_PADS];
        self.active_loop_pad = None;
        self.pitch_play = None;
    }

    /// Hot cue slot contents in seconds
    pub fn hotcue(&self, slot: usize) -> Option<f64> {
        self.hotcues.get(slot).copied().flatten()
    }

    /// Store a hot cue position
    pub fn set_hotcue(&mut self, slot: usize, position_sec: f64) {
        if let Some(cue) = self.hotcues.get_mut(slot) {
            *cue = Some(position_sec);
        }
    }

    /// Clear all hot cues (used when the source changes)
    pub fn clear_hotcues(&mut self) {
        self.hotcues = [None; HOTCUE_SLOTS];
    }

    /// Pad index of the active loop, if any
    pub fn active_loop_pad(&self) -> Option<usize> {
        self.active_loop_pad
    }

    /// Record which pad owns the active loop
    pub fn set_active_loop_pad(&mut self, pad: Option<usize>) {
        self.active_loop_pad = pad;
    }

    /// Whether a sampler pad trigger is active
    pub fn sampler_pad(&self, pad: usize) -> bool {
        self.sampler_pads.get(pad).copied().unwrap_or(false)
    }

    /// All sampler pad flags
    pub fn sampler_pads(&self) -> [bool; NUM_PADS] {
        self.sampler_pads
    }

    /// Toggle a sampler pad trigger, returning the new state
    pub fn toggle_sampler_pad(&mut self, pad: usize) -> bool {
        if pad >= NUM_PADS {
            return false;
        }
        self.sampler_pads[pad] = !self.sampler_pads[pad];
        self.sampler_pads[pad]
    }

    /// Whether an fx pad is active
    pub fn fx_pad(&self, pad: usize) -> bool {
        self.fx_pads.get(pad).copied().unwrap_or(false)
    }

    /// All fx pad flags
    pub fn fx_pads(&self) -> [bool; NUM_PADS] {
        self.fx_pads
    }

    /// Toggle an fx pad, returning the new state
    pub fn toggle_fx_pad(&mut self, pad: usize) -> bool {
        if pad >= NUM_PADS {
            return false;
        }
        self.fx_pads[pad] = !self.fx_pads[pad];
        self.fx_pads[pad]
    }

    /// Effect currently assigned to a pad
    pub fn fx_assignment(&self, pad: usize) -> FxKind {
        self.fx_assign.get(pad).copied().unwrap_or_default()
    }

    /// Advance a pad's effect assignment through the fixed cycle
    pub fn cycle_fx_assignment(&mut self, pad: usize) -> FxKind {
        if pad >= NUM_PADS {
            return FxKind::default();
        }
        self.fx_assign[pad] = self.fx_assign[pad].next();
        log::debug!(
            "deck {}: fx pad {} -> {}",
            self.id,
            pad,
            self.fx_assign[pad].name()
        );
        self.fx_assign[pad]
    }

    /// Whether shift is held
    pub fn shift_held(&self) -> bool {
        self.shift_held
    }

    /// Set the shift modifier
    pub fn set_shift(&mut self, held: bool) {
        self.shift_held = held;
    }

    /// Active pitch-play hold, if any
    pub fn pitch_play(&self) -> Option<PitchPlay> {
        self.pitch_play
    }

    /// Begin a pitch-play hold on the given pad
    pub fn begin_pitch_play(&mut self, pad: usize, now: Instant) {
        self.pitch_play = Some(PitchPlay {
            pad,
            deadline: now + PITCH_PLAY_MAX_HOLD,
        });
    }

    /// End any pitch-play hold (idempotent)
    pub fn end_pitch_play(&mut self) {
        self.pitch_play = None;
    }
}

/// Snap a loop start to the beat grid
///
/// With a known downbeat the start rounds to the nearest beat boundary
/// relative to it. Without one, elapsed time itself is the grid and the
/// start floors to the previous boundary.
pub fn quantized_loop_start(now_sec: f64, beat_len_sec: f64, downbeat_sec: Option<f64>) -> f64 {
    if beat_len_sec <= 0.0 {
        return now_sec.max(0.0);
    }
    let start = match downbeat_sec {
        Some(downbeat) => downbeat + ((now_sec - downbeat) / beat_len_sec).round() * beat_len_sec,
        None => now_sec - now_sec.rem_euclid(beat_len_sec),
    };
    start.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_deck() -> DeckState {
        DeckState::new(DeckId::A, SourceDescriptor::new(0))
    }

    #[test]
    fn test_tempo_ratio_clamped() {
        let mut deck = test_deck();
        deck.set_tempo_ratio(3.5);
        assert_eq!(deck.tempo_ratio(), 2.0);
        deck.set_tempo_ratio(0.1);
        assert_eq!(deck.tempo_ratio(), 0.5);
        deck.set_tempo_ratio(1.25);
        assert_eq!(deck.tempo_ratio(), 1.25);
    }

    #[test]
    fn test_pad_mode_switch_clears_toggles() {
        let mut deck = test_deck();
        deck.set_pad_mode(PadMode::Fx);
        deck.toggle_fx_pad(1);
        deck.cycle_fx_assignment(1);
        assert!(deck.fx_pad(1));
        assert_eq!(deck.fx_assignment(1), FxKind::Echo);

        deck.set_pad_mode(PadMode::Sampler);
        assert!(!deck.fx_pad(1));
        assert_eq!(deck.fx_assignment(1), FxKind::Reverb);
        deck.toggle_sampler_pad(2);
        assert!(deck.sampler_pad(2));

        deck.set_pad_mode(PadMode::Loop);
        assert!(!deck.sampler_pad(2));
    }

    #[test]
    fn test_hotcues_survive_mode_switch() {
        let mut deck = test_deck();
        deck.set_hotcue(0, 12.5);
        deck.set_pad_mode(PadMode::Loop);
        deck.set_pad_mode(PadMode::Hotcue);
        assert_eq!(deck.hotcue(0), Some(12.5));
    }

    #[test]
    fn test_out_of_range_pads_noop() {
        let mut deck = test_deck();
        assert!(!deck.toggle_sampler_pad(7));
        assert!(!deck.toggle_fx_pad(99));
        assert_eq!(deck.hotcue(10), None);
    }

    #[test]
    fn test_loop_quantize_modulo_rule() {
        // 10.3s elapsed, 120 BPM (0.5s beats), unknown downbeat: floor to 10.0
        let start = quantized_loop_start(10.3, 0.5, None);
        assert!((start - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_loop_quantize_downbeat_rounds_to_nearest() {
        // Downbeat at 0.25, beat 0.5: boundaries at 0.25, 0.75, 1.25 ...
        let start = quantized_loop_start(1.3, 0.5, Some(0.25));
        assert!((start - 1.25).abs() < 1e-9);
        let start = quantized_loop_start(1.1, 0.5, Some(0.25));
        assert!((start - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_loop_quantize_never_negative() {
        let start = quantized_loop_start(0.1, 0.5, Some(0.25));
        assert!(start >= 0.0);
    }
}
