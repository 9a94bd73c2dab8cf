//! MixEngine - the console control plane
//!
//! Owns the library, both decks, the mixer, the per-deck sample chains,
//! the expression compiler, and the recompute scheduler. Every control
//! event enters through a method here; the engine normalizes it into
//! deck/mixer state, fans the result out to the pattern compiler and
//! the sample chains, and keeps the two backends consistent under the
//! one shared model.

use std::sync::Arc;
use std::time::Instant;

use crate::backend::BackendResult;
use crate::engine::compiler::{PatternCompiler, PROGRAM_LAYER};
use crate::engine::deck::{
    quantized_loop_start, DeckState, LOOP_PAD_BEATS, PITCH_PLAY_CENTS,
};
use crate::engine::graph::{LoopRegion, SamplerChain};
use crate::engine::mixer::{compute_effective, MixerState};
use crate::engine::schedule::RecomputeScheduler;
use crate::engine::sync::{
    beat_phase, choose_master, match_ratio, match_status, phase_nudge_sec, sync_ratio,
    SyncResult, MATCH_TOLERANCE,
};
use crate::library::{parse_beatgrid, ItemId, Library, LibraryItem, SourceDescriptor};
use crate::params::master_pitch_cents;
use crate::session::AudioSession;
use crate::types::{
    AudioClip, DeckId, EqBand, FxKind, PadMode, StereoBuffer, DEFAULT_BPM, NUM_DECKS, NUM_PADS,
};

/// Beats per bar for the slicer pads
const BEATS_PER_BAR: f64 = 4.0;

/// Flattened view of a deck's source, safe to hold across mutations
#[derive(Debug, Clone)]
struct SourceInfo {
    id: ItemId,
    bpm: Option<f64>,
    downbeat_sec: Option<f64>,
    clip: Option<Arc<AudioClip>>,
}

impl SourceInfo {
    fn is_sampled(&self) -> bool {
        self.clip.is_some()
    }

    fn native_bpm(&self) -> f64 {
        self.bpm.unwrap_or(DEFAULT_BPM)
    }
}

/// Read-only per-deck status for displays
#[derive(Debug, Clone)]
pub struct DeckSnapshot {
    pub id: DeckId,
    pub item_name: String,
    pub playing: bool,
    pub tempo_ratio: f64,
    pub effective_bpm: f64,
    pub gain: f32,
    pub pad_mode: PadMode,
    pub position_sec: f64,
    pub duration_sec: f64,
    pub loop_region: Option<LoopRegion>,
}

/// Read-only engine status for displays
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub decks: Vec<DeckSnapshot>,
    pub crossfader: f32,
    pub master_volume: f32,
    pub follow: Option<DeckId>,
    pub program: String,
}

/// The dual-deck mixing engine
pub struct MixEngine {
    session: AudioSession,
    library: Library,
    decks: [DeckState; NUM_DECKS],
    chains: [SamplerChain; NUM_DECKS],
    mixer: MixerState,
    compiler: PatternCompiler,
    scheduler: RecomputeScheduler,
    cue: Option<DeckId>,
    scratch: StereoBuffer,
}

impl MixEngine {
    /// Create an engine over a session and a populated library
    pub fn new(session: AudioSession, library: Library) -> Self {
        let default_id = library.default_item().map(|item| item.id()).unwrap_or(0);
        Self {
            session,
            library,
            decks: [
                DeckState::new(DeckId::A, SourceDescriptor::new(default_id)),
                DeckState::new(DeckId::B, SourceDescriptor::new(default_id)),
            ],
            chains: [SamplerChain::new(DeckId::A), SamplerChain::new(DeckId::B)],
            mixer: MixerState::new(),
            compiler: PatternCompiler::new(),
            scheduler: RecomputeScheduler::default(),
            cue: None,
            scratch: StereoBuffer::default(),
        }
    }

    /// Run the session's one-time backend initialization
    pub async fn open(&self) -> BackendResult<()> {
        self.session.open().await
    }

    /// Access the library
    pub fn library(&self) -> &Library {
        &self.library
    }

    /// Access a deck's control state
    pub fn deck(&self, id: DeckId) -> &DeckState {
        &self.decks[id.index()]
    }

    /// Access the mixer state
    pub fn mixer(&self) -> &MixerState {
        &self.mixer
    }

    /// Access the session
    pub fn session(&self) -> &AudioSession {
        &self.session
    }

    // --- Internal helpers ---

    fn source_info(&self, deck: DeckId) -> Option<SourceInfo> {
        let descriptor = self.decks[deck.index()].source();
        self.library.resolve(&descriptor).map(|item| match item {
            LibraryItem::Generative(g) => SourceInfo {
                id: g.id,
                bpm: Some(g.bpm),
                downbeat_sec: None,
                clip: None,
            },
            LibraryItem::Sampled(s) => SourceInfo {
                id: s.id,
                bpm: s.bpm,
                downbeat_sec: s.downbeat_sec,
                clip: Some(Arc::clone(&s.clip)),
            },
        })
    }

    fn native_bpm(&self, deck: DeckId) -> f64 {
        self.source_info(deck)
            .map(|info| info.native_bpm())
            .unwrap_or(DEFAULT_BPM)
    }

    fn effective_bpm(&self, deck: DeckId) -> f64 {
        self.native_bpm(deck) * self.decks[deck.index()].tempo_ratio()
    }

    fn mark_dirty(&mut self) {
        self.scheduler.request();
    }

    fn push_targets(&mut self, deck: DeckId, now: Instant) {
        let out = compute_effective(&self.decks[deck.index()], &self.mixer, self.cue, now);
        self.chains[deck.index()].set_targets(&out);
    }

    fn push_all_targets(&mut self, now: Instant) {
        for deck in DeckId::ALL {
            self.push_targets(deck, now);
        }
    }

    fn apply_ratio(&mut self, deck: DeckId, ratio: f64) {
        self.decks[deck.index()].set_tempo_ratio(ratio);
        let stored = self.decks[deck.index()].tempo_ratio();
        self.chains[deck.index()].set_playback_rate(stored);
    }

    /// Re-derive a following deck's ratio after the other deck's
    /// effective tempo changed
    fn propagate_follow(&mut self, changed: DeckId) {
        let Some(follower) = self.mixer.follow() else {
            return;
        };
        if follower == changed {
            return;
        }
        let ratio = sync_ratio(self.effective_bpm(changed), self.native_bpm(follower));
        self.apply_ratio(follower, ratio);
        log::debug!("sync: deck {} follows at ratio {:.3}", follower, ratio);
    }

    // --- Mixer controls ---

    /// Set a deck's trim gain (0..1)
    pub fn set_trim(&mut self, deck: DeckId, value: f32) {
        self.decks[deck.index()].set_trim(value);
        self.push_targets(deck, Instant::now());
        self.mark_dirty();
    }

    /// Set a deck's line fader (0..1)
    pub fn set_fader(&mut self, deck: DeckId, value: f32) {
        self.decks[deck.index()].set_fader(value);
        self.push_targets(deck, Instant::now());
        self.mark_dirty();
    }

    /// Set a deck's EQ band (0..1, 0.5 = unity)
    pub fn set_eq(&mut self, deck: DeckId, band: EqBand, value: f32) {
        self.decks[deck.index()].set_eq(band, value);
        self.push_targets(deck, Instant::now());
        self.mark_dirty();
    }

    /// Set a deck's filter knob (0..1, 0.5 = bypass)
    pub fn set_filter(&mut self, deck: DeckId, value: f32) {
        self.decks[deck.index()].set_filter(value);
        self.push_targets(deck, Instant::now());
        self.mark_dirty();
    }

    /// Set the crossfader (-1..1)
    pub fn set_crossfader(&mut self, value: f32) {
        self.mixer.set_crossfader(value);
        self.push_all_targets(Instant::now());
        self.mark_dirty();
    }

    /// Set the master volume (0..1)
    pub fn set_master_volume(&mut self, value: f32) {
        self.mixer.set_master_volume(value);
        self.push_all_targets(Instant::now());
        self.mark_dirty();
    }

    /// Set the master pitch knob (0..1, 0.5 = no shift)
    pub fn set_master_pitch(&mut self, value: f32) {
        self.mixer.set_master_pitch(value);
        self.mark_dirty();
    }

    /// Select a deck for cue preview, or None for the normal mix
    pub fn set_cue(&mut self, deck: Option<DeckId>) {
        self.cue = deck;
        self.push_all_targets(Instant::now());
        self.mark_dirty();
    }

    /// Set a deck's shift modifier
    pub fn set_shift(&mut self, deck: DeckId, held: bool) {
        self.decks[deck.index()].set_shift(held);
    }

    // --- Tempo and sync ---

    /// Set a deck's tempo ratio, clamped to [0.5, 2.0]
    pub fn set_tempo_ratio(&mut self, deck: DeckId, ratio: f64) {
        self.apply_ratio(deck, ratio);
        self.propagate_follow(deck);
        self.mark_dirty();
    }

    /// Enable or disable follow-sync on a deck
    ///
    /// Enabling snaps the deck to the other's effective tempo right
    /// away and keeps tracking it; only one deck can follow at a time.
    pub fn set_follow(&mut self, deck: DeckId, enabled: bool) {
        self.mixer.set_follow(deck, enabled);
        if enabled {
            let ratio = sync_ratio(self.effective_bpm(deck.other()), self.native_bpm(deck));
            self.apply_ratio(deck, ratio);
            self.mark_dirty();
        }
    }

    /// One-shot tempo match of `deck` to the other deck
    pub fn sync_once(&mut self, deck: DeckId) {
        let ratio = sync_ratio(self.effective_bpm(deck.other()), self.native_bpm(deck));
        log::info!("sync: one-shot deck {} -> ratio {:.3}", deck, ratio);
        self.apply_ratio(deck, ratio);
        self.propagate_follow(deck);
        self.mark_dirty();
    }

    /// Auto beat-match: pick a master, match the slave's tempo, and
    /// phase-align sampled decks
    pub fn auto_beat_match(&mut self) -> SyncResult {
        let now = Instant::now();
        let gain = |deck: DeckId| {
            compute_effective(&self.decks[deck.index()], &self.mixer, self.cue, now).gain
        };
        let master = choose_master(
            self.decks[0].is_playing(),
            self.decks[1].is_playing(),
            gain(DeckId::A),
            gain(DeckId::B),
        );
        let slave = master.other();

        let current = self.decks[slave.index()].tempo_ratio();
        let ratio = match_ratio(self.effective_bpm(master), self.native_bpm(slave), current);
        let changed = (ratio - current).abs() >= MATCH_TOLERANCE;

        if changed {
            self.apply_ratio(slave, ratio);
            self.propagate_follow(slave);
        }

        self.align_phases(master, slave);

        self.mark_dirty();
        let status = match_status(master, slave, ratio, changed);
        log::info!("sync: {}", status);
        SyncResult {
            master,
            slave,
            ratio,
            changed,
            status,
        }
    }

    /// Nudge the slave so both sampled decks share one beat phase
    fn align_phases(&mut self, master: DeckId, slave: DeckId) {
        let (Some(m), Some(s)) = (self.source_info(master), self.source_info(slave)) else {
            return;
        };
        let (Some(m_bpm), Some(m_down)) = (m.bpm, m.downbeat_sec) else {
            return;
        };
        let (Some(s_bpm), Some(s_down)) = (s.bpm, s.downbeat_sec) else {
            return;
        };
        if !m.is_sampled() || !s.is_sampled() {
            return;
        }

        let m_phase = beat_phase(self.chains[master.index()].current_time_sec(), m_down, m_bpm);
        let s_phase = beat_phase(self.chains[slave.index()].current_time_sec(), s_down, s_bpm);
        if let Some(nudge) = phase_nudge_sec(m_phase, s_phase, s_bpm) {
            log::debug!("sync: phase nudge deck {} by {:+.4}s", slave, nudge);
            self.chains[slave.index()].nudge_sec(nudge);
        }
    }

    // --- Source and transport ---

    /// Point a deck at a library item and load it
    pub fn load_source(&mut self, deck: DeckId, item: ItemId) {
        if self.library.get(item).is_none() {
            log::warn!("engine: load of unknown item {} ignored", item);
            return;
        }
        self.decks[deck.index()].set_source(SourceDescriptor::new(item));
        self.decks[deck.index()].clear_hotcues();
        self.decks[deck.index()].set_playing(false);

        let info = self.source_info(deck);
        match info.and_then(|i| i.clip.map(|clip| (i.id, clip))) {
            Some((id, clip)) => self.chains[deck.index()].load(Some((id, clip))),
            None => self.chains[deck.index()].load(None),
        }
        let ratio = self.decks[deck.index()].tempo_ratio();
        self.chains[deck.index()].set_playback_rate(ratio);
        self.propagate_follow(deck);
        self.push_targets(deck, Instant::now());
        self.mark_dirty();
    }

    /// Toggle a deck's transport
    pub fn toggle_play(&mut self, deck: DeckId) {
        let playing = self.decks[deck.index()].toggle_play();
        let sampled = self
            .source_info(deck)
            .map(|info| info.is_sampled())
            .unwrap_or(false);
        if sampled {
            if playing {
                self.chains[deck.index()].play();
            } else {
                self.chains[deck.index()].pause();
            }
            // Playback may refuse without a clip; keep the flag honest
            let actual = self.chains[deck.index()].is_playing();
            self.decks[deck.index()].set_playing(actual);
        }
        self.mark_dirty();
    }

    // --- Pads ---

    /// Switch a deck's pad mode (clears pad toggle/assignment state)
    pub fn set_pad_mode(&mut self, deck: DeckId, mode: PadMode) {
        self.decks[deck.index()].set_pad_mode(mode);
        self.mark_dirty();
    }

    /// Advance a pad's effect assignment
    pub fn cycle_fx_assignment(&mut self, deck: DeckId, pad: usize) -> FxKind {
        let kind = self.decks[deck.index()].cycle_fx_assignment(pad);
        self.mark_dirty();
        kind
    }

    /// Performance pad press
    pub fn press_pad(&mut self, deck: DeckId, pad: usize) {
        if pad >= NUM_PADS {
            return;
        }
        let Some(info) = self.source_info(deck) else {
            return;
        };

        match self.decks[deck.index()].pad_mode() {
            PadMode::Sampler => {
                self.decks[deck.index()].toggle_sampler_pad(pad);
                self.mark_dirty();
            }
            PadMode::Hotcue => {
                if info.is_sampled() {
                    self.hotcue_press_sampled(deck, pad);
                } else {
                    self.hotcue_press_generative(deck, pad);
                }
            }
            PadMode::Loop => self.loop_press(deck, pad, &info),
            PadMode::Fx => {
                if info.is_sampled() {
                    self.slicer_press(deck, pad, &info);
                } else {
                    self.fx_press_generative(deck, pad);
                }
            }
        }
    }

    /// Performance pad release
    pub fn release_pad(&mut self, deck: DeckId, pad: usize) {
        if pad >= NUM_PADS {
            return;
        }
        match self.decks[deck.index()].pad_mode() {
            PadMode::Hotcue => {
                let held = self.decks[deck.index()].pitch_play();
                if matches!(held, Some(pp) if pp.pad == pad) {
                    self.chains[deck.index()].set_detune_cents(0.0);
                    self.decks[deck.index()].end_pitch_play();
                }
            }
            PadMode::Loop => {
                if self.decks[deck.index()].active_loop_pad() == Some(pad) {
                    self.chains[deck.index()].set_loop(None);
                    self.decks[deck.index()].set_active_loop_pad(None);
                    log::debug!("deck {}: loop released", deck);
                }
            }
            PadMode::Sampler | PadMode::Fx => {}
        }
    }

    /// Hotcue pads on a generative deck select catalog entries
    fn hotcue_press_generative(&mut self, deck: DeckId, pad: usize) {
        let Some(item) = self.library.by_index(pad).map(|item| item.id()) else {
            return;
        };
        self.load_source(deck, item);
        self.decks[deck.index()].set_playing(true);
        if self.chains[deck.index()].is_loaded() {
            self.chains[deck.index()].play();
        }
        self.mark_dirty();
    }

    /// Hotcue pads on a sampled deck capture/recall positions
    fn hotcue_press_sampled(&mut self, deck: DeckId, pad: usize) {
        if !self.chains[deck.index()].is_loaded() {
            return;
        }
        match self.decks[deck.index()].hotcue(pad) {
            None => {
                let position = self.chains[deck.index()].current_time_sec();
                self.decks[deck.index()].set_hotcue(pad, position);
                log::debug!("deck {}: hotcue {} set at {:.2}s", deck, pad, position);
            }
            Some(position) => {
                if self.decks[deck.index()].shift_held() {
                    // Pitch-play: transient detune while the pad is held
                    self.chains[deck.index()].set_detune_cents(PITCH_PLAY_CENTS[pad]);
                    self.decks[deck.index()].begin_pitch_play(pad, Instant::now());
                } else {
                    self.chains[deck.index()].seek_sec(position);
                    self.chains[deck.index()].play();
                    self.decks[deck.index()].set_playing(true);
                }
            }
        }
    }

    /// Loop pads set a quantized loop region on sampled decks
    fn loop_press(&mut self, deck: DeckId, pad: usize, info: &SourceInfo) {
        if !info.is_sampled() || !self.chains[deck.index()].is_loaded() {
            return;
        }
        let beat_len = 60.0 / info.native_bpm();
        let now_sec = self.chains[deck.index()].current_time_sec();
        let start = quantized_loop_start(now_sec, beat_len, info.downbeat_sec);
        let length = LOOP_PAD_BEATS[pad] * beat_len;
        self.chains[deck.index()].set_loop(Some(LoopRegion {
            start_sec: start,
            end_sec: start + length,
        }));
        self.decks[deck.index()].set_active_loop_pad(Some(pad));
        log::debug!(
            "deck {}: loop pad {} -> {:.2}s..{:.2}s",
            deck,
            pad,
            start,
            start + length
        );
    }

    /// Fx pads on a sampled deck slice the current bar
    fn slicer_press(&mut self, deck: DeckId, pad: usize, info: &SourceInfo) {
        if !self.chains[deck.index()].is_loaded() {
            return;
        }
        let beat_len = 60.0 / info.native_bpm();
        let bar_len = BEATS_PER_BAR * beat_len;
        let anchor = info.downbeat_sec.unwrap_or(0.0);
        let now_sec = self.chains[deck.index()].current_time_sec();
        let bar_start = anchor + ((now_sec - anchor) / bar_len).floor() * bar_len;
        let target = (bar_start + pad as f64 * beat_len).max(0.0);
        self.chains[deck.index()].seek_sec(target);
        self.chains[deck.index()].play();
        self.decks[deck.index()].set_playing(true);
        log::debug!("deck {}: slice {} -> {:.2}s", deck, pad, target);
    }

    /// Fx pads on a generative deck toggle effect wraps
    fn fx_press_generative(&mut self, deck: DeckId, pad: usize) {
        let active = self.decks[deck.index()].toggle_fx_pad(pad);
        if !active && self.decks[deck.index()].fx_assignment(pad) == FxKind::Reverb {
            // Duck the deck briefly so the reverb tail can drain
            self.mixer.flag_reverb_exit(deck, Instant::now());
            self.push_targets(deck, Instant::now());
        }
        self.mark_dirty();
    }

    // --- Import ---

    /// Decode and add a sampled item to the library
    pub fn import_sample(&mut self, name: &str, bytes: &[u8]) -> Option<ItemId> {
        match self.session.decode(bytes) {
            Ok(clip) => Some(self.library.add_sampled(name.to_string(), Arc::new(clip))),
            Err(e) => {
                log::warn!("engine: import of \"{}\" failed: {}", name, e);
                None
            }
        }
    }

    /// Apply a beatgrid import payload to a library item
    pub fn import_beatgrid(&mut self, item: ItemId, json: &str) -> bool {
        let update = match parse_beatgrid(json) {
            Ok(update) => update,
            Err(e) => {
                log::warn!("engine: beatgrid import rejected: {}", e);
                return false;
            }
        };
        if !self.library.apply_beatgrid(item, &update) {
            return false;
        }
        // A changed native tempo moves effective tempos: re-run follow
        for deck in DeckId::ALL {
            if self.decks[deck.index()].source().item_id == item {
                self.propagate_follow(deck);
            }
        }
        self.mark_dirty();
        true
    }

    // --- Tick and render ---

    /// Advance timed state and run any due recompute pass
    pub fn tick(&mut self, now: Instant) {
        self.mixer.tick(now);

        // Expire pitch-play holds whose release never arrived
        for deck in DeckId::ALL {
            let expired = matches!(
                self.decks[deck.index()].pitch_play(),
                Some(pp) if now >= pp.deadline
            );
            if expired {
                self.chains[deck.index()].set_detune_cents(0.0);
                self.decks[deck.index()].end_pitch_play();
            }
        }

        self.push_all_targets(now);

        if let Some(token) = self.scheduler.poll(now) {
            self.recompute(token, now);
        }
    }

    /// Rebuild the pattern program and apply it if it changed
    fn recompute(&mut self, token: u64, now: Instant) {
        let mut fragments = Vec::new();
        for deck in DeckId::ALL {
            let descriptor = self.decks[deck.index()].source();
            let Some(LibraryItem::Generative(item)) = self.library.resolve(&descriptor) else {
                continue;
            };
            let out = compute_effective(&self.decks[deck.index()], &self.mixer, self.cue, now);
            if let Some(fragment) =
                PatternCompiler::deck_fragment(&self.decks[deck.index()], item, &out)
            {
                fragments.push(fragment);
            }
        }

        let cents = master_pitch_cents(self.mixer.master_pitch());
        let program = PatternCompiler::compose(&fragments, cents);
        self.compiler.set_desired(program);

        // A pass superseded while it ran must not reach the backend
        if !self.scheduler.is_current(token) {
            log::debug!("compiler: pass {} superseded, dropped", token);
            return;
        }
        if !self.compiler.needs_apply() {
            return;
        }
        match self
            .session
            .apply_program(PROGRAM_LAYER, self.compiler.desired())
        {
            Ok(()) => self.compiler.mark_applied(),
            Err(e) => log::warn!("compiler: apply failed: {}", e),
        }
    }

    /// Render one block of the sampled decks into the master bus
    ///
    /// This is the pull point for the external audio callback; it also
    /// advances sample transport, so a headless driver calls it from
    /// the tick loop.
    pub fn render(&mut self, output: &mut StereoBuffer) {
        output.fill_silence();
        if self.scratch.len() != output.len() {
            self.scratch = StereoBuffer::silence(output.len());
        }
        for deck in DeckId::ALL {
            self.chains[deck.index()].process(&mut self.scratch);
            output.add_buffer(&self.scratch);
        }
        // Mirror transport flags for decks whose clip ran out
        for deck in DeckId::ALL {
            if self.chains[deck.index()].is_loaded()
                && !self.chains[deck.index()].is_playing()
                && self.decks[deck.index()].is_playing()
            {
                self.decks[deck.index()].set_playing(false);
                self.mark_dirty();
            }
        }
    }

    /// Read-only status for displays
    pub fn snapshot(&self) -> EngineSnapshot {
        let now = Instant::now();
        let decks = DeckId::ALL
            .iter()
            .map(|&deck| {
                let state = &self.decks[deck.index()];
                let chain = &self.chains[deck.index()];
                let out = compute_effective(state, &self.mixer, self.cue, now);
                DeckSnapshot {
                    id: deck,
                    item_name: self
                        .source_info(deck)
                        .and_then(|info| self.library.get(info.id).map(|i| i.name().to_string()))
                        .unwrap_or_default(),
                    playing: state.is_playing(),
                    tempo_ratio: state.tempo_ratio(),
                    effective_bpm: self.effective_bpm(deck),
                    gain: out.gain,
                    pad_mode: state.pad_mode(),
                    position_sec: chain.current_time_sec(),
                    duration_sec: chain.duration_sec(),
                    loop_region: chain.loop_region(),
                }
            })
            .collect();

        EngineSnapshot {
            decks,
            crossfader: self.mixer.crossfader(),
            master_volume: self.mixer.master_volume(),
            follow: self.mixer.follow(),
            program: self.compiler.desired().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendResult, PatternBackend, SampleDecoder};
    use crate::engine::schedule::DEFAULT_RECOMPUTE_INTERVAL;
    use crate::types::{StereoSample, DEFAULT_SAMPLE_RATE};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingBackend {
        applies: Arc<AtomicUsize>,
    }

    impl PatternBackend for CountingBackend {
        fn initialize(&self) -> BackendResult<()> {
            Ok(())
        }

        fn apply_program(&self, _layer: &str, _program: &str) -> BackendResult<()> {
            self.applies.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct SilenceDecoder;

    impl SampleDecoder for SilenceDecoder {
        fn decode(&self, bytes: &[u8]) -> BackendResult<AudioClip> {
            if bytes.is_empty() {
                return Err(BackendError::Decode("empty input".into()));
            }
            // One minute of silence, enough for transport tests
            Ok(AudioClip::new(
                StereoBuffer::silence(DEFAULT_SAMPLE_RATE as usize * 60),
                DEFAULT_SAMPLE_RATE,
            ))
        }
    }

    fn test_library() -> Library {
        Library::from_catalog(vec![
            (
                "Night Drive".to_string(),
                130.0,
                "note(\"c2*4\").s(\"square\")".to_string(),
            ),
            (
                "Low Tide".to_string(),
                65.0,
                "note(\"c1*2\").s(\"sine\")".to_string(),
            ),
        ])
    }

    async fn open_engine() -> (MixEngine, Arc<AtomicUsize>) {
        let applies = Arc::new(AtomicUsize::new(0));
        let session = AudioSession::new(
            Box::new(CountingBackend {
                applies: Arc::clone(&applies),
            }),
            Box::new(SilenceDecoder),
        );
        let engine = MixEngine::new(session, test_library());
        engine.open().await.unwrap();
        (engine, applies)
    }

    fn run_ticks(engine: &mut MixEngine, count: usize) {
        let mut now = Instant::now();
        for _ in 0..count {
            now += DEFAULT_RECOMPUTE_INTERVAL + Duration::from_millis(1);
            engine.tick(now);
        }
    }

    fn import_and_load(engine: &mut MixEngine, deck: DeckId) -> ItemId {
        let id = engine.import_sample("Field", &[1, 2, 3]).unwrap();
        engine.load_source(deck, id);
        id
    }

    #[tokio::test]
    async fn test_follow_enable_snaps_and_tracks() {
        let (mut engine, _) = open_engine().await;
        // Deck A at 130, deck B native 65
        engine.load_source(DeckId::B, 1);

        engine.set_follow(DeckId::B, true);
        assert_eq!(engine.mixer().follow(), Some(DeckId::B));
        assert_eq!(engine.deck(DeckId::B).tempo_ratio(), 2.0);

        // A's tempo moves, B tracks: 130 * 0.9 = 117 over 65 -> 1.8
        engine.set_tempo_ratio(DeckId::A, 0.9);
        assert!((engine.deck(DeckId::B).tempo_ratio() - 1.8).abs() < 1e-9);

        // Enabling A structurally clears B
        engine.set_follow(DeckId::A, true);
        assert_eq!(engine.mixer().follow(), Some(DeckId::A));
    }

    #[tokio::test]
    async fn test_sync_once_is_single_shot() {
        let (mut engine, _) = open_engine().await;
        engine.load_source(DeckId::B, 1);

        engine.sync_once(DeckId::B);
        assert_eq!(engine.deck(DeckId::B).tempo_ratio(), 2.0);
        assert_eq!(engine.mixer().follow(), None);

        // No tracking afterwards
        engine.set_tempo_ratio(DeckId::A, 0.9);
        assert_eq!(engine.deck(DeckId::B).tempo_ratio(), 2.0);
    }

    #[tokio::test]
    async fn test_auto_beat_match_double_time_edge() {
        let (mut engine, _) = open_engine().await;
        engine.load_source(DeckId::B, 1);
        // A playing makes it the master
        engine.toggle_play(DeckId::A);

        let result = engine.auto_beat_match();
        assert_eq!(result.master, DeckId::A);
        assert_eq!(result.slave, DeckId::B);
        assert_eq!(result.ratio, 2.0);
        assert!(result.changed);

        // Second pass reports already matched
        let result = engine.auto_beat_match();
        assert!(!result.changed);
        assert!(result.status.contains("already matched"));

        // A ratio within 0.0009 of the computed one still counts as matched
        engine.set_tempo_ratio(DeckId::B, 1.9995);
        let result = engine.auto_beat_match();
        assert!(!result.changed);
        assert_eq!(engine.deck(DeckId::B).tempo_ratio(), 1.9995);
    }

    #[tokio::test]
    async fn test_auto_beat_match_gain_tiebreak() {
        let (mut engine, _) = open_engine().await;
        // Neither playing; crossfader hard to B makes B the master
        engine.set_crossfader(1.0);
        let result = engine.auto_beat_match();
        assert_eq!(result.master, DeckId::B);
    }

    #[tokio::test]
    async fn test_identical_program_applied_once() {
        let (mut engine, applies) = open_engine().await;
        engine.toggle_play(DeckId::A);
        run_ticks(&mut engine, 3);
        let after_first = applies.load(Ordering::SeqCst);
        assert_eq!(after_first, 1);

        // Dirty marks without state changes keep producing the same
        // text; the backend must not be called again
        engine.set_crossfader(-0.0);
        run_ticks(&mut engine, 3);
        assert_eq!(applies.load(Ordering::SeqCst), after_first);

        // A real change produces a new program and one more apply
        engine.set_tempo_ratio(DeckId::A, 1.25);
        run_ticks(&mut engine, 3);
        assert_eq!(applies.load(Ordering::SeqCst), after_first + 1);
    }

    #[tokio::test]
    async fn test_loop_pad_quantizes_with_unknown_downbeat() {
        let (mut engine, _) = open_engine().await;
        let id = import_and_load(&mut engine, DeckId::A);
        // Native tempo 120 via beatgrid import, downbeat unknown
        assert!(engine.import_beatgrid(id, r#"{"bpm": 120}"#));

        engine.set_pad_mode(DeckId::A, PadMode::Loop);
        engine.toggle_play(DeckId::A);
        // Put the playhead at 10.3s: with 0.5s beats the loop floors to 10.0
        engine.chains[DeckId::A.index()].seek_sec(10.3);
        engine.press_pad(DeckId::A, 0);

        let region = engine.chains[DeckId::A.index()].loop_region().unwrap();
        assert!((region.start_sec - 10.0).abs() < 1e-9);
        assert!((region.end_sec - 10.5).abs() < 1e-9);

        // Releasing the same pad tears the loop down
        engine.release_pad(DeckId::A, 0);
        assert!(engine.chains[DeckId::A.index()].loop_region().is_none());
    }

    #[tokio::test]
    async fn test_loop_pad_noop_on_generative() {
        let (mut engine, _) = open_engine().await;
        engine.set_pad_mode(DeckId::A, PadMode::Loop);
        engine.press_pad(DeckId::A, 0);
        assert!(engine.chains[DeckId::A.index()].loop_region().is_none());
        assert_eq!(engine.deck(DeckId::A).active_loop_pad(), None);
    }

    #[tokio::test]
    async fn test_hotcue_generative_selects_catalog_entry() {
        let (mut engine, _) = open_engine().await;
        engine.press_pad(DeckId::A, 1);
        assert_eq!(engine.deck(DeckId::A).source().item_id, 1);
        assert!(engine.deck(DeckId::A).is_playing());
    }

    #[tokio::test]
    async fn test_hotcue_sampled_capture_and_recall() {
        let (mut engine, _) = open_engine().await;
        import_and_load(&mut engine, DeckId::A);
        engine.set_pad_mode(DeckId::A, PadMode::Hotcue);

        engine.chains[DeckId::A.index()].seek_sec(3.0);
        // Empty slot captures
        engine.press_pad(DeckId::A, 2);
        assert!((engine.deck(DeckId::A).hotcue(2).unwrap() - 3.0).abs() < 1e-6);

        // Set slot recalls and starts playback
        engine.chains[DeckId::A.index()].seek_sec(9.0);
        engine.press_pad(DeckId::A, 2);
        assert!((engine.chains[DeckId::A.index()].current_time_sec() - 3.0).abs() < 1e-6);
        assert!(engine.deck(DeckId::A).is_playing());
    }

    #[tokio::test]
    async fn test_pitch_play_reverts_on_release() {
        let (mut engine, _) = open_engine().await;
        import_and_load(&mut engine, DeckId::A);

        engine.press_pad(DeckId::A, 3); // capture hotcue at 0.0
        engine.set_shift(DeckId::A, true);
        engine.press_pad(DeckId::A, 3);
        assert!(engine.deck(DeckId::A).pitch_play().is_some());

        engine.release_pad(DeckId::A, 3);
        assert!(engine.deck(DeckId::A).pitch_play().is_none());
    }

    #[tokio::test]
    async fn test_slicer_seeks_beat_slice() {
        let (mut engine, _) = open_engine().await;
        let id = import_and_load(&mut engine, DeckId::A);
        assert!(engine.import_beatgrid(id, r#"{"bpm": 120, "downbeatSec": 0.0}"#));

        engine.set_pad_mode(DeckId::A, PadMode::Fx);
        engine.chains[DeckId::A.index()].seek_sec(4.3);
        // Bar = 2.0s at 120 BPM: current bar starts at 4.0, slice 2 at +1.0
        engine.press_pad(DeckId::A, 2);
        assert!((engine.chains[DeckId::A.index()].current_time_sec() - 5.0).abs() < 1e-6);
        assert!(engine.deck(DeckId::A).is_playing());
    }

    #[tokio::test]
    async fn test_import_beatgrid_rejects_empty() {
        let (mut engine, _) = open_engine().await;
        let id = import_and_load(&mut engine, DeckId::A);
        assert!(!engine.import_beatgrid(id, "{}"));
        assert!(engine.import_beatgrid(id, r#"{"bpm": 126, "downbeatMs": 250}"#));
        match engine.library().get(id).unwrap() {
            LibraryItem::Sampled(item) => {
                assert_eq!(item.bpm, Some(126.0));
                assert_eq!(item.downbeat_sec, Some(0.25));
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_render_advances_sampled_transport() {
        let (mut engine, _) = open_engine().await;
        import_and_load(&mut engine, DeckId::A);
        engine.toggle_play(DeckId::A);

        let mut out = StereoBuffer::silence(DEFAULT_SAMPLE_RATE as usize / 100);
        engine.render(&mut out);
        assert!(engine.snapshot().decks[0].position_sec > 0.0);
    }

    #[tokio::test]
    async fn test_failed_decode_keeps_state() {
        let (mut engine, _) = open_engine().await;
        assert!(engine.import_sample("Broken", &[]).is_none());
        assert_eq!(engine.library().len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_reports_program() {
        let (mut engine, _) = open_engine().await;
        engine.toggle_play(DeckId::A);
        run_ticks(&mut engine, 2);
        let snap = engine.snapshot();
        assert!(snap.program.contains("note"));
        assert_eq!(snap.decks.len(), 2);
    }

    #[tokio::test]
    async fn test_render_is_silent_mix() {
        let (mut engine, _) = open_engine().await;
        let mut out = StereoBuffer::silence(64);
        out[0] = StereoSample::new(0.5, 0.5);
        engine.render(&mut out);
        assert_eq!(out[0], StereoSample::silence());
    }
}
