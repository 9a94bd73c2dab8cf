//! Tempo synchronization - follow-sync, one-shot sync, auto beat-match
//!
//! All three algorithms work on effective tempo (native bpm x ratio)
//! and write back nothing themselves: they produce ratios and seek
//! offsets the engine applies. Ratios are clamped to the deck range and
//! snapped to the ratio grid so repeated syncs converge instead of
//! drifting.

use crate::params::{clamp_tempo_ratio, snap_ratio};
use crate::types::{DeckId, MAX_TEMPO_RATIO, MIN_TEMPO_RATIO, RATIO_SNAP};

/// Phase differences below this many beats are left alone
pub const PHASE_ALIGN_THRESHOLD_BEATS: f64 = 0.0005;

/// Ratio deltas below one snap step count as "already matched"
pub const MATCH_TOLERANCE: f64 = RATIO_SNAP;

/// Outcome of an auto beat-match pass
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// Deck chosen as tempo reference
    pub master: DeckId,
    /// Deck whose ratio was (possibly) adjusted
    pub slave: DeckId,
    /// Ratio now stored on the slave
    pub ratio: f64,
    /// Whether the ratio actually moved
    pub changed: bool,
    /// Human-readable status line
    pub status: String,
}

/// Ratio that brings a deck to the given effective tempo
///
/// Used by follow-sync and the one-shot sync buttons: clamped into the
/// deck range and snapped to the ratio grid.
pub fn sync_ratio(master_effective_bpm: f64, slave_native_bpm: f64) -> f64 {
    if slave_native_bpm <= 0.0 {
        return 1.0;
    }
    snap_ratio(clamp_tempo_ratio(master_effective_bpm / slave_native_bpm))
}

/// Auto beat-match candidate selection
///
/// Considers the exact ratio plus half-time and double-time readings of
/// the master tempo. The exact ratio wins whenever it is in range
/// (including exactly at the clamp boundary). Out of range, the
/// surviving half/double alternate closest to the slave's current
/// ratio is chosen, minimizing the perceived tempo jump; with no
/// survivor the exact ratio is clamped.
pub fn match_ratio(
    master_effective_bpm: f64,
    slave_native_bpm: f64,
    slave_current_ratio: f64,
) -> f64 {
    if slave_native_bpm <= 0.0 {
        return snap_ratio(slave_current_ratio);
    }

    let exact = master_effective_bpm / slave_native_bpm;
    let half = exact * 0.5;
    let double = exact * 2.0;
    let in_range = |r: f64| (MIN_TEMPO_RATIO..=MAX_TEMPO_RATIO).contains(&r);

    let chosen = if in_range(exact) {
        exact
    } else {
        match (in_range(half), in_range(double)) {
            (true, true) => {
                if (half - slave_current_ratio).abs() <= (double - slave_current_ratio).abs() {
                    half
                } else {
                    double
                }
            }
            (true, false) => half,
            (false, true) => double,
            (false, false) => clamp_tempo_ratio(exact),
        }
    };

    snap_ratio(chosen)
}

/// Pick the beat-match master deck
///
/// The playing deck wins when exactly one is playing. Otherwise the
/// deck with the greater effective mix gain wins; ties favor deck A.
pub fn choose_master(
    a_playing: bool,
    b_playing: bool,
    a_effective_gain: f32,
    b_effective_gain: f32,
) -> DeckId {
    match (a_playing, b_playing) {
        (true, false) => DeckId::A,
        (false, true) => DeckId::B,
        _ => {
            if a_effective_gain >= b_effective_gain {
                DeckId::A
            } else {
                DeckId::B
            }
        }
    }
}

/// Fractional position within one beat, in [0, 1)
pub fn beat_phase(position_sec: f64, downbeat_sec: f64, native_bpm: f64) -> f64 {
    let beat_len = 60.0 / native_bpm;
    ((position_sec - downbeat_sec) / beat_len).rem_euclid(1.0)
}

/// Seconds to nudge the slave so both beat phases coincide
///
/// The phase difference is wrapped to the shortest circular distance in
/// [-0.5, 0.5] beats; below the alignment threshold no seek is issued.
/// The returned offset is signed seconds at the slave's native tempo.
pub fn phase_nudge_sec(master_phase: f64, slave_phase: f64, slave_native_bpm: f64) -> Option<f64> {
    let mut diff = master_phase - slave_phase;
    if diff > 0.5 {
        diff -= 1.0;
    } else if diff < -0.5 {
        diff += 1.0;
    }
    if diff.abs() <= PHASE_ALIGN_THRESHOLD_BEATS {
        return None;
    }
    Some(diff * 60.0 / slave_native_bpm)
}

/// Build the status line for a beat-match outcome
pub fn match_status(master: DeckId, slave: DeckId, ratio: f64, changed: bool) -> String {
    if changed {
        format!("deck {} matched to deck {} at ratio {:.3}", slave, master, ratio)
    } else {
        format!("deck {} already matched (ratio {:.3})", slave, ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_ratio_clamps_and_snaps() {
        assert_eq!(sync_ratio(130.0, 130.0), 1.0);
        // 200 over 65 would be ~3.08, clamped to 2.0
        assert_eq!(sync_ratio(200.0, 65.0), 2.0);
        // 40 over 130 would be ~0.31, clamped to 0.5
        assert_eq!(sync_ratio(40.0, 130.0), 0.5);
        // Snap to 0.001
        let r = sync_ratio(128.0, 126.0);
        assert!((r - 1.016).abs() < 1e-9);
    }

    #[test]
    fn test_match_ratio_boundary_at_double_time() {
        // Master 130, slave native 65: the 2.0 candidate sits exactly on
        // the clamp edge and must be chosen, not discarded.
        let r = match_ratio(130.0, 65.0, 1.0);
        assert_eq!(r, 2.0);
    }

    #[test]
    fn test_match_ratio_boundary_at_half_time() {
        // Master 30, slave native 120: only double-time (0.5) survives.
        let r = match_ratio(30.0, 120.0, 1.0);
        assert_eq!(r, 0.5);
    }

    #[test]
    fn test_match_ratio_prefers_exact_in_range() {
        let r = match_ratio(130.0, 130.0, 1.8);
        assert_eq!(r, 1.0);
    }

    #[test]
    fn test_match_ratio_alternate_closest_to_current() {
        // Master 260, slave native 65: exact 4.0 is out; half 2.0 and a
        // 8.0 double is also out, so half wins.
        let r = match_ratio(260.0, 65.0, 1.0);
        assert_eq!(r, 2.0);

        // Master 25, slave 100: exact 0.25 out, half 0.125 out,
        // double 0.5 in.
        let r = match_ratio(25.0, 100.0, 1.0);
        assert_eq!(r, 0.5);
    }

    #[test]
    fn test_match_ratio_no_survivor_clamps_exact() {
        // Master 1000, slave 100: exact 10, half 5, double 20, all out.
        let r = match_ratio(1000.0, 100.0, 1.0);
        assert_eq!(r, MAX_TEMPO_RATIO);
    }

    #[test]
    fn test_choose_master_playing_wins() {
        assert_eq!(choose_master(true, false, 0.0, 1.0), DeckId::A);
        assert_eq!(choose_master(false, true, 1.0, 0.0), DeckId::B);
    }

    #[test]
    fn test_choose_master_gain_breaks_ties() {
        assert_eq!(choose_master(true, true, 0.2, 0.8), DeckId::B);
        assert_eq!(choose_master(false, false, 0.8, 0.2), DeckId::A);
        // Equal gains favor deck A
        assert_eq!(choose_master(true, true, 0.5, 0.5), DeckId::A);
    }

    #[test]
    fn test_beat_phase() {
        // 120 BPM, beat length 0.5s, downbeat at 0.25
        let phase = beat_phase(1.0, 0.25, 120.0);
        assert!((phase - 0.5).abs() < 1e-9);
        // Positions before the downbeat wrap positively
        let phase = beat_phase(0.0, 0.25, 120.0);
        assert!((phase - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_phase_nudge_wraps_shortest_way() {
        // Phases 0.9 vs 0.1: shortest path is -0.2 beats, not +0.8
        let nudge = phase_nudge_sec(0.9, 0.1, 120.0).unwrap();
        assert!((nudge - (-0.2 * 0.5)).abs() < 1e-9);

        let nudge = phase_nudge_sec(0.1, 0.9, 120.0).unwrap();
        assert!((nudge - (0.2 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_phase_nudge_threshold() {
        assert!(phase_nudge_sec(0.5, 0.5, 120.0).is_none());
        assert!(phase_nudge_sec(0.5002, 0.5, 120.0).is_none());
        assert!(phase_nudge_sec(0.51, 0.5, 120.0).is_some());
    }

    #[test]
    fn test_match_status_wording() {
        let adjusted = match_status(DeckId::A, DeckId::B, 1.5, true);
        assert!(adjusted.contains("matched to"));
        let unchanged = match_status(DeckId::A, DeckId::B, 1.5, false);
        assert!(unchanged.contains("already matched"));
    }
}
