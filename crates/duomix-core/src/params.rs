//! Parameter math - normalized control scalars to physical units
//!
//! Every control surface in the console emits normalized values (0..1 or
//! -1..1). The functions here are the single place those values become
//! physical units: linear gain, decibels, cutoff frequency, cents. They
//! are pure and stateless so both playback backends share one mapping.

use crate::types::{MAX_TEMPO_RATIO, MIN_TEMPO_RATIO};

/// Half-width of the flat dead-zone around an EQ knob's center
pub const EQ_DEAD_ZONE: f32 = 0.04;

/// Linear gain per unit of knob offset outside the dead-zone
pub const EQ_GAIN_SLOPE: f32 = 2.2;

/// Maximum linear EQ gain
pub const EQ_GAIN_MAX: f32 = 2.5;

/// dB per unit of knob offset for the shelf/peak backend
pub const EQ_DB_SLOPE: f32 = 24.0;

/// Knob positions at or below this are treated as a band kill
pub const EQ_KILL_POSITION: f32 = 0.02;

/// Gain applied for a killed band, effectively silence
pub const EQ_KILL_DB: f32 = -80.0;

/// Half-width of the filter knob's bypass dead-zone
pub const FILTER_DEAD_ZONE: f32 = 0.02;

/// Resolved filter setting for one deck
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterSpec {
    /// Knob at rest, no filtering
    Bypass,
    /// Lowpass with the given cutoff
    Lowpass { cutoff_hz: f32 },
    /// Highpass with the given cutoff
    Highpass { cutoff_hz: f32 },
}

/// Convert an EQ knob position (0..1, 0.5 = unity) to linear gain
///
/// Flat inside the dead-zone; outside it the signed offset scales
/// linearly, clamped to [0, EQ_GAIN_MAX].
pub fn eq_gain(position: f32) -> f32 {
    let offset = position - 0.5;
    if offset.abs() < EQ_DEAD_ZONE {
        return 1.0;
    }
    (1.0 + offset * EQ_GAIN_SLOPE).clamp(0.0, EQ_GAIN_MAX)
}

/// Convert an EQ knob position (0..1) to decibels for the shelf/peak chain
///
/// Positions at or below EQ_KILL_POSITION kill the band outright.
pub fn eq_db(position: f32) -> f32 {
    if position <= EQ_KILL_POSITION {
        return EQ_KILL_DB;
    }
    let offset = position - 0.5;
    if offset.abs() < EQ_DEAD_ZONE {
        return 0.0;
    }
    (offset * EQ_DB_SLOPE).clamp(-24.0, 12.0)
}

/// Convert a filter knob position (0..1, 0.5 = bypass) to a filter spec
///
/// Below center sweeps a lowpass from 20 kHz down to 300 Hz; above
/// center sweeps a highpass from 40 Hz up to 9 kHz.
pub fn filter_cutoff(position: f32) -> FilterSpec {
    let position = position.clamp(0.0, 1.0);
    if (position - 0.5).abs() < FILTER_DEAD_ZONE {
        return FilterSpec::Bypass;
    }
    if position < 0.5 {
        let t = position / 0.5;
        FilterSpec::Lowpass {
            cutoff_hz: 300.0 + (20000.0 - 300.0) * t,
        }
    } else {
        let t = (position - 0.5) / 0.5;
        FilterSpec::Highpass {
            cutoff_hz: 40.0 + (9000.0 - 40.0) * t,
        }
    }
}

/// Equal-power crossfade gains for a fader position in [-1, 1]
///
/// Returns (gain_a, gain_b). gain_a^2 + gain_b^2 == 1 for every
/// position, so perceived loudness stays constant across the fade.
pub fn crossfade_gains(position: f32) -> (f32, f32) {
    let t = ((position + 1.0) / 2.0).clamp(0.0, 1.0);
    let angle = t * std::f32::consts::FRAC_PI_2;
    (angle.cos(), angle.sin())
}

/// Map the master pitch knob (0..1, 0.5 = no shift) to cents (-1200..1200)
pub fn master_pitch_cents(position: f32) -> f32 {
    (position.clamp(0.0, 1.0) - 0.5) * 2.0 * 1200.0
}

/// Clamp a requested tempo ratio into the legal range
pub fn clamp_tempo_ratio(ratio: f64) -> f64 {
    ratio.clamp(MIN_TEMPO_RATIO, MAX_TEMPO_RATIO)
}

/// Snap a tempo ratio to the nearest RATIO_SNAP step
///
/// Multiply-round-divide keeps grid points like 2.0 exact, which the
/// clamp boundary tests rely on.
pub fn snap_ratio(ratio: f64) -> f64 {
    (ratio * 1000.0).round() / 1000.0
}

/// Convert a detune in cents to a playback-rate multiplier
pub fn cents_to_rate(cents: f64) -> f64 {
    2.0_f64.powf(cents / 1200.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_gain_unity_at_center() {
        assert_eq!(eq_gain(0.5), 1.0);
        // Inside the dead-zone stays flat
        assert_eq!(eq_gain(0.52), 1.0);
        assert_eq!(eq_gain(0.48), 1.0);
    }

    #[test]
    fn test_eq_gain_monotonic() {
        let mut last = eq_gain(0.0);
        let mut pos = 0.0f32;
        while pos <= 1.0 {
            let g = eq_gain(pos);
            assert!(g >= last, "eq_gain not monotonic at {}", pos);
            last = g;
            pos += 0.01;
        }
    }

    #[test]
    fn test_eq_gain_clamped() {
        assert_eq!(eq_gain(0.0), 0.0);
        assert!(eq_gain(1.0) <= EQ_GAIN_MAX);
    }

    #[test]
    fn test_eq_db_kill_zone() {
        assert_eq!(eq_db(0.0), EQ_KILL_DB);
        assert_eq!(eq_db(0.02), EQ_KILL_DB);
        assert_eq!(eq_db(0.5), 0.0);
        assert!((eq_db(1.0) - 12.0).abs() < 1e-6);
    }

    #[test]
    fn test_filter_cutoff_bypass_and_endpoints() {
        assert_eq!(filter_cutoff(0.5), FilterSpec::Bypass);
        assert_eq!(filter_cutoff(0.49), FilterSpec::Bypass);

        match filter_cutoff(0.0) {
            FilterSpec::Lowpass { cutoff_hz } => assert!((cutoff_hz - 300.0).abs() < 0.5),
            other => panic!("expected lowpass, got {:?}", other),
        }
        match filter_cutoff(1.0) {
            FilterSpec::Highpass { cutoff_hz } => assert!((cutoff_hz - 9000.0).abs() < 0.5),
            other => panic!("expected highpass, got {:?}", other),
        }
    }

    #[test]
    fn test_crossfade_equal_power() {
        let (a, b) = crossfade_gains(-1.0);
        assert!((a - 1.0).abs() < 1e-6);
        assert!(b.abs() < 1e-6);

        let (a, b) = crossfade_gains(1.0);
        assert!(a.abs() < 1e-6);
        assert!((b - 1.0).abs() < 1e-6);

        let mut x = -1.0f32;
        while x <= 1.0 {
            let (a, b) = crossfade_gains(x);
            assert!((a * a + b * b - 1.0).abs() < 1e-5, "power law broken at {}", x);
            x += 0.05;
        }
    }

    #[test]
    fn test_master_pitch_range() {
        assert_eq!(master_pitch_cents(0.5), 0.0);
        assert!((master_pitch_cents(0.0) + 1200.0).abs() < 1e-3);
        assert!((master_pitch_cents(1.0) - 1200.0).abs() < 1e-3);
    }

    #[test]
    fn test_tempo_ratio_clamp() {
        assert_eq!(clamp_tempo_ratio(0.1), MIN_TEMPO_RATIO);
        assert_eq!(clamp_tempo_ratio(3.0), MAX_TEMPO_RATIO);
        assert_eq!(clamp_tempo_ratio(1.25), 1.25);
    }

    #[test]
    fn test_snap_ratio() {
        assert!((snap_ratio(1.23456) - 1.235).abs() < 1e-9);
        assert!((snap_ratio(0.9994) - 0.999).abs() < 1e-9);
    }

    #[test]
    fn test_cents_to_rate() {
        assert!((cents_to_rate(0.0) - 1.0).abs() < 1e-9);
        assert!((cents_to_rate(1200.0) - 2.0).abs() < 1e-9);
        assert!((cents_to_rate(-1200.0) - 0.5).abs() < 1e-9);
    }
}
