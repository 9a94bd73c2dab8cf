//! Beatgrid import schema
//!
//! Imported grid files carry an optional `bpm` and a downbeat in one of
//! three spellings: `downbeatSec`, `downbeat` (seconds) or `downbeatMs`.
//! An import that resolves neither field is rejected whole; there is no
//! partial application.

use serde::Deserialize;
use thiserror::Error;

/// BPM values outside this range are clamped on import
pub const IMPORT_BPM_MIN: f64 = 40.0;
pub const IMPORT_BPM_MAX: f64 = 240.0;

/// Errors produced by beatgrid import parsing
#[derive(Error, Debug)]
pub enum BeatgridError {
    /// The payload was not valid JSON
    #[error("Invalid beatgrid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Parsed fine but neither bpm nor downbeat resolved to a usable number
    #[error("Beatgrid has no usable bpm or downbeat field")]
    NoUsableFields,
}

/// Raw import payload as it appears on disk
#[derive(Debug, Deserialize)]
struct BeatgridFile {
    bpm: Option<f64>,
    #[serde(rename = "downbeatSec")]
    downbeat_sec: Option<f64>,
    downbeat: Option<f64>,
    #[serde(rename = "downbeatMs")]
    downbeat_ms: Option<f64>,
}

/// Validated beatgrid patch ready to apply to a sampled item
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatgridUpdate {
    pub bpm: Option<f64>,
    pub downbeat_sec: Option<f64>,
}

/// Parse and validate a beatgrid import payload
///
/// bpm is accepted when finite and positive, then clamped to
/// [IMPORT_BPM_MIN, IMPORT_BPM_MAX]. The downbeat spellings are tried
/// in order: seconds, seconds (legacy key), milliseconds.
pub fn parse_beatgrid(json: &str) -> Result<BeatgridUpdate, BeatgridError> {
    let file: BeatgridFile = serde_json::from_str(json)?;

    let bpm = file
        .bpm
        .filter(|b| b.is_finite() && *b > 0.0)
        .map(|b| b.clamp(IMPORT_BPM_MIN, IMPORT_BPM_MAX));

    let downbeat_sec = file
        .downbeat_sec
        .or(file.downbeat)
        .or(file.downbeat_ms.map(|ms| ms / 1000.0))
        .filter(|d| d.is_finite() && *d >= 0.0);

    if bpm.is_none() && downbeat_sec.is_none() {
        return Err(BeatgridError::NoUsableFields);
    }

    Ok(BeatgridUpdate { bpm, downbeat_sec })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bpm_and_downbeat_ms() {
        let update = parse_beatgrid(r#"{"bpm": 126, "downbeatMs": 250}"#).unwrap();
        assert_eq!(update.bpm, Some(126.0));
        assert_eq!(update.downbeat_sec, Some(0.25));
    }

    #[test]
    fn test_empty_object_rejected() {
        assert!(matches!(
            parse_beatgrid("{}"),
            Err(BeatgridError::NoUsableFields)
        ));
    }

    #[test]
    fn test_bpm_clamped() {
        let update = parse_beatgrid(r#"{"bpm": 500}"#).unwrap();
        assert_eq!(update.bpm, Some(IMPORT_BPM_MAX));

        let update = parse_beatgrid(r#"{"bpm": 10}"#).unwrap();
        assert_eq!(update.bpm, Some(IMPORT_BPM_MIN));
    }

    #[test]
    fn test_invalid_bpm_ignored_but_downbeat_kept() {
        let update = parse_beatgrid(r#"{"bpm": -3, "downbeat": 1.5}"#).unwrap();
        assert_eq!(update.bpm, None);
        assert_eq!(update.downbeat_sec, Some(1.5));
    }

    #[test]
    fn test_downbeat_spelling_priority() {
        // downbeatSec wins over the millisecond spelling
        let update =
            parse_beatgrid(r#"{"downbeatSec": 2.0, "downbeatMs": 9000}"#).unwrap();
        assert_eq!(update.downbeat_sec, Some(2.0));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(
            parse_beatgrid("{not json"),
            Err(BeatgridError::Parse(_))
        ));
    }
}
