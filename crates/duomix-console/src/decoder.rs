//! Raw PCM decoder for the headless console
//!
//! Imports are expected as interleaved stereo f32 little-endian frames
//! at the default sample rate. Real decoding lives behind the
//! `SampleDecoder` seam; this implementation is enough to exercise the
//! sampled-deck path end to end.

use duomix_core::backend::{BackendError, BackendResult, SampleDecoder};
use duomix_core::{AudioClip, StereoBuffer, DEFAULT_SAMPLE_RATE};

/// Interleaved stereo f32-LE decoder
#[derive(Debug, Default)]
pub struct RawPcmDecoder;

impl SampleDecoder for RawPcmDecoder {
    fn decode(&self, bytes: &[u8]) -> BackendResult<AudioClip> {
        if bytes.is_empty() {
            return Err(BackendError::Decode("empty input".to_string()));
        }
        // Two f32 channels per frame
        if bytes.len() % 8 != 0 {
            return Err(BackendError::Decode(format!(
                "length {} is not a whole number of stereo f32 frames",
                bytes.len()
            )));
        }

        let samples: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(AudioClip::new(
            StereoBuffer::from_interleaved(&samples),
            DEFAULT_SAMPLE_RATE,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_whole_frames() {
        let mut bytes = Vec::new();
        for v in [0.1f32, -0.1, 0.2, -0.2] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let clip = RawPcmDecoder.decode(&bytes).unwrap();
        assert_eq!(clip.buffer.len(), 2);
        assert!((clip.buffer[0].left - 0.1).abs() < 1e-7);
    }

    #[test]
    fn test_rejects_partial_frames() {
        assert!(RawPcmDecoder.decode(&[0u8; 6]).is_err());
        assert!(RawPcmDecoder.decode(&[]).is_err());
    }
}
