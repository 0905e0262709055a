use hound::{SampleFormat, WavReader};
use std::io::Cursor;
use tracing::debug;

use super::source::DecodedAudio;
use crate::error::AudioError;

/// Decode a WAV payload into mono PCM, averaging channels.
pub fn decode(bytes: &[u8]) -> Result<DecodedAudio, AudioError> {
    let reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| AudioError::Decode(format!("unreadable WAV header: {}", e)))?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(AudioError::Decode("payload declares zero channels".into()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| AudioError::Decode(format!("corrupt float samples: {}", e)))?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(AudioError::Decode(format!(
                    "unsupported bit depth: {}",
                    spec.bits_per_sample
                )));
            }
            let full_scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<_, _>>()
                .map_err(|e| AudioError::Decode(format!("corrupt integer samples: {}", e)))?
        }
    };

    let channels = spec.channels as usize;
    let mono: Vec<f32> = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    if mono.is_empty() {
        return Err(AudioError::Decode("payload contains no audio frames".into()));
    }

    debug!(
        "Decoded {} frames @ {}Hz ({} channels, {:?})",
        mono.len(),
        spec.sample_rate,
        spec.channels,
        spec.sample_format
    );

    Ok(DecodedAudio::new(mono, spec.sample_rate, spec.channels))
}

/// Decode on the blocking pool so the frame loop is never stalled.
pub async fn decode_async(bytes: Vec<u8>) -> Result<DecodedAudio, AudioError> {
    tokio::task::spawn_blocking(move || decode(&bytes))
        .await
        .map_err(|e| AudioError::Decode(format!("decoder task failed: {}", e)))?
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    pub(crate) fn wav_bytes(channels: u16, frames: &[i16]) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &s in frames {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_and_downmixes_stereo() {
        let bytes = wav_bytes(2, &[16384, 0, -16384, -16384]);
        let audio = decode(&bytes).unwrap();
        assert_eq!(audio.sample_rate(), 8000);
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.len(), 2);
        assert!((audio.samples()[0] - 0.25).abs() < 1e-6);
        assert!((audio.samples()[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode(b"definitely not audio").unwrap_err();
        assert!(matches!(err, AudioError::Decode(_)));
    }

    #[test]
    fn empty_payload_is_a_decode_error() {
        let bytes = wav_bytes(1, &[]);
        assert!(matches!(decode(&bytes), Err(AudioError::Decode(_))));
    }

    #[tokio::test]
    async fn async_decode_matches_sync() {
        let bytes = wav_bytes(1, &[0, 8192, 16384]);
        let audio = decode_async(bytes).await.unwrap();
        assert_eq!(audio.len(), 3);
        assert!((audio.samples()[2] - 0.5).abs() < 1e-6);
    }
}
