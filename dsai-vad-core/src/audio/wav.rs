//! WAV file helpers for offline scanning and exporting detected segments.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::{buffering::chunk::AudioChunk, error::Result};

/// Read a WAV file as mono f32, averaging channels.
pub fn read_wav(path: impl AsRef<Path>) -> Result<AudioChunk> {
    let reader = WavReader::open(path.as_ref())?;
    decode(reader)
}

/// Decode an in-memory WAV file as mono f32.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioChunk> {
    decode(WavReader::new(Cursor::new(bytes))?)
}

fn decode<R: std::io::Read>(mut reader: WavReader<R>) -> Result<AudioChunk> {
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            // full scale of the stored width; 8-bit samples arrive signed
            let max = ((1_i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v as f32 / max).max(-1.0)))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    Ok(AudioChunk::from_interleaved(
        &interleaved,
        channels,
        spec.sample_rate,
    ))
}

/// Encode mono f32 samples as a 16-bit PCM WAV file in memory.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, pcm16_spec(sample_rate))?;
        write_samples(&mut writer, samples)?;
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Write mono f32 samples to `path` as a 16-bit PCM WAV file.
pub fn write_wav(path: impl AsRef<Path>, samples: &[f32], sample_rate: u32) -> Result<()> {
    let mut writer = WavWriter::create(path.as_ref(), pcm16_spec(sample_rate))?;
    write_samples(&mut writer, samples)?;
    writer.finalize()?;
    Ok(())
}

fn pcm16_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

fn write_samples<W>(writer: &mut WavWriter<W>, samples: &[f32]) -> Result<()>
where
    W: std::io::Write + std::io::Seek,
{
    for &sample in samples {
        let v = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer.write_sample(v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    #[test]
    fn encoded_wav_has_pcm16_header_and_payload() {
        let bytes = encode_wav(&[0.0, 0.5, -0.5, 1.0], 16_000).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // 44-byte canonical header + 4 samples × 2 bytes
        assert_eq!(bytes.len(), 44 + 8);
    }

    #[test]
    fn decode_recovers_encoded_samples() {
        let samples = [0.0, 0.25, -0.75, 0.9];
        let chunk = decode_wav(&encode_wav(&samples, 48_000).unwrap()).unwrap();
        assert_eq!(chunk.sample_rate, 48_000);
        assert_eq!(chunk.samples.len(), samples.len());
        for (a, b) in chunk.samples.iter().zip(samples) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    fn int_wav(bits_per_sample: u16, samples: &[i32]) -> Vec<u8> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn integer_widths_decode_to_full_scale() {
        for (bits, max) in [(8, 127), (16, 32_767), (24, 8_388_607)] {
            let bytes = int_wav(bits, &[max, -max - 1, 0, max / 2]);
            let chunk = decode_wav(&bytes).unwrap();
            assert_eq!(chunk.sample_rate, 8_000);
            assert_abs_diff_eq!(chunk.samples[0], 1.0, epsilon = 1e-6);
            assert_abs_diff_eq!(chunk.samples[1], -1.0, epsilon = 1e-6);
            assert_abs_diff_eq!(chunk.samples[2], 0.0, epsilon = 1e-6);
            assert_abs_diff_eq!(chunk.samples[3], 0.5, epsilon = 0.01);
        }
    }

    #[test]
    fn clipping_is_applied_before_quantisation() {
        let chunk = decode_wav(&encode_wav(&[2.0, -3.0], 16_000).unwrap()).unwrap();
        assert!((chunk.samples[0] - 1.0).abs() < 1e-4);
        assert!((chunk.samples[1] + 1.0).abs() < 1e-4);
    }
}
