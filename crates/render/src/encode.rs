use std::io::Cursor;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitDepth {
    #[default]
    Int16,
    Int24,
    Float32,
}

impl BitDepth {
    fn spec(self, sample_rate: u32, channels: u16) -> hound::WavSpec {
        let (bits_per_sample, sample_format) = match self {
            BitDepth::Int16 => (16, hound::SampleFormat::Int),
            BitDepth::Int24 => (24, hound::SampleFormat::Int),
            BitDepth::Float32 => (32, hound::SampleFormat::Float),
        };
        hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample,
            sample_format,
        }
    }
}

/// Encode interleaved samples as an in-memory WAV file. Integer formats clip
/// to [-1, 1].
pub fn encode_wav(
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
    bit_depth: BitDepth,
) -> Result<Vec<u8>, hound::Error> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, bit_depth.spec(sample_rate, channels))?;
        match bit_depth {
            BitDepth::Int16 => {
                for &sample in samples {
                    writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
                }
            }
            BitDepth::Int24 => {
                const MAX_24: f32 = 8_388_607.0;
                for &sample in samples {
                    writer.write_sample((sample.clamp(-1.0, 1.0) * MAX_24) as i32)?;
                }
            }
            BitDepth::Float32 => {
                for &sample in samples {
                    writer.write_sample(sample)?;
                }
            }
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
