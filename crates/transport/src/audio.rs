use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Decoded, immutable source audio shared between the cache, the scheduler
/// and any number of clips that reference the same lick.
///
/// Samples are interleaved (`[L, R, L, R, ...]` for stereo). Cloning only bumps
/// the reference count of the sample slice.
///
/// ```
/// use riff_transport::AudioArc;
///
/// let audio = AudioArc::new(vec![0.0, 0.5, 1.0, 0.5], 44100, 2);
/// let shared = audio.clone();
/// assert_eq!(shared.frames(), 2);
/// ```
#[derive(Clone)]
pub struct AudioArc {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioArc {
    /// # Panics
    ///
    /// Panics if `channels` is 0 or if `samples.len()` is not a multiple of `channels`.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        assert!(channels > 0, "channels must be greater than 0");
        assert_eq!(
            samples.len() % channels as usize,
            0,
            "samples.len() must be divisible by channels"
        );
        Self {
            samples: Arc::from(samples),
            sample_rate,
            channels,
        }
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Samples per channel.
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Linearly interpolated sample at a fractional frame position.
    ///
    /// Channels beyond the source's own count wrap around, so a mono lick
    /// feeds both sides of a stereo mix. Positions outside the buffer read
    /// as silence.
    pub fn sample_at(&self, frame_pos: f64, channel: usize) -> f32 {
        let frames = self.frames();
        if frame_pos < 0.0 || frames == 0 {
            return 0.0;
        }
        let index = frame_pos.floor() as usize;
        if index >= frames {
            return 0.0;
        }
        let channels = self.channels as usize;
        let ch = channel % channels;
        let current = self.samples[index * channels + ch];
        let next = if index + 1 < frames {
            self.samples[(index + 1) * channels + ch]
        } else {
            current
        };
        let frac = (frame_pos - index as f64) as f32;
        current + (next - current) * frac
    }

    /// Resample to `target_sample_rate`; a same-rate call is a cheap clone.
    pub fn resample(&self, target_sample_rate: u32) -> anyhow::Result<Self> {
        if self.sample_rate == target_sample_rate {
            return Ok(self.clone());
        }
        resample_audio_arc(self, target_sample_rate)
    }
}

impl std::fmt::Debug for AudioArc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioArc")
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_secs", &self.duration_secs())
            .finish()
    }
}

/// Sinc resampling of a whole buffer through rubato.
pub fn resample_audio_arc(audio: &AudioArc, target_sample_rate: u32) -> anyhow::Result<AudioArc> {
    if audio.sample_rate == target_sample_rate {
        return Ok(audio.clone());
    }
    if audio.is_empty() {
        return Ok(AudioArc::new(Vec::new(), target_sample_rate, audio.channels));
    }

    let channels = audio.channels as usize;
    let input_frames = audio.frames();
    let ratio = target_sample_rate as f64 / audio.sample_rate as f64;

    let mut planar = vec![Vec::with_capacity(input_frames); channels];
    for frame in audio.samples().chunks_exact(channels) {
        for (ch, sample) in frame.iter().enumerate() {
            planar[ch].push(*sample);
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, input_frames, channels)?;
    let output = resampler.process(&planar, None)?;

    let output_frames = output.first().map_or(0, Vec::len);
    let mut interleaved = Vec::with_capacity(output_frames * channels);
    for frame_idx in 0..output_frames {
        for channel in &output {
            interleaved.push(channel[frame_idx]);
        }
    }

    Ok(AudioArc::new(interleaved, target_sample_rate, audio.channels))
}
