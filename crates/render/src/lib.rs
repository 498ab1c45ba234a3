//! Offline mixdown of a whole arrangement into one encoded file plus a
//! display waveform.
//!
//! Rendering happens in three steps: [`build_schedule`] resolves every
//! audible clip to decoded audio (collecting warnings for the ones that
//! cannot play), [`mix_schedule`] sums the scheduled clips into one
//! interleaved buffer, and [`encode_wav`] / [`waveform_envelope`] turn that
//! buffer into the artifact and its summary. [`render_mixdown`] runs all of
//! them.

mod encode;
mod mix;
mod schedule;
mod waveform;

use std::fmt;

use riff_transport::{ClipId, Track, TrackId};
use serde::{Deserialize, Serialize};

pub use encode::{BitDepth, encode_wav};
pub use mix::mix_schedule;
pub use schedule::{AudioResolver, Schedule, ScheduledClip, TrackSchedule, build_schedule};
pub use waveform::waveform_envelope;

/// How tracks that are not soloed sound while any track is soloed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SoloPolicy {
    /// Attenuate by `factor` (below 1.0) instead of silencing.
    Dampen { factor: f32 },
    /// Silence them entirely.
    Mute,
}

impl Default for SoloPolicy {
    fn default() -> Self {
        SoloPolicy::Dampen { factor: 0.3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixdownConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: BitDepth,
    pub waveform_points: usize,
    pub solo_policy: SoloPolicy,
}

impl Default for MixdownConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            bit_depth: BitDepth::Int16,
            waveform_points: 100,
            solo_policy: SoloPolicy::default(),
        }
    }
}

/// Why a clip was left out of the mix.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Chord clip whose backing audio was never generated.
    NoGeneratedAudio,
    /// Lick or MIDI clip without an audio reference.
    NoAudioReference,
    /// The reference could not be loaded or decoded.
    Unreadable(String),
    /// The source decoded to zero frames.
    EmptySource,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoGeneratedAudio => write!(f, "chord clip has no generated audio"),
            SkipReason::NoAudioReference => write!(f, "clip has no audio reference"),
            SkipReason::Unreadable(msg) => write!(f, "audio could not be loaded: {msg}"),
            SkipReason::EmptySource => write!(f, "audio source is empty"),
        }
    }
}

/// A clip that did not make it into the mix. Non-fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct MixdownWarning {
    pub clip_id: ClipId,
    pub track_id: TrackId,
    pub reason: SkipReason,
}

impl fmt::Display for MixdownWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clip {} on track {}: {}", self.clip_id, self.track_id, self.reason)
    }
}

/// Which audio was missing when nothing at all could be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingAudio {
    /// Only backing-track clips exist and none has audio.
    NoBackingAudio,
    /// Only lick clips exist and none has audio.
    NoLickAudio,
    /// Both kinds exist and none of either has audio.
    NoAudio,
    /// No audible track holds any clip.
    EmptyArrangement,
}

impl fmt::Display for MissingAudio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MissingAudio::NoBackingAudio => "no backing track audio",
            MissingAudio::NoLickAudio => "no lick audio",
            MissingAudio::NoAudio => "neither backing track nor lick audio",
            MissingAudio::EmptyArrangement => "the arrangement has no audible clips",
        };
        f.write_str(text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MixdownError {
    #[error("nothing to render: {cause}")]
    NothingToRender {
        cause: MissingAudio,
        warnings: Vec<MixdownWarning>,
    },

    #[error("invalid mixdown configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to encode mixdown: {0}")]
    Encode(#[from] hound::Error),
}

/// Output of [`render_mixdown`].
#[derive(Debug, Clone)]
pub struct RenderedMixdown {
    /// Encoded WAV file.
    pub wav: Vec<u8>,
    pub waveform: Vec<f32>,
    /// Seconds.
    pub duration: f64,
    pub scheduled_clips: usize,
    pub warnings: Vec<MixdownWarning>,
}

/// Schedule, mix, encode and summarize `tracks`.
///
/// `duration_override` replaces the arrangement length (the latest scheduled
/// clip end) when given.
pub fn render_mixdown<R: AudioResolver + ?Sized>(
    tracks: &[Track],
    resolver: &R,
    config: &MixdownConfig,
    duration_override: Option<f64>,
) -> Result<RenderedMixdown, MixdownError> {
    if config.sample_rate == 0 || config.channels == 0 {
        return Err(MixdownError::InvalidConfig(format!(
            "{} Hz, {} channels",
            config.sample_rate, config.channels
        )));
    }
    if let SoloPolicy::Dampen { factor } = config.solo_policy {
        if !(0.0..1.0).contains(&factor) {
            return Err(MixdownError::InvalidConfig(format!(
                "solo dampening factor {factor} must be in [0, 1)"
            )));
        }
    }

    let schedule = build_schedule(tracks, resolver, config);
    if schedule.clip_count() == 0 {
        let cause = schedule.missing_audio_cause();
        log::warn!("mixdown aborted: {cause}");
        return Err(MixdownError::NothingToRender {
            cause,
            warnings: schedule.warnings,
        });
    }
    for warning in &schedule.warnings {
        log::warn!("mixdown skipped {warning}");
    }

    let duration = duration_override
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or_else(|| schedule.end());
    let samples = mix_schedule(&schedule, duration, config.sample_rate, config.channels);
    let wav = encode_wav(&samples, config.sample_rate, config.channels, config.bit_depth)?;
    let waveform = waveform_envelope(&samples, config.channels, config.waveform_points);

    log::info!(
        "rendered {} clips into {:.2}s ({} bytes)",
        schedule.clip_count(),
        duration,
        wav.len()
    );

    Ok(RenderedMixdown {
        wav,
        waveform,
        duration,
        scheduled_clips: schedule.clip_count(),
        warnings: schedule.warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use riff_decode::AudioCache;
    use riff_transport::{AudioArc, Clip, ProjectId, TrackKind};

    fn cache_with(reference: &str, seconds: f64) -> AudioCache {
        let cache = AudioCache::new();
        let frames = (seconds * 44100.0) as usize;
        cache.insert(reference, AudioArc::new(vec![0.5; frames * 2], 44100, 2));
        cache
    }

    fn lick_track(project: ProjectId, clips: &[(f64, f64, Option<&str>)]) -> Track {
        let mut track = Track::new(project, "Licks", TrackKind::Lick);
        for (start, duration, url) in clips {
            let clip = Clip::lick(track.id, "lick", url.map(str::to_string), *start, *duration);
            track.upsert_clip(clip);
        }
        track
    }

    fn backing_track(project: ProjectId, chords: usize) -> Track {
        let mut track = Track::backing(project);
        for i in 0..chords {
            let clip = Clip::chord(track.id, "C", vec![60, 64, 67], i as f64 * 2.0, 2.0);
            track.upsert_clip(clip);
        }
        track
    }

    #[test]
    fn test_duration_is_latest_clip_end() {
        let project = ProjectId::new();
        let cache = cache_with("a.wav", 3.0);
        let tracks = vec![lick_track(
            project,
            &[(0.0, 1.0, Some("a.wav")), (2.5, 1.5, Some("a.wav"))],
        )];

        let rendered = render_mixdown(&tracks, &cache, &MixdownConfig::default(), None)
            .expect("render");
        assert_eq!(rendered.duration, 4.0);
        assert_eq!(rendered.scheduled_clips, 2);
        assert_eq!(rendered.waveform.len(), 100);
        assert!(rendered.wav.starts_with(b"RIFF"));
    }

    #[test]
    fn test_duration_override_wins() {
        let project = ProjectId::new();
        let cache = cache_with("a.wav", 1.0);
        let tracks = vec![lick_track(project, &[(0.0, 1.0, Some("a.wav"))])];

        let rendered = render_mixdown(&tracks, &cache, &MixdownConfig::default(), Some(8.0))
            .expect("render");
        assert_eq!(rendered.duration, 8.0);
    }

    #[test]
    fn test_partial_failure_renders_the_rest() {
        let project = ProjectId::new();
        let cache = cache_with("a.wav", 2.0);
        let tracks = vec![
            lick_track(project, &[(0.0, 1.0, Some("a.wav")), (1.0, 1.0, None)]),
            backing_track(project, 1),
        ];

        let rendered = render_mixdown(&tracks, &cache, &MixdownConfig::default(), None)
            .expect("render");
        assert_eq!(rendered.scheduled_clips, 1);
        assert_eq!(rendered.warnings.len(), 2);
        assert!(
            rendered
                .warnings
                .iter()
                .any(|w| w.reason == SkipReason::NoGeneratedAudio)
        );
    }

    #[test]
    fn test_only_backing_without_audio_reports_backing_cause() {
        let project = ProjectId::new();
        let tracks = vec![backing_track(project, 2)];
        let err = render_mixdown(&tracks, &AudioCache::new(), &MixdownConfig::default(), None)
            .unwrap_err();
        assert!(matches!(
            err,
            MixdownError::NothingToRender {
                cause: MissingAudio::NoBackingAudio,
                ..
            }
        ));
    }

    #[test]
    fn test_only_licks_without_audio_reports_lick_cause() {
        let project = ProjectId::new();
        let tracks = vec![lick_track(project, &[(0.0, 1.0, Some("gone.wav"))])];
        let err = render_mixdown(&tracks, &AudioCache::new(), &MixdownConfig::default(), None)
            .unwrap_err();
        match err {
            MixdownError::NothingToRender { cause, warnings } => {
                assert_eq!(cause, MissingAudio::NoLickAudio);
                assert!(matches!(warnings[0].reason, SkipReason::Unreadable(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_arrangement() {
        let err = render_mixdown(&[], &AudioCache::new(), &MixdownConfig::default(), None)
            .unwrap_err();
        assert!(matches!(
            err,
            MixdownError::NothingToRender {
                cause: MissingAudio::EmptyArrangement,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_dampening_rejected() {
        let config = MixdownConfig {
            solo_policy: SoloPolicy::Dampen { factor: 1.5 },
            ..MixdownConfig::default()
        };
        let err = render_mixdown(&[], &AudioCache::new(), &config, None).unwrap_err();
        assert!(matches!(err, MixdownError::InvalidConfig(_)));
    }
}
