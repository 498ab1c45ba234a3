//! Mixdown export: backing-track generation, offline render and upload.

use std::sync::Arc;

use riff_project::{BackingTrackRequest, MixdownFile, ProjectStore};
use riff_render::{AudioResolver, MixdownConfig, MixdownWarning, render_mixdown};
use riff_transport::{ProjectId, Track};

use crate::chords::ChordProgression;
use crate::session::SessionError;
use crate::time::TimeContext;
use crate::timeline::Timeline;

/// Resolver shared with the render worker.
pub type SharedResolver = Arc<dyn AudioResolver + Send + Sync>;

#[derive(Debug, Clone)]
pub struct MixdownResult {
    pub url: String,
    pub waveform: Vec<f32>,
    /// Seconds.
    pub duration: f64,
    pub warnings: Vec<MixdownWarning>,
}

/// True when chord clips must be generated before rendering: the backing
/// track exists but is empty, or there is a progression but no backing track.
pub fn needs_backing_generation(timeline: &Timeline, progression: &ChordProgression) -> bool {
    if progression.is_empty() {
        return false;
    }
    match timeline.backing_track() {
        Some(track) => track.clips().is_empty(),
        None => true,
    }
}

/// One measure per chord, with audio.
pub fn backing_request(
    project_id: ProjectId,
    progression: &ChordProgression,
    time: &TimeContext,
) -> BackingTrackRequest {
    let first = progression.get(0);
    BackingTrackRequest {
        project_id,
        chords: progression.entries().to_vec(),
        instrument_id: first.and_then(|c| c.instrument_style.clone()),
        rhythm_pattern_id: first.and_then(|c| c.rhythm.clone()),
        chord_duration_beats: time.time_signature.beats_per_bar(),
        generate_audio: true,
    }
}

pub fn mixdown_file_name(project_id: ProjectId) -> String {
    format!("mixdown-{project_id}.wav")
}

/// Render `tracks` on the blocking pool and upload the WAV.
pub async fn render_and_upload<S: ProjectStore>(
    store: &S,
    resolver: SharedResolver,
    project_id: ProjectId,
    tracks: Vec<Track>,
    config: MixdownConfig,
    duration_override: Option<f64>,
) -> Result<MixdownResult, SessionError> {
    let rendered = tokio::task::spawn_blocking(move || {
        render_mixdown(&tracks, resolver.as_ref(), &config, duration_override)
    })
    .await??;

    let file = MixdownFile {
        file_name: mixdown_file_name(project_id),
        mime_type: "audio/wav",
        bytes: rendered.wav,
        duration: rendered.duration,
    };
    let uploaded = store.upload_mixdown(project_id, file).await?;
    log::info!(
        "exported mixdown of {:.2}s to {} ({} clips skipped)",
        uploaded.duration,
        uploaded.url,
        rendered.warnings.len()
    );

    Ok(MixdownResult {
        url: uploaded.url,
        waveform: rendered.waveform,
        duration: rendered.duration,
        warnings: rendered.warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use riff_decode::AudioCache;
    use riff_project::{MemoryStore, StoreError};
    use riff_render::{MissingAudio, MixdownError};
    use riff_transport::{AudioArc, ChordEntry, Clip, TrackKind};

    fn progression() -> ChordProgression {
        ChordProgression::new(vec![
            ChordEntry::new("Dm7", vec![62, 65, 69, 72])
                .expect("chord")
                .with_rhythm("bossa")
                .with_instrument_style("piano"),
            ChordEntry::new("G7", vec![55, 59, 62, 65]).expect("chord"),
        ])
        .expect("progression")
    }

    #[test]
    fn test_generation_needed_without_backing_track() {
        let timeline = Timeline::default();
        assert!(needs_backing_generation(&timeline, &progression()));
        assert!(!needs_backing_generation(&timeline, &ChordProgression::default()));
    }

    #[test]
    fn test_generation_needed_for_empty_backing_track() {
        let project = ProjectId::new();
        let mut backing = Track::backing(project);
        let timeline = Timeline::new(vec![backing.clone()]);
        assert!(needs_backing_generation(&timeline, &progression()));

        backing.upsert_clip(Clip::chord(backing.id, "Dm7", vec![62], 0.0, 2.0));
        let timeline = Timeline::new(vec![backing]);
        assert!(!needs_backing_generation(&timeline, &progression()));
    }

    #[test]
    fn test_backing_request_uses_one_measure_per_chord() {
        let project = ProjectId::new();
        let time = TimeContext::new(100.0, (3, 4), 100.0);
        let request = backing_request(project, &progression(), &time);
        assert_eq!(request.chord_duration_beats, 3);
        assert_eq!(request.chords.len(), 2);
        assert_eq!(request.rhythm_pattern_id.as_deref(), Some("bossa"));
        assert_eq!(request.instrument_id.as_deref(), Some("piano"));
        assert!(request.generate_audio);
    }

    fn lick_track(project: ProjectId, reference: Option<&str>) -> Track {
        let mut track = Track::new(project, "Licks", TrackKind::Lick);
        track.upsert_clip(Clip::lick(track.id, "l", reference.map(str::to_owned), 0.5, 1.0));
        track
    }

    #[tokio::test]
    async fn test_render_and_upload() {
        let project = ProjectId::new();
        let store = MemoryStore::new();
        let cache = AudioCache::new();
        cache.insert("mem://l.wav", AudioArc::new(vec![0.5; 8000 * 2], 8000, 2));
        let config = MixdownConfig {
            sample_rate: 8000,
            ..MixdownConfig::default()
        };

        let result = render_and_upload(
            &store,
            Arc::new(cache),
            project,
            vec![lick_track(project, Some("mem://l.wav"))],
            config,
            None,
        )
        .await
        .expect("export");

        assert_eq!(result.duration, 1.5);
        assert_eq!(result.waveform.len(), 100);
        assert!(result.url.ends_with(&mixdown_file_name(project)));
        assert_eq!(store.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_lick_audio_is_fatal() {
        let project = ProjectId::new();
        let store = MemoryStore::new();
        let err = render_and_upload(
            &store,
            Arc::new(AudioCache::new()),
            project,
            vec![lick_track(project, None)],
            MixdownConfig::default(),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Mixdown(MixdownError::NothingToRender {
                cause: MissingAudio::NoLickAudio,
                ..
            })
        ));
        assert_eq!(store.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_surfaces() {
        let project = ProjectId::new();
        let store = MemoryStore::new();
        store.set_offline(true);
        let cache = AudioCache::new();
        cache.insert("mem://l.wav", AudioArc::new(vec![0.5; 8000 * 2], 8000, 2));
        let config = MixdownConfig {
            sample_rate: 8000,
            ..MixdownConfig::default()
        };

        let err = render_and_upload(
            &store,
            Arc::new(cache),
            project,
            vec![lick_track(project, Some("mem://l.wav"))],
            config,
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, SessionError::Store(StoreError::Unavailable(_))));
    }
}
