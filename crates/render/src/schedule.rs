use riff_decode::AudioCache;
use riff_transport::{AudioArc, Clip, ClipId, ClipKind, Track, TrackId};

use crate::{MissingAudio, MixdownConfig, MixdownWarning, SkipReason, SoloPolicy};

/// Loads the audio behind a clip reference, already at `sample_rate`.
pub trait AudioResolver {
    fn resolve(&self, reference: &str, sample_rate: u32) -> anyhow::Result<AudioArc>;
}

impl AudioResolver for AudioCache {
    fn resolve(&self, reference: &str, sample_rate: u32) -> anyhow::Result<AudioArc> {
        self.get_or_load(reference, sample_rate)
    }
}

/// One clip converted to output sample space.
#[derive(Debug, Clone)]
pub struct ScheduledClip {
    pub clip_id: ClipId,
    pub start_frame: usize,
    pub frames: usize,
    /// Read position of the first frame, in source frames.
    pub offset_frames: f64,
    pub playback_rate: f64,
    pub looping: bool,
    pub audio: AudioArc,
}

impl ScheduledClip {
    /// Source read position for the `i`th frame of the clip, or `None` once a
    /// non-looping clip runs past its source.
    pub fn source_position(&self, i: usize) -> Option<f64> {
        let source_frames = self.audio.frames() as f64;
        let pos = self.offset_frames + i as f64 * self.playback_rate;
        if self.looping {
            Some(pos.rem_euclid(source_frames))
        } else if pos < source_frames {
            Some(pos)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackSchedule {
    pub track_id: TrackId,
    /// Per output channel, volume and pan and solo already applied.
    pub gains: Vec<f32>,
    pub clips: Vec<ScheduledClip>,
}

#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub tracks: Vec<TrackSchedule>,
    pub warnings: Vec<MixdownWarning>,
    /// Latest clip end among scheduled clips, in seconds.
    pub(crate) end: f64,
    pub(crate) backing_clips: usize,
    pub(crate) lick_clips: usize,
}

impl Schedule {
    pub fn clip_count(&self) -> usize {
        self.tracks.iter().map(|t| t.clips.len()).sum()
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    /// Classifies an empty schedule by which kind of clip was present.
    pub fn missing_audio_cause(&self) -> MissingAudio {
        match (self.backing_clips > 0, self.lick_clips > 0) {
            (true, false) => MissingAudio::NoBackingAudio,
            (false, true) => MissingAudio::NoLickAudio,
            (true, true) => MissingAudio::NoAudio,
            (false, false) => MissingAudio::EmptyArrangement,
        }
    }
}

/// Balance-law pan: the far side attenuates linearly, the near side stays at
/// unity.
fn pan_gains(volume: f32, pan: f32, channels: u16) -> Vec<f32> {
    if channels < 2 {
        return vec![volume; channels as usize];
    }
    let pan = pan.clamp(-1.0, 1.0);
    let left = if pan > 0.0 { 1.0 - pan } else { 1.0 };
    let right = if pan < 0.0 { 1.0 + pan } else { 1.0 };
    (0..channels as usize)
        .map(|ch| volume * if ch % 2 == 0 { left } else { right })
        .collect()
}

fn solo_factor(track: &Track, any_solo: bool, policy: SoloPolicy) -> f32 {
    if !any_solo || track.solo {
        return 1.0;
    }
    match policy {
        SoloPolicy::Dampen { factor } => factor,
        SoloPolicy::Mute => 0.0,
    }
}

fn schedule_clip<R: AudioResolver + ?Sized>(
    clip: &Clip,
    resolver: &R,
    sample_rate: u32,
) -> Result<ScheduledClip, SkipReason> {
    let reference = match (&clip.kind, clip.audio_url()) {
        (_, Some(url)) if !url.trim().is_empty() => url,
        (ClipKind::Chord(_), _) => return Err(SkipReason::NoGeneratedAudio),
        _ => return Err(SkipReason::NoAudioReference),
    };
    let audio = resolver
        .resolve(reference, sample_rate)
        .map_err(|e| SkipReason::Unreadable(format!("{e:#}")))?;
    if audio.is_empty() {
        return Err(SkipReason::EmptySource);
    }

    let sr = sample_rate as f64;
    Ok(ScheduledClip {
        clip_id: clip.id,
        start_frame: (clip.start.max(0.0) * sr).round() as usize,
        frames: (clip.duration * sr).round() as usize,
        offset_frames: clip.offset * sr,
        playback_rate: clip.playback_rate,
        looping: clip.loop_enabled,
        audio,
    })
}

/// Resolve every clip on every audible track.
///
/// Muted tracks are skipped entirely, and so are non-soloed tracks under
/// [`SoloPolicy::Mute`] while something is soloed. Clips that cannot be
/// resolved become warnings.
pub fn build_schedule<R: AudioResolver + ?Sized>(
    tracks: &[Track],
    resolver: &R,
    config: &MixdownConfig,
) -> Schedule {
    let any_solo = tracks.iter().any(|t| t.solo && !t.muted);
    let mut schedule = Schedule::default();

    for track in tracks {
        if track.muted {
            continue;
        }
        let solo = solo_factor(track, any_solo, config.solo_policy);
        if solo == 0.0 {
            log::debug!("track '{}' silenced by solo", track.name);
            continue;
        }

        let mut clips = Vec::new();
        for clip in track.clips() {
            if track.is_backing_track || clip.is_chord() {
                schedule.backing_clips += 1;
            } else {
                schedule.lick_clips += 1;
            }
            match schedule_clip(clip, resolver, config.sample_rate) {
                Ok(scheduled) => {
                    schedule.end = schedule.end.max(clip.end());
                    clips.push(scheduled);
                }
                Err(reason) => schedule.warnings.push(MixdownWarning {
                    clip_id: clip.id,
                    track_id: track.id,
                    reason,
                }),
            }
        }

        if !clips.is_empty() {
            schedule.tracks.push(TrackSchedule {
                track_id: track.id,
                gains: pan_gains(track.volume * solo, track.pan, config.channels),
                clips,
            });
        }
    }
    schedule
}
