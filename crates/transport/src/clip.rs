use serde::{Deserialize, Serialize};

use crate::{ClipId, MIN_CLIP_DURATION, ModelError, TrackId};

/// Tolerance for comparisons of second values that went through arithmetic.
const EPSILON: f64 = 1e-9;

/// A note inside a customised chord or MIDI clip, relative to the clip start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidiEvent {
    pub note: u8,
    pub velocity: u8,
    pub start: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LickSource {
    pub lick_id: String,
    /// Playable audio for the lick; `None` when the upload is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordSource {
    pub chord_name: String,
    #[serde(default)]
    pub midi_notes: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhythm_pattern_id: Option<String>,
    #[serde(default)]
    pub is_customized: bool,
    #[serde(default)]
    pub custom_midi_events: Vec<MidiEvent>,
    /// Generated backing audio; `None` until the backing generator ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidiSource {
    #[serde(default)]
    pub events: Vec<MidiEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

/// What a clip plays. Each variant carries only the fields of its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClipKind {
    Lick(LickSource),
    Chord(ChordSource),
    Midi(MidiSource),
}

impl ClipKind {
    pub fn audio_url(&self) -> Option<&str> {
        match self {
            ClipKind::Lick(lick) => lick.audio_url.as_deref(),
            ClipKind::Chord(chord) => chord.audio_url.as_deref(),
            ClipKind::Midi(midi) => midi.audio_url.as_deref(),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ClipKind::Lick(lick) => &lick.lick_id,
            ClipKind::Chord(chord) => &chord.chord_name,
            ClipKind::Midi(_) => "midi",
        }
    }
}

/// A placed, time-bounded reference to a source on a track. All times are
/// in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: ClipId,
    pub track_id: TrackId,
    #[serde(rename = "startTime")]
    pub start: f64,
    pub duration: f64,
    /// Trim offset into the source.
    pub offset: f64,
    pub source_duration: f64,
    #[serde(default)]
    pub loop_enabled: bool,
    #[serde(default = "default_playback_rate")]
    pub playback_rate: f64,
    #[serde(flatten)]
    pub kind: ClipKind,
}

fn default_playback_rate() -> f64 {
    1.0
}

impl Clip {
    /// A lick placed at `start` covering its whole source.
    pub fn lick(
        track_id: TrackId,
        lick_id: impl Into<String>,
        audio_url: Option<String>,
        start: f64,
        source_duration: f64,
    ) -> Self {
        Self {
            id: ClipId::new(),
            track_id,
            start,
            duration: source_duration,
            offset: 0.0,
            source_duration,
            loop_enabled: false,
            playback_rate: 1.0,
            kind: ClipKind::Lick(LickSource {
                lick_id: lick_id.into(),
                audio_url,
            }),
        }
    }

    /// A chord clip without generated audio, `duration` seconds long.
    pub fn chord(
        track_id: TrackId,
        chord_name: impl Into<String>,
        midi_notes: Vec<u8>,
        start: f64,
        duration: f64,
    ) -> Self {
        Self {
            id: ClipId::new(),
            track_id,
            start,
            duration,
            offset: 0.0,
            source_duration: duration,
            loop_enabled: false,
            playback_rate: 1.0,
            kind: ClipKind::Chord(ChordSource {
                chord_name: chord_name.into(),
                midi_notes,
                rhythm_pattern_id: None,
                is_customized: false,
                custom_midi_events: Vec::new(),
                audio_url: None,
            }),
        }
    }

    #[inline]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn is_chord(&self) -> bool {
        matches!(self.kind, ClipKind::Chord(_))
    }

    pub fn audio_url(&self) -> Option<&str> {
        self.kind.audio_url()
    }

    /// Half-open interval intersection; touching clips do not overlap.
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        start < self.end() - EPSILON && self.start < end - EPSILON
    }

    /// Timeline seconds of source left after the offset at the clip's
    /// playback rate.
    pub fn available_duration(&self) -> f64 {
        (self.source_duration - self.offset) / self.playback_rate
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        non_negative("start", self.start)?;
        non_negative("offset", self.offset)?;
        non_negative("source duration", self.source_duration)?;
        non_negative("duration", self.duration)?;
        if self.duration + EPSILON < MIN_CLIP_DURATION {
            return Err(ModelError::DurationTooShort {
                duration: self.duration,
                min: MIN_CLIP_DURATION,
            });
        }
        if !(self.playback_rate.is_finite() && self.playback_rate > 0.0) {
            return Err(ModelError::InvalidPlaybackRate(self.playback_rate));
        }
        if !self.loop_enabled && self.duration > self.available_duration() + 1e-6 {
            return Err(ModelError::ExceedsSource {
                offset: self.offset,
                duration: self.duration,
                playback_rate: self.playback_rate,
                source_duration: self.source_duration,
            });
        }
        Ok(())
    }

    /// Every persisted-relevant field of this clip as a patch.
    pub fn snapshot(&self) -> ClipPatch {
        let mut patch = ClipPatch {
            id: self.id,
            start_time: Some(self.start),
            duration: Some(self.duration),
            offset: Some(self.offset),
            loop_enabled: Some(self.loop_enabled),
            playback_rate: Some(self.playback_rate),
            source_duration: Some(self.source_duration),
            ..ClipPatch::new(self.id)
        };
        if let ClipKind::Chord(chord) = &self.kind {
            patch.chord_name = Some(chord.chord_name.clone());
            patch.rhythm_pattern_id = chord.rhythm_pattern_id.clone();
            patch.is_customized = Some(chord.is_customized);
            patch.custom_midi_events = Some(chord.custom_midi_events.clone());
        }
        patch
    }

    /// Overwrite each field present in `patch`. Chord fields are ignored on
    /// non-chord clips.
    pub fn apply_patch(&mut self, patch: &ClipPatch) {
        if let Some(start) = patch.start_time {
            self.start = start;
        }
        if let Some(duration) = patch.duration {
            self.duration = duration;
        }
        if let Some(offset) = patch.offset {
            self.offset = offset;
        }
        if let Some(loop_enabled) = patch.loop_enabled {
            self.loop_enabled = loop_enabled;
        }
        if let Some(rate) = patch.playback_rate {
            self.playback_rate = rate;
        }
        if let Some(source_duration) = patch.source_duration {
            self.source_duration = source_duration;
        }
        if let ClipKind::Chord(chord) = &mut self.kind {
            if let Some(name) = &patch.chord_name {
                chord.chord_name = name.clone();
            }
            if let Some(rhythm) = &patch.rhythm_pattern_id {
                chord.rhythm_pattern_id = Some(rhythm.clone());
            }
            if let Some(customized) = patch.is_customized {
                chord.is_customized = customized;
            }
            if let Some(events) = &patch.custom_midi_events {
                chord.custom_midi_events = events.clone();
            }
        }
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ModelError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ModelError::Negative { field, value })
    }
}

/// Partial update of one clip. Used for bulk saves and for collaboration
/// events; absent fields are left untouched on the receiving side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipPatch {
    pub id: ClipId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chord_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhythm_pattern_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_customized: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_midi_events: Option<Vec<MidiEvent>>,
}

impl ClipPatch {
    /// Empty patch for `id`.
    pub fn new(id: ClipId) -> Self {
        Self {
            id,
            start_time: None,
            duration: None,
            offset: None,
            loop_enabled: None,
            playback_rate: None,
            source_duration: None,
            chord_name: None,
            rhythm_pattern_id: None,
            is_customized: None,
            custom_midi_events: None,
        }
    }
}
