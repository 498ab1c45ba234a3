//! Shared model types for the arrangement engine: ids, decoded audio, tracks,
//! clips and chord entries. Everything here is plain data; behaviour that
//! needs tempo or a whole timeline lives in `riff_core`.

mod audio;
mod chord;
mod clip;
mod ids;
mod track;

pub use audio::{AudioArc, resample_audio_arc};
pub use chord::ChordEntry;
pub use clip::{ChordSource, Clip, ClipKind, ClipPatch, LickSource, MidiEvent, MidiSource};
pub use ids::{ClipId, ProjectId, TrackId};
pub use track::{Track, TrackKind};

/// Shortest clip the timeline keeps, in seconds. Edits that would leave a
/// clip shorter than this delete it instead.
pub const MIN_CLIP_DURATION: f64 = 0.05;

/// Validation failures on model values, raised before any mutation is applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("chord name must not be empty")]
    EmptyChordName,

    #[error("MIDI note {0} is outside 0..=127")]
    MidiNoteOutOfRange(i64),

    #[error("{field} must be a finite, non-negative number (got {value})")]
    Negative { field: &'static str, value: f64 },

    #[error("clip duration {duration}s is below the minimum of {min}s")]
    DurationTooShort { duration: f64, min: f64 },

    #[error("playback rate must be positive (got {0})")]
    InvalidPlaybackRate(f64),

    #[error("offset {offset}s + duration {duration}s at rate {playback_rate} exceeds source duration {source_duration}s")]
    ExceedsSource {
        offset: f64,
        duration: f64,
        playback_rate: f64,
        source_duration: f64,
    },
}
