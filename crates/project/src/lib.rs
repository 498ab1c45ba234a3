mod chords;
mod load;
mod memory;
mod save;
mod store;

use riff_transport::{ChordEntry, ModelError, ProjectId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use chords::{hydrate_progression, serialize_progression};
pub use load::{ProjectDocument, ProjectMetadata, load_project, load_project_metadata};
pub use memory::MemoryStore;
pub use save::save_project;
pub use store::{
    BackingTrackRequest, MixdownFile, ProjectStore, StoreError, UploadedMixdown,
};

pub const MIN_TEMPO: u16 = 20;
pub const MAX_TEMPO: u16 = 300;

/// Beats per minute, always within `MIN_TEMPO..=MAX_TEMPO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Tempo(u16);

impl Tempo {
    pub fn new(bpm: u16) -> Result<Self, ProjectError> {
        if (MIN_TEMPO..=MAX_TEMPO).contains(&bpm) {
            Ok(Self(bpm))
        } else {
            Err(ProjectError::TempoOutOfRange(bpm))
        }
    }

    pub fn bpm(self) -> f64 {
        self.0 as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self(120)
    }
}

impl TryFrom<u16> for Tempo {
    type Error = ProjectError;

    fn try_from(bpm: u16) -> Result<Self, Self::Error> {
        Self::new(bpm)
    }
}

impl From<Tempo> for u16 {
    fn from(tempo: Tempo) -> Self {
        tempo.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    /// Pitch class of the tonic, 0 = C.
    pub root: u8,
    pub scale: String,
}

impl Default for Key {
    fn default() -> Self {
        Self {
            root: 0,
            scale: "major".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub tempo: Tempo,
    pub key: Key,
    pub time_signature: (u32, u32),
    #[serde(default, deserialize_with = "chords::deserialize_progression")]
    pub chord_progression: Vec<ChordEntry>,
}

impl Project {
    pub fn new(name: impl Into<String>, tempo: Tempo) -> Self {
        Self {
            id: ProjectId::new(),
            name: name.into(),
            tempo,
            key: Key::default(),
            time_signature: (4, 4),
            chord_progression: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ProjectError> {
        if self.key.root > 11 {
            return Err(ProjectError::KeyOutOfRange(self.key.root));
        }
        let (numerator, denominator) = self.time_signature;
        if numerator == 0 || denominator == 0 || !denominator.is_power_of_two() {
            return Err(ProjectError::InvalidTimeSignature(numerator, denominator));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] rmp_serde::encode::Error),

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] rmp_serde::decode::Error),

    #[error("tempo {0} BPM is outside {MIN_TEMPO}..={MAX_TEMPO}")]
    TempoOutOfRange(u16),

    #[error("key root {0} is not a pitch class (0..=11)")]
    KeyOutOfRange(u8),

    #[error("invalid time signature {0}/{1}")]
    InvalidTimeSignature(u32, u32),

    #[error("malformed chord progression: {0}")]
    MalformedProgression(String),

    #[error("invalid value in '{path}': {source}")]
    Model {
        path: PathBuf,
        source: ModelError,
    },
}
