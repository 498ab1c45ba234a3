use serde::{Deserialize, Serialize};

use crate::ModelError;

/// One entry of a project's chord progression.
///
/// Entries are values: editing a progression builds a new list, it never
/// patches an entry in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordEntry {
    pub chord_name: String,
    /// Reference into the chord library, when the chord was picked from it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chord_id: Option<String>,
    #[serde(default)]
    pub midi_notes: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhythm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_style: Option<String>,
}

impl ChordEntry {
    /// Build an entry, rejecting blank names. The name is stored trimmed.
    pub fn new(chord_name: impl Into<String>, midi_notes: Vec<u8>) -> Result<Self, ModelError> {
        let chord_name = chord_name.into().trim().to_string();
        if chord_name.is_empty() {
            return Err(ModelError::EmptyChordName);
        }
        if let Some(&note) = midi_notes.iter().find(|&&n| n > 127) {
            return Err(ModelError::MidiNoteOutOfRange(note as i64));
        }
        Ok(Self {
            chord_name,
            chord_id: None,
            midi_notes,
            variation: None,
            rhythm: None,
            instrument_style: None,
        })
    }

    pub fn with_chord_id(mut self, chord_id: impl Into<String>) -> Self {
        self.chord_id = Some(chord_id.into());
        self
    }

    pub fn with_rhythm(mut self, rhythm: impl Into<String>) -> Self {
        self.rhythm = Some(rhythm.into());
        self
    }

    pub fn with_instrument_style(mut self, style: impl Into<String>) -> Self {
        self.instrument_style = Some(style.into());
        self
    }

    pub fn with_variation(mut self, variation: impl Into<String>) -> Self {
        self.variation = Some(variation.into());
        self
    }
}
