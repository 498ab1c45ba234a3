//! Chord progressions are stored as a JSON string on the project record.
//! Older records hold bare chord names or entries with missing fields, so
//! hydration normalizes whatever it finds.

use riff_transport::ChordEntry;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::ProjectError;

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredChord {
    Name(String),
    Entry(StoredEntry),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    #[serde(default, alias = "name")]
    chord_name: Option<String>,
    #[serde(default)]
    chord_id: Option<Value>,
    #[serde(default, alias = "notes")]
    midi_notes: Vec<i64>,
    #[serde(default)]
    variation: Option<String>,
    #[serde(default)]
    rhythm: Option<String>,
    #[serde(default)]
    instrument_style: Option<String>,
}

impl StoredChord {
    fn into_entry(self) -> Option<ChordEntry> {
        match self {
            StoredChord::Name(name) => ChordEntry::new(name, Vec::new()).ok(),
            StoredChord::Entry(stored) => {
                let notes = stored
                    .midi_notes
                    .into_iter()
                    .filter(|n| (0..=127).contains(n))
                    .map(|n| n as u8)
                    .collect();
                let mut entry = ChordEntry::new(stored.chord_name?, notes).ok()?;
                let chord_id = stored.chord_id.and_then(|id| match id {
                    Value::String(s) if !s.is_empty() => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                });
                if let Some(id) = chord_id {
                    entry = entry.with_chord_id(id);
                }
                if let Some(variation) = stored.variation {
                    entry = entry.with_variation(variation);
                }
                if let Some(rhythm) = stored.rhythm {
                    entry = entry.with_rhythm(rhythm);
                }
                if let Some(style) = stored.instrument_style {
                    entry = entry.with_instrument_style(style);
                }
                Some(entry)
            }
        }
    }
}

pub fn serialize_progression(chords: &[ChordEntry]) -> String {
    // A Vec of plain structs cannot fail to serialize.
    serde_json::to_string(chords).unwrap_or_else(|_| "[]".to_string())
}

/// Parse a stored progression. Entries without a usable chord name are
/// dropped; out-of-range MIDI notes are discarded. A blank string is an
/// empty progression.
pub fn hydrate_progression(raw: &str) -> Result<Vec<ChordEntry>, ProjectError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let mut value: Value = serde_json::from_str(trimmed)
        .map_err(|e| ProjectError::MalformedProgression(e.to_string()))?;
    // Some records were double-encoded.
    if let Value::String(inner) = &value {
        value = serde_json::from_str(inner)
            .map_err(|e| ProjectError::MalformedProgression(e.to_string()))?;
    }
    match value {
        Value::Array(items) => Ok(hydrate_items(items)),
        _ => Err(ProjectError::MalformedProgression(
            "expected an array of chords".to_string(),
        )),
    }
}

fn hydrate_items(items: Vec<Value>) -> Vec<ChordEntry> {
    let total = items.len();
    let entries: Vec<ChordEntry> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<StoredChord>(item).ok())
        .filter_map(StoredChord::into_entry)
        .collect();
    if entries.len() < total {
        log::debug!("dropped {} unusable chord entries", total - entries.len());
    }
    entries
}

/// `deserialize_with` helper for progression fields: accepts a list of
/// entries, the list encoded as a JSON string, or null.
pub(crate) fn deserialize_progression<'de, D>(deserializer: D) -> Result<Vec<ChordEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::String(raw) => hydrate_progression(&raw).map_err(serde::de::Error::custom),
        Value::Array(items) => Ok(hydrate_items(items)),
        _ => Err(serde::de::Error::custom("expected an array of chords")),
    }
}
