//! The project's chord progression and its projection onto the backing track.

use riff_transport::{ChordEntry, Clip, ClipKind, ModelError, TrackId};

use crate::time::TimeContext;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChordError {
    #[error("chord at position {0} has an empty name")]
    EmptyName(usize),

    #[error("chord index {index} is out of range for a progression of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Ordered chord entries. Edits validate first and leave the progression
/// untouched on error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChordProgression {
    entries: Vec<ChordEntry>,
}

impl ChordProgression {
    pub fn new(entries: Vec<ChordEntry>) -> Result<Self, ChordError> {
        validate(&entries)?;
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ChordEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChordEntry> {
        self.entries.get(index)
    }

    /// Replace the whole list.
    pub fn set(&mut self, entries: Vec<ChordEntry>) -> Result<(), ChordError> {
        validate(&entries)?;
        self.entries = entries;
        Ok(())
    }

    pub fn push(&mut self, entry: ChordEntry) -> Result<(), ChordError> {
        check_name(&entry, self.entries.len())?;
        self.entries.push(entry);
        Ok(())
    }

    pub fn insert(&mut self, index: usize, entry: ChordEntry) -> Result<(), ChordError> {
        if index > self.entries.len() {
            return Err(self.out_of_range(index));
        }
        check_name(&entry, index)?;
        self.entries.insert(index, entry);
        Ok(())
    }

    pub fn replace(&mut self, index: usize, entry: ChordEntry) -> Result<ChordEntry, ChordError> {
        if index >= self.entries.len() {
            return Err(self.out_of_range(index));
        }
        check_name(&entry, index)?;
        Ok(std::mem::replace(&mut self.entries[index], entry))
    }

    pub fn remove(&mut self, index: usize) -> Result<ChordEntry, ChordError> {
        if index >= self.entries.len() {
            return Err(self.out_of_range(index));
        }
        Ok(self.entries.remove(index))
    }

    pub fn move_entry(&mut self, from: usize, to: usize) -> Result<(), ChordError> {
        let len = self.entries.len();
        if from >= len {
            return Err(self.out_of_range(from));
        }
        if to >= len {
            return Err(self.out_of_range(to));
        }
        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);
        Ok(())
    }

    fn out_of_range(&self, index: usize) -> ChordError {
        ChordError::IndexOutOfRange {
            index,
            len: self.entries.len(),
        }
    }
}

fn check_name(entry: &ChordEntry, index: usize) -> Result<(), ChordError> {
    if entry.chord_name.trim().is_empty() {
        return Err(ChordError::EmptyName(index));
    }
    if let Some(&note) = entry.midi_notes.iter().find(|&&n| n > 127) {
        return Err(ModelError::MidiNoteOutOfRange(note as i64).into());
    }
    Ok(())
}

fn validate(entries: &[ChordEntry]) -> Result<(), ChordError> {
    entries
        .iter()
        .enumerate()
        .try_for_each(|(index, entry)| check_name(entry, index))
}

/// A chord shown on the backing track before it has real clips. Never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualChordClip {
    pub index: usize,
    pub chord: ChordEntry,
    pub start: f64,
    pub duration: f64,
}

impl VirtualChordClip {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// One measure per chord, back to back from zero.
pub fn project_virtual_clips(progression: &ChordProgression, ctx: &TimeContext) -> Vec<VirtualChordClip> {
    let measure = ctx.measure_duration();
    progression
        .entries()
        .iter()
        .enumerate()
        .map(|(index, chord)| VirtualChordClip {
            index,
            chord: chord.clone(),
            start: index as f64 * measure,
            duration: measure,
        })
        .collect()
}

/// Real chord clips for the whole progression on `track_id`, laid out like
/// the projection.
pub fn materialize_progression(
    progression: &ChordProgression,
    ctx: &TimeContext,
    track_id: TrackId,
) -> Vec<Clip> {
    project_virtual_clips(progression, ctx)
        .into_iter()
        .map(|virtual_clip| {
            let chord = virtual_clip.chord;
            let mut clip = Clip::chord(
                track_id,
                chord.chord_name,
                chord.midi_notes,
                virtual_clip.start,
                virtual_clip.duration,
            );
            if let ClipKind::Chord(source) = &mut clip.kind {
                source.rhythm_pattern_id = chord.rhythm;
            }
            clip
        })
        .collect()
}
