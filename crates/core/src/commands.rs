//! Timeline mutations as values.
//!
//! Applying a [`Command`] yields a [`ChangeSet`]: the before and after state
//! of every clip it touched. Its inverse undoes the command, which is how
//! both undo and rollback of a rejected insert work.

use std::collections::HashMap;

use riff_transport::{Clip, ClipId, ModelError, TrackId};

use crate::chords::{ChordProgression, materialize_progression};
use crate::clip_ops::resolve_overlaps;
use crate::time::TimeContext;
use crate::timeline::{Timeline, TimelineError};

/// One clip before and after a change. `None` before means created, `None`
/// after means removed.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipChange {
    pub before: Option<Clip>,
    pub after: Option<Clip>,
}

impl ClipChange {
    pub fn id(&self) -> ClipId {
        match (&self.before, &self.after) {
            (Some(clip), _) | (None, Some(clip)) => clip.id,
            (None, None) => ClipId::default(),
        }
    }

    pub fn is_created(&self) -> bool {
        self.before.is_none() && self.after.is_some()
    }

    pub fn is_removed(&self) -> bool {
        self.before.is_some() && self.after.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<ClipChange>,
}

impl ChangeSet {
    /// Record a change; no-op entries are dropped.
    pub fn push(&mut self, before: Option<Clip>, after: Option<Clip>) {
        if before != after {
            self.changes.push(ClipChange { before, after });
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClipChange> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn get(&self, id: ClipId) -> Option<&ClipChange> {
        self.changes.iter().find(|c| c.id() == id)
    }

    /// The change set that undoes this one.
    pub fn inverse(&self) -> ChangeSet {
        ChangeSet {
            changes: self
                .changes
                .iter()
                .rev()
                .map(|c| ClipChange {
                    before: c.after.clone(),
                    after: c.before.clone(),
                })
                .collect(),
        }
    }

    /// Diff the current clips of `track_id` against `proposed`.
    fn diff_track(timeline: &Timeline, track_id: TrackId, proposed: Vec<Clip>) -> Result<Self, TimelineError> {
        let track = timeline
            .track(track_id)
            .ok_or(TimelineError::TrackNotFound(track_id))?;
        let mut after: HashMap<ClipId, Clip> = proposed
            .into_iter()
            .map(|mut c| {
                c.track_id = track_id;
                (c.id, c)
            })
            .collect();

        let mut changes = ChangeSet::default();
        for clip in track.clips() {
            changes.push(Some(clip.clone()), after.remove(&clip.id));
        }
        let mut created: Vec<Clip> = after.into_values().collect();
        created.sort_by(|a, b| a.start.total_cmp(&b.start));
        for clip in created {
            changes.push(None, Some(clip));
        }
        Ok(changes)
    }
}

/// Settings commands need besides the timeline itself.
#[derive(Debug, Clone, Copy)]
pub struct EditContext<'a> {
    pub time: TimeContext,
    pub progression: &'a ChordProgression,
    pub min_clip_duration: f64,
    pub resize_resolves_overlaps: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Place a new clip on `clip.track_id`, making room for it.
    InsertClip { clip: Clip },
    /// Move a clip along its own track, making room for it.
    MoveClip { clip_id: ClipId, start: f64 },
    ResizeClip {
        clip_id: ClipId,
        start: f64,
        duration: f64,
        offset: f64,
    },
    DeleteClip { clip_id: ClipId },
    /// Turn the projected progression into real chord clips on the backing
    /// track, optionally with one chord dropped at a new start.
    MaterializeChords { moved: Option<(usize, f64)> },
}

impl Command {
    /// Apply to `timeline`, returning what changed. On error nothing is
    /// applied.
    pub fn apply(&self, timeline: &mut Timeline, ctx: &EditContext<'_>) -> Result<ChangeSet, TimelineError> {
        let changes = self.plan(timeline, ctx)?;
        timeline.apply_change_set(&changes)?;
        Ok(changes)
    }

    fn plan(&self, timeline: &Timeline, ctx: &EditContext<'_>) -> Result<ChangeSet, TimelineError> {
        match self {
            Command::InsertClip { clip } => {
                check_clip(clip, ctx.min_clip_duration)?;
                let track = timeline
                    .track(clip.track_id)
                    .ok_or(TimelineError::TrackNotFound(clip.track_id))?;
                place(timeline, track.id, track.clips(), clip.clone(), ctx)
            }
            Command::MoveClip { clip_id, start } => {
                let (track_id, mut moved) = find(timeline, *clip_id)?;
                moved.start = start.max(0.0);
                let clips = timeline.track(track_id).map(|t| t.clips()).unwrap_or_default();
                place(timeline, track_id, clips, moved, ctx)
            }
            Command::ResizeClip {
                clip_id,
                start,
                duration,
                offset,
            } => {
                let (track_id, mut resized) = find(timeline, *clip_id)?;
                resized.start = *start;
                resized.duration = *duration;
                resized.offset = *offset;
                check_clip(&resized, ctx.min_clip_duration)?;
                let clips = timeline.track(track_id).map(|t| t.clips()).unwrap_or_default();
                if ctx.resize_resolves_overlaps {
                    place(timeline, track_id, clips, resized, ctx)
                } else {
                    let mut proposed: Vec<Clip> = clips.to_vec();
                    if let Some(slot) = proposed.iter_mut().find(|c| c.id == resized.id) {
                        *slot = resized;
                    }
                    ChangeSet::diff_track(timeline, track_id, proposed)
                }
            }
            Command::DeleteClip { clip_id } => {
                let (track_id, _) = find(timeline, *clip_id)?;
                let clips = timeline.track(track_id).map(|t| t.clips()).unwrap_or_default();
                let proposed = clips.iter().filter(|c| c.id != *clip_id).cloned().collect();
                ChangeSet::diff_track(timeline, track_id, proposed)
            }
            Command::MaterializeChords { moved } => {
                let track = timeline.backing_track().ok_or(TimelineError::NoBackingTrack)?;
                if track.clips().iter().any(Clip::is_chord) {
                    return Err(TimelineError::ChordsAlreadyMaterialized);
                }
                let mut chords = materialize_progression(ctx.progression, &ctx.time, track.id);
                let mut proposed: Vec<Clip> = track.clips().to_vec();
                match moved {
                    Some((index, start)) => {
                        if *index >= chords.len() {
                            return Err(TimelineError::NoVirtualChord(*index));
                        }
                        let mut dragged = chords.remove(*index);
                        dragged.start = start.max(0.0);
                        proposed.extend(chords);
                        let resolution = resolve_overlaps(&proposed, &dragged, ctx.min_clip_duration);
                        let mut proposed = resolution.clips;
                        proposed.push(dragged);
                        ChangeSet::diff_track(timeline, track.id, proposed)
                    }
                    None => {
                        proposed.extend(chords);
                        ChangeSet::diff_track(timeline, track.id, proposed)
                    }
                }
            }
        }
    }
}

fn check_clip(clip: &Clip, min_duration: f64) -> Result<(), TimelineError> {
    clip.validate()?;
    if clip.duration + 1e-9 < min_duration {
        return Err(ModelError::DurationTooShort {
            duration: clip.duration,
            min: min_duration,
        }
        .into());
    }
    Ok(())
}

fn find(timeline: &Timeline, clip_id: ClipId) -> Result<(TrackId, Clip), TimelineError> {
    timeline
        .clip(clip_id)
        .map(|c| (c.track_id, c.clone()))
        .ok_or(TimelineError::ClipNotFound(clip_id))
}

fn place(
    timeline: &Timeline,
    track_id: TrackId,
    existing: &[Clip],
    clip: Clip,
    ctx: &EditContext<'_>,
) -> Result<ChangeSet, TimelineError> {
    let resolution = resolve_overlaps(existing, &clip, ctx.min_clip_duration);
    if !resolution.removed.is_empty() || !resolution.created.is_empty() {
        log::debug!(
            "placing clip {} removed {} and split off {} clips",
            clip.id,
            resolution.removed.len(),
            resolution.created.len()
        );
    }
    let mut proposed = resolution.clips;
    proposed.push(clip);
    ChangeSet::diff_track(timeline, track_id, proposed)
}

/// Undo and redo stacks of applied change sets.
#[derive(Debug)]
pub struct History {
    undo: Vec<ChangeSet>,
    redo: Vec<ChangeSet>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_limit(100)
    }
}

impl History {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Record a freshly applied change set. Clears the redo stack.
    pub fn push(&mut self, changes: ChangeSet) {
        if changes.is_empty() {
            return;
        }
        self.redo.clear();
        self.undo.push(changes);
        if self.undo.len() > self.limit {
            self.undo.remove(0);
        }
    }

    /// The change set to apply to undo the latest edit.
    pub fn undo(&mut self) -> Option<ChangeSet> {
        let changes = self.undo.pop()?;
        let inverse = changes.inverse();
        self.redo.push(changes);
        Some(inverse)
    }

    /// The change set to apply to redo the latest undone edit.
    pub fn redo(&mut self) -> Option<ChangeSet> {
        let changes = self.redo.pop()?;
        self.undo.push(changes.clone());
        Some(changes)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
