use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use riff_transport::{Clip, ClipId, ClipPatch, ModelError, Track, TrackId};

use crate::chords::{ChordProgression, VirtualChordClip, project_virtual_clips};
use crate::commands::ChangeSet;
use crate::snap::{ItemRef, Span};
use crate::time::TimeContext;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimelineError {
    #[error("track {0} not found")]
    TrackNotFound(TrackId),

    #[error("clip {0} not found")]
    ClipNotFound(ClipId),

    #[error("the project already has a backing track")]
    BackingTrackExists,

    #[error("the project has no backing track")]
    NoBackingTrack,

    #[error("no virtual chord at index {0}")]
    NoVirtualChord(usize),

    #[error("the backing track already holds chord clips")]
    ChordsAlreadyMaterialized,

    #[error("invalid clip: {0}")]
    InvalidClip(#[from] ModelError),
}

/// The timeline as shared between the editor and its background tasks.
pub type SharedTimeline = Arc<RwLock<Timeline>>;

pub fn read_timeline(shared: &SharedTimeline) -> RwLockReadGuard<'_, Timeline> {
    shared.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn write_timeline(shared: &SharedTimeline) -> RwLockWriteGuard<'_, Timeline> {
    shared.write().unwrap_or_else(PoisonError::into_inner)
}

/// Every track of a project with its persisted clips, in display order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    tracks: Vec<Track>,
}

impl Timeline {
    pub fn new(mut tracks: Vec<Track>) -> Self {
        tracks.sort_by_key(|t| t.order);
        Self { tracks }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    pub fn backing_track(&self) -> Option<&Track> {
        self.tracks.iter().find(|t| t.is_backing_track)
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.tracks.iter().find_map(|t| t.clip(id))
    }

    pub fn clip_count(&self) -> usize {
        self.tracks.iter().map(|t| t.clips().len()).sum()
    }

    /// End of the latest clip across all tracks.
    pub fn end(&self) -> f64 {
        self.tracks.iter().map(Track::end).fold(0.0, f64::max)
    }

    pub fn add_track(&mut self, track: Track) -> Result<(), TimelineError> {
        if track.is_backing_track && self.backing_track().is_some() {
            return Err(TimelineError::BackingTrackExists);
        }
        self.tracks.push(track);
        self.tracks.sort_by_key(|t| t.order);
        Ok(())
    }

    /// Removes the track and, with it, all of its clips.
    pub fn remove_track(&mut self, id: TrackId) -> Result<Track, TimelineError> {
        let index = self
            .tracks
            .iter()
            .position(|t| t.id == id)
            .ok_or(TimelineError::TrackNotFound(id))?;
        Ok(self.tracks.remove(index))
    }

    /// Update a track's mix settings in place; clips are left alone.
    pub fn update_track(&mut self, id: TrackId, f: impl FnOnce(&mut Track)) -> Result<&Track, TimelineError> {
        let track = self.track_mut(id).ok_or(TimelineError::TrackNotFound(id))?;
        f(track);
        Ok(track)
    }

    /// Swap in a freshly fetched set of tracks.
    pub fn replace_tracks(&mut self, tracks: Vec<Track>) {
        *self = Self::new(tracks);
    }

    /// Swap in `backing` for the current backing track, adding it if there
    /// is none. Every other track is left as it is.
    pub fn replace_backing_track(&mut self, backing: Track) {
        self.tracks.retain(|t| !t.is_backing_track && t.id != backing.id);
        self.tracks.push(backing);
        self.tracks.sort_by_key(|t| t.order);
    }

    /// The progression projected onto the backing track, or nothing once the
    /// backing track holds real chord clips.
    pub fn virtual_chord_clips(&self, progression: &ChordProgression, ctx: &TimeContext) -> Vec<VirtualChordClip> {
        match self.backing_track() {
            Some(track) if !track.clips().iter().any(Clip::is_chord) => {
                project_virtual_clips(progression, ctx)
            }
            _ => Vec::new(),
        }
    }

    /// Edges on `track_id` that moving items can snap to.
    pub fn spans(&self, track_id: TrackId, progression: &ChordProgression, ctx: &TimeContext) -> Vec<Span> {
        let Some(track) = self.track(track_id) else {
            return Vec::new();
        };
        let mut spans: Vec<Span> = track
            .clips()
            .iter()
            .map(|c| Span {
                item: ItemRef::Clip(c.id),
                start: c.start,
                end: c.end(),
            })
            .collect();
        if track.is_backing_track {
            spans.extend(self.virtual_chord_clips(progression, ctx).into_iter().map(|v| Span {
                item: ItemRef::VirtualChord(v.index),
                start: v.start,
                end: v.end(),
            }));
        }
        spans
    }

    /// Apply every change in `changes`, or none of them if a target track is
    /// missing.
    pub fn apply_change_set(&mut self, changes: &ChangeSet) -> Result<(), TimelineError> {
        for change in changes.iter() {
            if let Some(after) = &change.after {
                if self.track(after.track_id).is_none() {
                    return Err(TimelineError::TrackNotFound(after.track_id));
                }
            }
        }
        for change in changes.iter() {
            let id = change.id();
            for track in &mut self.tracks {
                if track.remove_clip(id).is_some() {
                    break;
                }
            }
            if let Some(after) = &change.after {
                if let Some(track) = self.track_mut(after.track_id) {
                    track.upsert_clip(after.clone());
                }
            }
        }
        Ok(())
    }

    /// Overwrite the fields present in `patch`. Returns false when the clip
    /// is not on the timeline. A patch that would leave the clip invalid is
    /// refused and the clip is left untouched.
    pub fn apply_patch(&mut self, patch: &ClipPatch) -> Result<bool, TimelineError> {
        let Some(current) = self.clip(patch.id) else {
            return Ok(false);
        };
        let mut patched = current.clone();
        patched.apply_patch(patch);
        patched.validate()?;

        let track_id = patched.track_id;
        Ok(self
            .track_mut(track_id)
            .and_then(|t| t.update_clip(patch.id, |clip| *clip = patched))
            .is_some())
    }

    /// Insert a clip received from elsewhere unless it is already present.
    pub fn insert_remote_clip(&mut self, clip: Clip) -> Result<bool, TimelineError> {
        if self.clip(clip.id).is_some() {
            return Ok(false);
        }
        clip.validate()?;
        match self.track_mut(clip.track_id) {
            Some(track) => {
                track.upsert_clip(clip);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove_clip(&mut self, id: ClipId) -> Option<Clip> {
        self.tracks.iter_mut().find_map(|t| t.remove_clip(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riff_transport::{ChordEntry, ProjectId, TrackKind};

    fn timeline_with_backing() -> (Timeline, TrackId, TrackId) {
        let project = ProjectId::new();
        let backing = Track::backing(project);
        let mut licks = Track::new(project, "Licks", TrackKind::Lick);
        licks.order = 1;
        let ids = (backing.id, licks.id);
        (Timeline::new(vec![licks, backing]), ids.0, ids.1)
    }

    fn progression() -> ChordProgression {
        ChordProgression::new(vec![
            ChordEntry::new("Cmaj7", vec![60, 64, 67, 71]).expect("chord"),
            ChordEntry::new("Am7", vec![57, 60, 64, 67]).expect("chord"),
        ])
        .expect("progression")
    }

    #[test]
    fn test_tracks_sorted_by_order() {
        let (timeline, backing, licks) = timeline_with_backing();
        let ids: Vec<TrackId> = timeline.tracks().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![backing, licks]);
    }

    #[test]
    fn test_second_backing_track_refused() {
        let (mut timeline, _, _) = timeline_with_backing();
        let err = timeline.add_track(Track::backing(ProjectId::new())).unwrap_err();
        assert_eq!(err, TimelineError::BackingTrackExists);
    }

    #[test]
    fn test_virtual_chords_only_on_empty_backing_track() {
        let (mut timeline, backing, _) = timeline_with_backing();
        let ctx = TimeContext::default();
        assert_eq!(timeline.virtual_chord_clips(&progression(), &ctx).len(), 2);

        let clip = Clip::chord(backing, "Cmaj7", vec![60], 0.0, 2.0);
        let mut changes = ChangeSet::default();
        changes.push(None, Some(clip));
        timeline.apply_change_set(&changes).expect("apply");

        assert!(timeline.virtual_chord_clips(&progression(), &ctx).is_empty());
    }

    #[test]
    fn test_spans_include_virtual_chords_on_backing_track() {
        let (timeline, backing, licks) = timeline_with_backing();
        let ctx = TimeContext::default();
        let spans = timeline.spans(backing, &progression(), &ctx);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].item, ItemRef::VirtualChord(1));
        assert_eq!(spans[1].start, 2.0);
        assert!(timeline.spans(licks, &progression(), &ctx).is_empty());
    }

    #[test]
    fn test_patch_updates_only_given_fields() {
        let (mut timeline, _, licks) = timeline_with_backing();
        let clip = Clip::lick(licks, "l", None, 1.0, 3.0);
        let id = clip.id;
        let mut changes = ChangeSet::default();
        changes.push(None, Some(clip));
        timeline.apply_change_set(&changes).expect("apply");

        let mut patch = ClipPatch::new(id);
        patch.start_time = Some(4.0);
        assert_eq!(timeline.apply_patch(&patch), Ok(true));

        let clip = timeline.clip(id).expect("clip");
        assert_eq!(clip.start, 4.0);
        assert_eq!(clip.duration, 3.0);
        assert_eq!(timeline.apply_patch(&ClipPatch::new(ClipId::new())), Ok(false));
    }

    #[test]
    fn test_replace_backing_track_keeps_other_tracks() {
        let (mut timeline, backing, licks) = timeline_with_backing();
        timeline
            .insert_remote_clip(Clip::lick(licks, "l", None, 1.0, 3.0))
            .expect("insert");

        let mut generated = Track::backing(ProjectId::new());
        generated.id = backing;
        generated.upsert_clip(Clip::chord(backing, "C", vec![60], 0.0, 2.0));
        timeline.replace_backing_track(generated);

        assert_eq!(timeline.tracks().len(), 2);
        assert_eq!(timeline.backing_track().expect("backing").clips().len(), 1);
        assert_eq!(timeline.track(licks).expect("licks").clips().len(), 1);

        let mut bare = Timeline::new(vec![Track::new(ProjectId::new(), "Licks", TrackKind::Lick)]);
        bare.replace_backing_track(Track::backing(ProjectId::new()));
        assert!(bare.backing_track().is_some());
        assert_eq!(bare.tracks().len(), 2);
    }

    #[test]
    fn test_invalid_patch_leaves_clip_untouched() {
        let (mut timeline, _, licks) = timeline_with_backing();
        let clip = Clip::lick(licks, "l", None, 1.0, 3.0);
        let id = clip.id;
        assert_eq!(timeline.insert_remote_clip(clip), Ok(true));

        let mut patch = ClipPatch::new(id);
        patch.start_time = Some(-2.0);
        patch.duration = Some(1.0);
        assert!(matches!(
            timeline.apply_patch(&patch),
            Err(TimelineError::InvalidClip(ModelError::Negative { field: "start", .. }))
        ));

        patch.start_time = Some(f64::NAN);
        assert!(timeline.apply_patch(&patch).is_err());

        let clip = timeline.clip(id).expect("clip");
        assert_eq!((clip.start, clip.duration), (1.0, 3.0));

        let mut broken = Clip::lick(licks, "m", None, 5.0, 1.0);
        broken.duration = -1.0;
        assert!(timeline.insert_remote_clip(broken).is_err());
        assert_eq!(timeline.clip_count(), 1);
    }

    #[test]
    fn test_change_set_to_missing_track_applies_nothing() {
        let (mut timeline, _, licks) = timeline_with_backing();
        let mut changes = ChangeSet::default();
        changes.push(None, Some(Clip::lick(licks, "a", None, 0.0, 1.0)));
        changes.push(None, Some(Clip::lick(TrackId::new(), "b", None, 0.0, 1.0)));

        assert!(matches!(
            timeline.apply_change_set(&changes),
            Err(TimelineError::TrackNotFound(_))
        ));
        assert_eq!(timeline.clip_count(), 0);
    }

    #[test]
    fn test_remove_track_drops_its_clips() {
        let (mut timeline, _, licks) = timeline_with_backing();
        let clip = Clip::lick(licks, "l", None, 0.0, 1.0);
        let id = clip.id;
        timeline.insert_remote_clip(clip).expect("insert");
        timeline.remove_track(licks).expect("remove");
        assert!(timeline.clip(id).is_none());
        assert!(matches!(
            timeline.remove_track(licks),
            Err(TimelineError::TrackNotFound(_))
        ));
    }
}
