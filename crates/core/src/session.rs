use std::sync::{Arc, RwLock};

use riff_decode::AudioCache;
use riff_project::{Project, ProjectStore, StoreError};
use riff_render::MixdownError;
use riff_transport::{ChordEntry, Clip, ClipId, ClipPatch, Track, TrackId, TrackKind};
use tokio::task::JoinHandle;

use crate::autosave::{Autosave, DirtySet, FlushReport};
use crate::chords::{ChordError, ChordProgression, VirtualChordClip};
use crate::clip_ops::ResizeEdge;
use crate::collab::{Broadcast, TimelineEvent};
use crate::commands::{ChangeSet, Command, EditContext, History};
use crate::config::EngineConfig;
use crate::drag::{DragController, PointerContext, Preview};
use crate::export::{self, MixdownResult, SharedResolver};
use crate::snap::ItemRef;
use crate::time::TimeContext;
use crate::timeline::{SharedTimeline, Timeline, TimelineError, read_timeline, write_timeline};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error(transparent)]
    Chord(#[from] ChordError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mixdown(#[from] MixdownError),

    #[error("render task failed: {0}")]
    RenderTask(#[from] tokio::task::JoinError),
}

/// Mix settings of one track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackMix {
    pub volume: f32,
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
}

impl From<&Track> for TrackMix {
    fn from(track: &Track) -> Self {
        Self {
            volume: track.volume,
            pan: track.pan,
            muted: track.muted,
            solo: track.solo,
        }
    }
}

/// One open project in the editor.
///
/// Owns the timeline, the chord progression, undo history, the pointer
/// gesture in progress and the autosave timer. Created when the editor opens
/// a project and closed when it goes away; the timer stops with it.
pub struct EditorSession<S: ProjectStore, B: Broadcast> {
    project: Project,
    store: Arc<S>,
    broadcast: B,
    resolver: SharedResolver,
    config: EngineConfig,
    zoom: f64,
    timeline: SharedTimeline,
    progression: ChordProgression,
    history: History,
    drag: DragController,
    autosave: Arc<Autosave<S>>,
    timer: Option<JoinHandle<()>>,
}

impl<S: ProjectStore, B: Broadcast> EditorSession<S, B> {
    /// Fetch the project's timeline and start the autosave timer. Must be
    /// called inside a tokio runtime.
    pub async fn open(
        store: Arc<S>,
        broadcast: B,
        project: Project,
        config: EngineConfig,
    ) -> Result<Self, SessionError> {
        let tracks = store.fetch_timeline(project.id).await?;
        let progression = ChordProgression::new(
            project
                .chord_progression
                .iter()
                .filter(|c| !c.chord_name.trim().is_empty())
                .cloned()
                .collect(),
        )?;

        let timeline: SharedTimeline = Arc::new(RwLock::new(Timeline::new(tracks)));
        let autosave = Arc::new(Autosave::new(
            Arc::clone(&store),
            Arc::clone(&timeline),
            config.autosave_debounce(),
        ));
        let timer = autosave.spawn_timer();

        log::info!(
            "opened project {} with {} clips",
            project.id,
            read_timeline(&timeline).clip_count()
        );
        Ok(Self {
            drag: DragController::new(config.snap_threshold_beats, config.min_clip_duration),
            project,
            store,
            broadcast,
            resolver: Arc::new(AudioCache::new()),
            config,
            zoom: 1.0,
            timeline,
            progression,
            history: History::default(),
            autosave,
            timer: Some(timer),
        })
    }

    /// Use `resolver` to find clip audio when exporting.
    pub fn with_resolver(mut self, resolver: SharedResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared handle to the timeline, for readers on other tasks.
    pub fn timeline(&self) -> SharedTimeline {
        Arc::clone(&self.timeline)
    }

    /// A copy of the current timeline.
    pub fn snapshot(&self) -> Timeline {
        read_timeline(&self.timeline).clone()
    }

    pub fn clip(&self, id: ClipId) -> Option<Clip> {
        read_timeline(&self.timeline).clip(id).cloned()
    }

    pub fn progression(&self) -> &ChordProgression {
        &self.progression
    }

    pub fn pending_saves(&self) -> DirtySet {
        self.autosave.snapshot()
    }

    pub fn time_context(&self) -> TimeContext {
        TimeContext::new(
            self.project.tempo.bpm(),
            self.project.time_signature,
            self.config.base_pixels_per_second,
        )
        .with_zoom(self.zoom)
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        if zoom.is_finite() && zoom > 0.0 {
            self.zoom = zoom;
        }
    }

    pub fn virtual_chord_clips(&self) -> Vec<VirtualChordClip> {
        read_timeline(&self.timeline).virtual_chord_clips(&self.progression, &self.time_context())
    }

    fn edit_context(&self) -> EditContext<'_> {
        EditContext {
            time: self.time_context(),
            progression: &self.progression,
            min_clip_duration: self.config.min_clip_duration,
            resize_resolves_overlaps: self.config.resize_resolves_overlaps,
        }
    }

    pub fn pointer_down(&mut self, item: ItemRef, pointer: f64) -> Result<(), SessionError> {
        let time = self.time_context();
        let timeline = read_timeline(&self.timeline);
        let cx = PointerContext {
            timeline: &timeline,
            progression: &self.progression,
            time: &time,
        };
        self.drag.begin_drag(cx, item, pointer)?;
        Ok(())
    }

    pub fn pointer_down_edge(&mut self, clip_id: ClipId, edge: ResizeEdge) -> Result<(), SessionError> {
        let timeline = read_timeline(&self.timeline);
        self.drag.begin_resize(&timeline, clip_id, edge)?;
        Ok(())
    }

    pub fn pointer_move(&mut self, pointer: f64) -> Option<Preview> {
        let time = self.time_context();
        let timeline = read_timeline(&self.timeline);
        let cx = PointerContext {
            timeline: &timeline,
            progression: &self.progression,
            time: &time,
        };
        self.drag.pointer_move(cx, pointer)
    }

    /// Commit the gesture in progress. `None` when it changed nothing.
    pub fn pointer_up(&mut self) -> Result<Option<ChangeSet>, SessionError> {
        let command = {
            let timeline = read_timeline(&self.timeline);
            self.drag.pointer_up(&timeline)
        };
        match command {
            Some(command) => self.execute(command).map(Some),
            None => Ok(None),
        }
    }

    pub fn cancel_gesture(&mut self) {
        self.drag.cancel();
    }

    pub fn drag_preview(&self) -> Option<Preview> {
        self.drag.preview()
    }

    /// Apply `command` locally, then queue it for saving and tell other
    /// editors.
    pub fn execute(&mut self, command: Command) -> Result<ChangeSet, SessionError> {
        let changes = {
            let ctx = self.edit_context();
            let mut timeline = write_timeline(&self.timeline);
            command.apply(&mut timeline, &ctx)?
        };
        self.publish(&changes);
        self.autosave.record(&changes);
        self.history.push(changes.clone());
        Ok(changes)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> Result<Option<ChangeSet>, SessionError> {
        match self.history.undo() {
            Some(changes) => self.replay(changes).map(Some),
            None => Ok(None),
        }
    }

    pub fn redo(&mut self) -> Result<Option<ChangeSet>, SessionError> {
        match self.history.redo() {
            Some(changes) => self.replay(changes).map(Some),
            None => Ok(None),
        }
    }

    fn replay(&mut self, changes: ChangeSet) -> Result<ChangeSet, SessionError> {
        write_timeline(&self.timeline).apply_change_set(&changes)?;
        self.publish(&changes);
        self.autosave.record(&changes);
        Ok(changes)
    }

    fn publish(&self, changes: &ChangeSet) {
        for event in TimelineEvent::for_changes(changes) {
            self.broadcast.publish(event);
        }
    }

    /// Drop a lick on `track_id` and create it in the store. The local
    /// insert is rolled back if the store refuses it.
    pub async fn insert_lick(
        &mut self,
        track_id: TrackId,
        lick_id: impl Into<String>,
        audio_url: Option<String>,
        start: f64,
        source_duration: f64,
    ) -> Result<Clip, SessionError> {
        let clip = Clip::lick(track_id, lick_id, audio_url, start.max(0.0), source_duration);
        let id = clip.id;
        let changes = {
            let ctx = self.edit_context();
            let mut timeline = write_timeline(&self.timeline);
            Command::InsertClip { clip: clip.clone() }.apply(&mut timeline, &ctx)?
        };

        match self.store.create_clip(track_id, clip).await {
            Ok(saved) => {
                self.autosave.record(&changes);
                // Already in the store.
                self.autosave.forget([id]);
                self.publish(&changes);
                self.history.push(changes);
                Ok(saved)
            }
            Err(error) => {
                log::warn!("clip {id} rejected by the store, rolling back: {error}");
                write_timeline(&self.timeline).apply_change_set(&changes.inverse())?;
                Err(error.into())
            }
        }
    }

    /// Delete a clip locally and in the store. A failed store call is left to
    /// autosave to retry.
    pub async fn delete_clip(&mut self, clip_id: ClipId) -> Result<ChangeSet, SessionError> {
        let changes = self.execute(Command::DeleteClip { clip_id })?;
        self.autosave.forget([clip_id]);
        match self.store.delete_clip(clip_id).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(error) => {
                log::warn!("deleting clip {clip_id} failed, will retry: {error}");
                self.autosave.mark_removed(clip_id);
            }
        }
        Ok(changes)
    }

    /// Replace the progression, save it and tell other editors. Creates the
    /// backing track the first time chords appear.
    pub async fn update_chord_progression(&mut self, entries: Vec<ChordEntry>) -> Result<(), SessionError> {
        let progression = ChordProgression::new(entries)?;
        if !progression.is_empty() {
            self.ensure_backing_track().await?;
        }
        let chords = progression.entries().to_vec();
        self.store
            .update_chord_progression(self.project.id, chords.clone())
            .await?;

        self.progression = progression;
        self.project.chord_progression = chords.clone();
        self.broadcast.publish(TimelineEvent::ChordProgressionUpdate {
            project_id: self.project.id,
            chords,
        });
        Ok(())
    }

    /// The backing track, created in the store if the project has none.
    pub async fn ensure_backing_track(&mut self) -> Result<TrackId, SessionError> {
        let existing = read_timeline(&self.timeline).backing_track().map(|t| t.id);
        if let Some(id) = existing {
            return Ok(id);
        }
        let track = Track::backing(self.project.id);
        let created = self.store.create_track(track).await?;
        let id = created.id;
        write_timeline(&self.timeline).add_track(created)?;
        log::info!("created backing track {id}");
        Ok(id)
    }

    pub async fn add_track(&mut self, name: impl Into<String>, kind: TrackKind) -> Result<Track, SessionError> {
        let mut track = Track::new(self.project.id, name, kind);
        track.order = read_timeline(&self.timeline)
            .tracks()
            .iter()
            .map(|t| t.order + 1)
            .max()
            .unwrap_or(0);
        let created = self.store.create_track(track).await?;
        write_timeline(&self.timeline).add_track(created.clone())?;
        Ok(created)
    }

    /// Delete a track and its clips. Pending saves for those clips are
    /// dropped.
    pub async fn remove_track(&mut self, track_id: TrackId) -> Result<(), SessionError> {
        if read_timeline(&self.timeline).track(track_id).is_none() {
            return Err(TimelineError::TrackNotFound(track_id).into());
        }
        self.store.delete_track(track_id).await?;
        let removed = write_timeline(&self.timeline).remove_track(track_id)?;
        self.autosave.forget(removed.clips().iter().map(|c| c.id));
        self.history.clear();
        Ok(())
    }

    pub async fn set_track_mix(&mut self, track_id: TrackId, mix: TrackMix) -> Result<Track, SessionError> {
        let (before, updated) = {
            let mut timeline = write_timeline(&self.timeline);
            let before = TrackMix::from(
                timeline
                    .track(track_id)
                    .ok_or(TimelineError::TrackNotFound(track_id))?,
            );
            let updated = timeline
                .update_track(track_id, |track| apply_mix(track, mix))?
                .clone();
            (before, updated)
        };

        match self.store.update_track(updated.clone()).await {
            Ok(_) => Ok(updated),
            Err(error) => {
                write_timeline(&self.timeline).update_track(track_id, |track| apply_mix(track, before))?;
                Err(error.into())
            }
        }
    }

    /// Apply an edit made by another editor. Field-level last write wins;
    /// nothing is saved or re-broadcast. Returns whether anything changed.
    pub fn apply_remote(&mut self, event: TimelineEvent) -> bool {
        match event {
            TimelineEvent::TimelineItemPositionUpdate { item } => {
                apply_remote_patch(&mut write_timeline(&self.timeline), &item)
            }
            TimelineEvent::TimelineItemsBulkUpdate { items } => {
                let mut timeline = write_timeline(&self.timeline);
                items
                    .iter()
                    .fold(false, |changed, patch| apply_remote_patch(&mut timeline, patch) || changed)
            }
            TimelineEvent::LickAddToTimeline { item } => {
                let id = item.id;
                write_timeline(&self.timeline)
                    .insert_remote_clip(item)
                    .unwrap_or_else(|error| {
                        log::warn!("ignoring remote clip {id}: {error}");
                        false
                    })
            }
            TimelineEvent::TimelineItemDelete { item_id } => {
                self.autosave.forget([item_id]);
                write_timeline(&self.timeline).remove_clip(item_id).is_some()
            }
            TimelineEvent::ChordProgressionUpdate { project_id, chords } => {
                if project_id != self.project.id {
                    return false;
                }
                let chords: Vec<ChordEntry> = chords
                    .into_iter()
                    .filter(|c| !c.chord_name.trim().is_empty())
                    .collect();
                match self.progression.set(chords.clone()) {
                    Ok(()) => {
                        self.project.chord_progression = chords;
                        true
                    }
                    Err(error) => {
                        log::warn!("ignoring remote chord progression: {error}");
                        false
                    }
                }
            }
        }
    }

    /// Replace the local timeline with the store's copy. Pending edits are
    /// saved first; if that fails nothing is replaced.
    pub async fn reload(&mut self) -> Result<(), SessionError> {
        self.autosave.flush().await?;
        let tracks = self.store.fetch_timeline(self.project.id).await?;
        write_timeline(&self.timeline).replace_tracks(tracks);
        self.history.clear();
        self.drag.cancel();
        Ok(())
    }

    /// Take the freshly generated backing track from the store. Local edits
    /// on every other track stay authoritative, saved or not.
    async fn adopt_generated_backing_track(&mut self) -> Result<(), SessionError> {
        let tracks = self.store.fetch_timeline(self.project.id).await?;
        let Some(backing) = tracks.into_iter().find(|t| t.is_backing_track) else {
            return Err(TimelineError::NoBackingTrack.into());
        };
        write_timeline(&self.timeline).replace_backing_track(backing);
        self.history.clear();
        self.drag.cancel();
        Ok(())
    }

    pub async fn flush(&self) -> Result<FlushReport, SessionError> {
        Ok(self.autosave.flush().await?)
    }

    /// Save pending edits, generate the backing track if it is missing,
    /// render everything and upload the result.
    pub async fn export_mixdown(&mut self, duration_override: Option<f64>) -> Result<MixdownResult, SessionError> {
        if let Err(error) = self.autosave.flush().await {
            log::warn!("exporting with unsaved edits: {error}");
        }

        let needs_backing = export::needs_backing_generation(&read_timeline(&self.timeline), &self.progression);
        if needs_backing {
            let request = export::backing_request(self.project.id, &self.progression, &self.time_context());
            log::info!("generating backing track for {} chords", request.chords.len());
            self.store.generate_backing_track(request).await?;
            self.adopt_generated_backing_track().await?;
        }

        let tracks = read_timeline(&self.timeline).tracks().to_vec();
        export::render_and_upload(
            self.store.as_ref(),
            Arc::clone(&self.resolver),
            self.project.id,
            tracks,
            self.config.mixdown.clone(),
            duration_override,
        )
        .await
    }

    /// Flush pending edits and stop the autosave timer.
    pub async fn close(mut self) -> Result<FlushReport, SessionError> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.flush().await
    }
}

impl<S: ProjectStore, B: Broadcast> Drop for EditorSession<S, B> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

fn apply_remote_patch(timeline: &mut Timeline, patch: &ClipPatch) -> bool {
    timeline.apply_patch(patch).unwrap_or_else(|error| {
        log::warn!("ignoring remote update of clip {}: {error}", patch.id);
        false
    })
}

fn apply_mix(track: &mut Track, mix: TrackMix) {
    track.set_volume(mix.volume);
    track.set_pan(mix.pan);
    track.muted = mix.muted;
    track.solo = mix.solo;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{ChannelBroadcast, NullBroadcast};
    use riff_project::{MemoryStore, ProjectDocument, Tempo};
    use riff_render::{MissingAudio, SkipReason};
    use riff_transport::{AudioArc, ClipPatch};

    struct Fixture {
        store: Arc<MemoryStore>,
        project: Project,
        licks: TrackId,
    }

    /// A 120 BPM project with an empty lick track.
    fn fixture() -> Fixture {
        let project = Project::new("Song", Tempo::default());
        let mut licks = Track::new(project.id, "Licks", TrackKind::Lick);
        licks.order = 1;
        let licks_id = licks.id;
        let store = Arc::new(MemoryStore::from_document(ProjectDocument {
            project: project.clone(),
            tracks: vec![licks],
        }));
        Fixture {
            store,
            project,
            licks: licks_id,
        }
    }

    async fn open(fx: &Fixture) -> EditorSession<MemoryStore, NullBroadcast> {
        EditorSession::open(
            Arc::clone(&fx.store),
            NullBroadcast,
            fx.project.clone(),
            EngineConfig::default(),
        )
        .await
        .expect("open")
    }

    fn chords() -> Vec<ChordEntry> {
        vec![
            ChordEntry::new("Cmaj7", vec![60, 64, 67, 71]).expect("chord"),
            ChordEntry::new("Fmaj7", vec![53, 57, 60, 64]).expect("chord"),
        ]
    }

    #[tokio::test]
    async fn test_insert_lick_persists_immediately() {
        let fx = fixture();
        let mut session = open(&fx).await;

        let clip = session
            .insert_lick(fx.licks, "lick-1", Some("mem://a.wav".into()), 1.0, 2.0)
            .await
            .expect("insert");

        assert!(fx.store.clip(clip.id).is_some());
        assert!(session.pending_saves().is_empty());
        assert!(session.can_undo());
    }

    #[tokio::test]
    async fn test_rejected_insert_is_rolled_back() {
        let fx = fixture();
        let mut session = open(&fx).await;
        let first = session
            .insert_lick(fx.licks, "a", None, 2.0, 4.0)
            .await
            .expect("insert");
        fx.store.set_reject_creates(true);

        // Would trim the first clip to [2, 4).
        let err = session.insert_lick(fx.licks, "b", None, 4.0, 4.0).await.unwrap_err();

        assert!(matches!(err, SessionError::Store(StoreError::Rejected(_))));
        let timeline = session.snapshot();
        assert_eq!(timeline.clip_count(), 1);
        assert_eq!(timeline.clip(first.id).expect("first").duration, 4.0);
        assert!(session.pending_saves().is_empty());
    }

    #[tokio::test]
    async fn test_drag_commits_move_and_autosaves() {
        let fx = fixture();
        let mut session = open(&fx).await;
        let clip = session
            .insert_lick(fx.licks, "a", None, 0.0, 1.0)
            .await
            .expect("insert");

        session.pointer_down(ItemRef::Clip(clip.id), 0.5).expect("down");
        session.pointer_move(3.52);
        let changes = session.pointer_up().expect("up").expect("moved");

        assert_eq!(changes.len(), 1);
        assert_eq!(session.clip(clip.id).expect("clip").start, 3.0);
        assert!(session.pending_saves().contains(clip.id));

        session.flush().await.expect("flush");
        assert_eq!(fx.store.clip(clip.id).expect("stored").start, 3.0);
        assert!(session.pending_saves().is_empty());
    }

    #[tokio::test]
    async fn test_undo_and_redo_move() {
        let fx = fixture();
        let mut session = open(&fx).await;
        let clip = session
            .insert_lick(fx.licks, "a", None, 0.0, 1.0)
            .await
            .expect("insert");
        session
            .execute(Command::MoveClip {
                clip_id: clip.id,
                start: 4.0,
            })
            .expect("move");

        session.undo().expect("undo");
        assert_eq!(session.clip(clip.id).expect("clip").start, 0.0);
        session.redo().expect("redo");
        assert_eq!(session.clip(clip.id).expect("clip").start, 4.0);
    }

    #[tokio::test]
    async fn test_undo_insert_deletes_on_flush() {
        let fx = fixture();
        let mut session = open(&fx).await;
        let clip = session
            .insert_lick(fx.licks, "a", None, 0.0, 1.0)
            .await
            .expect("insert");

        session.undo().expect("undo");
        assert!(session.clip(clip.id).is_none());
        session.flush().await.expect("flush");
        assert!(fx.store.clip(clip.id).is_none());
    }

    #[tokio::test]
    async fn test_delete_clip_reaches_store() {
        let fx = fixture();
        let mut session = open(&fx).await;
        let clip = session
            .insert_lick(fx.licks, "a", None, 0.0, 1.0)
            .await
            .expect("insert");

        session.delete_clip(clip.id).await.expect("delete");

        assert!(session.clip(clip.id).is_none());
        assert!(fx.store.clip(clip.id).is_none());
        assert!(session.pending_saves().is_empty());
    }

    #[tokio::test]
    async fn test_chord_progression_creates_backing_track() {
        let fx = fixture();
        let broadcast = ChannelBroadcast::default();
        let mut events = broadcast.subscribe();
        let mut session = EditorSession::open(
            Arc::clone(&fx.store),
            broadcast.clone(),
            fx.project.clone(),
            EngineConfig::default(),
        )
        .await
        .expect("open");

        session.update_chord_progression(chords()).await.expect("update");

        let virtual_clips = session.virtual_chord_clips();
        assert_eq!(virtual_clips.len(), 2);
        assert_eq!((virtual_clips[0].start, virtual_clips[0].duration), (0.0, 2.0));
        let stored = fx.store.project(fx.project.id).expect("project");
        assert_eq!(stored.chord_progression.len(), 2);
        assert!(matches!(
            events.recv().await.expect("event"),
            TimelineEvent::ChordProgressionUpdate { .. }
        ));
    }

    #[tokio::test]
    async fn test_empty_chord_name_rejected_before_store() {
        let fx = fixture();
        let mut session = open(&fx).await;
        let mut entries = chords();
        entries[1].chord_name = String::new();

        let err = session.update_chord_progression(entries).await.unwrap_err();

        assert!(matches!(err, SessionError::Chord(ChordError::EmptyName(1))));
        assert!(session.progression().is_empty());
        assert!(session.snapshot().backing_track().is_none());
    }

    #[tokio::test]
    async fn test_dragging_virtual_chord_materializes_progression() {
        let fx = fixture();
        let mut session = open(&fx).await;
        session.update_chord_progression(chords()).await.expect("update");

        session.pointer_down(ItemRef::VirtualChord(0), 0.5).expect("down");
        session.pointer_move(4.5);
        let changes = session.pointer_up().expect("up").expect("changes");

        assert_eq!(changes.len(), 2);
        assert!(session.virtual_chord_clips().is_empty());
        let backing = session.snapshot().backing_track().expect("backing").clone();
        let starts: Vec<f64> = backing.clips().iter().map(|c| c.start).collect();
        assert_eq!(starts, vec![2.0, 4.0]);
        assert_eq!(session.pending_saves().created().len(), 2);
    }

    #[tokio::test]
    async fn test_remote_patch_is_field_level() {
        let fx = fixture();
        let mut session = open(&fx).await;
        let clip = session
            .insert_lick(fx.licks, "a", None, 0.0, 2.0)
            .await
            .expect("insert");

        let mut patch = ClipPatch::new(clip.id);
        patch.start_time = Some(6.0);
        assert!(session.apply_remote(TimelineEvent::TimelineItemPositionUpdate { item: patch }));

        let updated = session.clip(clip.id).expect("clip");
        assert_eq!(updated.start, 6.0);
        assert_eq!(updated.duration, 2.0);
        assert!(session.pending_saves().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_remote_patch_is_dropped() {
        let fx = fixture();
        let mut session = open(&fx).await;
        let clip = session
            .insert_lick(fx.licks, "a", None, 1.0, 2.0)
            .await
            .expect("insert");
        let other = session
            .insert_lick(fx.licks, "b", None, 4.0, 2.0)
            .await
            .expect("insert");

        let mut negative = ClipPatch::new(clip.id);
        negative.start_time = Some(-3.0);
        assert!(!session.apply_remote(TimelineEvent::TimelineItemPositionUpdate { item: negative }));

        let mut nan = ClipPatch::new(clip.id);
        nan.duration = Some(f64::NAN);
        let mut valid = ClipPatch::new(other.id);
        valid.start_time = Some(8.0);
        assert!(session.apply_remote(TimelineEvent::TimelineItemsBulkUpdate {
            items: vec![nan, valid],
        }));

        let kept = session.clip(clip.id).expect("clip");
        assert_eq!((kept.start, kept.duration), (1.0, 2.0));
        assert_eq!(session.clip(other.id).expect("other").start, 8.0);
        assert!(session.pending_saves().is_empty());
    }

    #[tokio::test]
    async fn test_remote_delete_cancels_drag_commit() {
        let fx = fixture();
        let mut session = open(&fx).await;
        let clip = session
            .insert_lick(fx.licks, "a", None, 0.0, 2.0)
            .await
            .expect("insert");

        session.pointer_down(ItemRef::Clip(clip.id), 0.0).expect("down");
        session.pointer_move(3.0);
        session.apply_remote(TimelineEvent::TimelineItemDelete { item_id: clip.id });

        assert_eq!(session.pointer_up().expect("up"), None);
        assert_eq!(session.snapshot().clip_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_track_forgets_pending_clips() {
        let fx = fixture();
        let mut session = open(&fx).await;
        let clip = session
            .insert_lick(fx.licks, "a", None, 0.0, 2.0)
            .await
            .expect("insert");
        session
            .execute(Command::MoveClip {
                clip_id: clip.id,
                start: 1.0,
            })
            .expect("move");

        session.remove_track(fx.licks).await.expect("remove");

        assert!(session.pending_saves().is_empty());
        assert!(fx.store.document(fx.project.id).expect("doc").tracks.is_empty());
    }

    #[tokio::test]
    async fn test_track_mix_rolls_back_when_offline() {
        let fx = fixture();
        let mut session = open(&fx).await;
        fx.store.set_offline(true);
        let mix = TrackMix {
            volume: 0.5,
            pan: -0.25,
            muted: false,
            solo: true,
        };

        assert!(session.set_track_mix(fx.licks, mix).await.is_err());
        let track = session.snapshot().track(fx.licks).expect("track").clone();
        assert_eq!(TrackMix::from(&track).volume, 1.0);
        assert!(!track.solo);

        fx.store.set_offline(false);
        let track = session.set_track_mix(fx.licks, mix).await.expect("mix");
        assert_eq!(TrackMix::from(&track), mix);
    }

    #[tokio::test]
    async fn test_export_generates_backing_track_first() {
        let fx = fixture();
        let store = Arc::new(
            MemoryStore::from_document(ProjectDocument {
                project: fx.project.clone(),
                tracks: Vec::new(),
            })
            .with_backing_audio(|chord| Some(format!("mem://{}.wav", chord.chord_name))),
        );
        let cache = AudioCache::new();
        for chord in chords() {
            cache.insert(
                format!("mem://{}.wav", chord.chord_name),
                AudioArc::new(vec![0.25; 8000 * 2 * 2], 8000, 2),
            );
        }
        let mut config = EngineConfig::default();
        config.mixdown.sample_rate = 8000;
        let mut session = EditorSession::open(Arc::clone(&store), NullBroadcast, fx.project.clone(), config)
            .await
            .expect("open")
            .with_resolver(Arc::new(cache));
        session.update_chord_progression(chords()).await.expect("chords");

        let result = session.export_mixdown(None).await.expect("export");

        assert_eq!(result.duration, 4.0);
        assert!(result.warnings.is_empty());
        assert_eq!(store.upload_count(), 1);
        assert_eq!(session.snapshot().backing_track().expect("backing").clips().len(), 2);
    }

    #[tokio::test]
    async fn test_export_keeps_unsaved_edits() {
        let fx = fixture();
        let store = Arc::new(
            MemoryStore::from_document(ProjectDocument {
                project: fx.project.clone(),
                tracks: fx.store.document(fx.project.id).expect("doc").tracks,
            })
            .with_backing_audio(|chord| Some(format!("mem://{}.wav", chord.chord_name))),
        );
        let cache = AudioCache::new();
        cache.insert("mem://a.wav", AudioArc::new(vec![0.25; 8000 * 2 * 4], 8000, 2));
        for chord in chords() {
            cache.insert(
                format!("mem://{}.wav", chord.chord_name),
                AudioArc::new(vec![0.25; 8000 * 2 * 2], 8000, 2),
            );
        }
        let mut config = EngineConfig::default();
        config.mixdown.sample_rate = 8000;
        let mut session = EditorSession::open(Arc::clone(&store), NullBroadcast, fx.project.clone(), config)
            .await
            .expect("open")
            .with_resolver(Arc::new(cache));
        session.update_chord_progression(chords()).await.expect("chords");

        let a = session
            .insert_lick(fx.licks, "a", Some("mem://a.wav".into()), 0.0, 4.0)
            .await
            .expect("insert");
        // Splits `a` into [0, 1) and a new right half at [2, 4).
        session
            .insert_lick(fx.licks, "b", Some("mem://a.wav".into()), 1.0, 1.0)
            .await
            .expect("insert");
        store.set_reject_creates(true);

        session.export_mixdown(None).await.expect("export");

        let timeline = session.snapshot();
        assert_eq!(timeline.clip(a.id).expect("a").duration, 1.0);
        assert_eq!(timeline.track(fx.licks).expect("licks").clips().len(), 3);
        assert_eq!(timeline.backing_track().expect("backing").clips().len(), 2);

        store.set_reject_creates(false);
        session.flush().await.expect("flush");
        assert_eq!(store.clip(a.id).expect("stored").duration, 1.0);
        let stored = store.document(fx.project.id).expect("doc");
        let licks = stored.tracks.iter().find(|t| t.id == fx.licks).expect("licks");
        assert_eq!(licks.clips().len(), 3);
    }

    #[tokio::test]
    async fn test_reload_refuses_to_drop_unsaved_edits() {
        let fx = fixture();
        let mut session = open(&fx).await;
        let clip = session
            .insert_lick(fx.licks, "a", None, 0.0, 2.0)
            .await
            .expect("insert");
        session
            .execute(Command::MoveClip {
                clip_id: clip.id,
                start: 5.0,
            })
            .expect("move");
        fx.store.set_offline(true);

        assert!(session.reload().await.is_err());
        assert_eq!(session.clip(clip.id).expect("clip").start, 5.0);
        assert!(session.pending_saves().contains(clip.id));

        fx.store.set_offline(false);
        session.reload().await.expect("reload");
        assert_eq!(session.clip(clip.id).expect("clip").start, 5.0);
        assert!(!session.can_undo());
    }

    #[tokio::test]
    async fn test_export_without_backing_audio_names_cause() {
        let fx = fixture();
        let mut session = open(&fx).await;
        session.update_chord_progression(chords()).await.expect("chords");

        let err = session.export_mixdown(None).await.unwrap_err();

        match err {
            SessionError::Mixdown(MixdownError::NothingToRender { cause, warnings }) => {
                assert_eq!(cause, MissingAudio::NoBackingAudio);
                assert_eq!(warnings.len(), 2);
                assert!(warnings.iter().all(|w| w.reason == SkipReason::NoGeneratedAudio));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_flushes_pending_edits() {
        let fx = fixture();
        let mut session = open(&fx).await;
        let clip = session
            .insert_lick(fx.licks, "a", None, 0.0, 1.0)
            .await
            .expect("insert");
        session
            .execute(Command::MoveClip {
                clip_id: clip.id,
                start: 2.0,
            })
            .expect("move");

        let report = session.close().await.expect("close");

        assert_eq!(report.updated, 1);
        assert_eq!(fx.store.clip(clip.id).expect("stored").start, 2.0);
    }
}
