use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use riff_transport::{
    ChordEntry, Clip, ClipId, ClipKind, ClipPatch, ProjectId, Track, TrackId,
};

use crate::{
    BackingTrackRequest, MixdownFile, Project, ProjectDocument, ProjectStore, StoreError,
    UploadedMixdown, save_project,
};

type BackingAudioFn = dyn Fn(&ChordEntry) -> Option<String> + Send + Sync;

#[derive(Default)]
struct State {
    projects: HashMap<ProjectId, Project>,
    tracks: HashMap<TrackId, Track>,
    bulk_batches: Vec<Vec<ClipPatch>>,
    uploads: Vec<(ProjectId, MixdownFile)>,
}

impl State {
    fn track_with_clip(&mut self, clip_id: ClipId) -> Option<&mut Track> {
        self.tracks.values_mut().find(|t| t.contains(clip_id))
    }
}

/// In-process [`ProjectStore`]. Backs the command-line renderer and the
/// tests; can be switched offline to exercise retry paths.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    offline: AtomicBool,
    reject_creates: AtomicBool,
    backing_audio: Option<Box<BackingAudioFn>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from a saved document.
    pub fn from_document(document: ProjectDocument) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for track in document.tracks {
                state.tracks.insert(track.id, track);
            }
            state.projects.insert(document.project.id, document.project);
        }
        store
    }

    /// Audio reference the fake generator attaches to each generated chord
    /// clip. Without it generated chord clips carry no audio.
    pub fn with_backing_audio(
        mut self,
        f: impl Fn(&ChordEntry) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.backing_audio = Some(Box::new(f));
        self
    }

    pub fn insert_project(&self, project: Project) {
        self.lock().projects.insert(project.id, project);
    }

    pub fn insert_track(&self, track: Track) {
        self.lock().tracks.insert(track.id, track);
    }

    pub fn project(&self, id: ProjectId) -> Option<Project> {
        self.lock().projects.get(&id).cloned()
    }

    pub fn clip(&self, id: ClipId) -> Option<Clip> {
        self.lock()
            .tracks
            .values()
            .find_map(|t| t.clip(id).cloned())
    }

    pub fn document(&self, id: ProjectId) -> Option<ProjectDocument> {
        let state = self.lock();
        let project = state.projects.get(&id)?.clone();
        Some(ProjectDocument {
            tracks: sorted_tracks(&state, id),
            project,
        })
    }

    /// Write the stored state of `id` to `path` as a project document.
    pub fn save_document(&self, id: ProjectId, path: &Path) -> Result<(), StoreError> {
        let document = self
            .document(id)
            .ok_or_else(|| StoreError::NotFound(format!("project {id}")))?;
        save_project(path, &document)?;
        Ok(())
    }

    /// Every call fails with [`StoreError::Unavailable`] while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_reject_creates(&self, reject: bool) {
        self.reject_creates.store(reject, Ordering::SeqCst);
    }

    /// Batches received by `bulk_update_clips`, oldest first.
    pub fn bulk_batches(&self) -> Vec<Vec<ClipPatch>> {
        self.lock().bulk_batches.clone()
    }

    pub fn upload_count(&self) -> usize {
        self.lock().uploads.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

fn sorted_tracks(state: &State, project_id: ProjectId) -> Vec<Track> {
    let mut tracks: Vec<Track> = state
        .tracks
        .values()
        .filter(|t| t.project_id == project_id)
        .cloned()
        .collect();
    tracks.sort_by_key(|t| t.order);
    tracks
}

impl ProjectStore for MemoryStore {
    async fn create_clip(&self, track_id: TrackId, mut clip: Clip) -> Result<Clip, StoreError> {
        self.check_online()?;
        if self.reject_creates.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("clip creation refused".to_string()));
        }
        clip.validate()
            .map_err(|e| StoreError::Rejected(e.to_string()))?;

        let mut state = self.lock();
        let track = state
            .tracks
            .get_mut(&track_id)
            .ok_or_else(|| StoreError::NotFound(format!("track {track_id}")))?;
        clip.track_id = track_id;
        track.upsert_clip(clip.clone());
        Ok(clip)
    }

    async fn update_clip(&self, clip_id: ClipId, patch: ClipPatch) -> Result<Clip, StoreError> {
        self.check_online()?;
        let mut state = self.lock();
        let track = state
            .track_with_clip(clip_id)
            .ok_or_else(|| StoreError::NotFound(format!("clip {clip_id}")))?;
        track
            .update_clip(clip_id, |clip| {
                clip.apply_patch(&patch);
                clip.clone()
            })
            .ok_or_else(|| StoreError::NotFound(format!("clip {clip_id}")))
    }

    async fn bulk_update_clips(&self, patches: Vec<ClipPatch>) -> Result<(), StoreError> {
        self.check_online()?;
        let mut state = self.lock();
        for patch in &patches {
            match state.track_with_clip(patch.id) {
                Some(track) => {
                    track.update_clip(patch.id, |clip| clip.apply_patch(patch));
                }
                None => log::debug!("bulk update skipped unknown clip {}", patch.id),
            }
        }
        state.bulk_batches.push(patches);
        Ok(())
    }

    async fn delete_clip(&self, clip_id: ClipId) -> Result<(), StoreError> {
        self.check_online()?;
        let mut state = self.lock();
        let track = state
            .track_with_clip(clip_id)
            .ok_or_else(|| StoreError::NotFound(format!("clip {clip_id}")))?;
        track.remove_clip(clip_id);
        Ok(())
    }

    async fn update_chord_progression(
        &self,
        project_id: ProjectId,
        chords: Vec<ChordEntry>,
    ) -> Result<(), StoreError> {
        self.check_online()?;
        let mut state = self.lock();
        let project = state
            .projects
            .get_mut(&project_id)
            .ok_or_else(|| StoreError::NotFound(format!("project {project_id}")))?;
        project.chord_progression = chords;
        Ok(())
    }

    async fn create_track(&self, track: Track) -> Result<Track, StoreError> {
        self.check_online()?;
        let mut state = self.lock();
        if track.is_backing_track
            && state
                .tracks
                .values()
                .any(|t| t.project_id == track.project_id && t.is_backing_track)
        {
            return Err(StoreError::Rejected(
                "project already has a backing track".to_string(),
            ));
        }
        state.tracks.insert(track.id, track.clone());
        Ok(track)
    }

    async fn update_track(&self, mut track: Track) -> Result<Track, StoreError> {
        self.check_online()?;
        let mut state = self.lock();
        let existing = state
            .tracks
            .get_mut(&track.id)
            .ok_or_else(|| StoreError::NotFound(format!("track {}", track.id)))?;
        track.replace_clips(existing.take_clips());
        *existing = track.clone();
        Ok(track)
    }

    async fn delete_track(&self, track_id: TrackId) -> Result<(), StoreError> {
        self.check_online()?;
        self.lock()
            .tracks
            .remove(&track_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("track {track_id}")))
    }

    async fn generate_backing_track(&self, request: BackingTrackRequest) -> Result<(), StoreError> {
        self.check_online()?;
        let mut state = self.lock();
        let project = state
            .projects
            .get_mut(&request.project_id)
            .ok_or_else(|| StoreError::NotFound(format!("project {}", request.project_id)))?;
        project.chord_progression = request.chords.clone();
        let seconds_per_beat = 60.0 / project.tempo.bpm();
        let chord_duration = request.chord_duration_beats.max(1) as f64 * seconds_per_beat;

        let existing = state
            .tracks
            .values()
            .find(|t| t.project_id == request.project_id && t.is_backing_track)
            .map(|t| t.id);
        let track_id = match existing {
            Some(id) => id,
            None => {
                let track = Track::backing(request.project_id);
                let id = track.id;
                state.tracks.insert(id, track);
                id
            }
        };

        let clips: Vec<Clip> = request
            .chords
            .iter()
            .enumerate()
            .map(|(index, chord)| {
                let mut clip = Clip::chord(
                    track_id,
                    chord.chord_name.clone(),
                    chord.midi_notes.clone(),
                    index as f64 * chord_duration,
                    chord_duration,
                );
                if let ClipKind::Chord(source) = &mut clip.kind {
                    source.rhythm_pattern_id = request.rhythm_pattern_id.clone();
                    if request.generate_audio {
                        source.audio_url = self.backing_audio.as_ref().and_then(|f| f(chord));
                    }
                }
                clip
            })
            .collect();

        log::info!(
            "generated {} backing clips for project {}",
            clips.len(),
            request.project_id
        );
        if let Some(track) = state.tracks.get_mut(&track_id) {
            track.replace_clips(clips);
        }
        Ok(())
    }

    async fn fetch_timeline(&self, project_id: ProjectId) -> Result<Vec<Track>, StoreError> {
        self.check_online()?;
        let state = self.lock();
        if !state.projects.contains_key(&project_id) {
            return Err(StoreError::NotFound(format!("project {project_id}")));
        }
        Ok(sorted_tracks(&state, project_id))
    }

    async fn upload_mixdown(
        &self,
        project_id: ProjectId,
        file: MixdownFile,
    ) -> Result<UploadedMixdown, StoreError> {
        self.check_online()?;
        let mut state = self.lock();
        let index = state.uploads.len();
        let url = format!("memory://mixdowns/{project_id}/{index}-{}", file.file_name);
        let duration = file.duration;
        state.uploads.push((project_id, file));
        Ok(UploadedMixdown { url, duration })
    }
}
