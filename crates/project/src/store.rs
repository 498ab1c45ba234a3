use std::future::Future;

use riff_transport::{ChordEntry, Clip, ClipId, ClipPatch, ProjectId, Track, TrackId};
use serde::{Deserialize, Serialize};

use crate::ProjectError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached; callers may retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The backend refused the request (validation, conflict, permissions).
    #[error("rejected by store: {0}")]
    Rejected(String),

    #[error(transparent)]
    Project(#[from] ProjectError),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Arguments for the external backing-track generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackingTrackRequest {
    pub project_id: ProjectId,
    pub chords: Vec<ChordEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhythm_pattern_id: Option<String>,
    pub chord_duration_beats: u32,
    pub generate_audio: bool,
}

/// An encoded mixdown ready for upload.
#[derive(Debug, Clone)]
pub struct MixdownFile {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedMixdown {
    pub url: String,
    pub duration: f64,
}

/// The persistence collaborator behind the editor.
///
/// Every call is asynchronous and may fail independently; the editor keeps
/// its optimistic local state and decides per call how to recover.
pub trait ProjectStore: Send + Sync + 'static {
    fn create_clip(
        &self,
        track_id: TrackId,
        clip: Clip,
    ) -> impl Future<Output = Result<Clip, StoreError>> + Send;

    fn update_clip(
        &self,
        clip_id: ClipId,
        patch: ClipPatch,
    ) -> impl Future<Output = Result<Clip, StoreError>> + Send;

    fn bulk_update_clips(
        &self,
        patches: Vec<ClipPatch>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete_clip(&self, clip_id: ClipId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Replaces the whole stored progression.
    fn update_chord_progression(
        &self,
        project_id: ProjectId,
        chords: Vec<ChordEntry>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn create_track(&self, track: Track) -> impl Future<Output = Result<Track, StoreError>> + Send;

    /// Updates the track's settings; its clips are left alone.
    fn update_track(&self, track: Track) -> impl Future<Output = Result<Track, StoreError>> + Send;

    fn delete_track(&self, track_id: TrackId)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Slow; callers re-fetch the timeline once it resolves.
    fn generate_backing_track(
        &self,
        request: BackingTrackRequest,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// All tracks of a project, each with its clips.
    fn fetch_timeline(
        &self,
        project_id: ProjectId,
    ) -> impl Future<Output = Result<Vec<Track>, StoreError>> + Send;

    fn upload_mixdown(
        &self,
        project_id: ProjectId,
        file: MixdownFile,
    ) -> impl Future<Output = Result<UploadedMixdown, StoreError>> + Send;
}
