use serde::{Deserialize, Serialize};

use crate::{Clip, ClipId, ProjectId, TrackId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackKind {
    Backing,
    Lick,
    Midi,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,
    pub project_id: ProjectId,
    pub name: String,
    pub kind: TrackKind,
    /// Position in the track list, lowest first.
    pub order: u32,
    pub color: String,
    pub volume: f32,
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
    pub is_backing_track: bool,
    /// Always sorted by start time. Mutate through the methods below so the
    /// ordering holds.
    #[serde(default)]
    clips: Vec<Clip>,
}

impl Track {
    pub fn new(project_id: ProjectId, name: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: TrackId::new(),
            project_id,
            name: name.into(),
            kind,
            order: 0,
            color: default_color(kind).to_string(),
            volume: 1.0,
            pan: 0.0,
            muted: false,
            solo: false,
            is_backing_track: false,
            clips: Vec::new(),
        }
    }

    /// The project's chord-driven backing track.
    pub fn backing(project_id: ProjectId) -> Self {
        let mut track = Self::new(project_id, "Backing Track", TrackKind::Backing);
        track.is_backing_track = true;
        track
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: ClipId) -> bool {
        self.clips.iter().any(|c| c.id == id)
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(-1.0, 1.0);
    }

    /// Replace the whole clip collection in one step.
    pub fn replace_clips(&mut self, mut clips: Vec<Clip>) {
        for clip in &mut clips {
            clip.track_id = self.id;
        }
        sort_by_start(&mut clips);
        self.clips = clips;
    }

    /// Insert or replace a clip by id, without any overlap handling.
    pub fn upsert_clip(&mut self, mut clip: Clip) {
        clip.track_id = self.id;
        match self.clips.iter_mut().find(|c| c.id == clip.id) {
            Some(existing) => *existing = clip,
            None => self.clips.push(clip),
        }
        sort_by_start(&mut self.clips);
    }

    pub fn remove_clip(&mut self, id: ClipId) -> Option<Clip> {
        let index = self.clips.iter().position(|c| c.id == id)?;
        Some(self.clips.remove(index))
    }

    /// Mutate one clip in place; the ordering is restored afterwards.
    pub fn update_clip<R>(&mut self, id: ClipId, f: impl FnOnce(&mut Clip) -> R) -> Option<R> {
        let clip = self.clips.iter_mut().find(|c| c.id == id)?;
        let result = f(clip);
        sort_by_start(&mut self.clips);
        Some(result)
    }

    pub fn take_clips(&mut self) -> Vec<Clip> {
        std::mem::take(&mut self.clips)
    }

    /// End of the last clip on this track, or 0.
    pub fn end(&self) -> f64 {
        self.clips.iter().map(Clip::end).fold(0.0, f64::max)
    }
}

fn sort_by_start(clips: &mut [Clip]) {
    clips.sort_by(|a, b| a.start.total_cmp(&b.start));
}

fn default_color(kind: TrackKind) -> &'static str {
    match kind {
        TrackKind::Backing => "#8b5cf6",
        TrackKind::Lick => "#3b82f6",
        TrackKind::Midi => "#10b981",
        TrackKind::Audio => "#f59e0b",
    }
}
