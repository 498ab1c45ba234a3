use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use riff_transport::Track;
use serde::{Deserialize, Serialize};

use crate::{Project, ProjectError};

/// A project together with its tracks and their clips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub project: Project,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl ProjectDocument {
    pub fn clip_count(&self) -> usize {
        self.tracks.iter().map(|t| t.clips().len()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct ProjectMetadata {
    pub name: String,
    pub tempo: u16,
    pub time_signature: (u32, u32),
    pub chord_count: usize,
    pub track_count: usize,
    pub clip_count: usize,
}

fn load_project_data(path: &Path) -> Result<ProjectDocument, ProjectError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    // JSON first, MessagePack as fallback
    serde_json::from_reader(reader).or_else(|_| {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        rmp_serde::decode::from_read(reader).map_err(ProjectError::from)
    })
}

/// Load and validate a project document.
pub fn load_project(path: &Path) -> Result<ProjectDocument, ProjectError> {
    let document = load_project_data(path)?;
    document.project.validate()?;
    for track in &document.tracks {
        for clip in track.clips() {
            clip.validate().map_err(|source| ProjectError::Model {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }
    log::debug!(
        "loaded '{}' ({} tracks, {} clips)",
        document.project.name,
        document.tracks.len(),
        document.clip_count()
    );
    Ok(document)
}

pub fn load_project_metadata(path: &Path) -> Result<ProjectMetadata, ProjectError> {
    let document = load_project_data(path)?;
    Ok(ProjectMetadata {
        clip_count: document.clip_count(),
        name: document.project.name,
        tempo: document.project.tempo.into(),
        time_signature: document.project.time_signature,
        chord_count: document.project.chord_progression.len(),
        track_count: document.tracks.len(),
    })
}
