use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::{ProjectDocument, ProjectError};

/// Write a project document as pretty-printed JSON.
pub fn save_project(path: &Path, document: &ProjectDocument) -> Result<(), ProjectError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, document)?;
    Ok(())
}
