//! Loads the work-hour and project feeds from JSON array files.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::metrics::{ProjectRecord, WorkHourEntry};

pub fn load_work_hours(path: impl AsRef<Path>) -> Result<Vec<WorkHourEntry>> {
    load_array(path.as_ref())
}

pub fn load_projects(path: impl AsRef<Path>) -> Result<Vec<ProjectRecord>> {
    load_array(path.as_ref())
}

fn load_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Input(format!("{}: {e}", path.display())))?;
    let items: Vec<T> = serde_json::from_str(&raw)
        .map_err(|e| Error::Input(format!("{}: {e}", path.display())))?;
    log::debug!("Loaded {} records from {}", items.len(), path.display());
    Ok(items)
}
