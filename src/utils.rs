use std::{
    fs, io,
    path::Path,
};

use serde::Serialize;

use crate::error::{Result, TraderError};

pub fn create_folder_if_not_exists(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }

    fs::create_dir_all(dir).map_err(|err| TraderError::io(dir, err))
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => create_folder_if_not_exists(parent),
        None => Ok(()),
    }
}

/// Reads a whole file. A missing file is `None`, any other failure is an error.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(TraderError::io(path, err)),
    }
}

pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    create_parent(path)?;
    fs::write(path, bytes).map_err(|err| TraderError::io(path, err))
}

pub fn write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let encoded = serde_json::to_vec_pretty(value)?;
    write_bytes(path, &encoded)
}

pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(TraderError::io(path, err)),
    }
}

/// Rounds to cents for display and persisted summaries
pub fn round2(value: f64) -> f64 {
    (value * 100.).round() / 100.
}
