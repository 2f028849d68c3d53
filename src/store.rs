//! Flat JSON persistence under the resource root
//!
//! `data.json` and `summary.json` are overwritten on every run. Concurrent
//! writers race and the last one wins.

use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::{AppError, AppResult};

/// Serialize `value` as pretty JSON into `path`, creating parent directories
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::Internal(format!("cannot create {}: {e}", parent.display())))?;
    }
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| AppError::Internal(format!("serialization failure: {e}")))?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| AppError::Internal(format!("cannot write {}: {e}", path.display())))
}

/// Read a JSON document
///
/// # Errors
///
/// - `NotFound` if the file does not exist
/// - `InvalidInput` if it does not parse as `T`
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let raw = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => AppError::NotFound(format!("data file not found: {}", path.display())),
        _ => AppError::Internal(format!("cannot read {}: {e}", path.display())),
    })?;
    serde_json::from_slice(&raw)
        .map_err(|e| AppError::InvalidInput(format!("{} is not a valid record: {e}", path.display())))
}
