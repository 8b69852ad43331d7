use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;

use crate::browser::StoredCookie;
use crate::utils::error::AppError;

/// Browser cookies of the last successful login, kept between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSession {
    pub saved_at: DateTime<Utc>,
    pub cookies: Vec<StoredCookie>,
}

impl SavedSession {
    pub fn new(cookies: Vec<StoredCookie>, saved_at: DateTime<Utc>) -> Self {
        Self { saved_at, cookies }
    }

    /// `Ok(None)` when nothing has been saved yet.
    pub async fn load(path: &Path) -> Result<Option<Self>, AppError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Replace the file at `path`, creating its directory when needed.
    pub async fn save(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, json).await?;
        tokio::fs::rename(&staging, path).await?;
        Ok(())
    }
}
