use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::SubmissionLogEntry;
use crate::utils::error::AppError;

/// Append-only JSON-lines record of every store outcome.
///
/// Each entry is serialized up front and written with a single `write_all`
/// under the lock, so concurrent writers never interleave partial lines.
/// Appending the same outcome twice yields two entries.
pub struct SubmissionLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl SubmissionLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &SubmissionLogEntry) -> Result<(), AppError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line)?;
        file.flush()?;
        debug!(store = %entry.store_name, success = entry.success, "Submission logged");
        Ok(())
    }
}

/// Read back every entry of a submission log.
pub fn read_entries(path: &Path) -> Result<Vec<SubmissionLogEntry>, AppError> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}
