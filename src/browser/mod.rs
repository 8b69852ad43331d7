use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::utils::error::BrowserError;

pub mod chrome;
pub mod html;

pub use chrome::ChromeDriver;

/// A browser cookie in the shape the DevTools protocol reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "root_path")]
    pub path: String,
    /// Unix seconds. `None` for session cookies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn root_path() -> String {
    "/".to_string()
}

/// The operations the session controller and store scraper need from a
/// browser. Implementations own one page and are driven serially.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    /// Replace the value of an input field.
    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError>;

    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    /// Wait until one of `selectors` is present and return its index.
    async fn wait_for_any(&self, selectors: &[&str], timeout: Duration) -> Result<usize, BrowserError>;

    /// Text of the first element matching `selector`, if any.
    async fn read_text(&self, selector: &str) -> Result<Option<String>, BrowserError>;

    /// Cell values of every data row under `selector`. Empty when absent.
    async fn read_table(&self, selector: &str) -> Result<Vec<Vec<String>>, BrowserError>;

    /// PNG bytes of the visible page.
    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError>;

    /// Every cookie the browser holds.
    async fn cookies(&self) -> Result<Vec<StoredCookie>, BrowserError>;

    /// Start from a clean cookie jar holding only `cookies`.
    async fn restore_cookies(&self, cookies: &[StoredCookie]) -> Result<(), BrowserError>;
}

/// Save a diagnostic screenshot as `<prefix>_<timestamp>.png` in `dir`.
/// Capture problems are logged and swallowed.
pub async fn capture_screenshot(driver: &dyn BrowserDriver, dir: &Path, prefix: &str) -> Option<PathBuf> {
    let bytes = match driver.screenshot().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(prefix, error = %e, "Screenshot capture failed");
            return None;
        }
    };

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{}_{}.png", sanitize_file_stem(prefix), timestamp));

    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!(dir = %dir.display(), error = %e, "Failed to create screenshot directory");
        return None;
    }

    match tokio::fs::write(&path, bytes).await {
        Ok(()) => {
            info!(path = %path.display(), "Screenshot saved");
            Some(path)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to write screenshot");
            None
        }
    }
}

fn sanitize_file_stem(prefix: &str) -> String {
    prefix
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
