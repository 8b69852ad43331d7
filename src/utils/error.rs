use thiserror::Error;

use crate::retry::{Classify, FailureClass};

/// Errors raised by the browser-automation boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrowserError {
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Browser error: {0}")]
    Protocol(String),
}

/// Errors raised while establishing an authenticated session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("One-time code rejected in {windows} time windows")]
    OtpRejected { windows: usize },

    #[error("Site unavailable: {0}")]
    SiteUnavailable(String),

    #[error("Login timed out: {0}")]
    Timeout(String),
}

impl AuthError {
    /// Credentials and codes will not become valid by trying again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuthError::InvalidCredentials(_) | AuthError::OtpRejected { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials(_) => "invalid_credentials",
            AuthError::OtpRejected { .. } => "otp_rejected",
            AuthError::SiteUnavailable(_) => "site_unavailable",
            AuthError::Timeout(_) => "timeout",
        }
    }
}

impl From<BrowserError> for AuthError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::Timeout(msg) => AuthError::Timeout(msg),
            other => AuthError::SiteUnavailable(other.to_string()),
        }
    }
}

impl Classify for AuthError {
    fn class(&self) -> FailureClass {
        if self.is_terminal() {
            FailureClass::Terminal
        } else {
            FailureClass::Transient
        }
    }
}

/// Errors raised while scraping a single store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("Session expired")]
    SessionExpired,

    #[error("Page load failed: {0}")]
    PageLoadFailed(String),

    #[error("Unexpected page layout: {0}")]
    UnexpectedLayout(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Session re-acquisition failed: {0}")]
    Reauthentication(AuthError),
}

impl ScrapeError {
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::SessionExpired => "session_expired",
            ScrapeError::PageLoadFailed(_) => "page_load_failed",
            ScrapeError::UnexpectedLayout(_) => "unexpected_layout",
            ScrapeError::Timeout(_) => "timeout",
            ScrapeError::Reauthentication(_) => "reauthentication_failed",
        }
    }
}

impl From<BrowserError> for ScrapeError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::Timeout(msg) => ScrapeError::Timeout(msg),
            BrowserError::ElementNotFound { selector } => {
                ScrapeError::UnexpectedLayout(format!("element not found: {}", selector))
            }
            BrowserError::InvalidSelector(selector) => {
                ScrapeError::UnexpectedLayout(format!("invalid selector: {}", selector))
            }
            BrowserError::Navigation(msg) | BrowserError::Protocol(msg) => {
                ScrapeError::PageLoadFailed(msg)
            }
        }
    }
}

impl Classify for ScrapeError {
    fn class(&self) -> FailureClass {
        match self {
            ScrapeError::SessionExpired => FailureClass::SessionExpired,
            ScrapeError::PageLoadFailed(_) | ScrapeError::Timeout(_) => FailureClass::Transient,
            ScrapeError::UnexpectedLayout(_) => FailureClass::Terminal,
            ScrapeError::Reauthentication(auth) => auth.class(),
        }
    }
}

/// Delivery failures of the chat webhook. Logged, never escalated.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Webhook returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
