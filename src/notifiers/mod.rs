use async_trait::async_trait;
use std::fmt;

use crate::utils::error::NotifyError;

pub mod format;
pub mod webhook;

pub use format::Thresholds;
pub use webhook::WebhookNotifier;

/// Which channel a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Store,
    Summary,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Store => "store",
            MessageKind::Summary => "summary",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for formatted chat messages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send(&self, kind: MessageKind, text: &str) -> Result<(), NotifyError>;
}
