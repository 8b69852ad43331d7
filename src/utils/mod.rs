pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{AppError, AuthError, BrowserError, NotifyError, ScrapeError};
pub use logging::init_logging;
