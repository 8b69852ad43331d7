pub mod aggregator;
pub mod browser;
pub mod config;
pub mod models;
pub mod notifiers;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod scraper;
pub mod session;
pub mod submission_log;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use pipeline::{execute, run_pipeline, RunContext, RunReport};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
