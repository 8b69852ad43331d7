pub mod metrics;
pub mod outcome;
pub mod store;
pub mod summary;

// Re-exports for convenience
pub use self::metrics::*;
pub use outcome::*;
pub use store::*;
pub use summary::*;
