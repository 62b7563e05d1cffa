//! Guarded call execution for metered third-party APIs.
//!
//! Keep the public surface small and predictable: [`ApiGuard`] runs calls,
//! [`ApiGuardBuilder`] assembles it, [`CallOptions`] tunes a single call.
//! Implementation details are split into submodules under `src/client/`.

mod admin;
pub mod builder;
pub mod core;
pub mod error_classification;
mod execution;
pub mod options;
pub mod signals;

pub use builder::ApiGuardBuilder;
pub use core::ApiGuard;
pub use error_classification::{classify, classify_response};
pub use options::CallOptions;
pub use signals::{ApiStatus, CacheReport};
