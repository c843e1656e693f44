//! stockroom-core library.
//!
//! Asset inventory model, the field-level change-history audit trail, and the
//! status-transition workflow engine.

pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod model;
pub mod transition;

/// # Conventions
///
/// - **Errors**: typed `thiserror` enums inside the core (`StorageError`,
///   `TransitionError`); `anyhow::Result` only for config and file plumbing.
/// - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).
pub fn init() {
    tracing::info!("stockroom-core initialized");
}
