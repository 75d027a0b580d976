//! Ivcap Log
//!
//! The SDK only needs three leveled log operations from its host. [`Logger`]
//! is that capability; the SDK never talks to a logging backend directly.
//! [`TracingLogger`] adapts it onto `tracing` and is what an environment uses
//! when the host injects nothing.

use std::fmt;
use std::sync::Arc;

#[cfg(any(test, feature = "testing"))]
mod recording;

#[cfg(any(test, feature = "testing"))]
pub use recording::{Level, RecordingLogger};

/// Leveled logging capability required from the host.
///
/// Call sites pass `format_args!` so formatting only happens if the backend
/// keeps the record.
pub trait Logger: Send + Sync {
  fn error(&self, args: fmt::Arguments<'_>);
  fn info(&self, args: fmt::Arguments<'_>);
  fn debug(&self, args: fmt::Arguments<'_>);
}

/// Forwards to the `tracing` macros under the `ivcap` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
  fn error(&self, args: fmt::Arguments<'_>) {
    tracing::error!(target: "ivcap", "{}", args);
  }

  fn info(&self, args: fmt::Arguments<'_>) {
    tracing::info!(target: "ivcap", "{}", args);
  }

  fn debug(&self, args: fmt::Arguments<'_>) {
    tracing::debug!(target: "ivcap", "{}", args);
  }
}

/// The logger used when the host does not inject one.
pub fn default_logger() -> Arc<dyn Logger> {
  Arc::new(TracingLogger)
}
