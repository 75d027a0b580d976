//! Ivcap Readiness
//!
//! Workers start next to sidecar services (storage, cache) that may still be
//! booting. [`ReadinessGate`] polls the storage service's liveness path until
//! it answers, with a bounded number of attempts and a fixed delay between
//! them.

mod gate;

pub use gate::{
  DEFAULT_MAX_ATTEMPTS, PROBE_TIMEOUT, READY_PATH, RETRY_DELAY, Readiness, ReadinessGate,
};
