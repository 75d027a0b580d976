//! Ivcap Config
//!
//! This crate resolves the process-wide configuration snapshot a worker runs
//! with: where the storage service lives, whether a caching proxy is in front
//! of external downloads, and whether the worker runs offline in local mode.
//!
//! Configuration is read once at startup, from environment variables:
//! - `IVCAP_STORAGE_URL` (default `http://localhost:8888`)
//! - `IVCAP_CACHE_URL` (absent means no caching)
//! - `IVCAP_ORDER_ID` (display only)
//!
//! The resolved [`EnvironmentConfig`] is immutable and is shared read-only by
//! every publish, fetch and readiness call.

mod env;

pub use env::{
  CACHE_URL_ENV, DEFAULT_STORAGE_URL, EnvironmentConfig, ORDER_ID_ENV, ORDER_ID_PLACEHOLDER,
  STORAGE_URL_ENV,
};
