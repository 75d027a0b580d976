//! Ivcap Resource
//!
//! Resolves a resource reference to bytes. A reference is either an artifact
//! held by the storage service (`urn:...`) or an external URL. External URLs
//! are routed through the caching proxy when one is configured, keyed by the
//! URL-safe base64 encoding of the requested URL.
//!
//! Bodies are handed to a caller-supplied consumer as an `AsyncRead` so large
//! inputs never need to be buffered whole.

mod body;
mod fetcher;
mod reference;

pub use body::ResourceBody;
pub use fetcher::Fetcher;
pub use reference::{ARTIFACT_SCHEME, ResourceRef, cache_key};
