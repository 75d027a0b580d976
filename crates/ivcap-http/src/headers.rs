//! Header names exchanged with the storage and cache services.

/// Server-assigned artifact id, returned on a successful upload.
pub const ARTIFACT_ID: &str = "X-Artifact-Id";

/// Cache entry id, returned by the caching proxy.
pub const CACHE_ID: &str = "X-Cache-Id";

/// Name of the uploaded object.
pub const NAME: &str = "X-Name";

/// Artifact a metadata record belongs to.
pub const META_DATA_FOR_ARTIFACT: &str = "X-Meta-Data-For-Artifact";

/// Schema URN of a metadata record.
pub const META_DATA_SCHEMA: &str = "X-Meta-Data-Schema";

pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_LENGTH: &str = "Content-Length";
