//! Ivcap Artifact
//!
//! Uploads worker output to the storage service and links a JSON metadata
//! record to it. [`Publisher::publish`] takes a ready byte stream;
//! [`Publisher::publish_async`] runs a producer and the upload side by side
//! over an in-memory [`pipe`].

mod id;
mod metadata;
mod pipe;
mod pipeline;
mod publisher;

pub use id::ArtifactId;
pub use metadata::metadata_name;
pub use pipe::{DEFAULT_PIPE_CAPACITY, PipeCloser, PipeReader, PipeWriter, ReaderCloser, pipe};
pub use pipeline::{PipelineError, PublishHandle, PublishOutcome};
pub use publisher::{DEFAULT_METADATA_SCHEMA, MetadataOutcome, Publication, Publisher};
