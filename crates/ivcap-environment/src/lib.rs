//! Ivcap Environment
//!
//! The entry point a worker program talks to. An [`Environment`] is built
//! once from [`Options`] and the process environment, then used to wait for
//! the storage sidecar, fetch inputs and publish outputs. Every component
//! shares one configuration, one HTTP client and one [`Logger`].

mod environment;

pub use environment::{Environment, Options};

pub use ivcap_artifact::{
  ArtifactId, MetadataOutcome, PipeWriter, PipelineError, Publication, PublishHandle,
  PublishOutcome,
};
pub use ivcap_config::EnvironmentConfig;
pub use ivcap_http::{ByteStream, Error, HttpClient};
pub use ivcap_log::Logger;
pub use ivcap_readiness::{DEFAULT_MAX_ATTEMPTS, Readiness};
pub use ivcap_resource::ResourceBody;
