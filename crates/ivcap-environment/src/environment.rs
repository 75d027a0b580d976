use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ivcap_artifact::{
  ArtifactId, MetadataOutcome, PipeWriter, Publication, PublishHandle, Publisher,
};
use ivcap_config::EnvironmentConfig;
use ivcap_http::{BoxError, ByteStream, Error, HttpClient, ReqwestClient};
use ivcap_log::{Logger, default_logger};
use ivcap_readiness::{Readiness, ReadinessGate};
use ivcap_resource::{Fetcher, ResourceBody};
use serde::Serialize;

/// How a worker wants its environment set up.
#[derive(Clone, Default)]
pub struct Options {
  /// Work offline: skip readiness, write artifacts to the local directory.
  pub local_mode: bool,
  /// Fetch external resources directly instead of through the cache.
  pub no_caching: bool,
  /// Host logger. Defaults to forwarding to `tracing`.
  pub logger: Option<Arc<dyn Logger>>,
}

/// A worker's handle on the platform.
#[derive(Clone)]
pub struct Environment {
  config: Arc<EnvironmentConfig>,
  logger: Arc<dyn Logger>,
  readiness: ReadinessGate,
  fetcher: Fetcher,
  publisher: Publisher,
}

impl Environment {
  /// Build an environment from `options` and the process environment
  /// variables, talking HTTP through reqwest.
  pub fn new(options: Options) -> Result<Self, Error> {
    let config = EnvironmentConfig::from_env(options.local_mode, options.no_caching);
    let logger = options.logger.unwrap_or_else(default_logger);
    let client = Arc::new(ReqwestClient::new()?);
    Ok(Self::from_parts(config, logger, client))
  }

  /// Build an environment from explicit parts.
  pub fn from_parts(
    config: EnvironmentConfig,
    logger: Arc<dyn Logger>,
    client: Arc<dyn HttpClient>,
  ) -> Self {
    let config = Arc::new(config);
    logger.debug(format_args!(
      "environment - storage: {} cache: {} local: {}",
      config.storage_url,
      config.effective_cache_url().unwrap_or("-"),
      config.local_mode
    ));

    Self {
      readiness: ReadinessGate::new(config.clone(), client.clone(), logger.clone()),
      fetcher: Fetcher::new(config.clone(), client.clone(), logger.clone()),
      publisher: Publisher::new(config.clone(), client, logger.clone()),
      config,
      logger,
    }
  }

  /// Replace the pause between readiness probes.
  pub fn with_readiness_delay(mut self, delay: Duration) -> Self {
    self.readiness = self.readiness.with_delay(delay);
    self
  }

  /// Replace the schema URN attached to metadata records.
  pub fn with_metadata_schema(mut self, schema: impl Into<String>) -> Self {
    self.publisher = self.publisher.with_metadata_schema(schema);
    self
  }

  pub fn config(&self) -> &EnvironmentConfig {
    &self.config
  }

  pub fn logger(&self) -> &Arc<dyn Logger> {
    &self.logger
  }

  /// The order this worker runs for, or `???` outside the platform.
  pub fn order_id(&self) -> &str {
    self.config.order_id()
  }

  /// See [`ReadinessGate::wait_until_ready`].
  pub async fn wait_until_ready(&self, max_attempts: u32) -> Result<Readiness, Error> {
    self.readiness.wait_until_ready(max_attempts).await
  }

  /// See [`Fetcher::fetch`].
  pub async fn fetch<F, Fut, T, E>(&self, reference: &str, consumer: F) -> Result<T, Error>
  where
    F: FnOnce(ResourceBody) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
  {
    self.fetcher.fetch(reference, consumer).await
  }

  /// The URL `reference` would be fetched from.
  pub fn resolve(&self, reference: &str) -> String {
    self.fetcher.resolve(reference)
  }

  /// See [`Publisher::publish`].
  pub async fn publish<M>(
    &self,
    name: &str,
    content_type: &str,
    source: ByteStream,
    metadata: Option<&M>,
  ) -> Result<Publication, Error>
  where
    M: Serialize + ?Sized,
  {
    self
      .publisher
      .publish(name, content_type, source, metadata)
      .await
  }

  /// See [`Publisher::publish_async`].
  pub fn publish_async<M, P, Fut, E>(
    &self,
    name: impl Into<String>,
    content_type: impl Into<String>,
    metadata: Option<M>,
    producer: P,
  ) -> PublishHandle
  where
    M: Serialize + Send + Sync + 'static,
    P: FnOnce(PipeWriter) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
  {
    self
      .publisher
      .publish_async(name, content_type, metadata, producer)
  }

  /// See [`Publisher::register_metadata`].
  pub async fn register_metadata<M>(
    &self,
    name: &str,
    artifact_id: &ArtifactId,
    metadata: Option<&M>,
  ) -> Result<MetadataOutcome, Error>
  where
    M: Serialize + ?Sized,
  {
    self
      .publisher
      .register_metadata(name, artifact_id, metadata)
      .await
  }
}
