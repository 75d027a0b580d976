use std::future::Future;
use std::sync::Arc;

use ivcap_config::EnvironmentConfig;
use ivcap_http::headers::{CACHE_ID, CONTENT_LENGTH};
use ivcap_http::{BoxError, Error, HttpClient, Request, StatusCode};
use ivcap_log::Logger;
use tokio_util::sync::CancellationToken;

use crate::body::ResourceBody;
use crate::reference::{ResourceRef, cache_key};

/// Fetches input resources for a worker.
#[derive(Clone)]
pub struct Fetcher {
  config: Arc<EnvironmentConfig>,
  client: Arc<dyn HttpClient>,
  logger: Arc<dyn Logger>,
}

impl Fetcher {
  pub fn new(
    config: Arc<EnvironmentConfig>,
    client: Arc<dyn HttpClient>,
    logger: Arc<dyn Logger>,
  ) -> Self {
    Self {
      config,
      client,
      logger,
    }
  }

  /// The URL `reference` is fetched from.
  ///
  /// - `urn:...` → `<storage>/<reference>`
  /// - external URL with caching → `<cache>/<base64url(url)>`
  /// - external URL otherwise → unchanged
  pub fn resolve(&self, reference: &str) -> String {
    match ResourceRef::parse(reference) {
      ResourceRef::Artifact(urn) => self.config.storage_endpoint(urn),
      ResourceRef::External(url) => match self.config.effective_cache_url() {
        Some(cache) => format!("{}/{}", cache, cache_key(url)),
        None => url.to_string(),
      },
    }
  }

  /// Download `reference` and hand its body to `consumer`.
  ///
  /// Anything but `200 OK` is an [`Error::Status`]. The body is closed once
  /// the consumer returns, whatever it returned. The consumer's own error is
  /// passed back as [`Error::Consumer`].
  pub async fn fetch<F, Fut, T, E>(&self, reference: &str, consumer: F) -> Result<T, Error>
  where
    F: FnOnce(ResourceBody) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
  {
    match ResourceRef::parse(reference) {
      ResourceRef::Artifact(urn) => {
        self
          .logger
          .info(format_args!("downloading artifact - urn: {}", urn));
      }
      ResourceRef::External(url) => {
        self.logger.info(format_args!(
          "downloading remote content - url: {}, caching?: {}",
          url,
          self.config.effective_cache_url().is_some()
        ));
      }
    }

    let url = self.resolve(reference);
    let request = Request::get(&url);
    let request_info = request.info();

    let response = self.client.send(request).await.map_err(|e| {
      self
        .logger
        .error(format_args!("GET failed - url: {}, err: {}", url, e));
      e
    })?;

    if response.status != StatusCode::OK {
      self.logger.error(format_args!(
        "getting resource failed - status: {} url: {}",
        response.status.as_u16(),
        url
      ));
      return Err(Error::Status {
        request: request_info,
        response: response.info(),
      });
    }

    let content_length = response
      .header(CONTENT_LENGTH)
      .and_then(|v| v.parse::<u64>().ok());
    let cache_id = response.header(CACHE_ID).map(str::to_string);
    self.logger.debug(format_args!(
      "downloading '{}' succeeded - size: {} cache-id: {}",
      url,
      content_length.map_or_else(|| "unknown".to_string(), |n| n.to_string()),
      cache_id.as_deref().unwrap_or("-")
    ));

    let closed = CancellationToken::new();
    let body = ResourceBody::new(response.body, closed.clone(), content_length, cache_id);

    let result = consumer(body).await;
    closed.cancel();

    result.map_err(|e| Error::Consumer(e.into()))
  }
}
