//! Artifact upload.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::BytesMut;
use futures::StreamExt;
use ivcap_config::EnvironmentConfig;
use ivcap_http::headers::{ARTIFACT_ID, CONTENT_TYPE, NAME};
use ivcap_http::{ByteStream, Error, HttpClient, Request};
use ivcap_log::Logger;
use serde::Serialize;

use crate::id::ArtifactId;

/// Schema URN attached to metadata records unless overridden.
pub const DEFAULT_METADATA_SCHEMA: &str = "urn:schema:testing:image";

/// Where a published artifact ended up.
#[derive(Debug)]
pub enum Publication {
  /// Local mode: written to the filesystem, nothing uploaded.
  Local { path: PathBuf },
  /// Uploaded to the storage service.
  Stored {
    artifact_id: ArtifactId,
    metadata: MetadataOutcome,
  },
}

impl Publication {
  pub fn artifact_id(&self) -> Option<&ArtifactId> {
    match self {
      Self::Stored { artifact_id, .. } => Some(artifact_id),
      Self::Local { .. } => None,
    }
  }

  pub fn metadata(&self) -> Option<&MetadataOutcome> {
    match self {
      Self::Stored { metadata, .. } => Some(metadata),
      Self::Local { .. } => None,
    }
  }
}

/// Result of the metadata registration that follows a successful upload.
///
/// A failed registration does not undo the upload; it is reported here.
#[derive(Debug)]
pub enum MetadataOutcome {
  /// There was no metadata to register.
  Skipped,
  Registered,
  Failed(Error),
}

impl MetadataOutcome {
  pub fn is_failed(&self) -> bool {
    matches!(self, Self::Failed(_))
  }

  pub fn error(&self) -> Option<&Error> {
    match self {
      Self::Failed(e) => Some(e),
      _ => None,
    }
  }
}

/// Uploads artifacts and registers their metadata.
#[derive(Clone)]
pub struct Publisher {
  pub(crate) config: Arc<EnvironmentConfig>,
  pub(crate) client: Arc<dyn HttpClient>,
  pub(crate) logger: Arc<dyn Logger>,
  pub(crate) metadata_schema: String,
}

impl Publisher {
  pub fn new(
    config: Arc<EnvironmentConfig>,
    client: Arc<dyn HttpClient>,
    logger: Arc<dyn Logger>,
  ) -> Self {
    Self {
      config,
      client,
      logger,
      metadata_schema: DEFAULT_METADATA_SCHEMA.to_string(),
    }
  }

  /// Replace the schema URN sent with metadata records.
  pub fn with_metadata_schema(mut self, schema: impl Into<String>) -> Self {
    self.metadata_schema = schema.into();
    self
  }

  pub fn metadata_schema(&self) -> &str {
    &self.metadata_schema
  }

  /// Upload `source` as `name` and register `metadata` for it.
  ///
  /// The body is streamed in a `PUT <storage>/<name>`. A transport failure
  /// or a status of 300 and above fails the publish; so does a success
  /// without an `X-Artifact-Id` header, since metadata cannot be linked
  /// without it. Once the upload succeeded, metadata registration is always
  /// attempted and its outcome returned in [`Publication::Stored`].
  ///
  /// In local mode the stream is written to `<local_dir>/<name>` instead.
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
    if self.config.local_mode {
      return self.publish_local(name, source).await;
    }

    let url = self.config.storage_endpoint(name);
    let request = Request::put(&url, source)
      .header(CONTENT_TYPE, content_type)
      .and_then(|r| r.header(NAME, name))
      .map_err(|e| {
        self
          .logger
          .error(format_args!("creating request failed - {}", e));
        e
      })?;
    let request_info = request.info();

    let response = self.client.send(request).await.map_err(|e| {
      self.logger.error(format_args!("upload failed - {}", e));
      e
    })?;

    if response.status.as_u16() >= 300 {
      self.logger.error(format_args!(
        "save request failed - {}",
        response.status.as_u16()
      ));
      return Err(Error::Status {
        request: request_info,
        response: response.info(),
      });
    }

    let artifact_id = match response.header(ARTIFACT_ID) {
      Some(id) if !id.is_empty() => ArtifactId::new(id),
      _ => {
        let err = Error::protocol(format!("missing '{}' header", ARTIFACT_ID));
        self.logger.error(format_args!("{}", err));
        return Err(err);
      }
    };
    self.logger.info(format_args!(
      "successfully uploaded object as '{}'",
      artifact_id
    ));
    self.logger.debug(format_args!(
      "return headers from object upload - aid: {} h: {:?}",
      artifact_id, response.headers
    ));

    let metadata = match self.register_metadata(name, &artifact_id, metadata).await {
      Ok(outcome) => outcome,
      Err(e) => {
        self.logger.error(format_args!(
          "metadata for artifact '{}' not registered - {}",
          artifact_id, e
        ));
        MetadataOutcome::Failed(e)
      }
    };

    Ok(Publication::Stored {
      artifact_id,
      metadata,
    })
  }

  /// Best-effort local write used for offline testing.
  ///
  /// Read errors from the source are returned; a failed file write is only
  /// logged.
  async fn publish_local(&self, name: &str, mut source: ByteStream) -> Result<Publication, Error> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = source.next().await {
      buf.extend_from_slice(&chunk?);
    }

    let path = self.config.local_dir.join(name);
    match tokio::fs::write(&path, &buf).await {
      Ok(()) => self.logger.info(format_args!(
        "wrote {} bytes to '{}'",
        buf.len(),
        path.display()
      )),
      Err(e) => self.logger.error(format_args!(
        "writing '{}' failed - {}",
        path.display(),
        e
      )),
    }

    Ok(Publication::Local { path })
  }
}
