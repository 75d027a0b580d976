//! Metadata registration.

use ivcap_http::headers::{CONTENT_TYPE, META_DATA_FOR_ARTIFACT, META_DATA_SCHEMA, NAME};
use ivcap_http::{Error, Request};
use serde::Serialize;

use crate::id::ArtifactId;
use crate::publisher::{MetadataOutcome, Publisher};

const METADATA_SUFFIX: &str = "-meta.json";

/// The object name metadata for artifact `name` is stored under.
pub fn metadata_name(name: &str) -> String {
  format!("{}{}", name, METADATA_SUFFIX)
}

impl Publisher {
  /// Store `metadata` as JSON next to the artifact `name`, linked to
  /// `artifact_id`.
  ///
  /// `None` is a successful no-op, as is any call in local mode. The record
  /// is sent as `PUT <storage>/<name>-meta.json` with the artifact id, the
  /// schema URN and its own name as headers. Transport failures, requests
  /// that cannot be built and statuses of 300 and above are errors.
  pub async fn register_metadata<M>(
    &self,
    name: &str,
    artifact_id: &ArtifactId,
    metadata: Option<&M>,
  ) -> Result<MetadataOutcome, Error>
  where
    M: Serialize + ?Sized,
  {
    let Some(metadata) = metadata else {
      return Ok(MetadataOutcome::Skipped);
    };
    if self.config.local_mode {
      self.logger.debug(format_args!(
        "local mode - not registering metadata for '{}'",
        name
      ));
      return Ok(MetadataOutcome::Skipped);
    }

    let meta_name = metadata_name(name);
    let url = self.config.storage_endpoint(&meta_name);
    let body = serde_json::to_vec(metadata)?;
    self.logger.debug(format_args!(
      "starting to upload metadata - url: {} size: {}",
      url,
      body.len()
    ));

    let request = Request::put(&url, body)
      .header(CONTENT_TYPE, "application/json")
      .and_then(|r| r.header(META_DATA_FOR_ARTIFACT, artifact_id.as_str()))
      .and_then(|r| r.header(META_DATA_SCHEMA, &self.metadata_schema))
      .and_then(|r| r.header(NAME, &meta_name))
      .map_err(|e| {
        self
          .logger
          .error(format_args!("creating request failed - {}", e));
        e
      })?;
    let request_info = request.info();

    let response = self.client.send(request).await.map_err(|e| {
      self
        .logger
        .error(format_args!("upload metadata failed - {}", e));
      e
    })?;

    if response.status.as_u16() >= 300 {
      self.logger.error(format_args!(
        "upload metadata failed - status: {}",
        response.status.as_u16()
      ));
      return Err(Error::Status {
        request: request_info,
        response: response.info(),
      });
    }

    self.logger.info(format_args!(
      "successfully uploaded metadata - status: {}",
      response.status.as_u16()
    ));
    Ok(MetadataOutcome::Registered)
  }
}
