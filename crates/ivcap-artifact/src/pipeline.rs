//! Asynchronous publish pipeline.
//!
//! A producer task writes the artifact into a [`PipeWriter`] while a
//! consumer task streams the matching [`PipeReader`] into
//! [`Publisher::publish`]. Neither side can block the other forever: a
//! failed producer surfaces as a read error in the upload, and a finished or
//! failed upload turns further writes into `BrokenPipe`.

use std::any::Any;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use ivcap_http::{BoxError, Error};
use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};

use crate::id::ArtifactId;
use crate::pipe::{DEFAULT_PIPE_CAPACITY, PipeWriter, pipe};
use crate::publisher::{Publication, Publisher};

/// Errors observed by the pipeline's tasks.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
  /// The producer returned an error.
  #[error("producer failed: {0}")]
  Producer(#[source] BoxError),

  /// The upload or its metadata request failed.
  #[error(transparent)]
  Publish(#[from] Error),

  /// A task panicked or was cancelled.
  #[error("{task} task aborted: {message}")]
  Aborted { task: &'static str, message: String },
}

/// Handle to a running publish.
///
/// Dropping it detaches the tasks; they still run to completion.
pub struct PublishHandle {
  name: String,
  producer: JoinHandle<Result<(), PipelineError>>,
  consumer: JoinHandle<Result<Publication, PipelineError>>,
}

impl PublishHandle {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn is_finished(&self) -> bool {
    self.producer.is_finished() && self.consumer.is_finished()
  }

  /// Wait for both tasks.
  pub async fn wait(self) -> PublishOutcome {
    let (producer, publish) = futures::future::join(self.producer, self.consumer).await;
    PublishOutcome {
      name: self.name,
      producer: joined("producer", producer),
      publish: joined("publisher", publish),
    }
  }
}

/// What both sides of a publish ended with.
#[derive(Debug)]
pub struct PublishOutcome {
  pub name: String,
  pub producer: Result<(), PipelineError>,
  pub publish: Result<Publication, PipelineError>,
}

impl PublishOutcome {
  pub fn is_success(&self) -> bool {
    self.producer.is_ok() && self.publish.is_ok()
  }

  pub fn artifact_id(&self) -> Option<&ArtifactId> {
    self.publish.as_ref().ok().and_then(Publication::artifact_id)
  }

  /// The metadata error of an otherwise successful upload.
  pub fn metadata_failure(&self) -> Option<&Error> {
    self
      .publish
      .as_ref()
      .ok()
      .and_then(Publication::metadata)
      .and_then(|m| m.error())
  }

  /// The publication, or the first error. A producer failure wins over the
  /// upload error it caused.
  pub fn into_result(self) -> Result<Publication, PipelineError> {
    self.producer?;
    self.publish
  }
}

impl Publisher {
  /// Publish whatever `producer` writes, without buffering it.
  ///
  /// Both tasks are spawned on the current tokio runtime and the call
  /// returns at once. When the producer returns an error or panics, the
  /// upload sees a read error instead of a clean end of stream, so a
  /// truncated artifact is never stored and no metadata is registered.
  /// When the upload stops reading, the producer's writes fail with
  /// `BrokenPipe`.
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
    let name = name.into();
    let content_type = content_type.into();
    let (writer, reader) = pipe(DEFAULT_PIPE_CAPACITY);
    let closer = writer.close_handle();

    let logger = self.logger.clone();
    let producer_name = name.clone();
    let producer = tokio::spawn(async move {
      let run = async move { producer(writer).await };
      let result = match AssertUnwindSafe(run).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(PipelineError::Producer(e.into())),
        Err(panic) => Err(PipelineError::Aborted {
          task: "producer",
          message: panic_message(panic.as_ref()),
        }),
      };

      match &result {
        Ok(()) => closer.close(),
        Err(e) => {
          logger.error(format_args!("writing '{}' failed - {}", producer_name, e));
          closer.close_with_error(io::Error::other(e.to_string())).await;
        }
      }
      logger.debug(format_args!("writing finished '{}'", producer_name));
      result
    });

    let publisher = self.clone();
    let consumer_name = name.clone();
    let consumer = tokio::spawn(async move {
      let reader_closer = reader.close_handle();
      let result = publisher
        .publish(&consumer_name, &content_type, Box::pin(reader), metadata.as_ref())
        .await;
      reader_closer.close(result.as_ref().err().map(|e| e.to_string()));
      publisher
        .logger
        .debug(format_args!("published '{}'", consumer_name));
      result.map_err(PipelineError::from)
    });

    PublishHandle {
      name,
      producer,
      consumer,
    }
  }
}

fn joined<T>(
  task: &'static str,
  result: Result<Result<T, PipelineError>, JoinError>,
) -> Result<T, PipelineError> {
  match result {
    Ok(inner) => inner,
    Err(e) if e.is_panic() => Err(PipelineError::Aborted {
      task,
      message: panic_message(e.into_panic().as_ref()),
    }),
    Err(e) => Err(PipelineError::Aborted {
      task,
      message: e.to_string(),
    }),
  }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "panicked".to_string()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};
  use std::time::Duration;

  use async_trait::async_trait;
  use ivcap_config::EnvironmentConfig;
  use ivcap_http::headers::ARTIFACT_ID;
  use ivcap_http::testing::{MockClient, MockReply};
  use ivcap_http::{Body, HttpClient, Request, Response, StatusCode};
  use ivcap_log::{Level, RecordingLogger};
  use serde_json::json;
  use tokio::io::AsyncWriteExt;

  use super::*;

  const UPLOAD_URL: &str = "http://localhost:8888/out.bin";

  fn storage() -> Arc<MockClient> {
    Arc::new(MockClient::new(|req| {
      if req.url == UPLOAD_URL {
        MockReply::ok().with_header(ARTIFACT_ID, "urn:ivcap:artifact:99")
      } else {
        MockReply::ok()
      }
    }))
  }

  fn make_publisher(client: Arc<dyn HttpClient>, logger: Arc<RecordingLogger>) -> Publisher {
    Publisher::new(Arc::new(EnvironmentConfig::default()), client, logger)
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn test_streams_more_than_pipe_capacity() {
    let client = storage();
    let publisher = make_publisher(client.clone(), Arc::new(RecordingLogger::new()));

    let handle = publisher.publish_async(
      "out.bin",
      "application/octet-stream",
      Some(json!({"chunks": 100})),
      |mut w: PipeWriter| async move {
        for i in 0..100u8 {
          w.write_all(&[i; 64]).await?;
        }
        w.shutdown().await?;
        Ok::<_, std::io::Error>(())
      },
    );
    assert_eq!(handle.name(), "out.bin");

    let outcome = handle.wait().await;
    assert!(outcome.is_success());
    assert_eq!(
      outcome.artifact_id().map(|id| id.as_str()),
      Some("urn:ivcap:artifact:99")
    );
    assert!(outcome.metadata_failure().is_none());

    let upload = &client.requests_to(UPLOAD_URL)[0];
    assert_eq!(upload.body.len(), 100 * 64);
    assert!(upload.body.chunks(64).enumerate().all(|(i, c)| c.iter().all(|b| *b as usize == i)));
    assert_eq!(client.request_count(), 2);
  }

  #[tokio::test]
  async fn test_producer_error_fails_upload() {
    let client = storage();
    let logger = Arc::new(RecordingLogger::new());
    let publisher = make_publisher(client.clone(), logger.clone());

    let handle = publisher.publish_async(
      "out.bin",
      "application/octet-stream",
      Some(json!({})),
      |mut w: PipeWriter| async move {
        w.write_all(b"half an image").await?;
        Err::<(), _>(std::io::Error::other("renderer crashed"))
      },
    );

    let outcome = handle.wait().await;
    assert!(!outcome.is_success());
    assert!(matches!(outcome.producer, Err(PipelineError::Producer(_))));
    assert!(matches!(outcome.publish, Err(PipelineError::Publish(_))));

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].body_error.as_deref().unwrap().contains("renderer crashed"));
    assert!(logger.contains(Level::Error, "renderer crashed"));

    let err = outcome.into_result().unwrap_err();
    assert!(err.to_string().contains("renderer crashed"));
  }

  #[tokio::test]
  #[allow(unreachable_code)]
  async fn test_producer_panic_fails_upload() {
    let client = storage();
    let publisher = make_publisher(client.clone(), Arc::new(RecordingLogger::new()));

    let handle = publisher.publish_async(
      "out.bin",
      "application/octet-stream",
      None::<serde_json::Value>,
      |mut w: PipeWriter| async move {
        w.write_all(b"some").await?;
        panic!("encoder exploded");
        Ok::<_, std::io::Error>(())
      },
    );

    let outcome = handle.wait().await;
    match &outcome.producer {
      Err(PipelineError::Aborted { task, message }) => {
        assert_eq!(*task, "producer");
        assert_eq!(message, "encoder exploded");
      }
      other => panic!("unexpected producer result: {:?}", other),
    }
    assert!(outcome.publish.is_err());
    assert_eq!(client.request_count(), 1);
  }

  /// Answers without reading the upload body.
  struct Impatient;

  #[async_trait]
  impl HttpClient for Impatient {
    async fn send(&self, request: Request) -> Result<Response, ivcap_http::Error> {
      drop(request);
      Ok(Response::from_bytes(
        StatusCode::SERVICE_UNAVAILABLE,
        Default::default(),
        "",
      ))
    }
  }

  #[tokio::test]
  #[allow(unreachable_code)]
  async fn test_consumer_failure_releases_producer() {
    let publisher = make_publisher(Arc::new(Impatient), Arc::new(RecordingLogger::new()));

    let handle = publisher.publish_async(
      "out.bin",
      "application/octet-stream",
      None::<serde_json::Value>,
      |mut w: PipeWriter| async move {
        loop {
          w.write_all(&[0u8; 1024]).await?;
        }
        Ok::<_, std::io::Error>(())
      },
    );

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle.wait())
      .await
      .expect("pipeline deadlocked");

    match &outcome.producer {
      Err(PipelineError::Producer(e)) => {
        let io = e.downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(io.kind(), std::io::ErrorKind::BrokenPipe);
      }
      other => panic!("unexpected producer result: {:?}", other),
    }
    let err = outcome.publish.unwrap_err();
    assert!(matches!(
      err,
      PipelineError::Publish(ref e) if e.status() == Some(StatusCode::SERVICE_UNAVAILABLE)
    ));
  }

  /// Rejects the upload but keeps hold of its body, the way a connection
  /// task can outlive the response.
  #[derive(Default)]
  struct Hoarding {
    bodies: Mutex<Vec<Body>>,
  }

  #[async_trait]
  impl HttpClient for Hoarding {
    async fn send(&self, request: Request) -> Result<Response, ivcap_http::Error> {
      self.bodies.lock().unwrap().push(request.body);
      Ok(Response::from_bytes(
        StatusCode::PAYLOAD_TOO_LARGE,
        Default::default(),
        "",
      ))
    }
  }

  #[tokio::test]
  async fn test_rejected_upload_releases_producer_while_body_is_held() {
    let client = Arc::new(Hoarding::default());
    let publisher = make_publisher(client.clone(), Arc::new(RecordingLogger::new()));

    let handle = publisher.publish_async(
      "out.bin",
      "application/octet-stream",
      Some(json!({})),
      |mut w: PipeWriter| async move {
        for _ in 0..100 {
          w.write_all(&[7u8; 64]).await?;
        }
        Ok::<_, std::io::Error>(())
      },
    );

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle.wait())
      .await
      .expect("producer still blocked after the upload was rejected");

    match &outcome.producer {
      Err(PipelineError::Producer(e)) => {
        let io = e.downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(io.kind(), std::io::ErrorKind::BrokenPipe);
        assert!(io.to_string().contains("413"));
      }
      other => panic!("unexpected producer result: {:?}", other),
    }
    assert!(matches!(
      outcome.publish,
      Err(PipelineError::Publish(ref e)) if e.status() == Some(StatusCode::PAYLOAD_TOO_LARGE)
    ));
    assert_eq!(client.bodies.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_metadata_failure_is_reported() {
    let client = Arc::new(MockClient::new(|req| {
      if req.url == UPLOAD_URL {
        MockReply::ok().with_header(ARTIFACT_ID, "urn:ivcap:artifact:99")
      } else {
        MockReply::status(500)
      }
    }));
    let publisher = make_publisher(client, Arc::new(RecordingLogger::new()));

    let outcome = publisher
      .publish_async(
        "out.bin",
        "application/octet-stream",
        Some(json!({"k": 1})),
        |mut w: PipeWriter| async move { w.write_all(b"data").await },
      )
      .wait()
      .await;

    assert!(outcome.is_success());
    assert!(outcome.artifact_id().is_some());
    assert_eq!(
      outcome.metadata_failure().and_then(|e| e.status()),
      Some(StatusCode::INTERNAL_SERVER_ERROR)
    );
  }
}
