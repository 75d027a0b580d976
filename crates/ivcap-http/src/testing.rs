//! A recording [`HttpClient`] for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};

use crate::client::HttpClient;
use crate::error::Error;
use crate::message::{Body, Request, Response};

/// A request as the mock saw it, with the body fully drained.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
  pub method: Method,
  pub url: String,
  pub headers: HeaderMap,
  pub body: Bytes,
  /// Set when reading a streamed body failed part-way.
  pub body_error: Option<String>,
}

impl RecordedRequest {
  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(name).and_then(|v| v.to_str().ok())
  }
}

/// What the mock answers with.
#[derive(Debug, Clone)]
pub enum MockReply {
  Respond {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
  },
  /// Fail as if the connection broke.
  Fail(String),
}

impl MockReply {
  pub fn ok() -> Self {
    Self::status(200)
  }

  pub fn status(status: u16) -> Self {
    Self::Respond {
      status: StatusCode::from_u16(status).unwrap(),
      headers: HeaderMap::new(),
      body: Bytes::new(),
    }
  }

  pub fn fail(message: impl Into<String>) -> Self {
    Self::Fail(message.into())
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    if let Self::Respond { headers, .. } = &mut self {
      headers.insert(
        HeaderName::from_bytes(name.as_bytes()).unwrap(),
        HeaderValue::from_str(value).unwrap(),
      );
    }
    self
  }

  pub fn with_body(mut self, bytes: impl Into<Bytes>) -> Self {
    if let Self::Respond { body, .. } = &mut self {
      *body = bytes.into();
    }
    self
  }
}

type Responder = Box<dyn Fn(&RecordedRequest) -> MockReply + Send + Sync>;

/// Records every request and answers through a responder closure.
///
/// Streamed request bodies are drained to the end (or to their first
/// error) before the responder runs, like a server reading an upload.
/// A body that fails mid-stream turns into a transport error.
pub struct MockClient {
  responder: Responder,
  requests: Mutex<Vec<RecordedRequest>>,
}

impl MockClient {
  pub fn new<F>(responder: F) -> Self
  where
    F: Fn(&RecordedRequest) -> MockReply + Send + Sync + 'static,
  {
    Self {
      responder: Box::new(responder),
      requests: Mutex::new(Vec::new()),
    }
  }

  /// A mock that answers every request with `reply`.
  pub fn always(reply: MockReply) -> Self {
    Self::new(move |_| reply.clone())
  }

  pub fn requests(&self) -> Vec<RecordedRequest> {
    self.requests.lock().unwrap().clone()
  }

  pub fn requests_to(&self, url: &str) -> Vec<RecordedRequest> {
    self
      .requests()
      .into_iter()
      .filter(|r| r.url == url)
      .collect()
  }

  pub fn request_count(&self) -> usize {
    self.requests.lock().unwrap().len()
  }
}

#[async_trait]
impl HttpClient for MockClient {
  async fn send(&self, request: Request) -> Result<Response, Error> {
    let info = request.info();

    let (body, body_error) = match request.body {
      Body::Empty => (Bytes::new(), None),
      Body::Bytes(bytes) => (bytes, None),
      Body::Stream(mut stream) => {
        let mut buf = BytesMut::new();
        let mut error = None;
        while let Some(chunk) = stream.next().await {
          match chunk {
            Ok(chunk) => buf.extend_from_slice(&chunk),
            Err(e) => {
              error = Some(e);
              break;
            }
          }
        }
        (buf.freeze(), error)
      }
    };

    let recorded = RecordedRequest {
      method: request.method,
      url: request.url,
      headers: request.headers,
      body,
      body_error: body_error.as_ref().map(|e| e.to_string()),
    };
    let reply = (self.responder)(&recorded);
    self.requests.lock().unwrap().push(recorded);

    if let Some(e) = body_error {
      return Err(Error::transport(info, e));
    }

    match reply {
      MockReply::Respond {
        status,
        headers,
        body,
      } => Ok(Response::from_bytes(status, headers, body)),
      MockReply::Fail(message) => Err(Error::transport(info, message)),
    }
  }
}

#[cfg(test)]
mod tests {
  use futures::stream;

  use super::*;
  use crate::message::ByteStream;

  #[tokio::test]
  async fn test_records_streamed_body() {
    let client = MockClient::always(MockReply::ok().with_header("X-Artifact-Id", "urn:a:1"));
    let body: ByteStream = Box::pin(stream::iter(vec![
      Ok(Bytes::from("hel")),
      Ok(Bytes::from("lo")),
    ]));

    let response = client
      .send(Request::put("http://s/x", body))
      .await
      .unwrap();

    assert_eq!(response.header("x-artifact-id"), Some("urn:a:1"));
    assert_eq!(client.requests()[0].body, Bytes::from("hello"));
  }

  #[tokio::test]
  async fn test_broken_stream_is_transport_error() {
    let client = MockClient::always(MockReply::ok());
    let body: ByteStream = Box::pin(stream::iter(vec![
      Ok(Bytes::from("partial")),
      Err(std::io::Error::other("producer gave up")),
    ]));

    let err = client
      .send(Request::put("http://s/x", body))
      .await
      .unwrap_err();

    assert!(matches!(err, Error::Transport { .. }));
    let recorded = &client.requests()[0];
    assert_eq!(recorded.body, Bytes::from("partial"));
    assert!(recorded.body_error.as_deref().unwrap().contains("producer gave up"));
  }
}
