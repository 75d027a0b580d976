//! Transport-neutral request and response types.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, stream};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};

use crate::error::{Error, RequestInfo, ResponseInfo};

/// A boxed stream of bytes for request and response bodies.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Request body.
pub enum Body {
  Empty,
  Bytes(Bytes),
  /// Streamed as it is produced; the length is not known up front.
  Stream(ByteStream),
}

impl fmt::Debug for Body {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Empty => f.write_str("Empty"),
      Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
      Self::Stream(_) => f.write_str("Stream"),
    }
  }
}

impl From<Vec<u8>> for Body {
  fn from(v: Vec<u8>) -> Self {
    Self::Bytes(Bytes::from(v))
  }
}

impl From<Bytes> for Body {
  fn from(b: Bytes) -> Self {
    Self::Bytes(b)
  }
}

impl From<ByteStream> for Body {
  fn from(s: ByteStream) -> Self {
    Self::Stream(s)
  }
}

/// An outbound request.
#[derive(Debug)]
pub struct Request {
  pub method: Method,
  pub url: String,
  pub headers: HeaderMap,
  pub body: Body,
  /// Overall deadline for this request, if any.
  pub timeout: Option<Duration>,
}

impl Request {
  pub fn new(method: Method, url: impl Into<String>) -> Self {
    Self {
      method,
      url: url.into(),
      headers: HeaderMap::new(),
      body: Body::Empty,
      timeout: None,
    }
  }

  pub fn get(url: impl Into<String>) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn put(url: impl Into<String>, body: impl Into<Body>) -> Self {
    let mut request = Self::new(Method::PUT, url);
    request.body = body.into();
    request
  }

  /// Set a header.
  ///
  /// Fails with [`Error::Transport`] when the name or value cannot be sent,
  /// e.g. an artifact name containing control characters.
  pub fn header(mut self, name: &str, value: &str) -> Result<Self, Error> {
    let name = HeaderName::from_bytes(name.as_bytes())
      .map_err(|e| Error::transport(self.info(), e))?;
    let value = HeaderValue::from_str(value).map_err(|e| Error::transport(self.info(), e))?;
    self.headers.insert(name, value);
    Ok(self)
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn info(&self) -> RequestInfo {
    RequestInfo {
      method: self.method.clone(),
      url: self.url.clone(),
    }
  }
}

/// A received response with a streaming body.
pub struct Response {
  pub status: StatusCode,
  pub headers: HeaderMap,
  pub body: ByteStream,
}

impl fmt::Debug for Response {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Response")
      .field("status", &self.status)
      .field("headers", &self.headers)
      .finish_non_exhaustive()
  }
}

impl Response {
  /// Build a response around an in-memory body.
  pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
    let body = body.into();
    Self {
      status,
      headers,
      body: Box::pin(stream::once(async move { Ok(body) })),
    }
  }

  /// A header value, if present and valid UTF-8.
  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(name).and_then(|v| v.to_str().ok())
  }

  pub fn info(&self) -> ResponseInfo {
    ResponseInfo {
      status: self.status,
      headers: self.headers.clone(),
    }
  }

  /// Collect the whole body into memory.
  pub async fn bytes(self) -> Result<Bytes, std::io::Error> {
    let mut buf = BytesMut::new();
    let mut body = self.body;
    while let Some(chunk) = body.next().await {
      buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
  }
}
