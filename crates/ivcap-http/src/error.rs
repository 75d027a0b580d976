use std::fmt;

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};

/// Boxed error used for causes the SDK does not own.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while talking to the storage and cache services.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// Every readiness probe failed.
  #[error("environment doesn't seem to be ready after {attempts} attempts")]
  NotReady { attempts: u32 },

  /// The request could not be built or completed (DNS, connect, body, etc.).
  #[error("http request failed ({request}): {source}")]
  Transport {
    request: RequestInfo,
    #[source]
    source: BoxError,
  },

  /// A response arrived but its status indicates failure.
  #[error("http response failed ({status}) for {request}", status = .response.status)]
  Status {
    request: RequestInfo,
    response: ResponseInfo,
  },

  /// A nominally successful response broke the expected contract.
  #[error("api error: {message}")]
  Protocol { message: String },

  /// Local filesystem or stream I/O failed.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// A metadata record could not be serialized.
  #[error("failed to serialize metadata: {0}")]
  Serialization(#[from] serde_json::Error),

  /// The caller's resource consumer returned an error.
  #[error("resource consumer failed: {0}")]
  Consumer(#[source] BoxError),

  /// The HTTP client could not be constructed.
  #[error("failed to build http client: {0}")]
  Client(#[source] BoxError),
}

impl Error {
  /// Create a transport error for `request`.
  pub fn transport(request: RequestInfo, source: impl Into<BoxError>) -> Self {
    Self::Transport {
      request,
      source: source.into(),
    }
  }

  /// Create a protocol error.
  pub fn protocol(message: impl Into<String>) -> Self {
    Self::Protocol {
      message: message.into(),
    }
  }

  /// The failed response status, if a response was received.
  pub fn status(&self) -> Option<StatusCode> {
    match self {
      Self::Status { response, .. } => Some(response.status),
      _ => None,
    }
  }
}

/// The part of a request worth keeping for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
  pub method: Method,
  pub url: String,
}

impl fmt::Display for RequestInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// The part of a response worth keeping for diagnostics.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
  pub status: StatusCode,
  pub headers: HeaderMap,
}
