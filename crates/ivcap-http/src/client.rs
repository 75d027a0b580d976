use async_trait::async_trait;
use futures::TryStreamExt;

use crate::error::Error;
use crate::message::{Body, Request, Response};

/// Sends requests to the outside world.
///
/// Implementations report a request that could not be completed as
/// [`Error::Transport`]. They never judge status codes; that policy belongs
/// to the caller.
#[async_trait]
pub trait HttpClient: Send + Sync {
  async fn send(&self, request: Request) -> Result<Response, Error>;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
  client: reqwest::Client,
}

impl ReqwestClient {
  pub fn new() -> Result<Self, Error> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| Error::Client(Box::new(e)))?;
    Ok(Self { client })
  }

  /// Wrap an already configured `reqwest` client.
  pub fn from_client(client: reqwest::Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl HttpClient for ReqwestClient {
  async fn send(&self, request: Request) -> Result<Response, Error> {
    let info = request.info();

    let mut builder = self
      .client
      .request(request.method, &request.url)
      .headers(request.headers);

    if let Some(timeout) = request.timeout {
      builder = builder.timeout(timeout);
    }

    builder = match request.body {
      Body::Empty => builder,
      Body::Bytes(bytes) => builder.body(bytes),
      Body::Stream(stream) => builder.body(reqwest::Body::wrap_stream(stream)),
    };

    let response = builder
      .send()
      .await
      .map_err(|e| Error::transport(info, e))?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes_stream().map_err(std::io::Error::other);

    Ok(Response {
      status,
      headers,
      body: Box::pin(body),
    })
  }
}
