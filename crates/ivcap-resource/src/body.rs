use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use ivcap_http::ByteStream;
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

/// A downloaded resource, readable as a byte stream.
///
/// The fetcher closes the body once the consumer returns; reads after that
/// fail with `BrokenPipe`.
pub struct ResourceBody {
  reader: StreamReader<ByteStream, Bytes>,
  closed: CancellationToken,
  content_length: Option<u64>,
  cache_id: Option<String>,
}

impl ResourceBody {
  pub(crate) fn new(
    body: ByteStream,
    closed: CancellationToken,
    content_length: Option<u64>,
    cache_id: Option<String>,
  ) -> Self {
    Self {
      reader: StreamReader::new(body),
      closed,
      content_length,
      cache_id,
    }
  }

  /// The advertised length, if the server sent one.
  pub fn content_length(&self) -> Option<u64> {
    self.content_length
  }

  /// The caching proxy's entry id, if the body came through the cache.
  pub fn cache_id(&self) -> Option<&str> {
    self.cache_id.as_deref()
  }

  pub fn is_closed(&self) -> bool {
    self.closed.is_cancelled()
  }
}

impl AsyncRead for ResourceBody {
  fn poll_read(
    mut self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &mut ReadBuf<'_>,
  ) -> Poll<io::Result<()>> {
    if self.closed.is_cancelled() {
      return Poll::Ready(Err(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "resource body closed",
      )));
    }
    Pin::new(&mut self.reader).poll_read(cx, buf)
  }
}
