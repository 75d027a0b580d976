//! In-memory streaming pipe.
//!
//! One end implements `AsyncWrite`, the other is a `Stream` of byte chunks,
//! so a producer can write an artifact while an upload consumes it. The
//! channel is bounded: a producer waits while the reader is behind, and fails
//! with `BrokenPipe` once the reader is gone or closed.

use std::future::Future;
use std::io;
use std::pin::{Pin, pin};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::Stream;
use futures::future::select;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, PollSender, WaitForCancellationFutureOwned};

/// Chunks buffered between writer and reader.
pub const DEFAULT_PIPE_CAPACITY: usize = 16;

const READER_CLOSED: &str = "pipe reader closed";

type Chunk = io::Result<Bytes>;

#[derive(Debug, Default)]
struct Shared {
  reader_closed: OnceLock<String>,
  /// Cancelled when the read side is closed; wakes parked writers.
  closed: CancellationToken,
}

impl Shared {
  fn broken_pipe(&self) -> io::Error {
    let reason = self
      .reader_closed
      .get()
      .map(String::as_str)
      .unwrap_or(READER_CLOSED);
    io::Error::new(io::ErrorKind::BrokenPipe, reason.to_string())
  }
}

/// Create a pipe buffering up to `capacity` chunks.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
  let (sender, receiver) = mpsc::channel(capacity.max(1));
  let shared = Arc::new(Shared::default());

  let writer = PipeWriter {
    sender: PollSender::new(sender),
    closed: Box::pin(shared.closed.clone().cancelled_owned()),
    shared: shared.clone(),
  };
  let reader = PipeReader {
    receiver,
    shared,
    done: false,
  };
  (writer, reader)
}

/// Write end. Dropping every write handle ends the stream cleanly.
pub struct PipeWriter {
  sender: PollSender<Chunk>,
  closed: Pin<Box<WaitForCancellationFutureOwned>>,
  shared: Arc<Shared>,
}

impl PipeWriter {
  /// A handle that can end the stream, with or without an error, after the
  /// writer itself has been handed away.
  pub fn close_handle(&self) -> PipeCloser {
    PipeCloser {
      sender: self.sender.get_ref().cloned(),
      shared: self.shared.clone(),
    }
  }
}

impl AsyncWrite for PipeWriter {
  fn poll_write(
    self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &[u8],
  ) -> Poll<io::Result<usize>> {
    let this = self.get_mut();

    // Polling the token registers the waker, so a writer parked below is
    // woken when the reader is closed.
    if this.closed.as_mut().poll(cx).is_ready() {
      return Poll::Ready(Err(this.shared.broken_pipe()));
    }
    if buf.is_empty() {
      return Poll::Ready(Ok(0));
    }

    if ready!(this.sender.poll_reserve(cx)).is_err() {
      return Poll::Ready(Err(this.shared.broken_pipe()));
    }
    if this
      .sender
      .send_item(Ok(Bytes::copy_from_slice(buf)))
      .is_err()
    {
      return Poll::Ready(Err(this.shared.broken_pipe()));
    }

    Poll::Ready(Ok(buf.len()))
  }

  fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Poll::Ready(Ok(()))
  }

  fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    self.get_mut().sender.close();
    Poll::Ready(Ok(()))
  }
}

/// Ends the write side of a pipe.
///
/// The stream ends once this handle and every writer are gone.
pub struct PipeCloser {
  sender: Option<mpsc::Sender<Chunk>>,
  shared: Arc<Shared>,
}

impl PipeCloser {
  /// End the stream cleanly (once all writers are dropped too).
  pub fn close(self) {
    drop(self);
  }

  /// Deliver `err` to the reader after everything already written.
  ///
  /// Gives up without delivering once the reader is dropped or closed.
  pub async fn close_with_error(self, err: io::Error) {
    let Some(sender) = self.sender else {
      return;
    };
    let send = pin!(sender.send(Err(err)));
    let closed = pin!(self.shared.closed.cancelled());
    select(send, closed).await;
  }
}

/// Read end, yielding chunks in write order.
///
/// An error written by the producer is yielded once and ends the stream.
pub struct PipeReader {
  receiver: mpsc::Receiver<Chunk>,
  shared: Arc<Shared>,
  done: bool,
}

impl PipeReader {
  /// A handle that can mark the reader closed after the reader was handed
  /// to a consumer.
  pub fn close_handle(&self) -> ReaderCloser {
    ReaderCloser {
      shared: self.shared.clone(),
    }
  }
}

impl Stream for PipeReader {
  type Item = io::Result<Bytes>;

  fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    let this = self.get_mut();
    if this.done {
      return Poll::Ready(None);
    }

    match ready!(this.receiver.poll_recv(cx)) {
      Some(Ok(chunk)) => Poll::Ready(Some(Ok(chunk))),
      Some(Err(e)) => {
        this.done = true;
        this.receiver.close();
        Poll::Ready(Some(Err(e)))
      }
      None => {
        this.done = true;
        Poll::Ready(None)
      }
    }
  }
}

/// Marks the read side closed, recording why.
///
/// Subsequent writes fail with `BrokenPipe` carrying the reason.
pub struct ReaderCloser {
  shared: Arc<Shared>,
}

impl ReaderCloser {
  /// Close the read side, even while the reader itself is still held
  /// somewhere. Writers parked on a full pipe are woken and fail.
  ///
  /// Only the first reason is kept; later calls leave it unchanged.
  pub fn close(self, reason: Option<String>) {
    let _ = self
      .shared
      .reader_closed
      .set(reason.unwrap_or_else(|| READER_CLOSED.to_string()));
    self.shared.closed.cancel();
  }
}

#[cfg(test)]
mod tests {
  use futures::StreamExt;
  use tokio::io::AsyncWriteExt;

  use super::*;

  async fn collect(mut reader: PipeReader) -> (Vec<u8>, Option<io::Error>) {
    let mut data = Vec::new();
    while let Some(chunk) = reader.next().await {
      match chunk {
        Ok(chunk) => data.extend_from_slice(&chunk),
        Err(e) => return (data, Some(e)),
      }
    }
    (data, None)
  }

  #[tokio::test]
  async fn test_bytes_arrive_in_order() {
    let (mut writer, reader) = pipe(2);

    let producer = tokio::spawn(async move {
      for i in 0..100u8 {
        writer.write_all(&[i, i]).await.unwrap();
      }
    });
    let (data, err) = collect(reader).await;
    producer.await.unwrap();

    let expected: Vec<u8> = (0..100u8).flat_map(|i| [i, i]).collect();
    assert_eq!(data, expected);
    assert!(err.is_none());
  }

  #[tokio::test]
  async fn test_error_follows_flushed_data() {
    let (mut writer, reader) = pipe(4);
    let closer = writer.close_handle();

    writer.write_all(b"partial").await.unwrap();
    drop(writer);
    closer
      .close_with_error(io::Error::other("render failed"))
      .await;

    let (data, err) = collect(reader).await;
    assert_eq!(data, b"partial");
    assert_eq!(err.unwrap().to_string(), "render failed");
  }

  #[tokio::test]
  async fn test_stream_ends_only_when_closer_dropped() {
    let (mut writer, mut reader) = pipe(4);
    let closer = writer.close_handle();

    writer.write_all(b"abc").await.unwrap();
    drop(writer);
    assert_eq!(reader.next().await.unwrap().unwrap(), Bytes::from("abc"));

    closer.close();
    assert!(reader.next().await.is_none());
  }

  #[tokio::test]
  async fn test_write_fails_after_reader_dropped() {
    let (mut writer, reader) = pipe(1);
    drop(reader);

    let err = writer.write_all(b"lost").await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
  }

  #[tokio::test]
  async fn test_blocked_writer_released_when_reader_dropped() {
    let (mut writer, reader) = pipe(1);

    let producer = tokio::spawn(async move {
      loop {
        if let Err(e) = writer.write_all(&[0u8; 1024]).await {
          return e;
        }
      }
    });
    tokio::task::yield_now().await;
    drop(reader);

    let err = producer.await.unwrap();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
  }

  #[tokio::test]
  async fn test_reader_close_reason_reaches_writer() {
    let (mut writer, reader) = pipe(4);
    reader
      .close_handle()
      .close(Some("upload rejected (413)".to_string()));

    let err = writer.write_all(b"x").await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    assert!(err.to_string().contains("413"));
    drop(reader);
  }

  #[tokio::test]
  async fn test_parked_writer_released_when_reader_closed() {
    let (mut writer, reader) = pipe(1);
    let reader_closer = reader.close_handle();

    let producer = tokio::spawn(async move {
      loop {
        if let Err(e) = writer.write_all(&[0u8; 1024]).await {
          return e;
        }
      }
    });
    tokio::task::yield_now().await;
    reader_closer.close(Some("upload rejected (413)".to_string()));

    let err = tokio::time::timeout(std::time::Duration::from_secs(5), producer)
      .await
      .expect("writer still parked")
      .unwrap();
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    assert!(err.to_string().contains("413"));
    drop(reader);
  }

  #[tokio::test]
  async fn test_error_delivery_abandoned_when_reader_closed() {
    let (mut writer, reader) = pipe(1);
    let closer = writer.close_handle();
    writer.write_all(b"fills the pipe").await.unwrap();
    drop(writer);

    reader.close_handle().close(None);
    tokio::time::timeout(
      std::time::Duration::from_secs(5),
      closer.close_with_error(io::Error::other("late")),
    )
    .await
    .expect("error delivery still parked");
    drop(reader);
  }

  #[tokio::test]
  async fn test_first_close_reason_wins() {
    let (mut writer, reader) = pipe(1);
    reader.close_handle().close(Some("first".to_string()));
    reader.close_handle().close(Some("second".to_string()));

    let err = writer.write_all(b"x").await.unwrap_err();
    assert_eq!(err.to_string(), "first");
    drop(reader);
  }

  #[tokio::test]
  async fn test_nothing_after_error() {
    let (writer, mut reader) = pipe(4);
    let closer = writer.close_handle();
    let second = writer.close_handle();

    closer.close_with_error(io::Error::other("boom")).await;
    drop(writer);
    drop(second);

    assert!(reader.next().await.unwrap().is_err());
    assert!(reader.next().await.is_none());
  }
}
