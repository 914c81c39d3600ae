//! Output side of a client stream
//!
//! The supervisor and the dispatcher only see an `EventSink`; the HTTP layer
//! decides what sits behind it (a response body channel, a socket, a test
//! buffer).
use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("stream is closed")]
    Closed,

    #[error("stream write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Exclusively-owned writer for one client stream
#[async_trait]
pub trait EventSink: Send {
    /// Write one complete frame and flush it to the client
    async fn write_frame(&mut self, frame: &str) -> Result<(), SinkError>;

    /// Dispose the stream. Must be safe to call more than once.
    async fn close(&mut self);
}

/// Sink feeding a bounded channel, typically drained by a streaming
/// HTTP response body
///
/// A full channel suspends the writer until the client catches up.
pub struct ChannelSink {
    sender: Option<mpsc::Sender<String>>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<String>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Create a sink together with the receiving end of its channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn write_frame(&mut self, frame: &str) -> Result<(), SinkError> {
        match &self.sender {
            Some(sender) => sender
                .send(frame.to_owned())
                .await
                .map_err(|_| SinkError::Closed),
            None => Err(SinkError::Closed),
        }
    }

    async fn close(&mut self) {
        // Dropping the sender ends the response body once it is drained
        self.sender.take();
    }
}

/// Sink writing straight into any async byte stream
pub struct WriterSink<W> {
    writer: Option<W>,
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
        }
    }
}

#[async_trait]
impl<W> EventSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_frame(&mut self, frame: &str) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!(error = %e, "stream shutdown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers_frames() {
        let (mut sink, mut rx) = ChannelSink::channel(4);

        sink.write_frame("data: a\n\n").await.unwrap();
        sink.write_frame("data: b\n\n").await.unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("data: a\n\n"));
        assert_eq!(rx.recv().await.as_deref(), Some("data: b\n\n"));
    }

    #[tokio::test]
    async fn test_channel_sink_fails_when_receiver_dropped() {
        let (mut sink, rx) = ChannelSink::channel(4);
        drop(rx);

        let result = sink.write_frame("data: a\n\n").await;
        assert!(matches!(result, Err(SinkError::Closed)));
    }

    #[tokio::test]
    async fn test_channel_sink_close_ends_stream() {
        let (mut sink, mut rx) = ChannelSink::channel(4);

        sink.close().await;
        sink.close().await;

        assert!(rx.recv().await.is_none());
        assert!(matches!(
            sink.write_frame("data: a\n\n").await,
            Err(SinkError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_writer_sink_writes_bytes() {
        let mock = tokio_test::io::Builder::new()
            .write(b"event: ping\ndata: keep_alive\n\n")
            .build();
        let mut sink = WriterSink::new(mock);

        sink.write_frame("event: ping\ndata: keep_alive\n\n")
            .await
            .unwrap();
        sink.close().await;
    }

    #[tokio::test]
    async fn test_writer_sink_surfaces_io_errors() {
        let mock = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer gone",
            ))
            .build();
        let mut sink = WriterSink::new(mock);

        let result = sink.write_frame("data: x\n\n").await;
        assert!(matches!(result, Err(SinkError::Io(_))));
    }
}
