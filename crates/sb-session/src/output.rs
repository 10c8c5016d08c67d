//! Destinations for remote output

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Receives remote output chunks in order
#[async_trait]
pub trait OutputSink: Send + 'static {
    async fn write(&mut self, chunk: &[u8]) -> io::Result<()>;
}

/// Writes and flushes every chunk to an async writer
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> OutputSink for WriterSink<W> {
    async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.writer.write_all(chunk).await?;
        self.writer.flush().await
    }
}

/// Sink for the process's stdout
pub fn stdout_sink() -> WriterSink<tokio::io::Stdout> {
    WriterSink::new(tokio::io::stdout())
}

/// Publishes each chunk as a [`Bytes`] event
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl OutputSink for ChannelSink {
    async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.tx
            .send(Bytes::copy_from_slice(chunk))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "output receiver dropped"))
    }
}
