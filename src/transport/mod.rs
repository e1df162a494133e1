//! Line Transport: newline framing over a duplex byte stream.
//!
//! [`LineTransport`] owns at most one stream at a time, split into a reader and
//! a writer half. The reader is buffered and its line buffer persists across
//! [`LineTransport::read_line`] calls, so a single physical read may yield
//! zero, one or many logical lines and a partial line waits for the next call.
//!
//! Where the stream comes from is behind [`StreamProvider`]; the serial port
//! implementation lives in [`serial`].
//!
//! # Concurrency
//!
//! One command at a time. The transport holds exactly one reader and one
//! writer; two exchanges in flight would interleave bytes on the same stream.
//! Nothing here queues or rejects overlapping exchanges, callers serialize
//! them. [`LineTransport::close`] is the exception: it may run while a read is
//! pending, and that read settles with [`ConfiguratorError::NotOpen`].

pub mod serial;

use crate::error::{AppResult, ConfiguratorError};
use async_trait::async_trait;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use tokio::sync::{watch, Mutex};

/// Fixed bit rate of the device's configuration port.
pub const DEVICE_BAUD_RATE: u32 = 115_200;

/// Trait alias for async duplex byte streams.
///
/// Covers `tokio_serial::SerialStream` for hardware and
/// `tokio::io::DuplexStream` for tests.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed stream.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Source of the duplex stream a [`LineTransport`] opens.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Acquires a stream running at `baud_rate`.
    ///
    /// Fails with [`ConfiguratorError::TransportUnavailable`] when the host has
    /// no stream to offer.
    async fn open(&self, baud_rate: u32) -> AppResult<DynSerial>;

    /// Human-readable name of the stream source, for logs.
    fn describe(&self) -> String;
}

/// Provider handing out a stream the caller already holds. Single use.
pub struct AttachedStream {
    stream: Mutex<Option<DynSerial>>,
}

impl AttachedStream {
    /// Wraps `stream`.
    pub fn new(stream: DynSerial) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
        }
    }
}

#[async_trait]
impl StreamProvider for AttachedStream {
    async fn open(&self, _baud_rate: u32) -> AppResult<DynSerial> {
        self.stream.lock().await.take().ok_or_else(|| {
            ConfiguratorError::TransportUnavailable("attached stream already consumed".into())
        })
    }

    fn describe(&self) -> String {
        "attached stream".to_string()
    }
}

/// Buffered reader half plus the bytes of a line not yet complete.
struct LineReader {
    inner: BufReader<ReadHalf<DynSerial>>,
    pending: Vec<u8>,
}

impl LineReader {
    fn new(inner: ReadHalf<DynSerial>) -> Self {
        Self {
            inner: BufReader::new(inner),
            pending: Vec::new(),
        }
    }

    /// Next newline-terminated line, or the pending remainder at end of data.
    ///
    /// Cancel safe: a partial line stays in `pending` for the next call.
    async fn next_line(&mut self) -> std::io::Result<String> {
        self.inner.read_until(b'\n', &mut self.pending).await?;
        let line = std::mem::take(&mut self.pending);
        if line.last() != Some(&b'\n') {
            tracing::debug!(buffered = line.len(), "end of data from device");
        }
        Ok(decode(&line))
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// Newline-framed transport over one exclusively held stream.
pub struct LineTransport {
    provider: Box<dyn StreamProvider>,
    reader: Mutex<Option<LineReader>>,
    writer: Mutex<Option<WriteHalf<DynSerial>>>,
    closed: watch::Sender<bool>,
}

impl LineTransport {
    /// Transport that will open its stream from `provider`.
    pub fn new(provider: Box<dyn StreamProvider>) -> Self {
        let (closed, _) = watch::channel(true);
        Self {
            provider,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            closed,
        }
    }

    /// Acquires the stream at [`DEVICE_BAUD_RATE`].
    ///
    /// Fails with [`ConfiguratorError::TransportBusy`] if a stream is already held.
    pub async fn open(&self) -> AppResult<()> {
        let mut writer = self.writer.lock().await;
        if writer.is_some() || !*self.closed.borrow() {
            return Err(ConfiguratorError::TransportBusy);
        }

        let stream = self.provider.open(DEVICE_BAUD_RATE).await?;
        let (read_half, write_half) = tokio::io::split(stream);
        *self.reader.lock().await = Some(LineReader::new(read_half));
        *writer = Some(write_half);
        self.closed.send_replace(false);

        tracing::info!(
            source = %self.provider.describe(),
            baud = DEVICE_BAUD_RATE,
            "Serial port opened"
        );
        Ok(())
    }

    /// Whether a stream is currently held.
    pub fn is_open(&self) -> bool {
        !*self.closed.borrow()
    }

    /// Sends `text` as UTF-8 and waits for the flush.
    pub async fn write(&self, text: &str) -> AppResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ConfiguratorError::NotOpen)?;
        writer.write_all(text.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Waits for the next line, newline stripped and trimmed.
    ///
    /// At end of data the buffered partial line (possibly empty) is returned
    /// instead of an error. A concurrent [`close`](Self::close) settles the
    /// wait with [`ConfiguratorError::NotOpen`].
    pub async fn read_line(&self) -> AppResult<String> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(ConfiguratorError::NotOpen);
        }

        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(ConfiguratorError::NotOpen)?;
        tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => Err(ConfiguratorError::NotOpen),
            line = reader.next_line() => Ok(line?),
        }
    }

    /// Releases the writer, cancels a pending read, then drops the stream.
    ///
    /// Safe to call repeatedly, before `open()`, and during teardown. Errors
    /// from halves that were never opened or are already gone are discarded.
    pub async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!(error = %e, "ignoring error while closing writer");
            }
        }

        let was_open = !self.closed.send_replace(true);

        // The pending read, if any, has seen the flag and released the reader.
        drop(self.reader.lock().await.take());

        if was_open {
            tracing::info!(source = %self.provider.describe(), "Serial port closed");
        }
    }
}
