//! # Bounded In-Process Byte Pipe
//!
//! Streaming transfers run as two parties: a producer that writes an archive
//! and a consumer that reads it. [`pipe`] joins them with a bounded
//! `sync_channel` of byte chunks, so at most `capacity` chunks are ever held
//! in memory. When the consumer falls behind, the producer blocks in `write`
//! until a chunk is drained.
//!
//! ## End-of-stream rules
//!
//! - Dropping the [`PipeWriter`] ends the stream: the reader sees EOF.
//! - [`PipeWriter::fail`] ends the stream with an error: the reader returns
//!   that error instead of EOF, so a consumer never mistakes a truncated
//!   archive for a complete one.
//! - Dropping the [`PipeReader`] makes every later write fail with
//!   `BrokenPipe`, which unblocks a producer whose consumer gave up.
//!
//! Both ends observe a shared [`Cancellation`]. Once it fires, reads and
//! writes fail, which unwinds both parties.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often a blocked reader re-checks its cancellation token
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Message used for cancelled operations
const CANCELLED: &str = "operation cancelled";

/// Message used for operations that ran past their deadline
const DEADLINE_EXCEEDED: &str = "deadline exceeded";

/// Cancellation flag with an optional deadline, shared by both pipe ends
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// A token that only fires when [`cancel`](Self::cancel) is called
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also fires once `timeout` has elapsed from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// A token that fires after `timeout` when one is given
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map(Self::with_timeout).unwrap_or_default()
    }

    /// Fire the token for every clone
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether the token was cancelled or its deadline passed
    pub fn is_triggered(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fail with an I/O error once the token has fired.
    ///
    /// Cancellation is reported as `ErrorKind::Other` rather than
    /// `Interrupted`, because std's read/write loops retry `Interrupted`.
    pub fn check(&self) -> io::Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, CANCELLED));
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(io::Error::new(io::ErrorKind::TimedOut, DEADLINE_EXCEEDED));
        }
        Ok(())
    }
}

enum Chunk {
    Data(Vec<u8>),
    Failed(io::ErrorKind, String),
}

/// Create a pipe buffering at most `capacity` chunks
pub fn pipe(capacity: usize, cancel: Cancellation) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    let writer = PipeWriter {
        tx,
        cancel: cancel.clone(),
        reader_closed: false,
    };
    let reader = PipeReader {
        rx,
        cancel,
        buffer: Vec::new(),
        pos: 0,
        failure: None,
        finished: false,
    };
    (writer, reader)
}

/// Write end of a [`pipe`]
pub struct PipeWriter {
    tx: SyncSender<Chunk>,
    cancel: Cancellation,
    reader_closed: bool,
}

impl PipeWriter {
    /// Whether a write failed because the reader was dropped
    pub fn reader_closed(&self) -> bool {
        self.reader_closed
    }

    /// End the stream with an error the reader will report instead of EOF
    pub fn fail(self, err: &io::Error) {
        // The reader may already be gone; nothing is left to notify then
        let _ = self.tx.send(Chunk::Failed(err.kind(), err.to_string()));
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.cancel.check()?;
        if buf.is_empty() {
            return Ok(0);
        }
        if self.tx.send(Chunk::Data(buf.to_vec())).is_err() {
            self.reader_closed = true;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Read end of a [`pipe`]
pub struct PipeReader {
    rx: Receiver<Chunk>,
    cancel: Cancellation,
    buffer: Vec<u8>,
    pos: usize,
    failure: Option<(io::ErrorKind, String)>,
    finished: bool,
}

impl PipeReader {
    fn next_chunk(&mut self) -> io::Result<bool> {
        loop {
            self.cancel.check()?;
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(Chunk::Data(data)) => {
                    self.buffer = data;
                    self.pos = 0;
                    return Ok(true);
                }
                Ok(Chunk::Failed(kind, message)) => {
                    self.failure = Some((kind, message.clone()));
                    return Err(io::Error::new(kind, message));
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    self.finished = true;
                    return Ok(false);
                }
            }
        }
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some((kind, message)) = &self.failure {
            return Err(io::Error::new(*kind, message.clone()));
        }
        if self.pos >= self.buffer.len() {
            if self.finished || !self.next_chunk()? {
                return Ok(0);
            }
        }

        let available = &self.buffer[self.pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}
