//! Bounded single-writer/single-reader byte channel joining two sessions
//!
//! The conduit holds at most `capacity` bytes in flight. A write into a full conduit
//! suspends until the reader catches up, so a fast source can never outrun a slow
//! destination. Closing signals travel both ways:
//!
//! - dropping (or shutting down) the [`ConduitWriter`] lets the reader drain what is
//!   buffered and then observe end-of-stream
//! - dropping the [`ConduitReader`] makes every pending and future write fail with
//!   [`std::io::ErrorKind::BrokenPipe`]

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

/// Shared count of bytes accepted by a [`ConduitWriter`]
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn add(&self, n: usize) {
        self.0.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Write end of a conduit
#[derive(Debug)]
pub struct ConduitWriter {
    inner: DuplexStream,
    counter: ByteCounter,
}

/// Read end of a conduit
#[derive(Debug)]
pub struct ConduitReader {
    inner: DuplexStream,
}

/// Create a conduit holding at most `capacity` bytes (at least one).
#[must_use]
pub fn conduit(capacity: usize) -> (ConduitWriter, ConduitReader) {
    let (write_half, read_half) = tokio::io::duplex(capacity.max(1));
    (
        ConduitWriter {
            inner: write_half,
            counter: ByteCounter::default(),
        },
        ConduitReader { inner: read_half },
    )
}

impl ConduitWriter {
    /// Handle observing the number of bytes written so far
    #[must_use]
    pub fn counter(&self) -> ByteCounter {
        self.counter.clone()
    }
}

impl AsyncWrite for ConduitWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = &mut *self;
        let res = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &res {
            this.counter.add(*n);
        }
        res
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl AsyncRead for ConduitReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}
