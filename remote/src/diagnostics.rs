//! Sinks for the diagnostic output of remote commands
//!
//! Both sessions write their stderr (and the destination its stdout) into a sink
//! created here. Each session gets its own writer so the two concurrent runs never
//! share a handle.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;

use crate::error::{Side, StreamKind};
use crate::session::BoxedWrite;

/// Where remote diagnostic output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum Diagnostics {
    /// Copied verbatim to the local stderr
    #[default]
    Passthrough,
    /// Re-emitted line by line as log events under the `remote` target
    Log,
    /// Dropped
    Discard,
}

impl Diagnostics {
    #[must_use]
    pub fn writer(&self, side: Side, stream: StreamKind) -> BoxedWrite {
        match self {
            Self::Passthrough => Box::new(tokio::io::stderr()),
            Self::Log => Box::new(LogWriter::new(side, stream)),
            Self::Discard => Box::new(tokio::io::sink()),
        }
    }
}

/// Splits written bytes into lines and emits each as a tracing event.
///
/// stderr lines are logged at WARN, stdout lines at INFO. A trailing partial line is
/// emitted on shutdown or drop.
#[derive(Debug)]
pub struct LogWriter {
    side: Side,
    stream: StreamKind,
    pending: Vec<u8>,
}

impl LogWriter {
    #[must_use]
    pub fn new(side: Side, stream: StreamKind) -> Self {
        Self {
            side,
            stream,
            pending: Vec::new(),
        }
    }

    fn emit(&self, line: &[u8]) {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches('\r');
        match self.stream {
            StreamKind::Stderr => {
                tracing::warn!(target: "remote", "[{}] {}", self.side, line)
            }
            _ => tracing::info!(target: "remote", "[{}] {}", self.side, line),
        }
    }

    fn emit_complete_lines(&mut self) {
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.emit(&line[..line.len() - 1]);
        }
    }

    fn emit_rest(&mut self) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest);
        }
    }
}

impl AsyncWrite for LogWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.pending.extend_from_slice(buf);
        self.emit_complete_lines();
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.emit_rest();
        Poll::Ready(Ok(()))
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        self.emit_rest();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tracing_test::traced_test;

    #[test]
    fn parses_cli_names() {
        assert_eq!("log".parse::<Diagnostics>().ok(), Some(Diagnostics::Log));
        assert_eq!(
            "Passthrough".parse::<Diagnostics>().ok(),
            Some(Diagnostics::Passthrough)
        );
        assert!("nowhere".parse::<Diagnostics>().is_err());
    }

    #[tokio::test]
    #[traced_test]
    async fn log_writer_emits_lines_with_side() -> anyhow::Result<()> {
        let mut writer = LogWriter::new(Side::Source, StreamKind::Stderr);
        writer.write_all(b"tar: Removing leading `/'").await?;
        writer.write_all(b" from member names\npartial").await?;
        assert!(logs_contain(
            "[source] tar: Removing leading `/' from member names"
        ));
        assert!(!logs_contain("partial"));
        writer.shutdown().await?;
        assert!(logs_contain("[source] partial"));
        Ok(())
    }
}
