//! Drives a local child process as the carrier of an exec session
//!
//! Both the kubectl-backed and the local session run a child process with piped
//! stdio and pump the caller's stream ends in and out of it. The pumps run
//! concurrently with the child; when the child exits first, feeding its stdin stops
//! immediately instead of waiting for more input.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::instrument;

use crate::error::{SessionError, StreamKind};
use crate::session::{AttachedStreams, BoxedRead, BoxedWrite, SessionIo};

/// Bytes of stderr retained for error messages
const STDERR_TAIL: usize = 4096;

/// How a child process terminated unsuccessfully
#[derive(Debug)]
pub(crate) struct ExitFailure {
    pub code: Option<i32>,
    pub stderr: String,
}

impl ExitFailure {
    pub fn status(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Keeps the last `STDERR_TAIL` bytes written through it
#[derive(Debug, Default)]
struct Tail(Vec<u8>);

impl Tail {
    fn push(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
        if self.0.len() > STDERR_TAIL {
            let excess = self.0.len() - STDERR_TAIL;
            self.0.drain(..excess);
        }
    }

    fn into_string(self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

async fn pump_stdin(
    reader: Option<&mut BoxedRead>,
    child_stdin: Option<tokio::process::ChildStdin>,
) -> std::io::Result<()> {
    let Some(mut child_stdin) = child_stdin else {
        return Ok(());
    };
    if let Some(reader) = reader {
        tokio::io::copy(reader, &mut child_stdin).await?;
    }
    // closing stdin is the end-of-input signal for the child
    child_stdin.shutdown().await
}

async fn pump_stdout(
    child_stdout: Option<tokio::process::ChildStdout>,
    writer: Option<BoxedWrite>,
) -> std::io::Result<()> {
    let Some(mut child_stdout) = child_stdout else {
        return Ok(());
    };
    match writer {
        Some(mut writer) => {
            tokio::io::copy(&mut child_stdout, &mut writer).await?;
            writer.shutdown().await
        }
        None => tokio::io::copy(&mut child_stdout, &mut tokio::io::sink())
            .await
            .map(|_| ()),
    }
}

async fn pump_stderr<R, W>(child_stderr: Option<R>, mut writer: W) -> (std::io::Result<()>, Tail)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut tail = Tail::default();
    let Some(mut child_stderr) = child_stderr else {
        return (Ok(()), tail);
    };
    let mut buf = vec![0u8; 8192];
    let res = async {
        loop {
            let n = child_stderr.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            tail.push(&buf[..n]);
            writer.write_all(&buf[..n]).await?;
        }
        writer.shutdown().await
    }
    .await;
    (res, tail)
}

fn stream_error(target: &str, stream: StreamKind, source: std::io::Error) -> SessionError {
    SessionError::Stream {
        target: target.to_string(),
        stream,
        source,
    }
}

/// Spawn `cmd` and relay `io` through it until it exits.
///
/// `classify` turns an unsuccessful exit into the matching [`SessionError`].
#[instrument(level = "debug", skip(cmd, io, classify))]
pub(crate) async fn run_child<F>(
    mut cmd: tokio::process::Command,
    target: &str,
    streams: AttachedStreams,
    io: SessionIo,
    classify: F,
) -> Result<(), SessionError>
where
    F: FnOnce(ExitFailure) -> SessionError,
{
    let piped_if = |attached: bool| {
        if attached {
            std::process::Stdio::piped()
        } else {
            std::process::Stdio::null()
        }
    };
    cmd.stdin(piped_if(streams.stdin))
        .stdout(piped_if(streams.stdout))
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);
    let mut child = cmd.spawn().map_err(|error| match error.kind() {
        std::io::ErrorKind::NotFound => SessionError::NotFound {
            target: target.to_string(),
            reason: format!("failed to spawn {:?}: {error}", cmd.as_std().get_program()),
        },
        _ => SessionError::Connection {
            target: target.to_string(),
            reason: format!("failed to spawn {:?}: {error}", cmd.as_std().get_program()),
        },
    })?;
    tracing::debug!("spawned child process {:?} for {}", child.id(), target);
    let mut stdin = if streams.stdin { io.stdin } else { None };
    let stdout = if streams.stdout { io.stdout } else { None };
    let child_stdin = child.stdin.take();
    let child_stdout = child.stdout.take();
    let child_stderr = child.stderr.take();
    let (stdin_res, stdout_res, (stderr_res, tail), status) = {
        let stdin_pump = pump_stdin(stdin.as_mut(), child_stdin);
        let output = async {
            let (stdout_res, stderr_res) = tokio::join!(
                pump_stdout(child_stdout, stdout),
                pump_stderr(child_stderr, io.stderr)
            );
            let status = child.wait().await;
            (stdout_res, stderr_res, status)
        };
        tokio::pin!(stdin_pump);
        tokio::pin!(output);
        tokio::select! {
            stdin_res = &mut stdin_pump => {
                let (stdout_res, stderr_res, status) = output.await;
                (Some(stdin_res), stdout_res, stderr_res, status)
            }
            (stdout_res, stderr_res, status) = &mut output => {
                // the child is gone, whatever it did not read is handled below
                (None, stdout_res, stderr_res, status)
            }
        }
    };
    let status = status.map_err(|error| SessionError::ConnectionLost {
        target: target.to_string(),
        reason: format!("failed to wait for child process: {error}"),
    })?;
    if !status.success() {
        // the reader is dropped without draining, a producer writing into it fails fast
        return Err(classify(ExitFailure {
            code: status.code(),
            stderr: tail.into_string(),
        }));
    }
    stdout_res.map_err(|error| stream_error(target, StreamKind::Stdout, error))?;
    stderr_res.map_err(|error| stream_error(target, StreamKind::Stderr, error))?;
    match stdin_res {
        // a child may legitimately exit before consuming all of its input
        Some(Err(error)) if error.kind() != std::io::ErrorKind::BrokenPipe => {
            return Err(stream_error(target, StreamKind::Stdin, error));
        }
        Some(Ok(())) => {}
        _ => {
            if let Some(reader) = stdin.as_mut() {
                let drained = tokio::io::copy(reader, &mut tokio::io::sink())
                    .await
                    .map_err(|error| stream_error(target, StreamKind::Stdin, error))?;
                if drained > 0 {
                    tracing::debug!("{} exited leaving {} input bytes unread", target, drained);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    fn remote_exit(failure: ExitFailure) -> SessionError {
        SessionError::RemoteExit {
            target: "local".to_string(),
            command: "sh".to_string(),
            status: failure.status(),
            stderr: failure.stderr,
        }
    }

    #[test]
    fn tail_keeps_last_bytes() {
        let mut tail = Tail::default();
        tail.push(&vec![b'a'; STDERR_TAIL]);
        tail.push(b"end");
        let text = tail.into_string();
        assert_eq!(text.len(), STDERR_TAIL);
        assert!(text.ends_with("aend"));
    }

    #[tokio::test]
    async fn pipes_stdin_to_stdout() -> anyhow::Result<()> {
        let (out_writer, mut out_reader) = tokio::io::duplex(1 << 16);
        let io = SessionIo {
            stdin: Some(Box::new(&b"round trip through cat"[..])),
            stdout: Some(Box::new(out_writer)),
            stderr: Box::new(tokio::io::sink()),
        };
        run_child(sh("cat"), "local", AttachedStreams::DESTINATION, io, remote_exit).await?;
        let mut output = Vec::new();
        out_reader.read_to_end(&mut output).await?;
        assert_eq!(output, b"round trip through cat");
        Ok(())
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let io = SessionIo {
            stdin: None,
            stdout: Some(Box::new(tokio::io::sink())),
            stderr: Box::new(tokio::io::sink()),
        };
        let error = run_child(
            sh("echo 'no such file' >&2; exit 3"),
            "local",
            AttachedStreams::SOURCE,
            io,
            remote_exit,
        )
        .await
        .expect_err("exit 3 must fail");
        match error {
            SessionError::RemoteExit { status, stderr, .. } => {
                assert_eq!(status, "exit code 3");
                assert_eq!(stderr.trim(), "no such file");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn early_exit_drains_remaining_input() -> anyhow::Result<()> {
        let (mut writer, reader) = tokio::io::duplex(64);
        let producer = tokio::spawn(async move {
            for _ in 0..256 {
                writer.write_all(&[7u8; 1024]).await?;
            }
            Ok::<_, std::io::Error>(())
        });
        let io = SessionIo {
            stdin: Some(Box::new(reader)),
            stdout: Some(Box::new(tokio::io::sink())),
            stderr: Box::new(tokio::io::sink()),
        };
        // reads a single byte and exits successfully
        run_child(
            sh("head -c 1 >/dev/null"),
            "local",
            AttachedStreams::DESTINATION,
            io,
            remote_exit,
        )
        .await?;
        // the producer was not cut off with a broken pipe
        producer.await??;
        Ok(())
    }

    #[tokio::test]
    async fn missing_program_is_not_found() {
        let io = SessionIo {
            stdin: None,
            stdout: None,
            stderr: Box::new(tokio::io::sink()),
        };
        let error = run_child(
            tokio::process::Command::new("/definitely/not/a/program"),
            "local",
            AttachedStreams::SOURCE,
            io,
            remote_exit,
        )
        .await
        .expect_err("spawn must fail");
        assert!(matches!(error, SessionError::NotFound { .. }), "{error:?}");
    }
}
