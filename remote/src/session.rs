//! Exec session abstraction
//!
//! An exec session is a remote command plus the standard streams it was established
//! with. A [`SessionFactory`] prepares sessions without transferring any data;
//! [`ExecSession::run`] starts the command, wires caller supplied stream ends to it and
//! blocks until it terminates.
//!
//! The session lifecycle (not started → running → terminated) is carried by ownership:
//! `run` consumes the boxed session, so a session can be started at most once and
//! nothing can observe it after it terminated.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::endpoint::Endpoint;
use crate::error::SessionError;

/// Boxed readable stream end handed to a session
pub type BoxedRead = Box<dyn AsyncRead + Unpin + Send>;
/// Boxed writable stream end handed to a session
pub type BoxedWrite = Box<dyn AsyncWrite + Unpin + Send>;

/// Which standard streams of the remote command are wired up.
///
/// stderr is always attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttachedStreams {
    pub stdin: bool,
    pub stdout: bool,
}

impl AttachedStreams {
    /// Producer side: stdout only
    pub const SOURCE: Self = Self {
        stdin: false,
        stdout: true,
    };
    /// Consumer side: stdin and stdout
    pub const DESTINATION: Self = Self {
        stdin: true,
        stdout: true,
    };
}

/// Stream ends the caller attaches to a running session.
///
/// Ends for streams the session was not established with are ignored and dropped.
pub struct SessionIo {
    pub stdin: Option<BoxedRead>,
    pub stdout: Option<BoxedWrite>,
    pub stderr: BoxedWrite,
}

impl std::fmt::Debug for SessionIo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SessionIo")
            .field("stdin", &self.stdin.is_some())
            .field("stdout", &self.stdout.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
pub trait ExecSession: Send + std::fmt::Debug {
    fn endpoint(&self) -> &Endpoint;

    /// Command argument vector run in the container
    fn command(&self) -> &[String];

    fn streams(&self) -> AttachedStreams;

    /// Start the command and block until it exits or an I/O error occurs.
    ///
    /// Fails on non-zero remote exit, connection loss or local I/O failure on the
    /// attached streams. On return every stream resource is released, the supplied
    /// readable end has been drained (after a successful exit) or dropped, and the
    /// supplied writable ends receive no further writes. Dropping the returned future
    /// tears the session down.
    async fn run(self: Box<Self>, io: SessionIo) -> Result<(), SessionError>;
}

#[async_trait::async_trait]
pub trait SessionFactory: Send + Sync {
    /// Prepare a session running `command` in the container addressed by `endpoint`.
    ///
    /// Fails with [`SessionError::Connection`] when the endpoint cannot be reached or
    /// authorized and [`SessionError::NotFound`] when the pod or container is missing.
    async fn establish(
        &self,
        endpoint: &Endpoint,
        command: Vec<String>,
        streams: AttachedStreams,
    ) -> Result<Box<dyn ExecSession>, SessionError>;
}

/// Render an argument vector for logs and error messages
#[must_use]
pub fn display_command(command: &[String]) -> String {
    command.join(" ")
}
