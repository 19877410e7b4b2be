//! Error taxonomy for exec sessions and for the relay outcome

/// Which side of the copy an error or a diagnostic line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Side {
    Source,
    Destination,
}

/// Standard stream of a remote command
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The endpoint could not be reached or the caller is not authorized.
    #[error("cannot reach {target}: {reason}")]
    Connection { target: String, reason: String },

    /// Pod or container does not exist.
    #[error("{target} not found: {reason}")]
    NotFound { target: String, reason: String },

    /// The exec channel broke while the command was running.
    #[error("connection to {target} lost: {reason}")]
    ConnectionLost { target: String, reason: String },

    /// The remote command ran and exited unsuccessfully.
    #[error("command `{command}` on {target} failed ({status}){}", stderr_suffix(.stderr))]
    RemoteExit {
        target: String,
        command: String,
        status: String,
        stderr: String,
    },

    /// Local I/O failure on one of the attached streams.
    #[error("{stream} stream of {target} failed")]
    Stream {
        target: String,
        stream: StreamKind,
        #[source]
        source: std::io::Error,
    },

    /// The task driving the session did not run to completion.
    #[error("session task for {target} aborted: {reason}")]
    Aborted { target: String, reason: String },

    #[error("session on {target} cancelled")]
    Cancelled { target: String },
}

fn stderr_suffix(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

impl SessionError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// A failed copy operation.
///
/// The successful counterpart is [`crate::relay::RelayStats`]; together they form the
/// single outcome produced per copy.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A session could not be established; nothing was started.
    #[error("failed to establish {side} session")]
    Establish {
        side: Side,
        #[source]
        source: SessionError,
    },

    #[error("source failed")]
    Source(#[source] SessionError),

    /// The destination failed. Its error is authoritative; a source failure observed in
    /// the same run is kept as `upstream`.
    #[error("destination failed{}", upstream_suffix(.upstream))]
    Destination {
        #[source]
        source: SessionError,
        upstream: Option<SessionError>,
    },

    #[error("copy cancelled")]
    Cancelled,
}

fn upstream_suffix(upstream: &Option<SessionError>) -> String {
    match upstream {
        Some(error) => format!(" (source also failed: {error})"),
        None => String::new(),
    }
}

impl RelayError {
    /// Side the failure is attributed to, `None` for cancellation
    #[must_use]
    pub fn side(&self) -> Option<Side> {
        match self {
            Self::Establish { side, .. } => Some(*side),
            Self::Source(_) => Some(Side::Source),
            Self::Destination { .. } => Some(Side::Destination),
            Self::Cancelled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_exit_includes_stderr() {
        let error = SessionError::RemoteExit {
            target: "default/pod-a".to_string(),
            command: "tar cf - /nope".to_string(),
            status: "exit code 2".to_string(),
            stderr: "tar: /nope: Cannot stat\n".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "command `tar cf - /nope` on default/pod-a failed (exit code 2): tar: /nope: Cannot stat"
        );
    }

    #[test]
    fn destination_error_mentions_upstream() {
        let error = RelayError::Destination {
            source: SessionError::Cancelled {
                target: "b".to_string(),
            },
            upstream: Some(SessionError::NotFound {
                target: "a".to_string(),
                reason: "gone".to_string(),
            }),
        };
        assert_eq!(
            error.to_string(),
            "destination failed (source also failed: a not found: gone)"
        );
        assert_eq!(error.side(), Some(Side::Destination));
        // the chain still leads to the authoritative destination error
        let source = std::error::Error::source(&error).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("session on b cancelled"));
    }
}
