//! The stream relay
//!
//! Drives a producing (source) and a consuming (destination) exec session at the same
//! time and joins them with a bounded [`conduit`](crate::conduit):
//!
//! ```text
//!   spawned task                       calling task
//!   source.run  --stdout--> [ conduit ] --stdin--> destination.run
//!        \--stderr--> diagnostics <--stdout/stderr--/
//! ```
//!
//! The source task owns the conduit writer. Whatever way that task ends (success,
//! failure, cancellation or panic) the writer is dropped with it, which is the only
//! "no more data" signal the destination receives. Likewise the destination owns the
//! reader; once it is gone any write still pending on the source side fails instead of
//! waiting forever.
//!
//! Cancelling the token ends both runs with [`SessionError::Cancelled`]. Dropping the
//! relay future has the same effect: the source task is aborted with it and both
//! sessions are torn down.
//!
//! Outcome policy once both sides have finished:
//!
//! | source | destination | outcome |
//! |---|---|---|
//! | ok | ok | success |
//! | any | failed | destination failure (source error kept as `upstream`) |
//! | failed | ok | source failure |

use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::instrument;

use crate::conduit::conduit;
use crate::diagnostics::Diagnostics;
use crate::endpoint::Endpoint;
use crate::error::{RelayError, SessionError, Side, StreamKind};
use crate::session::{AttachedStreams, ExecSession, SessionFactory, SessionIo};

/// Default number of archive bytes allowed in flight between the two sessions
pub const DEFAULT_BUFFER_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    /// Conduit capacity in bytes
    pub buffer_size: usize,
    pub diagnostics: Diagnostics,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            diagnostics: Diagnostics::default(),
        }
    }
}

/// What a successful relay moved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub bytes_relayed: u64,
    pub elapsed: std::time::Duration,
}

/// Single result of one copy operation
pub type Outcome = Result<RelayStats, RelayError>;

/// A command to run on an endpoint
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub endpoint: Endpoint,
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Relay {
    settings: RelaySettings,
}

impl Relay {
    #[must_use]
    pub fn new(settings: RelaySettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Establish both sessions through `factory` and relay between them.
    ///
    /// Establishment failures are returned before anything is started; the destination
    /// is not even established when the source could not be.
    #[instrument(
        skip(self, factory, cancel),
        fields(source = %source.endpoint, destination = %destination.endpoint)
    )]
    pub async fn copy(
        &self,
        factory: &dyn SessionFactory,
        source: SessionSpec,
        destination: SessionSpec,
        cancel: &CancellationToken,
    ) -> Outcome {
        let SessionSpec {
            endpoint: source_endpoint,
            command: source_command,
        } = source;
        let SessionSpec {
            endpoint: destination_endpoint,
            command: destination_command,
        } = destination;
        let establish = async {
            let source_session = factory
                .establish(&source_endpoint, source_command, AttachedStreams::SOURCE)
                .await
                .map_err(|error| RelayError::Establish {
                    side: Side::Source,
                    source: error,
                })?;
            let destination_session = factory
                .establish(
                    &destination_endpoint,
                    destination_command,
                    AttachedStreams::DESTINATION,
                )
                .await
                .map_err(|error| RelayError::Establish {
                    side: Side::Destination,
                    source: error,
                })?;
            Ok::<_, RelayError>((source_session, destination_session))
        };
        let (source_session, destination_session) = tokio::select! {
            sessions = establish => sessions?,
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
        };
        tracing::debug!("both sessions established");
        self.run(source_session, destination_session, cancel).await
    }

    /// Run two established sessions against each other.
    ///
    /// The source runs on a spawned task, the destination on the calling one.
    #[instrument(
        skip_all,
        fields(source = %source.endpoint(), destination = %destination.endpoint())
    )]
    pub async fn run(
        &self,
        source: Box<dyn ExecSession>,
        destination: Box<dyn ExecSession>,
        cancel: &CancellationToken,
    ) -> Outcome {
        let start = std::time::Instant::now();
        let diagnostics = self.settings.diagnostics;
        let (writer, reader) = conduit(self.settings.buffer_size);
        let counter = writer.counter();
        let source_target = source.endpoint().target();
        let source_io = SessionIo {
            stdin: None,
            stdout: Some(Box::new(writer)),
            stderr: diagnostics.writer(Side::Source, StreamKind::Stderr),
        };
        let source_task = {
            let cancel = cancel.clone();
            let target = source_target.clone();
            AbortOnDropHandle::new(tokio::spawn(async move {
                // the conduit writer lives inside this future and is dropped with it
                let res = tokio::select! {
                    res = source.run(source_io) => res,
                    _ = cancel.cancelled() => Err(SessionError::Cancelled { target }),
                };
                match &res {
                    Ok(()) => tracing::debug!("source session finished"),
                    Err(error) => tracing::debug!("source session failed: {:#}", error),
                }
                res
            }))
        };
        let destination_target = destination.endpoint().target();
        let destination_io = SessionIo {
            stdin: Some(Box::new(reader)),
            stdout: Some(diagnostics.writer(Side::Destination, StreamKind::Stdout)),
            stderr: diagnostics.writer(Side::Destination, StreamKind::Stderr),
        };
        let destination_res = tokio::select! {
            res = destination.run(destination_io) => res,
            _ = cancel.cancelled() => Err(SessionError::Cancelled { target: destination_target }),
        };
        match &destination_res {
            Ok(()) => tracing::debug!("destination session finished"),
            Err(error) => tracing::debug!("destination session failed: {:#}", error),
        }
        // the reader is gone by now, so the source cannot stay blocked on a full conduit
        let source_res = match source_task.await {
            Ok(res) => res,
            Err(join_error) => Err(SessionError::Aborted {
                target: source_target,
                reason: join_error.to_string(),
            }),
        };
        let outcome = resolve(source_res, destination_res, cancel.is_cancelled()).map(|()| {
            RelayStats {
                bytes_relayed: counter.get(),
                elapsed: start.elapsed(),
            }
        });
        match &outcome {
            Ok(stats) => tracing::info!(
                "relayed {} bytes in {:?}",
                stats.bytes_relayed,
                stats.elapsed
            ),
            Err(error) => tracing::debug!("relay failed: {:#}", error),
        }
        outcome
    }
}

/// Combine the results of both sides into the operation outcome
fn resolve(
    source: Result<(), SessionError>,
    destination: Result<(), SessionError>,
    cancelled: bool,
) -> Result<(), RelayError> {
    let any_cancelled = matches!(&source, Err(e) if e.is_cancelled())
        || matches!(&destination, Err(e) if e.is_cancelled());
    if cancelled && any_cancelled {
        return Err(RelayError::Cancelled);
    }
    match (source, destination) {
        (Ok(()), Ok(())) => Ok(()),
        (source, Err(error)) => Err(RelayError::Destination {
            source: error,
            upstream: source.err(),
        }),
        (Err(error), Ok(())) => Err(RelayError::Source(error)),
    }
}
