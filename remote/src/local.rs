//! Exec sessions running as plain local processes
//!
//! Used for loopback copies on a single machine (`--local`) and in end-to-end tests.
//! The endpoint's namespace, pod and container are only used to label logs.

use tracing::instrument;

use crate::endpoint::Endpoint;
use crate::error::SessionError;
use crate::process::run_child;
use crate::session::{AttachedStreams, ExecSession, SessionFactory, SessionIo, display_command};

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSessionFactory;

#[async_trait::async_trait]
impl SessionFactory for LocalSessionFactory {
    #[instrument(skip(self))]
    async fn establish(
        &self,
        endpoint: &Endpoint,
        command: Vec<String>,
        streams: AttachedStreams,
    ) -> Result<Box<dyn ExecSession>, SessionError> {
        if command.is_empty() {
            return Err(SessionError::NotFound {
                target: endpoint.target(),
                reason: "empty command".to_string(),
            });
        }
        Ok(Box::new(LocalSession {
            endpoint: endpoint.clone(),
            command,
            streams,
        }))
    }
}

#[derive(Debug)]
pub struct LocalSession {
    endpoint: Endpoint,
    command: Vec<String>,
    streams: AttachedStreams,
}

#[async_trait::async_trait]
impl ExecSession for LocalSession {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn command(&self) -> &[String] {
        &self.command
    }

    fn streams(&self) -> AttachedStreams {
        self.streams
    }

    async fn run(self: Box<Self>, io: SessionIo) -> Result<(), SessionError> {
        let LocalSession {
            endpoint,
            command,
            streams,
        } = *self;
        let target = endpoint.target();
        let Some((program, args)) = command.split_first() else {
            return Err(SessionError::NotFound {
                target,
                reason: "empty command".to_string(),
            });
        };
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args);
        tracing::info!("running `{}` locally for {}", display_command(&command), target);
        run_child(cmd, &target, streams, io, |failure| SessionError::RemoteExit {
            target: target.clone(),
            command: display_command(&command),
            status: failure.status(),
            stderr: failure.stderr,
        })
        .await
    }
}
