//! Runs one pod-to-pod copy: validate, build the archive commands, relay

use remote::{Relay, RelayError, SessionFactory, SessionSpec};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::params::{ConfigError, CopyParams, CopyRequest};

#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

#[derive(Debug, Clone, Default)]
pub struct Driver {
    relay: Relay,
    archive: common::ArchiveCommands,
}

impl Driver {
    #[must_use]
    pub fn new(relay: Relay, archive: common::ArchiveCommands) -> Self {
        Self { relay, archive }
    }

    /// Pack command for the source side, unpack command for the destination side
    #[must_use]
    pub fn sessions(&self, request: CopyRequest) -> (SessionSpec, SessionSpec) {
        let source_command = self.archive.pack(&request.source.path);
        let destination_command = self.archive.unpack(&request.destination.path);
        (
            SessionSpec {
                endpoint: request.source,
                command: source_command,
            },
            SessionSpec {
                endpoint: request.destination,
                command: destination_command,
            },
        )
    }

    /// Copy `src-path` out of the source pod into `dst-dir` of the destination pod.
    ///
    /// Parameters are validated before `factory` is touched.
    #[instrument(skip(self, factory, cancel))]
    pub async fn run(
        &self,
        params: CopyParams,
        factory: &dyn SessionFactory,
        cancel: &CancellationToken,
    ) -> Result<common::Summary, CopyError> {
        if self.relay.settings().buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize.into());
        }
        let request = params.validate()?;
        tracing::info!("copying {} to {}", request.source, request.destination);
        let (source, destination) = self.sessions(request);
        let stats = self
            .relay
            .copy(factory, source, destination, cancel)
            .await?;
        tracing::info!(
            "relayed {} bytes in {:?}",
            stats.bytes_relayed,
            stats.elapsed
        );
        Ok(common::Summary {
            bytes_relayed: stats.bytes_relayed,
            elapsed: stats.elapsed,
        })
    }
}
