//! Exec sessions and the stream relay used by `podcp`
//!
//! A copy between two pods runs two remote commands: one packing the source path into
//! an archive on its stdout, one unpacking an archive read from its stdin. Neither side
//! can be read or written passively, so both commands have to be driven at the same
//! time with live stream ends attached. This crate provides:
//!
//! - [`session`]: the [`ExecSession`] / [`SessionFactory`] abstraction
//! - [`conduit`]: the bounded byte channel joining the two sessions
//! - [`relay`]: the [`Relay`] driving both sessions and producing the [`Outcome`]
//! - [`kubectl`]: sessions carried by `kubectl exec`
//! - [`local`]: sessions running as local processes
//! - [`diagnostics`]: where remote stderr output ends up
//!
//! # Example
//!
//! ```rust,no_run
//! use remote::{Endpoint, Relay, RelaySettings, SessionSpec};
//!
//! # async fn example(config: common::ClusterConfig) -> anyhow::Result<()> {
//! let factory = remote::KubectlSessionFactory::new(config);
//! let archive = common::ArchiveCommands::default();
//! let stats = Relay::new(RelaySettings::default())
//!     .copy(
//!         &factory,
//!         SessionSpec {
//!             endpoint: Endpoint::new("default", "pod-a", None, "/data"),
//!             command: archive.pack("/data"),
//!         },
//!         SessionSpec {
//!             endpoint: Endpoint::new("default", "pod-b", None, "/restore"),
//!             command: archive.unpack("/restore"),
//!         },
//!         &tokio_util::sync::CancellationToken::new(),
//!     )
//!     .await?;
//! println!("relayed {} bytes", stats.bytes_relayed);
//! # Ok(())
//! # }
//! ```

pub mod conduit;
pub mod diagnostics;
pub mod endpoint;
pub mod error;
pub mod kubectl;
pub mod local;
mod process;
pub mod relay;
pub mod session;
#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

pub use diagnostics::Diagnostics;
pub use endpoint::Endpoint;
pub use error::{RelayError, SessionError, Side, StreamKind};
pub use kubectl::KubectlSessionFactory;
pub use local::LocalSessionFactory;
pub use relay::{Outcome, Relay, RelaySettings, RelayStats, SessionSpec};
pub use session::{AttachedStreams, ExecSession, SessionFactory, SessionIo};
