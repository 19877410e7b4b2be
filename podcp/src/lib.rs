//! Copy files between two Kubernetes pods - `podcp`
//!
//! `podcp` packs a path inside one container into a tar stream and unpacks it inside
//! another container, without staging the archive on the local machine. Two exec
//! sessions are opened (one per pod) and the source's stdout is relayed into the
//! destination's stdin through a bounded in-memory buffer.
//!
//! ```bash
//! # copy /data/report.txt from pod-a into /restore of pod-b
//! podcp --src-pod pod-a --src-path /data/report.txt --dst-pod pod-b --dst-dir /restore
//!
//! # pick containers and a namespace explicitly
//! podcp -n prod --src-pod api-0 --src-container app --src-path /var/log \
//!       --dst-pod debug --dst-dir /tmp
//! ```
//!
//! **Requirements:** `kubectl` configured for the target cluster, and `tar` available in
//! both containers (see `--tar-command`).
//!
//! The library half exposes the pieces the binary is assembled from:
//!
//! - [`params`]: raw parameters and their validation
//! - [`driver`]: turns validated parameters into a relay run

pub mod driver;
pub mod params;

pub use driver::{CopyError, Driver};
pub use params::{ConfigError, CopyParams, CopyRequest};
