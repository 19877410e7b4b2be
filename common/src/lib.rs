//! Shared plumbing for the podcp tools
//!
//! This crate carries everything that is not specific to moving bytes between pods:
//!
//! - [`config`]: immutable configuration structs (output, runtime, cluster access,
//!   archive commands) and the kubeconfig resolution step
//! - [`summary`]: end-of-operation statistics
//! - [`run`]: builds the tokio runtime, installs tracing and reports the result
//!
//! # Logging
//!
//! Logs are written to stderr so that stdout only carries the final result. The
//! level follows the `-v` counter (ERROR by default, then INFO / DEBUG / TRACE);
//! `RUST_LOG` takes precedence when set.

pub mod config;
pub mod summary;

pub use config::{
    ArchiveCommands, ClusterConfig, ClusterOptions, ConfigEnv, OutputConfig, RuntimeConfig,
};
pub use summary::Summary;

fn env_filter(output: &OutputConfig) -> tracing_subscriber::EnvFilter {
    match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::new(output.level().as_str()),
    }
}

fn setup_tracing(output: &OutputConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(output.verbose > 1);
    // ignore the error if a subscriber is already installed (tests, embedding)
    let _ = tracing_subscriber::registry()
        .with(env_filter(output))
        .with(fmt_layer)
        .try_init();
}

fn build_runtime(runtime: &RuntimeConfig) -> anyhow::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    Ok(builder.build()?)
}

/// Run `func` to completion on a freshly built runtime.
///
/// Returns `None` when the operation failed (the error has already been reported
/// unless `quiet` is set); callers map that to a non-zero exit status.
pub fn run<Fut>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Fut: std::future::Future<Output = anyhow::Result<Summary>>,
{
    setup_tracing(&output);
    let runtime = match build_runtime(&runtime) {
        Ok(runtime) => runtime,
        Err(error) => {
            if !output.quiet {
                eprintln!("failed to start runtime: {error:#}");
            }
            return None;
        }
    };
    let res = runtime.block_on(func());
    match res {
        Ok(summary) => {
            if output.print_summary || output.verbose > 0 {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            if !output.quiet {
                eprintln!("{error:#}");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_reports_success() {
        let summary = run(
            OutputConfig {
                quiet: true,
                ..Default::default()
            },
            RuntimeConfig {
                max_workers: 1,
                max_blocking_threads: 0,
            },
            || async {
                Ok(Summary {
                    bytes_relayed: 42,
                    ..Default::default()
                })
            },
        );
        assert_eq!(summary.map(|s| s.bytes_relayed), Some(42));
    }

    #[test]
    fn run_maps_error_to_none() {
        let summary = run(
            OutputConfig {
                quiet: true,
                ..Default::default()
            },
            RuntimeConfig::default(),
            || async { Err(anyhow::anyhow!("boom")) },
        );
        assert!(summary.is_none());
    }

    #[test]
    fn verbosity_levels() {
        let level = |verbose| OutputConfig {
            verbose,
            ..Default::default()
        }
        .level();
        assert_eq!(level(0), tracing::Level::ERROR);
        assert_eq!(level(1), tracing::Level::INFO);
        assert_eq!(level(2), tracing::Level::DEBUG);
        assert_eq!(level(7), tracing::Level::TRACE);
    }
}
