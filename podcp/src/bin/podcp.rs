use anyhow::{Context, anyhow};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use podcp::{CopyParams, Driver};
use remote::{KubectlSessionFactory, LocalSessionFactory, Relay, RelaySettings, SessionFactory};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "podcp",
    version,
    about = "Copy files from one Kubernetes pod to another without staging them locally",
    long_about = "`podcp` copies a file or directory out of a container in one pod into a directory of a container in another pod.

The source path is packed with `tar` inside the source container and unpacked inside the destination container. The archive is streamed through two `kubectl exec` sessions joined by a bounded in-memory buffer, so nothing is written to the local disk.

EXAMPLES:
    # Copy a single file into /restore of another pod
    podcp --src-pod pod-a --src-path /data/report.txt --dst-pod pod-b --dst-dir /restore

    # Copy a directory between named containers in the prod namespace
    podcp -n prod --src-pod api-0 --src-container app --src-path /var/lib/app \\
          --dst-pod api-1 --dst-container app --dst-dir /var/lib --summary

    # Use a specific kubeconfig and context
    podcp --kubeconfig ~/.kube/staging --context staging --src-pod a --src-path /etc/app --dst-pod b"
)]
struct Args {
    // Source & destination
    /// Namespace of both pods
    #[arg(
        short,
        long,
        default_value = "default",
        value_name = "NAMESPACE",
        help_heading = "Source & destination"
    )]
    namespace: String,

    /// Pod to copy from
    #[arg(long, value_name = "POD", help_heading = "Source & destination")]
    src_pod: Option<String>,

    /// Container of the source pod (default container if omitted)
    #[arg(long, value_name = "CONTAINER", help_heading = "Source & destination")]
    src_container: Option<String>,

    /// File or directory to copy, as seen inside the source container
    #[arg(long, value_name = "PATH", help_heading = "Source & destination")]
    src_path: Option<String>,

    /// Pod to copy to
    #[arg(long, value_name = "POD", help_heading = "Source & destination")]
    dst_pod: Option<String>,

    /// Container of the destination pod (default container if omitted)
    #[arg(long, value_name = "CONTAINER", help_heading = "Source & destination")]
    dst_container: Option<String>,

    /// Directory to extract into, inside the destination container
    ///
    /// The copied path keeps its full name below this directory, e.g. `/data/report.txt`
    /// copied into `/restore` ends up at `/restore/data/report.txt`.
    #[arg(
        long,
        default_value = "/",
        value_name = "DIR",
        help_heading = "Source & destination"
    )]
    dst_dir: String,

    // Cluster access
    /// Path to the kubeconfig file
    ///
    /// Defaults to $KUBECONFIG, then ~/.kube/config.
    #[arg(long, value_name = "PATH", help_heading = "Cluster access")]
    kubeconfig: Option<std::path::PathBuf>,

    /// Kubeconfig context to use
    #[arg(long, value_name = "NAME", help_heading = "Cluster access")]
    context: Option<String>,

    /// kubectl binary used to reach the cluster
    #[arg(long, value_name = "PATH", help_heading = "Cluster access")]
    kubectl: Option<std::path::PathBuf>,

    /// Timeout for a single request to the API server (e.g. "30s")
    #[arg(long, value_name = "DURATION", help_heading = "Cluster access")]
    request_timeout: Option<humantime::Duration>,

    /// Run both commands as local processes instead of inside pods
    ///
    /// Pod and container names are only used to label log output.
    #[arg(long, help_heading = "Cluster access")]
    local: bool,

    // Transfer
    /// Archiver program available in both containers
    #[arg(
        long,
        default_value = "tar",
        value_name = "PROGRAM",
        help_heading = "Transfer"
    )]
    tar_command: String,

    /// Maximum number of archive bytes buffered between the two pods
    #[arg(
        long,
        default_value = "256KiB",
        value_name = "SIZE",
        help_heading = "Transfer"
    )]
    buffer_size: bytesize::ByteSize,

    /// Give up and tear both sessions down after this long (e.g. "10m")
    #[arg(long, value_name = "DURATION", help_heading = "Transfer")]
    timeout: Option<humantime::Duration>,

    // Output
    /// Where stderr of the remote commands goes: passthrough, log or discard
    #[arg(
        long,
        default_value = "passthrough",
        value_name = "MODE",
        help_heading = "Output"
    )]
    diagnostics: remote::Diagnostics,

    /// Print summary at the end
    #[arg(long, help_heading = "Output")]
    summary: bool,

    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Output")]
    verbose: u8,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Output")]
    quiet: bool,

    // Advanced settings
    /// Number of worker threads (0 = number of CPU cores)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads (0 = Tokio default of 512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,
}

fn session_factory(args: &Args) -> Box<dyn SessionFactory> {
    if args.local {
        return Box::new(LocalSessionFactory);
    }
    let config = common::ClusterConfig::load(
        common::ClusterOptions {
            kubectl: args.kubectl.clone(),
            kubeconfig: args.kubeconfig.clone(),
            context: args.context.clone(),
            request_timeout: args.request_timeout.map(Into::into),
        },
        &common::ConfigEnv::from_process(),
    );
    tracing::debug!("cluster config: {:?}", config);
    Box::new(KubectlSessionFactory::new(config))
}

fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, tearing down both sessions");
                cancel.cancel();
            }
        }
    });
    cancel
}

#[instrument]
async fn async_main(args: Args) -> anyhow::Result<common::Summary> {
    let params = CopyParams {
        namespace: args.namespace.clone(),
        src_pod: args.src_pod.clone(),
        src_container: args.src_container.clone(),
        src_path: args.src_path.clone(),
        dst_pod: args.dst_pod.clone(),
        dst_container: args.dst_container.clone(),
        dst_dir: args.dst_dir.clone(),
    };
    let settings = RelaySettings {
        buffer_size: usize::try_from(args.buffer_size.as_u64())
            .with_context(|| format!("--buffer-size {} is too large", args.buffer_size))?,
        diagnostics: args.diagnostics,
    };
    let driver = Driver::new(
        Relay::new(settings),
        common::ArchiveCommands {
            program: args.tar_command.clone(),
        },
    );
    let factory = session_factory(&args);
    let cancel = cancel_on_interrupt();
    let copy = driver.run(params, factory.as_ref(), &cancel);
    let summary = match args.timeout {
        // dropping the copy on timeout kills both sessions
        Some(limit) => tokio::time::timeout(limit.into(), copy)
            .await
            .map_err(|_| anyhow!("copy timed out after {limit}"))??,
        None => copy.await?,
    };
    if !args.quiet {
        println!("Copy succeeded");
    }
    Ok(summary)
}

fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let res = common::run(output, runtime, func);
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
