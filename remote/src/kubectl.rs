//! Exec sessions carried by `kubectl exec`
//!
//! The factory checks that the pod (and container, when one was requested) exists
//! before handing out a session; the session itself runs
//! `kubectl exec [-i] -n NS POD [-c CONTAINER] -- COMMAND...` as a child process.

use std::sync::Arc;

use anyhow::Context;
use tracing::instrument;

use crate::endpoint::Endpoint;
use crate::error::SessionError;
use crate::process::{ExitFailure, run_child};
use crate::session::{AttachedStreams, ExecSession, SessionFactory, SessionIo, display_command};

/// kubectl messages meaning the API server could not be reached or refused us
const CONNECTION_MARKERS: &[&str] = &[
    "Unable to connect to the server",
    "(Unauthorized)",
    "(Forbidden)",
    "You must be logged in to the server",
    "no configuration has been provided",
    "The connection to the server",
    "connection refused",
];

/// kubectl messages meaning the exec stream broke mid-flight
const LOST_MARKERS: &[&str] = &[
    "error dialing backend",
    "unable to upgrade connection",
    "connection reset by peer",
    "lost connection to pod",
    "error sending request",
    "broken pipe",
];

/// Line kubectl prints after relaying the remote command's own failure
const REMOTE_EXIT_LINE: &str = "command terminated with exit code";

/// Line prefixes kubectl uses for its own errors
const KUBECTL_PREFIXES: &[&str] = &[
    "error:",
    "Error from server",
    "Unable to connect to the server",
    "The connection to the server",
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// klog header, e.g. `E1019 10:00:00.000000   4242 v2.go:104] ...`
fn is_klog_line(line: &str) -> bool {
    let mut chars = line.chars();
    matches!(chars.next(), Some('E' | 'W' | 'I' | 'F'))
        && line.get(1..5).is_some_and(|date| date.bytes().all(|b| b.is_ascii_digit()))
        && line.get(5..6) == Some(" ")
}

/// Lines of `stderr` written by kubectl itself rather than by the remote command.
///
/// Empty when the remote command ran and exited on its own.
fn kubectl_lines(stderr: &str) -> String {
    if stderr
        .lines()
        .any(|line| line.trim_start().starts_with(REMOTE_EXIT_LINE))
    {
        return String::new();
    }
    stderr
        .lines()
        .map(str::trim_start)
        .filter(|line| {
            KUBECTL_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) || is_klog_line(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Map a failed `kubectl get` to the establishment error it stands for
fn classify_lookup(target: &str, stderr: &str) -> SessionError {
    let reason = stderr.trim().to_string();
    if stderr.contains("(NotFound)") || stderr.contains("not found") {
        SessionError::NotFound {
            target: target.to_string(),
            reason,
        }
    } else {
        SessionError::Connection {
            target: target.to_string(),
            reason,
        }
    }
}

/// Map a failed `kubectl exec` to a session error
fn classify_exec(target: &str, command: &[String], failure: ExitFailure) -> SessionError {
    let reason = || failure.stderr.trim().to_string();
    let own = kubectl_lines(&failure.stderr);
    if own.contains("(NotFound)") {
        SessionError::NotFound {
            target: target.to_string(),
            reason: reason(),
        }
    } else if contains_any(&own, CONNECTION_MARKERS) {
        SessionError::Connection {
            target: target.to_string(),
            reason: reason(),
        }
    } else if contains_any(&own, LOST_MARKERS) {
        SessionError::ConnectionLost {
            target: target.to_string(),
            reason: reason(),
        }
    } else {
        SessionError::RemoteExit {
            target: target.to_string(),
            command: display_command(command),
            status: failure.status(),
            stderr: failure.stderr,
        }
    }
}

/// Argument vector for `kubectl exec`, without the global flags
fn exec_args(endpoint: &Endpoint, command: &[String], streams: AttachedStreams) -> Vec<String> {
    let mut args = vec!["exec".to_string()];
    if streams.stdin {
        args.push("-i".to_string());
    }
    args.push("-n".to_string());
    args.push(endpoint.namespace.clone());
    args.push(endpoint.pod.clone());
    if let Some(container) = endpoint.container() {
        args.push("-c".to_string());
        args.push(container.to_string());
    }
    args.push("--".to_string());
    args.extend(command.iter().cloned());
    args
}

#[derive(Debug, Clone)]
pub struct KubectlSessionFactory {
    config: Arc<common::ClusterConfig>,
}

impl KubectlSessionFactory {
    #[must_use]
    pub fn new(config: common::ClusterConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    fn kubectl(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.config.kubectl);
        cmd.args(self.config.kubectl_args()).kill_on_drop(true);
        cmd
    }

    /// Names of the containers declared by the pod
    async fn containers(&self, endpoint: &Endpoint) -> Result<Vec<String>, SessionError> {
        let target = endpoint.target();
        let output = self
            .kubectl()
            .args(["get", "pod", "-n", endpoint.namespace.as_str(), endpoint.pod.as_str()])
            .args(["-o", "jsonpath={.spec.containers[*].name}"])
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .with_context(|| format!("failed to run {:?}", self.config.kubectl))
            .map_err(|error| SessionError::Connection {
                target: target.clone(),
                reason: format!("{error:#}"),
            })?;
        if !output.status.success() {
            return Err(classify_lookup(
                &target,
                &String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .map(String::from)
            .collect())
    }
}

#[async_trait::async_trait]
impl SessionFactory for KubectlSessionFactory {
    #[instrument(skip(self))]
    async fn establish(
        &self,
        endpoint: &Endpoint,
        command: Vec<String>,
        streams: AttachedStreams,
    ) -> Result<Box<dyn ExecSession>, SessionError> {
        let containers = self.containers(endpoint).await?;
        tracing::debug!("pod {} declares containers {:?}", endpoint.pod, containers);
        if let Some(container) = endpoint.container()
            && !containers.iter().any(|c| c == container)
        {
            return Err(SessionError::NotFound {
                target: endpoint.target(),
                reason: format!(
                    "pod {} has no container {} (available: {})",
                    endpoint.pod,
                    container,
                    containers.join(", ")
                ),
            });
        }
        Ok(Box::new(KubectlSession {
            factory: self.clone(),
            endpoint: endpoint.clone(),
            command,
            streams,
        }))
    }
}

#[derive(Debug)]
pub struct KubectlSession {
    factory: KubectlSessionFactory,
    endpoint: Endpoint,
    command: Vec<String>,
    streams: AttachedStreams,
}

#[async_trait::async_trait]
impl ExecSession for KubectlSession {
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
        let KubectlSession {
            factory,
            endpoint,
            command,
            streams,
        } = *self;
        let target = endpoint.target();
        let mut cmd = factory.kubectl();
        cmd.args(exec_args(&endpoint, &command, streams));
        tracing::info!("running `{}` on {}", display_command(&command), target);
        run_child(cmd, &target, streams, io, |failure| {
            classify_exec(&target, &command, failure)
        })
        .await
    }
}
