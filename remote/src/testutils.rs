//! In-memory exec sessions and a recording factory for tests

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::endpoint::Endpoint;
use crate::error::{SessionError, StreamKind};
use crate::session::{AttachedStreams, ExecSession, SessionFactory, SessionIo};

/// Bytes collected by a [`MemoryDestination`]
pub type Received = Arc<Mutex<Vec<u8>>>;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn remote_exit(endpoint: &Endpoint, command: &[String], stderr: &str) -> SessionError {
    SessionError::RemoteExit {
        target: endpoint.target(),
        command: command.join(" "),
        status: "exit code 2".to_string(),
        stderr: stderr.to_string(),
    }
}

/// Source writing a fixed payload to its stdout
#[derive(Debug)]
pub struct MemorySource {
    endpoint: Endpoint,
    command: Vec<String>,
    payload: Vec<u8>,
    chunk_size: usize,
    fail_after: Option<usize>,
}

impl MemorySource {
    pub fn new(endpoint: Endpoint, payload: Vec<u8>) -> Self {
        Self {
            endpoint,
            command: vec!["pack".to_string()],
            payload,
            chunk_size: 8192,
            fail_after: None,
        }
    }

    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Write only the first `n` bytes, then exit unsuccessfully
    #[must_use]
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }
}

#[async_trait::async_trait]
impl ExecSession for MemorySource {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn command(&self) -> &[String] {
        &self.command
    }

    fn streams(&self) -> AttachedStreams {
        AttachedStreams::SOURCE
    }

    async fn run(self: Box<Self>, io: SessionIo) -> Result<(), SessionError> {
        let target = self.endpoint.target();
        let Some(mut stdout) = io.stdout else {
            return Ok(());
        };
        let limit = self
            .fail_after
            .unwrap_or(self.payload.len())
            .min(self.payload.len());
        for chunk in self.payload[..limit].chunks(self.chunk_size) {
            stdout
                .write_all(chunk)
                .await
                .map_err(|source| SessionError::Stream {
                    target: target.clone(),
                    stream: StreamKind::Stdout,
                    source,
                })?;
        }
        stdout
            .shutdown()
            .await
            .map_err(|source| SessionError::Stream {
                target: target.clone(),
                stream: StreamKind::Stdout,
                source,
            })?;
        match self.fail_after {
            Some(_) => Err(remote_exit(&self.endpoint, &self.command, "pack: read error")),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationBehavior {
    /// Read stdin to the end and succeed
    Accept,
    /// Fail without touching stdin
    RefuseToStart,
    /// Fail after reading this many bytes, or at end of stream if it comes first
    FailAfter(usize),
    /// Never read and never return
    Stall,
}

/// Destination collecting whatever arrives on its stdin
#[derive(Debug)]
pub struct MemoryDestination {
    endpoint: Endpoint,
    command: Vec<String>,
    behavior: DestinationBehavior,
    received: Received,
}

impl MemoryDestination {
    pub fn new(endpoint: Endpoint, behavior: DestinationBehavior) -> (Self, Received) {
        let received = Received::default();
        (
            Self::with_sink(endpoint, behavior, received.clone()),
            received,
        )
    }

    pub fn with_sink(
        endpoint: Endpoint,
        behavior: DestinationBehavior,
        received: Received,
    ) -> Self {
        Self {
            endpoint,
            command: vec!["unpack".to_string()],
            behavior,
            received,
        }
    }
}

#[async_trait::async_trait]
impl ExecSession for MemoryDestination {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn command(&self) -> &[String] {
        &self.command
    }

    fn streams(&self) -> AttachedStreams {
        AttachedStreams::DESTINATION
    }

    async fn run(self: Box<Self>, io: SessionIo) -> Result<(), SessionError> {
        let limit = match self.behavior {
            DestinationBehavior::RefuseToStart => {
                return Err(remote_exit(&self.endpoint, &self.command, "unpack: refused"));
            }
            DestinationBehavior::Stall => std::future::pending().await,
            DestinationBehavior::Accept => None,
            DestinationBehavior::FailAfter(n) => Some(n),
        };
        let Some(mut stdin) = io.stdin else {
            return Ok(());
        };
        let mut buf = vec![0u8; 4096];
        let mut total = 0usize;
        loop {
            if limit.is_some_and(|limit| total >= limit) {
                break;
            }
            let n = stdin
                .read(&mut buf)
                .await
                .map_err(|source| SessionError::Stream {
                    target: self.endpoint.target(),
                    stream: StreamKind::Stdin,
                    source,
                })?;
            if n == 0 {
                break;
            }
            lock(&self.received).extend_from_slice(&buf[..n]);
            total += n;
        }
        match limit {
            Some(_) => Err(remote_exit(
                &self.endpoint,
                &self.command,
                "unpack: unexpected end of archive",
            )),
            None => Ok(()),
        }
    }
}

/// Record of one successful `establish` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Established {
    pub endpoint: Endpoint,
    pub command: Vec<String>,
    pub streams: AttachedStreams,
}

/// Factory handing out in-memory sessions and recording every call.
///
/// Sessions with stdin attached become accepting [`MemoryDestination`]s sharing one
/// buffer, all others become [`MemorySource`]s producing `payload`.
#[derive(Debug, Clone, Default)]
pub struct RecordingFactory {
    payload: Vec<u8>,
    fail_pods: Vec<String>,
    established: Arc<Mutex<Vec<Established>>>,
    runs: Arc<Mutex<Vec<Vec<String>>>>,
    received: Received,
}

impl RecordingFactory {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            ..Default::default()
        }
    }

    /// Make establishment on `pod` fail with [`SessionError::NotFound`]
    #[must_use]
    pub fn fail_establish_for(mut self, pod: &str) -> Self {
        self.fail_pods.push(pod.to_string());
        self
    }

    pub fn established(&self) -> Vec<Established> {
        lock(&self.established).clone()
    }

    /// Commands of the sessions that were run, in start order
    pub fn runs(&self) -> Vec<Vec<String>> {
        lock(&self.runs).clone()
    }

    pub fn received(&self) -> Vec<u8> {
        lock(&self.received).clone()
    }
}

#[async_trait::async_trait]
impl SessionFactory for RecordingFactory {
    async fn establish(
        &self,
        endpoint: &Endpoint,
        command: Vec<String>,
        streams: AttachedStreams,
    ) -> Result<Box<dyn ExecSession>, SessionError> {
        if self.fail_pods.contains(&endpoint.pod) {
            return Err(SessionError::NotFound {
                target: endpoint.target(),
                reason: format!("pods \"{}\" not found", endpoint.pod),
            });
        }
        lock(&self.established).push(Established {
            endpoint: endpoint.clone(),
            command: command.clone(),
            streams,
        });
        let inner: Box<dyn ExecSession> = if streams.stdin {
            Box::new(MemoryDestination::with_sink(
                endpoint.clone(),
                DestinationBehavior::Accept,
                self.received.clone(),
            ))
        } else {
            Box::new(MemorySource::new(endpoint.clone(), self.payload.clone()))
        };
        Ok(Box::new(RecordedSession {
            inner,
            command,
            runs: self.runs.clone(),
        }))
    }
}

#[derive(Debug)]
struct RecordedSession {
    inner: Box<dyn ExecSession>,
    command: Vec<String>,
    runs: Arc<Mutex<Vec<Vec<String>>>>,
}

#[async_trait::async_trait]
impl ExecSession for RecordedSession {
    fn endpoint(&self) -> &Endpoint {
        self.inner.endpoint()
    }

    fn command(&self) -> &[String] {
        &self.command
    }

    fn streams(&self) -> AttachedStreams {
        self.inner.streams()
    }

    async fn run(self: Box<Self>, io: SessionIo) -> Result<(), SessionError> {
        lock(&self.runs).push(self.command.clone());
        self.inner.run(io).await
    }
}
