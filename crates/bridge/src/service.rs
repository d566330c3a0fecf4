//! Tool service management (launch, readiness, invocation, shutdown).

use std::collections::HashMap;
use std::fmt;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::outcome::ToolOutcome;

/// Default time a freshly launched service has to pass its health probe.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a single HTTP request to the service.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay between two health probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default time a child gets to exit after its stdin is closed.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How to start the tool service process.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl ProcessConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Where the tool service comes from.
#[derive(Debug, Clone)]
pub enum Launch {
    /// Spawn and own a child process.
    Spawn(ProcessConfig),
    /// Use a service somebody else runs; only probe its health.
    Attach,
}

/// Configuration for a [`Bridge`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL of the service, e.g. `http://127.0.0.1:3001`.
    pub base_url: String,
    pub launch: Launch,
    pub startup_timeout: Duration,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub shutdown_grace: Duration,
}

impl ServiceConfig {
    /// Spawn `process` and talk to it at `base_url`.
    pub fn spawn(base_url: impl Into<String>, process: ProcessConfig) -> Self {
        Self::with_launch(base_url, Launch::Spawn(process))
    }

    /// Talk to an already running service at `base_url`.
    pub fn attach(base_url: impl Into<String>) -> Self {
        Self::with_launch(base_url, Launch::Attach)
    }

    fn with_launch(base_url: impl Into<String>, launch: Launch) -> Self {
        Self {
            base_url: base_url.into(),
            launch,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

/// Lifecycle state of the tool service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NotStarted,
    Starting,
    Ready,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not started",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A child process that passed its readiness check.
struct Running {
    stdin: Option<ChildStdin>,
    stop: oneshot::Sender<()>,
    monitor: JoinHandle<()>,
}

#[derive(Default)]
struct Lifecycle {
    failure: Option<Error>,
    running: Option<Running>,
}

struct Shared {
    config: ServiceConfig,
    http: reqwest::Client,
    // Held for the whole duration of a startup attempt.
    lifecycle: Mutex<Lifecycle>,
    status: watch::Sender<Status>,
    attempts: AtomicU64,
    settled: AtomicU64,
    spawned: AtomicUsize,
}

impl Shared {
    fn status(&self) -> Status {
        *self.status.borrow()
    }

    async fn process_exited(&self, attempt: u64) {
        let mut lifecycle = self.lifecycle.lock().await;
        if self.attempts.load(Ordering::SeqCst) == attempt && self.status() == Status::Ready {
            lifecycle.running = None;
            self.status.send_replace(Status::NotStarted);
        }
    }
}

/// Handle to the tool execution service.
///
/// Cloning is cheap and every clone refers to the same service; at most one
/// child process is alive per handle family.
#[derive(Clone)]
pub struct Bridge {
    shared: Arc<Shared>,
}

impl Bridge {
    /// Create a bridge. Nothing is launched until [`Bridge::ensure_ready`].
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        let (status, _) = watch::channel(Status::NotStarted);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                http,
                lifecycle: Mutex::new(Lifecycle::default()),
                status,
                attempts: AtomicU64::new(0),
                settled: AtomicU64::new(0),
                spawned: AtomicUsize::new(0),
            }),
        })
    }

    /// Current lifecycle state.
    pub fn status(&self) -> Status {
        self.shared.status()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.shared.status.subscribe()
    }

    /// Number of processes spawned so far.
    pub fn spawn_count(&self) -> usize {
        self.shared.spawned.load(Ordering::SeqCst)
    }

    pub fn base_url(&self) -> &str {
        &self.shared.config.base_url
    }

    /// Make sure the service accepts requests, launching it if needed.
    ///
    /// Callers arriving while a launch is in flight wait for that launch and
    /// share its result instead of starting another process. A failed launch
    /// is retried only by calls made after it settled.
    pub async fn ensure_ready(&self) -> Result<()> {
        if self.status() == Status::Ready {
            return Ok(());
        }

        let seen = self.shared.settled.load(Ordering::SeqCst);
        let mut lifecycle = self.shared.lifecycle.lock().await;

        match self.status() {
            Status::Ready => return Ok(()),
            Status::Failed if self.shared.settled.load(Ordering::SeqCst) != seen => {
                return Err(lifecycle.failure.clone().unwrap_or(Error::NotReady));
            }
            _ => {}
        }

        let attempt = self.shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.status.send_replace(Status::Starting);
        info!(attempt, base_url = %self.base_url(), "starting tool service");

        let result = self.start(attempt).await;
        self.shared.settled.fetch_add(1, Ordering::SeqCst);

        match result {
            Ok(running) => {
                lifecycle.failure = None;
                lifecycle.running = running;
                self.shared.status.send_replace(Status::Ready);
                info!(attempt, "tool service ready");
                Ok(())
            }
            Err(e) => {
                warn!(attempt, error = %e, "tool service failed to start");
                lifecycle.failure = Some(e.clone());
                self.shared.status.send_replace(Status::Failed);
                Err(e)
            }
        }
    }

    /// Invoke a tool. Never fails: errors become `{"error": ...}` outcomes.
    pub async fn invoke(&self, name: &str, args: Value) -> ToolOutcome {
        let started = Instant::now();
        match self.try_invoke(name, args).await {
            Ok(payload) => {
                debug!(tool = name, elapsed = ?started.elapsed(), "tool call finished");
                ToolOutcome::new(payload)
            }
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                ToolOutcome::error(e.to_string())
            }
        }
    }

    /// Invoke a tool, surfacing failures as [`Error`].
    pub async fn try_invoke(&self, name: &str, args: Value) -> Result<Value> {
        if self.status() != Status::Ready {
            return Err(Error::NotReady);
        }

        let url = self.shared.config.endpoint(&format!("tools/{name}"));
        let response = self
            .shared
            .http
            .post(&url)
            .json(&args)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))
    }

    /// Stop the service if this bridge spawned it.
    ///
    /// Closes the child's stdin, waits for the shutdown grace period and
    /// kills the process if it is still alive.
    pub async fn shutdown(&self) {
        let running = self.shared.lifecycle.lock().await.running.take();
        self.shared.status.send_replace(Status::NotStarted);

        if let Some(Running {
            stdin,
            stop,
            monitor,
        }) = running
        {
            drop(stdin);
            let _ = stop.send(());
            if let Err(e) = monitor.await {
                warn!(error = %e, "tool service monitor task failed");
            }
        }
    }

    // --- Internal methods ---

    async fn start(&self, attempt: u64) -> Result<Option<Running>> {
        match &self.shared.config.launch {
            Launch::Attach => {
                self.await_ready(None).await?;
                Ok(None)
            }
            Launch::Spawn(process) => {
                let (mut child, stdin) = self.spawn_child(process)?;
                match self.await_ready(Some(&mut child)).await {
                    Ok(()) => Ok(Some(self.monitor(child, stdin, attempt))),
                    Err(e) => {
                        // A child that missed its deadline is not left running.
                        if let Err(kill) = child.kill().await {
                            debug!(error = %kill, "failed to kill tool service");
                        }
                        Err(e)
                    }
                }
            }
        }
    }

    /// Spawn the service and detach its stdin.
    ///
    /// `Child::wait` closes a stdin it still owns, which a service watching
    /// for EOF reads as a shutdown request.
    fn spawn_child(&self, process: &ProcessConfig) -> Result<(Child, Option<ChildStdin>)> {
        let mut cmd = Command::new(&process.command);
        cmd.args(&process.args)
            .envs(&process.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {e}", process.command)))?;
        self.shared.spawned.fetch_add(1, Ordering::SeqCst);
        info!(pid = ?child.id(), command = %process.command, "spawned tool service");

        let stdin = child.stdin.take();
        Ok((child, stdin))
    }

    /// Wait until the health probe passes, the child exits, or time runs out.
    async fn await_ready(&self, child: Option<&mut Child>) -> Result<()> {
        let limit = self.shared.config.startup_timeout;

        let exited = async move {
            match child {
                Some(child) => match child.wait().await {
                    Ok(status) => Error::ExitedEarly(status.to_string()),
                    Err(e) => Error::ExitedEarly(e.to_string()),
                },
                None => std::future::pending::<Error>().await,
            }
        };

        let ready = async move {
            tokio::select! {
                () = self.probe_health() => Ok(()),
                err = exited => Err(err),
            }
        };

        timeout(limit, ready)
            .await
            .map_err(|_| Error::StartupTimeout(limit))?
    }

    async fn probe_health(&self) {
        let url = self.shared.config.endpoint("health");
        loop {
            match self.shared.http.get(&url).send().await {
                Ok(response) if response.status().is_success() => return,
                Ok(response) => debug!(status = %response.status(), "tool service not healthy yet"),
                Err(e) => debug!(error = %e, "health probe failed"),
            }
            sleep(self.shared.config.poll_interval).await;
        }
    }

    fn monitor(&self, child: Child, stdin: Option<ChildStdin>, attempt: u64) -> Running {
        let (stop, stopped) = oneshot::channel();
        let shared = Arc::downgrade(&self.shared);
        let grace = self.shared.config.shutdown_grace;
        let monitor = tokio::spawn(watch_process(child, stopped, shared, attempt, grace));

        Running {
            stdin,
            stop,
            monitor,
        }
    }
}

async fn watch_process(
    mut child: Child,
    stop: oneshot::Receiver<()>,
    shared: Weak<Shared>,
    attempt: u64,
    grace: Duration,
) {
    tokio::select! {
        exit = child.wait() => {
            match &exit {
                Ok(status) if status.success() => info!(%status, "tool service exited"),
                Ok(status) => warn!(%status, "tool service exited unexpectedly"),
                Err(e) => warn!(error = %e, "failed to wait on tool service"),
            }
            if let Some(shared) = shared.upgrade() {
                shared.process_exited(attempt).await;
            }
        }
        _ = stop => {
            match timeout(grace, child.wait()).await {
                Ok(Ok(status)) => info!(%status, "tool service stopped"),
                _ => {
                    warn!("tool service did not stop in time, killing it");
                    if let Err(e) = child.kill().await {
                        debug!(error = %e, "failed to kill tool service");
                    }
                }
            }
        }
    }
}
