use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{StreamExt, StreamMap};
use tokio_util::sync::CancellationToken;
use tracing::Level;

use crate::config::DaemonConfig;
use crate::error::{FlowdError, Result};
use crate::server::{control_channel, ControlEvent, WorkerEvent, WorkerProxy};
use crate::shutdown;
use crate::tasks::TaskRegistry;

const CONTROL_CHANNEL_CAPACITY: usize = 64;
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A tracked worker: its id, the close-signal sender, and the join handle
/// used to reap it. Exactly one entry exists per live worker.
struct WorkerHandle {
    id: usize,
    control: tokio::sync::mpsc::Sender<ControlEvent>,
    join: JoinHandle<Result<()>>,
}

/// Removes the pid marker on every orderly exit path.
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    fn create(path: &Path) -> Result<Self> {
        std::fs::write(path, std::process::id().to_string())?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        std::fs::remove_file(&self.path).ok();
    }
}

/// The supervisor: spawns the worker pool, forwards worker log events into
/// the tracing sink, and orchestrates graceful shutdown.
pub struct Manager {
    config: DaemonConfig,
    registry: Arc<TaskRegistry>,
    stop: CancellationToken,
}

impl Manager {
    pub fn new(config: DaemonConfig, registry: Arc<TaskRegistry>) -> Self {
        Self {
            config,
            registry,
            stop: CancellationToken::new(),
        }
    }

    /// Token cancelled when the manager is asked to stop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Ask the manager to stop. Idempotent.
    pub fn shutdown(&self) {
        self.stop.cancel();
    }

    /// Read the pid marker. Works without a running instance; absence means
    /// "no instance".
    pub fn get_pid(pid_file: &Path) -> Result<u32> {
        let content = match std::fs::read_to_string(pid_file) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(FlowdError::NotRunning)
            }
            Err(err) => return Err(err.into()),
        };
        content
            .trim()
            .parse()
            .map_err(|_| FlowdError::Internal(format!("invalid pid marker: {}", pid_file.display())))
    }

    /// Run the daemon until stopped by a signal or [`Manager::shutdown`].
    ///
    /// Fails fast with `AlreadyRunning` when the pid marker exists. The
    /// marker written here is removed on every orderly exit path.
    pub async fn run(&self) -> Result<()> {
        if let Ok(pid) = Self::get_pid(&self.config.pid_file) {
            return Err(FlowdError::AlreadyRunning(pid));
        }
        let _pid_file = PidFile::create(&self.config.pid_file)?;

        shutdown::install_signal_handlers(self.stop.clone())?;

        let config = Arc::new(self.config.clone());
        let mut workers = Vec::with_capacity(config.worker_count);
        let mut events: StreamMap<usize, ReceiverStream<WorkerEvent>> = StreamMap::new();

        for id in 0..config.worker_count {
            let (manager_end, worker_end) = control_channel(CONTROL_CHANNEL_CAPACITY);
            let proxy = WorkerProxy::bind(id, config.clone(), self.registry.clone(), worker_end)?;
            let join = tokio::spawn(proxy.run());
            events.insert(id, ReceiverStream::new(manager_end.events));
            workers.push(WorkerHandle {
                id,
                control: manager_end.control,
                join,
            });
        }

        tracing::info!(
            addr = %config.listen_addr,
            workers = workers.len(),
            pid = std::process::id(),
            "Daemon started"
        );

        let mut poll = tokio::time::interval(POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                Some((worker, event)) = events.next() => {
                    self.handle_event(worker, event);
                }
                _ = poll.tick() => {}
            }
        }

        self.free_workers(workers, &mut events).await;
        tracing::info!("Daemon stopped");
        Ok(())
    }

    fn handle_event(&self, worker: usize, event: WorkerEvent) {
        match event {
            WorkerEvent::Log { level, message } => forward_log(worker, level, &message),
        }
    }

    /// Graceful shutdown: unregister each worker's channel, best-effort
    /// send the close signal, close the channel, and reap the worker.
    /// Best-effort failures are swallowed; shutdown always completes.
    async fn free_workers(
        &self,
        workers: Vec<WorkerHandle>,
        events: &mut StreamMap<usize, ReceiverStream<WorkerEvent>>,
    ) {
        for handle in workers {
            events.remove(&handle.id);
            let _ = handle.control.try_send(ControlEvent::Close);
            drop(handle.control);
            match handle.join.await {
                Ok(Ok(())) => tracing::info!(worker = handle.id, "Worker reaped"),
                Ok(Err(err)) => {
                    tracing::warn!(worker = handle.id, error = %err, "Worker exited with error");
                }
                Err(err) => {
                    tracing::warn!(worker = handle.id, error = %err, "Worker task failed");
                }
            }
        }
    }
}

/// Forward a worker's log event into the manager's own logging sink.
fn forward_log(worker: usize, level: Level, message: &str) {
    match level {
        Level::ERROR => tracing::error!(worker, "{message}"),
        Level::WARN => tracing::warn!(worker, "{message}"),
        Level::INFO => tracing::info!(worker, "{message}"),
        Level::DEBUG => tracing::debug!(worker, "{message}"),
        Level::TRACE => tracing::trace!(worker, "{message}"),
    }
}
