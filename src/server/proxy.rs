use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::oneshot;
use tracing::Level;

use crate::config::DaemonConfig;
use crate::error::{FlowdError, Result};
use crate::protocol::{RequestAssembler, TaskRequest, TaskResponse, READ_CHUNK_BYTES};
use crate::server::control::{ControlEvent, LogSender, WorkerEnd};
use crate::tasks::{Invoker, TaskInvocation, TaskRegistry};
use crate::worker::Worker;

const LISTEN_BACKLOG: u32 = 1024;

/// Per-worker job server.
///
/// Owns a listening socket bound to the shared address with address-reuse
/// enabled (every sibling worker binds the same address; the kernel
/// distributes incoming connections among them), the control channel to the
/// manager, and the local [`Worker`]. Network requests are bridged to the
/// worker's queue and results back to the originating connection.
pub struct WorkerProxy {
    id: usize,
    config: Arc<DaemonConfig>,
    registry: Arc<TaskRegistry>,
    listener: TcpListener,
    control: WorkerEnd,
    worker: Worker,
}

impl WorkerProxy {
    /// Bind the shared listening address with `SO_REUSEADDR`/`SO_REUSEPORT`.
    pub fn bind(
        id: usize,
        config: Arc<DaemonConfig>,
        registry: Arc<TaskRegistry>,
        control: WorkerEnd,
    ) -> Result<Self> {
        let listener = bind_reuseport(config.listen_addr)?;
        tracing::info!(worker = id, addr = %config.listen_addr, "Job server bound");
        Ok(Self {
            id,
            config,
            registry,
            listener,
            control,
            worker: Worker::new(format!("worker-{id}")),
        })
    }

    /// The bound address; useful when the configured port was 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Start the worker's execution thread, serve until the manager sends
    /// `Close`, then drain and exit.
    pub async fn run(self) -> Result<()> {
        let WorkerProxy {
            id,
            config,
            registry,
            listener,
            mut control,
            worker,
        } = self;

        let executor = worker.spawn_executor()?;
        let logger = control.logger();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        admit(&config, &registry, &worker, &logger, stream, peer).await;
                    }
                    Err(err) => {
                        tracing::warn!(worker = id, error = %err, "Accept failed");
                    }
                },
                event = control.control.recv() => {
                    // A closed channel means the manager is gone; treat it
                    // like an explicit close.
                    match event {
                        Some(ControlEvent::Close) | None => break,
                    }
                }
            }
        }

        tracing::debug!(worker = id, "Close received, draining");
        worker.stop();
        tokio::task::spawn_blocking(move || executor.join())
            .await
            .map_err(|err| FlowdError::Internal(format!("executor join failed: {err}")))?
            .map_err(|_| FlowdError::Internal("execution thread panicked".to_string()))?;
        drop(listener);
        tracing::info!(worker = id, "Job server stopped");
        Ok(())
    }
}

/// Apply admission policy, then hand the connection to its own task.
async fn admit(
    config: &Arc<DaemonConfig>,
    registry: &Arc<TaskRegistry>,
    worker: &Worker,
    logger: &LogSender,
    stream: TcpStream,
    peer: SocketAddr,
) {
    if !config.admits(&peer.ip()) {
        logger
            .log(Level::WARN, format!("drop connection from <{peer}>"))
            .await;
        // Dropping the stream closes it with no bytes written.
        return;
    }
    logger
        .log(Level::DEBUG, format!("accept connection from <{peer}>"))
        .await;

    let worker = worker.clone();
    let registry = registry.clone();
    let max_request_bytes = config.max_request_bytes;
    tokio::spawn(async move {
        serve_connection(stream, peer, worker, registry, max_request_bytes).await;
    });
}

/// Serve exactly one request/response exchange, then close.
///
/// Protocol errors are per-connection: they are logged, answered with a
/// structured error payload when possible, and never reach the accept loop.
async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    worker: Worker,
    registry: Arc<TaskRegistry>,
    max_request_bytes: usize,
) {
    let reply = match read_request(&mut stream, max_request_bytes).await {
        Ok(payload) => match dispatch(&payload, peer, &worker, &registry) {
            Ok(rx) => match rx.await {
                Ok(bytes) => bytes,
                Err(_) => {
                    // Worker stopped before the future completed; the queue
                    // was discarded during shutdown.
                    encode_failure("task discarded during shutdown")
                }
            },
            Err(err) => {
                tracing::warn!(%peer, error = %err, "Rejecting request");
                encode_failure(&err.to_string())
            }
        },
        Err(err) => {
            tracing::warn!(%peer, error = %err, "Malformed request");
            encode_failure(&err.to_string())
        }
    };

    if let Err(err) = stream.write_all(&reply).await {
        tracing::debug!(%peer, error = %err, "Failed to write response");
    }
    let _ = stream.shutdown().await;
}

/// Reassemble one length-prefixed request from bounded reads.
async fn read_request(stream: &mut TcpStream, max_request_bytes: usize) -> Result<Vec<u8>> {
    let mut assembler = RequestAssembler::new(max_request_bytes);
    let mut buf = [0u8; READ_CHUNK_BYTES];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(FlowdError::Protocol(format!(
                "connection closed mid-request ({} of {} bytes)",
                assembler.buffered_len(),
                assembler
                    .declared_len()
                    .map_or_else(|| "?".to_string(), |len| len.to_string()),
            )));
        }
        if let Some(payload) = assembler.feed(&buf[..n])? {
            return Ok(payload);
        }
    }
}

/// Decode the payload, resolve the task, and submit it to the local worker.
///
/// The returned receiver yields the serialized response; the future's
/// completion callback captures it, so the result lands on exactly the
/// connection that submitted the request.
fn dispatch(
    payload: &[u8],
    peer: SocketAddr,
    worker: &Worker,
    registry: &TaskRegistry,
) -> Result<oneshot::Receiver<Vec<u8>>> {
    let request = TaskRequest::from_bytes(payload)
        .map_err(|err| FlowdError::Protocol(format!("undecodable task descriptor: {err}")))?;
    let task = registry.lookup(&request.task)?;

    let invocation = TaskInvocation::new(task, Invoker::local(worker.name()).with_peer(peer))
        .with_args(request.args)
        .with_kwargs(request.kwargs);
    let future = worker.add_task(invocation);

    let (tx, rx) = oneshot::channel();
    future.on_done(move |outcome| {
        let bytes = match TaskResponse::from_outcome(outcome).to_bytes() {
            Ok(bytes) => bytes,
            Err(_) => encode_failure("response encoding failed"),
        };
        let _ = tx.send(bytes);
    });
    Ok(rx)
}

fn encode_failure(error: &str) -> Vec<u8> {
    TaskResponse::failure(error)
        .to_bytes()
        .unwrap_or_else(|_| br#"{"ok":false,"error":"response encoding failed"}"#.to_vec())
}

fn bind_reuseport(addr: SocketAddr) -> Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(LISTEN_BACKLOG)?)
}
