use tokio::sync::mpsc;
use tracing::Level;

/// Events a worker sends its manager. Task data never crosses this channel.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Log { level: Level, message: String },
}

/// Events a manager sends its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Close,
}

/// Manager's end of the private duplex channel to one worker.
#[derive(Debug)]
pub struct ManagerEnd {
    pub events: mpsc::Receiver<WorkerEvent>,
    pub control: mpsc::Sender<ControlEvent>,
}

/// Worker's end of the private duplex channel to the manager.
#[derive(Debug)]
pub struct WorkerEnd {
    events: mpsc::Sender<WorkerEvent>,
    pub control: mpsc::Receiver<ControlEvent>,
}

impl WorkerEnd {
    /// A cloneable handle for emitting log events toward the manager.
    pub fn logger(&self) -> LogSender {
        LogSender {
            events: self.events.clone(),
        }
    }
}

/// Sends log events to the manager's sink. Sends are best-effort: a
/// manager that has gone away just drops them.
#[derive(Debug, Clone)]
pub struct LogSender {
    events: mpsc::Sender<WorkerEvent>,
}

impl LogSender {
    pub async fn log(&self, level: Level, message: String) {
        let _ = self.events.send(WorkerEvent::Log { level, message }).await;
    }
}

/// Build one private duplex channel pair between the manager and a worker.
pub fn control_channel(capacity: usize) -> (ManagerEnd, WorkerEnd) {
    let (event_tx, event_rx) = mpsc::channel(capacity);
    let (control_tx, control_rx) = mpsc::channel(capacity);
    (
        ManagerEnd {
            events: event_rx,
            control: control_tx,
        },
        WorkerEnd {
            events: event_tx,
            control: control_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_events_flow_worker_to_manager() {
        let (mut manager, worker) = control_channel(4);
        worker.logger().log(Level::WARN, "dropped".to_string()).await;
        match manager.events.recv().await {
            Some(WorkerEvent::Log { level, message }) => {
                assert_eq!(level, Level::WARN);
                assert_eq!(message, "dropped");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_flows_manager_to_worker() {
        let (manager, mut worker) = control_channel(4);
        manager.control.send(ControlEvent::Close).await.unwrap();
        assert_eq!(worker.control.recv().await, Some(ControlEvent::Close));
    }

    #[tokio::test]
    async fn log_send_after_manager_drop_is_swallowed() {
        let (manager, worker) = control_channel(4);
        drop(manager);
        // Must not panic or error.
        worker.logger().log(Level::DEBUG, "late".to_string()).await;
    }
}
