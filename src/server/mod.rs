//! The socket-facing job server and its control plumbing.
//!
//! Each worker runs a [`WorkerProxy`]: it accepts connections on the shared
//! listening address, reassembles length-prefixed requests, dispatches them
//! to the local [`crate::worker::Worker`], and writes results back to the
//! submitting connection. The manager talks to every proxy over a private
//! duplex [`control`] channel carrying only log events and the close signal.

pub mod control;
pub mod proxy;

pub use control::{control_channel, ControlEvent, LogSender, ManagerEnd, WorkerEnd, WorkerEvent};
pub use proxy::WorkerProxy;
