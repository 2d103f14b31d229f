use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Immutable configuration snapshot shared by the manager and its workers.
///
/// The snapshot is taken once at startup and passed to each worker by value;
/// workers never reach back into the manager for settings.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Address every worker binds with address-reuse enabled.
    pub listen_addr: SocketAddr,
    /// Number of sibling job servers sharing the listening address.
    pub worker_count: usize,
    /// Hosts allowed to connect. Empty means "everyone not denied".
    pub allow_hosts: HashSet<IpAddr>,
    /// Hosts whose connections are dropped on accept.
    pub deny_hosts: HashSet<IpAddr>,
    /// Pid marker file guarding single-instance execution.
    pub pid_file: PathBuf,
    /// Upper bound on a single request payload, in bytes.
    pub max_request_bytes: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "127.0.0.1:3600"
                .parse()
                .expect("default listen address is valid"),
            worker_count: 2,
            allow_hosts: HashSet::new(),
            deny_hosts: HashSet::new(),
            pid_file: PathBuf::from("/tmp/flowd.pid"),
            max_request_bytes: 16 * 1024 * 1024,
        }
    }
}

impl DaemonConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_workers(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    pub fn with_pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pid_file = path.into();
        self
    }

    pub fn with_allowed_host(mut self, host: IpAddr) -> Self {
        self.allow_hosts.insert(host);
        self
    }

    pub fn with_denied_host(mut self, host: IpAddr) -> Self {
        self.deny_hosts.insert(host);
        self
    }

    /// Admission policy: a peer is admitted unless it is denied, or an
    /// allow list exists and the peer is not on it.
    pub fn admits(&self, host: &IpAddr) -> bool {
        if self.deny_hosts.contains(host) {
            return false;
        }
        self.allow_hosts.is_empty() || self.allow_hosts.contains(host)
    }
}
