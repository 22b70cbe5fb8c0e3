// Connection registry
//
// One component owns all live SSE connections: registration enforces the
// per-IP cap, removal releases the slot, and a background sweep force-
// disconnects connections that have gone idle past the configured timeout.
// The sweep is a pure function of the "now" it is handed, which keeps it
// testable without waiting out real timeouts.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

struct ConnectionInfo {
    ip: IpAddr,
    last_seen: Instant,
    shutdown: watch::Sender<bool>,
}

/// Registry of live streaming connections with per-IP admission control
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionInfo>,
    per_ip: DashMap<IpAddr, usize>,
    max_per_ip: usize,
    idle_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(max_per_ip: usize, idle_timeout: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            per_ip: DashMap::new(),
            max_per_ip,
            idle_timeout,
        }
    }

    /// Admit a connection from `ip`, or refuse it when the cap is reached.
    ///
    /// The returned receiver flips to `true` when the registry wants the
    /// session gone (server shutdown or idle sweep).
    pub fn register(&self, ip: IpAddr) -> Option<(ConnectionId, watch::Receiver<bool>)> {
        {
            let mut count = self.per_ip.entry(ip).or_insert(0);
            if *count >= self.max_per_ip {
                return None;
            }
            *count += 1;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let id = ConnectionId::new();
        self.connections.insert(
            id.clone(),
            ConnectionInfo {
                ip,
                last_seen: Instant::now(),
                shutdown,
            },
        );
        debug!(connection_id = %id, %ip, "connection registered");
        Some((id, shutdown_rx))
    }

    /// Record activity on a connection so the sweep leaves it alone
    pub fn touch(&self, id: &ConnectionId) {
        if let Some(mut info) = self.connections.get_mut(id) {
            info.last_seen = Instant::now();
        }
    }

    /// Remove a connection and free its per-IP slot. Safe to call twice;
    /// the second call finds nothing and does nothing.
    pub fn unregister(&self, id: &ConnectionId) {
        if let Some(info) = self.remove_entry(id) {
            debug!(connection_id = %id, ip = %info.ip, "connection unregistered");
        }
    }

    /// Force-disconnect every connection idle longer than the timeout,
    /// judged against the `now` passed in. Returns how many were dropped.
    pub fn sweep(&self, now: Instant) -> usize {
        let stale: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| {
                now.saturating_duration_since(entry.value().last_seen) > self.idle_timeout
            })
            .map(|entry| entry.key().clone())
            .collect();

        for id in &stale {
            if let Some(info) = self.remove_entry(id) {
                let _ = info.shutdown.send(true);
                info!(connection_id = %id, ip = %info.ip, "idle connection force-disconnected");
            }
        }
        stale.len()
    }

    /// Periodic sweep loop; runs until the process exits
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let dropped = self.sweep(Instant::now());
            if dropped > 0 {
                debug!(dropped, "sweep removed idle connections");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Live connections currently held by `ip`
    pub fn connections_for(&self, ip: IpAddr) -> usize {
        self.per_ip.get(&ip).map(|count| *count).unwrap_or(0)
    }

    fn remove_entry(&self, id: &ConnectionId) -> Option<ConnectionInfo> {
        let (_, info) = self.connections.remove(id)?;
        if let Some(mut count) = self.per_ip.get_mut(&info.ip) {
            *count = count.saturating_sub(1);
        }
        // remove_if re-checks the count under the shard lock, so a register
        // that races in between keeps its slot
        self.per_ip.remove_if(&info.ip, |_, count| *count == 0);
        Some(info)
    }
}
