//! Lead change fan-out to live observer connections.
//!
//! # Responsibility
//! - Keep the registry of currently connected observers.
//! - Serialize one change event and deliver it to every observer.
//!
//! # Invariants
//! - Broadcasting never fails the mutating caller.
//! - `ObserverConnection::send` must not block.
//! - Any failed send prunes that observer from the registry. An observer
//!   whose buffer is full has stalled and is pruned like a closed one.
//! - The registry lock is never held while sending.

use crate::model::lead::{now_utc, Lead};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Registry-assigned observer handle.
pub type ConnectionId = u64;

/// Per-connection delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// Outbound buffer is full; the observer stopped draining.
    Full,
    /// Observer is gone.
    Closed,
}

impl Display for DeliveryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "observer buffer is full"),
            Self::Closed => write!(f, "observer connection is closed"),
        }
    }
}

impl Error for DeliveryError {}

/// Registry-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    ShutDown,
}

impl Display for BroadcastError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShutDown => write!(f, "broadcast manager is shut down"),
        }
    }
}

impl Error for BroadcastError {}

/// Transport seam for long-lived observer connections.
pub trait ObserverConnection: Send + Sync {
    /// Queues one serialized frame without blocking.
    fn send(&self, frame: &str) -> Result<(), DeliveryError>;

    /// Called once when the manager shuts down.
    fn close(&self) {}
}

/// Observer backed by a bounded in-process channel.
///
/// The transport owns the receiving half and forwards frames to its client.
/// Dropping the receiver, or letting `capacity` frames pile up, gets the
/// connection pruned on the next broadcast.
pub struct ChannelObserver {
    sender: SyncSender<String>,
}

impl ChannelObserver {
    /// Creates an observer with room for `capacity` undelivered frames.
    pub fn pair(capacity: usize) -> (Self, Receiver<String>) {
        let (sender, receiver) = sync_channel(capacity);
        (Self { sender }, receiver)
    }
}

impl ObserverConnection for ChannelObserver {
    fn send(&self, frame: &str) -> Result<(), DeliveryError> {
        self.sender
            .try_send(frame.to_string())
            .map_err(|err| match err {
                TrySendError::Full(_) => DeliveryError::Full,
                TrySendError::Disconnected(_) => DeliveryError::Closed,
            })
    }
}

/// Kind of committed mutation being announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadAction {
    Create,
    Update,
    Delete,
}

impl LeadAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Wire payload sent to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadChangeEvent {
    pub lead: Lead,
    pub action: LeadAction,
    pub initiating_actor_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Outcome counters for one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub pruned: usize,
}

type ConnectionMap = BTreeMap<ConnectionId, Arc<dyn ObserverConnection>>;

struct Registry {
    connections: Mutex<ConnectionMap>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
}

/// Owned registry of observer connections. Clones share one registry.
#[derive(Clone)]
pub struct BroadcastManager {
    registry: Arc<Registry>,
}

impl Default for BroadcastManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastManager {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                connections: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Adds a connection to the active set.
    pub fn register(
        &self,
        connection: Arc<dyn ObserverConnection>,
    ) -> Result<ConnectionId, BroadcastError> {
        let mut connections = self.lock();
        if self.registry.shut_down.load(Ordering::Acquire) {
            return Err(BroadcastError::ShutDown);
        }
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        connections.insert(id, connection);
        info!(
            "event=observer_register module=realtime status=ok connection_id={id} active={}",
            connections.len()
        );
        Ok(id)
    }

    /// Removes a connection; returns whether it was registered.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let mut connections = self.lock();
        let removed = connections.remove(&id).is_some();
        if removed {
            info!(
                "event=observer_unregister module=realtime status=ok connection_id={id} active={}",
                connections.len()
            );
        }
        removed
    }

    pub fn connection_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.registry.shut_down.load(Ordering::Acquire)
    }

    /// Announces a committed lead mutation to every registered observer.
    ///
    /// A connection whose send fails is removed. Per-connection failures are
    /// logged and never returned.
    pub fn broadcast_lead_change(
        &self,
        lead: &Lead,
        action: LeadAction,
        initiating_actor_id: &str,
    ) -> BroadcastReport {
        let event = LeadChangeEvent {
            lead: lead.clone(),
            action,
            initiating_actor_id: initiating_actor_id.to_string(),
            timestamp: now_utc(),
        };
        let frame = match serde_json::to_string(&event) {
            Ok(frame) => frame,
            Err(err) => {
                error!(
                    "event=lead_broadcast module=realtime status=error error_code=serialize_failed lead_id={} error={}",
                    lead.id, err
                );
                return BroadcastReport::default();
            }
        };

        let snapshot: Vec<(ConnectionId, Arc<dyn ObserverConnection>)> = self
            .lock()
            .iter()
            .map(|(id, connection)| (*id, Arc::clone(connection)))
            .collect();

        let mut report = BroadcastReport::default();
        let mut dead = Vec::new();
        for (id, connection) in snapshot {
            match connection.send(&frame) {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::Full) => {
                    warn!(
                        "event=lead_broadcast module=realtime status=error error_code=observer_stalled connection_id={id} lead_id={}",
                        lead.id
                    );
                    dead.push(id);
                }
                Err(DeliveryError::Closed) => dead.push(id),
            }
        }

        if !dead.is_empty() {
            let mut connections = self.lock();
            for id in &dead {
                if connections.remove(id).is_some() {
                    report.pruned += 1;
                    debug!("event=observer_prune module=realtime status=ok connection_id={id}");
                }
            }
        }

        info!(
            "event=lead_broadcast module=realtime status=ok action={} lead_id={} delivered={} pruned={}",
            action.as_str(),
            lead.id,
            report.delivered,
            report.pruned
        );
        report
    }

    /// Closes every live connection and rejects further registrations.
    pub fn shutdown(&self) {
        let closed = {
            let mut connections = self.lock();
            self.registry.shut_down.store(true, Ordering::Release);
            std::mem::take(&mut *connections)
        };
        let count = closed.len();
        for connection in closed.into_values() {
            connection.close();
        }
        info!("event=realtime_shutdown module=realtime status=ok closed={count}");
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionMap> {
        self.registry
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
