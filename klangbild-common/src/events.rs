//! Event types for the Klangbild event system
//!
//! Transaction lifecycle changes are broadcast on an [`EventBus`] and
//! serialized for SSE transmission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::StatusCode;

/// Klangbild event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum KlangbildEvent {
    /// A transaction was created from a submitted image
    TransactionCreated {
        transaction_id: Uuid,
        /// True when the remote text-to-image backend was selected
        remote_variant: bool,
        timestamp: DateTime<Utc>,
    },

    /// Main pipeline status changed
    StatusChanged {
        transaction_id: Uuid,
        old_status: StatusCode,
        new_status: StatusCode,
        timestamp: DateTime<Utc>,
    },

    /// Secondary (audio) pipeline status changed
    ///
    /// `old_status` is `None` when the audio stage is first scheduled.
    MusicStatusChanged {
        transaction_id: Uuid,
        old_status: Option<StatusCode>,
        new_status: StatusCode,
        timestamp: DateTime<Utc>,
    },
}

impl KlangbildEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            KlangbildEvent::TransactionCreated { .. } => "TransactionCreated",
            KlangbildEvent::StatusChanged { .. } => "StatusChanged",
            KlangbildEvent::MusicStatusChanged { .. } => "MusicStatusChanged",
        }
    }

    /// Transaction this event belongs to
    pub fn transaction_id(&self) -> Uuid {
        match self {
            KlangbildEvent::TransactionCreated { transaction_id, .. }
            | KlangbildEvent::StatusChanged { transaction_id, .. }
            | KlangbildEvent::MusicStatusChanged { transaction_id, .. } => *transaction_id,
        }
    }
}

/// Broadcast bus for [`KlangbildEvent`]s
///
/// Cloning the bus yields another handle to the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<KlangbildEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped for slow receivers. Zero is raised to one.
    ///
    /// ```
    /// use klangbild_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<KlangbildEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: KlangbildEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
