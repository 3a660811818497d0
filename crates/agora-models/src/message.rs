use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Named priority levels. Any `i32` is accepted; higher is more urgent.
pub mod priority {
    pub const LOW: i32 = 1;
    pub const NORMAL: i32 = 2;
    pub const HIGH: i32 = 3;
    pub const CRITICAL: i32 = 4;
}

/// A message exchanged between agents through the communication hub.
///
/// Messages are immutable once created. A message without a `receiver_id`
/// is a broadcast and is copied into every other registered agent's queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: String,
    /// `None` marks a broadcast.
    pub receiver_id: Option<String>,
    /// Free-form tag used to route the message to registered handlers.
    pub message_type: String,
    pub content: serde_json::Value,
    pub priority: i32,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// A point-to-point message at normal priority.
    pub fn direct(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        message_type: impl Into<String>,
        content: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            receiver_id: Some(receiver_id.into()),
            message_type: message_type.into(),
            content,
            priority: priority::NORMAL,
            timestamp: Utc::now(),
        }
    }

    /// A message for every registered agent except the sender.
    pub fn broadcast(
        sender_id: impl Into<String>,
        message_type: impl Into<String>,
        content: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            receiver_id: None,
            message_type: message_type.into(),
            content,
            priority: priority::NORMAL,
            timestamp: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.receiver_id.is_none()
    }
}
