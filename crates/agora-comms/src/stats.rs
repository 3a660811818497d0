use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Running totals for one hub, exposed as a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommunicationStats {
    /// Direct messages accepted into a queue.
    pub messages_sent: u64,
    pub messages_received: u64,
    pub broadcasts_sent: u64,
    /// One per rejected recipient (unknown or full queue).
    pub failed_deliveries: u64,
    pub filtered_messages: u64,
    pub registered_agents: usize,
    pub queued_messages: usize,
}

/// One entry of the bounded broadcast history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BroadcastRecord {
    pub message_id: Uuid,
    pub sender_id: String,
    pub message_type: String,
    pub recipients: usize,
    pub timestamp: DateTime<Utc>,
}
