use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("Recipient not registered: {0}")]
    RecipientNotFound(String),

    #[error("Queue full for {agent_id} (max {max_size})")]
    QueueFull { agent_id: String, max_size: usize },

    #[error("Message {message_id} rejected by filter")]
    Filtered { message_id: Uuid },
}
