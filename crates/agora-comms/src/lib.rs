pub mod error;
pub mod hub;
pub mod queue;
pub mod stats;

pub use error::DeliveryError;
pub use hub::{CommunicationHub, MessageFilter, MessageHandler};
pub use queue::{MessageQueue, QueueStatus};
pub use stats::{BroadcastRecord, CommunicationStats};
