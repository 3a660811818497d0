use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use agora_models::config::CommunicationConfig;
use agora_models::message::Message;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::DeliveryError;
use crate::queue::{MessageQueue, QueueStatus};
use crate::stats::{BroadcastRecord, CommunicationStats};

/// Callback run when a message of a given type is received.
pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Predicate applied to every outgoing message; `false` drops it.
pub type MessageFilter = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Routes messages between registered agents.
///
/// Owns one bounded [`MessageQueue`] per agent. The registry lock is only held
/// long enough to look up queues; pushes and pops go through each queue's own lock.
pub struct CommunicationHub {
    config: CommunicationConfig,
    queues: RwLock<HashMap<String, Arc<MessageQueue>>>,
    handlers: RwLock<HashMap<String, Vec<MessageHandler>>>,
    filters: RwLock<Vec<MessageFilter>>,
    stats: Mutex<CommunicationStats>,
    broadcast_history: Mutex<VecDeque<BroadcastRecord>>,
}

impl CommunicationHub {
    pub fn new(config: CommunicationConfig) -> Self {
        Self {
            config,
            queues: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            filters: RwLock::new(Vec::new()),
            stats: Mutex::new(CommunicationStats::default()),
            broadcast_history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &CommunicationConfig {
        &self.config
    }

    fn queues_read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<MessageQueue>>> {
        self.queues.read().unwrap_or_else(|e| e.into_inner())
    }

    fn queues_write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<MessageQueue>>> {
        self.queues.write().unwrap_or_else(|e| e.into_inner())
    }

    fn stats_lock(&self) -> MutexGuard<'_, CommunicationStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a queue for `agent_id`. Re-registering is a no-op; returns whether a queue was created.
    pub fn register(&self, agent_id: &str) -> bool {
        let mut queues = self.queues_write();
        if queues.contains_key(agent_id) {
            warn!(agent = %agent_id, "Agent already registered with hub");
            return false;
        }
        queues.insert(
            agent_id.to_string(),
            Arc::new(MessageQueue::new(agent_id, self.config.max_queue_size)),
        );
        info!(agent = %agent_id, max_queue_size = self.config.max_queue_size, "Agent registered with hub");
        true
    }

    /// Drop the agent's queue, discarding anything pending. Returns whether the agent was registered.
    pub fn unregister(&self, agent_id: &str) -> bool {
        let removed = self.queues_write().remove(agent_id);
        match removed {
            Some(queue) => {
                let discarded = queue.close();
                info!(agent = %agent_id, discarded, "Agent unregistered from hub");
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.queues_read().contains_key(agent_id)
    }

    pub fn registered_agents(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.queues_read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Run `handler` for every received message whose type equals `message_type`.
    pub fn register_handler<F>(&self, message_type: impl Into<String>, handler: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(message_type.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Drop outgoing messages for which `filter` returns false.
    pub fn add_filter<F>(&self, filter: F)
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.filters
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(filter));
    }

    /// Send a message, reporting whether it reached at least its intended recipient set.
    pub fn send(&self, message: Message) -> bool {
        match self.deliver(message) {
            Ok(_) => true,
            Err(DeliveryError::Filtered { .. }) => false,
            Err(e) => {
                warn!(error = %e, "Message delivery failed");
                false
            }
        }
    }

    /// Typed form of [`send`](Self::send). Returns the number of queues the message reached.
    pub fn deliver(&self, message: Message) -> Result<usize, DeliveryError> {
        if !self.passes_filters(&message) {
            self.stats_lock().filtered_messages += 1;
            debug!(message_id = %message.id, message_type = %message.message_type, "Message filtered");
            return Err(DeliveryError::Filtered {
                message_id: message.id,
            });
        }

        match message.receiver_id.clone() {
            Some(receiver) => self.deliver_direct(&receiver, message),
            None => self.deliver_broadcast(message),
        }
    }

    fn passes_filters(&self, message: &Message) -> bool {
        let filters = self.filters.read().unwrap_or_else(|e| e.into_inner());
        filters.iter().all(|f| f(message))
    }

    fn deliver_direct(&self, receiver: &str, message: Message) -> Result<usize, DeliveryError> {
        let queue = self.queues_read().get(receiver).cloned();
        let result = match queue {
            Some(queue) => queue.push(message),
            None => Err(DeliveryError::RecipientNotFound(receiver.to_string())),
        };

        let mut stats = self.stats_lock();
        match result {
            Ok(()) => {
                stats.messages_sent += 1;
                debug!(receiver = %receiver, "Message queued");
                Ok(1)
            }
            Err(e) => {
                stats.failed_deliveries += 1;
                Err(e)
            }
        }
    }

    fn deliver_broadcast(&self, message: Message) -> Result<usize, DeliveryError> {
        let recipients: Vec<Arc<MessageQueue>> = self
            .queues_read()
            .iter()
            .filter(|(id, _)| **id != message.sender_id)
            .map(|(_, q)| Arc::clone(q))
            .collect();

        let mut delivered = 0usize;
        let mut first_error = None;
        for queue in &recipients {
            match queue.push(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(receiver = %queue.agent_id(), error = %e, "Broadcast copy rejected");
                    first_error.get_or_insert(e);
                }
            }
        }
        let failed = recipients.len() - delivered;

        {
            let mut stats = self.stats_lock();
            stats.broadcasts_sent += 1;
            stats.failed_deliveries += failed as u64;
        }
        self.record_broadcast(&message, delivered);
        debug!(sender = %message.sender_id, delivered, failed, "Broadcast delivered");

        match first_error {
            Some(e) if delivered == 0 => Err(e),
            _ => Ok(delivered),
        }
    }

    fn record_broadcast(&self, message: &Message, recipients: usize) {
        let capacity = self.config.broadcast_history_size;
        if capacity == 0 {
            return;
        }
        let mut history = self
            .broadcast_history
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        while history.len() >= capacity {
            history.pop_front();
        }
        history.push_back(BroadcastRecord {
            message_id: message.id,
            sender_id: message.sender_id.clone(),
            message_type: message.message_type.clone(),
            recipients,
            timestamp: Utc::now(),
        });
    }

    /// Pop the next message for `agent_id`.
    ///
    /// `Some(timeout)` waits up to that long (zero polls). `None` polls or waits
    /// indefinitely depending on `block_without_timeout`. Handlers registered for
    /// the message type run before the message is returned.
    pub async fn receive(&self, agent_id: &str, timeout: Option<Duration>) -> Option<Message> {
        let queue = self.queues_read().get(agent_id).cloned();
        let Some(queue) = queue else {
            warn!(agent = %agent_id, "Receive on unregistered agent");
            return None;
        };

        let timeout = match timeout {
            Some(t) => Some(t),
            None if self.config.block_without_timeout => None,
            None => Some(Duration::ZERO),
        };

        let message = queue.pop(timeout).await?;
        self.on_received(&message);
        Some(message)
    }

    /// Pop the next message for `agent_id` without waiting.
    pub fn try_receive(&self, agent_id: &str) -> Option<Message> {
        let queue = self.queues_read().get(agent_id).cloned()?;
        let message = queue.try_pop()?;
        self.on_received(&message);
        Some(message)
    }

    fn on_received(&self, message: &Message) {
        self.stats_lock().messages_received += 1;

        let handlers: Vec<MessageHandler> = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&message.message_type)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(message);
        }
    }

    pub fn get_queue_status(&self, agent_id: &str) -> Option<QueueStatus> {
        self.queues_read().get(agent_id).map(|q| q.status())
    }

    pub fn get_communication_stats(&self) -> CommunicationStats {
        let (registered_agents, queued_messages) = {
            let queues = self.queues_read();
            (queues.len(), queues.values().map(|q| q.len()).sum())
        };
        let mut snapshot = self.stats_lock().clone();
        snapshot.registered_agents = registered_agents;
        snapshot.queued_messages = queued_messages;
        snapshot
    }

    pub fn broadcast_history(&self) -> Vec<BroadcastRecord> {
        self.broadcast_history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_models::message::priority;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn hub_with(max_queue_size: usize) -> CommunicationHub {
        CommunicationHub::new(CommunicationConfig {
            max_queue_size,
            ..CommunicationConfig::default()
        })
    }

    #[test]
    fn register_is_idempotent() {
        let hub = hub_with(10);
        assert!(hub.register("a"));
        hub.deliver(Message::direct("x", "a", "t", serde_json::Value::Null))
            .unwrap();

        assert!(!hub.register("a"));
        assert_eq!(hub.registered_agents(), vec!["a".to_string()]);
        // The existing queue survives the duplicate registration.
        assert_eq!(hub.get_queue_status("a").unwrap().size, 1);
    }

    #[test]
    fn unregister_purges_queue() {
        let hub = hub_with(10);
        hub.register("a");
        hub.send(Message::direct("x", "a", "t", serde_json::Value::Null));

        assert!(hub.unregister("a"));
        assert!(!hub.unregister("a"));
        assert!(hub.get_queue_status("a").is_none());
        assert!(!hub.send(Message::direct("x", "a", "t", serde_json::Value::Null)));
    }

    #[test]
    fn direct_to_unknown_recipient_fails() {
        let hub = hub_with(10);
        let err = hub
            .deliver(Message::direct("x", "ghost", "t", serde_json::Value::Null))
            .unwrap_err();
        assert_eq!(err, DeliveryError::RecipientNotFound("ghost".to_string()));
        assert_eq!(hub.get_communication_stats().failed_deliveries, 1);
    }

    #[test]
    fn broadcast_reaches_everyone_but_sender() {
        let hub = hub_with(10);
        for id in ["a", "b", "c", "d"] {
            hub.register(id);
        }

        let reached = hub
            .deliver(Message::broadcast("a", "alert", serde_json::json!({"level": 1})))
            .unwrap();
        assert_eq!(reached, 3);
        assert_eq!(hub.get_queue_status("a").unwrap().size, 0);
        for id in ["b", "c", "d"] {
            assert_eq!(hub.get_queue_status(id).unwrap().size, 1);
        }

        let history = hub.broadcast_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].recipients, 3);
        assert_eq!(hub.get_communication_stats().broadcasts_sent, 1);
    }

    #[test]
    fn third_send_to_small_queue_fails() {
        let hub = hub_with(2);
        hub.register("r");

        assert!(hub.send(Message::direct("s", "r", "t", serde_json::Value::Null)));
        assert!(hub.send(Message::direct("s", "r", "t", serde_json::Value::Null)));
        let before = hub.get_communication_stats().failed_deliveries;
        assert!(!hub.send(Message::direct("s", "r", "t", serde_json::Value::Null)));

        let stats = hub.get_communication_stats();
        assert_eq!(stats.failed_deliveries, before + 1);
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.queued_messages, 2);
    }

    #[test]
    fn broadcast_counts_full_recipients_as_failed() {
        let hub = hub_with(1);
        for id in ["a", "b", "c"] {
            hub.register(id);
        }
        hub.send(Message::direct("a", "b", "t", serde_json::Value::Null));

        let reached = hub
            .deliver(Message::broadcast("a", "t", serde_json::Value::Null))
            .unwrap();
        assert_eq!(reached, 1);
        assert_eq!(hub.get_communication_stats().failed_deliveries, 1);
    }

    #[test]
    fn filters_drop_messages() {
        let hub = hub_with(10);
        hub.register("a");
        hub.add_filter(|m: &Message| m.message_type != "spam");

        assert!(!hub.send(Message::direct("x", "a", "spam", serde_json::Value::Null)));
        assert!(hub.send(Message::direct("x", "a", "signal", serde_json::Value::Null)));

        let stats = hub.get_communication_stats();
        assert_eq!(stats.filtered_messages, 1);
        assert_eq!(stats.failed_deliveries, 0);
        assert_eq!(hub.get_queue_status("a").unwrap().size, 1);
    }

    #[test]
    fn broadcast_history_is_bounded() {
        let hub = CommunicationHub::new(CommunicationConfig {
            broadcast_history_size: 3,
            ..CommunicationConfig::default()
        });
        hub.register("a");
        hub.register("b");

        let ids: Vec<_> = (0..5)
            .map(|_| {
                let m = Message::broadcast("a", "tick", serde_json::Value::Null);
                let id = m.id;
                hub.send(m);
                id
            })
            .collect();

        let history = hub.broadcast_history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].message_id, ids[2]);
        assert_eq!(history[2].message_id, ids[4]);
    }

    #[tokio::test]
    async fn receive_in_priority_order_and_runs_handlers() {
        let hub = hub_with(10);
        hub.register("r");
        let seen = Arc::new(AtomicUsize::new(0));
        {
            let seen = Arc::clone(&seen);
            hub.register_handler("order", move |_m: &Message| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        }

        for p in [priority::LOW, priority::CRITICAL, priority::NORMAL] {
            hub.send(Message::direct("s", "r", "order", serde_json::Value::Null).with_priority(p));
        }

        let mut order = Vec::new();
        while let Some(m) = hub.receive("r", Some(Duration::ZERO)).await {
            order.push(m.priority);
        }
        assert_eq!(order, vec![priority::CRITICAL, priority::NORMAL, priority::LOW]);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(hub.get_communication_stats().messages_received, 3);
    }

    #[tokio::test]
    async fn receive_without_timeout_polls_by_default() {
        let hub = hub_with(10);
        hub.register("r");
        assert!(hub.receive("r", None).await.is_none());
        assert!(hub.receive("nobody", None).await.is_none());
    }

    #[tokio::test]
    async fn receive_blocks_until_message_arrives() {
        let hub = Arc::new(CommunicationHub::new(CommunicationConfig {
            block_without_timeout: true,
            ..CommunicationConfig::default()
        }));
        hub.register("r");

        let receiver = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.receive("r", None).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        hub.send(Message::direct("s", "r", "wake", serde_json::Value::Null));

        let message = receiver.await.unwrap().unwrap();
        assert_eq!(message.message_type, "wake");
    }

    #[tokio::test]
    async fn receive_times_out() {
        let hub = hub_with(10);
        hub.register("r");
        assert!(hub
            .receive("r", Some(Duration::from_millis(20)))
            .await
            .is_none());
        assert!(hub.try_receive("r").is_none());
    }
}
