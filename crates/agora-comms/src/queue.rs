use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use agora_models::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::error::DeliveryError;

/// Snapshot of one agent's queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueStatus {
    pub agent_id: String,
    pub size: usize,
    pub max_size: usize,
    pub is_full: bool,
    /// Priority of the message `receive` would return next.
    pub next_priority: Option<i32>,
}

/// Heap entry ordered so that `BinaryHeap::pop` yields the highest priority,
/// then the earliest timestamp, then the lowest insertion sequence.
#[derive(Debug)]
struct Queued {
    priority: i32,
    timestamp: DateTime<Utc>,
    seq: u64,
    message: Message,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.timestamp.cmp(&self.timestamp))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
    closed: bool,
}

/// Bounded per-agent priority queue.
///
/// Each queue has its own lock, so traffic to different agents never contends.
/// A full queue rejects new messages instead of blocking the sender.
#[derive(Debug)]
pub struct MessageQueue {
    agent_id: String,
    max_size: usize,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl MessageQueue {
    pub fn new(agent_id: impl Into<String>, max_size: usize) -> Self {
        Self {
            agent_id: agent_id.into(),
            max_size,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, message: Message) -> Result<(), DeliveryError> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(DeliveryError::RecipientNotFound(self.agent_id.clone()));
            }
            if state.heap.len() >= self.max_size {
                return Err(DeliveryError::QueueFull {
                    agent_id: self.agent_id.clone(),
                    max_size: self.max_size,
                });
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.heap.push(Queued {
                priority: message.priority,
                timestamp: message.timestamp,
                seq,
                message,
            });
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Pop the most urgent message without waiting.
    pub fn try_pop(&self) -> Option<Message> {
        self.lock().heap.pop().map(|q| q.message)
    }

    /// Pop the most urgent message, waiting up to `timeout` (`None` waits indefinitely).
    ///
    /// Returns `None` on timeout or once the queue is closed.
    pub async fn pop(&self, timeout: Option<Duration>) -> Option<Message> {
        match timeout {
            Some(t) if t.is_zero() => self.try_pop(),
            Some(t) => tokio::time::timeout(t, self.wait_pop())
                .await
                .ok()
                .flatten(),
            None => self.wait_pop().await,
        }
    }

    async fn wait_pop(&self) -> Option<Message> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if let Some(q) = state.heap.pop() {
                    return Some(q.message);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Close the queue, discarding pending messages and waking any waiting receivers.
    ///
    /// Returns the number of discarded messages.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut state = self.lock();
            state.closed = true;
            let n = state.heap.len();
            state.heap.clear();
            n
        };
        self.notify.notify_waiters();
        discarded
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.lock();
        let size = state.heap.len();
        QueueStatus {
            agent_id: self.agent_id.clone(),
            size,
            max_size: self.max_size,
            is_full: size >= self.max_size,
            next_priority: state.heap.peek().map(|q| q.priority),
        }
    }
}
