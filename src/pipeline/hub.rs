//! Notification history and live fan-out.
//!
//! Every broadcast lands in a bounded history (newest first) and is pushed to
//! each connected subscriber's queue. Queues are unbounded, so a slow client
//! never holds up the scheduler.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::models::{InjuryNotification, RetentionConfig};

type Subscribers = Arc<Mutex<BTreeMap<u64, UnboundedSender<InjuryNotification>>>>;

fn lock(subscribers: &Subscribers) -> MutexGuard<'_, BTreeMap<u64, UnboundedSender<InjuryNotification>>> {
    subscribers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A live subscriber queue. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: UnboundedReceiver<InjuryNotification>,
    subscribers: Subscribers,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next notification.
    pub async fn recv(&mut self) -> Option<InjuryNotification> {
        self.receiver.recv().await
    }

    /// Take a queued notification without waiting.
    pub fn try_recv(&mut self) -> Option<InjuryNotification> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        lock(&self.subscribers).remove(&self.id);
        log::debug!("Subscriber {} disconnected", self.id);
    }
}

/// Broadcast hub with retained history.
#[derive(Debug)]
pub struct NotificationHub {
    subscribers: Subscribers,
    next_id: AtomicU64,
    history: RwLock<VecDeque<InjuryNotification>>,
    max_history: usize,
    ttl: Duration,
}

impl NotificationHub {
    pub fn new(retention: &RetentionConfig) -> Self {
        Self {
            subscribers: Arc::default(),
            next_id: AtomicU64::new(1),
            history: RwLock::new(VecDeque::new()),
            max_history: retention.max_history,
            ttl: retention.ttl(),
        }
    }

    /// Register a new subscriber queue.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.subscribers).insert(id, sender);
        log::debug!("Subscriber {} connected", id);

        Subscription {
            id,
            receiver,
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    /// Remove a subscriber queue. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: u64) {
        lock(&self.subscribers).remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Record notifications in history and push them to every subscriber.
    pub async fn broadcast(&self, notifications: &[InjuryNotification], now: DateTime<Utc>) {
        if notifications.is_empty() {
            return;
        }

        {
            let mut history = self.history.write().await;
            for notification in notifications {
                history.push_front(notification.clone());
            }
            history.truncate(self.max_history);
            let cutoff = now - self.ttl;
            history.retain(|n| n.timestamp >= cutoff);
        }

        let snapshot: Vec<(u64, UnboundedSender<InjuryNotification>)> = lock(&self.subscribers)
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect();

        let mut closed = Vec::new();
        for (id, sender) in &snapshot {
            for notification in notifications {
                if sender.send(notification.clone()).is_err() {
                    closed.push(*id);
                    break;
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = lock(&self.subscribers);
            for id in &closed {
                subscribers.remove(id);
            }
            log::debug!("Removed {} closed subscriber queue(s)", closed.len());
        }

        log::info!(
            "Broadcast {} notification(s) to {} subscriber(s)",
            notifications.len(),
            snapshot.len() - closed.len()
        );
    }

    /// History newest first, without entries older than the TTL.
    pub async fn history(&self, now: DateTime<Utc>) -> Vec<InjuryNotification> {
        let cutoff = now - self.ttl;
        self.history
            .read()
            .await
            .iter()
            .filter(|n| n.timestamp >= cutoff)
            .cloned()
            .collect()
    }
}
