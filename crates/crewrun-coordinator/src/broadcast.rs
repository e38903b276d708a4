//! Event fan-out to connected observers.
//!
//! Each observer owns a bounded queue. Publishing never blocks: a full queue
//! drops the event for that observer only, and a closed queue is pruned.

use std::collections::{HashMap, HashSet, VecDeque};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crewrun_core::{Event, ObserverId, Topic};

use crate::error::CoordinatorError;

struct Observer {
    topics: HashSet<Topic>,
    sender: mpsc::Sender<Event>,
}

/// Topic-filtered broadcaster with a short history of recent events.
pub struct Broadcaster {
    buffer: usize,
    history_len: usize,
    observers: RwLock<HashMap<ObserverId, Observer>>,
    history: RwLock<VecDeque<Event>>,
}

impl Broadcaster {
    pub fn new(buffer: usize, history_len: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            history_len,
            observers: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::with_capacity(history_len)),
        }
    }

    /// Register an observer with no subscription and return its queue.
    ///
    /// Connecting an id again replaces the previous queue.
    pub async fn connect(&self, observer_id: ObserverId) -> mpsc::Receiver<Event> {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let observer = Observer {
            topics: HashSet::new(),
            sender,
        };
        info!(observer_id = %observer_id, "Observer connected");
        self.observers.write().await.insert(observer_id, observer);
        receiver
    }

    /// Replace the observer's subscription.
    pub async fn subscribe(
        &self,
        observer_id: &ObserverId,
        topics: impl IntoIterator<Item = Topic>,
    ) -> Result<Vec<Topic>, CoordinatorError> {
        let mut observers = self.observers.write().await;
        let observer = observers
            .get_mut(observer_id)
            .ok_or_else(|| CoordinatorError::NotFound(format!("observer {}", observer_id)))?;
        observer.topics = topics.into_iter().collect();

        let mut subscribed: Vec<Topic> = observer.topics.iter().copied().collect();
        subscribed.sort_by_key(|t| t.as_str());
        debug!(observer_id = %observer_id, topics = ?subscribed, "Observer subscribed");
        Ok(subscribed)
    }

    /// Clear the observer's subscription. It stays connected.
    pub async fn unsubscribe(&self, observer_id: &ObserverId) -> Result<(), CoordinatorError> {
        let mut observers = self.observers.write().await;
        let observer = observers
            .get_mut(observer_id)
            .ok_or_else(|| CoordinatorError::NotFound(format!("observer {}", observer_id)))?;
        observer.topics.clear();
        Ok(())
    }

    /// Forget an observer. Unknown ids are ignored.
    pub async fn disconnect(&self, observer_id: &ObserverId) {
        if self.observers.write().await.remove(observer_id).is_some() {
            info!(observer_id = %observer_id, "Observer disconnected");
        }
    }

    /// Deliver an event to every observer subscribed to its topic.
    ///
    /// Returns the number of observers the event was queued for.
    pub async fn publish(&self, event: Event) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let observers = self.observers.read().await;
            for (id, observer) in observers.iter() {
                if !event.topic.accepted_by(&observer.topics) {
                    continue;
                }
                match observer.sender.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(observer_id = %id, event_type = ?event.kind, "Observer queue full, dropping event");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(id.clone()),
                }
            }
        }

        if !closed.is_empty() {
            let mut observers = self.observers.write().await;
            for id in closed {
                observers.remove(&id);
                debug!(observer_id = %id, "Pruned closed observer");
            }
        }

        if self.history_len > 0 {
            let mut history = self.history.write().await;
            if history.len() == self.history_len {
                history.pop_front();
            }
            history.push_back(event);
        }
        delivered
    }

    /// Up to `limit` most recent events, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<Event> {
        self.history
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }
}
