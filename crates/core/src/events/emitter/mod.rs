//! Event emitter for publishing and managing events

use crate::events::subscriber::{EnhancedEvent, EventSubscriber};
use crate::events::types::SystemEvent;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error};

/// Event emitter for publishing events
///
/// One emitter is handed to the executor per run; nothing here is global.
pub struct EventEmitter {
    /// Event channel sender
    sender: broadcast::Sender<EnhancedEvent>,
    /// Registered subscribers
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
    /// Event correlation context
    correlation_context: RwLock<BTreeMap<String, String>>,
}

impl EventEmitter {
    /// Create a new event emitter with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            subscribers: RwLock::new(Vec::new()),
            correlation_context: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add a subscriber
    pub async fn add_subscriber(&self, subscriber: Arc<dyn EventSubscriber>) {
        debug!("Event subscriber added: {}", subscriber.name());
        self.subscribers.write().await.push(subscriber);
    }

    /// Remove a subscriber by name
    pub async fn remove_subscriber(&self, name: &str) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let initial_len = subscribers.len();
        subscribers.retain(|s| s.name() != name);
        let removed = subscribers.len() != initial_len;
        if removed {
            debug!("Event subscriber removed: {}", name);
        }
        removed
    }

    /// Set correlation context for subsequent events
    pub async fn set_correlation_context(&self, context: BTreeMap<String, String>) {
        *self.correlation_context.write().await = context;
    }

    /// Clear correlation context
    pub async fn clear_correlation_context(&self) {
        self.correlation_context.write().await.clear();
    }

    /// Emit an event to all interested subscribers
    pub async fn emit(&self, event: impl Into<SystemEvent>) {
        self.emit_with_metadata(event.into(), BTreeMap::new()).await;
    }

    /// Emit an event with custom metadata
    pub async fn emit_with_metadata(&self, event: SystemEvent, metadata: BTreeMap<String, String>) {
        let mut combined_metadata = self.correlation_context.read().await.clone();
        let correlation_id = combined_metadata.get("correlation_id").cloned();
        combined_metadata.extend(metadata);

        let enhanced_event = EnhancedEvent {
            event,
            timestamp: Utc::now(),
            correlation_id,
            metadata: combined_metadata,
        };

        // No receivers is not an error
        if let Err(e) = self.sender.send(enhanced_event.clone()) {
            debug!("Failed to send event to broadcast channel: {}", e);
        }

        self.notify_subscribers(&enhanced_event).await;
    }

    /// Notify all interested subscribers in parallel
    async fn notify_subscribers(&self, event: &EnhancedEvent) {
        let subscribers = self.subscribers.read().await;

        let interested_subscribers: Vec<_> = subscribers
            .iter()
            .filter(|subscriber| subscriber.is_interested(&event.event))
            .collect();

        if interested_subscribers.is_empty() {
            return;
        }

        let handles: Vec<_> = interested_subscribers
            .iter()
            .map(|subscriber| {
                let subscriber = Arc::clone(subscriber);
                let event = event.clone();
                async move {
                    if let Err(e) = subscriber.handle_event(&event).await {
                        error!(
                            subscriber = subscriber.name(),
                            error = %e,
                            "Event subscriber failed to handle event"
                        );
                    }
                }
            })
            .collect();

        futures::future::join_all(handles).await;
    }

    /// Get the number of registered subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Create a receiver for the broadcast channel
    pub fn subscribe(&self) -> broadcast::Receiver<EnhancedEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(1024)
    }
}
