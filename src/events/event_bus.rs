use super::types::{EventPriority, SyncEvent, SyncEventPayload, SyncEventType};
use crate::models::{GlobalId, SourceKey, SourceType, SyncMode};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::trace;

/// Event subscriber handle
pub struct EventSubscriber {
    receiver: broadcast::Receiver<SyncEvent>,
    filter: Option<EventFilter>,
}

impl EventSubscriber {
    pub fn new(receiver: broadcast::Receiver<SyncEvent>, filter: Option<EventFilter>) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next event matching the filter
    pub async fn recv(&mut self) -> Result<SyncEvent> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Try to receive without blocking
    pub fn try_recv(&mut self) -> Result<Option<SyncEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn accepts(&self, event: &SyncEvent) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(event))
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    event_types: Option<Vec<SyncEventType>>,
    sources: Option<Vec<SourceType>>,
    min_priority: Option<EventPriority>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(mut self, types: Vec<SyncEventType>) -> Self {
        self.event_types = Some(types);
        self
    }

    pub fn with_sources(mut self, sources: Vec<SourceType>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn with_min_priority(mut self, priority: EventPriority) -> Self {
        self.min_priority = Some(priority);
        self
    }

    pub fn matches(&self, event: &SyncEvent) -> bool {
        if let Some(ref types) = self.event_types
            && !types.contains(&event.event_type)
        {
            return false;
        }

        if let Some(ref sources) = self.sources
            && !sources.contains(&event.source_type)
        {
            return false;
        }

        if let Some(min_priority) = self.min_priority
            && event.priority < min_priority
        {
            return false;
        }

        true
    }
}

/// Broadcast channel for sync engine events, with a short history for debugging
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
    stats: Arc<RwLock<EventBusStats>>,
    event_history: Arc<RwLock<Vec<SyncEvent>>>,
    max_history_size: usize,
}

#[derive(Debug, Default, Clone)]
pub struct EventBusStats {
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    pub subscriber_count: usize,
    pub dropped_events: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);

        Self {
            sender,
            stats: Arc::new(RwLock::new(EventBusStats::default())),
            event_history: Arc::new(RwLock::new(Vec::new())),
            max_history_size: 100,
        }
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: SyncEvent) {
        trace!(
            "Publishing {} for {} with priority {:?}",
            event.event_type.as_str(),
            event.source_type,
            event.priority
        );

        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type.as_str().to_string())
                .or_insert(0) += 1;
        }

        {
            let mut history = self.event_history.write().await;
            history.push(event.clone());
            if history.len() > self.max_history_size {
                let excess = history.len() - self.max_history_size;
                history.drain(0..excess);
            }
        }

        // No subscribers is normal
        if self.sender.send(event).is_err() {
            self.stats.write().await.dropped_events += 1;
        }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), None)
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), Some(filter))
    }

    pub fn subscribe_to_source(&self, source_type: SourceType) -> EventSubscriber {
        self.subscribe_filtered(EventFilter::new().with_sources(vec![source_type]))
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub async fn get_stats(&self) -> EventBusStats {
        let stats = self.stats.read().await;
        EventBusStats {
            subscriber_count: self.subscriber_count(),
            ..stats.clone()
        }
    }

    pub async fn get_history(&self) -> Vec<SyncEvent> {
        self.event_history.read().await.clone()
    }

    pub async fn clear_history(&self) {
        self.event_history.write().await.clear();
    }

    pub async fn emit_sync(
        &self,
        event_type: SyncEventType,
        source_type: SourceType,
        mode: SyncMode,
        items_synced: usize,
        pages_committed: u32,
        error: Option<String>,
    ) {
        self.publish(SyncEvent::new(
            event_type,
            source_type,
            SyncEventPayload::Sync {
                mode,
                items_synced,
                pages_committed,
                error,
            },
        ))
        .await
    }

    pub async fn emit_sync_deferred(&self, source_type: SourceType, reason: String) {
        self.publish(SyncEvent::new(
            SyncEventType::SyncDeferred,
            source_type,
            SyncEventPayload::Deferred { reason },
        ))
        .await
    }

    pub async fn emit_backlog(
        &self,
        event_type: SyncEventType,
        source_type: SourceType,
        estimated_items: u64,
        processed: usize,
        linked: usize,
        failed: usize,
    ) {
        self.publish(SyncEvent::new(
            event_type,
            source_type,
            SyncEventPayload::Backlog {
                estimated_items,
                processed,
                linked,
                failed,
            },
        ))
        .await
    }

    pub async fn emit_work(
        &self,
        created: bool,
        source_type: SourceType,
        global_id: GlobalId,
        source_key: SourceKey,
    ) {
        let event_type = if created {
            SyncEventType::WorkCreated
        } else {
            SyncEventType::WorkUpdated
        };
        self.publish(SyncEvent::new(
            event_type,
            source_type,
            SyncEventPayload::Work {
                global_id,
                source_key,
            },
        ))
        .await
    }

    pub async fn emit_pruned(
        &self,
        source_type: SourceType,
        works_updated: usize,
        works_deleted: usize,
        refs_deleted: u64,
    ) {
        self.publish(SyncEvent::new(
            SyncEventType::SourcePruned,
            source_type,
            SyncEventPayload::Prune {
                works_updated,
                works_deleted,
                refs_deleted,
            },
        ))
        .await
    }
}
