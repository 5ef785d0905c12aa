//! Event publishers
//!
//! `LoggingEventPublisher` turns each domain event into one structured log
//! line. `InMemoryEventCollector` keeps them for assertions in tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::domain::events::DomainEvent;
use crate::domain::ports::EventPublisher;
use crate::error::{Error, Result};

/// Logs domain events.
///
/// Directory changes are logged at `info`. Ignored requests go to `debug`
/// because every node sees every claim and most of them are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventPublisher;

impl LoggingEventPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        let payload = serde_json::to_string(&event).map_err(|e| {
            Error::Internal(format!("cannot encode {} event: {}", event.event_type(), e))
        })?;

        match event {
            DomainEvent::DirectoryCreated { .. } | DomainEvent::DirectoryRemoved { .. } => info!(
                kind = event.event_type(),
                volume = event.volume_name(),
                payload = %payload,
                "Volume directory changed"
            ),
            DomainEvent::ProvisionIgnored { .. } | DomainEvent::DeleteIgnored { .. } => debug!(
                kind = event.event_type(),
                volume = event.volume_name(),
                payload = %payload,
                "Volume request ignored"
            ),
        }

        Ok(())
    }
}

/// Records published events in order.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    events: Mutex<Vec<DomainEvent>>,
}

impl InMemoryEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far.
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Events whose [`DomainEvent::event_type`] is `kind`.
    pub fn events_of_type(&self, kind: &str) -> Vec<DomainEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.event_type() == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, event: DomainEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeName;
    use std::path::Path;

    #[tokio::test]
    async fn test_logging_publisher_accepts_every_kind() {
        let node = NodeName::new("worker-1").unwrap();
        let publisher = LoggingEventPublisher::new();

        let local = Path::new("/mnt/data/fast/pvc-1");
        tokio_test::assert_ok!(
            publisher
                .publish(DomainEvent::directory_created("pvc-1", &node, "/data/fast/pvc-1", local))
                .await
        );
        tokio_test::assert_ok!(
            publisher.publish(DomainEvent::directory_removed("pvc-1", &node, local)).await
        );
        tokio_test::assert_ok!(
            publisher.publish(DomainEvent::provision_ignored("pvc-2", &node, "not ours")).await
        );
        tokio_test::assert_ok!(
            publisher.publish(DomainEvent::delete_ignored("pvc-3", &node, "not ours")).await
        );
    }

    #[tokio::test]
    async fn test_collector_keeps_publish_order() {
        let node = NodeName::new("worker-1").unwrap();
        let collector = InMemoryEventCollector::new();
        assert!(collector.is_empty());

        for (volume, ignored) in [("pvc-1", true), ("pvc-2", false), ("pvc-3", true)] {
            let event = if ignored {
                DomainEvent::provision_ignored(volume, &node, "not ours")
            } else {
                DomainEvent::delete_ignored(volume, &node, "not ours")
            };
            collector.publish(event).await.unwrap();
        }

        assert_eq!(collector.len(), 3);
        let names: Vec<_> = collector
            .events()
            .iter()
            .map(|event| event.volume_name().to_string())
            .collect();
        assert_eq!(names, ["pvc-1", "pvc-2", "pvc-3"]);
        assert_eq!(collector.events_of_type("ProvisionIgnored").len(), 2);
        assert_eq!(collector.events_of_type("DeleteIgnored").len(), 1);
    }
}
