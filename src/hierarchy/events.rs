use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{EntityId, NodeRef, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProvisionEventKind {
    UserCreated { user_id: UserId, email: String, node: NodeRef },
    UserRehomed { user_id: UserId, email: String, node: NodeRef },
    EntityCreated { entity_id: EntityId, name: String },
    DivisionCreated { division_id: i64, entity_id: EntityId, name: String },
    NodeDeleted { node: NodeRef, users: u64 },
}

/// Completion signal emitted after a provisioning write commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionEvent {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ProvisionEventKind,
}

impl ProvisionEvent {
    pub fn new(kind: ProvisionEventKind) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            kind,
        }
    }
}

/// Consumer of provisioning completion signals (mailers, queues)
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: ProvisionEvent);
}

/// Fan-out sink; events with no subscriber are dropped
pub struct BroadcastSink {
    sender: broadcast::Sender<ProvisionEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProvisionEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventSink for BroadcastSink {
    async fn publish(&self, event: ProvisionEvent) {
        tracing::debug!("publishing provision event {}", event.event_id);
        if self.sender.send(event).is_err() {
            tracing::trace!("no subscribers for provision event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let sink = BroadcastSink::new(4);
        let mut rx = sink.subscribe();

        sink.publish(ProvisionEvent::new(ProvisionEventKind::EntityCreated {
            entity_id: 3,
            name: "North Campus".to_string(),
        }))
        .await;

        let event = rx.recv().await.unwrap();
        assert!(matches!(event.kind, ProvisionEventKind::EntityCreated { entity_id: 3, .. }));
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_silent() {
        let sink = BroadcastSink::default();
        sink.publish(ProvisionEvent::new(ProvisionEventKind::NodeDeleted {
            node: NodeRef::Entity(1),
            users: 0,
        }))
        .await;
    }

    #[test]
    fn events_serialize_flat() {
        let event = ProvisionEvent::new(ProvisionEventKind::UserCreated {
            user_id: 8,
            email: "a@b.org".to_string(),
            node: NodeRef::Division(4),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "user_created");
        assert_eq!(json["node"]["tier"], "division");
    }
}
