//! Client Event Bus
//!
//! Broadcasts state changes to whatever views are attached. Components
//! publish without knowing who listens; a bus with no subscribers drops
//! events.

use basebadge_types::{Badge, CooldownState, DashboardSummary, TrustScoreResult};
use ethers::types::Address;
use tokio::sync::broadcast;
use tracing::trace;

use crate::orchestrator::Lifecycle;

/// Events emitted by the client
#[derive(Debug, Clone, PartialEq)]
pub enum BadgeEvent {
    SessionStarted {
        address: Address,
    },
    SessionEnded,
    /// The wallet account changed away from the session owner
    SessionInvalidated {
        previous: Address,
        current: Option<Address>,
    },
    CooldownUpdated(CooldownState),
    SubmissionStateChanged(Lifecycle),
    ScoreConfirmed(TrustScoreResult),
    BadgesUpdated(Vec<Badge>),
    DashboardRefreshed(DashboardSummary),
    BackendStatusChanged {
        online: bool,
    },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BadgeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: BadgeEvent) {
        if let Err(broadcast::error::SendError(event)) = self.sender.send(event) {
            trace!("No subscribers for {:?}", event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BadgeEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(BadgeEvent::SessionEnded);
        bus.publish(BadgeEvent::BackendStatusChanged { online: false });

        assert_eq!(rx.recv().await.unwrap(), BadgeEvent::SessionEnded);
        assert_eq!(
            rx.recv().await.unwrap(),
            BadgeEvent::BackendStatusChanged { online: false }
        );
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(0);
        bus.publish(BadgeEvent::SessionEnded);
    }
}
