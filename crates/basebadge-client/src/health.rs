//! Backend liveness probe

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::BackendApi;
use crate::events::{BadgeEvent, EventBus};

/// Polls `/stats` and reports online/offline transitions
pub struct HealthProbe {
    status: watch::Receiver<Option<bool>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl HealthProbe {
    pub fn spawn(backend: Arc<dyn BackendApi>, interval: Duration, events: EventBus) -> Self {
        let (tx, status) = watch::channel(None);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let online = match backend.stats().await {
                            Ok(()) => true,
                            Err(e) => {
                                debug!("Liveness probe failed: {}", e);
                                false
                            }
                        };

                        let changed = tx.send_if_modified(|current| {
                            if *current == Some(online) {
                                return false;
                            }
                            *current = Some(online);
                            true
                        });
                        if changed {
                            if online {
                                info!("Backend online");
                            } else {
                                warn!("Backend offline");
                            }
                            events.publish(BadgeEvent::BackendStatusChanged { online });
                        }
                    }
                }
            }
            debug!("Health probe stopped");
        });

        Self {
            status,
            cancel,
            task: Some(task),
        }
    }

    /// `None` until the first probe completes
    pub fn status(&self) -> Option<bool> {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<bool>> {
        self.status.clone()
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for HealthProbe {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    #[tokio::test(start_paused = true)]
    async fn test_reports_transitions_only() {
        let backend = Arc::new(FakeBackend::new());
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let probe = HealthProbe::spawn(backend.clone(), Duration::from_secs(5), events);
        let mut status = probe.subscribe();

        status.changed().await.unwrap();
        assert_eq!(probe.status(), Some(true));

        tokio::time::sleep(Duration::from_secs(12)).await;
        backend.set_online(false);
        status.changed().await.unwrap();
        assert_eq!(*status.borrow_and_update(), Some(false));

        probe.shutdown().await;

        assert_eq!(
            rx.try_recv().unwrap(),
            BadgeEvent::BackendStatusChanged { online: true }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            BadgeEvent::BackendStatusChanged { online: false }
        );
        assert!(rx.try_recv().is_err());
    }
}
