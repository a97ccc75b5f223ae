//! Cooldown Oracle
//!
//! Projection of the contract's submission cooldown. The chain is the only
//! source of truth: a local one-second countdown only drives the display
//! between reads, and reaching zero triggers a fresh `canSubmitScore` read
//! instead of unlocking anything on its own.

use basebadge_chain::{ChainError, ScoreChecker};
use basebadge_types::CooldownState;
use ethers::types::Address;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::{BadgeEvent, EventBus};

#[derive(Default)]
struct Countdown {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

struct CooldownInner {
    checker: Arc<dyn ScoreChecker>,
    events: EventBus,
    tick: Duration,
    state: watch::Sender<CooldownState>,
    countdown: Mutex<Countdown>,
}

#[derive(Clone)]
pub struct CooldownOracle {
    inner: Arc<CooldownInner>,
}

impl CooldownOracle {
    pub fn new(checker: Arc<dyn ScoreChecker>, events: EventBus) -> Self {
        Self::with_tick(checker, events, Duration::from_secs(1))
    }

    pub fn with_tick(checker: Arc<dyn ScoreChecker>, events: EventBus, tick: Duration) -> Self {
        Self {
            inner: Arc::new(CooldownInner {
                checker,
                events,
                tick,
                state: watch::channel(CooldownState::default()).0,
                countdown: Mutex::new(Countdown::default()),
            }),
        }
    }

    /// Last projected state
    pub fn snapshot(&self) -> CooldownState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CooldownState> {
        self.inner.state.subscribe()
    }

    /// Read `canSubmitScore` for `address` and restart the countdown from it.
    ///
    /// A read that fails leaves the previous projection untouched.
    pub async fn refresh(&self, address: Address) -> Result<CooldownState, ChainError> {
        let (can_submit, remaining_seconds) = self
            .inner
            .checker
            .can_submit_score(address)
            .await
            .map_err(|e| {
                warn!("canSubmitScore read failed for {:?}: {}", address, e);
                e
            })?;

        let state = CooldownState::new(can_submit, remaining_seconds);
        debug!("Cooldown for {:?}: {:?}", address, state);
        self.apply(address, state);
        Ok(state)
    }

    /// Stop the countdown, e.g. when the wallet disconnects
    pub fn cancel(&self) {
        let mut countdown = self.inner.countdown.lock();
        countdown.generation += 1;
        if let Some(task) = countdown.task.take() {
            task.abort();
        }
    }

    fn apply(&self, address: Address, state: CooldownState) {
        let mut countdown = self.inner.countdown.lock();
        countdown.generation += 1;
        if let Some(task) = countdown.task.take() {
            task.abort();
        }

        self.publish(state);
        if state.needs_countdown() {
            countdown.task = Some(self.spawn_countdown(address, countdown.generation));
        }
    }

    fn publish(&self, state: CooldownState) {
        self.inner.state.send_replace(state);
        self.inner.events.publish(BadgeEvent::CooldownUpdated(state));
    }

    fn spawn_countdown(&self, address: Address, generation: u64) -> JoinHandle<()> {
        let oracle = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(oracle.inner.tick).await;

                let expired = {
                    let countdown = oracle.inner.countdown.lock();
                    if countdown.generation != generation {
                        return;
                    }
                    let mut next = oracle.snapshot();
                    next.remaining_seconds = next.remaining_seconds.saturating_sub(1);
                    let expired = next.remaining_seconds == 0;
                    if expired {
                        next.can_submit = true;
                    }
                    oracle.publish(next);
                    drop(countdown);
                    expired
                };

                if expired {
                    debug!("Cooldown elapsed for {:?}, re-reading contract", address);
                    let reader = oracle.clone();
                    tokio::spawn(async move {
                        if let Err(e) = reader.refresh(address).await {
                            warn!("Cooldown re-read failed: {}", e);
                        }
                    });
                    return;
                }
            }
        })
    }
}
