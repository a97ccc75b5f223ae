//! Score Submission Orchestrator
//!
//! Drives one "check score" attempt from the cooldown check through the
//! signed contract call to the receipt:
//!
//! ```text
//! Idle -> FetchingScore -> Signing -> SubmittingTx -> PendingReceipt
//!      -> Confirming -> Succeeded | Failed
//! ```
//!
//! At most one attempt is in flight. The computed score is held only as
//! submission input; the displayed result always comes from the on-chain
//! re-read after the receipt confirms.

use basebadge_chain::{ChainError, ReceiptStatus, ScoreChecker, WalletConnector};
use basebadge_crypto::{normalize_signature, ScoreCardCrypto};
use basebadge_types::{format_wait, ComputedScore, SignCardRequest, SignedScoreCard, TrustScoreResult};
use ethers::types::{Address, H256, U256};
use ethers::utils::to_checksum;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::auth::{AuthError, AuthSessionManager};
use crate::backend::BackendApi;
use crate::chain_gate::ChainGate;
use crate::cooldown::CooldownOracle;
use crate::events::{BadgeEvent, EventBus};
use crate::refresher::{DependentStateRefresher, RefreshError};

/// Submission lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    #[default]
    Idle,
    FetchingScore,
    Signing,
    SubmittingTx,
    /// Transaction hash known, receipt watcher not yet attached
    PendingReceipt,
    /// Waiting for the receipt
    Confirming,
    Succeeded,
    Failed,
}

impl Lifecycle {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Lifecycle::Succeeded | Lifecycle::Failed)
    }

    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal() && *self != Lifecycle::Idle
    }
}

fn wait_label(seconds: &u64) -> String {
    format_wait(*seconds)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("Please wait {} before checking again", wait_label(.0))]
    CooldownActive(u64),

    #[error("Could not read the submission cooldown: {0}")]
    CooldownUnavailable(String),

    #[error("Fetching fee...")]
    FeeUnavailable,

    #[error("Failed to fetch trust score: {0}")]
    ScoreFetchFailed(String),

    #[error("Failed to sign score card: {0}")]
    SigningFailed(String),

    #[error("Transaction rejected in wallet")]
    UserRejected,

    #[error("Transaction failed, please try again: {0}")]
    TransactionFailed(String),

    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("Sign-in required: {0}")]
    Unauthenticated(AuthError),
}

impl SubmissionError {
    /// Message for the user; a declined transaction shows nothing
    pub fn user_message(&self) -> Option<String> {
        match self {
            SubmissionError::UserRejected => None,
            other => Some(other.to_string()),
        }
    }
}

/// Outcome of a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Transaction broadcast; the receipt is watched in the background
    Submitted(H256),
    /// Another attempt is already in flight
    Ignored,
}

#[derive(Debug, Default)]
struct Attempt {
    pending_score: Option<ComputedScore>,
    signed_card: Option<SignedScoreCard>,
    tx_hash: Option<H256>,
    last_error: Option<SubmissionError>,
    last_result: Option<TrustScoreResult>,
    refresh_error: Option<RefreshError>,
}

/// Collaborators of the orchestrator
pub struct OrchestratorDeps {
    pub wallet: Arc<dyn WalletConnector>,
    pub checker: Arc<dyn ScoreChecker>,
    pub backend: Arc<dyn BackendApi>,
    pub auth: AuthSessionManager,
    pub gate: ChainGate,
    pub cooldown: CooldownOracle,
    pub refresher: DependentStateRefresher,
    pub events: EventBus,
    pub card_crypto: ScoreCardCrypto,
    /// When set, cards not signed by this address are refused
    pub authorized_signer: Option<Address>,
}

struct Inner {
    deps: OrchestratorDeps,
    permit: Arc<Semaphore>,
    fee: Mutex<Option<U256>>,
    attempt: Mutex<Attempt>,
    lifecycle: watch::Sender<Lifecycle>,
}

#[derive(Clone)]
pub struct ScoreOrchestrator {
    inner: Arc<Inner>,
}

impl ScoreOrchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps,
                permit: Arc::new(Semaphore::new(1)),
                fee: Mutex::new(None),
                attempt: Mutex::new(Attempt::default()),
                lifecycle: watch::channel(Lifecycle::Idle).0,
            }),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.inner.lifecycle.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Lifecycle> {
        self.inner.lifecycle.subscribe()
    }

    pub fn last_error(&self) -> Option<SubmissionError> {
        self.inner.attempt.lock().last_error.clone()
    }

    /// Latest on-chain confirmed result of this client's submissions
    pub fn last_result(&self) -> Option<TrustScoreResult> {
        self.inner.attempt.lock().last_result.clone()
    }

    pub fn refresh_error(&self) -> Option<RefreshError> {
        self.inner.attempt.lock().refresh_error.clone()
    }

    pub fn tracked_hash(&self) -> Option<H256> {
        self.inner.attempt.lock().tx_hash
    }

    /// Whether a computed score is held for an in-flight submission
    pub fn has_pending_score(&self) -> bool {
        self.inner.attempt.lock().pending_score.is_some()
    }

    /// Cached submission fee in wei
    pub fn fee(&self) -> Option<U256> {
        *self.inner.fee.lock()
    }

    /// Read the submission fee from the contract and cache it
    pub async fn load_fee(&self) -> Result<U256, SubmissionError> {
        match self.inner.deps.checker.check_fee().await {
            Ok(fee) => {
                debug!("Submission fee: {} wei", fee);
                *self.inner.fee.lock() = Some(fee);
                Ok(fee)
            }
            Err(e) => {
                warn!("checkFee read failed: {}", e);
                Err(SubmissionError::FeeUnavailable)
            }
        }
    }

    async fn ensure_fee(&self) -> Result<U256, SubmissionError> {
        match self.fee() {
            Some(fee) => Ok(fee),
            None => self.load_fee().await,
        }
    }

    /// Whether a new attempt would be accepted right now
    pub fn can_retry(&self) -> bool {
        if self.inner.permit.available_permits() == 0 {
            return false;
        }
        match self.last_error() {
            Some(SubmissionError::CooldownActive(_)) => {
                self.inner.deps.cooldown.snapshot().is_open()
            }
            _ => true,
        }
    }

    /// Return a settled attempt to idle
    pub fn reset(&self) {
        if self.inner.permit.available_permits() == 0 {
            return;
        }
        {
            let mut attempt = self.inner.attempt.lock();
            attempt.last_error = None;
            attempt.refresh_error = None;
        }
        self.set_lifecycle(Lifecycle::Idle);
    }

    /// Wait until the current attempt settles
    pub async fn wait_terminal(&self) -> Lifecycle {
        let mut rx = self.subscribe();
        loop {
            let current = *rx.borrow_and_update();
            if !current.is_in_flight() {
                return current;
            }
            if rx.changed().await.is_err() {
                return current;
            }
        }
    }

    /// Start a score check for the connected wallet.
    ///
    /// Returns once the transaction is broadcast; the receipt is awaited in
    /// the background and the lifecycle moves to `Succeeded` or `Failed`.
    /// A trigger while an attempt is in flight is ignored.
    pub async fn check_score(&self) -> Result<Trigger, SubmissionError> {
        let permit = match self.inner.permit.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!("Submission already in flight, ignoring trigger");
                return Ok(Trigger::Ignored);
            }
        };

        let Some(address) = self.inner.deps.wallet.address() else {
            self.settle(permit, Lifecycle::Idle, |attempt| {
                attempt.pending_score = None;
                attempt.refresh_error = None;
                attempt.last_error = Some(SubmissionError::WalletNotConnected);
            });
            return Err(SubmissionError::WalletNotConnected);
        };

        let token = match self.inner.deps.auth.session() {
            Some(session) => session.token,
            None => {
                info!("No session for {:?}, signing in first", address);
                match self.inner.deps.auth.login().await {
                    Ok(session) => session.token,
                    Err(e) => {
                        let error = SubmissionError::Unauthenticated(e);
                        self.fail(error.clone(), permit);
                        return Err(error);
                    }
                }
            }
        };

        self.begin_attempt();
        match self.prepare_and_send(address, &token).await {
            Ok(tx_hash) => {
                self.spawn_receipt_watcher(address, tx_hash, permit);
                Ok(Trigger::Submitted(tx_hash))
            }
            Err(error) => {
                self.fail(error.clone(), permit);
                Err(error)
            }
        }
    }

    fn begin_attempt(&self) {
        {
            let mut attempt = self.inner.attempt.lock();
            attempt.pending_score = None;
            attempt.signed_card = None;
            attempt.last_error = None;
            attempt.last_result = None;
            attempt.refresh_error = None;
        }
        self.set_lifecycle(Lifecycle::Idle);
        self.set_lifecycle(Lifecycle::FetchingScore);
    }

    async fn prepare_and_send(&self, address: Address, token: &str) -> Result<H256, SubmissionError> {
        let deps = &self.inner.deps;

        if let Err(e) = deps.gate.ensure_chain().await {
            warn!("Network switch failed, continuing: {}", e);
        }

        let cooldown = deps
            .cooldown
            .refresh(address)
            .await
            .map_err(|e| SubmissionError::CooldownUnavailable(e.to_string()))?;
        if !cooldown.is_open() {
            info!(
                "Cooldown active for {:?}: {}s remaining",
                address, cooldown.remaining_seconds
            );
            return Err(SubmissionError::CooldownActive(cooldown.remaining_seconds));
        }

        let fee = self.ensure_fee().await?;

        let score = deps
            .backend
            .score(address, Some(token))
            .await
            .map_err(|e| SubmissionError::ScoreFetchFailed(e.to_string()))?;
        debug!("Computed score for {:?}: {}", address, score.total_score);
        let request = SignCardRequest::from_score(to_checksum(&address, None), &score);
        self.inner.attempt.lock().pending_score = Some(score);

        self.set_lifecycle(Lifecycle::Signing);
        let mut card = deps
            .backend
            .sign_card(&request, Some(token))
            .await
            .map_err(|e| SubmissionError::SigningFailed(e.to_string()))?;
        card.signature = normalize_signature(&card.signature);

        if let Some(signer) = deps.authorized_signer {
            deps.card_crypto
                .verify_signer(address, &card, signer)
                .map_err(|e| SubmissionError::SigningFailed(e.to_string()))?;
        }
        self.inner.attempt.lock().signed_card = Some(card.clone());

        self.set_lifecycle(Lifecycle::SubmittingTx);
        if let Err(e) = deps.gate.ensure_chain().await {
            debug!("Pre-send network switch failed: {}", e);
        }

        let tx_hash = match deps.checker.submit_score_card(&card, fee).await {
            Ok(tx_hash) => tx_hash,
            Err(ChainError::UserRejected(message)) => {
                info!("Submission declined in wallet: {}", message);
                return Err(SubmissionError::UserRejected);
            }
            Err(e) => return Err(SubmissionError::TransactionFailed(e.to_string())),
        };

        info!("Score card submitted: {:?}", tx_hash);
        self.inner.attempt.lock().tx_hash = Some(tx_hash);
        self.set_lifecycle(Lifecycle::PendingReceipt);
        Ok(tx_hash)
    }

    fn spawn_receipt_watcher(&self, address: Address, tx_hash: H256, permit: OwnedSemaphorePermit) {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.set_lifecycle(Lifecycle::Confirming);
            let receipt = orchestrator
                .inner
                .deps
                .checker
                .wait_for_receipt(tx_hash)
                .await;

            if orchestrator.tracked_hash() != Some(tx_hash) {
                debug!("Ignoring receipt of superseded transaction {:?}", tx_hash);
                return;
            }

            match receipt {
                Ok(ReceiptStatus::Confirmed { block_number }) => {
                    info!("{:?} confirmed in block {:?}", tx_hash, block_number);
                    orchestrator.on_confirmed(address, permit).await;
                }
                Ok(ReceiptStatus::Reverted) => {
                    error!("{:?} reverted", tx_hash);
                    orchestrator.fail(
                        SubmissionError::TransactionFailed("transaction reverted".to_string()),
                        permit,
                    );
                }
                Ok(ReceiptStatus::Dropped) => {
                    error!("{:?} was dropped", tx_hash);
                    orchestrator.fail(
                        SubmissionError::TransactionFailed("transaction dropped".to_string()),
                        permit,
                    );
                }
                Err(e) => {
                    error!("Waiting for {:?} failed: {}", tx_hash, e);
                    orchestrator.fail(SubmissionError::TransactionFailed(e.to_string()), permit);
                }
            }
        });
    }

    async fn on_confirmed(&self, address: Address, permit: OwnedSemaphorePermit) {
        let deps = &self.inner.deps;
        let refreshed = deps.refresher.on_submission_confirmed(address).await;

        if let Err(e) = deps.cooldown.refresh(address).await {
            warn!("Cooldown refresh after confirmation failed: {}", e);
        }

        self.settle(permit, Lifecycle::Succeeded, |attempt| {
            attempt.pending_score = None;
            match refreshed {
                Ok(result) => attempt.last_result = Some(result),
                Err(e) => attempt.refresh_error = Some(e),
            }
        });
    }

    fn fail(&self, error: SubmissionError, permit: OwnedSemaphorePermit) {
        if let Some(message) = error.user_message() {
            warn!("Score check failed: {}", message);
        }
        self.settle(permit, Lifecycle::Failed, |attempt| {
            attempt.pending_score = None;
            attempt.last_error = Some(error);
        });
    }

    /// End the attempt. The permit is released before `next` is published,
    /// and the attempt lock is held across both so a new attempt cannot
    /// start in between.
    fn settle(
        &self,
        permit: OwnedSemaphorePermit,
        next: Lifecycle,
        update: impl FnOnce(&mut Attempt),
    ) {
        let mut attempt = self.inner.attempt.lock();
        update(&mut attempt);
        drop(permit);
        self.set_lifecycle(next);
    }

    fn set_lifecycle(&self, next: Lifecycle) {
        let previous = self.inner.lifecycle.send_replace(next);
        if previous != next {
            debug!("Submission {:?} -> {:?}", previous, next);
            self.inner
                .deps
                .events
                .publish(BadgeEvent::SubmissionStateChanged(next));
        }
    }
}
