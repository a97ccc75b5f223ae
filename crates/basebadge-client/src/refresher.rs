//! Dependent State Refresher
//!
//! Keeps everything derived from the recorded score in step with the chain:
//! the latest confirmed result, the dashboard history and the badge list.
//! Only on-chain reads feed this state.

use basebadge_types::{Badge, DashboardSummary, ScoreSnapshot, TrustScoreResult};
use ethers::types::Address;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::AuthSessionManager;
use crate::backend::BackendApi;
use crate::events::{BadgeEvent, EventBus};

/// History entries kept for the dashboard
pub const HISTORY_LIMIT: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("Transaction succeeded but reading the on-chain score failed: {0}. Please refresh.")]
    OnchainReadFailed(String),

    #[error("Failed to load on-chain data: {0}")]
    DashboardLoadFailed(String),
}

/// Score-derived view state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    pub last_result: Option<TrustScoreResult>,
    pub last_scores: Option<ScoreSnapshot>,
    pub history: Vec<ScoreSnapshot>,
    pub badges: Vec<Badge>,
}

impl DashboardState {
    fn push_snapshot(&mut self, snapshot: ScoreSnapshot) {
        self.last_scores = Some(snapshot.clone());
        self.history.push(snapshot);
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }

    fn apply_summary(&mut self, summary: &DashboardSummary) {
        self.last_scores = summary.last_scores.clone();
        let start = summary.score_history.len().saturating_sub(HISTORY_LIMIT);
        self.history = summary.score_history[start..].to_vec();
        if !summary.badges.is_empty() {
            self.badges = summary.badges.clone();
        }
    }
}

#[derive(Clone)]
pub struct DependentStateRefresher {
    backend: Arc<dyn BackendApi>,
    auth: AuthSessionManager,
    events: EventBus,
    state: Arc<RwLock<DashboardState>>,
}

impl DependentStateRefresher {
    pub fn new(backend: Arc<dyn BackendApi>, auth: AuthSessionManager, events: EventBus) -> Self {
        Self {
            backend,
            auth,
            events,
            state: Arc::new(RwLock::new(DashboardState::default())),
        }
    }

    pub fn state(&self) -> DashboardState {
        self.state.read().clone()
    }

    pub fn clear(&self) {
        *self.state.write() = DashboardState::default();
    }

    /// Re-read the recorded score after a confirmed submission and refresh
    /// badges and the dashboard summary.
    ///
    /// Only the on-chain read is required; badge and summary failures are
    /// logged and leave the previous values in place.
    pub async fn on_submission_confirmed(
        &self,
        address: Address,
    ) -> Result<TrustScoreResult, RefreshError> {
        let token = self.auth.bearer();

        let result = self
            .backend
            .onchain_score(address, token.as_deref())
            .await
            .map_err(|e| {
                warn!("On-chain score read failed for {:?}: {}", address, e);
                RefreshError::OnchainReadFailed(e.to_string())
            })?;

        info!(
            "Recorded score for {:?}: {} (base {}, security {})",
            address, result.total_score, result.base_score, result.security_score
        );
        {
            let mut state = self.state.write();
            state.push_snapshot(result.snapshot(snapshot_date(&result)));
            state.last_result = Some(result.clone());
        }
        self.events.publish(BadgeEvent::ScoreConfirmed(result.clone()));

        match self.backend.badges(address, token.as_deref()).await {
            Ok(badges) => {
                debug!("{} badges for {:?}", badges.len(), address);
                self.state.write().badges = badges.clone();
                self.events.publish(BadgeEvent::BadgesUpdated(badges));
            }
            Err(e) => warn!("Badge refresh failed: {}", e),
        }

        match self.backend.dashboard_summary(address, token.as_deref()).await {
            Ok(summary) => {
                if summary.has_score() {
                    self.state.write().apply_summary(&summary);
                }
                self.events.publish(BadgeEvent::DashboardRefreshed(summary));
            }
            Err(e) => warn!("Dashboard summary refresh failed: {}", e),
        }

        Ok(result)
    }

    /// Initial dashboard load for a newly connected wallet.
    ///
    /// A summary without a recorded score clears the state.
    pub async fn load_dashboard(&self, address: Address) -> Result<DashboardState, RefreshError> {
        let token = self.auth.bearer();
        let summary = match self
            .backend
            .dashboard_summary(address, token.as_deref())
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Dashboard load failed for {:?}: {}", address, e);
                self.clear();
                return Err(RefreshError::DashboardLoadFailed(e.to_string()));
            }
        };

        if !summary.has_score() {
            debug!("No recorded score for {:?}", address);
            self.clear();
        } else {
            let mut state = DashboardState::default();
            state.apply_summary(&summary);
            *self.state.write() = state;
        }
        self.events.publish(BadgeEvent::DashboardRefreshed(summary));

        Ok(self.state())
    }
}

fn snapshot_date(result: &TrustScoreResult) -> String {
    let seconds = result.timestamp.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    });
    seconds.to_string()
}
