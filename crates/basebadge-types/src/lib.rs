//! BaseBadge Types
//!
//! Data structures shared by the chain, crypto and client crates: computed
//! and on-chain trust scores, signed score cards, cooldown projections,
//! badges and dashboard summaries.

use serde::{Deserialize, Serialize};

/// Activity metrics of a wallet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseMetrics {
    /// Number of transactions sent
    pub tx_count: u64,
    /// Gas paid (ETH for computed scores, wei for on-chain cards)
    pub gas_used: f64,
    /// Current balance in ETH
    pub current_balance: f64,
    /// Average balance over the last month in ETH
    pub past_balance: f64,
    /// Current daily activity streak
    pub current_streak: u64,
    /// Longest daily activity streak
    pub max_streak: u64,
    /// Wallet age in days
    pub age_days: u64,
    /// Base sub-score
    pub base_score: f64,
}

/// Risk metrics of a wallet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityMetrics {
    /// Suspicious tokens held
    pub risky_tokens: u64,
    /// Suspicious contracts interacted with
    pub risky_contracts: u64,
    /// Dangerous signatures / approvals
    pub risky_signs: u64,
    /// Suspicious NFTs held
    pub suspicious_nfts: u64,
    /// Security sub-score
    pub security_score: f64,
}

/// Score computed off-chain by the backend.
///
/// Held by the submission flow until the chain has recorded it; never shown
/// as a confirmed result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputedScore {
    #[serde(default)]
    pub basename: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub total_score: f64,
    #[serde(default)]
    pub base_score: Option<f64>,
    #[serde(default)]
    pub security_score: Option<f64>,
    #[serde(default)]
    pub base: Option<BaseMetrics>,
    #[serde(default)]
    pub security: Option<SecurityMetrics>,
}

impl ComputedScore {
    /// Base score, falling back to the nested breakdown when the top-level
    /// value is absent or zero
    pub fn effective_base_score(&self) -> f64 {
        first_non_zero(
            self.base_score,
            self.base.as_ref().map(|b| b.base_score),
        )
    }

    /// Security score with the same fallback rule as the base score
    pub fn effective_security_score(&self) -> f64 {
        first_non_zero(
            self.security_score,
            self.security.as_ref().map(|s| s.security_score),
        )
    }
}

fn first_non_zero(primary: Option<f64>, fallback: Option<f64>) -> f64 {
    [primary, fallback]
        .into_iter()
        .flatten()
        .find(|v| *v != 0.0 && v.is_finite())
        .unwrap_or(0.0)
}

/// Query sent to the score-card signer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignCardRequest {
    pub address: String,
    pub total_score: f64,
    pub base_score: f64,
    pub security_score: f64,
    pub tx_count: u64,
    pub current_streak: u64,
    pub max_streak: u64,
    pub current_balance: f64,
    pub avg_balance_last_month: f64,
    pub gas_paid: f64,
    pub suspicious_tokens: u64,
    pub suspicious_contracts: u64,
    pub dangerous_interactions: u64,
    pub suspicious_nfts: u64,
}

impl SignCardRequest {
    /// Normalize a computed score into the signer's query fields.
    ///
    /// Missing sub-metrics become zero; negative or non-finite amounts are
    /// clamped to zero since the signer rejects them.
    pub fn from_score(address: impl Into<String>, score: &ComputedScore) -> Self {
        let base = score.base.clone().unwrap_or_default();
        let security = score.security.clone().unwrap_or_default();

        Self {
            address: address.into(),
            total_score: non_negative(score.total_score),
            base_score: non_negative(score.effective_base_score()),
            security_score: non_negative(score.effective_security_score()),
            tx_count: base.tx_count,
            current_streak: base.current_streak,
            max_streak: base.max_streak,
            current_balance: non_negative(base.current_balance),
            avg_balance_last_month: non_negative(base.past_balance),
            gas_paid: non_negative(base.gas_used),
            suspicious_tokens: security.risky_tokens,
            suspicious_contracts: security.risky_contracts,
            dangerous_interactions: security.risky_signs,
            suspicious_nfts: security.suspicious_nfts,
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Score card signed by the backend, with the exact integers it attests to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedScoreCard {
    /// Hex-encoded 65-byte signature
    pub signature: String,
    pub total_score: u128,
    pub base_score: u128,
    pub security_score: u128,
    pub number_of_transactions: u128,
    pub current_streak: u128,
    pub max_streak: u128,
    /// Wei
    pub current_balance: u128,
    /// Wei
    pub avg_balance_last_month: u128,
    /// Wei
    pub gas_paid: u128,
    pub suspicious_tokens: u128,
    pub suspicious_contracts: u128,
    pub dangerous_interactions: u128,
    pub suspicious_oil_companies: u128,
    /// Block timestamp the signer read when issuing
    pub issued_at: u128,
    /// Per-user contract nonce the signature is bound to
    pub nonce: u128,
}

impl SignedScoreCard {
    /// Numeric fields in `submitScoreCard` argument order
    pub fn fields(&self) -> [u128; 15] {
        [
            self.total_score,
            self.base_score,
            self.security_score,
            self.number_of_transactions,
            self.current_streak,
            self.max_streak,
            self.current_balance,
            self.avg_balance_last_month,
            self.gas_paid,
            self.suspicious_tokens,
            self.suspicious_contracts,
            self.dangerous_interactions,
            self.suspicious_oil_companies,
            self.issued_at,
            self.nonce,
        ]
    }
}

/// Cooldown gate as read from `canSubmitScore`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownState {
    pub can_submit: bool,
    pub remaining_seconds: u64,
}

impl CooldownState {
    pub fn new(can_submit: bool, remaining_seconds: u64) -> Self {
        Self {
            can_submit,
            remaining_seconds,
        }
    }

    /// Whether a submission may start right now
    pub fn is_open(&self) -> bool {
        self.can_submit && self.remaining_seconds == 0
    }

    /// Whether a local countdown should run for this state
    pub fn needs_countdown(&self) -> bool {
        !self.can_submit && self.remaining_seconds > 0
    }
}

/// Format a wait time as `m:ss`
pub fn format_wait(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Score as recorded by the contract. The only score a view may display
/// as confirmed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustScoreResult {
    pub address: String,
    pub total_score: f64,
    pub base_score: f64,
    pub security_score: f64,
    /// Block timestamp of the recorded submission
    pub timestamp: Option<u64>,
    pub base: BaseMetrics,
    pub security: SecurityMetrics,
}

impl TrustScoreResult {
    /// Dashboard history entry for this result
    pub fn snapshot(&self, date: impl Into<String>) -> ScoreSnapshot {
        ScoreSnapshot {
            total_score: self.total_score,
            base_score: self.base_score,
            security_score: self.security_score,
            date: date.into(),
        }
    }
}

/// One entry of the dashboard score history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreSnapshot {
    pub total_score: f64,
    pub base_score: f64,
    pub security_score: f64,
    pub date: String,
}

/// Achievement badge derived from on-chain score data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Badge {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub description: String,
    pub earned: bool,
}

/// Badge endpoint payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BadgeList {
    pub badges: Vec<Badge>,
}

/// Dashboard summary endpoint payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DashboardSummary {
    pub last_scores: Option<ScoreSnapshot>,
    pub score_history: Vec<ScoreSnapshot>,
    pub badges: Vec<Badge>,
}

impl DashboardSummary {
    /// Whether the summary carries a recorded on-chain score
    pub fn has_score(&self) -> bool {
        self.last_scores
            .as_ref()
            .map(|s| s.total_score > 0.0)
            .unwrap_or(false)
    }
}
