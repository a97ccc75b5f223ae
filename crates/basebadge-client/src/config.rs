//! Client configuration

use basebadge_chain::{ChainConfig, NetworkParams};
use basebadge_crypto::ScoreCardDomain;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// ScoreChecker deployment on Base mainnet
pub const DEFAULT_SCORE_CHECKER: &str = "0x461203d7137FdFA30907288656dBEB0f64408Fb9";

/// Local backend used during development
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Which backend route produces the computed score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScoreRoute {
    /// `GET /score?address=..&details=true`
    #[default]
    Direct,
    /// `GET /bff/score?address=..`
    Bff,
}

impl ScoreRoute {
    pub fn path(&self) -> &'static str {
        match self {
            ScoreRoute::Direct => "score",
            ScoreRoute::Bff => "bff/score",
        }
    }
}

/// Configuration for the BaseBadge client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub contract_address: Address,
    pub network: NetworkParams,
    pub score_route: ScoreRoute,
    /// Backend signer address; when set, cards are checked before paying the fee
    pub authorized_signer: Option<Address>,
    pub confirmations: usize,
    pub health_interval_ms: u64,
    /// Session file; defaults to the platform data directory
    pub session_file: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(api_base_url: impl Into<String>, contract_address: Address) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            contract_address,
            network: NetworkParams::base_mainnet(),
            score_route: ScoreRoute::Direct,
            authorized_signer: None,
            confirmations: 1,
            health_interval_ms: 5000,
            session_file: None,
        }
    }

    /// Chain client configuration for this deployment
    pub fn chain_config(&self, private_key: Option<String>) -> ChainConfig {
        ChainConfig {
            network: self.network.clone(),
            contract_address: self.contract_address,
            private_key,
            confirmations: self.confirmations,
        }
    }

    /// EIP-712 domain of the score-card signer
    pub fn card_domain(&self) -> ScoreCardDomain {
        ScoreCardDomain::new(self.network.chain_id, self.contract_address)
    }

    /// Where the session is persisted
    pub fn session_path(&self) -> Option<PathBuf> {
        self.session_file.clone().or_else(default_session_path)
    }
}

/// `<data dir>/basebadge/session.json`
pub fn default_session_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("basebadge").join("session.json"))
}
