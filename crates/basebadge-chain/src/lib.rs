//! BaseBadge Chain Client Abstraction
//!
//! Interfaces to the ScoreChecker contract and to the user's wallet, plus
//! the network parameters needed to bring a wallet onto the right chain.
//! The `evm` feature provides ethers-backed implementations.

use async_trait::async_trait;
use basebadge_types::SignedScoreCard;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

#[cfg(feature = "evm")]
pub mod evm;

#[cfg(feature = "evm")]
pub use evm::{EvmScoreChecker, LocalWalletConnector};

/// EIP-1193 code for a declined request
pub const USER_REJECTED_CODE: i64 = 4001;
/// EIP-1193 code for a chain the wallet does not know
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

/// Read/write surface of the ScoreChecker contract
#[async_trait]
pub trait ScoreChecker: Send + Sync {
    /// Wei fee required with each submission
    async fn check_fee(&self) -> Result<U256, ChainError>;

    /// Submit-allowed flag and remaining cooldown seconds for `user`
    async fn can_submit_score(&self, user: Address) -> Result<(bool, u64), ChainError>;

    /// Send `submitScoreCard` with `fee` attached; returns the transaction hash
    /// as soon as the wallet has broadcast it
    async fn submit_score_card(
        &self,
        card: &SignedScoreCard,
        fee: U256,
    ) -> Result<H256, ChainError>;

    /// Wait until `tx_hash` is mined or dropped
    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<ReceiptStatus, ChainError>;
}

/// Wallet connector surface (EIP-1193 style)
#[async_trait]
pub trait WalletConnector: Send + Sync {
    /// Currently connected account, if any
    fn address(&self) -> Option<Address>;

    /// Chain the wallet is currently on
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Structured network switch through the connector
    async fn switch_chain(&self, chain_id: u64) -> Result<(), ChainError>;

    /// Raw provider request (`wallet_switchEthereumChain`, `wallet_addEthereumChain`, ...)
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError>;

    /// Sign a plain text message; returns the `0x`-prefixed signature
    async fn sign_message(&self, message: &str) -> Result<String, ChainError>;
}

/// Outcome of a mined (or vanished) transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Confirmed { block_number: Option<u64> },
    Reverted,
    Dropped,
}

/// Error returned by a raw provider request
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("provider error {code}: {message}")]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
}

impl ProviderRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The wallet does not know the requested chain
    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == UNRECOGNIZED_CHAIN_CODE || self.message.contains("Unrecognized chain ID")
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == USER_REJECTED_CODE
    }
}

/// Native currency entry of `wallet_addEthereumChain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Network the ScoreChecker lives on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub chain_id: u64,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_url: String,
    pub explorer_url: String,
}

impl NetworkParams {
    /// Base mainnet
    pub fn base_mainnet() -> Self {
        Self {
            chain_id: 8453,
            chain_name: "Base".to_string(),
            native_currency: NativeCurrency {
                name: "ETH".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
            rpc_url: "https://mainnet.base.org".to_string(),
            explorer_url: "https://basescan.org".to_string(),
        }
    }

    /// Chain id as the hex quantity wallets expect (`0x2105` for Base)
    pub fn hex_chain_id(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    /// Params of `wallet_switchEthereumChain`
    pub fn switch_params(&self) -> Value {
        json!([{ "chainId": self.hex_chain_id() }])
    }

    /// Params of `wallet_addEthereumChain`
    pub fn add_chain_params(&self) -> Value {
        json!([{
            "chainId": self.hex_chain_id(),
            "chainName": self.chain_name,
            "nativeCurrency": {
                "name": self.native_currency.name,
                "symbol": self.native_currency.symbol,
                "decimals": self.native_currency.decimals,
            },
            "rpcUrls": [self.rpc_url],
            "blockExplorerUrls": [self.explorer_url],
        }])
    }

    /// Explorer link for a transaction
    pub fn tx_url(&self, tx_hash: H256) -> String {
        format!("{}/tx/{:?}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self::base_mainnet()
    }
}

/// Configuration for chain clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub network: NetworkParams,
    pub contract_address: Address,
    pub private_key: Option<String>,
    /// Confirmations to wait for before a receipt counts as final
    pub confirmations: usize,
}

/// Wallet and contract clients built from one configuration
#[derive(Clone)]
pub struct ChainHandles {
    pub wallet: Arc<dyn WalletConnector>,
    pub checker: Arc<dyn ScoreChecker>,
}

/// Chain client factory
pub struct ChainClientFactory;

impl ChainClientFactory {
    pub async fn connect(config: ChainConfig) -> anyhow::Result<ChainHandles> {
        url::Url::parse(&config.network.rpc_url)
            .map_err(|e| ChainError::Config(format!("invalid RPC URL: {}", e)))?;

        #[cfg(feature = "evm")]
        {
            let private_key = config
                .private_key
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("Private key required for the local wallet"))?;

            let wallet = LocalWalletConnector::new(
                &config.network.rpc_url,
                private_key,
                config.network.chain_id,
            )?;
            let checker = EvmScoreChecker::new(
                config.contract_address,
                Arc::new(wallet.signer_client()),
                config.confirmations,
            );

            tracing::info!(
                "Connected wallet {:?} to ScoreChecker {:?} on chain {}",
                wallet.address(),
                config.contract_address,
                config.network.chain_id
            );

            Ok(ChainHandles {
                wallet: Arc::new(wallet),
                checker: Arc::new(checker),
            })
        }
        #[cfg(not(feature = "evm"))]
        {
            Err(anyhow::anyhow!("EVM support not compiled in"))
        }
    }
}

/// Error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Network switch rejected: {0}")]
    SwitchRejected(String),

    #[error("Adding network failed: {0}")]
    AddChainFailed(String),

    #[error("Request rejected by user: {0}")]
    UserRejected(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl ChainError {
    /// Classify a wallet/contract failure message; declines become `UserRejected`
    pub fn from_send_failure(message: String) -> Self {
        let lower = message.to_lowercase();
        let rejected = ["user rejected", "user denied", "rejected by user", "code: 4001"]
            .iter()
            .any(|needle| lower.contains(needle));
        if rejected {
            ChainError::UserRejected(message)
        } else {
            ChainError::Contract(message)
        }
    }
}
