//! Network Gate
//!
//! Brings the wallet onto the ScoreChecker's chain before a submission.
//! Tries the connector's structured switch, then a raw
//! `wallet_switchEthereumChain`, and registers the chain with
//! `wallet_addEthereumChain` when the wallet does not know it.

use basebadge_chain::{ChainError, NetworkParams, ProviderRpcError, WalletConnector};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct ChainGate {
    wallet: Arc<dyn WalletConnector>,
    network: NetworkParams,
}

impl ChainGate {
    pub fn new(wallet: Arc<dyn WalletConnector>, network: NetworkParams) -> Self {
        Self { wallet, network }
    }

    pub fn network(&self) -> &NetworkParams {
        &self.network
    }

    /// Whether the wallet already reports the target chain
    pub async fn is_on_required_chain(&self) -> bool {
        matches!(self.wallet.chain_id().await, Ok(id) if id == self.network.chain_id)
    }

    /// Switch the wallet to the target chain, adding it if needed.
    ///
    /// Failures are reported, never raised; callers decide whether to go on.
    pub async fn ensure_chain(&self) -> Result<(), ChainError> {
        let target = self.network.chain_id;

        match self.wallet.switch_chain(target).await {
            Ok(()) => {
                debug!("Wallet switched to chain {}", target);
                return Ok(());
            }
            Err(e) => debug!("Structured switch to {} failed: {}", target, e),
        }

        match self.raw_switch().await {
            Ok(()) => Ok(()),
            Err(e) if e.is_unrecognized_chain() => {
                info!(
                    "Wallet does not know {} ({}), adding it",
                    self.network.chain_name,
                    self.network.hex_chain_id()
                );
                self.wallet
                    .request("wallet_addEthereumChain", self.network.add_chain_params())
                    .await
                    .map_err(|e| {
                        warn!("Adding {} failed: {}", self.network.chain_name, e);
                        if e.is_user_rejection() {
                            ChainError::UserRejected(e.message)
                        } else {
                            ChainError::AddChainFailed(e.to_string())
                        }
                    })?;

                self.raw_switch().await.map_err(|e| {
                    warn!("Switch after adding {} failed: {}", self.network.chain_name, e);
                    ChainError::SwitchRejected(e.to_string())
                })
            }
            Err(e) if e.is_user_rejection() => {
                warn!("Network switch declined: {}", e);
                Err(ChainError::UserRejected(e.message))
            }
            Err(e) => {
                warn!("Network switch failed: {}", e);
                Err(ChainError::SwitchRejected(e.to_string()))
            }
        }
    }

    async fn raw_switch(&self) -> Result<(), ProviderRpcError> {
        self.wallet
            .request("wallet_switchEthereumChain", self.network.switch_params())
            .await
            .map(|_| ())
    }
}
