//! EVM client implementation
//!
//! `EvmScoreChecker` talks to the ScoreChecker contract through any ethers
//! middleware; `LocalWalletConnector` is a headless wallet backed by a
//! local private key and an HTTP provider.

use super::*;
use basebadge_crypto::signature_bytes;
use ethers::{
    contract::abigen,
    middleware::SignerMiddleware,
    providers::{Http, Middleware, PendingTransaction, Provider, ProviderError, RpcError},
    signers::{LocalWallet, Signer},
    types::Bytes,
};
use parking_lot::RwLock;
use tracing::{debug, info};

// Minimal ScoreChecker V2 interface
abigen!(
    ScoreCheckerContract,
    r#"[
        function checkFee() external view returns (uint256)
        function canSubmitScore(address user) external view returns (bool, uint256)
        function nonces(address user) external view returns (uint256)
        function submitScoreCard(uint256 totalScore, uint256 baseScore, uint256 securityScore, uint256 numberOfTransactions, uint256 currentStreak, uint256 maxStreak, uint256 currentBalance, uint256 avgBalanceLastMonth, uint256 gasPaid, uint256 suspiciousTokens, uint256 suspiciousContracts, uint256 dangerousInteractions, uint256 suspiciousOilCompanies, uint256 issuedAt, uint256 nonce, bytes signature) external payable
    ]"#,
);

/// ScoreChecker client over an ethers middleware stack
pub struct EvmScoreChecker<M> {
    contract: ScoreCheckerContract<M>,
    client: Arc<M>,
    confirmations: usize,
}

impl<M: Middleware + 'static> EvmScoreChecker<M> {
    pub fn new(address: Address, client: Arc<M>, confirmations: usize) -> Self {
        Self {
            contract: ScoreCheckerContract::new(address, client.clone()),
            client,
            confirmations: confirmations.max(1),
        }
    }

    /// Contract address
    pub fn address(&self) -> Address {
        self.contract.address()
    }
}

#[async_trait]
impl<M: Middleware + 'static> ScoreChecker for EvmScoreChecker<M> {
    async fn check_fee(&self) -> Result<U256, ChainError> {
        self.contract
            .check_fee()
            .call()
            .await
            .map_err(|e| ChainError::Contract(e.to_string()))
    }

    async fn can_submit_score(&self, user: Address) -> Result<(bool, u64), ChainError> {
        let (allowed, remaining) = self
            .contract
            .can_submit_score(user)
            .call()
            .await
            .map_err(|e| ChainError::Contract(e.to_string()))?;

        let remaining = if remaining > U256::from(u64::MAX) {
            u64::MAX
        } else {
            remaining.as_u64()
        };
        Ok((allowed, remaining))
    }

    async fn submit_score_card(
        &self,
        card: &SignedScoreCard,
        fee: U256,
    ) -> Result<H256, ChainError> {
        let signature = signature_bytes(&card.signature)
            .map_err(|e| ChainError::Contract(e.to_string()))?;
        let [total, base, security, txs, streak, max_streak, balance, avg_balance, gas, tokens, contracts, interactions, oil, issued_at, nonce] =
            card.fields().map(U256::from);

        let call = self
            .contract
            .submit_score_card(
                total,
                base,
                security,
                txs,
                streak,
                max_streak,
                balance,
                avg_balance,
                gas,
                tokens,
                contracts,
                interactions,
                oil,
                issued_at,
                nonce,
                Bytes::from(signature),
            )
            .value(fee);

        let pending = call
            .send()
            .await
            .map_err(|e| ChainError::from_send_failure(e.to_string()))?;
        let tx_hash = pending.tx_hash();

        info!("submitScoreCard broadcast: {:?}", tx_hash);
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<ReceiptStatus, ChainError> {
        let pending = PendingTransaction::new(tx_hash, self.client.provider())
            .confirmations(self.confirmations);

        match pending.await {
            Ok(Some(receipt)) => {
                debug!("Receipt for {:?}: status {:?}", tx_hash, receipt.status);
                if receipt.status == Some(1u64.into()) {
                    Ok(ReceiptStatus::Confirmed {
                        block_number: receipt.block_number.map(|n| n.as_u64()),
                    })
                } else {
                    Ok(ReceiptStatus::Reverted)
                }
            }
            Ok(None) => Ok(ReceiptStatus::Dropped),
            Err(e) => Err(ChainError::Rpc(e.to_string())),
        }
    }
}

/// Headless wallet: a local key signing through an HTTP provider
pub struct LocalWalletConnector {
    provider: Provider<Http>,
    wallet: RwLock<LocalWallet>,
}

impl LocalWalletConnector {
    pub fn new(rpc_url: &str, private_key: &str, chain_id: u64) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ChainError::Config(format!("invalid RPC URL: {}", e)))?;
        let wallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| ChainError::Config(format!("invalid private key: {}", e)))?
            .with_chain_id(chain_id);

        Ok(Self {
            provider,
            wallet: RwLock::new(wallet),
        })
    }

    /// Signing middleware bound to the wallet's current chain id
    pub fn signer_client(&self) -> SignerMiddleware<Provider<Http>, LocalWallet> {
        SignerMiddleware::new(self.provider.clone(), self.wallet.read().clone())
    }
}

fn provider_rpc_error(error: &ProviderError) -> ProviderRpcError {
    match error.as_error_response() {
        Some(response) => ProviderRpcError::new(response.code, response.message.clone()),
        None => ProviderRpcError::new(-32603, error.to_string()),
    }
}

#[async_trait]
impl WalletConnector for LocalWalletConnector {
    fn address(&self) -> Option<Address> {
        Some(self.wallet.read().address())
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.wallet.read().chain_id())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ChainError> {
        let served = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?
            .as_u64();
        if served != chain_id {
            return Err(ChainError::SwitchRejected(format!(
                "provider serves chain {}, not {}",
                served, chain_id
            )));
        }

        let mut wallet = self.wallet.write();
        *wallet = wallet.clone().with_chain_id(chain_id);
        Ok(())
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        self.provider
            .request::<_, Value>(method, params)
            .await
            .map_err(|e| provider_rpc_error(&e))
    }

    async fn sign_message(&self, message: &str) -> Result<String, ChainError> {
        let wallet = self.wallet.read().clone();
        let signature = wallet
            .sign_message(message)
            .await
            .map_err(|e| ChainError::UserRejected(e.to_string()))?;
        Ok(format!("0x{}", hex::encode(signature.to_vec())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Signature;
    use std::str::FromStr;

    const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn test_connector() -> LocalWalletConnector {
        LocalWalletConnector::new("http://localhost:8545", ANVIL_KEY, 8453).unwrap()
    }

    #[tokio::test]
    async fn test_local_wallet_identity() {
        let connector = test_connector();
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();

        assert_eq!(connector.address(), Some(expected));
        assert_eq!(connector.chain_id().await.unwrap(), 8453);
        assert_eq!(connector.signer_client().signer().chain_id(), 8453);
    }

    #[tokio::test]
    async fn test_sign_message_recovers_to_wallet() {
        let connector = test_connector();
        let signature = connector.sign_message("nonce-123").await.unwrap();

        assert!(signature.starts_with("0x"));
        let parsed = Signature::from_str(&signature).unwrap();
        assert_eq!(parsed.recover("nonce-123").unwrap(), connector.address().unwrap());
    }

    #[test]
    fn test_invalid_key_is_config_error() {
        let result = LocalWalletConnector::new("http://localhost:8545", "not-a-key", 8453);
        assert!(matches!(result, Err(ChainError::Config(_))));
    }

    #[test]
    fn test_checker_keeps_address() {
        let client = Arc::new(test_connector().signer_client());
        let address = Address::repeat_byte(0x46);
        let checker = EvmScoreChecker::new(address, client, 0);
        assert_eq!(checker.address(), address);
        assert_eq!(checker.confirmations, 1);
    }
}
