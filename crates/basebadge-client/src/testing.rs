//! In-memory wallet, contract and backend doubles for unit tests

use async_trait::async_trait;
use basebadge_chain::{
    ChainError, ProviderRpcError, ReceiptStatus, ScoreChecker, WalletConnector,
    UNRECOGNIZED_CHAIN_CODE,
};
use basebadge_types::{
    Badge, BaseMetrics, ComputedScore, DashboardSummary, ScoreSnapshot, SecurityMetrics,
    SignCardRequest, SignedScoreCard, TrustScoreResult,
};
use ethers::types::{Address, H256, U256};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::backend::{BackendApi, BackendError};

/// Async barrier that is open unless held
pub struct Gate {
    open: watch::Sender<bool>,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            open: watch::channel(true).0,
        }
    }

    pub fn hold(&self) {
        self.open.send_replace(false);
    }

    pub fn release(&self) {
        self.open.send_replace(true);
    }

    pub async fn pass(&self) {
        let mut rx = self.open.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

pub fn user() -> Address {
    Address::repeat_byte(0x11)
}

pub fn computed_score() -> ComputedScore {
    ComputedScore {
        basename: None,
        address: None,
        total_score: 72.0,
        base_score: Some(40.0),
        security_score: Some(32.0),
        base: Some(BaseMetrics {
            tx_count: 154,
            gas_used: 0.012,
            current_balance: 1.5,
            past_balance: 1.25,
            current_streak: 3,
            max_streak: 9,
            age_days: 400,
            base_score: 40.0,
        }),
        security: Some(SecurityMetrics {
            risky_tokens: 1,
            risky_contracts: 0,
            risky_signs: 2,
            suspicious_nfts: 4,
            security_score: 32.0,
        }),
    }
}

pub fn signed_card() -> SignedScoreCard {
    SignedScoreCard {
        signature: "ab".repeat(65),
        total_score: 72,
        base_score: 40,
        security_score: 32,
        number_of_transactions: 154,
        current_streak: 3,
        max_streak: 9,
        current_balance: 1_500_000_000_000_000_000,
        avg_balance_last_month: 1_250_000_000_000_000_000,
        gas_paid: 12_000_000_000_000_000,
        suspicious_tokens: 1,
        suspicious_contracts: 0,
        dangerous_interactions: 2,
        suspicious_oil_companies: 4,
        issued_at: 1_700_000_000,
        nonce: 0,
    }
}

pub fn onchain_result(total_score: f64) -> TrustScoreResult {
    TrustScoreResult {
        address: format!("{:?}", user()),
        total_score,
        base_score: 40.0,
        security_score: 32.0,
        timestamp: Some(1_700_000_100),
        ..Default::default()
    }
}

pub struct FakeWallet {
    address: Mutex<Option<Address>>,
    chain_id: Mutex<u64>,
    structured_switch: Mutex<bool>,
    switch_error: Mutex<Option<ProviderRpcError>>,
    add_error: Mutex<Option<ProviderRpcError>>,
    requests: Mutex<Vec<(String, Value)>>,
    reject_signatures: Mutex<bool>,
    switch_on_sign: Mutex<Option<Address>>,
    signed: Mutex<Vec<String>>,
}

impl FakeWallet {
    pub fn connected(address: Address) -> Self {
        Self {
            address: Mutex::new(Some(address)),
            chain_id: Mutex::new(8453),
            structured_switch: Mutex::new(true),
            switch_error: Mutex::new(None),
            add_error: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            reject_signatures: Mutex::new(false),
            switch_on_sign: Mutex::new(None),
            signed: Mutex::new(Vec::new()),
        }
    }

    pub fn disconnected() -> Self {
        let wallet = Self::connected(Address::zero());
        wallet.set_address(None);
        wallet
    }

    pub fn set_address(&self, address: Option<Address>) {
        *self.address.lock() = address;
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        *self.chain_id.lock() = chain_id;
    }

    /// Wallet on another chain that does not know the target chain
    pub fn without_target_chain(&self, chain_id: u64) {
        self.set_chain_id(chain_id);
        *self.structured_switch.lock() = false;
        *self.switch_error.lock() = Some(ProviderRpcError::new(
            UNRECOGNIZED_CHAIN_CODE,
            "Unrecognized chain ID \"0x2105\"",
        ));
    }

    pub fn fail_add_chain(&self, error: ProviderRpcError) {
        *self.add_error.lock() = Some(error);
    }

    pub fn reject_signatures(&self, reject: bool) {
        *self.reject_signatures.lock() = reject;
    }

    pub fn switch_on_sign(&self, address: Option<Address>) {
        *self.switch_on_sign.lock() = address;
    }

    pub fn signed_messages(&self) -> Vec<String> {
        self.signed.lock().clone()
    }

    pub fn request_methods(&self) -> Vec<String> {
        self.requests.lock().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn request_params(&self, method: &str) -> Option<Value> {
        self.requests
            .lock()
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
    }

    pub fn current_chain(&self) -> u64 {
        *self.chain_id.lock()
    }
}

#[async_trait]
impl WalletConnector for FakeWallet {
    fn address(&self) -> Option<Address> {
        *self.address.lock()
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(*self.chain_id.lock())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ChainError> {
        if *self.structured_switch.lock() {
            *self.chain_id.lock() = chain_id;
            Ok(())
        } else {
            Err(ChainError::Unsupported("structured switch".to_string()))
        }
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        self.requests.lock().push((method.to_string(), params.clone()));
        match method {
            "wallet_switchEthereumChain" => {
                if let Some(error) = self.switch_error.lock().clone() {
                    return Err(error);
                }
                let target = params[0]["chainId"].as_str().unwrap_or_default();
                let chain_id = u64::from_str_radix(target.trim_start_matches("0x"), 16)
                    .unwrap_or_default();
                *self.chain_id.lock() = chain_id;
                Ok(Value::Null)
            }
            "wallet_addEthereumChain" => {
                if let Some(error) = self.add_error.lock().clone() {
                    return Err(error);
                }
                *self.switch_error.lock() = None;
                Ok(Value::Null)
            }
            other => Err(ProviderRpcError::new(-32601, format!("{} not supported", other))),
        }
    }

    async fn sign_message(&self, message: &str) -> Result<String, ChainError> {
        if *self.reject_signatures.lock() {
            return Err(ChainError::UserRejected("User denied message signature".to_string()));
        }
        self.signed.lock().push(message.to_string());
        if let Some(next) = self.switch_on_sign.lock().take() {
            *self.address.lock() = Some(next);
        }
        Ok(format!("0x{}", "cd".repeat(65)))
    }
}

pub struct FakeChecker {
    fee: Mutex<Option<U256>>,
    fee_reads: AtomicUsize,
    cooldowns: Mutex<VecDeque<(bool, u64)>>,
    cooldown_reads: Mutex<Vec<Instant>>,
    submit_error: Mutex<Option<ChainError>>,
    submissions: Mutex<Vec<(SignedScoreCard, U256)>>,
    receipt: Mutex<ReceiptStatus>,
    receipt_gate: Gate,
}

impl FakeChecker {
    pub fn new() -> Self {
        Self {
            fee: Mutex::new(Some(U256::from(100_000_000_000_000u64))),
            fee_reads: AtomicUsize::new(0),
            cooldowns: Mutex::new(VecDeque::from([(true, 0)])),
            cooldown_reads: Mutex::new(Vec::new()),
            submit_error: Mutex::new(None),
            submissions: Mutex::new(Vec::new()),
            receipt: Mutex::new(ReceiptStatus::Confirmed {
                block_number: Some(100),
            }),
            receipt_gate: Gate::new(),
        }
    }

    pub fn set_fee(&self, fee: Option<U256>) {
        *self.fee.lock() = fee;
    }

    pub fn fee_reads(&self) -> usize {
        self.fee_reads.load(Ordering::SeqCst)
    }

    /// Answers for successive `canSubmitScore` reads; the last one repeats
    pub fn set_cooldowns(&self, answers: &[(bool, u64)]) {
        *self.cooldowns.lock() = answers.iter().copied().collect();
    }

    pub fn cooldown_reads(&self) -> Vec<Instant> {
        self.cooldown_reads.lock().clone()
    }

    pub fn fail_submissions(&self, error: Option<ChainError>) {
        *self.submit_error.lock() = error;
    }

    pub fn submissions(&self) -> Vec<(SignedScoreCard, U256)> {
        self.submissions.lock().clone()
    }

    pub fn set_receipt(&self, receipt: ReceiptStatus) {
        *self.receipt.lock() = receipt;
    }

    pub fn receipt_gate(&self) -> &Gate {
        &self.receipt_gate
    }
}

#[async_trait]
impl ScoreChecker for FakeChecker {
    async fn check_fee(&self) -> Result<U256, ChainError> {
        self.fee_reads.fetch_add(1, Ordering::SeqCst);
        self.fee
            .lock()
            .ok_or_else(|| ChainError::Rpc("fee read failed".to_string()))
    }

    async fn can_submit_score(&self, _user: Address) -> Result<(bool, u64), ChainError> {
        self.cooldown_reads.lock().push(Instant::now());
        let mut answers = self.cooldowns.lock();
        let answer = if answers.len() > 1 {
            answers.pop_front()
        } else {
            answers.front().copied()
        };
        answer.ok_or_else(|| ChainError::Rpc("cooldown read failed".to_string()))
    }

    async fn submit_score_card(
        &self,
        card: &SignedScoreCard,
        fee: U256,
    ) -> Result<H256, ChainError> {
        if let Some(error) = self.submit_error.lock().clone() {
            return Err(error);
        }
        let mut submissions = self.submissions.lock();
        submissions.push((card.clone(), fee));
        Ok(H256::from_low_u64_be(submissions.len() as u64))
    }

    async fn wait_for_receipt(&self, _tx_hash: H256) -> Result<ReceiptStatus, ChainError> {
        self.receipt_gate.pass().await;
        Ok(*self.receipt.lock())
    }
}

pub struct FakeBackend {
    nonce: Mutex<Option<String>>,
    token: Mutex<Option<String>>,
    score: Mutex<Option<ComputedScore>>,
    card: Mutex<Option<SignedScoreCard>>,
    onchain: Mutex<Option<TrustScoreResult>>,
    badges: Mutex<Option<Vec<Badge>>>,
    summary: Mutex<Option<DashboardSummary>>,
    online: Mutex<bool>,
    nonce_calls: AtomicUsize,
    verify_calls: AtomicUsize,
    score_calls: AtomicUsize,
    sign_requests: Mutex<Vec<SignCardRequest>>,
    tokens_seen: Mutex<Vec<Option<String>>>,
    nonce_gate: Gate,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            nonce: Mutex::new(Some("nonce-1".to_string())),
            token: Mutex::new(Some("jwt-token".to_string())),
            score: Mutex::new(Some(computed_score())),
            card: Mutex::new(Some(signed_card())),
            onchain: Mutex::new(Some(onchain_result(72.0))),
            badges: Mutex::new(Some(vec![Badge {
                id: "first_score".to_string(),
                name: "First Score".to_string(),
                earned: true,
                ..Default::default()
            }])),
            summary: Mutex::new(Some(DashboardSummary {
                last_scores: Some(ScoreSnapshot {
                    total_score: 72.0,
                    base_score: 40.0,
                    security_score: 32.0,
                    date: "1700000100".to_string(),
                }),
                score_history: Vec::new(),
                badges: Vec::new(),
            })),
            online: Mutex::new(true),
            nonce_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
            score_calls: AtomicUsize::new(0),
            sign_requests: Mutex::new(Vec::new()),
            tokens_seen: Mutex::new(Vec::new()),
            nonce_gate: Gate::new(),
        }
    }

    pub fn set_nonce(&self, nonce: Option<String>) {
        *self.nonce.lock() = nonce;
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.lock() = token;
    }

    pub fn set_score(&self, score: Option<ComputedScore>) {
        *self.score.lock() = score;
    }

    pub fn set_card(&self, card: Option<SignedScoreCard>) {
        *self.card.lock() = card;
    }

    pub fn set_onchain(&self, result: Option<TrustScoreResult>) {
        *self.onchain.lock() = result;
    }

    pub fn set_badges(&self, badges: Option<Vec<Badge>>) {
        *self.badges.lock() = badges;
    }

    pub fn set_summary(&self, summary: Option<DashboardSummary>) {
        *self.summary.lock() = summary;
    }

    pub fn set_online(&self, online: bool) {
        *self.online.lock() = online;
    }

    pub fn nonce_calls(&self) -> usize {
        self.nonce_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn score_calls(&self) -> usize {
        self.score_calls.load(Ordering::SeqCst)
    }

    pub fn sign_requests(&self) -> Vec<SignCardRequest> {
        self.sign_requests.lock().clone()
    }

    pub fn tokens_seen(&self) -> Vec<Option<String>> {
        self.tokens_seen.lock().clone()
    }

    pub fn nonce_gate(&self) -> &Gate {
        &self.nonce_gate
    }

    fn record_token(&self, token: Option<&str>) {
        self.tokens_seen.lock().push(token.map(str::to_string));
    }
}

fn unavailable() -> BackendError {
    BackendError::Status {
        status: 500,
        body: "unavailable".to_string(),
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn nonce(&self, _address: Address) -> Result<String, BackendError> {
        self.nonce_calls.fetch_add(1, Ordering::SeqCst);
        self.nonce_gate.pass().await;
        self.nonce.lock().clone().ok_or_else(unavailable)
    }

    async fn verify(&self, _address: Address, _signature: &str) -> Result<String, BackendError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.token.lock().clone().unwrap_or_default())
    }

    async fn score(
        &self,
        _address: Address,
        token: Option<&str>,
    ) -> Result<ComputedScore, BackendError> {
        self.score_calls.fetch_add(1, Ordering::SeqCst);
        self.record_token(token);
        self.score.lock().clone().ok_or_else(unavailable)
    }

    async fn sign_card(
        &self,
        request: &SignCardRequest,
        token: Option<&str>,
    ) -> Result<SignedScoreCard, BackendError> {
        self.sign_requests.lock().push(request.clone());
        self.record_token(token);
        self.card.lock().clone().ok_or_else(unavailable)
    }

    async fn onchain_score(
        &self,
        _address: Address,
        token: Option<&str>,
    ) -> Result<TrustScoreResult, BackendError> {
        self.record_token(token);
        self.onchain.lock().clone().ok_or_else(unavailable)
    }

    async fn dashboard_summary(
        &self,
        _address: Address,
        _token: Option<&str>,
    ) -> Result<DashboardSummary, BackendError> {
        self.summary.lock().clone().ok_or_else(unavailable)
    }

    async fn badges(
        &self,
        _address: Address,
        _token: Option<&str>,
    ) -> Result<Vec<Badge>, BackendError> {
        self.badges.lock().clone().ok_or_else(unavailable)
    }

    async fn stats(&self) -> Result<(), BackendError> {
        if *self.online.lock() {
            Ok(())
        } else {
            Err(unavailable())
        }
    }
}
