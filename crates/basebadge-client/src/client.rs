//! BaseBadge Client
//!
//! Wires the session, network gate, cooldown oracle, refresher and
//! submission orchestrator around one wallet, one contract and one backend.

use basebadge_chain::ChainHandles;
use basebadge_crypto::ScoreCardCrypto;
use basebadge_types::CooldownState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::auth::AuthSessionManager;
use crate::backend::BackendApi;
use crate::chain_gate::ChainGate;
use crate::config::ClientConfig;
use crate::cooldown::CooldownOracle;
use crate::events::EventBus;
use crate::health::HealthProbe;
use crate::orchestrator::{OrchestratorDeps, ScoreOrchestrator, SubmissionError};
use crate::refresher::{DashboardState, DependentStateRefresher};
use crate::token_store::TokenStore;

#[derive(Clone)]
pub struct BaseBadgeClient {
    config: ClientConfig,
    chain: ChainHandles,
    backend: Arc<dyn BackendApi>,
    events: EventBus,
    auth: AuthSessionManager,
    gate: ChainGate,
    cooldown: CooldownOracle,
    refresher: DependentStateRefresher,
    orchestrator: ScoreOrchestrator,
}

impl BaseBadgeClient {
    pub fn new(
        config: ClientConfig,
        chain: ChainHandles,
        backend: Arc<dyn BackendApi>,
        store: TokenStore,
    ) -> Self {
        let events = EventBus::default();
        let auth = AuthSessionManager::new(
            backend.clone(),
            chain.wallet.clone(),
            store,
            events.clone(),
        );
        let gate = ChainGate::new(chain.wallet.clone(), config.network.clone());
        let cooldown = CooldownOracle::new(chain.checker.clone(), events.clone());
        let refresher = DependentStateRefresher::new(backend.clone(), auth.clone(), events.clone());
        let orchestrator = ScoreOrchestrator::new(OrchestratorDeps {
            wallet: chain.wallet.clone(),
            checker: chain.checker.clone(),
            backend: backend.clone(),
            auth: auth.clone(),
            gate: gate.clone(),
            cooldown: cooldown.clone(),
            refresher: refresher.clone(),
            events: events.clone(),
            card_crypto: ScoreCardCrypto::new(config.card_domain()),
            authorized_signer: config.authorized_signer,
        });

        Self {
            config,
            chain,
            backend,
            events,
            auth,
            gate,
            cooldown,
            refresher,
            orchestrator,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn auth(&self) -> &AuthSessionManager {
        &self.auth
    }

    pub fn gate(&self) -> &ChainGate {
        &self.gate
    }

    pub fn cooldown(&self) -> &CooldownOracle {
        &self.cooldown
    }

    pub fn refresher(&self) -> &DependentStateRefresher {
        &self.refresher
    }

    pub fn orchestrator(&self) -> &ScoreOrchestrator {
        &self.orchestrator
    }

    /// Load everything a freshly connected wallet needs: the fee, the
    /// cooldown and the dashboard. Individual failures are logged.
    pub async fn on_wallet_connected(&self) -> Option<CooldownState> {
        let address = self.chain.wallet.address()?;
        info!("Wallet connected: {:?}", address);

        self.auth.sync_address();
        if let Err(e) = self.orchestrator.load_fee().await {
            warn!("{}", e);
        }
        if let Err(e) = self.refresher.load_dashboard(address).await {
            warn!("{}", e);
        }
        match self.cooldown.refresh(address).await {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Cooldown read failed: {}", e);
                None
            }
        }
    }

    /// Forget wallet-derived state after a disconnect
    pub fn on_wallet_disconnected(&self) {
        self.cooldown.cancel();
        self.refresher.clear();
        self.orchestrator.reset();
    }

    /// Run one score check and wait for it to settle
    pub async fn check_score_and_wait(&self) -> Result<DashboardState, SubmissionError> {
        self.orchestrator.check_score().await?;
        self.orchestrator.wait_terminal().await;
        match self.orchestrator.last_error() {
            Some(error) => Err(error),
            None => Ok(self.refresher.state()),
        }
    }

    pub fn spawn_health_probe(&self) -> HealthProbe {
        HealthProbe::spawn(
            self.backend.clone(),
            Duration::from_millis(self.config.health_interval_ms),
            self.events.clone(),
        )
    }
}
