//! BaseBadge Client Library
//!
//! Client-side core of BaseBadge: wallet sign-in, network gating, the
//! on-chain cooldown projection, the score submission state machine and the
//! refresh of everything that depends on a confirmed on-chain score.

pub mod auth;
pub mod backend;
pub mod chain_gate;
pub mod client;
pub mod config;
pub mod cooldown;
pub mod events;
pub mod health;
pub mod orchestrator;
pub mod refresher;
pub mod token_store;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthError, AuthSessionManager, Session};
pub use backend::{BackendApi, BackendError, HttpBackend};
pub use chain_gate::ChainGate;
pub use client::BaseBadgeClient;
pub use config::{ClientConfig, ScoreRoute};
pub use cooldown::CooldownOracle;
pub use events::{BadgeEvent, EventBus};
pub use health::HealthProbe;
pub use orchestrator::{Lifecycle, ScoreOrchestrator, SubmissionError, Trigger};
pub use refresher::{DashboardState, DependentStateRefresher, RefreshError};
pub use token_store::{FileStore, KeyValueStore, MemoryStore, StorageError, TokenStore};
