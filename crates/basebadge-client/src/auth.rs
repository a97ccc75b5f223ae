//! Wallet Sign-In
//!
//! Nonce / signature / token handshake with the backend. A session is only
//! valid while the connected wallet is the address the token was issued
//! for; every session read re-checks that binding.

use basebadge_chain::WalletConnector;
use ethers::types::Address;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::BackendApi;
use crate::events::{BadgeEvent, EventBus};
use crate::token_store::{StorageError, TokenStore};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("Failed to get nonce: {0}")]
    NonceUnavailable(String),

    #[error("Message signature rejected: {0}")]
    SignatureRejected(String),

    #[error("Failed to verify signature: {0}")]
    VerificationFailed(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for AuthError {
    fn from(e: StorageError) -> Self {
        AuthError::Storage(e.to_string())
    }
}

/// Authenticated session bound to one wallet address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub address: Address,
    pub token: String,
}

struct AuthInner {
    backend: Arc<dyn BackendApi>,
    wallet: Arc<dyn WalletConnector>,
    store: TokenStore,
    events: EventBus,
    login_lock: Mutex<()>,
}

/// Owns the session token and its binding to the connected wallet
#[derive(Clone)]
pub struct AuthSessionManager {
    inner: Arc<AuthInner>,
}

impl AuthSessionManager {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        wallet: Arc<dyn WalletConnector>,
        store: TokenStore,
        events: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(AuthInner {
                backend,
                wallet,
                store,
                events,
                login_lock: Mutex::new(()),
            }),
        }
    }

    /// Sign in the connected wallet.
    ///
    /// Concurrent calls share one handshake: later callers wait for the
    /// first and reuse its session.
    pub async fn login(&self) -> Result<Session, AuthError> {
        let address = self
            .inner
            .wallet
            .address()
            .ok_or(AuthError::WalletNotConnected)?;

        let _guard = self.inner.login_lock.lock().await;
        if let Some(session) = self.session() {
            if session.address == address {
                debug!("Reusing session for {:?}", address);
                return Ok(session);
            }
        }

        info!("Signing in {:?}", address);
        let nonce = self
            .inner
            .backend
            .nonce(address)
            .await
            .map_err(|e| AuthError::NonceUnavailable(e.to_string()))?;
        if nonce.trim().is_empty() {
            return Err(AuthError::NonceUnavailable("empty nonce".to_string()));
        }

        let signature = self
            .inner
            .wallet
            .sign_message(&nonce)
            .await
            .map_err(|e| AuthError::SignatureRejected(e.to_string()))?;

        let token = self
            .inner
            .backend
            .verify(address, &signature)
            .await
            .map_err(|e| AuthError::VerificationFailed(e.to_string()))?;
        if token.is_empty() {
            return Err(AuthError::VerificationFailed("no token issued".to_string()));
        }

        // The account may have changed while the user was signing
        let current = self.inner.wallet.address();
        if current != Some(address) {
            warn!(
                "Wallet changed from {:?} to {:?} during sign-in, discarding token",
                address, current
            );
            return Err(AuthError::VerificationFailed(
                "wallet changed during sign-in".to_string(),
            ));
        }

        self.inner.store.save(&token)?;
        self.inner.store.save_owner(address)?;
        self.inner
            .events
            .publish(BadgeEvent::SessionStarted { address });
        info!("Signed in {:?}", address);

        Ok(Session { address, token })
    }

    /// Drop the session. Safe to call when already signed out.
    pub fn logout(&self) -> Result<(), AuthError> {
        let had_token = self.inner.store.get().ok().flatten().is_some();
        self.inner.store.clear()?;
        self.inner.store.clear_owner()?;
        if had_token {
            info!("Signed out");
        }
        self.inner.events.publish(BadgeEvent::SessionEnded);
        Ok(())
    }

    /// Current session, if the stored token belongs to the connected wallet
    pub fn session(&self) -> Option<Session> {
        self.sync_address();

        let address = self.inner.wallet.address()?;
        let token = match self.inner.store.get() {
            Ok(token) => token?,
            Err(e) => {
                warn!("Failed to read session token: {}", e);
                return None;
            }
        };
        let owner = match self.inner.store.owner() {
            Ok(owner) => owner?,
            Err(e) => {
                warn!("Failed to read session owner: {}", e);
                return None;
            }
        };

        (owner == address).then_some(Session { address, token })
    }

    /// Bearer token for authenticated backend calls
    pub fn bearer(&self) -> Option<String> {
        self.session().map(|s| s.token)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    /// Clear the session when the connected account no longer matches the
    /// token owner. Returns whether the session was invalidated.
    pub fn sync_address(&self) -> bool {
        let owner = match self.inner.store.owner() {
            Ok(Some(owner)) => owner,
            _ => return false,
        };
        let current = match self.inner.wallet.address() {
            Some(current) if current != owner => current,
            _ => return false,
        };

        warn!(
            "Connected wallet {:?} differs from session owner {:?}, clearing session",
            current, owner
        );
        if let Err(e) = self
            .inner
            .store
            .clear()
            .and_then(|_| self.inner.store.clear_owner())
        {
            warn!("Failed to clear stale session: {}", e);
        }
        self.inner.events.publish(BadgeEvent::SessionInvalidated {
            previous: owner,
            current: Some(current),
        });
        true
    }
}
