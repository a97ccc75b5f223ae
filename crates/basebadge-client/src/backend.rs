//! BaseBadge Backend Client
//!
//! HTTP surface of the scoring backend: the sign-in handshake, computed
//! scores, score-card signing, on-chain score reads, dashboard data and the
//! liveness endpoint.

use async_trait::async_trait;
use basebadge_types::{
    Badge, BadgeList, ComputedScore, DashboardSummary, SignCardRequest, SignedScoreCard,
    TrustScoreResult,
};
use ethers::types::Address;
use ethers::utils::to_checksum;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::ScoreRoute;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Invalid backend URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Backend operations used by the client
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// One-time nonce for `address` to sign
    async fn nonce(&self, address: Address) -> Result<String, BackendError>;

    /// Exchange a signed nonce for a session token
    async fn verify(&self, address: Address, signature: &str) -> Result<String, BackendError>;

    /// Freshly computed (not yet recorded) score
    async fn score(
        &self,
        address: Address,
        token: Option<&str>,
    ) -> Result<ComputedScore, BackendError>;

    /// Score card signed for submission
    async fn sign_card(
        &self,
        request: &SignCardRequest,
        token: Option<&str>,
    ) -> Result<SignedScoreCard, BackendError>;

    /// Score as currently recorded by the contract
    async fn onchain_score(
        &self,
        address: Address,
        token: Option<&str>,
    ) -> Result<TrustScoreResult, BackendError>;

    async fn dashboard_summary(
        &self,
        address: Address,
        token: Option<&str>,
    ) -> Result<DashboardSummary, BackendError>;

    async fn badges(&self, address: Address, token: Option<&str>)
        -> Result<Vec<Badge>, BackendError>;

    /// Liveness probe
    async fn stats(&self) -> Result<(), BackendError>;
}

#[derive(Debug, Default, Deserialize)]
struct NonceResponse {
    #[serde(default)]
    nonce: String,
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    address: String,
    signature: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    token: String,
}

/// reqwest-backed backend client
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
    score_route: ScoreRoute,
}

impl HttpBackend {
    pub fn new(base_url: &str, score_route: ScoreRoute) -> Result<Self, BackendError> {
        let mut base = Url::parse(base_url.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            base,
            score_route,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.base.join(path)?)
    }

    fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token.filter(|t| !t.is_empty()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T, Q>(&self, path: &str, query: &Q, token: Option<&str>) -> Result<T, BackendError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.endpoint(path)?;
        debug!("GET {}", url);
        let request = Self::authorize(self.client.get(url).query(query), token);
        Self::decode(request.send().await?).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

fn address_param(address: Address) -> String {
    to_checksum(&address, None)
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn nonce(&self, address: Address) -> Result<String, BackendError> {
        let response: NonceResponse = self
            .get_json("auth/nonce", &[("address", address_param(address))], None)
            .await?;
        Ok(response.nonce)
    }

    async fn verify(&self, address: Address, signature: &str) -> Result<String, BackendError> {
        let url = self.endpoint("auth/verify")?;
        debug!("POST {}", url);
        let body = VerifyRequest {
            address: address_param(address),
            signature,
        };
        let response: VerifyResponse =
            Self::decode(self.client.post(url).json(&body).send().await?).await?;
        Ok(response.token)
    }

    async fn score(
        &self,
        address: Address,
        token: Option<&str>,
    ) -> Result<ComputedScore, BackendError> {
        let address = address_param(address);
        match self.score_route {
            ScoreRoute::Direct => {
                self.get_json(
                    self.score_route.path(),
                    &[("address", address.as_str()), ("details", "true")],
                    token,
                )
                .await
            }
            ScoreRoute::Bff => {
                self.get_json(self.score_route.path(), &[("address", address.as_str())], token)
                    .await
            }
        }
    }

    async fn sign_card(
        &self,
        request: &SignCardRequest,
        token: Option<&str>,
    ) -> Result<SignedScoreCard, BackendError> {
        self.get_json("score/sign_card", request, token).await
    }

    async fn onchain_score(
        &self,
        address: Address,
        token: Option<&str>,
    ) -> Result<TrustScoreResult, BackendError> {
        self.get_json("onchain/score", &[("address", address_param(address))], token)
            .await
    }

    async fn dashboard_summary(
        &self,
        address: Address,
        token: Option<&str>,
    ) -> Result<DashboardSummary, BackendError> {
        self.get_json(
            "dashboard/summary",
            &[("address", address_param(address))],
            token,
        )
        .await
    }

    async fn badges(
        &self,
        address: Address,
        token: Option<&str>,
    ) -> Result<Vec<Badge>, BackendError> {
        let list: BadgeList = self
            .get_json("badges", &[("address", address_param(address))], token)
            .await?;
        Ok(list.badges)
    }

    async fn stats(&self) -> Result<(), BackendError> {
        let url = self.endpoint("stats")?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: String::new(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let backend = HttpBackend::new("http://localhost:8000/api", ScoreRoute::Direct).unwrap();
        assert_eq!(backend.base_url().as_str(), "http://localhost:8000/api/");
        assert_eq!(
            backend.endpoint("onchain/score").unwrap().as_str(),
            "http://localhost:8000/api/onchain/score"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpBackend::new("not a url", ScoreRoute::Direct),
            Err(BackendError::Url(_))
        ));
    }
}
