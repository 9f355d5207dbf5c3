//! Payment gateway capability used by the payout workflow.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Status of a payout as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum GatewayPayoutStatus {
    Pending,
    Completed {
        #[serde(default)]
        gateway_id: Option<String>,
    },
    Failed {
        #[serde(default)]
        reason: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway definitively refused the payout. Safe to compensate.
    #[error("gateway rejected payout: {0}")]
    Rejected(String),

    /// The gateway has no record of the reference.
    #[error("gateway has no payout {0}")]
    UnknownPayout(String),

    /// Transport failure; the outcome is unknown.
    #[error("gateway request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server-side failure; the outcome is unknown.
    #[error("gateway returned {status}: {body}")]
    Unavailable { status: u16, body: String },
}

#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Ask the gateway to send `amount` to `bank_details`. Returns the
    /// gateway's id for the payout. Must be safe to repeat for one `payout_id`.
    async fn execute_payout(
        &self,
        payout_id: Uuid,
        amount: i64,
        bank_details: &serde_json::Value,
    ) -> Result<String, GatewayError>;

    /// Look a payout up by gateway id, or by payout id when execution never
    /// returned one.
    async fn check_status(&self, reference: &str) -> Result<GatewayPayoutStatus, GatewayError>;
}

#[derive(Debug, Serialize)]
struct ExecutePayoutBody<'a> {
    payout_id: Uuid,
    amount: i64,
    bank_details: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ExecutePayoutReply {
    gateway_id: String,
}

/// JSON-over-HTTP gateway adapter.
///
/// - `POST {base}/payouts` with the payout id as `Idempotency-Key`
/// - `GET {base}/payouts/{reference}`
///
/// 4xx on execute is a definitive rejection; 404 on lookup means unknown.
#[derive(Debug, Clone)]
pub struct HttpGatewayClient {
    base: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl HttpGatewayClient {
    pub fn new(base_url: &Url, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            base: base_url.as_str().trim_end_matches('/').to_string(),
            api_key,
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    #[tracing::instrument(skip_all, err, fields(payout_id = %payout_id))]
    async fn execute_payout(
        &self,
        payout_id: Uuid,
        amount: i64,
        bank_details: &serde_json::Value,
    ) -> Result<String, GatewayError> {
        let body = ExecutePayoutBody {
            payout_id,
            amount,
            bank_details,
        };
        let response = self
            .authorize(self.http_client.post(format!("{}/payouts", self.base)))
            .header("Idempotency-Key", payout_id.to_string())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let reply: ExecutePayoutReply = response.json().await?;
            return Ok(reply.gateway_id);
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            Err(GatewayError::Rejected(body))
        } else {
            Err(GatewayError::Unavailable {
                status: status.as_u16(),
                body,
            })
        }
    }

    #[tracing::instrument(skip_all, err, fields(reference = %reference))]
    async fn check_status(&self, reference: &str) -> Result<GatewayPayoutStatus, GatewayError> {
        let response = self
            .authorize(
                self.http_client
                    .get(format!("{}/payouts/{reference}", self.base)),
            )
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::UnknownPayout(reference.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Unavailable {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}
