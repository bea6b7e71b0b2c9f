//! HTTP binding of the remote data gateway.
//!
//! Endpoints (relative to the configured base URL):
//! - `GET  /balance`
//! - `GET  /statistics`
//! - `GET  /transactions?limit={n}`
//! - `POST /transactions` with `{payment_method, amount, currency}`
//! - `GET  /buyer/lookup?email={e}`
//! - `GET  /access-status`
//! - `POST /user/referral_code` with `{new_code}`
//!
//! Auth: the host init data travels verbatim in `X-Telegram-Init-Data`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::RemoteDataGateway;
use crate::fees::catalog::{PaymentMethodCatalog, PaymentMethodId};
use crate::identity::Credential;
use crate::types::{AccessStatus, Balance, BuyerStats, Statistics, TicketReceipt, Transaction};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const INIT_DATA_HEADER: &str = "X-Telegram-Init-Data";

/// The service sits behind a tunnel that serves an interstitial page unless
/// this header is present.
const TUNNEL_HEADER: &str = "ngrok-skip-browser-warning";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TransactionsEnvelope {
    #[serde(default)]
    transactions: Vec<Transaction>,
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Serialize)]
struct ReferralCodeBody<'a> {
    new_code: &'a str,
}

#[derive(Debug, Deserialize)]
struct ReferralCodeReply {
    new_code: String,
}

/// Error body of the service: `{"detail": "..."}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Debug, Serialize)]
struct TicketBody<'a> {
    payment_method: &'a str,
    amount: Decimal,
    currency: &'a str,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// reqwest-backed `RemoteDataGateway`.
pub struct HttpGateway {
    http: Client,
    base_url: String,
}

impl HttpGateway {
    /// Create a gateway for `base_url` (e.g. `https://host/api`).
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let builder = Client::builder()
            .timeout(timeout.unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)))
            .user_agent("PAYDESK/0.1.0 (dashboard-client)");
        Self::with_builder(base_url, builder)
    }

    fn with_builder(base_url: &str, builder: reqwest::ClientBuilder) -> Result<Self> {
        let http = builder
            .build()
            .context("Failed to build HTTP client for remote gateway")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -- Internal helpers ------------------------------------------------

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(builder: RequestBuilder, credential: Option<&Credential>) -> RequestBuilder {
        let builder = builder.header(TUNNEL_HEADER, "true");
        match credential {
            Some(c) => builder.header(INIT_DATA_HEADER, c.expose()),
            None => builder,
        }
    }

    /// Fail on any non-2xx status, keeping the service's `detail` (or the
    /// raw body) for diagnostics.
    async fn ensure_success(resp: Response, what: &str) -> Result<Response> {
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.detail)
                .unwrap_or(body);
            anyhow::bail!("{what} failed {status}: {reason}");
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        credential: Option<&Credential>,
        what: &str,
    ) -> Result<T> {
        let url = self.url(path);
        debug!(url = %url, authenticated = credential.is_some(), "Gateway GET");

        let resp = Self::authorize(self.http.get(&url), credential)
            .send()
            .await
            .with_context(|| format!("{what} request failed"))?;

        Self::ensure_success(resp, what)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse {what} response"))
    }
}

// ---------------------------------------------------------------------------
// RemoteDataGateway trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl RemoteDataGateway for HttpGateway {
    async fn get_balance(&self, credential: Option<Credential>) -> Result<Balance> {
        let balance: Balance = self.get_json("balance", credential.as_ref(), "Balance").await?;
        debug!(total = %balance.total, "Balance loaded");
        Ok(balance)
    }

    async fn get_statistics(&self, credential: Option<Credential>) -> Result<Statistics> {
        self.get_json("statistics", credential.as_ref(), "Statistics").await
    }

    async fn get_transactions(
        &self,
        credential: Option<Credential>,
        limit: u32,
    ) -> Result<Vec<Transaction>> {
        let envelope: TransactionsEnvelope = self
            .get_json(
                &format!("transactions?limit={limit}"),
                credential.as_ref(),
                "Transactions",
            )
            .await?;
        debug!(
            count = envelope.transactions.len(),
            total = envelope.total,
            "Transactions loaded"
        );
        Ok(envelope.transactions)
    }

    async fn create_transaction_ticket(
        &self,
        credential: Credential,
        method: PaymentMethodId,
        amount: Decimal,
        currency: String,
    ) -> Result<TicketReceipt> {
        let body = TicketBody {
            payment_method: PaymentMethodCatalog::get(method).display_name,
            amount,
            currency: &currency,
        };

        let resp = Self::authorize(self.http.post(self.url("transactions")), Some(&credential))
            .json(&body)
            .send()
            .await
            .context("Ticket request failed")?;

        let receipt: TicketReceipt = Self::ensure_success(resp, "Ticket")
            .await?
            .json()
            .await
            .context("Failed to parse ticket response")?;

        info!(
            ticket_id = receipt.ticket_id,
            method = %method,
            amount = %amount,
            currency = %currency,
            "Ticket created"
        );
        Ok(receipt)
    }

    async fn lookup_buyer(&self, credential: Credential, email: String) -> Result<Option<BuyerStats>> {
        let url = self.url(&format!("buyer/lookup?email={}", urlencoding::encode(&email)));

        let resp = Self::authorize(self.http.get(&url), Some(&credential))
            .send()
            .await
            .context("Buyer lookup request failed")?;

        if resp.status() == StatusCode::NOT_FOUND {
            debug!("Buyer not found");
            return Ok(None);
        }

        let stats = Self::ensure_success(resp, "Buyer lookup")
            .await?
            .json()
            .await
            .context("Failed to parse buyer lookup response")?;
        Ok(Some(stats))
    }

    async fn access_status(&self, credential: Credential) -> Result<AccessStatus> {
        self.get_json("access-status", Some(&credential), "Access status").await
    }

    async fn update_referral_code(&self, credential: Credential, code: String) -> Result<String> {
        let resp = Self::authorize(self.http.post(self.url("user/referral_code")), Some(&credential))
            .json(&ReferralCodeBody { new_code: &code })
            .send()
            .await
            .context("Referral code request failed")?;

        let reply: ReferralCodeReply = Self::ensure_success(resp, "Referral code")
            .await?
            .json()
            .await
            .context("Failed to parse referral code response")?;

        info!(code = %reply.new_code, "Referral code updated");
        Ok(reply.new_code)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
