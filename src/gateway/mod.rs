//! Remote data gateway.
//!
//! Defines the `RemoteDataGateway` trait the bootstrap cycle and the ticket
//! flow talk to, plus the reqwest-backed implementation in [`http`].

pub mod http;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::fees::catalog::PaymentMethodId;
use crate::identity::Credential;
use crate::types::{AccessStatus, Balance, BuyerStats, Statistics, TicketReceipt, Transaction};

/// Abstraction over the dashboard's remote service.
///
/// Read calls take an optional credential: the bootstrap fallback may
/// proceed without one, in which case the service is expected to refuse.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteDataGateway: Send + Sync {
    /// Current per-rail balances.
    async fn get_balance(&self, credential: Option<Credential>) -> Result<Balance>;

    /// Lifetime and monthly statistics.
    async fn get_statistics(&self, credential: Option<Credential>) -> Result<Statistics>;

    /// Most recent transactions, newest first, at most `limit`.
    async fn get_transactions(
        &self,
        credential: Option<Credential>,
        limit: u32,
    ) -> Result<Vec<Transaction>>;

    /// Open a ticket for a sale the user wants to cash out.
    async fn create_transaction_ticket(
        &self,
        credential: Credential,
        method: PaymentMethodId,
        amount: Decimal,
        currency: String,
    ) -> Result<TicketReceipt>;

    /// History of a buyer e-mail. `None` when the service does not know it.
    async fn lookup_buyer(&self, credential: Credential, email: String) -> Result<Option<BuyerStats>>;

    /// Whether the user may see their data and use premium lookups.
    async fn access_status(&self, credential: Credential) -> Result<AccessStatus>;

    /// Replace the user's referral code. Returns the code the service stored.
    async fn update_referral_code(&self, credential: Credential, code: String) -> Result<String>;
}
