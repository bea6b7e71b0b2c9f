//! Scripted gateway for integration testing.
//!
//! Provides a deterministic `RemoteDataGateway` whose per-cycle latency and
//! failures are controlled from test code. Each cycle's balance total equals
//! its 1-based cycle number, so tests can tell which cycle wrote a snapshot.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use paydesk::fees::catalog::PaymentMethodId;
use paydesk::gateway::RemoteDataGateway;
use paydesk::identity::Credential;
use paydesk::types::*;

pub const INIT_DATA: &str =
    "user=%7B%22id%22%3A12345%2C%22username%22%3A%22local_dev%22%7D&auth_date=1700000000&hash=abc";

pub fn credential() -> Credential {
    Credential::new(INIT_DATA).unwrap()
}

/// A scripted remote service.
pub struct ScriptedGateway {
    balance_calls: AtomicUsize,
    statistics_calls: AtomicUsize,
    transactions_calls: AtomicUsize,
    /// Latency of every read in cycle `n` (index); last entry repeats.
    latencies: Mutex<Vec<Duration>>,
    /// Endpoint that fails, with its latency.
    failing: Mutex<Option<(Endpoint, Duration)>>,
    /// Whether reads without a credential are refused (like the real service).
    require_credential: bool,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            balance_calls: AtomicUsize::new(0),
            statistics_calls: AtomicUsize::new(0),
            transactions_calls: AtomicUsize::new(0),
            latencies: Mutex::new(vec![Duration::ZERO]),
            failing: Mutex::new(None),
            require_credential: true,
        }
    }

    pub fn with_latencies(latencies: Vec<Duration>) -> Self {
        let gw = Self::new();
        *gw.latencies.lock().unwrap() = latencies;
        gw
    }

    /// Make `endpoint` fail after `after`; the other two keep succeeding.
    pub fn fail(&self, endpoint: Endpoint, after: Duration) {
        *self.failing.lock().unwrap() = Some((endpoint, after));
    }

    pub fn heal(&self) {
        *self.failing.lock().unwrap() = None;
    }

    /// Number of cycles that reached the balance read.
    pub fn cycles(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self, endpoint: Endpoint) -> usize {
        match endpoint {
            Endpoint::Balance => self.balance_calls.load(Ordering::SeqCst),
            Endpoint::Statistics => self.statistics_calls.load(Ordering::SeqCst),
            Endpoint::Transactions => self.transactions_calls.load(Ordering::SeqCst),
            Endpoint::BuyerLookup | Endpoint::AccessStatus | Endpoint::ReferralCode => 0,
        }
    }

    fn latency(&self, cycle: usize) -> Duration {
        let latencies = self.latencies.lock().unwrap();
        latencies
            .get(cycle)
            .or(latencies.last())
            .copied()
            .unwrap_or_default()
    }

    async fn read(
        &self,
        endpoint: Endpoint,
        counter: &AtomicUsize,
        credential: &Option<Credential>,
    ) -> Result<usize> {
        let cycle = counter.fetch_add(1, Ordering::SeqCst);
        let failing = *self.failing.lock().unwrap();
        if let Some((bad, after)) = failing {
            if bad == endpoint {
                tokio::time::sleep(after).await;
                return Err(anyhow!("{endpoint} failed 500 Internal Server Error"));
            }
        }
        tokio::time::sleep(self.latency(cycle)).await;
        if self.require_credential && credential.is_none() {
            return Err(anyhow!("{endpoint} failed 401 Unauthorized: Telegram init data required"));
        }
        Ok(cycle + 1)
    }
}

#[async_trait]
impl RemoteDataGateway for ScriptedGateway {
    async fn get_balance(&self, credential: Option<Credential>) -> Result<Balance> {
        let cycle = self.read(Endpoint::Balance, &self.balance_calls, &credential).await?;
        Ok(Balance {
            total: Decimal::from(cycle as u64),
            paypal: Decimal::from(cycle as u64),
            ..Balance::default()
        })
    }

    async fn get_statistics(&self, credential: Option<Credential>) -> Result<Statistics> {
        let cycle = self.read(Endpoint::Statistics, &self.statistics_calls, &credential).await?;
        Ok(Statistics {
            total_checks: cycle as u64,
            ..Statistics::default()
        })
    }

    async fn get_transactions(
        &self,
        credential: Option<Credential>,
        limit: u32,
    ) -> Result<Vec<Transaction>> {
        let cycle = self
            .read(Endpoint::Transactions, &self.transactions_calls, &credential)
            .await?;
        let rows = (cycle as u32).min(limit);
        Ok((0..rows)
            .map(|i| Transaction {
                id: i as i64 + 1,
                payment_method: "PayPal".to_string(),
                amount: Decimal::from(100 + i),
                status: TransactionStatus::Completed,
                created_at: Utc::now(),
            })
            .collect())
    }

    async fn create_transaction_ticket(
        &self,
        _credential: Credential,
        _method: PaymentMethodId,
        _amount: Decimal,
        _currency: String,
    ) -> Result<TicketReceipt> {
        Err(anyhow!("tickets are not scripted"))
    }

    async fn lookup_buyer(&self, _credential: Credential, _email: String) -> Result<Option<BuyerStats>> {
        Ok(None)
    }

    async fn access_status(&self, _credential: Credential) -> Result<AccessStatus> {
        Ok(AccessStatus::default())
    }

    async fn update_referral_code(&self, _credential: Credential, code: String) -> Result<String> {
        Ok(code)
    }
}
