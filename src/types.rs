//! Shared types for the PAYDESK client core.
//!
//! These types form the data model used across all modules: the three
//! remote aggregates (balance, statistics, transactions), the snapshot
//! that bundles them, the bootstrap state, and the domain error enum.
//! Wire field names follow the remote service's JSON exactly.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Total withdrawn sum at which the VIP progress bar is full.
pub const VIP_THRESHOLD: Decimal = dec!(2000);

// ---------------------------------------------------------------------------
// Balance
// ---------------------------------------------------------------------------

/// Per-rail balances of the current user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub total: Decimal,
    pub paypal: Decimal,
    pub stripe: Decimal,
    pub withdrawal: Decimal,
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total=${:.2} (paypal=${:.2} stripe=${:.2} withdrawal=${:.2})",
            self.total, self.paypal, self.stripe, self.withdrawal,
        )
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Lifetime and per-month averages over completed withdrawals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub avg_check: Decimal,
    pub total_checks: u64,
    pub total_sum: Decimal,
    pub avg_checks_month: Decimal,
    pub avg_sum_month: Decimal,
}

impl Statistics {
    /// Progress towards the VIP tier as a percentage, capped at 100.
    pub fn vip_progress_pct(&self) -> Decimal {
        if self.total_sum <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.total_sum / VIP_THRESHOLD * dec!(100)).min(dec!(100))
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checks={} sum=${:.2} avg=${:.2} | monthly: checks={:.1} sum=${:.2}",
            self.total_checks,
            self.total_sum,
            self.avg_check,
            self.avg_checks_month,
            self.avg_sum_month,
        )
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Lifecycle status of a remote transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Cancelled,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Completed => write!(f, "completed"),
            TransactionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Unknown status strings are treated as pending: the service only ever
/// promotes a row to completed once the withdrawal is received.
impl<'de> Deserialize<'de> for TransactionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.to_lowercase().as_str() {
            "completed" | "complete" | "done" => TransactionStatus::Completed,
            "cancelled" | "canceled" => TransactionStatus::Cancelled,
            _ => TransactionStatus::Pending,
        })
    }
}

/// A transaction as reported by the remote service. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub payment_method: String,
    pub amount: Decimal,
    pub status: TransactionStatus,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} ${:.2} [{}] {}",
            self.id,
            self.payment_method,
            self.amount,
            self.status,
            self.created_at.format("%Y-%m-%d"),
        )
    }
}

/// Accepts RFC 3339, naive `YYYY-MM-DDTHH:MM:SS[.f]` (taken as UTC) and
/// bare dates, which is everything the service's `isoformat()` emits.
fn deserialize_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("bad timestamp: {raw}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The latest balance, statistics and transaction list, captured together
/// by one successful fetch cycle. Never partially updated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataStore {
    pub balance: Balance,
    pub stats: Statistics,
    pub transactions: Vec<Transaction>,
    /// When the cycle that produced this snapshot completed. `None` for the
    /// empty initial snapshot.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl DataStore {
    /// Whether this is the empty snapshot no cycle has written yet.
    pub fn is_empty(&self) -> bool {
        self.fetched_at.is_none()
    }

    /// Age of the snapshot, if one has been fetched.
    pub fn age(&self) -> Option<chrono::Duration> {
        self.fetched_at.map(|at| Utc::now() - at)
    }
}

// ---------------------------------------------------------------------------
// Account extras (outside the bootstrap cycle)
// ---------------------------------------------------------------------------

/// Receipt for a ticket created through `POST /transactions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketReceipt {
    #[serde(rename = "transaction_id")]
    pub ticket_id: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for TicketReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ticket #{} [{}] {}", self.ticket_id, self.status, self.message)
    }
}

/// Data-access and premium-feature status of the current user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessStatus {
    pub has_access: bool,
    pub total_earnings: Decimal,
    pub threshold_amount: Decimal,
    pub threshold_reached: bool,
    pub progress_percentage: Decimal,
    pub is_admin: bool,
    pub can_lookup_buyer: bool,
    pub referral_code: Option<String>,
    pub is_referral_custom: bool,
}

/// Aggregate history of one buyer e-mail across all partners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyerStats {
    pub email: String,
    pub total_transactions: u64,
    /// Gross volume.
    pub total_volume: Decimal,
    /// Volume actually withdrawn.
    pub total_net: Decimal,
    #[serde(default)]
    pub first_seen: Option<String>,
    #[serde(default)]
    pub last_seen: Option<String>,
    pub unique_partners: u64,
}

// ---------------------------------------------------------------------------
// Bootstrap state
// ---------------------------------------------------------------------------

/// Bootstrap state of one client session.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    Init,
    AwaitingIdentity,
    Fetching,
    Ready,
    Failed(DeskError),
    TimedOutNoIdentity,
}

impl SyncState {
    /// Whether the view layer should still show its loading screen.
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            SyncState::Init | SyncState::AwaitingIdentity | SyncState::Fetching
        )
    }

    /// Whether the current bootstrap cycle has ended.
    pub fn is_terminal(&self) -> bool {
        !self.is_loading()
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Init => write!(f, "INIT"),
            SyncState::AwaitingIdentity => write!(f, "AWAITING_IDENTITY"),
            SyncState::Fetching => write!(f, "FETCHING"),
            SyncState::Ready => write!(f, "READY"),
            SyncState::Failed(e) => write!(f, "FAILED ({e})"),
            SyncState::TimedOutNoIdentity => write!(f, "TIMED_OUT_NO_IDENTITY"),
        }
    }
}

/// Remote read endpoints. The first three make up a fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Balance,
    Statistics,
    Transactions,
    BuyerLookup,
    AccessStatus,
    ReferralCode,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Balance => write!(f, "balance"),
            Endpoint::Statistics => write!(f, "statistics"),
            Endpoint::Transactions => write!(f, "transactions"),
            Endpoint::BuyerLookup => write!(f, "buyer lookup"),
            Endpoint::AccessStatus => write!(f, "access status"),
            Endpoint::ReferralCode => write!(f, "referral code"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for PAYDESK.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeskError {
    #[error("Invalid amount: {0} (must be positive)")]
    InvalidAmount(Decimal),

    #[error("Host identity unavailable")]
    IdentityUnavailable,

    #[error("Remote call failed ({endpoint}): {message}")]
    RemoteCallFailure { endpoint: Endpoint, message: String },

    #[error("Ticket creation failed: {0}")]
    TicketCreationFailure(String),

    #[error("Invalid referral code {0:?}: use 3-20 letters or digits")]
    InvalidReferralCode(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
