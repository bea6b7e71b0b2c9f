//! Account-level calls outside the bootstrap cycle.
//!
//! Access status decides whether premium features such as the buyer lookup
//! are shown; it also carries the user's referral code. Every call needs a
//! host credential and none touches the bootstrap state or snapshot.

use tracing::{debug, info, warn};

use crate::gateway::RemoteDataGateway;
use crate::identity::{Credential, IdentitySource};
use crate::types::{AccessStatus, BuyerStats, DeskError, Endpoint};

fn require_identity(identity: &dyn IdentitySource) -> Result<Credential, DeskError> {
    identity.current().ok_or(DeskError::IdentityUnavailable)
}

fn remote_failure(endpoint: Endpoint, e: anyhow::Error) -> DeskError {
    warn!(endpoint = %endpoint, error = %e, "Account call failed");
    DeskError::RemoteCallFailure {
        endpoint,
        message: format!("{e:#}"),
    }
}

/// Fetch the user's access and premium status.
pub async fn check_access(
    gateway: &dyn RemoteDataGateway,
    identity: &dyn IdentitySource,
) -> Result<AccessStatus, DeskError> {
    let credential = require_identity(identity)?;
    gateway
        .access_status(credential)
        .await
        .map_err(|e| remote_failure(Endpoint::AccessStatus, e))
}

/// Look up a buyer's history by e-mail.
///
/// A blank e-mail is not sent. `Ok(None)` means the service has no record.
/// Callers should only offer this when [`AccessStatus::can_lookup_buyer`]
/// is set; the service enforces it either way.
pub async fn lookup_buyer(
    gateway: &dyn RemoteDataGateway,
    identity: &dyn IdentitySource,
    email: &str,
) -> Result<Option<BuyerStats>, DeskError> {
    let email = email.trim();
    if email.is_empty() {
        return Ok(None);
    }
    let credential = require_identity(identity)?;

    let found = gateway
        .lookup_buyer(credential, email.to_lowercase())
        .await
        .map_err(|e| remote_failure(Endpoint::BuyerLookup, e))?;
    debug!(found = found.is_some(), "Buyer lookup finished");
    Ok(found)
}

/// Upper-case `code` and check it is 3-20 ASCII letters or digits.
pub fn normalize_referral_code(code: &str) -> Result<String, DeskError> {
    let code = code.trim().to_ascii_uppercase();
    let len = code.chars().count();
    if !(3..=20).contains(&len) || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(DeskError::InvalidReferralCode(code));
    }
    Ok(code)
}

/// Set a custom referral code. Returns the code the service stored.
///
/// The service additionally requires a minimum turnover and a free code;
/// those refusals come back as `RemoteCallFailure` with its reason.
pub async fn update_referral_code(
    gateway: &dyn RemoteDataGateway,
    identity: &dyn IdentitySource,
    code: &str,
) -> Result<String, DeskError> {
    let code = normalize_referral_code(code)?;
    let credential = require_identity(identity)?;

    let stored = gateway
        .update_referral_code(credential, code)
        .await
        .map_err(|e| remote_failure(Endpoint::ReferralCode, e))?;
    info!(code = %stored, "Referral code set");
    Ok(stored)
}

/// Deep link that starts `bot_username` with the referral `code`.
pub fn referral_link(bot_username: &str, code: &str) -> String {
    format!(
        "https://t.me/{}?start={}",
        bot_username.trim_start_matches('@'),
        urlencoding::encode(code)
    )
}
