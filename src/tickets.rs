//! Cash-out ticket submission.
//!
//! After the user has priced a sale with the fee calculator they can open a
//! ticket for it. Ticket failures are reported to the caller only and never
//! touch the bootstrap state.

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::fees::catalog::PaymentMethodId;
use crate::fees::FeeBreakdown;
use crate::gateway::RemoteDataGateway;
use crate::identity::IdentitySource;
use crate::types::{DeskError, TicketReceipt};

/// Open a ticket for `amount` through `method`.
///
/// Requires a host credential: tickets are never created anonymously.
pub async fn submit_ticket(
    gateway: &dyn RemoteDataGateway,
    identity: &dyn IdentitySource,
    method: PaymentMethodId,
    amount: Decimal,
    currency: &str,
) -> Result<TicketReceipt, DeskError> {
    if amount <= Decimal::ZERO {
        return Err(DeskError::InvalidAmount(amount));
    }
    let credential = identity.current().ok_or_else(|| {
        warn!("Ticket refused: open the dashboard inside the host to create a ticket");
        DeskError::IdentityUnavailable
    })?;

    match gateway
        .create_transaction_ticket(credential, method, amount, currency.to_string())
        .await
    {
        Ok(receipt) => {
            info!(ticket_id = receipt.ticket_id, method = %method, amount = %amount, "Ticket submitted");
            Ok(receipt)
        }
        Err(e) => {
            warn!(method = %method, amount = %amount, error = %e, "Ticket submission failed");
            Err(DeskError::TicketCreationFailure(format!("{e:#}")))
        }
    }
}

/// Open a ticket for the gross amount of a computed breakdown.
pub async fn submit_quote(
    gateway: &dyn RemoteDataGateway,
    identity: &dyn IdentitySource,
    quote: &FeeBreakdown,
    currency: &str,
) -> Result<TicketReceipt, DeskError> {
    submit_ticket(gateway, identity, quote.method, quote.gross_amount, currency).await
}
