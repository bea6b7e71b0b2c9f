//! Fee computation engine.
//!
//! Turns a gross sale amount into the net payout after four ordered
//! deduction stages:
//!
//! 1. exchange-method fee (the rail's commission, on the gross amount)
//! 2. internal percentage fee (on the *gross* amount, not the running balance)
//! 3. internal fixed fee (flat)
//! 4. P2P fee (on the balance left after stages 1–3)
//!
//! followed by directional rounding and a floor at zero. All arithmetic is
//! `Decimal`, so repeated calls on the same input are bit-identical.

pub mod catalog;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::debug;

use crate::types::DeskError;
use catalog::{PaymentMethod, PaymentMethodCatalog, PaymentMethodId};

const HUNDRED: Decimal = dec!(100);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Operator-side commission schedule applied after the rail's own fee.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeSchedule {
    /// Internal commission in percent of the gross amount.
    pub internal_percent: Decimal,
    /// Flat internal commission in currency units.
    pub internal_fixed: Decimal,
    /// P2P commission in percent of the balance after internal fees.
    pub p2p_percent: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            internal_percent: dec!(7),
            internal_fixed: dec!(5),
            p2p_percent: dec!(3),
        }
    }
}

// ---------------------------------------------------------------------------
// Breakdown
// ---------------------------------------------------------------------------

/// Every stage of one fee calculation. Intermediate values may be negative
/// when fees exceed the gross amount; only `net_amount` is floored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeBreakdown {
    pub method: PaymentMethodId,
    pub gross_amount: Decimal,
    pub exchange_fee_percent: Decimal,
    pub exchange_fee: Decimal,
    pub internal_fee_percent_part: Decimal,
    pub internal_fee_fixed_part: Decimal,
    pub p2p_fee: Decimal,
    pub before_rounding: Decimal,
    /// Whole-unit payout, never negative.
    pub net_amount: Decimal,
}

/// Share of the gross amount that reaches the user vs. goes to fees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayoutDistribution {
    pub net_pct: Decimal,
    pub fees_pct: Decimal,
}

impl FeeBreakdown {
    /// Percentage plus fixed internal commission.
    pub fn internal_fee_total(&self) -> Decimal {
        self.internal_fee_percent_part + self.internal_fee_fixed_part
    }

    /// Sum of all four stage fees (before rounding).
    pub fn total_fees(&self) -> Decimal {
        self.exchange_fee + self.internal_fee_total() + self.p2p_fee
    }

    /// Net payout and fees as percentages of the gross amount. The two need
    /// not sum to 100: rounding and the zero floor are not redistributed.
    pub fn distribution(&self) -> PayoutDistribution {
        PayoutDistribution {
            net_pct: self.net_amount / self.gross_amount * HUNDRED,
            fees_pct: self.total_fees() / self.gross_amount * HUNDRED,
        }
    }
}

impl std::fmt::Display for FeeBreakdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ${:.2}: exchange -${:.2} ({}%) | internal -${:.2} | p2p -${:.2} | net ${}",
            self.method,
            self.gross_amount,
            self.exchange_fee,
            self.exchange_fee_percent.normalize(),
            self.internal_fee_total(),
            self.p2p_fee,
            self.net_amount,
        )
    }
}

// ---------------------------------------------------------------------------
// Rounding
// ---------------------------------------------------------------------------

/// Round to a whole unit: a fractional part of 0.5 or more goes up (in the
/// user's favour), anything below goes down (in the operator's favour).
pub fn round_payout(value: Decimal) -> Decimal {
    let floor = value.floor();
    if value - floor >= dec!(0.5) {
        value.ceil()
    } else {
        floor
    }
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Pure fee pipeline over a commission schedule.
#[derive(Debug, Clone, Default)]
pub struct FeeCalculator {
    schedule: FeeSchedule,
}

impl FeeCalculator {
    pub fn new(schedule: FeeSchedule) -> Self {
        Self { schedule }
    }

    /// Access the commission schedule.
    pub fn schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    /// Compute the breakdown for a catalog method.
    pub fn compute(
        &self,
        gross_amount: Decimal,
        method: PaymentMethodId,
    ) -> Result<FeeBreakdown, DeskError> {
        self.compute_for(gross_amount, PaymentMethodCatalog::get(method))
    }

    /// Compute the breakdown against an explicit method entry.
    pub fn compute_for(
        &self,
        gross_amount: Decimal,
        method: &PaymentMethod,
    ) -> Result<FeeBreakdown, DeskError> {
        if gross_amount <= Decimal::ZERO {
            return Err(DeskError::InvalidAmount(gross_amount));
        }
        let s = &self.schedule;
        let out_of_range = || {
            debug!(method = %method.id, gross = %gross_amount, "Fee pipeline out of Decimal range");
            DeskError::InvalidAmount(gross_amount)
        };
        // Rates are scaled first so `base * rate` stays in range up to Decimal::MAX.
        let percent_of = |base: Decimal, rate: Decimal| {
            rate.checked_div(HUNDRED)
                .and_then(|r| base.checked_mul(r))
                .ok_or_else(out_of_range)
        };
        let minus = |a: Decimal, b: Decimal| a.checked_sub(b).ok_or_else(out_of_range);

        let exchange_fee = percent_of(gross_amount, method.fee_percent)?;
        let after_exchange = minus(gross_amount, exchange_fee)?;

        // Stage 2 is based on the gross amount, unlike stage 4.
        let internal_percent_part = percent_of(gross_amount, s.internal_percent)?;
        let after_internal_percent = minus(after_exchange, internal_percent_part)?;

        let after_internal_fixed = minus(after_internal_percent, s.internal_fixed)?;

        let p2p_fee = percent_of(after_internal_fixed, s.p2p_percent)?;
        let before_rounding = minus(after_internal_fixed, p2p_fee)?;

        let net_amount = round_payout(before_rounding).max(Decimal::ZERO);

        debug!(
            method = %method.id,
            gross = %gross_amount,
            before_rounding = %before_rounding,
            net = %net_amount,
            "Fee breakdown computed"
        );

        Ok(FeeBreakdown {
            method: method.id,
            gross_amount,
            exchange_fee_percent: method.fee_percent,
            exchange_fee,
            internal_fee_percent_part: internal_percent_part,
            internal_fee_fixed_part: s.internal_fixed,
            p2p_fee,
            before_rounding,
            net_amount,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
