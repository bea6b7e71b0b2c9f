//! Payment method catalog.
//!
//! Static registry of the payment rails a sale can arrive through and the
//! commission each rail charges. Business configuration, not user input.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment rail identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethodId {
    Paypal,
    Bank,
    Stripe,
}

impl PaymentMethodId {
    /// All known methods, in display order.
    pub const ALL: &'static [PaymentMethodId] = &[
        PaymentMethodId::Paypal,
        PaymentMethodId::Bank,
        PaymentMethodId::Stripe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethodId::Paypal => "paypal",
            PaymentMethodId::Bank => "bank",
            PaymentMethodId::Stripe => "stripe",
        }
    }
}

impl fmt::Display for PaymentMethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parse a method from its id, its display name, or a chat-bot callback
/// token such as `pay_paypal` or `stripe_card` (case-insensitive).
impl std::str::FromStr for PaymentMethodId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s.contains("paypal") {
            Ok(PaymentMethodId::Paypal)
        } else if s.contains("bank") {
            Ok(PaymentMethodId::Bank)
        } else if s.contains("stripe") {
            Ok(PaymentMethodId::Stripe)
        } else {
            Err(anyhow::anyhow!("Unknown payment method: {s}"))
        }
    }
}

/// A payment rail and its commission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub display_name: &'static str,
    /// Commission in percent of the gross amount (6.0 = 6 %).
    pub fee_percent: Decimal,
}

static METHODS: [PaymentMethod; 3] = [
    PaymentMethod {
        id: PaymentMethodId::Paypal,
        display_name: "PayPal",
        fee_percent: dec!(6.0),
    },
    PaymentMethod {
        id: PaymentMethodId::Bank,
        display_name: "Bank",
        fee_percent: dec!(8.5),
    },
    PaymentMethod {
        id: PaymentMethodId::Stripe,
        display_name: "Stripe",
        fee_percent: dec!(7.0),
    },
];

/// Read-only lookup from method id to its catalog entry.
pub struct PaymentMethodCatalog;

impl PaymentMethodCatalog {
    /// Catalog entry for `id`. Every id has exactly one entry.
    pub fn get(id: PaymentMethodId) -> &'static PaymentMethod {
        match id {
            PaymentMethodId::Paypal => &METHODS[0],
            PaymentMethodId::Bank => &METHODS[1],
            PaymentMethodId::Stripe => &METHODS[2],
        }
    }

    /// All entries, in display order.
    pub fn all() -> &'static [PaymentMethod] {
        &METHODS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_percentages() {
        assert_eq!(PaymentMethodCatalog::get(PaymentMethodId::Paypal).fee_percent, dec!(6));
        assert_eq!(PaymentMethodCatalog::get(PaymentMethodId::Bank).fee_percent, dec!(8.5));
        assert_eq!(PaymentMethodCatalog::get(PaymentMethodId::Stripe).fee_percent, dec!(7));
    }

    #[test]
    fn test_get_matches_id() {
        for id in PaymentMethodId::ALL {
            assert_eq!(PaymentMethodCatalog::get(*id).id, *id);
        }
        assert_eq!(PaymentMethodCatalog::all().len(), PaymentMethodId::ALL.len());
    }

    #[test]
    fn test_from_str_forms() {
        assert_eq!("paypal".parse::<PaymentMethodId>().unwrap(), PaymentMethodId::Paypal);
        assert_eq!("PayPal".parse::<PaymentMethodId>().unwrap(), PaymentMethodId::Paypal);
        assert_eq!("pay_paypal".parse::<PaymentMethodId>().unwrap(), PaymentMethodId::Paypal);
        assert_eq!("Bank".parse::<PaymentMethodId>().unwrap(), PaymentMethodId::Bank);
        assert_eq!("stripe_apple".parse::<PaymentMethodId>().unwrap(), PaymentMethodId::Stripe);
        assert!("pay_crypto".parse::<PaymentMethodId>().is_err());
    }

    #[test]
    fn test_display_names() {
        let names: Vec<_> = PaymentMethodCatalog::all().iter().map(|m| m.display_name).collect();
        assert_eq!(names, vec!["PayPal", "Bank", "Stripe"]);
    }
}
