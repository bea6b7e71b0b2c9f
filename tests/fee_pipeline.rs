//! Fee pipeline through the public API.

use paydesk::fees::catalog::{PaymentMethodCatalog, PaymentMethodId};
use paydesk::fees::FeeCalculator;
use paydesk::types::DeskError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[test]
fn quotes_for_parsed_method_names() {
    let calc = FeeCalculator::default();
    let cases = [
        ("paypal", dec!(100), dec!(80)),
        ("Bank Transfer", dec!(50), dec!(36)),
        ("STRIPE", dec!(200), dec!(162)),
    ];
    for (name, gross, net) in cases {
        let id: PaymentMethodId = name.parse().unwrap();
        let quote = calc.compute(gross, id).unwrap();
        assert_eq!(quote.net_amount, net, "{name} {gross}");
        assert_eq!(quote.before_rounding + quote.total_fees(), gross);
    }
}

#[test]
fn net_never_decreases_as_gross_grows() {
    let calc = FeeCalculator::default();
    for method in PaymentMethodCatalog::all() {
        let mut previous = Decimal::ZERO;
        let mut gross = dec!(0.01);
        while gross < dec!(500) {
            let quote = calc.compute_for(gross, method).unwrap();
            assert!(quote.net_amount >= previous, "{} {gross}", method.display_name);
            assert!(quote.net_amount >= Decimal::ZERO);
            assert!(quote.net_amount <= gross.ceil());
            previous = quote.net_amount;
            gross += dec!(0.37);
        }
    }
}

#[test]
fn small_sales_pay_out_nothing() {
    // The fixed fee swallows anything this small.
    let quote = FeeCalculator::default()
        .compute(dec!(5), PaymentMethodId::Paypal)
        .unwrap();
    assert_eq!(quote.net_amount, Decimal::ZERO);
    assert!(quote.before_rounding < Decimal::ZERO);
}

#[test]
fn non_positive_gross_is_rejected() {
    let calc = FeeCalculator::default();
    assert_eq!(
        calc.compute(dec!(-1), PaymentMethodId::Bank).map(|q| q.net_amount),
        Err(DeskError::InvalidAmount(dec!(-1)))
    );
    assert!(calc.compute(Decimal::ZERO, PaymentMethodId::Bank).is_err());
}
