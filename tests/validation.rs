//! Tier validation at ¥1000 base price under the default policy (sizes 2 to 5, 5% to 50% off,
//! no per-unit tolerance).

use rusty_money::{
    Money,
    iso::{Currency, JPY, USD},
};
use testresult::TestResult;

use tierline::prelude::*;

fn yen(minor: i64) -> Money<'static, Currency> {
    Money::from_minor(minor, JPY)
}

#[test]
fn cheaper_per_unit_larger_bundle_is_accepted() -> TestResult {
    let policy = TierPolicy::default();
    let validator = TierValidator::new(&policy);

    validator.validate(
        &PricingTier::new(3, yen(1950)),
        &yen(1000),
        &[PricingTier::new(2, yen(1800))],
        TierEdit::Create,
    )?;

    Ok(())
}

#[test]
fn bundle_dearer_than_individual_is_rejected() {
    let policy = TierPolicy::default();
    let validator = TierValidator::new(&policy);

    let verdict = validator.validate(
        &PricingTier::new(2, yen(2100)),
        &yen(1000),
        &[PricingTier::new(3, yen(2400))],
        TierEdit::Create,
    );

    assert_eq!(
        verdict,
        Err(TierError::NotCheaperThanIndividual {
            quantity: 2,
            price: 2100,
            ceiling: 2000,
            currency: "JPY",
        })
    );
}

#[test]
fn smaller_bundle_cheaper_per_unit_than_a_larger_one_is_rejected() {
    let policy = TierPolicy::default();
    let validator = TierValidator::new(&policy);

    // ¥700 per unit against the 4-item bundle's ¥750.
    let verdict = validator.validate(
        &PricingTier::new(2, yen(1400)),
        &yen(1000),
        &[PricingTier::new(4, yen(3000))],
        TierEdit::Create,
    );

    assert!(matches!(
        verdict,
        Err(TierError::NonMonotonicPricing {
            quantity: 2,
            sibling_quantity: 4,
            ..
        })
    ));
}

#[test]
fn discount_band_is_inclusive() -> TestResult {
    let policy = TierPolicy::default();
    let validator = TierValidator::new(&policy);

    // Exactly 50% and exactly 5% off.
    validator.validate(&PricingTier::new(2, yen(1000)), &yen(1000), &[], TierEdit::Create)?;
    validator.validate(&PricingTier::new(2, yen(1900)), &yen(1000), &[], TierEdit::Create)?;

    assert!(matches!(
        validator.validate(&PricingTier::new(2, yen(999)), &yen(1000), &[], TierEdit::Create),
        Err(TierError::DiscountOutOfRange { min_price: 1000, max_price: 1900, .. })
    ));
    assert!(matches!(
        validator.validate(&PricingTier::new(2, yen(1901)), &yen(1000), &[], TierEdit::Create),
        Err(TierError::DiscountOutOfRange { .. })
    ));

    Ok(())
}

#[test]
fn unsupported_size_duplicate_and_currency_are_rejected() {
    let policy = TierPolicy::default();
    let validator = TierValidator::new(&policy);
    let existing = [PricingTier::new(2, yen(1800))];

    assert!(matches!(
        validator.validate(
            &PricingTier::new(6, yen(5000)),
            &yen(1000),
            &existing,
            TierEdit::Create
        ),
        Err(TierError::InvalidBundleSize { quantity: 6, .. })
    ));
    assert_eq!(
        validator.validate(
            &PricingTier::new(2, yen(1700)),
            &yen(1000),
            &existing,
            TierEdit::Create
        ),
        Err(TierError::DuplicateBundleSize { quantity: 2 })
    );
    assert_eq!(
        validator.validate(
            &PricingTier::new(3, Money::from_minor(2500, USD)),
            &yen(1000),
            &existing,
            TierEdit::Create
        ),
        Err(TierError::CurrencyMismatch("USD", "JPY"))
    );
}

#[test]
fn replacing_a_tier_ignores_its_old_price() -> TestResult {
    let policy = TierPolicy::default();
    let validator = TierValidator::new(&policy);
    let existing = [PricingTier::new(2, yen(1800)), PricingTier::new(3, yen(2550))];

    validator.validate(
        &PricingTier::new(2, yen(1700)),
        &yen(1000),
        &existing,
        TierEdit::Replace { quantity: 2 },
    )?;

    Ok(())
}
