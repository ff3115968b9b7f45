//! Decomposition against validated tier sets.
//!
//! Every tier set a seller could persist under the default policy (bundle sizes 2 to 5, one
//! price each from a fixed grid of discounts, base price ¥1000) is checked against a brute-force
//! enumeration of bundle counts. The default decomposer must always hit the brute-force minimum;
//! the greedy decomposer must never beat it, and is shown to miss it on at least one set.
//!
//! The grid prices sit well inside the monotonicity bounds, so each valid set is also extended
//! with a missing size priced exactly at the largest or smallest price its siblings allow.

use rusty_money::{
    Money,
    iso::{Currency, JPY},
};
use testresult::TestResult;

use tierline::prelude::*;

const BASE: i64 = 1000;
const SIZES: [u32; 4] = [2, 3, 4, 5];
const DISCOUNTS: [Option<i64>; 7] = [
    None,
    Some(5),
    Some(10),
    Some(25),
    Some(30),
    Some(40),
    Some(50),
];

fn yen(minor: i64) -> Money<'static, Currency> {
    Money::from_minor(minor, JPY)
}

/// Every combination of optional per-size prices, keeping only those the validator accepts.
fn validated_tier_sets() -> Vec<Vec<PricingTier<'static>>> {
    let policy = TierPolicy::default();
    let validator = TierValidator::new(&policy);
    let choices = DISCOUNTS.len();
    let combinations = choices.pow(4);

    (0..combinations)
        .filter_map(|code| {
            let tiers: Vec<PricingTier<'static>> = SIZES
                .iter()
                .enumerate()
                .filter_map(|(position, &size)| {
                    let digit = code / choices.pow(u32::try_from(position).ok()?) % choices;
                    let discount = (*DISCOUNTS.get(digit)?)?;
                    let full = BASE * i64::from(size);

                    Some(PricingTier::new(size, yen(full * (100 - discount) / 100)))
                })
                .collect();

            validator
                .validate_set(&yen(BASE), &tiers)
                .is_empty()
                .then_some(tiers)
        })
        .collect()
}

/// Valid sets with one more tier priced exactly on a monotonicity bound.
///
/// A tier of size `s` may cost at most `⌊p·s/q⌋` against a smaller sibling `q:p`, and at least
/// `⌈p·s/q⌉` against a larger one.
fn edge_tier_sets() -> Vec<Vec<PricingTier<'static>>> {
    let policy = TierPolicy::default();
    let validator = TierValidator::new(&policy);
    let mut sets = Vec::new();

    for tiers in validated_tier_sets() {
        for size in SIZES {
            if tiers.iter().any(|tier| tier.quantity() == size) {
                continue;
            }

            let s = i64::from(size);
            let ratios = tiers
                .iter()
                .map(|tier| (i64::from(tier.quantity()), tier.price().to_minor_units()));

            let upper = ratios
                .clone()
                .filter(|&(q, _)| q < s)
                .map(|(q, p)| (p * s).div_euclid(q))
                .min();
            let lower = ratios
                .filter(|&(q, _)| q > s)
                .map(|(q, p)| (p * s + q - 1).div_euclid(q))
                .max();

            for edge in [upper, lower].into_iter().flatten() {
                let mut extended = tiers.clone();

                extended.push(PricingTier::new(size, yen(edge)));

                if validator.validate_set(&yen(BASE), &extended).is_empty() {
                    sets.push(extended);
                }
            }
        }
    }

    sets
}

/// Cheapest total over every count of every tier, leftovers at the base price.
fn brute_force(quantity: u32, tiers: &[PricingTier<'_>]) -> i64 {
    match tiers.split_first() {
        None => BASE * i64::from(quantity),
        Some((tier, rest)) => (0..=quantity / tier.quantity())
            .map(|count| {
                tier.price().to_minor_units() * i64::from(count)
                    + brute_force(quantity - count * tier.quantity(), rest)
            })
            .min()
            .unwrap_or(i64::MAX),
    }
}

#[test]
fn default_decomposer_matches_brute_force_on_every_valid_set() -> TestResult {
    let sets = validated_tier_sets();

    assert!(sets.len() > 100, "only {} valid sets", sets.len());

    for tiers in &sets {
        for quantity in 0..=20 {
            let result = decompose(quantity, yen(BASE), tiers)?;

            assert_eq!(
                result.total().to_minor_units(),
                brute_force(quantity, tiers),
                "quantity {quantity}, tiers {tiers:?}"
            );
            assert_eq!(
                result.breakdown().iter().map(BreakdownLine::units).sum::<u64>(),
                u64::from(quantity)
            );
        }
    }

    Ok(())
}

#[test]
fn default_decomposer_matches_brute_force_on_edge_priced_sets() -> TestResult {
    let sets = edge_tier_sets();

    assert!(!sets.is_empty(), "no edge-priced set passed validation");

    for tiers in &sets {
        for quantity in 0..=20 {
            let result = decompose(quantity, yen(BASE), tiers)?;

            assert_eq!(
                result.total().to_minor_units(),
                brute_force(quantity, tiers),
                "quantity {quantity}, tiers {tiers:?}"
            );
        }
    }

    Ok(())
}

#[test]
fn exact_size_tier_dearer_than_a_mix_never_reaches_the_decomposer() -> TestResult {
    let policy = TierPolicy::default();
    let validator = TierValidator::new(&policy);

    // Two pairs cost ¥3600, so a 4-item bundle at ¥3604 is dearer per unit than a pair.
    let rejected = Gallery::with_tiers(
        "Harbour Lights",
        yen(BASE),
        [PricingTier::new(2, yen(1800)), PricingTier::new(4, yen(3604))],
        &validator,
    );

    assert!(matches!(
        rejected,
        Err(CatalogError::Tier(TierError::NonMonotonicPricing {
            quantity: 4,
            sibling_quantity: 2,
            ..
        }))
    ));

    let tiers = [PricingTier::new(2, yen(1800)), PricingTier::new(4, yen(3600))];
    let gallery = Gallery::with_tiers("Harbour Lights", yen(BASE), tiers, &validator)?;
    let result = decompose(4, gallery.base_price(), gallery.tiers().as_slice())?;

    assert_eq!(result.total().to_minor_units(), 3600);
    assert_eq!(result.total().to_minor_units(), brute_force(4, &tiers));

    Ok(())
}

#[test]
fn greedy_never_beats_the_default_and_sometimes_loses() -> TestResult {
    let mut greedy_losses = 0;

    for tiers in &validated_tier_sets() {
        for quantity in 0..=20 {
            let best = decompose(quantity, yen(BASE), tiers)?
                .total()
                .to_minor_units();
            let greedy = GreedyDecomposer::decompose(quantity, yen(BASE), tiers)?
                .total()
                .to_minor_units();

            assert!(
                greedy >= best,
                "greedy {greedy} < {best} for {quantity}, {tiers:?}"
            );

            if greedy > best {
                greedy_losses += 1;
            }
        }
    }

    assert!(greedy_losses > 0);

    Ok(())
}

#[test]
fn ilp_agrees_with_default_on_a_sample_of_valid_sets() -> TestResult {
    for tiers in validated_tier_sets().iter().step_by(37) {
        for quantity in 0..=12 {
            let exhaustive = decompose(quantity, yen(BASE), tiers)?;
            let ilp = IlpDecomposer::decompose(quantity, yen(BASE), tiers)?;

            assert_eq!(
                ilp.total(),
                exhaustive.total(),
                "quantity {quantity}, tiers {tiers:?}"
            );
        }
    }

    Ok(())
}

#[test]
fn worked_examples() -> TestResult {
    let tiers = [
        PricingTier::new(2, yen(1800)),
        PricingTier::new(3, yen(2550)),
        PricingTier::new(5, yen(3750)),
    ];

    let five = decompose(5, yen(BASE), &tiers)?;

    assert_eq!(five.total(), yen(3750));
    assert_eq!(five.savings(), yen(1250));
    assert_eq!(
        five.breakdown(),
        [BreakdownLine::Bundle {
            size: 5,
            count: 1,
            price: yen(3750)
        }]
    );

    let seven = decompose(7, yen(BASE), &tiers)?;

    assert_eq!(seven.total(), yen(5550));
    assert_eq!(seven.savings(), yen(1450));

    let pairs = decompose(4, yen(BASE), &[PricingTier::new(2, yen(1800))])?;

    assert_eq!(pairs.total(), yen(3600));
    assert_eq!(pairs.savings(), yen(400));
    assert_eq!(
        pairs.breakdown(),
        [BreakdownLine::Bundle {
            size: 2,
            count: 2,
            price: yen(1800)
        }]
    );

    Ok(())
}

#[test]
fn every_strategy_prices_zero_as_empty() -> TestResult {
    let tiers = [PricingTier::new(2, yen(1800))];

    for strategy in [Strategy::Greedy, Strategy::Exhaustive, Strategy::Ilp] {
        let result = strategy.decompose(0, yen(BASE), &tiers)?;

        assert_eq!(result.total(), yen(0));
        assert_eq!(result.savings(), yen(0));
        assert!(result.breakdown().is_empty());
    }

    Ok(())
}
