//! Exhaustive Decomposer
//!
//! Unbounded knapsack over unit counts: the cheapest way to buy `n` units is the cheapest of
//! one individual unit on top of the best `n - 1`, or any tier of size `s ≤ n` on top of the
//! best `n - s`.
//!
//! The table only covers what is left once enough copies of the best-value bundle are taken,
//! so its length depends on the tier sizes rather than the quantity.

use rusty_money::{Money, iso::Currency};
use smallvec::SmallVec;
use tracing::trace;

use crate::{
    decomposition::{
        BreakdownLine, Decomposer, DecompositionError, PricingResult, check_inputs, exact_match,
        single_bundle,
    },
    tiers::{PricingTier, by_best_value},
};

/// Last step taken to reach a sub-quantity at its lowest cost.
#[derive(Debug, Clone, Copy)]
enum Step {
    Single,
    Tier(usize),
}

/// Finds the true minimum for any tier set.
#[derive(Debug)]
pub struct ExhaustiveDecomposer;

impl Decomposer for ExhaustiveDecomposer {
    fn decompose<'a>(
        quantity: u32,
        base_price: Money<'a, Currency>,
        tiers: &[PricingTier<'a>],
    ) -> Result<PricingResult<'a>, DecompositionError> {
        check_inputs(&base_price, tiers)?;

        if quantity == 0 {
            return Ok(PricingResult::empty(base_price.currency()));
        }

        if let Some(tier) = exact_match(quantity, tiers) {
            return PricingResult::from_breakdown(quantity, base_price, single_bundle(tier));
        }

        // Visiting tiers best value first, and only replacing on a strictly lower cost, makes
        // ties resolve towards the better-value bundle.
        let ordered = by_best_value(tiers);
        let base_minor = base_price.to_minor_units();

        // No bundle beats the individual price, so neither does any mix of them.
        let Some(best_value) = ordered
            .first()
            .filter(|tier| beats_individual(tier, base_minor))
        else {
            let breakdown = individually(quantity, base_price);

            return PricingResult::from_breakdown(quantity, base_price, breakdown);
        };

        // Only the remainder left after the bulk best-value bundles goes through the table.
        let bulk = bulk_copies(quantity, best_value.quantity(), &ordered);
        let remainder = quantity - bulk * best_value.quantity();
        let target = usize::try_from(remainder)
            .ok()
            .filter(|target| *target < MAX_SEARCH)
            .ok_or(DecompositionError::SearchTooLarge {
                remainder: u64::from(remainder),
                limit: MAX_SEARCH,
            })?;

        let mut costs: Vec<i64> = Vec::with_capacity(target + 1);
        let mut steps: Vec<Step> = Vec::with_capacity(target + 1);

        costs.push(0);
        steps.push(Step::Single);

        for n in 1..=target {
            let mut best = costs
                .get(n - 1)
                .and_then(|cost| cost.checked_add(base_minor))
                .ok_or_else(|| overflow_for(quantity))?;

            let mut step = Step::Single;

            for (idx, tier) in ordered.iter().enumerate() {
                let size = tier.quantity() as usize;

                if size > n {
                    continue;
                }

                let Some(candidate) = costs
                    .get(n - size)
                    .and_then(|cost| cost.checked_add(tier.price().to_minor_units()))
                else {
                    return Err(overflow_for(quantity));
                };

                if candidate < best {
                    best = candidate;
                    step = Step::Tier(idx);
                }
            }

            costs.push(best);
            steps.push(step);
        }

        // Walk the steps back from the target to count how often each tier was used.
        let mut counts: SmallVec<[u32; 5]> = SmallVec::from_elem(0, ordered.len());

        // The best-value tier is first in `ordered`.
        if let Some(count) = counts.first_mut() {
            *count = bulk;
        }

        let mut singles: u32 = 0;
        let mut n = target;

        while n > 0 {
            match steps.get(n) {
                Some(Step::Single) => {
                    singles += 1;
                    n -= 1;
                }
                Some(Step::Tier(idx)) => {
                    let (Some(count), Some(tier)) = (counts.get_mut(*idx), ordered.get(*idx))
                    else {
                        return Err(DecompositionError::InvariantViolation {
                            message: "step refers to an unknown tier",
                        });
                    };

                    *count += 1;
                    n -= tier.quantity() as usize;
                }
                None => {
                    return Err(DecompositionError::InvariantViolation {
                        message: "walked past the start of the step table",
                    });
                }
            }
        }

        let mut breakdown: SmallVec<[BreakdownLine<'a>; 4]> = SmallVec::new();

        for (tier, count) in ordered.iter().zip(counts) {
            if count > 0 {
                breakdown.push(BreakdownLine::Bundle {
                    size: tier.quantity(),
                    count,
                    price: *tier.price(),
                });
            }
        }

        if singles > 0 {
            breakdown.push(BreakdownLine::Individual {
                count: singles,
                unit_price: base_price,
            });
        }

        trace!(
            quantity,
            bulk,
            remainder,
            lines = breakdown.len(),
            "exhaustive decomposition"
        );

        PricingResult::from_breakdown(quantity, base_price, breakdown)
    }
}

/// Largest leftover quantity the step table is built for.
pub const MAX_SEARCH: usize = 1 << 20;

/// Whether `tier` costs less than buying its units individually.
fn beats_individual(tier: &PricingTier<'_>, base_minor: i64) -> bool {
    i128::from(tier.price().to_minor_units())
        < i128::from(base_minor) * i128::from(tier.quantity())
}

fn individually<'a>(
    quantity: u32,
    base_price: Money<'a, Currency>,
) -> SmallVec<[BreakdownLine<'a>; 4]> {
    let mut breakdown = SmallVec::new();

    breakdown.push(BreakdownLine::Individual {
        count: quantity,
        unit_price: base_price,
    });

    breakdown
}

/// Copies of the best-value bundle that some cheapest decomposition is guaranteed to contain.
///
/// Among any `best_size` other bundles or single units there is a subset whose units add up to
/// a multiple of `best_size`, and swapping that subset for best-value bundles never costs more.
/// So a cheapest decomposition exists with fewer than `best_size` other pieces, covering fewer
/// than `best_size × largest` units; everything beyond that is best-value bundles.
fn bulk_copies(quantity: u32, best_size: u32, tiers: &[PricingTier<'_>]) -> u32 {
    let largest = tiers.iter().map(PricingTier::quantity).max().unwrap_or(1);
    let window = u64::from(best_size) * u64::from(largest);
    let bulk = u64::from(quantity).saturating_sub(window) / u64::from(best_size);

    // `bulk × best_size` never exceeds `quantity`.
    u32::try_from(bulk).unwrap_or(0)
}

fn overflow_for(quantity: u32) -> DecompositionError {
    DecompositionError::Overflow { quantity }
}
