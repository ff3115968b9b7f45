//! Greedy Decomposer

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

/// Takes as many copies as fit of the best-value tier, then the next best, and prices whatever
/// is left individually.
///
/// Not optimal in general, even for tier sets that pass validation. With a base price of 1000,
/// a 3-bundle at 2250 and a 4-bundle at 2800, six units come out at 4800 here while two
/// 3-bundles cost 4500.
#[derive(Debug)]
pub struct GreedyDecomposer;

impl Decomposer for GreedyDecomposer {
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

        let mut remaining = quantity;
        let mut breakdown: SmallVec<[BreakdownLine<'a>; 4]> = SmallVec::new();

        for tier in by_best_value(tiers) {
            let count = remaining / tier.quantity();

            if count == 0 {
                continue;
            }

            trace!(size = tier.quantity(), count, "greedy bundle");

            breakdown.push(BreakdownLine::Bundle {
                size: tier.quantity(),
                count,
                price: *tier.price(),
            });

            remaining -= count * tier.quantity();
        }

        if remaining > 0 {
            breakdown.push(BreakdownLine::Individual {
                count: remaining,
                unit_price: base_price,
            });
        }

        PricingResult::from_breakdown(quantity, base_price, breakdown)
    }
}
