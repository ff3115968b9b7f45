//! ILP Decomposer

use good_lp::{Expression, ProblemVariables, Solution, SolverModel, Variable, variable};
use num_traits::ToPrimitive;
use rusty_money::{Money, iso::Currency};
use smallvec::SmallVec;
use tracing::debug;

#[cfg(feature = "solver-highs")]
use good_lp::solvers::highs::highs as default_solver;
#[cfg(all(not(feature = "solver-highs"), feature = "solver-microlp"))]
use good_lp::solvers::microlp::microlp as default_solver;

use crate::{
    decomposition::{
        BreakdownLine, Decomposer, DecompositionError, PricingResult, check_inputs, exact_match,
        single_bundle,
    },
    tiers::{PricingTier, by_best_value},
};

/// Decomposer that hands the problem to an integer linear programming solver.
///
/// One non-negative integer variable per tier counts the bundles taken, and one more counts
/// the units bought individually:
///
/// ```text
/// minimise   Σ price(t) · x(t) + base · r
/// subject to Σ size(t) · x(t) + r = quantity
/// ```
///
/// Produces the same totals as [`ExhaustiveDecomposer`](super::ExhaustiveDecomposer) and is
/// mostly useful as an independent check on it.
#[derive(Debug)]
pub struct IlpDecomposer;

impl Decomposer for IlpDecomposer {
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

        let ordered = by_best_value(tiers);

        let mut pb = ProblemVariables::new();
        let mut cost = Expression::default();
        let mut units = Expression::default();
        let mut bundle_vars: SmallVec<[Variable; 5]> = SmallVec::new();

        for tier in &ordered {
            // No point allowing more copies of a bundle than fit in the quantity.
            let most = f64::from(quantity / tier.quantity());
            let var = pb.add(variable().integer().min(0).max(most));

            cost += var * coefficient(tier.price().to_minor_units())?;
            units += var * f64::from(tier.quantity());

            bundle_vars.push(var);
        }

        let singles = pb.add(variable().integer().min(0).max(f64::from(quantity)));

        cost += singles * coefficient(base_price.to_minor_units())?;
        units += singles * 1.0;

        let solution = pb
            .minimise(cost)
            .using(default_solver)
            .with(units.eq(f64::from(quantity)))
            .solve()?;

        let mut breakdown: SmallVec<[BreakdownLine<'a>; 4]> = SmallVec::new();

        for (tier, var) in ordered.iter().zip(bundle_vars) {
            let count = integral(solution.value(var))?;

            if count > 0 {
                breakdown.push(BreakdownLine::Bundle {
                    size: tier.quantity(),
                    count,
                    price: *tier.price(),
                });
            }
        }

        let single_count = integral(solution.value(singles))?;

        if single_count > 0 {
            breakdown.push(BreakdownLine::Individual {
                count: single_count,
                unit_price: base_price,
            });
        }

        debug!(quantity, lines = breakdown.len(), "ILP decomposition solved");

        // `from_breakdown` re-checks that the rounded counts still cover the quantity.
        PricingResult::from_breakdown(quantity, base_price, breakdown)
    }
}

/// `good_lp` stores coefficients as `f64`; refuse amounts that would lose precision.
fn coefficient(minor_units: i64) -> Result<f64, DecompositionError> {
    i64_to_f64_exact(minor_units)
        .ok_or(DecompositionError::MinorUnitsNotRepresentable { minor_units })
}

/// Round a solver value to the integer count it stands for.
fn integral(value: f64) -> Result<u32, DecompositionError> {
    value
        .round()
        .to_u32()
        .ok_or(DecompositionError::InvariantViolation {
            message: "solver returned a count outside the u32 range",
        })
}

/// Check if an i64 value is exactly representable as f64.
pub fn i64_to_f64_exact(v: i64) -> Option<f64> {
    let f = v.to_f64()?;

    (f.to_i64() == Some(v)).then_some(f)
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::JPY;
    use testresult::TestResult;

    use crate::decomposition::ExhaustiveDecomposer;

    use super::*;

    fn yen(minor: i64) -> Money<'static, Currency> {
        Money::from_minor(minor, JPY)
    }

    #[test]
    fn solves_the_tiling_greedy_misses() -> TestResult {
        let tiers = [PricingTier::new(3, yen(2250)), PricingTier::new(4, yen(2800))];
        let result = IlpDecomposer::decompose(6, yen(1000), &tiers)?;

        assert_eq!(result.total(), yen(4500));

        Ok(())
    }

    #[test]
    fn matches_exhaustive_totals() -> TestResult {
        let tiers = [
            PricingTier::new(2, yen(1800)),
            PricingTier::new(3, yen(2550)),
            PricingTier::new(5, yen(3750)),
        ];

        for quantity in 0..=15 {
            let ilp = IlpDecomposer::decompose(quantity, yen(1000), &tiers)?;
            let exhaustive = ExhaustiveDecomposer::decompose(quantity, yen(1000), &tiers)?;

            assert_eq!(ilp.total(), exhaustive.total(), "quantity {quantity}");
        }

        Ok(())
    }

    #[test]
    fn prices_individually_without_tiers() -> TestResult {
        let result = IlpDecomposer::decompose(3, yen(1000), &[])?;

        assert_eq!(result.total(), yen(3000));
        assert_eq!(
            result.breakdown(),
            &[BreakdownLine::Individual {
                count: 3,
                unit_price: yen(1000)
            }]
        );

        Ok(())
    }

    #[test]
    fn exact_conversion_rejects_large_values() {
        assert_eq!(i64_to_f64_exact(1_000), Some(1_000.0));
        assert_eq!(i64_to_f64_exact(i64::MAX - 1), None);
    }
}
