//! Price Decomposition
//!
//! Expresses a quantity of units from one seller as bundles plus leftover individually priced
//! units, at the lowest total the seller's tiers allow.
//!
//! Every strategy shares the same contract:
//!
//! - a quantity of zero prices to zero with an empty breakdown,
//! - a tier whose size equals the quantity is used directly, and
//! - malformed inputs (negative prices, zero-sized tiers, mixed currencies) are reported as a
//!   [`DecompositionError`] rather than priced.
//!
//! [`ExhaustiveDecomposer`] is the crate default. [`GreedyDecomposer`] is only optimal for some
//! tier sets, even when every tier passed validation; it is kept for comparison.

use std::fmt;

use clap::ValueEnum;
use good_lp::ResolutionError;
use rusty_money::{Money, MoneyError, iso::Currency};
use smallvec::SmallVec;
use thiserror::Error;

use crate::tiers::PricingTier;

pub mod exhaustive;
pub mod greedy;
pub mod ilp;

pub use exhaustive::ExhaustiveDecomposer;
pub use greedy::GreedyDecomposer;
pub use ilp::IlpDecomposer;

/// The decomposer used for authoritative pricing, both for preview and at checkout.
pub type DefaultDecomposer = ExhaustiveDecomposer;

/// Decomposition Errors
#[derive(Debug, Error)]
pub enum DecompositionError {
    /// The snapshot's base price is negative.
    #[error("base price must not be negative, got {0}")]
    NegativeBasePrice(i64),

    /// A tier's price is negative.
    #[error("a {quantity}-item bundle has a negative price: {price}")]
    NegativeTierPrice {
        /// Bundle size
        quantity: u32,

        /// Offending price in minor units
        price: i64,
    },

    /// A tier bundles zero units.
    #[error("tier bundles zero units")]
    ZeroQuantityTier,

    /// A tier is priced in a different currency from the base price.
    #[error("tier has currency {0}, but base price has currency {1}")]
    CurrencyMismatch(&'static str, &'static str),

    /// Price arithmetic overflowed.
    #[error("price arithmetic overflowed while pricing {quantity} units")]
    Overflow {
        /// Quantity being priced
        quantity: u32,
    },

    /// The tier sizes are too large for an exhaustive search over the leftover quantity.
    #[error("a search over {remainder} units is larger than the {limit}-unit limit")]
    SearchTooLarge {
        /// Units left to search after bulk best-value bundles were taken
        remainder: u64,

        /// Largest remainder searched
        limit: usize,
    },

    /// Money amount in minor units cannot be represented exactly as a solver coefficient.
    #[error(
        "money amount in minor units cannot be represented exactly as a solver coefficient: \
         {minor_units}"
    )]
    MinorUnitsNotRepresentable {
        /// Money amount in minor units
        minor_units: i64,
    },

    /// Wrapped solver resolution error
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Internal decomposition invariant was violated (this is a bug).
    #[error("decomposition invariant violated: {message}")]
    InvariantViolation {
        /// What invariant was violated
        message: &'static str,
    },

    /// Wrapped money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// One line of a pricing breakdown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BreakdownLine<'a> {
    /// `count` copies of a `size`-unit bundle at `price` each.
    Bundle {
        /// Units per bundle
        size: u32,

        /// Number of bundles
        count: u32,

        /// Price of one bundle
        price: Money<'a, Currency>,
    },

    /// `count` units bought individually at `unit_price`.
    Individual {
        /// Number of units
        count: u32,

        /// Base price per unit
        unit_price: Money<'a, Currency>,
    },
}

impl<'a> BreakdownLine<'a> {
    /// Number of units this line covers.
    pub fn units(&self) -> u64 {
        match self {
            BreakdownLine::Bundle { size, count, .. } => u64::from(*size) * u64::from(*count),
            BreakdownLine::Individual { count, .. } => u64::from(*count),
        }
    }

    /// Line total.
    ///
    /// # Errors
    ///
    /// Returns [`DecompositionError::Overflow`] if the total does not fit in minor units.
    pub fn total(&self) -> Result<Money<'a, Currency>, DecompositionError> {
        let (count, price) = match self {
            BreakdownLine::Bundle { count, price, .. } => (*count, price),
            BreakdownLine::Individual { count, unit_price } => (*count, unit_price),
        };

        let minor = price
            .to_minor_units()
            .checked_mul(i64::from(count))
            .ok_or(DecompositionError::Overflow { quantity: count })?;

        Ok(Money::from_minor(minor, price.currency()))
    }
}

impl fmt::Display for BreakdownLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakdownLine::Bundle { size, count, .. } => write!(f, "{count} × {size}-item bundle"),
            BreakdownLine::Individual { count, .. } => write!(f, "{count} × single"),
        }
    }
}

/// The priced decomposition of one seller group.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingResult<'a> {
    quantity: u32,
    total: Money<'a, Currency>,
    original: Money<'a, Currency>,
    savings: Money<'a, Currency>,
    breakdown: SmallVec<[BreakdownLine<'a>; 4]>,
}

impl<'a> PricingResult<'a> {
    /// The all-zero result for a quantity of zero.
    pub fn empty(currency: &'a Currency) -> Self {
        let zero = Money::from_minor(0, currency);

        Self {
            quantity: 0,
            total: zero,
            original: zero,
            savings: zero,
            breakdown: SmallVec::new(),
        }
    }

    /// Build a result from a breakdown, deriving the totals.
    ///
    /// # Errors
    ///
    /// Returns a [`DecompositionError`] if the breakdown does not cover exactly `quantity`
    /// units, or if totals overflow.
    pub fn from_breakdown(
        quantity: u32,
        base_price: Money<'a, Currency>,
        breakdown: SmallVec<[BreakdownLine<'a>; 4]>,
    ) -> Result<Self, DecompositionError> {
        let covered: u64 = breakdown.iter().map(BreakdownLine::units).sum();

        if covered != u64::from(quantity) {
            return Err(DecompositionError::InvariantViolation {
                message: "breakdown does not cover the requested quantity",
            });
        }

        let currency = base_price.currency();

        let total = breakdown
            .iter()
            .try_fold(Money::from_minor(0, currency), |acc, line| {
                Ok::<_, DecompositionError>(acc.add(line.total()?)?)
            })?;

        let original = Money::from_minor(
            base_price
                .to_minor_units()
                .checked_mul(i64::from(quantity))
                .ok_or(DecompositionError::Overflow { quantity })?,
            currency,
        );

        let savings = original.sub(total)?;

        Ok(Self {
            quantity,
            total,
            original,
            savings,
            breakdown,
        })
    }

    /// Number of units priced.
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Lowest achievable price for the quantity.
    pub fn total(&self) -> Money<'a, Currency> {
        self.total
    }

    /// Price without any bundles (`base price × quantity`).
    pub fn original(&self) -> Money<'a, Currency> {
        self.original
    }

    /// `original - total`.
    pub fn savings(&self) -> Money<'a, Currency> {
        self.savings
    }

    /// Breakdown lines: bundles in best-value order, then individual units.
    pub fn breakdown(&self) -> &[BreakdownLine<'a>] {
        &self.breakdown
    }
}

/// Strategy for decomposing a quantity into bundles.
pub trait Decomposer {
    /// Price `quantity` units at the lowest total `tiers` allow.
    ///
    /// # Errors
    ///
    /// Returns a [`DecompositionError`] if the inputs are malformed or arithmetic overflows.
    fn decompose<'a>(
        quantity: u32,
        base_price: Money<'a, Currency>,
        tiers: &[PricingTier<'a>],
    ) -> Result<PricingResult<'a>, DecompositionError>;
}

/// Price `quantity` units with the [`DefaultDecomposer`].
///
/// # Errors
///
/// Returns a [`DecompositionError`] if the inputs are malformed or arithmetic overflows.
pub fn decompose<'a>(
    quantity: u32,
    base_price: Money<'a, Currency>,
    tiers: &[PricingTier<'a>],
) -> Result<PricingResult<'a>, DecompositionError> {
    DefaultDecomposer::decompose(quantity, base_price, tiers)
}

/// Run-time choice of decomposer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Strategy {
    /// Best value first, as many copies as fit.
    Greedy,

    /// Dynamic programming over every sub-quantity.
    #[default]
    Exhaustive,

    /// Integer linear program.
    Ilp,
}

impl Strategy {
    /// Decompose with the selected strategy.
    ///
    /// # Errors
    ///
    /// Returns a [`DecompositionError`] if the inputs are malformed or arithmetic overflows.
    pub fn decompose<'a>(
        self,
        quantity: u32,
        base_price: Money<'a, Currency>,
        tiers: &[PricingTier<'a>],
    ) -> Result<PricingResult<'a>, DecompositionError> {
        match self {
            Strategy::Greedy => GreedyDecomposer::decompose(quantity, base_price, tiers),
            Strategy::Exhaustive => ExhaustiveDecomposer::decompose(quantity, base_price, tiers),
            Strategy::Ilp => IlpDecomposer::decompose(quantity, base_price, tiers),
        }
    }
}

/// Reject inputs no decomposer may price.
pub(crate) fn check_inputs(
    base_price: &Money<'_, Currency>,
    tiers: &[PricingTier<'_>],
) -> Result<(), DecompositionError> {
    let base_minor = base_price.to_minor_units();

    if base_minor < 0 {
        return Err(DecompositionError::NegativeBasePrice(base_minor));
    }

    for tier in tiers {
        if tier.quantity() == 0 {
            return Err(DecompositionError::ZeroQuantityTier);
        }

        let price = tier.price().to_minor_units();

        if price < 0 {
            return Err(DecompositionError::NegativeTierPrice {
                quantity: tier.quantity(),
                price,
            });
        }

        if tier.price().currency() != base_price.currency() {
            return Err(DecompositionError::CurrencyMismatch(
                tier.price().currency().iso_alpha_code,
                base_price.currency().iso_alpha_code,
            ));
        }
    }

    Ok(())
}

/// The tier whose size is exactly `quantity`, cheapest first if somehow duplicated.
pub(crate) fn exact_match<'t, 'a>(
    quantity: u32,
    tiers: &'t [PricingTier<'a>],
) -> Option<&'t PricingTier<'a>> {
    tiers
        .iter()
        .filter(|tier| tier.quantity() == quantity)
        .min_by_key(|tier| tier.price().to_minor_units())
}

/// A single-bundle breakdown for an exact-match tier.
pub(crate) fn single_bundle<'a>(tier: &PricingTier<'a>) -> SmallVec<[BreakdownLine<'a>; 4]> {
    let mut breakdown = SmallVec::new();

    breakdown.push(BreakdownLine::Bundle {
        size: tier.quantity(),
        count: 1,
        price: *tier.price(),
    });

    breakdown
}
