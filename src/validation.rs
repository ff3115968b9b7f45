//! Tier Validation
//!
//! Every tier a seller creates or edits, whether while first setting up a gallery or later while
//! managing it, goes through [`TierValidator::validate`]. A tier is accepted only if:
//!
//! - its quantity is one of the policy's allowed bundle sizes,
//! - the base price and the tier price are both positive,
//! - it is strictly cheaper than buying `quantity` units individually,
//! - its discount lies within the policy's `[min, max]` interval,
//! - no other tier uses the same quantity, and
//! - per-unit prices never increase with bundle size.
//!
//! Per-unit prices are compared by exact cross-multiplication, so the default policy allows no
//! slack. A positive tolerance lets a larger bundle cost slightly more per unit than a smaller
//! one; an exact-size tier may then cost more than a mix of smaller bundles.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use rusty_money::{Money, iso::Currency};
use smallvec::SmallVec;
use thiserror::Error;
use tracing::debug;

use crate::{
    config::TierPolicy,
    tiers::{PricingTier, per_unit_minor},
};

/// Which input price was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    /// The seller's single-unit base price
    BasePrice,

    /// The bundle price of the candidate tier
    TierPrice,
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceField::BasePrice => f.write_str("base price"),
            PriceField::TierPrice => f.write_str("tier price"),
        }
    }
}

/// The acceptable price bound implied by a sibling tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceBound {
    /// The candidate must cost no more than this (a smaller bundle is a better deal).
    AtMost(i64),

    /// The candidate must cost no less than this (a larger bundle is a worse deal).
    AtLeast(i64),
}

impl fmt::Display for PriceBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceBound::AtMost(limit) => write!(f, "at most {limit}"),
            PriceBound::AtLeast(limit) => write!(f, "at least {limit}"),
        }
    }
}

/// Reasons a tier is rejected. All prices are in minor units of `currency`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TierError {
    /// The quantity is not an allowed bundle size.
    #[error("a {quantity}-item bundle is not offered; allowed sizes are {allowed:?}")]
    InvalidBundleSize {
        /// Rejected quantity
        quantity: u32,

        /// Allowed bundle sizes
        allowed: SmallVec<[u32; 8]>,
    },

    /// The base price or the tier price is zero or negative.
    #[error("{field} must be greater than zero, got {minor_units}")]
    NonPositiveInput {
        /// Which price was rejected
        field: PriceField,

        /// Rejected value
        minor_units: i64,
    },

    /// The tier price is not below the price of buying every unit individually.
    #[error(
        "a {quantity}-item bundle must be cheaper than buying individually: \
         price {price} must be below {ceiling} {currency}"
    )]
    NotCheaperThanIndividual {
        /// Bundle size
        quantity: u32,

        /// Rejected bundle price
        price: i64,

        /// Individual-purchase price (`base price × quantity`)
        ceiling: i64,

        /// Currency code
        currency: &'static str,
    },

    /// The discount fraction is outside the policy's interval.
    #[error(
        "a {quantity}-item bundle at {price} is a {discount_percent}% discount; \
         price must be between {min_price} and {max_price} {currency}"
    )]
    DiscountOutOfRange {
        /// Bundle size
        quantity: u32,

        /// Rejected bundle price
        price: i64,

        /// Discount in percent points
        discount_percent: Decimal,

        /// Lowest acceptable bundle price
        min_price: i64,

        /// Highest acceptable bundle price
        max_price: i64,

        /// Currency code
        currency: &'static str,
    },

    /// Per-unit price ordering against another tier is violated.
    #[error(
        "a {quantity}-item bundle at {per_unit} per unit conflicts with the \
         {sibling_quantity}-item bundle at {sibling_per_unit} per unit; \
         price must be {bound} {currency}"
    )]
    NonMonotonicPricing {
        /// Bundle size of the candidate
        quantity: u32,

        /// Candidate per-unit price
        per_unit: Decimal,

        /// Bundle size of the conflicting tier
        sibling_quantity: u32,

        /// Per-unit price of the conflicting tier
        sibling_per_unit: Decimal,

        /// Price bound the candidate must respect
        bound: PriceBound,

        /// Currency code
        currency: &'static str,
    },

    /// Another tier already uses this quantity.
    #[error("a {quantity}-item bundle already exists")]
    DuplicateBundleSize {
        /// Duplicated quantity
        quantity: u32,
    },

    /// The tier is priced in a different currency from the base price.
    #[error("tier has currency {0}, but base price has currency {1}")]
    CurrencyMismatch(&'static str, &'static str),

    /// Price arithmetic overflowed.
    #[error("price arithmetic overflowed for a {quantity}-item bundle")]
    ArithmeticOverflow {
        /// Bundle size
        quantity: u32,
    },
}

/// Whether a candidate is a new tier or replaces an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TierEdit {
    /// The candidate is a new tier.
    #[default]
    Create,

    /// The candidate replaces the existing tier with this quantity.
    Replace {
        /// Quantity of the tier being replaced
        quantity: u32,
    },
}

/// A persisted tier that no longer satisfies the rules, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidatedTier<'a> {
    /// The offending tier
    pub tier: PricingTier<'a>,

    /// Why it is no longer acceptable
    pub reason: TierError,
}

/// Validates tiers against a [`TierPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct TierValidator<'p> {
    policy: &'p TierPolicy,
}

impl<'p> TierValidator<'p> {
    /// Create a validator for a policy.
    pub fn new(policy: &'p TierPolicy) -> Self {
        Self { policy }
    }

    /// The policy this validator enforces.
    pub fn policy(&self) -> &'p TierPolicy {
        self.policy
    }

    /// Decide whether `candidate` may be persisted alongside `existing`.
    ///
    /// When `edit` is [`TierEdit::Replace`], the replaced tier is ignored for the duplicate and
    /// monotonicity checks.
    ///
    /// # Errors
    ///
    /// Returns the first [`TierError`] the candidate violates.
    pub fn validate(
        &self,
        candidate: &PricingTier<'_>,
        base_price: &Money<'_, Currency>,
        existing: &[PricingTier<'_>],
        edit: TierEdit,
    ) -> Result<(), TierError> {
        let verdict = self.check(candidate, base_price, existing, edit);

        debug!(
            quantity = candidate.quantity(),
            price = candidate.price().to_minor_units(),
            base_price = base_price.to_minor_units(),
            ?edit,
            accepted = verdict.is_ok(),
            "validated tier"
        );

        verdict
    }

    /// Re-validate every tier in `tiers` against its siblings and `base_price`.
    ///
    /// Returns the tiers that fail, in quantity order. An empty result means the whole set is
    /// acceptable as persisted.
    pub fn validate_set<'a>(
        &self,
        base_price: &Money<'_, Currency>,
        tiers: &[PricingTier<'a>],
    ) -> SmallVec<[InvalidatedTier<'a>; 5]> {
        tiers
            .iter()
            .filter_map(|tier| {
                self.check(
                    tier,
                    base_price,
                    tiers,
                    TierEdit::Replace {
                        quantity: tier.quantity(),
                    },
                )
                .err()
                .map(|reason| InvalidatedTier {
                    tier: *tier,
                    reason,
                })
            })
            .collect()
    }

    /// Work out which existing tiers a base-price change would invalidate.
    pub fn revalidate_for_base_price<'a>(
        &self,
        new_base_price: &Money<'_, Currency>,
        tiers: &[PricingTier<'a>],
    ) -> SmallVec<[InvalidatedTier<'a>; 5]> {
        let invalidated = self.validate_set(new_base_price, tiers);

        debug!(
            new_base_price = new_base_price.to_minor_units(),
            tiers = tiers.len(),
            invalidated = invalidated.len(),
            "revalidated tiers for base price change"
        );

        invalidated
    }

    fn check(
        &self,
        candidate: &PricingTier<'_>,
        base_price: &Money<'_, Currency>,
        existing: &[PricingTier<'_>],
        edit: TierEdit,
    ) -> Result<(), TierError> {
        let quantity = candidate.quantity();

        if !self.policy.allows_size(quantity) {
            return Err(TierError::InvalidBundleSize {
                quantity,
                allowed: self.policy.allowed_sizes().iter().copied().collect(),
            });
        }

        let base_minor = base_price.to_minor_units();
        let price = candidate.price().to_minor_units();

        if base_minor <= 0 {
            return Err(TierError::NonPositiveInput {
                field: PriceField::BasePrice,
                minor_units: base_minor,
            });
        }

        if price <= 0 {
            return Err(TierError::NonPositiveInput {
                field: PriceField::TierPrice,
                minor_units: price,
            });
        }

        let currency = base_price.currency();
        let tier_currency = candidate.price().currency();

        if tier_currency != currency {
            return Err(TierError::CurrencyMismatch(
                tier_currency.iso_alpha_code,
                currency.iso_alpha_code,
            ));
        }

        let ceiling = base_minor
            .checked_mul(i64::from(quantity))
            .ok_or(TierError::ArithmeticOverflow { quantity })?;

        if price >= ceiling {
            return Err(TierError::NotCheaperThanIndividual {
                quantity,
                price,
                ceiling,
                currency: currency.iso_alpha_code,
            });
        }

        self.check_discount_range(quantity, price, ceiling, currency)?;

        let siblings = existing.iter().filter(|tier| match edit {
            TierEdit::Create => true,
            TierEdit::Replace { quantity } => tier.quantity() != quantity,
        });

        let mut monotonic_violation = None;

        for sibling in siblings {
            if sibling.quantity() == quantity {
                return Err(TierError::DuplicateBundleSize { quantity });
            }

            if monotonic_violation.is_none() {
                monotonic_violation = self.check_monotonic(candidate, sibling, currency);
            }
        }

        monotonic_violation.map_or(Ok(()), Err)
    }

    fn check_discount_range(
        &self,
        quantity: u32,
        price: i64,
        ceiling: i64,
        currency: &Currency,
    ) -> Result<(), TierError> {
        let individual = Decimal::from(ceiling);
        let overflow = TierError::ArithmeticOverflow { quantity };

        let min_price = (individual * (Decimal::ONE - self.policy.max_discount_fraction()))
            .ceil()
            .to_i64()
            .ok_or_else(|| overflow.clone())?;

        let max_price = (individual * (Decimal::ONE - self.policy.min_discount_fraction()))
            .floor()
            .to_i64()
            .ok_or(overflow)?;

        if price < min_price || price > max_price {
            let discount = Decimal::ONE - Decimal::from(price) / individual;

            return Err(TierError::DiscountOutOfRange {
                quantity,
                price,
                discount_percent: (discount * Decimal::ONE_HUNDRED)
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
                min_price,
                max_price,
                currency: currency.iso_alpha_code,
            });
        }

        Ok(())
    }

    /// Compare per-unit prices by cross-multiplication so no division or rounding is involved:
    /// `pc / qc > ps / qs + tol` becomes `pc·qs > ps·qc + tol·qc·qs`.
    fn check_monotonic(
        &self,
        candidate: &PricingTier<'_>,
        sibling: &PricingTier<'_>,
        currency: &Currency,
    ) -> Option<TierError> {
        let qc = i128::from(candidate.quantity());
        let qs = i128::from(sibling.quantity());
        let pc = i128::from(candidate.price().to_minor_units());
        let ps = i128::from(sibling.price().to_minor_units());
        let slack = i128::from(self.policy.per_unit_tolerance()) * qc * qs;

        let bound = if qs < qc {
            // A smaller bundle exists: the candidate must not cost more per unit.
            let limit = ps * qc + slack;

            (pc * qs > limit).then(|| PriceBound::AtMost(saturate(limit.div_euclid(qs))))
        } else {
            // A larger bundle exists: it must not cost more per unit than the candidate.
            let limit = ps * qc - slack;

            (limit > pc * qs).then(|| PriceBound::AtLeast(saturate(div_ceil(limit, qs))))
        }?;

        Some(TierError::NonMonotonicPricing {
            quantity: candidate.quantity(),
            per_unit: candidate.per_unit(),
            sibling_quantity: sibling.quantity(),
            sibling_per_unit: per_unit_minor(sibling.price().to_minor_units(), sibling.quantity()),
            bound,
            currency: currency.iso_alpha_code,
        })
    }
}

fn div_ceil(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator.div_euclid(denominator);

    if numerator.rem_euclid(denominator) > 0 {
        quotient + 1
    } else {
        quotient
    }
}

fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}
