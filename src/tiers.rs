//! Pricing Tiers
//!
//! A tier is a fixed quantity-for-price bundle offered by a seller: "any 3 prints for ¥2,550".

use std::cmp::Ordering;

use rust_decimal::{Decimal, RoundingStrategy};
use rusty_money::{Money, iso::Currency};
use smallvec::SmallVec;

/// A bundle offer: `quantity` units for a total of `price`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingTier<'a> {
    quantity: u32,
    price: Money<'a, Currency>,
}

impl<'a> PricingTier<'a> {
    /// Create a new tier.
    pub fn new(quantity: u32, price: Money<'a, Currency>) -> Self {
        Self { quantity, price }
    }

    /// Bundle size.
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Total price for the whole bundle.
    pub fn price(&self) -> &Money<'a, Currency> {
        &self.price
    }

    /// Price per unit, rounded to two decimal places of the minor unit.
    ///
    /// Display only; comparisons go through [`cmp_per_unit`](Self::cmp_per_unit).
    pub fn per_unit(&self) -> Decimal {
        per_unit_minor(self.price.to_minor_units(), self.quantity)
    }

    /// Exact per-unit ordering, comparing `a.price * b.qty` against `b.price * a.qty`.
    pub fn cmp_per_unit(&self, other: &PricingTier<'_>) -> Ordering {
        let lhs = i128::from(self.price.to_minor_units()) * i128::from(other.quantity);
        let rhs = i128::from(other.price.to_minor_units()) * i128::from(self.quantity);

        lhs.cmp(&rhs)
    }
}

/// Per-unit price in minor units for display purposes.
pub(crate) fn per_unit_minor(price_minor: i64, quantity: u32) -> Decimal {
    if quantity == 0 {
        return Decimal::ZERO;
    }

    (Decimal::from(price_minor) / Decimal::from(quantity))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A seller's tiers, sorted by quantity with at most one tier per quantity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TierSet<'a> {
    tiers: SmallVec<[PricingTier<'a>; 5]>,
}

impl<'a> TierSet<'a> {
    /// Create an empty tier set.
    pub fn new() -> Self {
        Self {
            tiers: SmallVec::new(),
        }
    }

    /// Insert a tier, replacing any existing tier of the same quantity.
    ///
    /// Returns the replaced tier, if there was one. No validation happens here; callers go
    /// through [`TierValidator`](crate::validation::TierValidator) first.
    pub fn insert(&mut self, tier: PricingTier<'a>) -> Option<PricingTier<'a>> {
        match self
            .tiers
            .binary_search_by_key(&tier.quantity(), PricingTier::quantity)
        {
            Ok(idx) => self
                .tiers
                .get_mut(idx)
                .map(|slot| std::mem::replace(slot, tier)),
            Err(idx) => {
                self.tiers.insert(idx, tier);
                None
            }
        }
    }

    /// Remove the tier with the given quantity.
    pub fn remove(&mut self, quantity: u32) -> Option<PricingTier<'a>> {
        let idx = self
            .tiers
            .binary_search_by_key(&quantity, PricingTier::quantity)
            .ok()?;

        Some(self.tiers.remove(idx))
    }

    /// Look up the tier with the given quantity.
    pub fn get(&self, quantity: u32) -> Option<&PricingTier<'a>> {
        self.tiers
            .binary_search_by_key(&quantity, PricingTier::quantity)
            .ok()
            .and_then(|idx| self.tiers.get(idx))
    }

    /// Iterate over the tiers in ascending quantity order.
    pub fn iter(&self) -> impl Iterator<Item = &PricingTier<'a>> {
        self.tiers.iter()
    }

    /// The tiers as a slice, ascending by quantity.
    pub fn as_slice(&self) -> &[PricingTier<'a>] {
        &self.tiers
    }

    /// Number of tiers.
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    /// Whether there are no tiers.
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

impl<'a> FromIterator<PricingTier<'a>> for TierSet<'a> {
    fn from_iter<I: IntoIterator<Item = PricingTier<'a>>>(iter: I) -> Self {
        let mut set = TierSet::new();

        for tier in iter {
            set.insert(tier);
        }

        set
    }
}

/// Tiers sorted by ascending per-unit price, ties broken by the larger bundle first.
pub fn by_best_value<'a>(tiers: &[PricingTier<'a>]) -> SmallVec<[PricingTier<'a>; 5]> {
    let mut sorted: SmallVec<[PricingTier<'a>; 5]> = tiers.iter().copied().collect();

    sorted.sort_by(|a, b| {
        a.cmp_per_unit(b)
            .then_with(|| b.quantity().cmp(&a.quantity()))
    });

    sorted
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::JPY;

    use super::*;

    fn tier(quantity: u32, price: i64) -> PricingTier<'static> {
        PricingTier::new(quantity, Money::from_minor(price, JPY))
    }

    #[test]
    fn per_unit_rounds_to_two_places() {
        assert_eq!(tier(3, 2550).per_unit(), Decimal::from(850));
        assert_eq!(tier(3, 1000).per_unit(), Decimal::new(33333, 2));
    }

    #[test]
    fn cmp_per_unit_is_exact() {
        // 1800/2 = 900 and 2700/3 = 900
        assert_eq!(tier(2, 1800).cmp_per_unit(&tier(3, 2700)), Ordering::Equal);
        assert_eq!(tier(2, 1800).cmp_per_unit(&tier(3, 2699)), Ordering::Greater);
        assert_eq!(tier(2, 1800).cmp_per_unit(&tier(3, 2701)), Ordering::Less);
    }

    #[test]
    fn insert_keeps_quantity_order_and_replaces() {
        let mut set = TierSet::new();

        assert!(set.insert(tier(5, 3750)).is_none());
        assert!(set.insert(tier(2, 1800)).is_none());
        assert!(set.insert(tier(3, 2550)).is_none());

        let replaced = set.insert(tier(3, 2500));

        assert_eq!(replaced, Some(tier(3, 2550)));

        let quantities: Vec<u32> = set.iter().map(PricingTier::quantity).collect();

        assert_eq!(quantities, vec![2, 3, 5]);
        assert_eq!(set.get(3), Some(&tier(3, 2500)));
    }

    #[test]
    fn remove_returns_tier() {
        let mut set: TierSet<'_> = [tier(2, 1800), tier(3, 2550)].into_iter().collect();

        assert_eq!(set.remove(2), Some(tier(2, 1800)));
        assert_eq!(set.remove(2), None);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn by_best_value_orders_cheapest_per_unit_first() {
        let sorted = by_best_value(&[tier(2, 1800), tier(3, 2550), tier(5, 3750)]);
        let quantities: Vec<u32> = sorted.iter().map(PricingTier::quantity).collect();

        assert_eq!(quantities, vec![5, 3, 2]);
    }

    #[test]
    fn by_best_value_prefers_larger_bundle_on_ties() {
        let sorted = by_best_value(&[tier(2, 1800), tier(4, 3600)]);
        let quantities: Vec<u32> = sorted.iter().map(PricingTier::quantity).collect();

        assert_eq!(quantities, vec![4, 2]);
    }
}
