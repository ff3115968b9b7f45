//! Cart
//!
//! Every entry carries a [`PricingSnapshot`] of its gallery, captured when it was added.
//! Pricing reads only the snapshots, so a seller editing tiers never changes what a buyer is
//! quoted until the buyer refreshes the cart.

use rusty_money::{Money, iso::Currency};
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use thiserror::Error;
use tracing::debug;

use crate::{
    aggregate::{AggregateError, CartQuote, aggregate},
    catalog::{Catalog, Gallery, GalleryKey},
    decomposition::Decomposer,
    pricing::{TotalPriceError, total_price},
    tiers::PricingTier,
};

new_key_type! {
    /// Cart Entry Key
    pub struct CartEntryKey;
}

/// Errors related to cart construction.
#[derive(Debug, Error)]
pub enum CartError {
    /// An entry's currency differs from the cart currency (entry currency, cart currency).
    #[error("Entry has currency {0}, but cart has currency {1}")]
    CurrencyMismatch(&'static str, &'static str),
}

/// Immutable copy of a gallery's pricing at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingSnapshot<'a> {
    version: u64,
    base_price: Money<'a, Currency>,
    tiers: SmallVec<[PricingTier<'a>; 5]>,
}

impl<'a> PricingSnapshot<'a> {
    /// Create a snapshot.
    pub fn new(version: u64, base_price: Money<'a, Currency>, tiers: &[PricingTier<'a>]) -> Self {
        Self {
            version,
            base_price,
            tiers: tiers.iter().copied().collect(),
        }
    }

    /// Gallery version the snapshot was taken at
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Base price at snapshot time
    pub fn base_price(&self) -> Money<'a, Currency> {
        self.base_price
    }

    /// Tiers at snapshot time
    pub fn tiers(&self) -> &[PricingTier<'a>] {
        &self.tiers
    }
}

/// One unit held in a cart.
#[derive(Debug, Clone, PartialEq)]
pub struct CartEntry<'a> {
    key: CartEntryKey,
    gallery: GalleryKey,
    unit_price: Money<'a, Currency>,
    snapshot: PricingSnapshot<'a>,
}

impl<'a> CartEntry<'a> {
    /// Entry key, unique within its cart
    pub fn key(&self) -> CartEntryKey {
        self.key
    }

    /// Owning gallery
    pub fn gallery(&self) -> GalleryKey {
        self.gallery
    }

    /// Unit price when added
    pub fn unit_price(&self) -> Money<'a, Currency> {
        self.unit_price
    }

    /// Pricing this entry is quoted from
    pub fn snapshot(&self) -> &PricingSnapshot<'a> {
        &self.snapshot
    }
}

/// Why an entry's snapshot no longer matches the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// The gallery has changed since the snapshot was taken.
    Changed {
        /// Version in the entry's snapshot
        snapshot_version: u64,

        /// Current gallery version
        live_version: u64,
    },

    /// The gallery no longer exists.
    GalleryRemoved,
}

/// An entry whose snapshot is out of date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleEntry {
    /// Entry key
    pub entry: CartEntryKey,

    /// Owning gallery
    pub gallery: GalleryKey,

    /// How it is stale
    pub staleness: Staleness,
}

/// Outcome of [`Cart::refresh`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Entries that were given a fresh snapshot
    pub refreshed: SmallVec<[CartEntryKey; 8]>,

    /// Entries whose gallery is gone; they keep their old snapshot
    pub orphaned: SmallVec<[CartEntryKey; 8]>,
}

/// A buyer's cart
#[derive(Debug)]
pub struct Cart<'a> {
    entries: Vec<CartEntry<'a>>,
    keys: SlotMap<CartEntryKey, ()>,
    currency: &'a Currency,
}

impl<'a> Cart<'a> {
    /// Create an empty cart.
    pub fn new(currency: &'a Currency) -> Self {
        Cart {
            entries: Vec::new(),
            keys: SlotMap::with_key(),
            currency,
        }
    }

    /// Add one unit from `gallery`, capturing its current pricing.
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if the gallery is priced in another currency.
    pub fn add(
        &mut self,
        gallery_key: GalleryKey,
        gallery: &Gallery<'a>,
    ) -> Result<CartEntryKey, CartError> {
        self.add_snapshot(gallery_key, gallery.base_price(), gallery.snapshot())
    }

    /// Add an entry from a previously captured snapshot, e.g. when restoring a saved cart.
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if the unit price or snapshot is in another currency.
    pub fn add_snapshot(
        &mut self,
        gallery_key: GalleryKey,
        unit_price: Money<'a, Currency>,
        snapshot: PricingSnapshot<'a>,
    ) -> Result<CartEntryKey, CartError> {
        for currency in [unit_price.currency(), snapshot.base_price().currency()] {
            if currency != self.currency {
                return Err(CartError::CurrencyMismatch(
                    currency.iso_alpha_code,
                    self.currency.iso_alpha_code,
                ));
            }
        }

        let key = self.keys.insert(());

        self.entries.push(CartEntry {
            key,
            gallery: gallery_key,
            unit_price,
            snapshot,
        });

        Ok(key)
    }

    /// Remove an entry.
    pub fn remove(&mut self, key: CartEntryKey) -> Option<CartEntry<'a>> {
        self.keys.remove(key)?;

        let idx = self.entries.iter().position(|entry| entry.key == key)?;

        Some(self.entries.remove(idx))
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.keys.clear();
    }

    /// Look up an entry.
    pub fn get(&self, key: CartEntryKey) -> Option<&CartEntry<'a>> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    /// Iterate over entries in the order they were added.
    pub fn iter(&self) -> impl Iterator<Item = &CartEntry<'a>> {
        self.entries.iter()
    }

    /// Entries in the order they were added.
    pub fn entries(&self) -> &[CartEntry<'a>] {
        &self.entries
    }

    /// Get the number of entries in the cart.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cart is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the currency of the cart.
    pub fn currency(&self) -> &'a Currency {
        self.currency
    }

    /// Calculate the subtotal of the cart at unit prices, before bundles.
    ///
    /// # Errors
    ///
    /// Returns a `TotalPriceError` if there was a money arithmetic or currency mismatch error.
    pub fn subtotal(&self) -> Result<Money<'a, Currency>, TotalPriceError> {
        if self.is_empty() {
            return Ok(Money::from_minor(0, self.currency));
        }

        total_price(&self.entries)
    }

    /// Price the cart from its snapshots.
    ///
    /// # Errors
    ///
    /// Returns an [`AggregateError`] if a snapshot is malformed.
    pub fn quote<D: Decomposer>(&self) -> Result<CartQuote<'a>, AggregateError> {
        aggregate::<D>(&self.entries, self.currency)
    }

    /// Entries whose snapshot differs from the live catalog.
    pub fn stale_entries(&self, catalog: &Catalog<'_>) -> SmallVec<[StaleEntry; 8]> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let staleness = match catalog.get(entry.gallery) {
                    None => Staleness::GalleryRemoved,
                    Some(gallery) if gallery.version() != entry.snapshot.version => {
                        Staleness::Changed {
                            snapshot_version: entry.snapshot.version,
                            live_version: gallery.version(),
                        }
                    }
                    Some(_) => return None,
                };

                Some(StaleEntry {
                    entry: entry.key,
                    gallery: entry.gallery,
                    staleness,
                })
            })
            .collect()
    }

    /// Replace stale snapshots with the catalog's current pricing.
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if a gallery is now priced in another currency; no entry is
    /// changed in that case.
    pub fn refresh(&mut self, catalog: &Catalog<'a>) -> Result<RefreshReport, CartError> {
        let mut report = RefreshReport::default();
        let mut updates: SmallVec<[(usize, Money<'a, Currency>, PricingSnapshot<'a>); 8]> =
            SmallVec::new();

        for (idx, entry) in self.entries.iter().enumerate() {
            let Some(gallery) = catalog.get(entry.gallery) else {
                report.orphaned.push(entry.key);
                continue;
            };

            if gallery.version() == entry.snapshot.version {
                continue;
            }

            let currency = gallery.base_price().currency();

            if currency != self.currency {
                return Err(CartError::CurrencyMismatch(
                    currency.iso_alpha_code,
                    self.currency.iso_alpha_code,
                ));
            }

            updates.push((idx, gallery.base_price(), gallery.snapshot()));
            report.refreshed.push(entry.key);
        }

        for (idx, unit_price, snapshot) in updates {
            if let Some(entry) = self.entries.get_mut(idx) {
                entry.unit_price = unit_price;
                entry.snapshot = snapshot;
            }
        }

        debug!(
            refreshed = report.refreshed.len(),
            orphaned = report.orphaned.len(),
            "refreshed cart snapshots"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::{JPY, USD};
    use testresult::TestResult;

    use crate::{
        config::TierPolicy, decomposition::DefaultDecomposer, validation::TierValidator,
    };

    use super::*;

    fn yen(minor: i64) -> Money<'static, Currency> {
        Money::from_minor(minor, JPY)
    }

    fn catalog(policy: &TierPolicy) -> TestResult<(Catalog<'static>, GalleryKey)> {
        let mut catalog = Catalog::new();

        let gallery = Gallery::with_tiers(
            "Harbour Lights",
            yen(1000),
            [
                PricingTier::new(2, yen(1800)),
                PricingTier::new(3, yen(2550)),
            ],
            &TierValidator::new(policy),
        )?;

        let key = catalog.insert(gallery);

        Ok((catalog, key))
    }

    #[test]
    fn add_captures_snapshot() -> TestResult {
        let policy = TierPolicy::default();
        let (catalog, key) = catalog(&policy)?;
        let mut cart = Cart::new(JPY);

        let gallery = catalog.get(key).ok_or("missing gallery")?;
        let entry_key = cart.add(key, gallery)?;

        let entry = cart.get(entry_key).ok_or("missing entry")?;

        assert_eq!(entry.gallery(), key);
        assert_eq!(entry.unit_price(), yen(1000));
        assert_eq!(entry.snapshot(), &gallery.snapshot());

        Ok(())
    }

    #[test]
    fn add_rejects_other_currencies() -> TestResult {
        let policy = TierPolicy::default();
        let (catalog, key) = catalog(&policy)?;
        let mut cart = Cart::new(USD);

        let gallery = catalog.get(key).ok_or("missing gallery")?;

        assert!(matches!(
            cart.add(key, gallery),
            Err(CartError::CurrencyMismatch("JPY", "USD"))
        ));

        Ok(())
    }

    #[test]
    fn remove_and_clear() -> TestResult {
        let policy = TierPolicy::default();
        let (catalog, key) = catalog(&policy)?;
        let mut cart = Cart::new(JPY);
        let gallery = catalog.get(key).ok_or("missing gallery")?;

        let first = cart.add(key, gallery)?;
        cart.add(key, gallery)?;

        assert!(cart.remove(first).is_some());
        assert!(cart.remove(first).is_none());
        assert_eq!(cart.len(), 1);

        cart.clear();

        assert!(cart.is_empty());
        assert_eq!(cart.subtotal()?, yen(0));

        Ok(())
    }

    #[test]
    fn subtotal_ignores_bundles() -> TestResult {
        let policy = TierPolicy::default();
        let (catalog, key) = catalog(&policy)?;
        let mut cart = Cart::new(JPY);
        let gallery = catalog.get(key).ok_or("missing gallery")?;

        for _ in 0..3 {
            cart.add(key, gallery)?;
        }

        assert_eq!(cart.subtotal()?, yen(3000));
        assert_eq!(cart.quote::<DefaultDecomposer>()?.grand_total(), yen(2550));

        Ok(())
    }

    #[test]
    fn tier_edits_do_not_reach_existing_entries_until_refresh() -> TestResult {
        let policy = TierPolicy::default();
        let validator = TierValidator::new(&policy);
        let (mut catalog, key) = catalog(&policy)?;
        let mut cart = Cart::new(JPY);

        {
            let gallery = catalog.get(key).ok_or("missing gallery")?;

            cart.add(key, gallery)?;
            cart.add(key, gallery)?;
        }

        assert_eq!(cart.quote::<DefaultDecomposer>()?.grand_total(), yen(1800));

        catalog
            .get_mut(key)
            .ok_or("missing gallery")?
            .update_tier(2, PricingTier::new(2, yen(1700)), &validator)?;

        // Still quoted from the snapshot.
        assert_eq!(cart.quote::<DefaultDecomposer>()?.grand_total(), yen(1800));

        let stale = cart.stale_entries(&catalog);

        assert_eq!(stale.len(), 2);
        assert!(stale.iter().all(|entry| entry.staleness
            == Staleness::Changed {
                snapshot_version: 2,
                live_version: 3
            }));

        let report = cart.refresh(&catalog)?;

        assert_eq!(report.refreshed.len(), 2);
        assert!(report.orphaned.is_empty());
        assert!(cart.stale_entries(&catalog).is_empty());
        assert_eq!(cart.quote::<DefaultDecomposer>()?.grand_total(), yen(1700));

        Ok(())
    }

    #[test]
    fn removed_gallery_keeps_pricing_from_snapshot() -> TestResult {
        let policy = TierPolicy::default();
        let (mut catalog, key) = catalog(&policy)?;
        let mut cart = Cart::new(JPY);

        {
            let gallery = catalog.get(key).ok_or("missing gallery")?;

            cart.add(key, gallery)?;
            cart.add(key, gallery)?;
        }

        catalog.remove(key);

        let stale = cart.stale_entries(&catalog);

        assert!(
            stale
                .iter()
                .all(|entry| entry.staleness == Staleness::GalleryRemoved)
        );

        let report = cart.refresh(&catalog)?;

        assert_eq!(report.orphaned.len(), 2);
        assert_eq!(cart.quote::<DefaultDecomposer>()?.grand_total(), yen(1800));

        Ok(())
    }
}
