//! Cart Aggregation
//!
//! Groups cart entries by gallery, prices each group once from its snapshot and sums the
//! results. Pure: nothing is looked up or mutated.

use decimal_percentage::Percentage;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use rusty_money::{Money, MoneyError, iso::Currency};
use smallvec::SmallVec;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    cart::{CartEntry, CartEntryKey, PricingSnapshot},
    catalog::GalleryKey,
    decomposition::{Decomposer, DecompositionError, PricingResult},
    pricing::sum,
};

/// Errors raised while pricing a cart.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// A group's snapshot could not be priced.
    #[error("failed to price gallery {gallery:?}: {source}")]
    Decomposition {
        /// Gallery whose snapshot is malformed
        gallery: GalleryKey,

        /// Underlying error
        #[source]
        source: DecompositionError,
    },

    /// A group holds more entries than can be priced.
    #[error("gallery {0:?} has too many entries to price")]
    TooManyEntries(GalleryKey),

    /// Wrapped money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Pricing for the entries of one gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupQuote<'a> {
    gallery: GalleryKey,
    entries: SmallVec<[CartEntryKey; 8]>,
    result: PricingResult<'a>,
    snapshot_diverged: bool,
}

impl<'a> GroupQuote<'a> {
    /// Gallery the group belongs to
    pub fn gallery(&self) -> GalleryKey {
        self.gallery
    }

    /// Entries in the group, in cart order
    pub fn entries(&self) -> &[CartEntryKey] {
        &self.entries
    }

    /// Decomposition of the group
    pub fn result(&self) -> &PricingResult<'a> {
        &self.result
    }

    /// Whether entries in the group carried different snapshots. The group is still priced
    /// from the first entry's snapshot.
    pub fn snapshot_diverged(&self) -> bool {
        self.snapshot_diverged
    }
}

/// Pricing for a whole cart.
#[derive(Debug, Clone, PartialEq)]
pub struct CartQuote<'a> {
    currency: &'a Currency,
    groups: Vec<GroupQuote<'a>>,
    original_total: Money<'a, Currency>,
    grand_total: Money<'a, Currency>,
    total_savings: Money<'a, Currency>,
}

impl<'a> CartQuote<'a> {
    /// Currency every amount is in
    pub fn currency(&self) -> &'a Currency {
        self.currency
    }

    /// Per-gallery results, in the order each gallery first appears in the cart
    pub fn groups(&self) -> &[GroupQuote<'a>] {
        &self.groups
    }

    /// Look up the group for a gallery.
    pub fn group(&self, gallery: GalleryKey) -> Option<&GroupQuote<'a>> {
        self.groups.iter().find(|group| group.gallery == gallery)
    }

    /// Sum of every group's price without bundles
    pub fn original_total(&self) -> Money<'a, Currency> {
        self.original_total
    }

    /// Amount to charge
    pub fn grand_total(&self) -> Money<'a, Currency> {
        self.grand_total
    }

    /// Sum of every group's savings
    pub fn total_savings(&self) -> Money<'a, Currency> {
        self.total_savings
    }

    /// Savings relative to the original total.
    pub fn savings_percent(&self) -> Percentage {
        let original = self.original_total.to_minor_units();

        if original == 0 {
            return Percentage::from(Decimal::ZERO);
        }

        Percentage::from(
            Decimal::from(self.total_savings.to_minor_units()) / Decimal::from(original),
        )
    }
}

/// Price `entries` gallery by gallery with decomposer `D`.
///
/// Each group is priced from the snapshot of its first entry.
///
/// # Errors
///
/// Returns an [`AggregateError`] if a snapshot is malformed or amounts are in the wrong
/// currency.
pub fn aggregate<'a, D: Decomposer>(
    entries: &[CartEntry<'a>],
    currency: &'a Currency,
) -> Result<CartQuote<'a>, AggregateError> {
    struct Group<'e, 'a> {
        gallery: GalleryKey,
        snapshot: &'e PricingSnapshot<'a>,
        entries: SmallVec<[CartEntryKey; 8]>,
        diverged: bool,
    }

    let mut positions: FxHashMap<GalleryKey, usize> = FxHashMap::default();
    let mut groups: Vec<Group<'_, 'a>> = Vec::new();

    for entry in entries {
        let idx = *positions.entry(entry.gallery()).or_insert_with(|| {
            groups.push(Group {
                gallery: entry.gallery(),
                snapshot: entry.snapshot(),
                entries: SmallVec::new(),
                diverged: false,
            });

            groups.len() - 1
        });

        if let Some(group) = groups.get_mut(idx) {
            if group.snapshot != entry.snapshot() {
                group.diverged = true;
            }

            group.entries.push(entry.key());
        }
    }

    let mut quotes = Vec::with_capacity(groups.len());

    for group in groups {
        if group.diverged {
            warn!(
                gallery = ?group.gallery,
                entries = group.entries.len(),
                version = group.snapshot.version(),
                "entries carry different snapshots; pricing from the first"
            );
        }

        let quantity = u32::try_from(group.entries.len())
            .map_err(|_err| AggregateError::TooManyEntries(group.gallery))?;

        let result = D::decompose(
            quantity,
            group.snapshot.base_price(),
            group.snapshot.tiers(),
        )
        .map_err(|source| AggregateError::Decomposition {
            gallery: group.gallery,
            source,
        })?;

        quotes.push(GroupQuote {
            gallery: group.gallery,
            entries: group.entries,
            result,
            snapshot_diverged: group.diverged,
        });
    }

    let original_total = sum(currency, quotes.iter().map(|quote| quote.result.original()))?;
    let grand_total = sum(currency, quotes.iter().map(|quote| quote.result.total()))?;
    let total_savings = sum(currency, quotes.iter().map(|quote| quote.result.savings()))?;

    debug!(
        groups = quotes.len(),
        entries = entries.len(),
        grand_total = grand_total.to_minor_units(),
        "aggregated cart"
    );

    Ok(CartQuote {
        currency,
        groups: quotes,
        original_total,
        grand_total,
        total_savings,
    })
}
