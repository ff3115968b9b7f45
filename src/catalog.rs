//! Catalog
//!
//! Galleries are the seller records bundle tiers hang off. Every change to a gallery goes
//! through the [`TierValidator`] and bumps the gallery's version, which is what cart snapshots
//! are compared against to detect staleness.

use rusty_money::{Money, iso::Currency};
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    cart::PricingSnapshot,
    decomposition::{Decomposer, DecompositionError, PricingResult},
    tiers::{PricingTier, TierSet},
    validation::{InvalidatedTier, PriceField, TierEdit, TierError, TierValidator},
};

new_key_type! {
    /// Gallery Key
    pub struct GalleryKey;
}

/// Errors raised while managing a gallery's pricing.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A tier or base price was rejected.
    #[error(transparent)]
    Tier(#[from] TierError),

    /// There is no tier with this quantity to update or remove.
    #[error("no {0}-item tier exists")]
    UnknownTier(u32),

    /// The gallery changed after a base-price change was proposed.
    #[error(
        "gallery changed since the base price change was proposed \
         (version {proposed}, now {current})"
    )]
    StaleProposal {
        /// Version the proposal was computed against
        proposed: u64,

        /// Current gallery version
        current: u64,
    },

    /// A blocking base-price change would invalidate existing tiers.
    #[error("changing the base price would invalidate {count} tier(s); remove them to continue")]
    BlockedByInvalidTiers {
        /// Number of tiers that would become invalid
        count: usize,
    },

    /// Pricing the preview table failed.
    #[error(transparent)]
    Decomposition(#[from] DecompositionError),
}

/// What to do with tiers a base-price change invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasePriceResolution {
    /// Refuse the change if any tier would become invalid.
    Block,

    /// Remove the invalidated tiers together with the price change.
    RemoveInvalidTiers,
}

/// A proposed base-price change and the tiers it would invalidate.
#[derive(Debug, Clone, PartialEq)]
pub struct BasePriceChange<'a> {
    /// Current base price
    pub from: Money<'a, Currency>,

    /// Proposed base price
    pub to: Money<'a, Currency>,

    /// Tiers that would no longer be valid under the new base price
    pub invalidated: SmallVec<[InvalidatedTier<'a>; 5]>,

    /// Gallery version the proposal was computed against
    pub version: u64,
}

impl BasePriceChange<'_> {
    /// Whether the change can be applied without removing any tiers.
    pub fn is_clean(&self) -> bool {
        self.invalidated.is_empty()
    }
}

/// The validator's verdict on a candidate tier, with the price table it would produce.
#[derive(Debug, Clone)]
pub struct TierPreview<'a> {
    /// Validation verdict for the candidate
    pub verdict: Result<(), TierError>,

    /// Prices for quantities `1..=n`; computed with the candidate applied only if it was
    /// accepted, otherwise with the current tiers.
    pub rows: Vec<PricingResult<'a>>,
}

/// A seller's catalog entry: base price plus bundle tiers.
#[derive(Debug, Clone)]
pub struct Gallery<'a> {
    name: String,
    base_price: Money<'a, Currency>,
    tiers: TierSet<'a>,
    version: u64,
}

impl<'a> Gallery<'a> {
    /// Create a gallery without any tiers.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] if the base price is not positive.
    pub fn new(
        name: impl Into<String>,
        base_price: Money<'a, Currency>,
    ) -> Result<Self, CatalogError> {
        check_base_price(&base_price)?;

        Ok(Self {
            name: name.into(),
            base_price,
            tiers: TierSet::new(),
            version: 0,
        })
    }

    /// Create a gallery with an initial set of tiers, each checked by `validator` as it is added.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] for the first tier that is rejected.
    pub fn with_tiers(
        name: impl Into<String>,
        base_price: Money<'a, Currency>,
        tiers: impl IntoIterator<Item = PricingTier<'a>>,
        validator: &TierValidator<'_>,
    ) -> Result<Self, CatalogError> {
        let mut gallery = Self::new(name, base_price)?;

        for tier in tiers {
            gallery.add_tier(tier, validator)?;
        }

        Ok(gallery)
    }

    /// Gallery name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Price of one unit bought alone
    pub fn base_price(&self) -> Money<'a, Currency> {
        self.base_price
    }

    /// Current tiers
    pub fn tiers(&self) -> &TierSet<'a> {
        &self.tiers
    }

    /// Incremented on every accepted change
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Add a new tier.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] if the validator rejects the tier.
    pub fn add_tier(
        &mut self,
        tier: PricingTier<'a>,
        validator: &TierValidator<'_>,
    ) -> Result<u64, CatalogError> {
        validator.validate(&tier, &self.base_price, self.tiers.as_slice(), TierEdit::Create)?;

        self.tiers.insert(tier);

        Ok(self.bump("added tier"))
    }

    /// Replace the tier with quantity `quantity` by `tier`, which may use a different quantity.
    ///
    /// Returns the replaced tier.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] if there is no tier to replace or the validator rejects the
    /// replacement.
    pub fn update_tier(
        &mut self,
        quantity: u32,
        tier: PricingTier<'a>,
        validator: &TierValidator<'_>,
    ) -> Result<PricingTier<'a>, CatalogError> {
        if self.tiers.get(quantity).is_none() {
            return Err(CatalogError::UnknownTier(quantity));
        }

        validator.validate(
            &tier,
            &self.base_price,
            self.tiers.as_slice(),
            TierEdit::Replace { quantity },
        )?;

        let replaced = self
            .tiers
            .remove(quantity)
            .ok_or(CatalogError::UnknownTier(quantity))?;

        self.tiers.insert(tier);
        self.bump("updated tier");

        Ok(replaced)
    }

    /// Remove the tier with quantity `quantity`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownTier`] if there is no such tier.
    pub fn remove_tier(&mut self, quantity: u32) -> Result<PricingTier<'a>, CatalogError> {
        let removed = self
            .tiers
            .remove(quantity)
            .ok_or(CatalogError::UnknownTier(quantity))?;

        self.bump("removed tier");

        Ok(removed)
    }

    /// Work out what changing the base price to `new_base_price` would do to the tiers.
    ///
    /// Nothing changes until the proposal is passed to
    /// [`apply_base_price_change`](Self::apply_base_price_change).
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] if the new base price is not positive or is in a different
    /// currency.
    pub fn propose_base_price(
        &self,
        new_base_price: Money<'a, Currency>,
        validator: &TierValidator<'_>,
    ) -> Result<BasePriceChange<'a>, CatalogError> {
        check_base_price(&new_base_price)?;

        if new_base_price.currency() != self.base_price.currency() {
            return Err(TierError::CurrencyMismatch(
                new_base_price.currency().iso_alpha_code,
                self.base_price.currency().iso_alpha_code,
            )
            .into());
        }

        let invalidated =
            validator.revalidate_for_base_price(&new_base_price, self.tiers.as_slice());

        Ok(BasePriceChange {
            from: self.base_price,
            to: new_base_price,
            invalidated,
            version: self.version,
        })
    }

    /// Apply a proposed base-price change in one step.
    ///
    /// Returns the tiers that were removed.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::StaleProposal`] if the gallery changed after the proposal was
    /// made, or [`CatalogError::BlockedByInvalidTiers`] if tiers would be invalidated and
    /// `resolution` is [`BasePriceResolution::Block`].
    pub fn apply_base_price_change(
        &mut self,
        change: BasePriceChange<'a>,
        resolution: BasePriceResolution,
    ) -> Result<SmallVec<[PricingTier<'a>; 5]>, CatalogError> {
        if change.version != self.version {
            return Err(CatalogError::StaleProposal {
                proposed: change.version,
                current: self.version,
            });
        }

        if !change.is_clean() && resolution == BasePriceResolution::Block {
            return Err(CatalogError::BlockedByInvalidTiers {
                count: change.invalidated.len(),
            });
        }

        let removed: SmallVec<[PricingTier<'a>; 5]> = change
            .invalidated
            .iter()
            .filter_map(|invalid| self.tiers.remove(invalid.tier.quantity()))
            .collect();

        self.base_price = change.to;

        info!(
            gallery = %self.name,
            from = change.from.to_minor_units(),
            to = change.to.to_minor_units(),
            removed = removed.len(),
            "base price changed"
        );

        self.bump("changed base price");

        Ok(removed)
    }

    /// Capture the current pricing as an immutable snapshot.
    pub fn snapshot(&self) -> PricingSnapshot<'a> {
        PricingSnapshot::new(self.version, self.base_price, self.tiers.as_slice())
    }

    /// Validate a candidate tier and price quantities `1..=max_quantity` as buyers would see
    /// them if it were saved.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] if the price table cannot be computed. A rejected candidate
    /// is not an error; it is reported in [`TierPreview::verdict`].
    pub fn preview_edit<D: Decomposer>(
        &self,
        candidate: PricingTier<'a>,
        edit: TierEdit,
        max_quantity: u32,
        validator: &TierValidator<'_>,
    ) -> Result<TierPreview<'a>, CatalogError> {
        let verdict = validator.validate(
            &candidate,
            &self.base_price,
            self.tiers.as_slice(),
            edit,
        );

        let mut tiers = self.tiers.clone();

        if verdict.is_ok() {
            if let TierEdit::Replace { quantity } = edit {
                tiers.remove(quantity);
            }

            tiers.insert(candidate);
        }

        let rows = (1..=max_quantity)
            .map(|quantity| D::decompose(quantity, self.base_price, tiers.as_slice()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TierPreview { verdict, rows })
    }

    fn bump(&mut self, change: &'static str) -> u64 {
        self.version += 1;

        debug!(gallery = %self.name, version = self.version, change, "gallery updated");

        self.version
    }
}

fn check_base_price(base_price: &Money<'_, Currency>) -> Result<(), TierError> {
    let minor_units = base_price.to_minor_units();

    if minor_units > 0 {
        Ok(())
    } else {
        Err(TierError::NonPositiveInput {
            field: PriceField::BasePrice,
            minor_units,
        })
    }
}

/// All galleries known to the engine.
#[derive(Debug, Default)]
pub struct Catalog<'a> {
    galleries: SlotMap<GalleryKey, Gallery<'a>>,
}

impl<'a> Catalog<'a> {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a gallery, returning its key.
    pub fn insert(&mut self, gallery: Gallery<'a>) -> GalleryKey {
        self.galleries.insert(gallery)
    }

    /// Look up a gallery.
    pub fn get(&self, key: GalleryKey) -> Option<&Gallery<'a>> {
        self.galleries.get(key)
    }

    /// Look up a gallery for editing.
    pub fn get_mut(&mut self, key: GalleryKey) -> Option<&mut Gallery<'a>> {
        self.galleries.get_mut(key)
    }

    /// Remove a gallery.
    pub fn remove(&mut self, key: GalleryKey) -> Option<Gallery<'a>> {
        self.galleries.remove(key)
    }

    /// Iterate over all galleries.
    pub fn iter(&self) -> impl Iterator<Item = (GalleryKey, &Gallery<'a>)> {
        self.galleries.iter()
    }

    /// Number of galleries.
    pub fn len(&self) -> usize {
        self.galleries.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.galleries.is_empty()
    }
}
