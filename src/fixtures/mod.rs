//! Fixtures

use std::{fs, path::PathBuf};

use rustc_hash::FxHashMap;
use rusty_money::iso::Currency;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    cart::{Cart, CartError},
    catalog::{Catalog, CatalogError, Gallery, GalleryKey},
    fixtures::{
        carts::CartFixture,
        galleries::{GalleriesFixture, GalleryFixture},
    },
    tiers::PricingTier,
    validation::{InvalidatedTier, TierValidator},
};

pub mod carts;
pub mod galleries;

pub use galleries::{parse_money, parse_price};

/// Fixture Parsing Errors
#[derive(Debug, Error)]
pub enum FixtureError {
    /// IO error reading fixture files
    #[error("Failed to read fixture file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Invalid price format
    #[error("Invalid price format: {0}")]
    InvalidPrice(String),

    /// Unknown currency code
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    /// Currency mismatch between galleries
    #[error("Currency mismatch: expected {0}, found {1}")]
    CurrencyMismatch(String, String),

    /// Gallery not found
    #[error("Gallery not found: {0}")]
    GalleryNotFound(String),

    /// A gallery's base price or tiers were rejected.
    #[error("Gallery {gallery} rejected: {source}")]
    RejectedGallery {
        /// Gallery key in the fixture
        gallery: String,

        /// Why it was rejected
        #[source]
        source: CatalogError,
    },

    /// No galleries loaded yet
    #[error("No galleries loaded yet; currency unknown")]
    NoCurrency,

    /// No cart items loaded
    #[error("No cart items loaded; cannot create cart")]
    NoItems,

    /// Not enough items in fixture
    #[error("Not enough items in fixture, available: {available}, requested: {requested}")]
    NotEnoughItems {
        /// Number of items defined in the fixture
        available: usize,
        /// Number of items requested
        requested: usize,
    },

    /// Cart creation error
    #[error("Failed to create cart: {0}")]
    Cart(#[from] CartError),
}

/// One fixture gallery checked against a policy.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryAudit {
    /// Gallery key in the fixture
    pub key: String,

    /// Display name
    pub name: String,

    /// Number of tiers in the fixture
    pub tiers: usize,

    /// Tiers the policy rejects, in quantity order
    pub invalid: SmallVec<[InvalidatedTier<'static>; 5]>,
}

impl GalleryAudit {
    /// Whether every tier passed.
    pub fn is_clean(&self) -> bool {
        self.invalid.is_empty()
    }
}

/// Fixture
#[derive(Debug)]
pub struct Fixture<'a> {
    /// Base path for fixture files
    base_path: PathBuf,

    /// Galleries loaded so far
    catalog: Catalog<'a>,

    /// String key -> `SlotMap` key mappings for lookups
    gallery_keys: FxHashMap<String, GalleryKey>,

    /// One gallery per cart unit, in cart order
    items: Vec<GalleryKey>,

    /// Currency for the fixture set
    currency: Option<&'static Currency>,
}

impl<'a> Fixture<'a> {
    /// Create a new empty fixture with default base path
    pub fn new() -> Self {
        Self::with_base_path("./fixtures")
    }

    /// Create a new empty fixture with custom base path
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            catalog: Catalog::new(),
            gallery_keys: FxHashMap::default(),
            items: Vec::new(),
            currency: None,
        }
    }

    /// Load galleries from a YAML fixture file, running every tier through `validator` exactly
    /// as a seller's setup would.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, if currencies are mixed, or if a
    /// gallery's tiers are rejected.
    pub fn load_galleries(
        &mut self,
        name: &str,
        validator: &TierValidator<'_>,
    ) -> Result<&mut Self, FixtureError> {
        for (key, gallery_fixture) in self.read_galleries(name)? {
            let base_price = parse_money(&gallery_fixture.base_price)?;
            let currency = base_price.currency();

            if let Some(existing_currency) = self.currency {
                if existing_currency != currency {
                    return Err(FixtureError::CurrencyMismatch(
                        existing_currency.iso_alpha_code.to_string(),
                        currency.iso_alpha_code.to_string(),
                    ));
                }
            } else {
                self.currency = Some(currency);
            }

            let tiers = gallery_fixture
                .tiers
                .iter()
                .map(PricingTier::try_from)
                .collect::<Result<Vec<_>, _>>()?;

            let gallery = Gallery::with_tiers(gallery_fixture.name, base_price, tiers, validator)
                .map_err(|source| FixtureError::RejectedGallery {
                    gallery: key.clone(),
                    source,
                })?;

            let gallery_key = self.catalog.insert(gallery);

            self.gallery_keys.insert(key, gallery_key);
        }

        Ok(self)
    }

    /// Check every gallery in a YAML fixture file against `validator` without loading any.
    ///
    /// Unlike [`Fixture::load_galleries`], a rejected tier does not stop the run: each gallery
    /// is reported with every tier that fails, in sorted key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a price is malformed.
    pub fn audit_galleries(
        &self,
        name: &str,
        validator: &TierValidator<'_>,
    ) -> Result<Vec<GalleryAudit>, FixtureError> {
        self.read_galleries(name)?
            .into_iter()
            .map(|(key, gallery_fixture)| {
                let base_price = parse_money(&gallery_fixture.base_price)?;

                let tiers = gallery_fixture
                    .tiers
                    .iter()
                    .map(PricingTier::try_from)
                    .collect::<Result<Vec<_>, _>>()?;

                let invalid = validator.validate_set(&base_price, &tiers);

                Ok(GalleryAudit {
                    key,
                    name: gallery_fixture.name,
                    tiers: tiers.len(),
                    invalid,
                })
            })
            .collect()
    }

    /// Read a galleries file, sorted by key so catalog insertion order does not depend on hash
    /// order.
    fn read_galleries(&self, name: &str) -> Result<Vec<(String, GalleryFixture)>, FixtureError> {
        let file_path = self.base_path.join("galleries").join(format!("{name}.yml"));
        let contents = fs::read_to_string(&file_path)?;
        let fixture: GalleriesFixture = serde_norway::from_str(&contents)?;

        let mut galleries: Vec<_> = fixture.galleries.into_iter().collect();

        galleries.sort_by(|(a, _), (b, _)| a.cmp(b));

        Ok(galleries)
    }

    /// Load cart items from a YAML fixture file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or if referenced galleries don't
    /// exist.
    pub fn load_cart(&mut self, name: &str) -> Result<&mut Self, FixtureError> {
        let file_path = self.base_path.join("carts").join(format!("{name}.yml"));
        let contents = fs::read_to_string(&file_path)?;
        let fixture: CartFixture = serde_norway::from_str(&contents)?;

        for gallery in fixture.items {
            let gallery_key = self.gallery_key(&gallery)?;

            self.items.push(gallery_key);
        }

        Ok(self)
    }

    /// Load a complete fixture set (galleries and cart with the same name)
    ///
    /// # Errors
    ///
    /// Returns an error if any of the fixture files cannot be loaded.
    pub fn from_set(name: &str, validator: &TierValidator<'_>) -> Result<Self, FixtureError> {
        let mut fixture = Self::new();

        fixture.load_galleries(name, validator)?.load_cart(name)?;

        Ok(fixture)
    }

    /// Get a gallery key by its string key
    ///
    /// # Errors
    ///
    /// Returns an error if the gallery is not found.
    pub fn gallery_key(&self, key: &str) -> Result<GalleryKey, FixtureError> {
        self.gallery_keys
            .get(key)
            .copied()
            .ok_or_else(|| FixtureError::GalleryNotFound(key.to_string()))
    }

    /// Get a gallery by its string key
    ///
    /// # Errors
    ///
    /// Returns an error if the gallery is not found.
    pub fn gallery(&self, key: &str) -> Result<&Gallery<'a>, FixtureError> {
        self.catalog
            .get(self.gallery_key(key)?)
            .ok_or_else(|| FixtureError::GalleryNotFound(key.to_string()))
    }

    /// Galleries loaded so far
    pub fn catalog(&self) -> &Catalog<'a> {
        &self.catalog
    }

    /// Galleries loaded so far, for editing
    pub fn catalog_mut(&mut self) -> &mut Catalog<'a> {
        &mut self.catalog
    }

    /// Gallery keys of the cart items, in cart order
    pub fn items(&self) -> &[GalleryKey] {
        &self.items
    }

    /// Create a cart from the first `n` loaded items, or all of them
    ///
    /// # Errors
    ///
    /// Returns an error if no items are loaded or if cart creation fails.
    pub fn cart(&self, n: Option<usize>) -> Result<Cart<'a>, FixtureError> {
        let currency = self.currency.ok_or(FixtureError::NoCurrency)?;

        if self.items.is_empty() {
            return Err(FixtureError::NoItems);
        }

        if let Some(n) = n
            && n > self.items.len()
        {
            return Err(FixtureError::NotEnoughItems {
                requested: n,
                available: self.items.len(),
            });
        }

        let mut cart = Cart::new(currency);

        for &gallery_key in self.items.iter().take(n.unwrap_or(self.items.len())) {
            let gallery = self
                .catalog
                .get(gallery_key)
                .ok_or_else(|| FixtureError::GalleryNotFound(format!("{gallery_key:?}")))?;

            cart.add(gallery_key, gallery)?;
        }

        Ok(cart)
    }

    /// Get the currency
    ///
    /// # Errors
    ///
    /// Returns an error if no galleries have been loaded yet.
    pub fn currency(&self) -> Result<&'static Currency, FixtureError> {
        self.currency.ok_or(FixtureError::NoCurrency)
    }
}

impl Default for Fixture<'_> {
    fn default() -> Self {
        Self::new()
    }
}
