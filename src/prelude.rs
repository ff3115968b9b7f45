//! Tierline prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    aggregate::{AggregateError, CartQuote, GroupQuote, aggregate},
    cart::{Cart, CartEntry, CartEntryKey, CartError, PricingSnapshot, RefreshReport, Staleness},
    catalog::{
        BasePriceChange, BasePriceResolution, Catalog, CatalogError, Gallery, GalleryKey,
        TierPreview,
    },
    checkout::{Settlement, SettlementError, settle},
    config::{ConfigError, TierPolicy},
    decomposition::{
        BreakdownLine, Decomposer, DecompositionError, DefaultDecomposer, ExhaustiveDecomposer,
        GreedyDecomposer, IlpDecomposer, PricingResult, Strategy, decompose,
    },
    receipt::{ReceiptError, write_quote},
    tiers::{PricingTier, TierSet},
    validation::{InvalidatedTier, TierEdit, TierError, TierValidator},
};
