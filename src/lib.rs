//! Tierline
//!
//! Quantity-based bundle pricing for multi-seller carts.
//!
//! Sellers attach bundle tiers to a gallery ("3 prints for 22.50"). Tiers are checked by the
//! [`validation::TierValidator`] before they are persisted, each seller's cart units are priced
//! at the lowest total their tiers allow by a [`decomposition::Decomposer`], and the
//! [`aggregate`] module sums the per-seller results into one cart quote.

pub mod aggregate;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod decomposition;
pub mod fixtures;
pub mod prelude;
pub mod pricing;
pub mod receipt;
pub mod tiers;
pub mod utils;
pub mod validation;
