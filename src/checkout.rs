//! Checkout
//!
//! Settling re-prices the cart with the same decomposer that produced the displayed quote and
//! refuses to go ahead if anything moved in between.

use rusty_money::{Money, iso::Currency};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    aggregate::{AggregateError, CartQuote},
    cart::Cart,
    decomposition::Decomposer,
};

/// Reasons a cart cannot be settled.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// There is nothing to pay for.
    #[error("cart is empty")]
    EmptyCart,

    /// The quote computed now differs from the one shown to the buyer.
    #[error("quoted {displayed} {currency} but the cart now prices at {current} {currency}")]
    QuoteChanged {
        /// Displayed grand total in minor units
        displayed: i64,

        /// Recomputed grand total in minor units
        current: i64,

        /// ISO code of the cart currency
        currency: &'static str,
    },

    /// Pricing the cart failed.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// The amount handed to the payment mechanism.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement<'a> {
    amount: Money<'a, Currency>,
    savings: Money<'a, Currency>,
    entries: usize,
}

impl<'a> Settlement<'a> {
    /// Amount to charge; identical to the displayed grand total
    pub fn amount(&self) -> Money<'a, Currency> {
        self.amount
    }

    /// Savings the buyer received
    pub fn savings(&self) -> Money<'a, Currency> {
        self.savings
    }

    /// Number of entries settled
    pub fn entries(&self) -> usize {
        self.entries
    }
}

/// Settle `cart` at the `displayed` quote.
///
/// On success the cart is cleared. On failure it is left untouched so the buyer can be shown
/// the new quote.
///
/// # Errors
///
/// Returns [`SettlementError::QuoteChanged`] if re-pricing the cart with `D` does not give
/// exactly `displayed`, or another [`SettlementError`] if the cart is empty or cannot be priced.
pub fn settle<'a, D: Decomposer>(
    cart: &mut Cart<'a>,
    displayed: &CartQuote<'a>,
) -> Result<Settlement<'a>, SettlementError> {
    if cart.is_empty() {
        return Err(SettlementError::EmptyCart);
    }

    let current = cart.quote::<D>()?;

    if &current != displayed {
        warn!(
            displayed = displayed.grand_total().to_minor_units(),
            current = current.grand_total().to_minor_units(),
            "quote changed before settlement"
        );

        return Err(SettlementError::QuoteChanged {
            displayed: displayed.grand_total().to_minor_units(),
            current: current.grand_total().to_minor_units(),
            currency: current.currency().iso_alpha_code,
        });
    }

    let settlement = Settlement {
        amount: current.grand_total(),
        savings: current.total_savings(),
        entries: cart.len(),
    };

    cart.clear();

    info!(
        amount = settlement.amount.to_minor_units(),
        currency = settlement.amount.currency().iso_alpha_code,
        entries = settlement.entries,
        "settled cart"
    );

    Ok(settlement)
}
