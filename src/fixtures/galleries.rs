//! Gallery Fixtures

use rust_decimal::{Decimal, prelude::ToPrimitive};
use rustc_hash::FxHashMap;
use rusty_money::{
    Money,
    iso::{self, Currency},
};
use serde::Deserialize;

use crate::{fixtures::FixtureError, tiers::PricingTier};

/// Wrapper for galleries in YAML
#[derive(Debug, Deserialize)]
pub struct GalleriesFixture {
    /// Map of gallery key -> gallery fixture
    pub galleries: FxHashMap<String, GalleryFixture>,
}

/// Gallery fixture from YAML
#[derive(Debug, Deserialize)]
pub struct GalleryFixture {
    /// Display name
    pub name: String,

    /// Price of one unit, e.g. "1000 JPY"
    pub base_price: String,

    /// Bundle tiers
    #[serde(default)]
    pub tiers: Vec<TierFixture>,
}

/// Tier fixture from YAML
#[derive(Debug, Deserialize)]
pub struct TierFixture {
    /// Bundle size
    pub quantity: u32,

    /// Bundle price, e.g. "1800 JPY"
    pub price: String,
}

impl TryFrom<&TierFixture> for PricingTier<'static> {
    type Error = FixtureError;

    fn try_from(fixture: &TierFixture) -> Result<Self, Self::Error> {
        Ok(PricingTier::new(fixture.quantity, parse_money(&fixture.price)?))
    }
}

/// Parse a price string like "10.50 GBP" into minor units and currency.
///
/// # Errors
///
/// Returns an error if the amount is not a number, has more decimal places than the currency
/// allows, or the currency code is unknown.
pub fn parse_price(s: &str) -> Result<(i64, &'static Currency), FixtureError> {
    let mut parts = s.split_whitespace();

    let (Some(amount), Some(code), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(FixtureError::InvalidPrice(s.to_string()));
    };

    let currency = currency_for(code)?;

    let amount = amount
        .parse::<Decimal>()
        .map_err(|_err| FixtureError::InvalidPrice(s.to_string()))?;

    let scaled = amount * Decimal::from(10_i64.pow(currency.exponent));

    if !scaled.fract().is_zero() {
        return Err(FixtureError::InvalidPrice(s.to_string()));
    }

    let minor_units = scaled
        .to_i64()
        .ok_or_else(|| FixtureError::InvalidPrice(s.to_string()))?;

    Ok((minor_units, currency))
}

/// Parse a price string straight into [`Money`].
///
/// # Errors
///
/// Returns an error if the price cannot be parsed.
pub fn parse_money(s: &str) -> Result<Money<'static, Currency>, FixtureError> {
    let (minor_units, currency) = parse_price(s)?;

    Ok(Money::from_minor(minor_units, currency))
}

fn currency_for(code: &str) -> Result<&'static Currency, FixtureError> {
    match code {
        "GBP" => Ok(iso::GBP),
        "USD" => Ok(iso::USD),
        "EUR" => Ok(iso::EUR),
        "JPY" => Ok(iso::JPY),
        other => Err(FixtureError::UnknownCurrency(other.to_string())),
    }
}
