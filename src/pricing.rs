//! Prices

use rusty_money::{Money, MoneyError, iso::Currency};
use thiserror::Error;

use crate::cart::CartEntry;

/// Errors that can occur while calculating total price.
#[derive(Debug, Error, PartialEq)]
pub enum TotalPriceError {
    /// No entries were provided, so currency could not be determined.
    #[error("no entries provided; cannot determine currency")]
    NoEntries,

    /// Wrapped money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Calculates the total of the entries' unit prices, ignoring any bundles.
///
/// # Errors
///
/// - [`TotalPriceError::NoEntries`]: No entries were provided, so currency could not be
///   determined.
/// - [`TotalPriceError::Money`]: Wrapped money arithmetic or currency mismatch error.
pub fn total_price<'a>(entries: &[CartEntry<'a>]) -> Result<Money<'a, Currency>, TotalPriceError> {
    let first = entries.first().ok_or(TotalPriceError::NoEntries)?;

    let total = sum(
        first.unit_price().currency(),
        entries.iter().map(CartEntry::unit_price),
    )?;

    Ok(total)
}

/// Sum amounts that must all be in `currency`.
///
/// # Errors
///
/// Returns a [`MoneyError`] if an amount is in another currency.
pub fn sum<'a>(
    currency: &'a Currency,
    amounts: impl IntoIterator<Item = Money<'a, Currency>>,
) -> Result<Money<'a, Currency>, MoneyError> {
    amounts
        .into_iter()
        .try_fold(Money::from_minor(0, currency), |acc, amount| acc.add(amount))
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::{GBP, USD};
    use testresult::TestResult;

    use super::*;

    #[test]
    fn sum_adds_amounts() -> TestResult {
        let amounts = [Money::from_minor(100, USD), Money::from_minor(200, USD)];

        assert_eq!(sum(USD, amounts)?, Money::from_minor(300, USD));

        Ok(())
    }

    #[test]
    fn sum_of_nothing_is_zero() -> TestResult {
        assert_eq!(sum(GBP, [])?, Money::from_minor(0, GBP));

        Ok(())
    }

    #[test]
    fn sum_rejects_mixed_currencies() {
        let amounts = [Money::from_minor(100, USD), Money::from_minor(200, GBP)];

        assert!(sum(USD, amounts).is_err());
    }

    #[test]
    fn total_price_of_nothing_errors() {
        assert!(matches!(total_price(&[]), Err(TotalPriceError::NoEntries)));
    }
}
