//! Tier Policy
//!
//! The commercial rules a seller's bundle tiers are checked against: which bundle sizes may be
//! offered, how deep a bundle discount may go, and how much per-unit rounding is tolerated when
//! comparing bundles against each other.

use std::{fs, path::Path};

use decimal_percentage::Percentage;
use rust_decimal::Decimal;
use serde::Deserialize;
use smallvec::{SmallVec, smallvec};
use thiserror::Error;

/// Policy configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading the policy file
    #[error("Failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Invalid percentage format
    #[error("Invalid percentage format: {0}")]
    InvalidPercentage(String),

    /// No bundle sizes are allowed, so no tier could ever be accepted.
    #[error("policy must allow at least one bundle size")]
    NoBundleSizes,

    /// A bundle must contain at least two units.
    #[error("bundle size {0} is below the minimum of 2")]
    BundleSizeTooSmall(u32),

    /// A discount bound lies outside `[0, 1]`.
    #[error("discount bound {0} must be between 0% and 100%")]
    DiscountBoundOutOfRange(Decimal),

    /// The minimum discount is larger than the maximum discount.
    #[error("minimum discount {min} exceeds maximum discount {max}")]
    DiscountBoundsInverted {
        /// Minimum discount fraction
        min: Decimal,

        /// Maximum discount fraction
        max: Decimal,
    },

    /// The per-unit tolerance must not be negative.
    #[error("per-unit tolerance must not be negative, got {0}")]
    NegativeTolerance(i64),
}

/// The rules every persisted pricing tier must satisfy.
#[derive(Debug, Clone)]
pub struct TierPolicy {
    allowed_sizes: SmallVec<[u32; 8]>,
    min_discount: Percentage,
    max_discount: Percentage,
    per_unit_tolerance: i64,
}

impl TierPolicy {
    /// Create a policy, checking that its bounds are coherent.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the size set is empty or contains a size below 2, if either
    /// discount bound lies outside `[0, 1]`, if `min_discount > max_discount`, or if the
    /// tolerance is negative.
    pub fn new(
        allowed_sizes: impl IntoIterator<Item = u32>,
        min_discount: Percentage,
        max_discount: Percentage,
        per_unit_tolerance: i64,
    ) -> Result<Self, ConfigError> {
        let mut sizes: SmallVec<[u32; 8]> = allowed_sizes.into_iter().collect();

        sizes.sort_unstable();
        sizes.dedup();

        if sizes.is_empty() {
            return Err(ConfigError::NoBundleSizes);
        }

        if let Some(&size) = sizes.iter().find(|&&size| size < 2) {
            return Err(ConfigError::BundleSizeTooSmall(size));
        }

        let min = fraction(min_discount);
        let max = fraction(max_discount);

        for bound in [min, max] {
            if bound < Decimal::ZERO || bound > Decimal::ONE {
                return Err(ConfigError::DiscountBoundOutOfRange(bound));
            }
        }

        if min > max {
            return Err(ConfigError::DiscountBoundsInverted { min, max });
        }

        if per_unit_tolerance < 0 {
            return Err(ConfigError::NegativeTolerance(per_unit_tolerance));
        }

        Ok(Self {
            allowed_sizes: sizes,
            min_discount,
            max_discount,
            per_unit_tolerance,
        })
    }

    /// Parse a policy from a YAML document. Missing keys take their default values.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the YAML cannot be parsed or describes an incoherent policy.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let file: PolicyFile = serde_norway::from_str(yaml)?;

        file.try_into()
    }

    /// Load a policy from a YAML file on disk.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;

        Self::from_yaml_str(&contents)
    }

    /// Bundle sizes a tier may use, ascending.
    pub fn allowed_sizes(&self) -> &[u32] {
        &self.allowed_sizes
    }

    /// Whether `quantity` is an allowed bundle size.
    pub fn allows_size(&self, quantity: u32) -> bool {
        self.allowed_sizes.binary_search(&quantity).is_ok()
    }

    /// Smallest acceptable discount.
    pub fn min_discount(&self) -> Percentage {
        self.min_discount
    }

    /// Largest acceptable discount.
    pub fn max_discount(&self) -> Percentage {
        self.max_discount
    }

    /// Smallest acceptable discount as a decimal fraction.
    pub fn min_discount_fraction(&self) -> Decimal {
        fraction(self.min_discount)
    }

    /// Largest acceptable discount as a decimal fraction.
    pub fn max_discount_fraction(&self) -> Decimal {
        fraction(self.max_discount)
    }

    /// Slack, in minor units per unit, allowed by the monotonicity check. Zero by default.
    pub fn per_unit_tolerance(&self) -> i64 {
        self.per_unit_tolerance
    }
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            allowed_sizes: smallvec![2, 3, 4, 5],
            min_discount: Percentage::from(Decimal::new(5, 2)),
            max_discount: Percentage::from(Decimal::new(50, 2)),
            per_unit_tolerance: 0,
        }
    }
}

/// On-disk shape of a policy file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyFile {
    /// Allowed bundle sizes
    pub allowed_sizes: Option<Vec<u32>>,

    /// Minimum discount (e.g. "5%" or "0.05")
    pub min_discount: Option<String>,

    /// Maximum discount (e.g. "50%" or "0.5")
    pub max_discount: Option<String>,

    /// Per-unit tolerance in minor units
    pub per_unit_tolerance: Option<i64>,
}

impl TryFrom<PolicyFile> for TierPolicy {
    type Error = ConfigError;

    fn try_from(file: PolicyFile) -> Result<Self, Self::Error> {
        let defaults = TierPolicy::default();

        let min_discount = file
            .min_discount
            .as_deref()
            .map(parse_percentage)
            .transpose()?
            .unwrap_or(defaults.min_discount);

        let max_discount = file
            .max_discount
            .as_deref()
            .map(parse_percentage)
            .transpose()?
            .unwrap_or(defaults.max_discount);

        TierPolicy::new(
            file.allowed_sizes
                .unwrap_or_else(|| defaults.allowed_sizes.to_vec()),
            min_discount,
            max_discount,
            file.per_unit_tolerance
                .unwrap_or(defaults.per_unit_tolerance),
        )
    }
}

/// Parse percentage string (e.g., "15%" or "0.15") into a `Percentage`
///
/// # Errors
///
/// Returns an error if the string cannot be parsed as a decimal number.
pub fn parse_percentage(s: &str) -> Result<Percentage, ConfigError> {
    let trimmed = s.trim();

    if let Some(percent_str) = trimmed.strip_suffix('%') {
        let value = percent_str
            .trim()
            .parse::<Decimal>()
            .map_err(|_err| ConfigError::InvalidPercentage(s.to_string()))?;

        Ok(Percentage::from(value / Decimal::ONE_HUNDRED))
    } else {
        let value = trimmed
            .parse::<Decimal>()
            .map_err(|_err| ConfigError::InvalidPercentage(s.to_string()))?;

        Ok(Percentage::from(value))
    }
}

/// `Percentage` does not expose its inner `Decimal`; multiplying by one recovers it.
pub(crate) fn fraction(percentage: Percentage) -> Decimal {
    percentage * Decimal::ONE
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use testresult::TestResult;

    use super::*;

    #[test]
    fn default_policy_matches_marketplace_rules() {
        let policy = TierPolicy::default();

        assert_eq!(policy.allowed_sizes(), &[2, 3, 4, 5]);
        assert_eq!(policy.min_discount_fraction(), Decimal::new(5, 2));
        assert_eq!(policy.max_discount_fraction(), Decimal::new(5, 1));
        assert_eq!(policy.per_unit_tolerance(), 0);
    }

    #[test]
    fn allows_size_checks_membership() {
        let policy = TierPolicy::default();

        assert!(policy.allows_size(3));
        assert!(!policy.allows_size(1));
        assert!(!policy.allows_size(6));
    }

    #[test]
    fn new_sorts_and_dedups_sizes() -> TestResult {
        let policy = TierPolicy::new(
            [5, 2, 5, 3],
            Percentage::from(0.05),
            Percentage::from(0.5),
            1,
        )?;

        assert_eq!(policy.allowed_sizes(), &[2, 3, 5]);

        Ok(())
    }

    #[test]
    fn new_rejects_single_unit_bundles() {
        let result = TierPolicy::new([1, 2], Percentage::from(0.05), Percentage::from(0.5), 1);

        assert!(matches!(result, Err(ConfigError::BundleSizeTooSmall(1))));
    }

    #[test]
    fn new_rejects_empty_size_set() {
        let result = TierPolicy::new([], Percentage::from(0.05), Percentage::from(0.5), 1);

        assert!(matches!(result, Err(ConfigError::NoBundleSizes)));
    }

    #[test]
    fn new_rejects_inverted_bounds() {
        let result = TierPolicy::new([2], Percentage::from(0.5), Percentage::from(0.05), 1);

        assert!(matches!(
            result,
            Err(ConfigError::DiscountBoundsInverted { .. })
        ));
    }

    #[test]
    fn new_rejects_discount_above_one() {
        let result = TierPolicy::new([2], Percentage::from(0.05), Percentage::from(1.5), 1);

        assert!(matches!(
            result,
            Err(ConfigError::DiscountBoundOutOfRange(_))
        ));
    }

    #[test]
    fn new_rejects_negative_tolerance() {
        let result = TierPolicy::new([2], Percentage::from(0.05), Percentage::from(0.5), -1);

        assert!(matches!(result, Err(ConfigError::NegativeTolerance(-1))));
    }

    #[test]
    fn yaml_overrides_only_given_keys() -> TestResult {
        let policy = TierPolicy::from_yaml_str("allowed_sizes: [2, 6]\nmax_discount: 40%\n")?;

        assert_eq!(policy.allowed_sizes(), &[2, 6]);
        assert_eq!(policy.min_discount_fraction(), Decimal::new(5, 2));
        assert_eq!(policy.max_discount_fraction(), Decimal::new(4, 1));

        Ok(())
    }

    #[test]
    fn yaml_rejects_unknown_keys() {
        let result = TierPolicy::from_yaml_str("max_bundle: 9\n");

        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn load_reads_policy_file() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;

        writeln!(file, "min_discount: \"0.10\"\nper_unit_tolerance: 2")?;

        let policy = TierPolicy::load(file.path())?;

        assert_eq!(policy.min_discount_fraction(), Decimal::new(10, 2));
        assert_eq!(policy.per_unit_tolerance(), 2);

        Ok(())
    }

    #[test]
    fn parse_percentage_accepts_both_formats() -> TestResult {
        assert_eq!(fraction(parse_percentage("15%")?), Decimal::new(15, 2));
        assert_eq!(fraction(parse_percentage("0.15")?), Decimal::new(15, 2));

        Ok(())
    }

    #[test]
    fn parse_percentage_rejects_garbage() {
        assert!(matches!(
            parse_percentage("lots"),
            Err(ConfigError::InvalidPercentage(_))
        ));
    }
}
