//! Utils

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{
    EnvFilter, Registry,
    layer::{Layer, SubscriberExt},
    util::{SubscriberInitExt, TryInitError},
};

use crate::{
    config::{ConfigError, TierPolicy},
    decomposition::Strategy,
};

/// Bundle pricing for fixture galleries and carts
#[derive(Debug, Parser)]
#[command(
    name = "tierline",
    about = "Bundle tier validation and cart pricing",
    long_about = None
)]
pub struct TierlineArgs {
    /// Fixture set to load galleries and cart from
    #[arg(
        short,
        long,
        global = true,
        env = "TIERLINE_FIXTURE",
        default_value = "harbour"
    )]
    pub fixture: String,

    /// Directory holding `galleries/`, `carts/` and `policy/`
    #[arg(
        long,
        global = true,
        env = "TIERLINE_FIXTURE_DIR",
        default_value = "./fixtures"
    )]
    pub fixture_dir: PathBuf,

    /// Tier policy YAML file; the built-in policy is used when omitted
    #[arg(short, long, global = true, env = "TIERLINE_POLICY")]
    pub policy: Option<PathBuf>,

    /// Decomposition strategy
    #[arg(
        short,
        long,
        global = true,
        env = "TIERLINE_STRATEGY",
        value_enum,
        default_value_t = Strategy::Exhaustive
    )]
    pub strategy: Strategy,

    /// Logging settings
    #[command(flatten)]
    pub logging: LoggingArgs,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

impl TierlineArgs {
    /// Load the configured tier policy.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the policy file cannot be read or is invalid.
    pub fn tier_policy(&self) -> Result<TierPolicy, ConfigError> {
        match &self.policy {
            Some(path) => TierPolicy::load(path),
            None => Ok(TierPolicy::default()),
        }
    }
}

/// Subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Price the fixture cart and print a receipt
    Quote {
        /// Number of cart items to use
        #[arg(short, long)]
        n: Option<usize>,
    },

    /// Re-check every fixture gallery's tiers against the policy
    Validate,

    /// Price quantities 1..=max for one gallery
    Preview {
        /// Gallery key in the fixture set
        #[arg(short, long)]
        gallery: String,

        /// Largest quantity to price
        #[arg(short = 'n', long, default_value_t = 10)]
        max: u32,
    },
}

/// Log output format.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormat {
    /// Compact, human-readable logs.
    Compact,

    /// Structured JSON logs.
    Json,
}

/// Logging settings.
#[derive(Debug, Args)]
pub struct LoggingArgs {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, env = "RUST_LOG", default_value = "warn")]
    pub log_level: String,

    /// Log format (compact, json)
    #[arg(
        long,
        global = true,
        env = "LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Compact
    )]
    pub log_format: LogFormat,
}

/// Install the global `tracing` subscriber, writing to stderr.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(args: &LoggingArgs) -> Result<(), TryInitError> {
    match args.log_format {
        LogFormat::Compact => init_with_layer(
            args,
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(true)
                .with_writer(std::io::stderr),
        ),
        LogFormat::Json => init_with_layer(
            args,
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true)
                .with_writer(std::io::stderr),
        ),
    }
}

fn init_with_layer<L>(args: &LoggingArgs, fmt_layer: L) -> Result<(), TryInitError>
where
    L: Layer<Registry> + Send + Sync + 'static,
{
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn parses_quote_with_defaults() -> TestResult {
        let args = TierlineArgs::try_parse_from(["tierline", "quote"])?;

        assert_eq!(args.fixture, "harbour");
        assert_eq!(args.strategy, Strategy::Exhaustive);
        assert!(matches!(args.command, Command::Quote { n: None }));

        Ok(())
    }

    #[test]
    fn parses_preview_options() -> TestResult {
        let args = TierlineArgs::try_parse_from([
            "tierline",
            "preview",
            "-g",
            "tide-pools",
            "-n",
            "6",
            "--strategy",
            "greedy",
        ])?;

        assert_eq!(args.strategy, Strategy::Greedy);
        assert!(matches!(
            args.command,
            Command::Preview { ref gallery, max: 6 } if gallery == "tide-pools"
        ));

        Ok(())
    }

    #[test]
    fn missing_policy_uses_default() -> TestResult {
        let args = TierlineArgs::try_parse_from(["tierline", "validate"])?;
        let policy = args.tier_policy()?;

        assert_eq!(policy.allowed_sizes(), TierPolicy::default().allowed_sizes());

        Ok(())
    }
}
