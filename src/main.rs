//! Tierline command line

use std::{
    io::{self, Write},
    time::Instant,
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use humanize_duration::{Truncate, prelude::DurationExt};
use tabled::{builder::Builder, settings::Style};
use tracing::info;

use tierline::{
    config::TierPolicy,
    decomposition::{ExhaustiveDecomposer, GreedyDecomposer, IlpDecomposer, Strategy},
    fixtures::Fixture,
    receipt::write_quote,
    utils::{Command, TierlineArgs, init_logging},
    validation::TierValidator,
};

fn main() -> Result<()> {
    let args = TierlineArgs::parse();

    init_logging(&args.logging)?;

    let policy = args.tier_policy()?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();

    match &args.command {
        Command::Quote { n } => quote(&mut handle, &args, &policy, *n),
        Command::Validate => validate(&mut handle, &args, &policy),
        Command::Preview { gallery, max } => preview(&mut handle, &args, &policy, gallery, *max),
    }
}

fn quote(
    out: &mut impl Write,
    args: &TierlineArgs,
    policy: &TierPolicy,
    n: Option<usize>,
) -> Result<()> {
    let validator = TierValidator::new(policy);
    let mut fixture = Fixture::with_base_path(&args.fixture_dir);

    fixture
        .load_galleries(&args.fixture, &validator)?
        .load_cart(&args.fixture)?;

    let cart = fixture.cart(n)?;

    let start = Instant::now();

    let quote = match args.strategy {
        Strategy::Greedy => cart.quote::<GreedyDecomposer>()?,
        Strategy::Exhaustive => cart.quote::<ExhaustiveDecomposer>()?,
        Strategy::Ilp => cart.quote::<IlpDecomposer>()?,
    };

    let elapsed = start.elapsed();

    info!(
        strategy = ?args.strategy,
        entries = cart.len(),
        groups = quote.groups().len(),
        "priced cart"
    );

    write_quote(&mut *out, &quote, fixture.catalog())?;

    writeln!(
        out,
        " {} ({}s)",
        elapsed.human(Truncate::Nano),
        elapsed.as_secs_f32()
    )?;

    Ok(())
}

/// Report every fixture tier that breaks `policy`, without stopping at the first rejection.
fn validate(out: &mut impl Write, args: &TierlineArgs, policy: &TierPolicy) -> Result<()> {
    let fixture = Fixture::with_base_path(&args.fixture_dir);
    let audit = fixture.audit_galleries(&args.fixture, &TierValidator::new(policy))?;
    let mut failures = 0_usize;

    for gallery in &audit {
        if gallery.is_clean() {
            writeln!(out, "{}: ok ({} tiers)", gallery.name, gallery.tiers)?;
            continue;
        }

        failures += gallery.invalid.len();

        writeln!(out, "{}:", gallery.name)?;

        for rejected in &gallery.invalid {
            writeln!(
                out,
                "  {}-item tier at {}: {}",
                rejected.tier.quantity(),
                rejected.tier.price(),
                rejected.reason
            )?;
        }
    }

    if failures > 0 {
        bail!("{failures} tier(s) violate the configured policy");
    }

    Ok(())
}

fn preview(
    out: &mut impl Write,
    args: &TierlineArgs,
    policy: &TierPolicy,
    gallery: &str,
    max: u32,
) -> Result<()> {
    let validator = TierValidator::new(policy);
    let mut fixture = Fixture::with_base_path(&args.fixture_dir);

    fixture.load_galleries(&args.fixture, &validator)?;

    let gallery = fixture
        .gallery(gallery)
        .with_context(|| format!("no gallery {gallery} in fixture {}", args.fixture))?;

    let mut builder = Builder::default();

    builder.push_record(["Qty", "Original", "Total", "Savings", "Breakdown"]);

    for quantity in 1..=max {
        let result =
            args.strategy
                .decompose(quantity, gallery.base_price(), gallery.tiers().as_slice())?;

        let breakdown = result
            .breakdown()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" + ");

        builder.push_record([
            quantity.to_string(),
            result.original().to_string(),
            result.total().to_string(),
            result.savings().to_string(),
            breakdown,
        ]);
    }

    let mut table = builder.build();

    table.with(Style::modern_rounded());

    writeln!(out, "{}\n\n{table}", gallery.name())?;

    Ok(())
}
