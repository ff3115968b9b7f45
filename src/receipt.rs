//! Receipt

use std::io;

use rust_decimal::Decimal;
use smallvec::SmallVec;
use tabled::{
    builder::Builder,
    grid::config::HorizontalLine,
    settings::{
        Alignment, Color, Style, Theme,
        object::{Columns, Rows},
    },
};
use thiserror::Error;

use crate::{
    aggregate::{CartQuote, GroupQuote},
    catalog::Catalog,
    config::fraction,
    decomposition::{BreakdownLine, DecompositionError},
};

/// Errors that can occur when writing a receipt.
#[derive(Debug, Error)]
pub enum ReceiptError {
    /// A breakdown line total could not be computed.
    #[error(transparent)]
    Decomposition(#[from] DecompositionError),

    /// IO error
    #[error("IO error")]
    IO,
}

/// Write a quote as a table of breakdown lines per gallery, followed by the totals.
///
/// Gallery names are looked up in `catalog`; a gallery that has since been removed is still
/// listed, priced from its snapshot.
///
/// # Errors
///
/// Returns a [`ReceiptError`] if a line total overflows or writing fails.
pub fn write_quote(
    mut out: impl io::Write,
    quote: &CartQuote<'_>,
    catalog: &Catalog<'_>,
) -> Result<(), ReceiptError> {
    let mut builder = Builder::default();

    builder.push_record(["", "Gallery", "Line", "Units", "Each", "Total"]);

    let mut group_boundary_rows: SmallVec<[usize; 16]> = SmallVec::new();
    let mut row = 1;

    for (idx, group) in quote.groups().iter().enumerate() {
        group_boundary_rows.push(row);

        row += append_group_rows(&mut builder, idx, group, catalog)?;
    }

    let mut table = builder.build();
    let mut theme = Theme::from(Style::modern_rounded());
    let separator = HorizontalLine::new(Some('─'), Some('┼'), Some('├'), Some('┤'));

    theme.remove_horizontal_lines();

    for &boundary in &group_boundary_rows {
        theme.insert_horizontal_line(boundary, separator);
    }

    table.with(theme);
    table.modify(Rows::first(), Color::BOLD);
    table.modify(Columns::new(3..6), Alignment::right());

    writeln!(out, "\n{table}").map_err(|_err| ReceiptError::IO)?;

    write_summary(&mut out, quote)
}

/// Append one row per breakdown line, returning how many rows were added.
fn append_group_rows(
    builder: &mut Builder,
    idx: usize,
    group: &GroupQuote<'_>,
    catalog: &Catalog<'_>,
) -> Result<usize, ReceiptError> {
    let mut name = catalog
        .get(group.gallery())
        .map_or_else(|| "<removed>".to_string(), |gallery| gallery.name().to_string());

    if group.snapshot_diverged() {
        name.push_str(" (mixed snapshots)");
    }

    let breakdown = group.result().breakdown();

    for (line_idx, line) in breakdown.iter().enumerate() {
        let each = match line {
            BreakdownLine::Bundle { price, .. } => price,
            BreakdownLine::Individual { unit_price, .. } => unit_price,
        };

        let (number, gallery) = if line_idx == 0 {
            (format!("#{:<3}", idx + 1), name.clone())
        } else {
            (String::new(), String::new())
        };

        builder.push_record([
            number,
            gallery,
            line.to_string(),
            line.units().to_string(),
            format!("{each}"),
            format!("{}", line.total()?),
        ]);
    }

    Ok(breakdown.len())
}

fn write_summary(out: &mut impl io::Write, quote: &CartQuote<'_>) -> Result<(), ReceiptError> {
    let percent_points = (fraction(quote.savings_percent()) * Decimal::ONE_HUNDRED).round_dp(2);

    let lines = [
        ("Subtotal:", format!("{}", quote.original_total())),
        ("Total:", format!("{}", quote.grand_total())),
        (
            "Savings:",
            format!("({percent_points:.2}%) {}", quote.total_savings()),
        ),
    ];

    let value_width = lines
        .iter()
        .map(|(_, value)| value.chars().count())
        .max()
        .unwrap_or_default();

    for (label, value) in lines {
        writeln!(out, " {label:>9}  {value:>value_width$}").map_err(|_err| ReceiptError::IO)?;
    }

    writeln!(out).map_err(|_err| ReceiptError::IO)
}
