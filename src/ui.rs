use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::history::{HistoryPoint, PeriodChange};
use crate::valuation::Valuation;

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn value_cell(value: f64) -> Cell {
    Cell::new(format!("{value:.2}")).set_alignment(CellAlignment::Right)
}

/// Percentage change with color coding; `None` renders as a dim "N/A".
fn change_cell(change: Option<f64>) -> Cell {
    match change {
        Some(change) => {
            let text = format!("{change:+.2}%");
            let color = if change >= 0.0 { Color::Green } else { Color::Red };
            Cell::new(text).fg(color).set_alignment(CellAlignment::Right)
        }
        None => Cell::new("N/A")
            .fg(Color::DarkGrey)
            .set_alignment(CellAlignment::Right),
    }
}

pub fn new_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Renders the valuation tree: one table of symbol groups per category,
/// the allocation breakdown, and the grand total. Groups below the display
/// threshold are hidden here and only here.
pub fn render_valuation(valuation: &Valuation, currency: &str) -> String {
    let mut table = new_styled_table();
    table.set_header(vec![
        header_cell("Category"),
        header_cell("Asset"),
        header_cell(&format!("Value ({currency})")),
        header_cell("24h"),
    ]);

    for category in &valuation.categories {
        if category.value == 0.0 {
            continue;
        }
        table.add_row(vec![
            Cell::new(category.category.to_string()).add_attribute(Attribute::Bold),
            Cell::new(""),
            value_cell(category.value),
            change_cell(category.change_24h),
        ]);
        for group in category.displayable_groups() {
            table.add_row(vec![
                Cell::new(""),
                Cell::new(&group.label),
                value_cell(group.value),
                change_cell(group.change_24h),
            ]);
        }
    }

    let allocation = valuation
        .allocation
        .iter()
        .map(|(category, value)| {
            let share = if valuation.total > 0.0 {
                value / valuation.total * 100.0
            } else {
                0.0
            };
            format!("{category} {share:.1}%")
        })
        .collect::<Vec<_>>()
        .join(" / ");

    let total_label = style(format!("Total ({currency}):")).bold();
    let total_value = style(format!("{:.2}", valuation.total)).green().bold();
    format!("{table}\n\nAllocation: {allocation}\n{total_label} {total_value}")
}

pub fn render_history(points: &[HistoryPoint], change: &PeriodChange, currency: &str) -> String {
    let mut table = new_styled_table();
    table.set_header(vec![
        header_cell("Time"),
        header_cell(&format!("Total ({currency})")),
        header_cell("Liquidity"),
        header_cell("Crypto"),
        header_cell("Investments"),
    ]);

    for point in points {
        table.add_row(vec![
            Cell::new(point.timestamp.format("%Y-%m-%d %H:%M").to_string()),
            value_cell(point.total),
            value_cell(point.liquidity),
            value_cell(point.crypto),
            value_cell(point.investments),
        ]);
    }

    let delta = format!("{:+.2} ({:+.2}%)", change.delta, change.percent);
    let styled = if change.delta >= 0.0 {
        style(delta).green()
    } else {
        style(delta).red()
    };
    format!("{table}\n\nPeriod change: {styled}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CashHolding, Holding};
    use crate::price::PriceCache;
    use crate::valuation::compute_valuation;
    use chrono::Utc;

    #[test]
    fn test_render_valuation_contains_totals() {
        let holdings = vec![Holding::Cash(CashHolding {
            label: "Checking".to_string(),
            amount: 1000.0,
        })];
        let valuation = compute_valuation(&holdings, &PriceCache::default(), 1.0, "USD", Utc::now());
        let rendered = render_valuation(&valuation, "USD");

        assert!(rendered.contains("Liquidity"));
        assert!(rendered.contains("1000.00"));
        assert!(rendered.contains("Liquidity 100.0%"));
    }

    #[test]
    fn test_render_history_shows_period_change() {
        let now = Utc::now();
        let points = vec![
            HistoryPoint {
                timestamp: now - chrono::Duration::hours(1),
                total: 1000.0,
                liquidity: 0.0,
                crypto: 1000.0,
                investments: 0.0,
            },
            HistoryPoint {
                timestamp: now,
                total: 1100.0,
                liquidity: 0.0,
                crypto: 1100.0,
                investments: 0.0,
            },
        ];
        let change = crate::history::period_change(&points);
        let rendered = render_history(&points, &change, "USD");
        assert!(rendered.contains("+100.00"));
        assert!(rendered.contains("+10.00%"));
    }
}
