use super::ui;
use crate::core::currency::{CURRENCIES, STATIC_RATES, find_currency, normalize_code};
use crate::core::rates::{RateResolver, RefreshOutcome};
use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, Utc};
use comfy_table::Cell;
use futures::future::join_all;

/// One resolved conversion, ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub from: String,
    pub to: String,
    pub rate: f64,
    pub amount: Option<f64>,
}

/// `as_of` is the fetch time of a historical record. `None` reads as "latest".
pub fn rate_table(conversion: &Conversion, as_of: Option<DateTime<Utc>>) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("From"),
        ui::header_cell("To"),
        ui::header_cell("Rate"),
        ui::header_cell("As of"),
    ]);
    table.add_row(vec![
        Cell::new(&conversion.from),
        Cell::new(&conversion.to),
        ui::number_cell(format!("{:.6}", conversion.rate)),
        Cell::new(as_of.map_or_else(
            || "latest".to_string(),
            |at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        )),
    ]);
    table.to_string()
}

fn format_amount(amount: f64, currency: &str) -> String {
    match find_currency(currency) {
        Some(info) => format!("{}{amount:.2}", info.symbol),
        None => format!("{amount:.2}"),
    }
}

pub fn conversion_table(amount: f64, from: &str, conversions: &[Conversion]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Currency"),
        ui::header_cell(&format!("Rate (1 {from})")),
        ui::header_cell(&format!("{amount:.2} {from}")),
    ]);
    for conversion in conversions {
        table.add_row(vec![
            Cell::new(&conversion.to),
            ui::number_cell(format!("{:.6}", conversion.rate)),
            ui::format_optional_cell(conversion.amount, |a| format_amount(a, &conversion.to)),
        ]);
    }
    table.to_string()
}

pub fn currencies_table() -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Symbol"),
        ui::header_cell("Fallback (per USD)"),
    ]);
    for currency in CURRENCIES {
        let fallback = STATIC_RATES
            .iter()
            .find(|(code, _)| *code == currency.code)
            .map(|(_, rate)| *rate);
        table.add_row(vec![
            Cell::new(currency.code),
            Cell::new(currency.name),
            Cell::new(currency.symbol),
            ui::format_optional_cell(fallback, |r| format!("{r:.4}")),
        ]);
    }
    table.to_string()
}

pub async fn show_rate(
    resolver: &RateResolver,
    from: &str,
    to: &str,
    date: Option<NaiveDate>,
) -> Result<()> {
    let (from, to) = (normalize_code(from), normalize_code(to));
    let dated = resolver.rate_on(&from, &to, date).await;
    if let (Some(date), None) = (date, dated.fetched_at) {
        println!(
            "{}",
            ui::style_text(
                &format!("No stored rate for {date}, showing the latest rate"),
                ui::StyleType::Subtle,
            )
        );
    }
    let conversion = Conversion {
        from,
        to,
        rate: dated.rate,
        amount: None,
    };
    println!("{}", rate_table(&conversion, dated.fetched_at));
    Ok(())
}

pub async fn show_conversion(
    resolver: &RateResolver,
    amount: f64,
    from: &str,
    targets: &[String],
) -> Result<()> {
    let from = normalize_code(from);
    let conversions = join_all(targets.iter().map(|target| {
        let from = from.clone();
        async move {
            let to = normalize_code(target);
            let rate = resolver.resolve_rate(&from, &to).await;
            Conversion {
                from,
                to,
                rate,
                amount: Some(amount * rate),
            }
        }
    }))
    .await;

    println!("{}", conversion_table(amount, &from, &conversions));
    Ok(())
}

pub async fn refresh(resolver: &RateResolver) -> Result<()> {
    let pb = ui::new_spinner("Refreshing exchange rates...");
    let outcome = resolver.refresh_all_rates().await;
    pb.finish_and_clear();

    let message = match outcome {
        RefreshOutcome::Refreshed { count, fetched_at } => ui::style_text(
            &format!("Stored {count} rates fetched at {fetched_at}"),
            ui::StyleType::Highlight,
        ),
        RefreshOutcome::NoProvider => ui::style_text(
            "No exchange rate provider configured; nothing refreshed",
            ui::StyleType::Subtle,
        ),
        RefreshOutcome::Failed(reason) => ui::style_text(
            &format!("Refresh failed, keeping existing rates: {reason}"),
            ui::StyleType::Error,
        ),
    };
    println!("{message}");
    Ok(())
}
