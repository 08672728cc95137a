//! Currency conversion abstractions

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reference currency that snapshot providers and the static table quote against.
pub const PIVOT_CURRENCY: &str = "USD";

/// Approximate pivot-relative rates used when no provider answer is available.
pub const STATIC_RATES: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("EUR", 0.92),
    ("GBP", 0.79),
    ("JPY", 149.5),
    ("CAD", 1.36),
    ("AUD", 1.53),
    ("CHF", 0.89),
    ("CNY", 7.24),
    ("INR", 83.1),
    ("MXN", 17.2),
    ("BRL", 4.97),
    ("SGD", 1.34),
    ("HKD", 7.82),
    ("NOK", 10.6),
    ("SEK", 10.4),
    ("DKK", 6.88),
    ("NZD", 1.63),
    ("ZAR", 18.6),
    ("AED", 3.67),
    ("THB", 35.1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CurrencyInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub symbol: &'static str,
}

const fn info(code: &'static str, name: &'static str, symbol: &'static str) -> CurrencyInfo {
    CurrencyInfo { code, name, symbol }
}

pub const CURRENCIES: &[CurrencyInfo] = &[
    info("USD", "US Dollar", "$"),
    info("EUR", "Euro", "€"),
    info("GBP", "British Pound", "£"),
    info("JPY", "Japanese Yen", "¥"),
    info("CAD", "Canadian Dollar", "CA$"),
    info("AUD", "Australian Dollar", "A$"),
    info("CHF", "Swiss Franc", "Fr"),
    info("CNY", "Chinese Yuan", "¥"),
    info("INR", "Indian Rupee", "₹"),
    info("MXN", "Mexican Peso", "MX$"),
    info("BRL", "Brazilian Real", "R$"),
    info("SGD", "Singapore Dollar", "S$"),
    info("HKD", "Hong Kong Dollar", "HK$"),
    info("NOK", "Norwegian Krone", "kr"),
    info("SEK", "Swedish Krona", "kr"),
    info("DKK", "Danish Krone", "kr"),
    info("NZD", "New Zealand Dollar", "NZ$"),
    info("ZAR", "South African Rand", "R"),
    info("AED", "UAE Dirham", "د.إ"),
    info("THB", "Thai Baht", "฿"),
    info("KRW", "South Korean Won", "₩"),
    info("IDR", "Indonesian Rupiah", "Rp"),
    info("TRY", "Turkish Lira", "₺"),
    info("RUB", "Russian Ruble", "₽"),
    info("SAR", "Saudi Riyal", "﷼"),
    info("PLN", "Polish Zloty", "zł"),
    info("PHP", "Philippine Peso", "₱"),
    info("MYR", "Malaysian Ringgit", "RM"),
    info("CZK", "Czech Koruna", "Kč"),
    info("HUF", "Hungarian Forint", "Ft"),
];

/// An immutable conversion rate observation: `target = base * rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateRecord {
    pub base_currency: String,
    pub target_currency: String,
    pub rate: f64,
    pub fetched_at: DateTime<Utc>,
}

impl ExchangeRateRecord {
    pub fn new(base: &str, target: &str, rate: f64, fetched_at: DateTime<Utc>) -> Self {
        Self {
            base_currency: base.to_string(),
            target_currency: target.to_string(),
            rate,
            fetched_at,
        }
    }
}

#[async_trait]
pub trait CurrencyRateProvider: Send + Sync {
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64>;
}

/// A source of bulk pivot-relative rates ("1 pivot = N currency").
#[async_trait]
pub trait RateSnapshotProvider: Send + Sync {
    fn pivot(&self) -> &str {
        PIVOT_CURRENCY
    }

    async fn fetch_latest(&self) -> Result<HashMap<String, f64>>;
}

/// Uppercases and trims a currency code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Codes are only checked for shape, not against ISO 4217.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

/// Cross rate through the pivot, given both legs as pivot -> currency.
pub fn cross_rate(pivot_to_base: f64, pivot_to_target: f64) -> f64 {
    (1.0 / pivot_to_base) * pivot_to_target
}

/// Pivot-relative static rate; unknown codes are treated as equal to the pivot.
pub fn static_pivot_rate(code: &str) -> f64 {
    STATIC_RATES
        .iter()
        .find(|(c, _)| *c == code)
        .map_or(1.0, |(_, rate)| *rate)
}

pub fn static_cross_rate(base: &str, target: &str) -> f64 {
    cross_rate(static_pivot_rate(base), static_pivot_rate(target))
}

pub fn find_currency(code: &str) -> Option<&'static CurrencyInfo> {
    CURRENCIES.iter().find(|c| c.code == code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_cross_rate() {
        assert!((static_cross_rate("EUR", "USD") - 1.0 / 0.92).abs() < 1e-12);
        assert!((static_cross_rate("USD", "JPY") - 149.5).abs() < 1e-12);
        assert!((static_cross_rate("EUR", "GBP") - 0.79 / 0.92).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_code_degrades_to_pivot() {
        assert_eq!(static_pivot_rate("XYZ"), 1.0);
        assert!((static_cross_rate("XYZ", "EUR") - 0.92).abs() < 1e-12);
    }

    #[test]
    fn test_code_normalization() {
        assert_eq!(normalize_code(" eur "), "EUR");
        assert!(is_valid_code("EUR"));
        assert!(!is_valid_code("EURO"));
        assert!(!is_valid_code("E1R"));
        assert!(!is_valid_code(""));
    }

    #[test]
    fn test_currency_catalogue_covers_static_table() {
        for (code, _) in STATIC_RATES {
            assert!(find_currency(code).is_some(), "missing {code}");
        }
        assert_eq!(CURRENCIES.len(), 30);
    }
}
