use crate::core::currency::{PIVOT_CURRENCY, RateSnapshotProvider};
use crate::providers::util::http_client;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

/// Bulk USD-relative snapshot from Open Exchange Rates.
pub struct OpenExchangeRatesProvider {
    base_url: String,
    app_id: String,
    client: reqwest::Client,
}

impl OpenExchangeRatesProvider {
    pub fn new(base_url: &str, app_id: &str, timeout: Duration) -> Result<Self> {
        Ok(OpenExchangeRatesProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            app_id: app_id.to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    base: Option<String>,
    rates: HashMap<String, f64>,
}

#[async_trait]
impl RateSnapshotProvider for OpenExchangeRatesProvider {
    fn pivot(&self) -> &str {
        PIVOT_CURRENCY
    }

    #[instrument(name = "OxrLatestFetch", skip(self))]
    async fn fetch_latest(&self) -> Result<HashMap<String, f64>> {
        let url = format!(
            "{}/api/latest.json?app_id={}&base={}",
            self.base_url, self.app_id, PIVOT_CURRENCY
        );
        debug!("Requesting latest rates from {}", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for latest rates", e.without_url()))?;

        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {} for latest rates", response.status()));
        }

        let text = response.text().await?;
        let data: LatestResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for latest rates: {}", e))?;

        if let Some(base) = data.base.as_deref() {
            if !base.eq_ignore_ascii_case(PIVOT_CURRENCY) {
                return Err(anyhow!(
                    "Unexpected snapshot base {base}, expected {PIVOT_CURRENCY}"
                ));
            }
        }
        if data.rates.is_empty() {
            return Err(anyhow!("No rate data found in latest rates response"));
        }

        debug!("Received {} rates", data.rates.len());
        Ok(data.rates)
    }
}
