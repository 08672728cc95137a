//! Tiered exchange-rate resolution: memory cache, persistent store, live
//! provider, then the static table.

use crate::core::cache::Cache;
use crate::core::clock::{Clock, SystemClock};
use crate::core::currency::{
    CurrencyRateProvider, ExchangeRateRecord, RateSnapshotProvider, cross_rate, is_valid_code,
    normalize_code, static_cross_rate,
};
use crate::core::store::RateStore;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// How long a memory-cached rate is served before the store is consulted again.
pub const RATE_CACHE_TTL_MINUTES: i64 = 90;
/// Stored records older than this are ignored for live resolution.
pub const STORE_FRESHNESS_HOURS: i64 = 24;
pub const DEFAULT_PROVIDER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
/// Longest wall-clock gap searched when local midnight does not exist.
const MAX_GAP_MINUTES: i64 = 24 * 60;

type PairKey = (String, String);

/// What a bulk refresh did. Refreshing never fails the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Refreshed {
        count: usize,
        fetched_at: DateTime<Utc>,
    },
    NoProvider,
    Failed(String),
}

/// A resolved rate. `fetched_at` is present when it was read from history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatedRate {
    pub rate: f64,
    pub fetched_at: Option<DateTime<Utc>>,
}

pub struct RateResolver {
    store: Arc<dyn RateStore>,
    provider: Option<Arc<dyn RateSnapshotProvider>>,
    clock: Arc<dyn Clock>,
    cache: Cache<PairKey, f64>,
    cache_ttl: Duration,
    store_freshness: Duration,
    provider_timeout: std::time::Duration,
}

impl RateResolver {
    pub fn new(
        store: Arc<dyn RateStore>,
        provider: Option<Arc<dyn RateSnapshotProvider>>,
    ) -> Self {
        Self {
            store,
            provider,
            clock: Arc::new(SystemClock),
            cache: Cache::new(),
            cache_ttl: Duration::minutes(RATE_CACHE_TTL_MINUTES),
            store_freshness: Duration::hours(STORE_FRESHNESS_HOURS),
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// Best available rate for `base -> target`. Always yields a number.
    #[instrument(name = "ResolveRate", skip(self))]
    pub async fn resolve_rate(&self, base: &str, target: &str) -> f64 {
        let base = normalize_code(base);
        let target = normalize_code(target);
        if base == target {
            return 1.0;
        }
        if !is_valid_code(&base) || !is_valid_code(&target) {
            warn!("Malformed currency pair {base}->{target}, using static table");
            return static_cross_rate(&base, &target);
        }

        let key = (base.clone(), target.clone());
        let now = self.clock.now();

        if let Some(rate) = self.cache.get_fresh(&key, now, self.cache_ttl).await {
            return rate;
        }

        match self
            .store
            .latest_rate(&base, &target, now - self.store_freshness, now)
            .await
        {
            Ok(Some(record)) => {
                debug!("Using stored rate fetched at {}", record.fetched_at);
                self.cache.put(key, record.rate, now).await;
                return record.rate;
            }
            Ok(None) => {}
            Err(e) => warn!("Rate store lookup failed for {base}->{target}: {e:#}"),
        }

        match self.fetch_cross_rate(&base, &target).await {
            Ok(rate) => {
                let record = ExchangeRateRecord::new(&base, &target, rate, now);
                if let Err(e) = self.store.insert_rate(record).await {
                    warn!("Failed to persist rate {base}->{target}: {e:#}");
                }
                self.cache.put(key, rate, now).await;
                rate
            }
            Err(e) => {
                warn!("Falling back to static rate for {base}->{target}: {e:#}");
                let rate = static_cross_rate(&base, &target);
                self.cache.put(key, rate, now).await;
                rate
            }
        }
    }

    /// Most recent stored rate fetched during the local calendar day of `date`.
    ///
    /// Never consults the provider or the static table.
    pub async fn resolve_historical_rate(
        &self,
        base: &str,
        target: &str,
        date: NaiveDate,
    ) -> Option<f64> {
        if normalize_code(base) == normalize_code(target) {
            return Some(1.0);
        }
        self.historical_record(base, target, date)
            .await
            .map(|record| record.rate)
    }

    /// Stored rate for `date` when one exists, otherwise the live rate.
    /// `fetched_at` is set only when the answer came from history.
    pub async fn rate_on(&self, base: &str, target: &str, date: Option<NaiveDate>) -> DatedRate {
        if let Some(date) = date {
            if let Some(record) = self.historical_record(base, target, date).await {
                return DatedRate {
                    rate: record.rate,
                    fetched_at: Some(record.fetched_at),
                };
            }
            debug!("No stored rate for {base}->{target} on {date}, resolving live");
        }
        DatedRate {
            rate: self.resolve_rate(base, target).await,
            fetched_at: None,
        }
    }

    pub async fn convert(&self, amount: f64, from: &str, to: &str) -> f64 {
        amount * self.resolve_rate(from, to).await
    }

    /// Persists one record per currency from a single bulk fetch and drops the
    /// memory cache. Failures are logged and leave stored records untouched.
    #[instrument(name = "RefreshRates", skip(self))]
    pub async fn refresh_all_rates(&self) -> RefreshOutcome {
        let Some(provider) = self.provider.as_ref() else {
            info!("No rate provider configured, skipping refresh");
            return RefreshOutcome::NoProvider;
        };

        let rates = match self.fetch_snapshot(provider.as_ref()).await {
            Ok(rates) => rates,
            Err(e) => {
                warn!("FX rate refresh failed: {e:#}");
                return RefreshOutcome::Failed(format!("{e:#}"));
            }
        };

        let pivot = normalize_code(provider.pivot());
        let fetched_at = self.clock.now();
        let records: Vec<_> = rates
            .into_iter()
            .map(|(code, rate)| (normalize_code(&code), rate))
            .filter(|(code, rate)| *code != pivot && is_valid_code(code) && is_usable(*rate))
            .map(|(code, rate)| ExchangeRateRecord::new(&pivot, &code, rate, fetched_at))
            .collect();
        let count = records.len();

        if let Err(e) = self.store.insert_rates(records).await {
            warn!("Failed to persist refreshed rates: {e:#}");
            return RefreshOutcome::Failed(format!("{e:#}"));
        }

        self.cache.clear().await;
        info!("FX rates updated: {count} currencies");
        RefreshOutcome::Refreshed { count, fetched_at }
    }

    async fn historical_record(
        &self,
        base: &str,
        target: &str,
        date: NaiveDate,
    ) -> Option<ExchangeRateRecord> {
        let base = normalize_code(base);
        let target = normalize_code(target);
        if base == target {
            return None;
        }

        let (day_start, day_end) = local_day_bounds(date);
        match self
            .store
            .latest_rate(&base, &target, day_start, day_end)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                warn!("Historical rate lookup failed for {base}->{target} on {date}: {e:#}");
                None
            }
        }
    }

    async fn fetch_snapshot(
        &self,
        provider: &dyn RateSnapshotProvider,
    ) -> Result<HashMap<String, f64>> {
        tokio::time::timeout(self.provider_timeout, provider.fetch_latest())
            .await
            .map_err(|_| {
                anyhow!(
                    "Rate provider timed out after {:?}",
                    self.provider_timeout
                )
            })?
    }

    async fn fetch_cross_rate(&self, base: &str, target: &str) -> Result<f64> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| anyhow!("No rate provider configured"))?;
        let rates = self.fetch_snapshot(provider.as_ref()).await?;
        let pivot = normalize_code(provider.pivot());

        let leg = |code: &str| -> Result<f64> {
            if code == pivot {
                return Ok(1.0);
            }
            rates
                .get(code)
                .copied()
                .filter(|r| is_usable(*r))
                .ok_or_else(|| anyhow!("Provider snapshot has no usable rate for {code}"))
        };

        Ok(cross_rate(leg(base)?, leg(target)?))
    }
}

fn is_usable(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

/// `[00:00:00.000, 23:59:59.999]` of `date` in local time, as UTC instants.
fn local_day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    day_bounds(&Local, date)
}

fn day_bounds<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = date.and_time(NaiveTime::MIN);
    let start = first_instant_from(tz, midnight);
    let end = first_instant_from(tz, midnight + Duration::days(1)) - Duration::milliseconds(1);
    (start, end)
}

/// Earliest instant at or after the wall-clock time `naive`. A time inside a
/// DST gap moves forward to the end of the gap.
fn first_instant_from<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    let mut candidate = naive;
    for _ in 0..=MAX_GAP_MINUTES {
        if let Some(dt) = tz.from_local_datetime(&candidate).earliest() {
            return dt.with_timezone(&Utc);
        }
        candidate += Duration::minutes(1);
    }
    Utc.from_utc_datetime(&naive)
}

#[async_trait]
impl CurrencyRateProvider for RateResolver {
    async fn get_rate(&self, from: &str, to: &str) -> Result<f64> {
        Ok(self.resolve_rate(from, to).await)
    }
}
