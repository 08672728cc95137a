//! Persistence seams for rate records and learned merchant mappings.

use crate::core::category::{MappingScope, MappingUpdate, MerchantCategoryMapping};
use crate::core::currency::ExchangeRateRecord;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait RateStore: Send + Sync {
    async fn insert_rate(&self, record: ExchangeRateRecord) -> Result<()>;

    async fn insert_rates(&self, records: Vec<ExchangeRateRecord>) -> Result<()>;

    /// Most recent record for the pair with `from <= fetched_at <= to`.
    async fn latest_rate(
        &self,
        base: &str,
        target: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<ExchangeRateRecord>>;
}

#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn find_mapping(
        &self,
        scope: &MappingScope,
        merchant_key: &str,
    ) -> Result<Option<MerchantCategoryMapping>>;

    /// Applies `update` atomically, inserting the row if it does not exist.
    async fn upsert_mapping(&self, update: MappingUpdate) -> Result<MerchantCategoryMapping>;
}
