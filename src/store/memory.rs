use crate::core::category::{MappingScope, MappingUpdate, MerchantCategoryMapping};
use crate::core::currency::ExchangeRateRecord;
use crate::core::store::{MappingStore, RateStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory store for rates and mappings. Cloned handles share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    rates: Arc<Mutex<Vec<ExchangeRateRecord>>>,
    mappings: Arc<Mutex<HashMap<(MappingScope, String), MerchantCategoryMapping>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rate_count(&self) -> usize {
        self.rates.lock().await.len()
    }

    pub async fn mapping_count(&self) -> usize {
        self.mappings.lock().await.len()
    }
}

#[async_trait]
impl RateStore for MemoryStore {
    async fn insert_rate(&self, record: ExchangeRateRecord) -> Result<()> {
        debug!(
            "Store INSERT rate {}->{}",
            record.base_currency, record.target_currency
        );
        self.rates.lock().await.push(record);
        Ok(())
    }

    async fn insert_rates(&self, records: Vec<ExchangeRateRecord>) -> Result<()> {
        debug!("Store INSERT {} rates", records.len());
        self.rates.lock().await.extend(records);
        Ok(())
    }

    async fn latest_rate(
        &self,
        base: &str,
        target: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<ExchangeRateRecord>> {
        let rates = self.rates.lock().await;
        Ok(rates
            .iter()
            .filter(|r| r.base_currency == base && r.target_currency == target)
            .filter(|r| r.fetched_at >= from && r.fetched_at <= to)
            .max_by_key(|r| r.fetched_at)
            .cloned())
    }
}

#[async_trait]
impl MappingStore for MemoryStore {
    async fn find_mapping(
        &self,
        scope: &MappingScope,
        merchant_key: &str,
    ) -> Result<Option<MerchantCategoryMapping>> {
        let mappings = self.mappings.lock().await;
        Ok(mappings
            .get(&(scope.clone(), merchant_key.to_string()))
            .cloned())
    }

    async fn upsert_mapping(&self, update: MappingUpdate) -> Result<MerchantCategoryMapping> {
        let mut mappings = self.mappings.lock().await;
        let key = (update.scope.clone(), update.merchant_key.clone());
        let mapping = update.apply(mappings.remove(&key));
        debug!("Store UPSERT mapping {:?}", key);
        mappings.insert(key, mapping.clone());
        Ok(mapping)
    }
}
