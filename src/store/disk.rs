use crate::core::category::{MappingScope, MappingUpdate, MerchantCategoryMapping};
use crate::core::currency::ExchangeRateRecord;
use crate::core::store::{MappingStore, RateStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

const RATES_PARTITION: &str = "fx_rates";
const MAPPINGS_PARTITION: &str = "merchant_map";

/// Persistent store backed by a fjall keyspace.
///
/// Rate keys are `BASE:TARGET:<zero padded micros>` so a reverse range scan
/// over one pair yields the most recent record first.
#[derive(Clone)]
pub struct DiskStore {
    keyspace: Arc<Keyspace>,
    rates: PartitionHandle,
    mappings: PartitionHandle,
    write_lock: Arc<Mutex<()>>,
}

impl DiskStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create data directory: {}", path.display()))?;

        let keyspace = fjall::Config::new(path)
            .open()
            .with_context(|| format!("Failed to open keyspace at {}", path.display()))?;
        let rates = keyspace.open_partition(RATES_PARTITION, PartitionCreateOptions::default())?;
        let mappings =
            keyspace.open_partition(MAPPINGS_PARTITION, PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace: Arc::new(keyspace),
            rates,
            mappings,
            write_lock: Arc::new(Mutex::new(())),
        })
    }
}

fn rate_key(base: &str, target: &str, at: DateTime<Utc>) -> String {
    format!("{base}:{target}:{:020}", at.timestamp_micros().max(0))
}

fn mapping_key(scope: &MappingScope, merchant_key: &str) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&(scope, merchant_key))?)
}

#[async_trait]
impl RateStore for DiskStore {
    async fn insert_rate(&self, record: ExchangeRateRecord) -> Result<()> {
        let key = rate_key(
            &record.base_currency,
            &record.target_currency,
            record.fetched_at,
        );
        self.rates
            .insert(key.as_bytes(), serde_json::to_vec(&record)?)?;
        debug!("Store INSERT rate {}", key);
        Ok(())
    }

    async fn insert_rates(&self, records: Vec<ExchangeRateRecord>) -> Result<()> {
        let mut batch = self.keyspace.batch();
        for record in &records {
            let key = rate_key(
                &record.base_currency,
                &record.target_currency,
                record.fetched_at,
            );
            batch.insert(&self.rates, key.as_bytes(), serde_json::to_vec(record)?);
        }
        batch.commit().context("Failed to commit rate batch")?;
        debug!("Store INSERT {} rates", records.len());
        Ok(())
    }

    async fn latest_rate(
        &self,
        base: &str,
        target: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<ExchangeRateRecord>> {
        if from > to {
            return Ok(None);
        }
        let start = rate_key(base, target, from);
        let end = rate_key(base, target, to);

        match self.rates.range(start..=end).next_back() {
            Some(item) => {
                let (_, value) = item?;
                Ok(Some(serde_json::from_slice(&value)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MappingStore for DiskStore {
    async fn find_mapping(
        &self,
        scope: &MappingScope,
        merchant_key: &str,
    ) -> Result<Option<MerchantCategoryMapping>> {
        let key = mapping_key(scope, merchant_key)?;
        match self.mappings.get(&key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn upsert_mapping(&self, update: MappingUpdate) -> Result<MerchantCategoryMapping> {
        let key = mapping_key(&update.scope, &update.merchant_key)?;

        // Read and write under one lock so concurrent upserts never lose an increment.
        let _guard = self.write_lock.lock().await;
        let existing = match self.mappings.get(&key)? {
            Some(value) => Some(serde_json::from_slice(&value)?),
            None => None,
        };
        let mapping = update.apply(existing);
        self.mappings.insert(key, serde_json::to_vec(&mapping)?)?;
        debug!(
            "Store UPSERT mapping {:?}/{}",
            mapping.scope, mapping.merchant_key
        );
        Ok(mapping)
    }
}
