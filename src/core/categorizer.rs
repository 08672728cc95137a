//! Merchant categorization with per-user learning.

use crate::core::category::{
    CategorizationResult, CategoryDirectory, CategoryId, CategoryInference, MappingScope,
    MappingUpdate, MerchantCategoryMapping, merchant_key,
};
use crate::core::clock::{Clock, SystemClock};
use crate::core::store::MappingStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Stored mappings at or above this confidence are served without asking anyone.
pub const SERVE_THRESHOLD: u8 = 60;
/// Inference results at or above this confidence are promoted to the global table.
pub const PROMOTE_THRESHOLD: u8 = 80;
/// Corrections after which a per-user mapping is served at full confidence.
pub const OVERRIDE_ESCALATION: u32 = 3;
pub const DEFAULT_INFERENCE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

/// Policy knobs. The defaults have never been tuned against real data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorizationPolicy {
    pub serve_threshold: u8,
    pub promote_threshold: u8,
    pub override_escalation: u32,
}

impl Default for CategorizationPolicy {
    fn default() -> Self {
        Self {
            serve_threshold: SERVE_THRESHOLD,
            promote_threshold: PROMOTE_THRESHOLD,
            override_escalation: OVERRIDE_ESCALATION,
        }
    }
}

pub struct CategorizationEngine {
    mappings: Arc<dyn MappingStore>,
    directory: Arc<dyn CategoryDirectory>,
    inference: Option<Arc<dyn CategoryInference>>,
    policy: CategorizationPolicy,
    clock: Arc<dyn Clock>,
    inference_timeout: std::time::Duration,
}

impl CategorizationEngine {
    pub fn new(
        mappings: Arc<dyn MappingStore>,
        directory: Arc<dyn CategoryDirectory>,
        inference: Option<Arc<dyn CategoryInference>>,
    ) -> Self {
        Self {
            mappings,
            directory,
            inference,
            policy: CategorizationPolicy::default(),
            clock: Arc::new(SystemClock),
            inference_timeout: DEFAULT_INFERENCE_TIMEOUT,
        }
    }

    pub fn with_policy(mut self, policy: CategorizationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_inference_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.inference_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &CategorizationPolicy {
        &self.policy
    }

    /// Best-guess category for a merchant. `None` means "let the user pick".
    #[instrument(name = "Categorize", skip(self, notes))]
    pub async fn categorize(
        &self,
        merchant: &str,
        notes: Option<&str>,
        user_id: Option<&str>,
    ) -> Option<CategorizationResult> {
        let key = merchant_key(merchant);
        if key.is_empty() {
            return None;
        }

        if let Some(user_id) = user_id {
            let scope = MappingScope::User(user_id.to_string());
            if let Some(mapping) = self.find_mapping(&scope, &key).await {
                let pinned = if mapping.override_count >= self.policy.override_escalation {
                    debug!("Confirmed user preference for {key}");
                    Some(100)
                } else {
                    None
                };
                if pinned.is_some() || mapping.confidence >= self.policy.serve_threshold {
                    if let Some(result) = self.resolve_mapping(&mapping, pinned).await {
                        return Some(result);
                    }
                }
            }
        }

        if let Some(mapping) = self.find_mapping(&MappingScope::Global, &key).await {
            if mapping.confidence >= self.policy.serve_threshold {
                if let Some(result) = self.resolve_mapping(&mapping, None).await {
                    return Some(result);
                }
            }
        }

        let Some(inference) = self.inference.as_ref() else {
            debug!("No inference provider configured");
            return None;
        };

        self.infer(inference.as_ref(), merchant.trim(), notes, &key)
            .await
    }

    /// Records whether the user kept or replaced a suggestion. Never fails.
    #[instrument(name = "RecordFeedback", skip(self))]
    pub async fn record_feedback(
        &self,
        user_id: &str,
        merchant: &str,
        category_id: &CategoryId,
        accepted: bool,
    ) {
        let key = merchant_key(merchant);
        if key.is_empty() {
            return;
        }

        let update = MappingUpdate {
            scope: MappingScope::User(user_id.to_string()),
            merchant_key: key,
            category_id: category_id.clone(),
            confidence: None,
            override_increment: if accepted { 0 } else { 1 },
            last_used_at: self.clock.now(),
        };

        match self.mappings.upsert_mapping(update).await {
            Ok(mapping) => debug!(
                "Feedback recorded for {}: override_count={}",
                mapping.merchant_key, mapping.override_count
            ),
            Err(e) => warn!("Failed to record categorization feedback: {e:#}"),
        }
    }

    async fn find_mapping(
        &self,
        scope: &MappingScope,
        key: &str,
    ) -> Option<MerchantCategoryMapping> {
        match self.mappings.find_mapping(scope, key).await {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!("Mapping lookup failed for {scope:?}/{key}: {e:#}");
                None
            }
        }
    }

    /// Joins a mapping with its category record; dangling ids resolve to `None`.
    async fn resolve_mapping(
        &self,
        mapping: &MerchantCategoryMapping,
        confidence: Option<u8>,
    ) -> Option<CategorizationResult> {
        match self.directory.find_by_id(&mapping.category_id).await {
            Ok(Some(category)) => Some(CategorizationResult {
                category_id: category.id,
                category_name: category.name,
                confidence: confidence.unwrap_or(mapping.confidence),
            }),
            Ok(None) => {
                warn!(
                    "Mapping for {} points at unknown category {}",
                    mapping.merchant_key, mapping.category_id
                );
                None
            }
            Err(e) => {
                warn!("Category lookup failed: {e:#}");
                None
            }
        }
    }

    async fn infer(
        &self,
        inference: &dyn CategoryInference,
        merchant: &str,
        notes: Option<&str>,
        key: &str,
    ) -> Option<CategorizationResult> {
        let vocabulary = match self.directory.global_names().await {
            Ok(names) => names,
            Err(e) => {
                warn!("Failed to load category vocabulary: {e:#}");
                return None;
            }
        };
        let notes = notes.map(str::trim).filter(|n| !n.is_empty());

        let answer = match tokio::time::timeout(
            self.inference_timeout,
            inference.infer(merchant, notes, &vocabulary),
        )
        .await
        {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!("AI categorization error: {e:#}");
                return None;
            }
            Err(_) => {
                warn!(
                    "AI categorization timed out after {:?}",
                    self.inference_timeout
                );
                return None;
            }
        };

        let confidence = answer.confidence_percent();
        let category = match self.directory.find_global_by_name(&answer.category).await {
            Ok(Some(category)) => category,
            Ok(None) => {
                debug!("Inferred category {:?} is not a known category", answer.category);
                return None;
            }
            Err(e) => {
                warn!("Category lookup failed: {e:#}");
                return None;
            }
        };

        if confidence >= self.policy.promote_threshold {
            let update = MappingUpdate {
                scope: MappingScope::Global,
                merchant_key: key.to_string(),
                category_id: category.id.clone(),
                confidence: Some(confidence),
                override_increment: 0,
                last_used_at: self.clock.now(),
            };
            if let Err(e) = self.mappings.upsert_mapping(update).await {
                warn!("Failed to promote mapping for {key}: {e:#}");
            }
        }

        Some(CategorizationResult {
            category_id: category.id,
            category_name: category.name,
            confidence,
        })
    }
}
