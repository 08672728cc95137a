//! Categories, learned merchant mappings and the inference seam.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub String);

impl CategoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CategoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub icon: String,
    pub color: String,
    pub sort_order: u32,
    pub is_default: bool,
}

/// Who a learned mapping belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MappingScope {
    Global,
    User(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantCategoryMapping {
    pub scope: MappingScope,
    pub merchant_key: String,
    pub category_id: CategoryId,
    pub confidence: u8,
    pub override_count: u32,
    pub last_used_at: DateTime<Utc>,
}

/// One atomic upsert against the mapping table, keyed by `(scope, merchant_key)`.
///
/// `confidence: None` leaves the stored value alone (or `0` on insert).
#[derive(Debug, Clone, PartialEq)]
pub struct MappingUpdate {
    pub scope: MappingScope,
    pub merchant_key: String,
    pub category_id: CategoryId,
    pub confidence: Option<u8>,
    pub override_increment: u32,
    pub last_used_at: DateTime<Utc>,
}

impl MappingUpdate {
    /// Applies the update to an existing row, or builds the row it would insert.
    pub fn apply(&self, existing: Option<MerchantCategoryMapping>) -> MerchantCategoryMapping {
        match existing {
            Some(mut mapping) => {
                mapping.category_id = self.category_id.clone();
                if let Some(confidence) = self.confidence {
                    mapping.confidence = confidence;
                }
                mapping.override_count += self.override_increment;
                mapping.last_used_at = self.last_used_at;
                mapping
            }
            None => MerchantCategoryMapping {
                scope: self.scope.clone(),
                merchant_key: self.merchant_key.clone(),
                category_id: self.category_id.clone(),
                confidence: self.confidence.unwrap_or(0),
                override_count: self.override_increment,
                last_used_at: self.last_used_at,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorizationResult {
    pub category_id: CategoryId,
    pub category_name: String,
    pub confidence: u8,
}

/// Raw answer from an inference provider. `confidence` is in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Inference {
    pub category: String,
    pub confidence: f64,
}

impl Inference {
    /// Scales to the integer 0-100 range, rounding to nearest.
    pub fn confidence_percent(&self) -> u8 {
        let clamped = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        (clamped * 100.0).round() as u8
    }
}

#[async_trait]
pub trait CategoryInference: Send + Sync {
    async fn infer(&self, merchant: &str, notes: Option<&str>, vocabulary: &[String])
    -> Result<Inference>;
}

#[async_trait]
pub trait CategoryDirectory: Send + Sync {
    async fn find_global_by_name(&self, name: &str) -> Result<Option<Category>>;
    async fn find_by_id(&self, id: &CategoryId) -> Result<Option<Category>>;
    async fn global_names(&self) -> Result<Vec<String>>;
}

/// Lowercased, trimmed merchant name used as the lookup key.
pub fn merchant_key(merchant: &str) -> String {
    merchant.trim().to_lowercase()
}

const DEFAULT_CATEGORIES: &[(&str, &str, &str, &str)] = &[
    ("food-dining", "Food & Dining", "utensils", "#f97316"),
    ("transportation", "Transportation", "car", "#3b82f6"),
    ("shopping", "Shopping", "shopping-bag", "#ec4899"),
    ("entertainment", "Entertainment", "film", "#8b5cf6"),
    ("health-wellness", "Health & Wellness", "heart", "#10b981"),
    ("housing-utilities", "Housing & Utilities", "home", "#6366f1"),
    ("travel", "Travel", "plane", "#0ea5e9"),
    ("education", "Education", "book", "#f59e0b"),
    ("business", "Business", "briefcase", "#64748b"),
    ("personal-care", "Personal Care", "sparkles", "#d946ef"),
    ("subscriptions", "Subscriptions", "repeat", "#14b8a6"),
    ("gifts-donations", "Gifts & Donations", "gift", "#f43f5e"),
    ("taxes-fees", "Taxes & Fees", "receipt", "#78716c"),
    ("uncategorized", "Uncategorized", "tag", "#94a3b8"),
];

/// The global category vocabulary every installation starts with.
#[derive(Debug, Clone)]
pub struct DefaultCategories {
    categories: Vec<Category>,
}

impl DefaultCategories {
    pub fn new() -> Self {
        let categories = DEFAULT_CATEGORIES
            .iter()
            .enumerate()
            .map(|(i, (id, name, icon, color))| Category {
                id: CategoryId::new(*id),
                name: name.to_string(),
                icon: icon.to_string(),
                color: color.to_string(),
                sort_order: i as u32 + 1,
                is_default: true,
            })
            .collect();
        Self { categories }
    }

    pub fn all(&self) -> &[Category] {
        &self.categories
    }
}

impl Default for DefaultCategories {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CategoryDirectory for DefaultCategories {
    async fn find_global_by_name(&self, name: &str) -> Result<Option<Category>> {
        Ok(self.categories.iter().find(|c| c.name == name).cloned())
    }

    async fn find_by_id(&self, id: &CategoryId) -> Result<Option<Category>> {
        Ok(self.categories.iter().find(|c| &c.id == id).cloned())
    }

    async fn global_names(&self) -> Result<Vec<String>> {
        Ok(self.categories.iter().map(|c| c.name.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_merchant_key_normalization() {
        assert_eq!(merchant_key("  Starbucks "), "starbucks");
        assert_eq!(merchant_key("STARBUCKS"), "starbucks");
        assert_eq!(merchant_key("   "), "");
    }

    #[test]
    fn test_confidence_percent_rounds_and_clamps() {
        let inference = |confidence| Inference {
            category: "Travel".to_string(),
            confidence,
        };
        assert_eq!(inference(0.92).confidence_percent(), 92);
        assert_eq!(inference(0.796).confidence_percent(), 80);
        assert_eq!(inference(0.0).confidence_percent(), 0);
        assert_eq!(inference(1.7).confidence_percent(), 100);
        assert_eq!(inference(-0.3).confidence_percent(), 0);
        assert_eq!(inference(f64::NAN).confidence_percent(), 0);
    }

    #[test]
    fn test_mapping_update_increments_and_preserves_confidence() {
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap();
        let update = MappingUpdate {
            scope: MappingScope::User("u1".to_string()),
            merchant_key: "starbucks".to_string(),
            category_id: CategoryId::new("food-dining"),
            confidence: None,
            override_increment: 1,
            last_used_at: at,
        };

        let inserted = update.apply(None);
        assert_eq!(inserted.confidence, 0);
        assert_eq!(inserted.override_count, 1);

        let mut existing = inserted.clone();
        existing.confidence = 55;
        let updated = update.apply(Some(existing));
        assert_eq!(updated.confidence, 55);
        assert_eq!(updated.override_count, 2);
        assert_eq!(updated.category_id, CategoryId::new("food-dining"));
    }

    #[tokio::test]
    async fn test_default_directory_lookups() {
        let directory = DefaultCategories::new();
        let names = directory.global_names().await.unwrap();
        assert_eq!(names.len(), 14);
        assert_eq!(names[0], "Food & Dining");

        let food = directory
            .find_global_by_name("Food & Dining")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(food.id, CategoryId::new("food-dining"));
        assert!(directory.find_global_by_name("food & dining").await.unwrap().is_none());
        assert_eq!(
            directory.find_by_id(&food.id).await.unwrap().unwrap().name,
            "Food & Dining"
        );
    }
}
