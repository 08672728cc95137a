use super::ui;
use crate::core::categorizer::{CategorizationEngine, CategorizationPolicy};
use crate::core::category::{CategorizationResult, Category, CategoryDirectory, CategoryId};
use anyhow::{Result, bail};
use comfy_table::Cell;

pub fn suggestion_table(
    merchant: &str,
    result: Option<&CategorizationResult>,
    policy: &CategorizationPolicy,
) -> String {
    let Some(result) = result.filter(|r| r.confidence > 0) else {
        return ui::style_text(
            &format!("No AI suggestion available for \"{}\"", merchant.trim()),
            ui::StyleType::Subtle,
        );
    };

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Merchant"),
        ui::header_cell("Category"),
        ui::header_cell("Category ID"),
        ui::header_cell("Confidence"),
    ]);
    table.add_row(vec![
        Cell::new(merchant.trim()),
        Cell::new(&result.category_name),
        Cell::new(result.category_id.as_str()),
        ui::confidence_cell(
            result.confidence,
            policy.serve_threshold,
            policy.promote_threshold,
        ),
    ]);
    table.to_string()
}

pub fn categories_table(categories: &[Category]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("#"),
        ui::header_cell("ID"),
        ui::header_cell("Name"),
        ui::header_cell("Icon"),
        ui::header_cell("Color"),
    ]);
    for category in categories {
        table.add_row(vec![
            ui::number_cell(category.sort_order.to_string()),
            Cell::new(category.id.as_str()),
            Cell::new(&category.name),
            Cell::new(&category.icon),
            Cell::new(&category.color),
        ]);
    }
    table.to_string()
}

pub async fn suggest(
    engine: &CategorizationEngine,
    merchant: &str,
    notes: Option<&str>,
    user: Option<&str>,
) -> Result<()> {
    if merchant.trim().is_empty() {
        bail!("Merchant name is required");
    }
    let result = engine.categorize(merchant, notes, user).await;
    println!(
        "{}",
        suggestion_table(merchant, result.as_ref(), engine.policy())
    );
    Ok(())
}

pub async fn feedback(
    engine: &CategorizationEngine,
    directory: &dyn CategoryDirectory,
    user: &str,
    merchant: &str,
    category_id: &str,
    accepted: bool,
) -> Result<()> {
    let category_id = CategoryId::new(category_id.trim());
    let Some(category) = directory.find_by_id(&category_id).await? else {
        bail!("Unknown category id: {category_id}");
    };

    engine
        .record_feedback(user, merchant, &category.id, accepted)
        .await;

    let verb = if accepted { "accepted" } else { "corrected to" };
    println!(
        "{}",
        ui::style_text(
            &format!("Feedback recorded: \"{}\" {verb} {}", merchant.trim(), category.name),
            ui::StyleType::Highlight,
        )
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::category::DefaultCategories;

    #[test]
    fn test_suggestion_table_shows_result() {
        let result = CategorizationResult {
            category_id: CategoryId::new("food-dining"),
            category_name: "Food & Dining".to_string(),
            confidence: 92,
        };
        let rendered = suggestion_table(
            " Starbucks ",
            Some(&result),
            &CategorizationPolicy::default(),
        );
        assert!(rendered.contains("Starbucks"));
        assert!(rendered.contains("Food & Dining"));
        assert!(rendered.contains("92%"));
    }

    #[test]
    fn test_zero_confidence_reads_as_no_suggestion() {
        let result = CategorizationResult {
            category_id: CategoryId::new("shopping"),
            category_name: "Shopping".to_string(),
            confidence: 0,
        };
        let policy = CategorizationPolicy::default();
        let zero = suggestion_table("Kiosk", Some(&result), &policy);
        let none = suggestion_table("Kiosk", None, &policy);
        assert!(zero.contains("No AI suggestion available"));
        assert!(none.contains("No AI suggestion available"));
    }

    #[test]
    fn test_categories_table_lists_defaults() {
        let directory = DefaultCategories::new();
        let rendered = categories_table(directory.all());
        assert!(rendered.contains("taxes-fees"));
        assert!(rendered.contains("Uncategorized"));
    }
}
