use serde_json::json;
use spendly::core::category::CategoryId;
use spendly::core::config::AppConfig;
use spendly::{AppCommand, Services};
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod test_utils {
    use super::*;

    pub async fn create_rates_mock_server(expected_calls: u64) -> MockServer {
        let mock_server = MockServer::start().await;
        let body = r#"{
            "timestamp": 1767960000,
            "base": "USD",
            "rates": { "USD": 1, "EUR": 0.9, "GBP": 0.8, "INR": 84.0 }
        }"#;

        Mock::given(method("GET"))
            .and(path("/api/latest.json"))
            .and(query_param("app_id", "test-app"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(expected_calls)
            .mount(&mock_server)
            .await;

        mock_server
    }

    pub async fn create_openai_mock_server(answer: &str, expected_calls: u64) -> MockServer {
        let mock_server = MockServer::start().await;
        let body = json!({
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": answer },
                "finish_reason": "stop"
            }]
        });

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(expected_calls)
            .mount(&mock_server)
            .await;

        mock_server
    }

    /// Writes a config pointing both providers at the given servers and the store at `data_dir`.
    pub fn write_config(
        data_dir: &TempDir,
        rates_uri: Option<&str>,
        openai_uri: Option<&str>,
    ) -> tempfile::NamedTempFile {
        let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        let mut content = format!(
            "home_currency: \"EUR\"\ndata_path: \"{}\"\n",
            data_dir.path().display()
        );
        if rates_uri.is_some() || openai_uri.is_some() {
            content.push_str("providers:\n");
        }
        if let Some(uri) = rates_uri {
            content.push_str(&format!(
                "  open_exchange_rates:\n    base_url: \"{uri}\"\n    app_id: \"test-app\"\n"
            ));
        }
        if let Some(uri) = openai_uri {
            content.push_str(&format!(
                "  openai:\n    base_url: \"{uri}\"\n    api_key: \"sk-test\"\n"
            ));
        }
        fs::write(config_file.path(), content).expect("Failed to write config file");
        config_file
    }

    pub fn services(config_file: &tempfile::NamedTempFile) -> Services {
        let config = AppConfig::load_from_path(config_file.path()).expect("config loads");
        Services::from_config(config).expect("services start")
    }
}

#[test_log::test(tokio::test)]
async fn test_rate_resolution_caches_provider_results() {
    // One fetch per distinct pair, repeats come from the cache
    let mock_server = test_utils::create_rates_mock_server(2).await;
    let data_dir = TempDir::new().unwrap();
    let config_file = test_utils::write_config(&data_dir, Some(&mock_server.uri()), None);
    let services = test_utils::services(&config_file);

    let rate = services.resolver.resolve_rate("eur", "GBP").await;
    assert!((rate - 0.8 / 0.9).abs() < 1e-9);

    let again = services.resolver.resolve_rate("EUR", "GBP").await;
    assert_eq!(rate, again);

    let converted = services.resolver.convert(100.0, "USD", "INR").await;
    assert!((converted - 8400.0).abs() < 1e-6);
}

#[test_log::test(tokio::test)]
async fn test_refresh_then_historical_lookup() {
    let mock_server = test_utils::create_rates_mock_server(1).await;
    let data_dir = TempDir::new().unwrap();
    let config_file = test_utils::write_config(&data_dir, Some(&mock_server.uri()), None);
    let services = test_utils::services(&config_file);

    match services.resolver.refresh_all_rates().await {
        spendly::core::rates::RefreshOutcome::Refreshed { count, .. } => assert_eq!(count, 3),
        other => panic!("unexpected refresh outcome: {other:?}"),
    }

    let today = chrono::Local::now().date_naive();
    let historical = services
        .resolver
        .resolve_historical_rate("USD", "INR", today)
        .await;
    assert_eq!(historical, Some(84.0));

    let yesterday = today - chrono::Duration::days(1);
    let missing = services
        .resolver
        .resolve_historical_rate("USD", "INR", yesterday)
        .await;
    assert_eq!(missing, None);
}

#[test_log::test(tokio::test)]
async fn test_failing_provider_falls_back_to_static_rates() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/latest.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;
    let data_dir = TempDir::new().unwrap();
    let config_file = test_utils::write_config(&data_dir, Some(&mock_server.uri()), None);
    let services = test_utils::services(&config_file);

    let rate = services.resolver.resolve_rate("USD", "JPY").await;
    assert_eq!(rate, 149.5);
}

#[test_log::test(tokio::test)]
async fn test_full_rate_commands_with_mock() {
    let mock_server = test_utils::create_rates_mock_server(3).await;
    let commands = [
        AppCommand::Refresh,
        AppCommand::Convert {
            amount: 25.0,
            from: "GBP".to_string(),
            to: vec![],
        },
        AppCommand::Rate {
            from: "USD".to_string(),
            to: "EUR".to_string(),
            date: Some(chrono::Local::now().date_naive()),
        },
    ];

    for command in commands {
        let data_dir = TempDir::new().unwrap();
        let config_file = test_utils::write_config(&data_dir, Some(&mock_server.uri()), None);
        let description = format!("{command:?}");
        let result =
            spendly::run_command(command, Some(config_file.path().to_str().unwrap())).await;
        assert!(
            result.is_ok(),
            "{description} failed with: {:?}",
            result.err()
        );
    }
}

#[test_log::test(tokio::test)]
async fn test_confident_suggestion_becomes_global_mapping() {
    let mock_server = test_utils::create_openai_mock_server(
        r#"{"category": "Food & Dining", "confidence": 0.92}"#,
        1,
    )
    .await;
    let data_dir = TempDir::new().unwrap();
    let config_file = test_utils::write_config(&data_dir, None, Some(&mock_server.uri()));
    let services = test_utils::services(&config_file);

    let first = services
        .engine
        .categorize("Starbucks", Some("morning coffee"), Some("u1"))
        .await
        .expect("suggestion");
    assert_eq!(first.category_id, CategoryId::new("food-dining"));
    assert_eq!(first.confidence, 92);

    // Another user gets the promoted global mapping without a second AI call
    let second = services
        .engine
        .categorize("  STARBUCKS ", None, Some("u2"))
        .await
        .expect("global mapping");
    assert_eq!(second, first);
}

#[test_log::test(tokio::test)]
async fn test_feedback_builds_a_confirmed_preference() {
    let mock_server = test_utils::create_openai_mock_server(
        r#"{"category": "Food & Dining", "confidence": 0.92}"#,
        1,
    )
    .await;
    let data_dir = TempDir::new().unwrap();
    let config_file = test_utils::write_config(&data_dir, None, Some(&mock_server.uri()));
    let services = test_utils::services(&config_file);

    services.engine.categorize("Costco", None, None).await;

    for _ in 0..3 {
        spendly::cli::categorize::feedback(
            &services.engine,
            services.categories.as_ref(),
            "u1",
            "Costco",
            "shopping",
            false,
        )
        .await
        .expect("feedback recorded");
    }

    let result = services
        .engine
        .categorize("costco", None, Some("u1"))
        .await
        .expect("user preference");
    assert_eq!(result.category_id, CategoryId::new("shopping"));
    assert_eq!(result.confidence, 100);

    // Other users still see the global mapping
    let other = services
        .engine
        .categorize("costco", None, Some("u2"))
        .await
        .expect("global mapping");
    assert_eq!(other.category_id, CategoryId::new("food-dining"));
}

#[test_log::test(tokio::test)]
async fn test_feedback_rejects_unknown_category() {
    let data_dir = TempDir::new().unwrap();
    let config_file = test_utils::write_config(&data_dir, None, None);

    let result = spendly::run_command(
        AppCommand::Feedback {
            user: "u1".to_string(),
            merchant: "Costco".to_string(),
            category: "groceries".to_string(),
            accepted: false,
        },
        Some(config_file.path().to_str().unwrap()),
    )
    .await;
    assert_eq!(
        result.unwrap_err().to_string(),
        "Unknown category id: groceries"
    );
}

#[test_log::test(tokio::test)]
async fn test_listing_commands() {
    let data_dir = TempDir::new().unwrap();
    let config_file = test_utils::write_config(&data_dir, None, None);
    let config_path = config_file.path().to_str().unwrap();

    for command in [AppCommand::Currencies, AppCommand::Categories] {
        let result = spendly::run_command(command, Some(config_path)).await;
        assert!(result.is_ok(), "Command failed with: {:?}", result.err());
    }
}

#[test]
fn test_setup_writes_loadable_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("spendly").join("config.yaml");

    spendly::cli::setup::setup_at_path(&config_path).expect("setup succeeds");
    let config = AppConfig::load_from_path(&config_path).expect("config loads");
    assert_eq!(config.home_currency, "USD");
}
