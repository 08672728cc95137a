use anyhow::Result;
use std::time::Duration;

const USER_AGENT: &str = "spendly/1.0";

/// HTTP client shared by the providers. Every request is bounded by `timeout`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}
