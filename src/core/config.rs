use crate::core::categorizer::CategorizationPolicy;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

pub const OPEN_EXCHANGE_RATES_APP_ID_ENV: &str = "OPEN_EXCHANGE_RATES_APP_ID";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

fn default_oxr_base_url() -> String {
    "https://openexchangerates.org".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_rate_timeout_secs() -> u64 {
    10
}

fn default_inference_timeout_secs() -> u64 {
    15
}

fn default_home_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OpenExchangeRatesConfig {
    #[serde(default = "default_oxr_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default = "default_rate_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenExchangeRatesConfig {
    fn default() -> Self {
        Self {
            base_url: default_oxr_base_url(),
            app_id: None,
            timeout_secs: default_rate_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_inference_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key: None,
            model: default_openai_model(),
            timeout_secs: default_inference_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub open_exchange_rates: OpenExchangeRatesConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_home_currency")]
    pub home_currency: String,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub categorization: CategorizationPolicy,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            home_currency: default_home_currency(),
            providers: ProvidersConfig::default(),
            categorization: CategorizationPolicy::default(),
            data_path: None,
        }
    }
}

/// Config value if set and non-blank, otherwise the environment variable.
fn credential(configured: Option<&str>, env_var: &str) -> Option<String> {
    configured
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| {
            std::env::var(env_var)
                .ok()
                .filter(|v| !v.trim().is_empty())
        })
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("app", "spendly", "spendly")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("app", "spendly", "spendly")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn rate_provider_app_id(&self) -> Option<String> {
        credential(
            self.providers.open_exchange_rates.app_id.as_deref(),
            OPEN_EXCHANGE_RATES_APP_ID_ENV,
        )
    }

    pub fn openai_api_key(&self) -> Option<String> {
        credential(self.providers.openai.api_key.as_deref(), OPENAI_API_KEY_ENV)
    }
}
