pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::category::{CategoryInference, DefaultCategories};
use crate::core::config::AppConfig;
use crate::core::currency::RateSnapshotProvider;
use crate::core::{CategorizationEngine, RateResolver};
use crate::providers::open_exchange_rates::OpenExchangeRatesProvider;
use crate::providers::openai::OpenAiCategorizer;
use anyhow::Result;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Commands that need a loaded configuration and the shared services.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Rate {
        from: String,
        to: String,
        date: Option<NaiveDate>,
    },
    Convert {
        amount: f64,
        from: String,
        to: Vec<String>,
    },
    Refresh,
    Currencies,
    Categories,
    Categorize {
        merchant: String,
        notes: Option<String>,
        user: Option<String>,
    },
    Feedback {
        user: String,
        merchant: String,
        category: String,
        accepted: bool,
    },
}

/// Everything a command may need, wired from configuration.
pub struct Services {
    pub config: AppConfig,
    pub resolver: RateResolver,
    pub categories: Arc<DefaultCategories>,
    pub engine: CategorizationEngine,
}

impl Services {
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let store = Arc::new(store::open_store(&config)?);

        let oxr = &config.providers.open_exchange_rates;
        let rate_timeout = Duration::from_secs(oxr.timeout_secs);
        let rate_provider: Option<Arc<dyn RateSnapshotProvider>> =
            match config.rate_provider_app_id() {
                Some(app_id) => Some(Arc::new(OpenExchangeRatesProvider::new(
                    &oxr.base_url,
                    &app_id,
                    rate_timeout,
                )?)),
                None => {
                    warn!("No Open Exchange Rates app id configured, using stored and static rates");
                    None
                }
            };

        let openai = &config.providers.openai;
        let inference_timeout = Duration::from_secs(openai.timeout_secs);
        let inference: Option<Arc<dyn CategoryInference>> = match config.openai_api_key() {
            Some(api_key) => Some(Arc::new(OpenAiCategorizer::new(
                &openai.base_url,
                &api_key,
                &openai.model,
                inference_timeout,
            )?)),
            None => {
                debug!("No OpenAI API key configured, AI categorization disabled");
                None
            }
        };

        let resolver = RateResolver::new(store.clone(), rate_provider)
            .with_provider_timeout(rate_timeout);
        let categories = Arc::new(DefaultCategories::new());
        let engine = CategorizationEngine::new(store, categories.clone(), inference)
            .with_policy(config.categorization)
            .with_inference_timeout(inference_timeout);

        Ok(Self {
            config,
            resolver,
            categories,
            engine,
        })
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("spendly starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let services = Services::from_config(config)?;
    execute(&services, command).await
}

async fn execute(services: &Services, command: AppCommand) -> Result<()> {
    match command {
        AppCommand::Rate { from, to, date } => {
            cli::rates::show_rate(&services.resolver, &from, &to, date).await
        }
        AppCommand::Convert { amount, from, to } => {
            let targets = if to.is_empty() {
                vec![services.config.home_currency.clone()]
            } else {
                to
            };
            cli::rates::show_conversion(&services.resolver, amount, &from, &targets).await
        }
        AppCommand::Refresh => cli::rates::refresh(&services.resolver).await,
        AppCommand::Currencies => {
            println!("{}", cli::rates::currencies_table());
            Ok(())
        }
        AppCommand::Categories => {
            println!("{}", cli::categorize::categories_table(services.categories.all()));
            Ok(())
        }
        AppCommand::Categorize {
            merchant,
            notes,
            user,
        } => {
            cli::categorize::suggest(
                &services.engine,
                &merchant,
                notes.as_deref(),
                user.as_deref(),
            )
            .await
        }
        AppCommand::Feedback {
            user,
            merchant,
            category,
            accepted,
        } => {
            cli::categorize::feedback(
                &services.engine,
                services.categories.as_ref(),
                &user,
                &merchant,
                &category,
                accepted,
            )
            .await
        }
    }
}
