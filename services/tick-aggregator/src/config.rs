//! Service configuration
//!
//! Defaults cover a single product with the 24h and 30d granularities.
//! `ServiceConfig::from_env` overrides them from environment variables:
//!
//! | Variable                  | Format                        |
//! |---------------------------|-------------------------------|
//! | `TICKER_PRODUCTS`         | comma-separated product ids   |
//! | `TICKER_GRANULARITIES`    | comma-separated minutes       |
//! | `TICKER_CHANNEL_CAPACITY` | positive integer              |

use types::ids::ProductId;

use crate::tick::Granularity;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("granularity {0} is required for ticker snapshots")]
    MissingGranularity(Granularity),

    #[error("no products configured")]
    NoProducts,
}

/// Per-aggregator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Granularities to maintain, in update order.
    pub granularities: Vec<Granularity>,
    /// Buffer between the event stream and the worker.
    pub channel_capacity: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            granularities: vec![Granularity::DAY, Granularity::THIRTY_DAYS],
            channel_capacity: 1024,
        }
    }
}

impl AggregatorConfig {
    /// Tickers read the 24h and 30d ticks, so both must be maintained.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for required in [Granularity::DAY, Granularity::THIRTY_DAYS] {
            if !self.granularities.contains(&required) {
                return Err(ConfigError::MissingGranularity(required));
            }
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TICKER_CHANNEL_CAPACITY",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Whole-service settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub products: Vec<ProductId>,
    pub aggregator: AggregatorConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            products: vec![ProductId::new("BTC-USDT")],
            aggregator: AggregatorConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` as the variable source; unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("TICKER_PRODUCTS") {
            config.products = split_list(&raw)
                .map(|name| ProductId::try_new(name).ok_or_else(|| invalid("TICKER_PRODUCTS", &raw)))
                .collect::<Result<_, _>>()?;
        }

        if let Some(raw) = lookup("TICKER_GRANULARITIES") {
            config.aggregator.granularities = split_list(&raw)
                .map(|minutes| {
                    minutes
                        .parse::<u32>()
                        .ok()
                        .and_then(Granularity::from_minutes)
                        .ok_or_else(|| invalid("TICKER_GRANULARITIES", &raw))
                })
                .collect::<Result<_, _>>()?;
        }

        if let Some(raw) = lookup("TICKER_CHANNEL_CAPACITY") {
            config.aggregator.channel_capacity = raw
                .trim()
                .parse()
                .map_err(|_| invalid("TICKER_CHANNEL_CAPACITY", &raw))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.products.is_empty() {
            return Err(ConfigError::NoProducts);
        }
        self.aggregator.validate()
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    }
}
