//! Simulation configuration.
//!
//! A [`MarketConfig`] describes one simulation run: the pool capacity,
//! orchestrator settings and an optional list of participants to add at
//! start-up. It is persisted as JSON.
//!
//! # Example
//!
//! ```no_run
//! use ticket_market_core::config::MarketConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Path from MARKET_CONFIG, or defaults when unset
//! let config = MarketConfig::from_env()?;
//! println!("capacity: {}", config.capacity);
//!
//! config.save("config.json")?;
//! # Ok(())
//! # }
//! ```

use crate::error::MarketError;
use crate::money::Money;
use crate::participant::{CustomerParams, VendorParams};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "MARKET_CONFIG";

/// Environment variable overriding the pool capacity
pub const CAPACITY_ENV: &str = "MARKET_CAPACITY";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration error
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the config file failed
    #[error("Config file {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The file was not valid JSON for [`MarketConfig`]
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// An environment override had an unusable value
    #[error("Invalid value for {var}: {value}")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),

    /// A participant entry was rejected
    #[error("Invalid participant '{name}': {source}")]
    Participant {
        /// Participant name from the file
        name: String,
        /// Validation failure
        #[source]
        source: MarketError,
    },
}

/// Vendor entry in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorSpec {
    /// Display name
    pub name: String,
    /// Event label
    pub event_name: String,
    /// Tickets per release
    pub batch_size: u32,
    /// Seconds between releases
    pub period_secs: u64,
    /// Total tickets to release
    pub quota: u32,
    /// Decimal price, e.g. `"25.00"`
    pub price: String,
}

impl VendorSpec {
    /// Convert to validated runtime parameters
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Participant`] if the price does not parse or the
    /// parameters are invalid.
    pub fn to_params(&self) -> Result<VendorParams, ConfigError> {
        let price: Money = self.price.parse().map_err(|e| ConfigError::Participant {
            name: self.name.clone(),
            source: MarketError::InvalidParameter {
                field: "price",
                reason: format!("{e}"),
            },
        })?;
        let params = VendorParams::new(
            self.name.clone(),
            self.event_name.clone(),
            self.batch_size,
            self.period_secs,
            self.quota,
            price,
        );
        params.validate().map_err(|source| ConfigError::Participant {
            name: self.name.clone(),
            source,
        })?;
        Ok(params)
    }
}

/// Customer entry in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSpec {
    /// Display name
    pub name: String,
    /// Seconds between purchases
    pub period_secs: u64,
    /// Total tickets to buy
    pub quota: u32,
}

impl CustomerSpec {
    /// Convert to validated runtime parameters
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Participant`] if the parameters are invalid.
    pub fn to_params(&self) -> Result<CustomerParams, ConfigError> {
        let params = CustomerParams::new(self.name.clone(), self.period_secs, self.quota);
        params.validate().map_err(|source| ConfigError::Participant {
            name: self.name.clone(),
            source,
        })?;
        Ok(params)
    }
}

/// Full simulation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Maximum tickets held by the pool at once
    pub capacity: usize,
    /// How long `stop` and removals wait for a task before aborting it
    pub shutdown_timeout_secs: u64,
    /// Number of recent sales kept in the ledger
    pub sales_history: usize,
    /// Seconds between status log lines in the simulator (0 disables)
    pub status_interval_secs: u64,
    /// Default log level when `RUST_LOG` is unset
    pub log_level: String,
    /// Vendors added at start-up
    pub vendors: Vec<VendorSpec>,
    /// Customers added at start-up
    pub customers: Vec<CustomerSpec>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            shutdown_timeout_secs: 5,
            sales_history: 1000,
            status_interval_secs: 5,
            log_level: "info".to_string(),
            vendors: Vec::new(),
            customers: Vec::new(),
        }
    }
}

impl MarketConfig {
    /// Load and validate a config file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid JSON, or fails
    /// validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::read(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write the config as pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from the file named by `MARKET_CONFIG` (defaults when unset),
    /// then apply the `MARKET_CAPACITY` override.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be loaded, the override is not a
    /// number, or the result fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_PATH_ENV).ok();
        Self::resolve(path.as_deref().map(Path::new), |var| env::var(var).ok())
    }

    /// Load `path`, then apply the `MARKET_CAPACITY` override.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be loaded, the override is not a
    /// number, or the result fails validation.
    pub fn load_with_env(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::resolve(Some(path.as_ref()), |var| env::var(var).ok())
    }

    /// Overrides apply before validation, so they can repair a bad file value.
    fn resolve(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => Self::default(),
        };
        if let Some(value) = lookup(CAPACITY_ENV) {
            config.capacity = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: CAPACITY_ENV,
                value,
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any value is out of range or any participant entry
    /// is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Validation("capacity must be > 0".to_string()));
        }
        if self.shutdown_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "shutdown_timeout_secs must be > 0".to_string(),
            ));
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "invalid log_level: {}. Must be one of: {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }
        for vendor in &self.vendors {
            vendor.to_params()?;
        }
        for customer in &self.customers {
            customer.to_params()?;
        }
        Ok(())
    }

    /// Shutdown timeout as a `Duration`
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Status log interval, `None` when disabled
    #[must_use]
    pub const fn status_interval(&self) -> Option<Duration> {
        if self.status_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.status_interval_secs))
        }
    }
}
