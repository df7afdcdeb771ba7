//! Configuration for the cost basis tracker

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;

use crate::constants;

// =============================================================================
// File-based Configuration (config.toml)
// =============================================================================

/// Configuration loaded from config.toml
#[derive(Debug, Deserialize)]
pub struct FileConfig {
    /// LTC addresses to track
    pub addresses: Vec<String>,
    /// Target profit percentage for the sell price
    #[serde(default = "default_target_profit")]
    pub target_profit_percent: f64,
    /// Fiat currency for prices
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Per-address fetch cap on a first run (0 = unlimited)
    #[serde(default = "default_max_transactions")]
    pub max_transactions_per_address: usize,
}

fn default_target_profit() -> f64 {
    3.0
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_max_transactions() -> usize {
    constants::DEFAULT_MAX_TXS_PER_ADDRESS
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content).with_context(|| {
            "Failed to parse config.toml. Check for:\n\
             - A missing addresses list\n\
             - Invalid TOML syntax (missing quotes, brackets, etc.)\n\
             - Incorrect data types (strings vs numbers)"
        })
    }
}

// =============================================================================
// Runtime Configuration
// =============================================================================

/// Validated configuration with all defaults applied
#[derive(Debug)]
pub struct Config {
    /// Watched address set, validated and deduplicated
    pub addresses: Vec<String>,
    /// Target profit percentage for the sell price
    pub target_profit_percent: f64,
    /// Fiat currency code, lowercase
    pub currency: String,
    /// Per-address fetch cap on a first run (0 = unlimited)
    pub max_txs_per_address: usize,
}

impl Config {
    /// Validate a file config. All errors here are fatal and happen before
    /// any network activity.
    pub fn from_file(file_config: &FileConfig) -> Result<Self> {
        if file_config.addresses.is_empty() {
            bail!("No addresses configured. Add at least one LTC address to config.toml");
        }

        let mut addresses: Vec<String> = Vec::new();
        for addr in &file_config.addresses {
            let addr = addr.trim();
            if addr.starts_with("YOUR_") {
                bail!(
                    "config.toml still contains the placeholder address '{}'. \
                     Replace it with a real LTC address",
                    addr
                );
            }
            if !is_valid_address(addr) {
                bail!("'{}' does not look like a valid LTC address", addr);
            }
            if addresses.iter().any(|a| a == addr) {
                bail!("Duplicate address '{}' in config.toml", addr);
            }
            addresses.push(addr.to_string());
        }

        if file_config.target_profit_percent <= 0.0 {
            bail!(
                "target_profit_percent must be positive (got {})",
                file_config.target_profit_percent
            );
        }

        let currency = file_config.currency.trim().to_lowercase();
        if currency.is_empty() || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            bail!(
                "currency must be an ISO code like 'usd' or 'eur' (got '{}')",
                file_config.currency
            );
        }

        Ok(Self {
            addresses,
            target_profit_percent: file_config.target_profit_percent,
            currency,
            max_txs_per_address: file_config.max_transactions_per_address,
        })
    }
}

/// Shape check only: ltc1/L/M/3 prefix, 26-63 chars total, alphanumeric
fn is_valid_address(addr: &str) -> bool {
    let rest = if let Some(r) = addr.strip_prefix("ltc1") {
        r
    } else if addr.starts_with(['L', 'M', '3']) {
        &addr[1..]
    } else {
        return false;
    };

    (25..=62).contains(&rest.len()) && rest.chars().all(|c| c.is_ascii_alphanumeric())
}
