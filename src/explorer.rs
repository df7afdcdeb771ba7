//! BlockCypher chain data client
//!
//! Fetches raw transaction history and confirmed balances per address.
//! Pagination is handled here; callers get the full window in one call.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::sleep;

use crate::constants;

/// One transaction as reported by BlockCypher. Ephemeral; never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    /// Transaction id
    pub hash: String,
    /// Confirmation time; absent while the transaction sits in the mempool
    #[serde(default)]
    pub confirmed: Option<DateTime<Utc>>,
    /// Block height; -1 or absent when unconfirmed
    #[serde(default)]
    pub block_height: Option<i64>,
    #[serde(default)]
    pub inputs: Vec<TxInput>,
    #[serde(default)]
    pub outputs: Vec<TxOutput>,
}

/// Transaction input. `output_value` carries the value of the previous
/// output being spent, which is the amount that matters for accounting.
#[derive(Debug, Clone, Deserialize)]
pub struct TxInput {
    #[serde(default)]
    pub output_value: Option<i64>,
    #[serde(default)]
    pub value: Option<i64>,
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// Transaction output with its destination addresses
#[derive(Debug, Clone, Deserialize)]
pub struct TxOutput {
    /// Value in litoshis
    pub value: i64,
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// Response page from the /addrs/{addr}/full endpoint
#[derive(Debug, Deserialize)]
struct FullAddressResponse {
    #[serde(default)]
    txs: Vec<RawTransaction>,
    #[serde(default, rename = "hasMore")]
    has_more: bool,
}

/// Response from the /addrs/{addr}/balance endpoint
#[derive(Debug, Deserialize)]
struct BalanceResponse {
    /// Confirmed balance in litoshis
    #[serde(default)]
    balance: i64,
    /// Total transaction count for the address
    #[serde(default)]
    n_tx: u64,
}

/// BlockCypher HTTP client
pub struct ExplorerClient {
    client: reqwest::Client,
}

impl ExplorerClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(constants::EXPLORER_TIMEOUT_SECS))
            .build()
            .context("Failed to build explorer HTTP client")?;

        Ok(Self { client })
    }

    /// Fetch transactions for an address, transparently paginating.
    ///
    /// `after_block` limits the fetch to blocks above that height (the
    /// incremental-sync lower bound). `max_txs` caps the number of records
    /// returned; 0 means unlimited.
    pub async fn fetch_transactions(
        &self,
        address: &str,
        after_block: Option<u64>,
        max_txs: usize,
    ) -> Result<Vec<RawTransaction>> {
        let mut txs: Vec<RawTransaction> = Vec::new();
        let mut before: Option<i64> = None;

        loop {
            sleep(Duration::from_millis(constants::EXPLORER_DELAY_MS)).await;

            let mut url = format!(
                "{}/addrs/{}/full?limit={}",
                constants::BLOCKCYPHER_API_BASE,
                address,
                constants::EXPLORER_PAGE_LIMIT
            );
            if let Some(after) = after_block {
                url.push_str(&format!("&after={}", after));
            }
            if let Some(b) = before {
                url.push_str(&format!("&before={}", b));
            }

            let page: FullAddressResponse = self.get_json(&url).await?;
            if page.txs.is_empty() {
                break;
            }

            txs.extend(page.txs);

            if max_txs > 0 && txs.len() >= max_txs {
                txs.truncate(max_txs);
                break;
            }

            if !page.has_more {
                break;
            }

            // Next page: everything below the lowest block height seen so far
            before = txs.last().and_then(|t| t.block_height).or(Some(0));
        }

        Ok(txs)
    }

    /// Fetch confirmed balance (LTC) and total transaction count
    pub async fn balance(&self, address: &str) -> Result<(f64, u64)> {
        sleep(Duration::from_millis(constants::EXPLORER_DELAY_MS)).await;

        let url = format!(
            "{}/addrs/{}/balance",
            constants::BLOCKCYPHER_API_BASE,
            address
        );
        let resp: BalanceResponse = self.get_json(&url).await?;

        Ok((resp.balance as f64 / constants::LITOSHIS_PER_LTC, resp.n_tx))
    }

    /// GET a URL with retry and exponential backoff (longer on 429)
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let max_retries = 3;
        let mut last_error = None;
        let mut was_rate_limited = false;

        for attempt in 0..max_retries {
            if attempt > 0 {
                let base_delay = if was_rate_limited { 10 } else { 2 };
                let delay = Duration::from_secs(base_delay * 2u64.pow(attempt as u32 - 1));
                sleep(delay).await;
            }

            match self
                .client
                .get(url)
                .header("Accept", "application/json")
                .send()
                .await
            {
                Ok(response) => {
                    if response.status().is_success() {
                        match response.json::<T>().await {
                            Ok(data) => return Ok(data),
                            Err(e) => {
                                last_error = Some(anyhow!("Parse error: {}", e));
                            }
                        }
                    } else if response.status().as_u16() == 429 {
                        was_rate_limited = true;
                        last_error = Some(anyhow!("Rate limited (429)"));
                        continue;
                    } else {
                        was_rate_limited = false;
                        last_error = Some(anyhow!(
                            "Explorer returned status: {}",
                            response.status()
                        ));
                    }
                }
                Err(e) => {
                    was_rate_limited = false;
                    last_error = Some(anyhow!("Request failed: {}", e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("Failed after {} retries", max_retries)))
    }
}
