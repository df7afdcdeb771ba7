//! LTC price fetching from CryptoCompare (current + historical) and the
//! per-run backfill of entry prices
//!
//! Backfill groups by date, so the number of oracle calls is bounded by the
//! number of distinct transaction days, not the number of entries. A price
//! already set on an entry is never touched again.

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;

use crate::constants;
use crate::ledger::LedgerEntry;

/// Per-run price cache mapping date strings to unit prices
pub type PriceCache = HashMap<String, f64>;

/// CryptoCompare HTTP client for one fiat currency
pub struct PriceClient {
    client: reqwest::Client,
    /// Uppercase currency code as the API expects it
    currency: String,
}

impl PriceClient {
    pub fn new(currency: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(constants::ORACLE_TIMEOUT_SECS))
            .build()
            .context("Failed to build price HTTP client")?;

        Ok(Self {
            client,
            currency: currency.to_uppercase(),
        })
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Current LTC price
    pub async fn current(&self) -> Result<f64> {
        let url = format!(
            "{}/price?fsym=LTC&tsyms={}",
            constants::CRYPTOCOMPARE_API_BASE,
            self.currency
        );

        let data: HashMap<String, f64> = self.get_json(&url).await?;
        data.get(&self.currency)
            .copied()
            .filter(|p| *p > 0.0)
            .ok_or_else(|| anyhow!("No LTC price in response"))
    }

    /// LTC price on a specific date (YYYY-MM-DD)
    pub async fn historical(&self, date: &str) -> Result<f64> {
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .with_context(|| format!("Invalid date: {}", date))?;
        // Mid-day keeps the lookup inside the right UTC day
        let ts = day.and_hms_opt(12, 0, 0).unwrap().and_utc().timestamp();

        let url = format!(
            "{}/pricehistorical?fsym=LTC&tsyms={}&ts={}",
            constants::CRYPTOCOMPARE_API_BASE,
            self.currency,
            ts
        );

        // Response shape: {"LTC": {"USD": 75.0}}; zero means unavailable
        let data: HashMap<String, HashMap<String, f64>> = self.get_json(&url).await?;
        data.get("LTC")
            .and_then(|m| m.get(&self.currency))
            .copied()
            .filter(|p| *p > 0.0)
            .ok_or_else(|| anyhow!("No LTC price for {}", date))
    }

    /// GET a URL with retry and exponential backoff (longer on 429)
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
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
                        last_error =
                            Some(anyhow!("Price API returned status: {}", response.status()));
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

/// Distinct dates, sorted, over entries whose price is still unresolved
pub fn unpriced_dates(entries: &[LedgerEntry]) -> Vec<String> {
    let mut dates: Vec<String> = entries
        .iter()
        .filter(|e| e.unit_price.is_none())
        .map(|e| e.date.clone())
        .collect();
    dates.sort();
    dates.dedup();
    dates
}

/// Assign a price to every entry on `date` that has none yet.
/// Entries already priced are left alone. Returns the number assigned.
pub fn apply_price(entries: &mut [LedgerEntry], date: &str, price: f64) -> usize {
    let mut assigned = 0;
    for entry in entries.iter_mut() {
        if entry.date == date && entry.unit_price.is_none() {
            entry.unit_price = Some(price);
            assigned += 1;
        }
    }
    assigned
}

/// Resolve prices for every unpriced entry, querying each date at most once
/// per run. A date whose lookup fails stays unresolved (warned, not fatal)
/// and heals on a later run. Returns the number of entries priced.
pub async fn backfill_prices(
    entries: &mut [LedgerEntry],
    oracle: &PriceClient,
    cache: &mut PriceCache,
) -> usize {
    let dates = unpriced_dates(entries);
    if dates.is_empty() {
        return 0;
    }

    println!("  Fetching prices for {} date(s)...", dates.len());

    let mut priced = 0;
    for date in dates {
        let price = match cache.get(&date) {
            Some(p) => Some(*p),
            None => {
                sleep(Duration::from_millis(constants::ORACLE_DELAY_MS)).await;
                match oracle.historical(&date).await {
                    Ok(p) => {
                        cache.insert(date.clone(), p);
                        Some(p)
                    }
                    Err(e) => {
                        eprintln!(
                            "    Warning: {}: {} (will retry next run)",
                            date, e
                        );
                        None
                    }
                }
            }
        };

        if let Some(p) = price {
            println!("    {}: {:.2} {}", date, p, oracle.currency());
            priced += apply_price(entries, &date, p);
        }
    }

    priced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::EntryType;
    use chrono::DateTime;

    fn entry(txid: &str, date: &str, unit_price: Option<f64>) -> LedgerEntry {
        LedgerEntry {
            txid: txid.to_string(),
            date: date.to_string(),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            addresses: vec!["Lalice".to_string()],
            entry_type: EntryType::Receive,
            amount_ltc: 1.0,
            net_ltc: 1.0,
            unit_price,
        }
    }

    #[test]
    fn test_unpriced_dates_distinct_and_sorted() {
        let entries = vec![
            entry("a", "2024-02-01", None),
            entry("b", "2024-01-15", None),
            entry("c", "2024-02-01", None),
            entry("d", "2024-03-01", Some(80.0)),
        ];
        assert_eq!(
            unpriced_dates(&entries),
            vec!["2024-01-15".to_string(), "2024-02-01".to_string()]
        );
    }

    #[test]
    fn test_apply_price_fills_all_entries_on_date() {
        let mut entries = vec![
            entry("a", "2024-02-01", None),
            entry("b", "2024-02-01", None),
            entry("c", "2024-02-02", None),
        ];
        let assigned = apply_price(&mut entries, "2024-02-01", 72.5);
        assert_eq!(assigned, 2);
        assert_eq!(entries[0].unit_price, Some(72.5));
        assert_eq!(entries[1].unit_price, Some(72.5));
        assert_eq!(entries[2].unit_price, None);
    }

    #[test]
    fn test_existing_price_never_overwritten() {
        // Even if the oracle would answer differently on a later run
        let mut entries = vec![entry("a", "2024-02-01", Some(50.0))];
        let assigned = apply_price(&mut entries, "2024-02-01", 999.0);
        assert_eq!(assigned, 0);
        assert_eq!(entries[0].unit_price, Some(50.0));

        // And backfill never even queries for it
        assert!(unpriced_dates(&entries).is_empty());
    }
}
