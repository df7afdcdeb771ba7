//! Deduplication and net-effect normalization of raw transactions
//!
//! Raw records arrive once per involved address, unordered. This module
//! collapses them to one candidate per txid and computes the net effect of
//! each transaction on the whole watched address set, so transfers between
//! our own addresses cancel out instead of showing up as a spend plus a
//! receive.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};

use crate::constants;
use crate::explorer::RawTransaction;

/// Direction of a ledger entry's net effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Receive,
    Spend,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Receive => "receive",
            EntryType::Spend => "spend",
        }
    }
}

/// One persisted ledger entry, keyed by txid
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub txid: String,
    /// Calendar day (YYYY-MM-DD) used for pricing granularity
    pub date: String,
    /// Full confirmation instant, used for ordering
    pub timestamp: DateTime<Utc>,
    /// Sorted watched addresses involved in this transaction
    pub addresses: Vec<String>,
    pub entry_type: EntryType,
    /// Absolute net amount, always > 0
    pub amount_ltc: f64,
    /// Signed net amount; positive for receive, negative for spend
    pub net_ltc: f64,
    /// Historical price on `date`; filled by the backfill step, and never
    /// overwritten once set
    pub unit_price: Option<f64>,
}

/// Output of one normalization pass
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    /// Entries ready to merge into the ledger
    pub entries: Vec<LedgerEntry>,
    /// Confirmed txids evaluated and discarded as dust; the merge marks
    /// them seen so they are never re-evaluated
    pub dust_txids: Vec<String>,
}

/// Deduplicate raw records by txid and normalize each survivor into a
/// net-effect ledger entry against the watched address set.
///
/// Unconfirmed transactions are skipped silently and are NOT reported as
/// dust: they carry no usable height, and must still be ingestable once
/// mined.
pub fn normalize_transactions(raw: &[RawTransaction], watched: &[String]) -> NormalizedBatch {
    let watched_set: HashSet<&str> = watched.iter().map(String::as_str).collect();

    // The same tx appears in the fetch of every involved address; records
    // for one txid are structurally identical, so keep the first seen
    let mut seen: HashSet<&str> = HashSet::new();
    let mut unique: Vec<&RawTransaction> = Vec::new();
    for tx in raw {
        if !tx.hash.is_empty() && seen.insert(tx.hash.as_str()) {
            unique.push(tx);
        }
    }

    let mut batch = NormalizedBatch::default();

    for tx in unique {
        let Some(confirmed) = tx.confirmed else {
            continue;
        };

        let mut total_received: i64 = 0;
        let mut total_sent: i64 = 0;
        let mut involved: BTreeSet<&str> = BTreeSet::new();

        for out in &tx.outputs {
            let ours: Vec<&str> = out
                .addresses
                .iter()
                .map(String::as_str)
                .filter(|a| watched_set.contains(a))
                .collect();
            if !ours.is_empty() {
                total_received += out.value;
                involved.extend(ours);
            }
        }

        for inp in &tx.inputs {
            let ours: Vec<&str> = inp
                .addresses
                .iter()
                .map(String::as_str)
                .filter(|a| watched_set.contains(a))
                .collect();
            if !ours.is_empty() {
                // The prior output being spent is the amount leaving us;
                // an input's own "value" field is not meaningful here
                total_sent += inp.output_value.or(inp.value).unwrap_or(0);
                involved.extend(ours);
            }
        }

        let net_litoshis = total_received - total_sent;

        // Transfers between our own addresses land here: both sides summed
        // into the same two aggregates, leaving only the fee
        if net_litoshis.abs() < constants::DUST_THRESHOLD_LITOSHIS {
            batch.dust_txids.push(tx.hash.clone());
            continue;
        }

        let net_ltc = net_litoshis as f64 / constants::LITOSHIS_PER_LTC;
        batch.entries.push(LedgerEntry {
            txid: tx.hash.clone(),
            date: confirmed.format("%Y-%m-%d").to_string(),
            timestamp: confirmed,
            addresses: involved.into_iter().map(str::to_string).collect(),
            entry_type: if net_ltc > 0.0 {
                EntryType::Receive
            } else {
                EntryType::Spend
            },
            amount_ltc: net_ltc.abs(),
            net_ltc,
            unit_price: None,
        });
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::{TxInput, TxOutput};

    fn watched() -> Vec<String> {
        vec!["Lalice".to_string(), "Lbob".to_string()]
    }

    fn raw_tx(
        txid: &str,
        confirmed: bool,
        inputs: Vec<(i64, &str)>,
        outputs: Vec<(i64, &str)>,
    ) -> RawTransaction {
        RawTransaction {
            hash: txid.to_string(),
            confirmed: confirmed.then(|| DateTime::from_timestamp(1_700_000_000, 0).unwrap()),
            block_height: Some(2_600_000),
            inputs: inputs
                .into_iter()
                .map(|(value, addr)| TxInput {
                    output_value: Some(value),
                    value: None,
                    addresses: vec![addr.to_string()],
                })
                .collect(),
            outputs: outputs
                .into_iter()
                .map(|(value, addr)| TxOutput {
                    value,
                    addresses: vec![addr.to_string()],
                })
                .collect(),
        }
    }

    #[test]
    fn test_dedup_across_address_fetches() {
        // Same txid fetched via two watched addresses
        let tx = raw_tx("tx1", true, vec![], vec![(100_000_000, "Lalice")]);
        let batch = normalize_transactions(&[tx.clone(), tx], &watched());
        assert_eq!(batch.entries.len(), 1);
    }

    #[test]
    fn test_simple_receive() {
        let tx = raw_tx(
            "tx1",
            true,
            vec![(200_000_000, "Lexternal")],
            vec![(150_000_000, "Lalice"), (49_999_000, "Lexternal")],
        );
        let batch = normalize_transactions(&[tx], &watched());
        let entry = &batch.entries[0];
        assert_eq!(entry.entry_type, EntryType::Receive);
        assert_eq!(entry.amount_ltc, 1.5);
        assert_eq!(entry.net_ltc, 1.5);
        assert_eq!(entry.addresses, vec!["Lalice".to_string()]);
        assert_eq!(entry.date, "2023-11-14");
        assert!(entry.unit_price.is_none());
    }

    #[test]
    fn test_spend_with_change_back_to_us() {
        // 1.0 LTC in, 0.3 paid out, 0.6999 change back to a watched address
        let tx = raw_tx(
            "tx1",
            true,
            vec![(100_000_000, "Lalice")],
            vec![(30_000_000, "Lexternal"), (69_990_000, "Lalice")],
        );
        let batch = normalize_transactions(&[tx], &watched());
        let entry = &batch.entries[0];
        assert_eq!(entry.entry_type, EntryType::Spend);
        assert!((entry.net_ltc - (-0.3001)).abs() < 1e-9);
        assert_eq!(entry.amount_ltc, entry.net_ltc.abs());
    }

    #[test]
    fn test_internal_transfer_cancels_to_dust() {
        // Alice sends her whole balance to Bob; only the 500-litoshi fee
        // leaves the watched set, which is below the dust threshold
        let tx = raw_tx(
            "tx1",
            true,
            vec![(100_000_000, "Lalice")],
            vec![(99_999_500, "Lbob")],
        );
        let batch = normalize_transactions(&[tx], &watched());
        assert!(batch.entries.is_empty());
        assert_eq!(batch.dust_txids, vec!["tx1".to_string()]);
    }

    #[test]
    fn test_dust_threshold_boundaries() {
        // net 300 litoshis (0.000003 LTC) excluded
        let below = raw_tx("below", true, vec![], vec![(300, "Lalice")]);
        // net 2000 litoshis (0.00002 LTC) included
        let above = raw_tx("above", true, vec![], vec![(2_000, "Lalice")]);
        let batch = normalize_transactions(&[below, above], &watched());
        assert_eq!(batch.entries.len(), 1);
        assert_eq!(batch.entries[0].txid, "above");
        assert_eq!(batch.dust_txids, vec!["below".to_string()]);
    }

    #[test]
    fn test_unconfirmed_skipped_and_not_marked_dust() {
        let tx = raw_tx("pending", false, vec![], vec![(100_000_000, "Lalice")]);
        let batch = normalize_transactions(&[tx], &watched());
        assert!(batch.entries.is_empty());
        assert!(batch.dust_txids.is_empty());
    }

    #[test]
    fn test_prior_output_value_used_for_inputs() {
        let mut tx = raw_tx(
            "tx1",
            true,
            vec![(100_000_000, "Lalice")],
            vec![(40_000_000, "Lexternal")],
        );
        // A bogus input "value" must not leak into the accounting
        tx.inputs[0].value = Some(7);
        let batch = normalize_transactions(&[tx], &watched());
        assert_eq!(batch.entries[0].net_ltc, -1.0);
    }

    #[test]
    fn test_addresses_sorted_union() {
        let tx = raw_tx(
            "tx1",
            true,
            vec![(100_000_000, "Lbob")],
            vec![(30_000_000, "Lalice"), (5_000_000, "Lexternal")],
        );
        let batch = normalize_transactions(&[tx], &watched());
        assert_eq!(
            batch.entries[0].addresses,
            vec!["Lalice".to_string(), "Lbob".to_string()]
        );
    }
}
