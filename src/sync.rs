//! Incremental sync cursor and idempotent ledger merge

use std::collections::HashSet;

use crate::ledger::{LedgerEntry, NormalizedBatch};

/// Persisted checkpoint bounding the next fetch window.
///
/// `seen_txids` is a superset of the ledger's txids: dust-filtered ids are
/// recorded too, so they are never re-evaluated on later runs.
#[derive(Debug, Default, Clone)]
pub struct SyncCursor {
    /// Highest block height observed across all runs; never decreases
    pub highest_block_seen: Option<u64>,
    /// Every txid ever ingested or discarded as dust
    pub seen_txids: HashSet<String>,
}

impl SyncCursor {
    /// Lower bound for the next fetch, unset on a first run
    pub fn fetch_lower_bound(&self) -> Option<u64> {
        self.highest_block_seen
    }

    /// Record an observed block height; the cursor only moves forward
    pub fn observe_block(&mut self, height: u64) {
        self.highest_block_seen = Some(self.highest_block_seen.map_or(height, |h| h.max(height)));
    }
}

/// Merge a normalized batch into the ledger.
///
/// An entry is appended only if its txid has not been seen before, which
/// makes re-running the pipeline on overlapping fetch windows idempotent.
/// Returns the number of entries added.
pub fn merge_entries(
    ledger: &mut Vec<LedgerEntry>,
    cursor: &mut SyncCursor,
    batch: NormalizedBatch,
) -> usize {
    let mut added = 0;

    for entry in batch.entries {
        if cursor.seen_txids.insert(entry.txid.clone()) {
            ledger.push(entry);
            added += 1;
        }
    }

    for txid in batch.dust_txids {
        cursor.seen_txids.insert(txid);
    }

    added
}
