//! Weighted-average cost basis calculation
//!
//! Pure function of {ledger entries, current price, target profit}. Spends
//! reduce the balance and remaining cost through the shared average only;
//! there is no per-lot tracking.

use serde::{Deserialize, Serialize};

use crate::ledger::{EntryType, LedgerEntry};

/// Derived portfolio summary, recomputed every run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub balance_ltc: f64,
    pub total_received_ltc: f64,
    pub total_spent_ltc: f64,
    pub total_cost: f64,
    pub remaining_cost: f64,
    pub avg_cost_basis: f64,
    pub target_profit_pct: f64,
    pub target_sell_price: f64,
    pub current_price: Option<f64>,
    pub current_value: Option<f64>,
    pub unrealized_pl: Option<f64>,
    pub unrealized_pl_pct: Option<f64>,
    pub total_transactions: usize,
    pub total_receives: usize,
    pub total_spends: usize,
}

/// Round only at the output boundary, never while accumulating
fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Compute the summary over all priced entries. Entries without a resolved
/// price contribute no cost information yet and are excluded entirely.
pub fn calculate_summary(
    entries: &[LedgerEntry],
    current_price: Option<f64>,
    target_profit_pct: f64,
) -> Summary {
    let mut total_received_ltc = 0.0;
    let mut total_cost = 0.0;
    let mut total_spent_ltc = 0.0;
    let mut receives = 0usize;
    let mut spends = 0usize;

    for entry in entries {
        let Some(price) = entry.unit_price else {
            continue;
        };
        match entry.entry_type {
            EntryType::Receive => {
                total_received_ltc += entry.amount_ltc;
                total_cost += entry.amount_ltc * price;
                receives += 1;
            }
            EntryType::Spend => {
                total_spent_ltc += entry.amount_ltc;
                spends += 1;
            }
        }
    }

    let balance_ltc = total_received_ltc - total_spent_ltc;
    let avg_cost_basis = if total_received_ltc > 0.0 {
        total_cost / total_received_ltc
    } else {
        0.0
    };
    let remaining_cost = if balance_ltc > 0.0 {
        avg_cost_basis * balance_ltc
    } else {
        0.0
    };
    let target_sell_price = avg_cost_basis * (1.0 + target_profit_pct / 100.0);

    let current_value = current_price.map(|p| balance_ltc * p);
    let unrealized_pl = current_value.map(|v| v - remaining_cost);
    let unrealized_pl_pct = if remaining_cost > 0.0 {
        unrealized_pl.map(|pl| pl / remaining_cost * 100.0)
    } else {
        None
    };

    Summary {
        balance_ltc: round_to(balance_ltc, 8),
        total_received_ltc: round_to(total_received_ltc, 8),
        total_spent_ltc: round_to(total_spent_ltc, 8),
        total_cost: round_to(total_cost, 2),
        remaining_cost: round_to(remaining_cost, 2),
        avg_cost_basis: round_to(avg_cost_basis, 2),
        target_profit_pct,
        target_sell_price: round_to(target_sell_price, 2),
        current_price,
        current_value: current_value.map(|v| round_to(v, 2)),
        unrealized_pl: unrealized_pl.map(|v| round_to(v, 2)),
        unrealized_pl_pct: unrealized_pl_pct.map(|v| round_to(v, 2)),
        total_transactions: receives + spends,
        total_receives: receives,
        total_spends: spends,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn entry(
        txid: &str,
        entry_type: EntryType,
        amount_ltc: f64,
        unit_price: Option<f64>,
    ) -> LedgerEntry {
        let net_ltc = match entry_type {
            EntryType::Receive => amount_ltc,
            EntryType::Spend => -amount_ltc,
        };
        LedgerEntry {
            txid: txid.to_string(),
            date: "2024-02-01".to_string(),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            addresses: vec!["Lalice".to_string()],
            entry_type,
            amount_ltc,
            net_ltc,
            unit_price,
        }
    }

    #[test]
    fn test_weighted_average_cost_basis() {
        // 1.0 @ 50 and 1.0 @ 100, no spends
        let entries = vec![
            entry("a", EntryType::Receive, 1.0, Some(50.0)),
            entry("b", EntryType::Receive, 1.0, Some(100.0)),
        ];
        let summary = calculate_summary(&entries, Some(80.0), 3.0);

        assert_eq!(summary.avg_cost_basis, 75.00);
        assert_eq!(summary.target_sell_price, 77.25);
        assert_eq!(summary.balance_ltc, 2.0);
        assert_eq!(summary.current_value, Some(160.00));
        assert_eq!(summary.remaining_cost, 150.00);
        assert_eq!(summary.unrealized_pl, Some(10.00));
        assert_eq!(summary.unrealized_pl_pct, Some(6.67));
        assert_eq!(summary.total_receives, 2);
        assert_eq!(summary.total_spends, 0);
    }

    #[test]
    fn test_spend_reduces_balance_without_changing_avg() {
        let entries = vec![
            entry("a", EntryType::Receive, 1.0, Some(50.0)),
            entry("b", EntryType::Receive, 1.0, Some(100.0)),
            entry("c", EntryType::Spend, 0.5, Some(200.0)),
        ];
        let summary = calculate_summary(&entries, None, 3.0);

        assert_eq!(summary.balance_ltc, 1.5);
        assert_eq!(summary.avg_cost_basis, 75.00);
        assert_eq!(summary.remaining_cost, 112.50);
        assert_eq!(summary.total_transactions, 3);
    }

    #[test]
    fn test_unpriced_entries_excluded() {
        let entries = vec![
            entry("a", EntryType::Receive, 1.0, Some(50.0)),
            entry("b", EntryType::Receive, 9.0, None),
        ];
        let summary = calculate_summary(&entries, None, 3.0);

        assert_eq!(summary.balance_ltc, 1.0);
        assert_eq!(summary.avg_cost_basis, 50.00);
        assert_eq!(summary.total_receives, 1);
    }

    #[test]
    fn test_empty_ledger() {
        let summary = calculate_summary(&[], None, 3.0);
        assert_eq!(summary.balance_ltc, 0.0);
        assert_eq!(summary.avg_cost_basis, 0.0);
        assert_eq!(summary.target_sell_price, 0.0);
        assert_eq!(summary.remaining_cost, 0.0);
        assert!(summary.current_value.is_none());
        assert!(summary.unrealized_pl_pct.is_none());
    }

    #[test]
    fn test_no_current_price_means_no_valuation() {
        let entries = vec![entry("a", EntryType::Receive, 1.0, Some(50.0))];
        let summary = calculate_summary(&entries, None, 3.0);
        assert!(summary.current_value.is_none());
        assert!(summary.unrealized_pl.is_none());
        assert!(summary.unrealized_pl_pct.is_none());
    }
}
