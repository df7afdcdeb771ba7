//! Console summary and CSV exports

use anyhow::Result;
use csv::Writer;
use std::path::Path;

use crate::constants;
use crate::ledger::LedgerEntry;
use crate::summary::Summary;

/// Write ledger.csv and summary.csv into the output directory
pub fn write_csv_reports(
    output_dir: &Path,
    entries: &[LedgerEntry],
    summary: &Summary,
) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    write_ledger_csv(output_dir, entries)?;
    write_summary_csv(output_dir, summary)?;
    Ok(())
}

/// Generate ledger.csv (all entries, newest first)
fn write_ledger_csv(output_dir: &Path, entries: &[LedgerEntry]) -> Result<()> {
    let path = output_dir.join(constants::LEDGER_CSV_FILENAME);
    let mut wtr = Writer::from_path(&path)?;

    wtr.write_record([
        "Date",
        "Txid",
        "Type",
        "Amount_LTC",
        "Net_LTC",
        "Unit_Price",
        "Value",
        "Addresses",
    ])?;

    let mut sorted: Vec<&LedgerEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    for entry in sorted {
        let (price, value) = match entry.unit_price {
            Some(p) => (format!("{:.2}", p), format!("{:.2}", entry.amount_ltc * p)),
            None => (String::new(), String::new()),
        };

        wtr.write_record([
            entry.date.as_str(),
            entry.txid.as_str(),
            entry.entry_type.as_str(),
            &format!("{:.8}", entry.amount_ltc),
            &format!("{:.8}", entry.net_ltc),
            &price,
            &value,
            &entry.addresses.join(" "),
        ])?;
    }

    wtr.flush()?;
    println!("  Generated: {}", path.display());

    Ok(())
}

/// Generate summary.csv (one row per metric)
fn write_summary_csv(output_dir: &Path, summary: &Summary) -> Result<()> {
    let path = output_dir.join(constants::SUMMARY_CSV_FILENAME);
    let mut wtr = Writer::from_path(&path)?;

    let fmt_opt = |v: Option<f64>| v.map(|x| format!("{:.2}", x)).unwrap_or_default();

    wtr.write_record(["Metric", "Value"])?;
    wtr.write_record(["Balance_LTC", &format!("{:.8}", summary.balance_ltc)])?;
    wtr.write_record([
        "Total_Received_LTC",
        &format!("{:.8}", summary.total_received_ltc),
    ])?;
    wtr.write_record([
        "Total_Spent_LTC",
        &format!("{:.8}", summary.total_spent_ltc),
    ])?;
    wtr.write_record(["Total_Cost", &format!("{:.2}", summary.total_cost)])?;
    wtr.write_record(["Remaining_Cost", &format!("{:.2}", summary.remaining_cost)])?;
    wtr.write_record(["Avg_Cost_Basis", &format!("{:.2}", summary.avg_cost_basis)])?;
    wtr.write_record([
        "Target_Profit_Pct",
        &format!("{}", summary.target_profit_pct),
    ])?;
    wtr.write_record([
        "Target_Sell_Price",
        &format!("{:.2}", summary.target_sell_price),
    ])?;
    wtr.write_record(["Current_Price", &fmt_opt(summary.current_price)])?;
    wtr.write_record(["Current_Value", &fmt_opt(summary.current_value)])?;
    wtr.write_record(["Unrealized_PL", &fmt_opt(summary.unrealized_pl)])?;
    wtr.write_record(["Unrealized_PL_Pct", &fmt_opt(summary.unrealized_pl_pct)])?;
    wtr.write_record([
        "Total_Transactions",
        &summary.total_transactions.to_string(),
    ])?;

    wtr.flush()?;
    println!("  Generated: {}", path.display());

    Ok(())
}

/// Whether the calculated balance agrees with the explorer's view.
///
/// The tolerance absorbs fees burned by dust-filtered internal transfers
/// (which never enter the ledger but do leave the chain balance) and
/// entries still awaiting a price.
fn balances_match(calculated: f64, onchain: f64) -> bool {
    (calculated - onchain).abs() <= constants::BALANCE_MATCH_TOLERANCE_LTC
}

/// Print the end-of-run console summary, including the balance cross-check
/// against the explorer's view when every balance fetch succeeded.
pub fn print_summary(
    summary: &Summary,
    entries: &[LedgerEntry],
    onchain_balance: Option<f64>,
    currency: &str,
) {
    println!("\n=======================================================");
    println!("                      SUMMARY");
    println!("=======================================================");
    println!("  Balance (calculated): {:>12.4} LTC", summary.balance_ltc);

    match onchain_balance {
        Some(api_balance) => {
            println!("  Balance (on-chain):   {:>12.4} LTC", api_balance);
            if balances_match(summary.balance_ltc, api_balance) {
                println!("  Balances match");
            } else {
                let diff = (summary.balance_ltc - api_balance).abs();
                println!("  Warning: balances differ by {:.8} LTC", diff);
            }
        }
        None => println!("  Balance (on-chain):   unavailable"),
    }

    println!();
    println!(
        "  Avg Cost Basis:       {:>12.2} {}",
        summary.avg_cost_basis, currency
    );
    println!(
        "  Target Sell ({}%):    {:>12.2} {}",
        summary.target_profit_pct, summary.target_sell_price, currency
    );

    if let Some(price) = summary.current_price {
        println!("  Current Price:        {:>12.2} {}", price, currency);
        if let Some(value) = summary.current_value {
            println!("  Portfolio Value:      {:>12.2} {}", value, currency);
        }
        if let (Some(pl), Some(pct)) = (summary.unrealized_pl, summary.unrealized_pl_pct) {
            let sign = if pl >= 0.0 { "+" } else { "" };
            println!(
                "  Unrealized P/L:       {}{:.2} {} ({}{:.2}%)",
                sign, pl, currency, sign, pct
            );
        }

        if summary.balance_ltc > 0.0 {
            println!();
            if price >= summary.target_sell_price {
                println!(
                    "  Target reached: selling now meets the {}% goal",
                    summary.target_profit_pct
                );
            } else {
                let gap = summary.target_sell_price - price;
                println!(
                    "  {:.2} {} below target ({:.1}% needed)",
                    gap,
                    currency,
                    gap / price * 100.0
                );
            }
        }
    } else {
        println!("  Current Price:        unavailable");
    }

    let unpriced = entries.iter().filter(|e| e.unit_price.is_none()).count();
    if unpriced > 0 {
        println!(
            "\n  {} entr{} awaiting prices (retried next run)",
            unpriced,
            if unpriced == 1 { "y" } else { "ies" }
        );
    }

    println!("=======================================================");
}
