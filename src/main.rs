//! LTC Cost Basis Tracker
//!
//! Reconstructs a personal Litecoin ledger from explorer transaction
//! history, prices each entry on its transaction date, and reports the
//! weighted-average cost basis with a target sell price.

mod config;
mod constants;
mod explorer;
mod ledger;
mod prices;
mod report;
mod store;
mod summary;
mod sync;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use config::{Config, FileConfig};
use explorer::{ExplorerClient, RawTransaction};
use prices::{PriceCache, PriceClient};
use store::Store;

#[derive(Parser, Debug)]
#[command(name = "ltc-tracker")]
#[command(about = "Weighted-average cost basis tracking for Litecoin addresses")]
struct Args {
    /// Data directory for config.toml and the ledger database
    #[arg(short, long, default_value = "./data", global = true)]
    data_dir: PathBuf,

    /// Output directory for generated CSV reports
    #[arg(short, long, default_value = "./output", global = true)]
    output_dir: PathBuf,

    /// Fetch full history (disables the per-address transaction cap)
    #[arg(long)]
    full: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Delete the persisted ledger, cursor, and summary
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let db_path = args.data_dir.join(constants::DB_FILENAME);

    if let Some(Command::Reset) = args.command {
        if store::delete_database(&db_path)? {
            println!("Deleted {}", db_path.display());
            println!("Run again to start fresh.");
        } else {
            println!("Nothing to reset ({} not found)", db_path.display());
        }
        return Ok(());
    }

    // Config errors are fatal before any network activity begins
    let config = load_config(&args.data_dir)?;

    std::fs::create_dir_all(&args.data_dir)?;
    std::fs::create_dir_all(&args.output_dir)?;

    let store = Store::open(&db_path).await?;

    run_sync(args, config, store).await
}

/// Load and validate config.toml, with a helpful message when it's missing
fn load_config(data_dir: &Path) -> Result<Config> {
    let path = data_dir.join(constants::CONFIG_FILENAME);

    if !path.exists() {
        anyhow::bail!(
            "Config file '{}' not found.\n\n\
            To get started, create it with your LTC addresses:\n\n\
            addresses = [\"ltc1q...\"]\n\
            target_profit_percent = 3.0   # optional\n\
            currency = \"usd\"              # optional\n",
            path.display()
        );
    }

    let file_config = FileConfig::load(&path)?;
    Config::from_file(&file_config)
}

/// Run the full sync pipeline: fetch, normalize, merge, backfill prices,
/// summarize, persist, report.
async fn run_sync(args: Args, config: Config, store: Store) -> Result<()> {
    println!("LTC Cost Basis Tracker");
    println!("======================\n");
    println!(
        "Tracking {} address(es), target profit {}%, currency {}\n",
        config.addresses.len(),
        config.target_profit_percent,
        config.currency.to_uppercase()
    );

    let stats = store.stats().await?;
    if stats.entries > 0 {
        println!("Ledger: {}\n", stats);
    }

    let mut ledger = store.load_ledger().await?;
    let mut cursor = store.load_cursor().await?;
    let is_first_run = cursor.highest_block_seen.is_none();

    let max_txs = if args.full {
        println!("Full sync mode: fetching all transactions (no per-address cap)\n");
        0
    } else {
        config.max_txs_per_address
    };

    // Step 1: Fetch raw transactions and balances per address
    println!("Syncing transactions...");
    let explorer = ExplorerClient::new()?;
    let after_block = cursor.fetch_lower_bound();

    let mut all_raw: Vec<RawTransaction> = Vec::new();
    let mut onchain_balance = 0.0;
    let mut balances_complete = true;

    for addr in &config.addresses {
        println!("  {}", short_address(addr));

        match explorer.balance(addr).await {
            Ok((balance, n_tx)) => {
                onchain_balance += balance;
                println!("    Balance: {:.8} LTC ({} txs on-chain)", balance, n_tx);
                if is_first_run && max_txs > 0 && n_tx as usize > max_txs {
                    println!(
                        "    Warning: {} transactions on-chain, fetching the most recent {} only",
                        n_tx, max_txs
                    );
                    println!("    History may be truncated; re-run with --full to fetch everything");
                }
            }
            Err(e) => {
                eprintln!("    Warning: could not fetch balance: {}", e);
                balances_complete = false;
            }
        }

        match explorer.fetch_transactions(addr, after_block, max_txs).await {
            Ok(raw) => {
                if after_block.is_some() && raw.is_empty() {
                    println!("    No new transactions since last sync");
                } else {
                    println!("    Fetched {} transactions", raw.len());
                }
                if args.verbose {
                    for tx in &raw {
                        println!(
                            "      {} (block {})",
                            short_txid(&tx.hash),
                            tx.block_height.unwrap_or(-1)
                        );
                    }
                }
                all_raw.extend(raw);
            }
            Err(e) => {
                // One bad address never blocks ingestion for the others
                eprintln!("    Warning: fetch failed, skipping this run: {}", e);
            }
        }
    }

    // Step 2: Advance the cursor past everything we actually saw
    for tx in &all_raw {
        if let Some(height) = tx.block_height {
            if height > 0 {
                cursor.observe_block(height as u64);
            }
        }
    }

    // Step 3: Deduplicate, normalize, and merge into the ledger
    let batch = ledger::normalize_transactions(&all_raw, &config.addresses);
    let new_count = sync::merge_entries(&mut ledger, &mut cursor, batch);
    ledger.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    println!(
        "\n{} new ledger entr{}\n",
        new_count,
        if new_count == 1 { "y" } else { "ies" }
    );

    // Step 4: Backfill historical prices for unresolved dates
    println!("Backfilling historical prices...");
    let oracle = PriceClient::new(&config.currency)?;
    let mut price_cache = PriceCache::new();
    let priced = prices::backfill_prices(&mut ledger, &oracle, &mut price_cache).await;
    if priced > 0 {
        println!(
            "  Priced {} entr{}\n",
            priced,
            if priced == 1 { "y" } else { "ies" }
        );
    } else {
        println!("  All entries already priced\n");
    }

    // Step 5: Current price (feeds only the summary, never stored on entries)
    println!("Fetching current price...");
    let current_price = match oracle.current().await {
        Ok(price) => {
            println!("  {:.2} {}\n", price, oracle.currency());
            Some(price)
        }
        Err(e) => {
            eprintln!("  Warning: current price unavailable: {}\n", e);
            None
        }
    };

    // Step 6: Summarize and persist everything in one transaction
    let summary = summary::calculate_summary(&ledger, current_price, config.target_profit_percent);
    store.save_run(&ledger, &cursor, &summary).await?;

    // Step 7: Reports
    println!("Generating reports...");
    report::write_csv_reports(&args.output_dir, &ledger, &summary)?;
    report::print_summary(
        &summary,
        &ledger,
        balances_complete.then_some(onchain_balance),
        oracle.currency(),
    );

    println!("\nDone! Reports written to: {}", args.output_dir.display());

    Ok(())
}

/// First 16 characters of a txid for display. Char-based so a malformed
/// explorer response can never split a UTF-8 boundary.
fn short_txid(txid: &str) -> String {
    txid.chars().take(16).collect()
}

/// Shorten an address for display
fn short_address(addr: &str) -> String {
    if addr.len() <= 18 {
        addr.to_string()
    } else {
        format!("{}...{}", &addr[..10], &addr[addr.len() - 6..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_txid_handles_non_ascii() {
        assert_eq!(short_txid("abc123"), "abc123");
        assert_eq!(
            short_txid("0123456789abcdef0123456789abcdef"),
            "0123456789abcdef"
        );
        // Multi-byte chars right at the cut must not panic
        assert_eq!(short_txid("日本語のハッシュではないが長い文字列"), "日本語のハッシュではないが長い文");
    }

    #[test]
    fn test_short_address() {
        assert_eq!(short_address("Lshort"), "Lshort");
        assert_eq!(
            short_address("ltc1qw508d6qejxtdg4y5r3zarvary0c5xw7k"),
            "ltc1qw508d...c5xw7k"
        );
    }
}
