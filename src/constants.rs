//! Centralized constants for the cost basis tracker
//!
//! Universal values only; per-user settings (addresses, target profit)
//! live in config.toml.

// =============================================================================
// API Endpoints
// =============================================================================

/// BlockCypher Litecoin mainnet base URL
pub const BLOCKCYPHER_API_BASE: &str = "https://api.blockcypher.com/v1/ltc/main";

/// CryptoCompare price API base URL
pub const CRYPTOCOMPARE_API_BASE: &str = "https://min-api.cryptocompare.com/data";

// =============================================================================
// Litecoin Units
// =============================================================================

/// Litoshis per LTC (BlockCypher reports values in litoshis)
pub const LITOSHIS_PER_LTC: f64 = 100_000_000.0;

/// Minimum absolute net amount for a transaction to be ledgered (litoshis).
/// Filters out fee residue from transfers between our own addresses.
pub const DUST_THRESHOLD_LITOSHIS: i64 = 1_000; // 0.00001 LTC

// =============================================================================
// File Names
// =============================================================================

/// Ledger database filename (inside the data directory)
pub const DB_FILENAME: &str = "tracker.sqlite";

/// Config filename (inside the data directory)
pub const CONFIG_FILENAME: &str = "config.toml";

/// Ledger CSV filename
pub const LEDGER_CSV_FILENAME: &str = "ledger.csv";

/// Summary CSV filename
pub const SUMMARY_CSV_FILENAME: &str = "summary.csv";

// =============================================================================
// Rate Limiting & Timeouts
// =============================================================================

/// Delay between BlockCypher requests (ms) - free tier throughput limit
pub const EXPLORER_DELAY_MS: u64 = 500;

/// Delay between CryptoCompare requests (ms)
pub const ORACLE_DELAY_MS: u64 = 300;

/// Per-request timeout for BlockCypher calls (secs)
pub const EXPLORER_TIMEOUT_SECS: u64 = 20;

/// Per-request timeout for CryptoCompare calls (secs)
pub const ORACLE_TIMEOUT_SECS: u64 = 15;

/// Transactions per BlockCypher page
pub const EXPLORER_PAGE_LIMIT: usize = 50;

/// Default per-address fetch cap on a first run (0 = unlimited)
pub const DEFAULT_MAX_TXS_PER_ADDRESS: usize = 500;

// =============================================================================
// Thresholds
// =============================================================================

/// Maximum difference between calculated and on-chain balance before the
/// cross-check reports a mismatch. Deliberately loose: dust-filtered
/// internal transfers still burn their fee on-chain, and unpriced entries
/// are excluded from the calculated balance, so small drift is expected.
pub const BALANCE_MATCH_TOLERANCE_LTC: f64 = 0.01;
