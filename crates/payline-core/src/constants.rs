//! Workspace-wide tuning constants.

// ── Clearing-node transport ──────────────────────────────────────────────────

pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_INITIAL_RECONNECT_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_RECONNECT_DELAY_MS: u64 = 30_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

// ── Caches ───────────────────────────────────────────────────────────────────

/// Derived-address cache, per user.
pub const ADDRESS_CACHE_TTL_SECS: u64 = 60;
/// Portfolio/balance cache, per (address, chain).
pub const BALANCE_CACHE_TTL_SECS: u64 = 30;
/// Transaction-history cache, per (address, chain).
pub const TRANSACTION_CACHE_TTL_SECS: u64 = 60;

// ── Indexer ──────────────────────────────────────────────────────────────────

pub const INDEXER_TIMEOUT_SECS: u64 = 10;
/// Total attempts for 5xx / transport failures (first try + retries).
pub const INDEXER_MAX_ATTEMPTS: u32 = 3;
pub const INDEXER_RETRY_BASE_DELAY_MS: u64 = 250;

// ── Sessions / channels ──────────────────────────────────────────────────────

pub const DEFAULT_SESSION_PROTOCOL: &str = "NitroRPC/0.4";
pub const DEFAULT_SESSION_CHALLENGE_SECS: u64 = 3_600;

// ── Aggregator ───────────────────────────────────────────────────────────────

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
/// `decimals()` replies outside 0..=36 are treated as garbage.
pub const MAX_TOKEN_DECIMALS: u8 = 36;
pub const FALLBACK_TOKEN_DECIMALS: u8 = 18;
