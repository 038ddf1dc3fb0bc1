//! # Contract Configuration & Constants
//!
//! Every tunable number the contracts care about lives here. The node reads
//! the same values for its CLI defaults, so changing one here changes both.

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Version of the contract semantics. Bumped whenever a state transition
/// changes meaning, which also invalidates older snapshots.
pub const CONTRACTS_VERSION: &str = "0.1.0";

/// Snapshot format version written into every persisted state file.
pub const SNAPSHOT_FORMAT_VERSION: u16 = 1;

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Default ledger address of the vesting vault. The vault is just another
/// account in each token ledger; this is the name its custody balance lives
/// under unless the operator configures a different one.
pub const DEFAULT_VAULT_ADDRESS: &str = "vault";

// ---------------------------------------------------------------------------
// Token Metadata Limits
// ---------------------------------------------------------------------------

/// Decimals used when a deployer does not specify any. 18 matches the
/// usual fungible-token convention, so `100 * 10^18` is "100 tokens".
pub const DEFAULT_DECIMALS: u8 = 18;

/// Upper bound on token precision. `10^18` leaves plenty of headroom in a
/// `u128` for realistic supplies.
pub const MAX_DECIMALS: u8 = 18;

/// Maximum token name length in bytes.
pub const MAX_NAME_LENGTH: usize = 64;

/// Maximum token symbol length in bytes.
pub const MAX_SYMBOL_LENGTH: usize = 12;

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// File name of the JSON state snapshot inside the node data directory.
pub const SNAPSHOT_FILE_NAME: &str = "state.json";
