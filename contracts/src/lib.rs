// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Grant Vault Contracts
//!
//! A fungible-token ledger and a time-locked grant vault that escrows tokens
//! for a recipient until an unlock time.
//!
//! - **ledger**: balances, allowances, owner-gated minting for one asset.
//! - **vesting_vault**: one grant per recipient, funded through the
//!   ledger's allowance path, released on claim after the unlock time.
//! - **runtime**: hosts every ledger and the vault behind one lock, so each
//!   operation applies completely or not at all.
//! - **clock**, **events**, **error**, **types**, **config**: the shared
//!   collaborators and vocabulary.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow. Amounts are `u128` and
//!    never wrap.
//! 2. Preconditions first, writes last. A rejected call changes nothing and
//!    emits nothing.
//! 3. The caller is always an explicit argument; authorization is an
//!    identity comparison against the recorded owner or grantor.
//! 4. Every public type is serializable (serde) for wire transport and
//!    snapshots.

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod runtime;
pub mod types;
pub mod vesting_vault;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ErrorKind;
pub use events::{Emitter, Event, EventSink, Log};
pub use ledger::{Ledger, LedgerError, TokenLedger, TokenMetadata};
pub use runtime::{EventHook, Receipt, Runtime, RuntimeError, Snapshot, SnapshotError, TokenInfo};
pub use types::{Address, Amount, AssetId, Timestamp};
pub use vesting_vault::{Grant, VaultError, VestingVault};
