//! # Contract Runtime
//!
//! Hosts every token ledger and the vesting vault behind one global lock
//! and executes operations one at a time, the way a chain applies
//! transactions in block order.
//!
//! ## Execution model
//!
//! 1. Take the state lock.
//! 2. Read the clock (inside the lock, so unlock checks see call-time "now").
//! 3. Run the operation against a fresh event buffer.
//! 4. On success, number the commit, pass the [`Receipt`] to the event hook
//!    and hand it back. On failure, drop the buffer.
//!
//! Every contract checks all of its preconditions before its first write,
//! so a rejected operation leaves balances, allowances and grants exactly
//! as they were. No I/O happens under the lock: [`Runtime::snapshot`]
//! clones the state and persistence happens outside. The event hook runs
//! under the lock, so it observes receipts in commit order and must not
//! block.
//!
//! The vault's custody account only moves funds through vault operations.
//! Ledger calls that would spend from it, or grants paying into it, are
//! rejected with [`RuntimeError::VaultAccount`].

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::{MAX_DECIMALS, MAX_NAME_LENGTH, MAX_SYMBOL_LENGTH, SNAPSHOT_FORMAT_VERSION};
use crate::error::ErrorKind;
use crate::events::Log;
use crate::ledger::{Ledger, LedgerError, TokenLedger, TokenMetadata};
use crate::types::{amount_string, Address, Amount, AssetId, Timestamp};
use crate::vesting_vault::{Grant, VaultError, VestingVault};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by runtime operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// No token is deployed under this asset ID.
    #[error("unknown asset: {0}")]
    UnknownAsset(AssetId),

    /// A token with this symbol is already deployed.
    #[error("duplicate symbol: a token with symbol '{0}' already exists")]
    DuplicateSymbol(String),

    /// Name, symbol or decimals out of bounds.
    #[error("invalid token metadata: {0}")]
    InvalidTokenMetadata(String),

    /// The vault custody account cannot act through the ledger directly.
    #[error("unauthorized: {0} is the vault custody account")]
    VaultAccount(Address),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::UnknownAsset(_) => ErrorKind::UnknownAsset,
            RuntimeError::DuplicateSymbol(_) => ErrorKind::DuplicateSymbol,
            RuntimeError::InvalidTokenMetadata(_) => ErrorKind::InvalidTokenMetadata,
            RuntimeError::VaultAccount(_) => ErrorKind::Unauthorized,
            RuntimeError::Ledger(e) => e.kind(),
            RuntimeError::Vault(e) => e.kind(),
        }
    }
}

/// Errors restoring a runtime from a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("unsupported snapshot format {found}, expected {expected}")]
    UnsupportedFormat { found: u16, expected: u16 },

    #[error("snapshot state is inconsistent: {0}")]
    Inconsistent(String),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything the lock protects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldState {
    tokens: BTreeMap<AssetId, Ledger>,
    vault: VestingVault,
    /// Number of committed operations.
    #[serde(default)]
    committed: u64,
}

impl WorldState {
    fn new(vault_address: impl Into<Address>) -> Self {
        Self {
            tokens: BTreeMap::new(),
            vault: VestingVault::new(vault_address),
            committed: 0,
        }
    }

    /// Rejects `account` if it is the vault custody account.
    fn not_vault(&self, account: &str) -> Result<(), RuntimeError> {
        if account == self.vault.address() {
            return Err(RuntimeError::VaultAccount(account.to_string()));
        }
        Ok(())
    }

    fn token(&self, asset: &str) -> Result<&Ledger, RuntimeError> {
        self.tokens
            .get(asset)
            .ok_or_else(|| RuntimeError::UnknownAsset(asset.to_string()))
    }

    fn token_mut(&mut self, asset: &str) -> Result<&mut Ledger, RuntimeError> {
        self.tokens
            .get_mut(asset)
            .ok_or_else(|| RuntimeError::UnknownAsset(asset.to_string()))
    }

    /// First violated invariant, if any: per-ledger conservation, and vault
    /// custody covering every active grant.
    fn audit(&self) -> Option<String> {
        for (id, ledger) in &self.tokens {
            if ledger.sum_of_balances() != Some(ledger.total_supply()) {
                return Some(format!("balances of {} do not sum to total supply", id));
            }
            let custody = ledger.balance_of(self.vault.address());
            let escrowed = self.vault.total_escrowed(id);
            if custody < escrowed {
                return Some(format!(
                    "vault holds {} of {} but grants escrow {}",
                    custody, id, escrowed
                ));
            }
        }
        None
    }
}

/// Events committed by one successful operation, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Position of this commit in the runtime's history, starting at 1.
    pub sequence: u64,
    /// Clock reading the operation executed at.
    pub timestamp: Timestamp,
    pub events: Vec<Log>,
}

/// Read-only view of a deployed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub asset_id: AssetId,
    #[serde(flatten)]
    pub metadata: TokenMetadata,
    #[serde(with = "amount_string")]
    pub total_supply: Amount,
    pub holders: usize,
}

/// A point-in-time copy of the runtime state, suitable for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u16,
    pub taken_at: Timestamp,
    pub state: WorldState,
}

impl Snapshot {
    /// Vault custody account recorded in the snapshot.
    pub fn vault_address(&self) -> &str {
        self.state.vault.address()
    }

    /// First invariant the captured state violates, if any.
    pub fn audit(&self) -> Option<String> {
        self.state.audit()
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Called with every committed receipt while the state lock is held.
pub type EventHook = Box<dyn Fn(&Receipt) + Send + Sync>;

/// Serialized executor for ledger and vault operations.
///
/// Cheap to share: wrap in an `Arc` and call from any thread.
pub struct Runtime {
    state: Mutex<WorldState>,
    clock: Arc<dyn Clock>,
    hook: Option<EventHook>,
}

impl Runtime {
    /// Creates an empty runtime. The vault's custody account is `vault_address`.
    pub fn new(vault_address: impl Into<Address>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(WorldState::new(vault_address)),
            clock,
            hook: None,
        }
    }

    /// Installs a hook that sees every committed receipt in commit order.
    pub fn with_event_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Receipt) + Send + Sync + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Restores a runtime from a snapshot, rejecting unknown formats and
    /// states that break an invariant.
    pub fn from_snapshot(snapshot: Snapshot, clock: Arc<dyn Clock>) -> Result<Self, SnapshotError> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedFormat {
                found: snapshot.format_version,
                expected: SNAPSHOT_FORMAT_VERSION,
            });
        }
        if let Some(violation) = snapshot.state.audit() {
            return Err(SnapshotError::Inconsistent(violation));
        }
        info!(
            tokens = snapshot.state.tokens.len(),
            grants = snapshot.state.vault.grant_count(),
            taken_at = snapshot.taken_at,
            committed = snapshot.state.committed,
            "runtime restored from snapshot"
        );
        Ok(Self {
            state: Mutex::new(snapshot.state),
            clock,
            hook: None,
        })
    }

    /// Copies the current state. The lock is held only for the clone.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.lock().clone();
        Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            taken_at: self.clock.now(),
            state,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn vault_address(&self) -> Address {
        self.state.lock().vault.address().to_string()
    }

    /// Runs `op` under the state lock and turns its buffered events into a
    /// receipt if it succeeds.
    fn execute<F>(&self, name: &'static str, caller: &str, op: F) -> Result<Receipt, RuntimeError>
    where
        F: FnOnce(&mut WorldState, Timestamp, &mut Vec<Log>) -> Result<(), RuntimeError>,
    {
        let mut state = self.state.lock();
        let now = self.clock.now();
        let mut events = Vec::new();

        match op(&mut *state, now, &mut events) {
            Ok(()) => {
                state.committed += 1;
                let receipt = Receipt {
                    sequence: state.committed,
                    timestamp: now,
                    events,
                };
                debug!(
                    op = name,
                    caller,
                    sequence = receipt.sequence,
                    events = receipt.events.len(),
                    now,
                    "operation committed"
                );
                if let Some(hook) = &self.hook {
                    hook(&receipt);
                }
                Ok(receipt)
            }
            Err(e) => {
                debug!(op = name, caller, kind = %e.kind(), error = %e, "operation rejected");
                Err(e)
            }
        }
    }

    // -- Token lifecycle ----------------------------------------------------

    /// Deploys a new token owned by `caller` and returns its asset ID.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidTokenMetadata`] if the name or symbol
    /// is empty or too long, or `decimals` exceeds the maximum.
    /// Returns [`RuntimeError::DuplicateSymbol`] if the symbol is taken.
    pub fn deploy_token(
        &self,
        caller: &str,
        name: &str,
        symbol: &str,
        decimals: u8,
    ) -> Result<AssetId, RuntimeError> {
        if name.is_empty() || name.len() > MAX_NAME_LENGTH {
            return Err(RuntimeError::InvalidTokenMetadata(format!(
                "name must be 1..={} bytes",
                MAX_NAME_LENGTH
            )));
        }
        if symbol.is_empty() || symbol.len() > MAX_SYMBOL_LENGTH {
            return Err(RuntimeError::InvalidTokenMetadata(format!(
                "symbol must be 1..={} bytes",
                MAX_SYMBOL_LENGTH
            )));
        }
        if decimals > MAX_DECIMALS {
            return Err(RuntimeError::InvalidTokenMetadata(format!(
                "decimals must be at most {}",
                MAX_DECIMALS
            )));
        }

        let symbol_upper = symbol.to_uppercase();
        let mut state = self.state.lock();
        if state
            .tokens
            .values()
            .any(|l| l.metadata().symbol == symbol_upper)
        {
            return Err(RuntimeError::DuplicateSymbol(symbol.to_string()));
        }

        let asset_id = Uuid::new_v4().to_string();
        let metadata = TokenMetadata {
            name: name.to_string(),
            symbol: symbol_upper,
            decimals,
            owner: caller.to_string(),
        };
        state
            .tokens
            .insert(asset_id.clone(), Ledger::new(asset_id.clone(), metadata));

        info!(asset = %asset_id, symbol, owner = caller, "token deployed");
        Ok(asset_id)
    }

    // -- Ledger operations --------------------------------------------------

    pub fn mint(
        &self,
        caller: &str,
        asset: &str,
        to: &str,
        amount: Amount,
    ) -> Result<Receipt, RuntimeError> {
        self.execute("mint", caller, |state, _, events| {
            state.token_mut(asset)?.mint(caller, to, amount, events)?;
            Ok(())
        })
    }

    pub fn transfer(
        &self,
        caller: &str,
        asset: &str,
        to: &str,
        amount: Amount,
    ) -> Result<Receipt, RuntimeError> {
        self.execute("transfer", caller, |state, _, events| {
            state.not_vault(caller)?;
            state.token_mut(asset)?.transfer(caller, to, amount, events)?;
            Ok(())
        })
    }

    pub fn approve(
        &self,
        caller: &str,
        asset: &str,
        spender: &str,
        amount: Amount,
    ) -> Result<Receipt, RuntimeError> {
        self.execute("approve", caller, |state, _, events| {
            state.not_vault(caller)?;
            state.token_mut(asset)?.approve(caller, spender, amount, events);
            Ok(())
        })
    }

    pub fn transfer_from(
        &self,
        caller: &str,
        asset: &str,
        owner: &str,
        to: &str,
        amount: Amount,
    ) -> Result<Receipt, RuntimeError> {
        self.execute("transfer_from", caller, |state, _, events| {
            state.not_vault(caller)?;
            state.not_vault(owner)?;
            state
                .token_mut(asset)?
                .transfer_from(caller, owner, to, amount, events)?;
            Ok(())
        })
    }

    // -- Vault operations ---------------------------------------------------

    pub fn add_grant(
        &self,
        caller: &str,
        asset: &str,
        recipient: &str,
        amount: Amount,
        unlock_time: Timestamp,
    ) -> Result<Receipt, RuntimeError> {
        self.execute("add_grant", caller, |state, now, events| {
            state.not_vault(caller)?;
            state.not_vault(recipient)?;
            let WorldState { tokens, vault, .. } = state;
            let token = tokens
                .get_mut(asset)
                .ok_or_else(|| RuntimeError::UnknownAsset(asset.to_string()))?;
            vault.add_grant(caller, token, recipient, amount, unlock_time, now, events)?;
            Ok(())
        })
    }

    pub fn decrease_lock_time(
        &self,
        caller: &str,
        recipient: &str,
        new_unlock_time: Timestamp,
    ) -> Result<Receipt, RuntimeError> {
        self.execute("decrease_lock_time", caller, |state, _, events| {
            state
                .vault
                .decrease_lock_time(caller, recipient, new_unlock_time, events)?;
            Ok(())
        })
    }

    pub fn remove_grant(&self, caller: &str, recipient: &str) -> Result<Receipt, RuntimeError> {
        self.execute("remove_grant", caller, |state, _, events| {
            let WorldState { tokens, vault, .. } = state;
            let asset = vault
                .grant(recipient)
                .map(|g| g.asset.clone())
                .ok_or_else(|| VaultError::NoSuchGrant(recipient.to_string()))?;
            let token = tokens
                .get_mut(&asset)
                .ok_or(RuntimeError::UnknownAsset(asset))?;
            vault.remove_grant(caller, token, recipient, events)?;
            Ok(())
        })
    }

    /// Claims the caller's grant funded by `grantor`. The unlock check uses
    /// the clock reading taken under the lock.
    pub fn claim_grant(&self, caller: &str, grantor: &str) -> Result<Receipt, RuntimeError> {
        self.execute("claim_grant", caller, |state, now, events| {
            let WorldState { tokens, vault, .. } = state;
            let asset = vault
                .grant(caller)
                .filter(|g| g.grantor == grantor)
                .map(|g| g.asset.clone())
                .ok_or_else(|| VaultError::NoSuchGrant(caller.to_string()))?;
            let token = tokens
                .get_mut(&asset)
                .ok_or(RuntimeError::UnknownAsset(asset))?;
            vault.claim_grant(caller, token, grantor, now, events)?;
            Ok(())
        })
    }

    // -- Reads --------------------------------------------------------------

    pub fn token_info(&self, asset: &str) -> Result<TokenInfo, RuntimeError> {
        let state = self.state.lock();
        let ledger = state.token(asset)?;
        Ok(TokenInfo {
            asset_id: asset.to_string(),
            metadata: ledger.metadata().clone(),
            total_supply: ledger.total_supply(),
            holders: ledger.holder_count(),
        })
    }

    pub fn balance_of(&self, asset: &str, account: &str) -> Result<Amount, RuntimeError> {
        Ok(self.state.lock().token(asset)?.balance_of(account))
    }

    pub fn allowance(
        &self,
        asset: &str,
        owner: &str,
        spender: &str,
    ) -> Result<Amount, RuntimeError> {
        Ok(self.state.lock().token(asset)?.allowance(owner, spender))
    }

    pub fn total_supply(&self, asset: &str) -> Result<Amount, RuntimeError> {
        Ok(self.state.lock().token(asset)?.total_supply())
    }

    pub fn grant(&self, recipient: &str) -> Option<Grant> {
        self.state.lock().vault.grant(recipient).cloned()
    }

    pub fn grants_by_grantor(&self, grantor: &str) -> Vec<(Address, Grant)> {
        self.state
            .lock()
            .vault
            .grants_by_grantor(grantor)
            .map(|(r, g)| (r.clone(), g.clone()))
            .collect()
    }

    pub fn token_count(&self) -> usize {
        self.state.lock().tokens.len()
    }

    pub fn grant_count(&self) -> usize {
        self.state.lock().vault.grant_count()
    }

    /// Re-derives the global invariants. `None` means consistent.
    pub fn audit(&self) -> Option<String> {
        self.state.lock().audit()
    }
}
