//! # Token Ledger Contract
//!
//! A single fungible asset: per-account balances, per-(owner, spender)
//! allowances, and owner-gated minting.
//!
//! ## Invariants
//!
//! - **Conservation**: the sum of all balances equals `total_supply`, which
//!   only grows through [`Ledger::mint`]. There is no burn.
//! - **Atomic moves**: every precondition (balance, allowance, credit
//!   overflow) is checked before the first write, so a rejected call leaves
//!   the ledger byte-for-byte unchanged.
//! - **Allowances** are overwritten by `approve` and decremented by exactly
//!   the amount moved on each `transfer_from`. They never go negative.
//!
//! Other contracts move tokens through the [`TokenLedger`] trait and never
//! touch the tables directly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::events::{Emitter, Event, EventSink};
use crate::types::{Address, Amount, AssetId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The debited account holds less than the requested amount.
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Current balance of the debited account.
        available: Amount,
        /// Amount the caller tried to move.
        requested: Amount,
    },

    /// The spender's allowance is below the requested amount.
    #[error("insufficient allowance: allowed {allowed}, requested {requested}")]
    InsufficientAllowance {
        /// Remaining allowance for (owner, spender).
        allowed: Amount,
        /// Amount the spender tried to move.
        requested: Amount,
    },

    /// A credit would exceed `u128::MAX`.
    #[error("amount overflow")]
    Overflow,

    /// The caller is not allowed to perform this operation.
    #[error("unauthorized: {caller} is not the token owner")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
    },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            LedgerError::InsufficientAllowance { .. } => ErrorKind::InsufficientAllowance,
            LedgerError::Overflow => ErrorKind::Overflow,
            LedgerError::Unauthorized { .. } => ErrorKind::Unauthorized,
        }
    }
}

// ---------------------------------------------------------------------------
// Transfer contract
// ---------------------------------------------------------------------------

/// The token-moving surface other contracts are allowed to depend on.
pub trait TokenLedger {
    /// Identifier of the asset this ledger tracks.
    fn asset_id(&self) -> &AssetId;

    /// Moves `amount` from `caller` to `to`.
    fn transfer(
        &mut self,
        caller: &str,
        to: &str,
        amount: Amount,
        events: &mut dyn EventSink,
    ) -> Result<(), LedgerError>;

    /// Moves `amount` from `owner` to `to` on behalf of `spender`, consuming
    /// allowance.
    fn transfer_from(
        &mut self,
        spender: &str,
        owner: &str,
        to: &str,
        amount: Amount,
        events: &mut dyn EventSink,
    ) -> Result<(), LedgerError>;
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Descriptive metadata for a deployed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Human-readable name (e.g., "Grant Token").
    pub name: String,
    /// Ticker symbol, stored upper-case.
    pub symbol: String,
    /// Number of decimal places.
    pub decimals: u8,
    /// Deployer; the only identity allowed to mint.
    pub owner: Address,
}

/// Balance and allowance tables for one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    asset_id: AssetId,
    metadata: TokenMetadata,
    total_supply: Amount,
    balances: HashMap<Address, Amount>,
    /// `owner -> (spender -> allowance)`.
    allowances: HashMap<Address, HashMap<Address, Amount>>,
}

impl Ledger {
    /// Creates an empty ledger. Supply starts at zero; the owner mints it.
    pub fn new(asset_id: AssetId, metadata: TokenMetadata) -> Self {
        Self {
            asset_id,
            metadata,
            total_supply: 0,
            balances: HashMap::new(),
            allowances: HashMap::new(),
        }
    }

    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Returns the balance of `account`, or 0.
    pub fn balance_of(&self, account: &str) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Returns how much `spender` may still move on behalf of `owner`.
    pub fn allowance(&self, owner: &str, spender: &str) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|s| s.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Number of accounts with a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.values().filter(|b| **b > 0).count()
    }

    /// Sum of every balance, checked. Equal to [`total_supply`](Self::total_supply)
    /// whenever the ledger is consistent.
    pub fn sum_of_balances(&self) -> Option<Amount> {
        self.balances
            .values()
            .try_fold(0u128, |acc, b| acc.checked_add(*b))
    }

    /// Mints `amount` new tokens to `account`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] if `caller` is not the owner.
    /// Returns [`LedgerError::Overflow`] if the supply or the balance would
    /// overflow.
    pub fn mint(
        &mut self,
        caller: &str,
        account: &str,
        amount: Amount,
        events: &mut dyn EventSink,
    ) -> Result<(), LedgerError> {
        if caller != self.metadata.owner {
            return Err(LedgerError::Unauthorized {
                caller: caller.to_string(),
            });
        }

        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        // Supply bounds every balance; unreachable once the supply check passed.
        let new_balance = self
            .balance_of(account)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;

        self.total_supply = new_supply;
        self.balances.insert(account.to_string(), new_balance);

        events.emit(
            self.emitter(),
            Event::Transfer {
                from: None,
                to: account.to_string(),
                amount,
            },
        );
        Ok(())
    }

    /// Sets the allowance of `spender` over `owner`'s tokens to exactly
    /// `amount`, replacing any previous value.
    pub fn approve(
        &mut self,
        owner: &str,
        spender: &str,
        amount: Amount,
        events: &mut dyn EventSink,
    ) {
        self.allowances
            .entry(owner.to_string())
            .or_default()
            .insert(spender.to_string(), amount);

        events.emit(
            self.emitter(),
            Event::Approval {
                owner: owner.to_string(),
                spender: spender.to_string(),
                amount,
            },
        );
    }

    fn emitter(&self) -> Emitter {
        Emitter::Token(self.asset_id.clone())
    }

    /// Debits `from` and credits `to` after validating both sides.
    fn move_balance(&mut self, from: &str, to: &str, amount: Amount) -> Result<(), LedgerError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                available,
                requested: amount,
            });
        }

        if from == to {
            return Ok(());
        }

        let new_to = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;

        self.balances.insert(from.to_string(), available - amount);
        self.balances.insert(to.to_string(), new_to);
        Ok(())
    }
}

impl TokenLedger for Ledger {
    fn asset_id(&self) -> &AssetId {
        &self.asset_id
    }

    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientBalance`] if `caller` holds less
    /// than `amount`.
    fn transfer(
        &mut self,
        caller: &str,
        to: &str,
        amount: Amount,
        events: &mut dyn EventSink,
    ) -> Result<(), LedgerError> {
        self.move_balance(caller, to, amount)?;

        events.emit(
            self.emitter(),
            Event::Transfer {
                from: Some(caller.to_string()),
                to: to.to_string(),
                amount,
            },
        );
        Ok(())
    }

    /// The allowance is checked before the balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientAllowance`] if the allowance of
    /// `spender` over `owner` is below `amount`.
    /// Returns [`LedgerError::InsufficientBalance`] if `owner` holds less
    /// than `amount`.
    fn transfer_from(
        &mut self,
        spender: &str,
        owner: &str,
        to: &str,
        amount: Amount,
        events: &mut dyn EventSink,
    ) -> Result<(), LedgerError> {
        let allowed = self.allowance(owner, spender);
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance {
                allowed,
                requested: amount,
            });
        }

        self.move_balance(owner, to, amount)?;

        self.allowances
            .entry(owner.to_string())
            .or_default()
            .insert(spender.to_string(), allowed - amount);

        events.emit(
            self.emitter(),
            Event::Transfer {
                from: Some(owner.to_string()),
                to: to.to_string(),
                amount,
            },
        );
        Ok(())
    }
}
