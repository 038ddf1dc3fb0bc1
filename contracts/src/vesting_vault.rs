//! # Vesting Vault Contract
//!
//! Escrows tokens for a recipient until a per-grant unlock time. The
//! lifecycle of a grant, keyed by recipient, is:
//!
//! 1. **Add**: the grantor approves the vault on the token ledger, then
//!    calls [`VestingVault::add_grant`]. The vault pulls the amount into its
//!    own ledger account via `transfer_from`.
//! 2. **Shorten**: the grantor may move the unlock time earlier with
//!    [`VestingVault::decrease_lock_time`]. Moving it later is rejected.
//! 3. **Remove**: the grantor cancels the grant. The escrowed amount goes
//!    back to the grantor and the record is deleted.
//! 4. **Claim**: at or after the unlock time the recipient claims. The
//!    amount goes to the recipient and the record is deleted.
//!
//! A recipient has at most one grant at a time. Removing or claiming frees
//! the slot for a fresh grant.
//!
//! Custody is plain ledger balance: the vault is an ordinary account named
//! [`VestingVault::address`] in each token ledger it holds grants for.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::events::{Emitter, Event, EventSink};
use crate::ledger::{LedgerError, TokenLedger};
use crate::types::{amount_string, Address, Amount, AssetId, Timestamp};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during vault operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// The recipient already has an active grant.
    #[error("grant already exists for recipient {0}")]
    GrantAlreadyExists(Address),

    /// No grant matches the lookup.
    #[error("no grant found for recipient {0}")]
    NoSuchGrant(Address),

    /// The grant's unlock time has not been reached.
    #[error("grant is locked until {unlock_time} (now {now})")]
    NotYetUnlocked {
        /// When the grant becomes claimable.
        unlock_time: Timestamp,
        /// Clock reading at the time of the call.
        now: Timestamp,
    },

    /// The caller is not the grantor of this grant.
    #[error("unauthorized: {caller} is not the grantor")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
    },

    /// `decrease_lock_time` was asked to push the unlock time later.
    #[error("unlock time can only decrease: current {current}, requested {requested}")]
    LockTimeIncrease {
        /// The grant's current unlock time.
        current: Timestamp,
        /// The later time that was requested.
        requested: Timestamp,
    },

    /// Grants must escrow a positive amount.
    #[error("grant amount must be greater than zero")]
    ZeroAmount,

    /// The ledger handed in does not track the grant's asset.
    #[error("asset mismatch: grant holds {expected}, ledger is {actual}")]
    AssetMismatch {
        /// Asset recorded on the grant.
        expected: AssetId,
        /// Asset of the ledger that was supplied.
        actual: AssetId,
    },

    /// The underlying token movement was rejected.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl VaultError {
    /// Ledger failures keep their own kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::GrantAlreadyExists(_) => ErrorKind::GrantAlreadyExists,
            VaultError::NoSuchGrant(_) => ErrorKind::NoSuchGrant,
            VaultError::NotYetUnlocked { .. } => ErrorKind::NotYetUnlocked,
            VaultError::Unauthorized { .. } => ErrorKind::Unauthorized,
            VaultError::LockTimeIncrease { .. } => ErrorKind::LockTimeIncrease,
            VaultError::ZeroAmount => ErrorKind::ZeroAmount,
            VaultError::AssetMismatch { .. } => ErrorKind::AssetMismatch,
            VaultError::Ledger(e) => e.kind(),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An escrowed, time-locked entitlement for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Asset held in escrow.
    pub asset: AssetId,
    /// Identity that funded the grant. Only it may shorten or remove it.
    pub grantor: Address,
    /// Escrowed amount. Always positive.
    #[serde(with = "amount_string")]
    pub amount: Amount,
    /// Earliest time at which the recipient may claim.
    pub unlock_time: Timestamp,
    /// Clock reading when the grant was added.
    pub created_at: Timestamp,
}

impl Grant {
    /// Claimable at or after the unlock time.
    pub fn is_unlocked(&self, now: Timestamp) -> bool {
        now >= self.unlock_time
    }
}

/// Grant records keyed by recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VestingVault {
    address: Address,
    grants: BTreeMap<Address, Grant>,
}

impl VestingVault {
    /// Creates an empty vault whose custody balance lives under `address`.
    pub fn new(address: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            grants: BTreeMap::new(),
        }
    }

    /// Ledger account holding the vault's custody balance.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The active grant for `recipient`, if any.
    pub fn grant(&self, recipient: &str) -> Option<&Grant> {
        self.grants.get(recipient)
    }

    /// Active grants funded by `grantor`, as `(recipient, grant)` pairs.
    pub fn grants_by_grantor<'a>(
        &'a self,
        grantor: &'a str,
    ) -> impl Iterator<Item = (&'a Address, &'a Grant)> + 'a {
        self.grants.iter().filter(move |(_, g)| g.grantor == grantor)
    }

    pub fn grant_count(&self) -> usize {
        self.grants.len()
    }

    /// Sum of active grant amounts in `asset`. Bounded by the vault's
    /// balance in that asset's ledger.
    pub fn total_escrowed(&self, asset: &str) -> Amount {
        self.grants
            .values()
            .filter(|g| g.asset == asset)
            .fold(0, |acc, g| acc.saturating_add(g.amount))
    }

    /// Creates a grant for `recipient`, pulling `amount` from the caller.
    ///
    /// The caller must have approved the vault for at least `amount` on
    /// `token` beforehand.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::GrantAlreadyExists`] if `recipient` already has
    /// a grant, whoever funded it.
    /// Returns [`VaultError::ZeroAmount`] if `amount` is zero.
    /// Returns [`VaultError::Ledger`] if the pull is rejected by the ledger.
    #[allow(clippy::too_many_arguments)]
    pub fn add_grant(
        &mut self,
        caller: &str,
        token: &mut dyn TokenLedger,
        recipient: &str,
        amount: Amount,
        unlock_time: Timestamp,
        now: Timestamp,
        events: &mut dyn EventSink,
    ) -> Result<(), VaultError> {
        if self.grants.contains_key(recipient) {
            return Err(VaultError::GrantAlreadyExists(recipient.to_string()));
        }
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }

        token.transfer_from(&self.address, caller, &self.address, amount, events)?;

        let asset = token.asset_id().clone();
        self.grants.insert(
            recipient.to_string(),
            Grant {
                asset: asset.clone(),
                grantor: caller.to_string(),
                amount,
                unlock_time,
                created_at: now,
            },
        );

        events.emit(
            Emitter::Vault,
            Event::GrantAdded {
                asset,
                recipient: recipient.to_string(),
                amount,
                unlock_time,
            },
        );
        Ok(())
    }

    /// Moves the unlock time of `recipient`'s grant to `new_unlock_time`.
    /// Setting the same time again is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NoSuchGrant`] if `recipient` has no grant.
    /// Returns [`VaultError::Unauthorized`] if the caller is not the grantor.
    /// Returns [`VaultError::LockTimeIncrease`] if the new time is later.
    pub fn decrease_lock_time(
        &mut self,
        caller: &str,
        recipient: &str,
        new_unlock_time: Timestamp,
        events: &mut dyn EventSink,
    ) -> Result<(), VaultError> {
        let grant = self
            .grants
            .get_mut(recipient)
            .ok_or_else(|| VaultError::NoSuchGrant(recipient.to_string()))?;
        ensure_grantor(grant, caller)?;

        let previous = grant.unlock_time;
        if new_unlock_time > previous {
            return Err(VaultError::LockTimeIncrease {
                current: previous,
                requested: new_unlock_time,
            });
        }

        grant.unlock_time = new_unlock_time;

        events.emit(
            Emitter::Vault,
            Event::GrantUnlockChanged {
                recipient: recipient.to_string(),
                previous_unlock_time: previous,
                new_unlock_time,
            },
        );
        Ok(())
    }

    /// Cancels `recipient`'s grant and returns the escrow to the grantor.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NoSuchGrant`] if `recipient` has no grant.
    /// Returns [`VaultError::Unauthorized`] if the caller is not the grantor.
    /// Returns [`VaultError::AssetMismatch`] if `token` is not the grant's asset.
    pub fn remove_grant(
        &mut self,
        caller: &str,
        token: &mut dyn TokenLedger,
        recipient: &str,
        events: &mut dyn EventSink,
    ) -> Result<(), VaultError> {
        let grant = self
            .grants
            .get(recipient)
            .ok_or_else(|| VaultError::NoSuchGrant(recipient.to_string()))?;
        ensure_grantor(grant, caller)?;
        ensure_asset(grant, token)?;

        let (grantor, amount) = (grant.grantor.clone(), grant.amount);
        token.transfer(&self.address, &grantor, amount, events)?;
        self.grants.remove(recipient);

        events.emit(
            Emitter::Vault,
            Event::GrantRemoved {
                recipient: recipient.to_string(),
            },
        );
        Ok(())
    }

    /// Pays out the caller's grant from `grantor` once it has unlocked.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NoSuchGrant`] if the caller has no grant, or its
    /// grant was funded by someone other than `grantor`.
    /// Returns [`VaultError::AssetMismatch`] if `token` is not the grant's asset.
    /// Returns [`VaultError::NotYetUnlocked`] if `now` is before the unlock time.
    pub fn claim_grant(
        &mut self,
        caller: &str,
        token: &mut dyn TokenLedger,
        grantor: &str,
        now: Timestamp,
        events: &mut dyn EventSink,
    ) -> Result<(), VaultError> {
        let grant = self
            .grants
            .get(caller)
            .filter(|g| g.grantor == grantor)
            .ok_or_else(|| VaultError::NoSuchGrant(caller.to_string()))?;
        ensure_asset(grant, token)?;
        if !grant.is_unlocked(now) {
            return Err(VaultError::NotYetUnlocked {
                unlock_time: grant.unlock_time,
                now,
            });
        }

        let (asset, amount) = (grant.asset.clone(), grant.amount);
        token.transfer(&self.address, caller, amount, events)?;
        self.grants.remove(caller);

        events.emit(
            Emitter::Vault,
            Event::GrantClaimed {
                grantor: grantor.to_string(),
                asset,
                amount,
            },
        );
        Ok(())
    }
}

fn ensure_grantor(grant: &Grant, caller: &str) -> Result<(), VaultError> {
    if grant.grantor != caller {
        return Err(VaultError::Unauthorized {
            caller: caller.to_string(),
        });
    }
    Ok(())
}

fn ensure_asset(grant: &Grant, token: &dyn TokenLedger) -> Result<(), VaultError> {
    if grant.asset != *token.asset_id() {
        return Err(VaultError::AssetMismatch {
            expected: grant.asset.clone(),
            actual: token.asset_id().clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Log;
    use crate::ledger::{Ledger, TokenMetadata};

    fn sink() -> Vec<Log> {
        Vec::new()
    }

    const DAY: u64 = 86_400;
    const T0: u64 = 1_700_000_000;

    fn token(id: &str) -> Ledger {
        let mut l = Ledger::new(
            id.into(),
            TokenMetadata {
                name: "token".into(),
                symbol: "TKN".into(),
                decimals: 18,
                owner: "grantor".into(),
            },
        );
        l.mint("grantor", "grantor", 100, &mut sink()).unwrap();
        l
    }

    fn setup() -> (VestingVault, Ledger) {
        let mut t = token("tkn");
        t.approve("grantor", "vault", 100, &mut sink());
        (VestingVault::new("vault"), t)
    }

    #[test]
    fn add_grant_escrows_funds() {
        let (mut vault, mut t) = setup();
        let mut events: Vec<Log> = Vec::new();
        vault
            .add_grant("grantor", &mut t, "bob", 5, T0 + DAY, T0, &mut events)
            .unwrap();

        assert_eq!(t.balance_of("vault"), 5);
        assert_eq!(t.balance_of("grantor"), 95);
        assert_eq!(vault.total_escrowed("tkn"), 5);
        assert_eq!(
            events.last().unwrap().event,
            Event::GrantAdded {
                asset: "tkn".into(),
                recipient: "bob".into(),
                amount: 5,
                unlock_time: T0 + DAY
            }
        );
    }

    #[test]
    fn zero_amount_rejected() {
        let (mut vault, mut t) = setup();
        let err = vault
            .add_grant("grantor", &mut t, "bob", 0, T0, T0, &mut sink())
            .unwrap_err();
        assert_eq!(err, VaultError::ZeroAmount);
    }

    #[test]
    fn add_without_approval_propagates_ledger_error() {
        let mut vault = VestingVault::new("vault");
        let mut t = token("tkn");
        let err = vault
            .add_grant("grantor", &mut t, "bob", 5, T0, T0, &mut sink())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientAllowance);
        assert_eq!(vault.grant_count(), 0);
        assert_eq!(t.balance_of("grantor"), 100);
    }

    #[test]
    fn second_grant_to_same_recipient_rejected_even_from_other_grantor() {
        let (mut vault, mut t) = setup();
        vault
            .add_grant("grantor", &mut t, "bob", 5, T0, T0, &mut sink())
            .unwrap();

        let mut other = token("other");
        other.approve("grantor", "vault", 100, &mut sink());
        let err = vault
            .add_grant("grantor", &mut other, "bob", 10, T0, T0, &mut sink())
            .unwrap_err();
        assert_eq!(err, VaultError::GrantAlreadyExists("bob".into()));
        assert_eq!(other.balance_of("vault"), 0);
    }

    #[test]
    fn decrease_lock_time_by_grantor() {
        let (mut vault, mut t) = setup();
        vault
            .add_grant("grantor", &mut t, "bob", 5, T0 + DAY, T0, &mut sink())
            .unwrap();
        let mut events: Vec<Log> = Vec::new();
        vault
            .decrease_lock_time("grantor", "bob", T0 + DAY / 4, &mut events)
            .unwrap();
        assert_eq!(vault.grant("bob").unwrap().unlock_time, T0 + DAY / 4);
        assert_eq!(
            events[0].event,
            Event::GrantUnlockChanged {
                recipient: "bob".into(),
                previous_unlock_time: T0 + DAY,
                new_unlock_time: T0 + DAY / 4
            }
        );
    }

    #[test]
    fn increase_lock_time_rejected() {
        let (mut vault, mut t) = setup();
        vault
            .add_grant("grantor", &mut t, "bob", 5, T0 + DAY, T0, &mut sink())
            .unwrap();
        let err = vault
            .decrease_lock_time("grantor", "bob", T0 + 2 * DAY, &mut sink())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockTimeIncrease);
        assert_eq!(vault.grant("bob").unwrap().unlock_time, T0 + DAY);
    }

    #[test]
    fn only_grantor_can_change_or_remove() {
        let (mut vault, mut t) = setup();
        vault
            .add_grant("grantor", &mut t, "bob", 5, T0 + DAY, T0, &mut sink())
            .unwrap();
        let err = vault
            .decrease_lock_time("bob", "bob", T0, &mut sink())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        let err = vault
            .remove_grant("bob", &mut t, "bob", &mut sink())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(vault.grant("bob").is_some());
    }

    #[test]
    fn remove_returns_funds_to_grantor() {
        let (mut vault, mut t) = setup();
        vault
            .add_grant("grantor", &mut t, "bob", 5, T0 + DAY, T0, &mut sink())
            .unwrap();
        let mut events: Vec<Log> = Vec::new();
        vault
            .remove_grant("grantor", &mut t, "bob", &mut events)
            .unwrap();
        assert!(vault.grant("bob").is_none());
        assert_eq!(t.balance_of("grantor"), 100);
        assert_eq!(t.balance_of("vault"), 0);
        assert_eq!(
            events.last().unwrap().event,
            Event::GrantRemoved {
                recipient: "bob".into()
            }
        );
    }

    #[test]
    fn claim_before_unlock_rejected() {
        let (mut vault, mut t) = setup();
        vault
            .add_grant("grantor", &mut t, "bob", 5, T0 + DAY, T0, &mut sink())
            .unwrap();
        let err = vault
            .claim_grant("bob", &mut t, "grantor", T0 + DAY - 1, &mut sink())
            .unwrap_err();
        assert_eq!(
            err,
            VaultError::NotYetUnlocked {
                unlock_time: T0 + DAY,
                now: T0 + DAY - 1
            }
        );
        assert_eq!(t.balance_of("bob"), 0);
    }

    #[test]
    fn claim_exactly_at_unlock_time_succeeds_once() {
        let (mut vault, mut t) = setup();
        vault
            .add_grant("grantor", &mut t, "bob", 5, T0 + DAY, T0, &mut sink())
            .unwrap();
        let mut events: Vec<Log> = Vec::new();
        vault
            .claim_grant("bob", &mut t, "grantor", T0 + DAY, &mut events)
            .unwrap();
        assert_eq!(t.balance_of("bob"), 5);
        assert_eq!(t.balance_of("vault"), 0);
        assert_eq!(
            events.last().unwrap().event,
            Event::GrantClaimed {
                grantor: "grantor".into(),
                asset: "tkn".into(),
                amount: 5
            }
        );

        let err = vault
            .claim_grant("bob", &mut t, "grantor", T0 + DAY, &mut sink())
            .unwrap_err();
        assert_eq!(err, VaultError::NoSuchGrant("bob".into()));
    }

    #[test]
    fn claim_with_wrong_grantor_is_no_such_grant() {
        let (mut vault, mut t) = setup();
        vault
            .add_grant("grantor", &mut t, "bob", 5, T0, T0, &mut sink())
            .unwrap();
        let err = vault
            .claim_grant("bob", &mut t, "someone-else", T0, &mut sink())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSuchGrant);
    }

    #[test]
    fn claim_against_wrong_ledger_rejected() {
        let (mut vault, mut t) = setup();
        vault
            .add_grant("grantor", &mut t, "bob", 5, T0, T0, &mut sink())
            .unwrap();
        let mut other = token("other");
        let err = vault
            .claim_grant("bob", &mut other, "grantor", T0, &mut sink())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AssetMismatch);
        assert!(vault.grant("bob").is_some());
    }

    #[test]
    fn grants_by_grantor_filters() {
        let (mut vault, mut t) = setup();
        vault
            .add_grant("grantor", &mut t, "bob", 5, T0, T0, &mut sink())
            .unwrap();
        vault
            .add_grant("grantor", &mut t, "carol", 7, T0, T0, &mut sink())
            .unwrap();
        let recipients: Vec<_> = vault
            .grants_by_grantor("grantor")
            .map(|(r, _)| r.as_str())
            .collect();
        assert_eq!(recipients, vec!["bob", "carol"]);
        assert_eq!(vault.grants_by_grantor("nobody").count(), 0);
        assert_eq!(vault.total_escrowed("tkn"), 12);
    }
}
