//! # Contract Notifications
//!
//! Every successful state change emits one or more [`Event`]s. Field order
//! inside each variant is part of the contract: indexers and tests match on
//! it positionally, so reordering a field is a breaking change.
//!
//! Events are emitted into an [`EventSink`]. The runtime collects them into
//! a per-operation buffer and only publishes the buffer once the operation
//! has committed, so a rejected call never leaks a notification.

use serde::{Deserialize, Serialize};

use crate::types::{amount_string, Address, Amount, AssetId, Timestamp};

/// A structured notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Tokens moved between accounts. `from` is `None` for a mint.
    Transfer {
        from: Option<Address>,
        to: Address,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    /// An allowance was set (overwritten, never incremented).
    Approval {
        owner: Address,
        spender: Address,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    /// A grant was created and its funds pulled into vault custody.
    GrantAdded {
        asset: AssetId,
        recipient: Address,
        #[serde(with = "amount_string")]
        amount: Amount,
        unlock_time: Timestamp,
    },
    /// A grant's unlock time moved earlier.
    GrantUnlockChanged {
        recipient: Address,
        previous_unlock_time: Timestamp,
        new_unlock_time: Timestamp,
    },
    /// A grant was cancelled by its grantor.
    GrantRemoved { recipient: Address },
    /// A grant was claimed by its recipient.
    GrantClaimed {
        grantor: Address,
        asset: AssetId,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
}

impl Event {
    /// Short name of the variant, used for logging and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Transfer { .. } => "Transfer",
            Event::Approval { .. } => "Approval",
            Event::GrantAdded { .. } => "GrantAdded",
            Event::GrantUnlockChanged { .. } => "GrantUnlockChanged",
            Event::GrantRemoved { .. } => "GrantRemoved",
            Event::GrantClaimed { .. } => "GrantClaimed",
        }
    }
}

/// The contract that emitted an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
pub enum Emitter {
    /// A token ledger, identified by its asset ID.
    Token(AssetId),
    /// The vesting vault.
    Vault,
}

/// An event together with the contract that emitted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub emitter: Emitter,
    pub event: Event,
}

/// Destination for emitted events.
pub trait EventSink {
    fn emit(&mut self, emitter: Emitter, event: Event);
}

impl EventSink for Vec<Log> {
    fn emit(&mut self, emitter: Emitter, event: Event) {
        self.push(Log { emitter, event });
    }
}
