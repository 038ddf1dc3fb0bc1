//! # Error Taxonomy
//!
//! Each contract has its own `thiserror` enum carrying the details of a
//! rejection. [`ErrorKind`] flattens all of them into a stable, string-coded
//! set so that remote callers can branch on the failure without parsing
//! messages.

use serde::{Deserialize, Serialize};

/// Stable classification of every rejection the contracts can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InsufficientBalance,
    InsufficientAllowance,
    Overflow,
    Unauthorized,
    GrantAlreadyExists,
    NoSuchGrant,
    NotYetUnlocked,
    LockTimeIncrease,
    ZeroAmount,
    AssetMismatch,
    UnknownAsset,
    DuplicateSymbol,
    InvalidTokenMetadata,
}

impl ErrorKind {
    /// The wire code for this kind. Identical to the variant name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InsufficientBalance => "InsufficientBalance",
            ErrorKind::InsufficientAllowance => "InsufficientAllowance",
            ErrorKind::Overflow => "Overflow",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::GrantAlreadyExists => "GrantAlreadyExists",
            ErrorKind::NoSuchGrant => "NoSuchGrant",
            ErrorKind::NotYetUnlocked => "NotYetUnlocked",
            ErrorKind::LockTimeIncrease => "LockTimeIncrease",
            ErrorKind::ZeroAmount => "ZeroAmount",
            ErrorKind::AssetMismatch => "AssetMismatch",
            ErrorKind::UnknownAsset => "UnknownAsset",
            ErrorKind::DuplicateSymbol => "DuplicateSymbol",
            ErrorKind::InvalidTokenMetadata => "InvalidTokenMetadata",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_code_matches_serde_name() {
        for kind in [
            ErrorKind::InsufficientBalance,
            ErrorKind::NotYetUnlocked,
            ErrorKind::InvalidTokenMetadata,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }
}
