//! Integration tests for the token ledger.
//!
//! These run through the [`Runtime`] so that every call goes through the
//! same lock, clock and receipt path a node would use.

use std::sync::Arc;
use std::thread;

use grantvault_contracts::types::to_base_units;
use grantvault_contracts::{Amount, AssetId, Emitter, ErrorKind, Event, ManualClock, Runtime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const T0: u64 = 1_700_000_000;

/// `parseEther`-style helper: whole tokens at 18 decimals.
fn ether(whole: u128) -> Amount {
    to_base_units(whole, 18).expect("fits in u128")
}

/// Deploys a token and mints 100 whole tokens to `x`.
fn setup() -> (Runtime, AssetId) {
    let rt = Runtime::new("vault", Arc::new(ManualClock::new(T0)));
    let asset = rt.deploy_token("x", "token", "TKN", 18).unwrap();
    rt.mint("x", &asset, "x", ether(100)).unwrap();
    (rt, asset)
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

#[test]
fn transfer_moves_funds() {
    let (rt, asset) = setup();
    let receipt = rt.transfer("x", &asset, "y", ether(5)).unwrap();

    assert_eq!(rt.balance_of(&asset, "x").unwrap(), ether(95));
    assert_eq!(rt.balance_of(&asset, "y").unwrap(), ether(5));
    assert_eq!(receipt.events.len(), 1);
    assert_eq!(receipt.events[0].emitter, Emitter::Token(asset.clone()));
    assert_eq!(
        receipt.events[0].event,
        Event::Transfer {
            from: Some("x".into()),
            to: "y".into(),
            amount: ether(5)
        }
    );
}

#[test]
fn transfer_more_than_balance_rejected() {
    let (rt, asset) = setup();
    rt.transfer("x", &asset, "y", ether(5)).unwrap();

    let err = rt.transfer("x", &asset, "y", ether(500)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    assert_eq!(rt.balance_of(&asset, "x").unwrap(), ether(95));
    assert_eq!(rt.balance_of(&asset, "y").unwrap(), ether(5));
}

// ---------------------------------------------------------------------------
// Allowances
// ---------------------------------------------------------------------------

#[test]
fn approve_sets_allowance_and_notifies() {
    let (rt, asset) = setup();
    let receipt = rt.approve("x", &asset, "y", ether(5)).unwrap();

    assert_eq!(rt.allowance(&asset, "x", "y").unwrap(), ether(5));
    assert_eq!(
        receipt.events[0].event,
        Event::Approval {
            owner: "x".into(),
            spender: "y".into(),
            amount: ether(5)
        }
    );
}

#[test]
fn transfer_from_spends_allowance() {
    let (rt, asset) = setup();
    let before_x = rt.balance_of(&asset, "x").unwrap();
    let before_y = rt.balance_of(&asset, "y").unwrap();

    rt.approve("x", &asset, "y", ether(5)).unwrap();
    rt.transfer_from("y", &asset, "x", "y", ether(5)).unwrap();

    assert_eq!(rt.allowance(&asset, "x", "y").unwrap(), 0);
    assert_eq!(rt.balance_of(&asset, "x").unwrap(), before_x - ether(5));
    assert_eq!(rt.balance_of(&asset, "y").unwrap(), before_y + ether(5));
}

#[test]
fn transfer_from_above_allowance_rejected() {
    let (rt, asset) = setup();
    rt.approve("x", &asset, "y", ether(5)).unwrap();

    let err = rt
        .transfer_from("y", &asset, "x", "y", ether(10))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientAllowance);
    assert_eq!(rt.allowance(&asset, "x", "y").unwrap(), ether(5));
    assert_eq!(rt.balance_of(&asset, "x").unwrap(), ether(100));
}

#[test]
fn partial_spends_decrement_allowance_exactly() {
    let (rt, asset) = setup();
    rt.approve("x", &asset, "y", ether(10)).unwrap();

    rt.transfer_from("y", &asset, "x", "z", ether(3)).unwrap();
    assert_eq!(rt.allowance(&asset, "x", "y").unwrap(), ether(7));
    rt.transfer_from("y", &asset, "x", "z", ether(7)).unwrap();
    assert_eq!(rt.allowance(&asset, "x", "y").unwrap(), 0);

    let err = rt.transfer_from("y", &asset, "x", "z", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientAllowance);
    assert_eq!(rt.balance_of(&asset, "z").unwrap(), ether(10));
}

#[test]
fn allowance_only_binds_its_spender() {
    let (rt, asset) = setup();
    rt.approve("x", &asset, "y", ether(5)).unwrap();

    let err = rt.transfer_from("z", &asset, "x", "z", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientAllowance);
    // The owner's own transfers ignore allowances entirely.
    rt.transfer("x", &asset, "z", ether(50)).unwrap();
    assert_eq!(rt.allowance(&asset, "x", "y").unwrap(), ether(5));
}

// ---------------------------------------------------------------------------
// Minting
// ---------------------------------------------------------------------------

#[test]
fn only_owner_mints() {
    let (rt, asset) = setup();
    let err = rt.mint("y", &asset, "y", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(rt.total_supply(&asset).unwrap(), ether(100));
}

#[test]
fn mint_overflow_rejected() {
    let (rt, asset) = setup();
    let err = rt.mint("x", &asset, "y", u128::MAX).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Overflow);
    assert_eq!(rt.balance_of(&asset, "y").unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn random_operations_conserve_supply() {
    let (rt, asset) = setup();
    let accounts = ["x", "y", "z", "w"];
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut minted = ether(100);

    for _ in 0..2_000 {
        let a = accounts[rng.gen_range(0..accounts.len())];
        let b = accounts[rng.gen_range(0..accounts.len())];
        let amount = rng.gen_range(0..ether(30));

        let before_a = rt.balance_of(&asset, a).unwrap();
        let before_b = rt.balance_of(&asset, b).unwrap();

        match rng.gen_range(0..4) {
            0 => {
                let result = rt.transfer(a, &asset, b, amount);
                let (after_a, after_b) = (
                    rt.balance_of(&asset, a).unwrap(),
                    rt.balance_of(&asset, b).unwrap(),
                );
                match result {
                    Ok(_) if a != b => {
                        assert_eq!(after_a, before_a - amount);
                        assert_eq!(after_b, before_b + amount);
                    }
                    _ => {
                        assert_eq!(after_a, before_a);
                        assert_eq!(after_b, before_b);
                    }
                }
            }
            1 => {
                rt.approve(a, &asset, b, amount).unwrap();
            }
            2 => {
                let before_allowance = rt.allowance(&asset, a, b).unwrap();
                if rt.transfer_from(b, &asset, a, b, amount).is_ok() {
                    assert_eq!(
                        rt.allowance(&asset, a, b).unwrap(),
                        before_allowance - amount
                    );
                } else {
                    assert_eq!(rt.allowance(&asset, a, b).unwrap(), before_allowance);
                }
            }
            _ => {
                let small = amount / 1_000;
                rt.mint("x", &asset, a, small).unwrap();
                minted += small;
            }
        }

        let sum: Amount = accounts
            .iter()
            .map(|acct| rt.balance_of(&asset, acct).unwrap())
            .sum();
        assert_eq!(sum, minted);
        assert_eq!(rt.total_supply(&asset).unwrap(), minted);
    }
}

#[test]
fn concurrent_transfers_conserve_supply() {
    let (rt, asset) = setup();
    let rt = Arc::new(rt);
    let accounts = ["x", "y", "z", "w"];

    // Spread the supply so every thread has something to move.
    for acct in &accounts[1..] {
        rt.transfer("x", &asset, acct, ether(25)).unwrap();
    }

    let handles: Vec<_> = (0..8u64)
        .map(|seed| {
            let rt = Arc::clone(&rt);
            let asset = asset.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                for _ in 0..500 {
                    let from = accounts[rng.gen_range(0..accounts.len())];
                    let to = accounts[rng.gen_range(0..accounts.len())];
                    let amount = rng.gen_range(0..ether(10));
                    let _ = rt.transfer(from, &asset, to, amount);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("worker panicked");
    }

    let sum: Amount = accounts
        .iter()
        .map(|acct| rt.balance_of(&asset, acct).unwrap())
        .sum();
    assert_eq!(sum, ether(100));
    assert!(rt.audit().is_none());
}
