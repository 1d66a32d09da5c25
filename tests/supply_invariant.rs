//! The balances of a ledger always sum to its total supply, whatever
//! sequence of transfers is thrown at it and however many threads do so.

use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use token_ledger::ledger::{Amount, LedgerError, TokenLedger, TokenMetadata};

const ACCOUNTS: u8 = 6;

fn total(ledger: &TokenLedger<u8>) -> Amount {
    (0..ACCOUNTS).map(|a| ledger.balance_of(&a)).sum()
}

// one read lock for every balance, unlike `total`
fn consistent_total(ledger: &TokenLedger<u8>) -> Amount {
    ledger
        .snapshot()
        .unwrap()
        .balances
        .iter()
        .map(|entry| entry.amount)
        .sum()
}

proptest! {
    #[test]
    fn random_transfers_preserve_supply(
        supply in 0u64..10_000,
        ops in prop::collection::vec((0..ACCOUNTS, 0..ACCOUNTS, 0u64..4_000), 0..64),
    ) {
        let ledger = TokenLedger::deploy_with(0u8, supply, TokenMetadata::default());
        let mut emitted = 0u64;
        for (from, to, amount) in ops {
            let before_from = ledger.balance_of(&from);
            let before_to = ledger.balance_of(&to);
            match ledger.transfer(&from, &to, amount) {
                Ok(event) => {
                    prop_assert_eq!(event.seq, emitted);
                    emitted += 1;
                    if from == to {
                        prop_assert_eq!(ledger.balance_of(&from), before_from);
                    } else {
                        prop_assert_eq!(ledger.balance_of(&from), before_from - amount);
                        prop_assert_eq!(ledger.balance_of(&to), before_to + amount);
                    }
                }
                Err(LedgerError::NotEnoughTokens { available, requested }) => {
                    prop_assert!(available < requested);
                    prop_assert_eq!(ledger.balance_of(&from), before_from);
                    prop_assert_eq!(ledger.balance_of(&to), before_to);
                }
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
            prop_assert_eq!(total(&ledger), supply);
        }
        prop_assert_eq!(ledger.events().len() as u64, emitted);
        let snapshot = ledger.snapshot().unwrap();
        prop_assert!(snapshot.verify().is_ok());
    }
}

#[test]
fn concurrent_transfers_preserve_supply() {
    let supply = 60_000;
    let ledger = Arc::new(TokenLedger::deploy_with(0u8, supply, TokenMetadata::default()));
    // seed every account so all threads have something to move
    for account in 1..ACCOUNTS {
        ledger.transfer(&0, &account, 10_000).unwrap();
    }
    let events = ledger.subscribe();

    let workers: Vec<_> = (0..8u64)
        .map(|seed| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut ok = 0u64;
                for _ in 0..2_000 {
                    let from = rng.gen_range(0..ACCOUNTS);
                    let to = rng.gen_range(0..ACCOUNTS);
                    let amount = rng.gen_range(0..3_000);
                    if ledger.transfer(&from, &to, amount).is_ok() {
                        ok += 1;
                    }
                    assert_eq!(consistent_total(&ledger), supply);
                }
                ok
            })
        })
        .collect();
    let succeeded: u64 = workers.into_iter().map(|w| w.join().unwrap()).sum();

    assert_eq!(total(&ledger), supply);
    let delivered = events.drain();
    assert_eq!(delivered.len() as u64, succeeded);
    // delivery order is commit order
    let first_seq = u64::from(ACCOUNTS - 1);
    for (idx, event) in delivered.iter().enumerate() {
        assert_eq!(event.seq, first_seq + idx as u64);
    }
}
