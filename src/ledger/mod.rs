//! Fixed-supply fungible token ledger.
//!
//! A [`TokenLedger`] is deployed once: the whole supply lands on the deployer
//! and afterwards tokens only move through [`TokenLedger::transfer`]. Every
//! successful transfer is appended to the event log and pushed to live
//! [`Subscription`]s after the balances are committed.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::mpsc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

mod events;
mod snapshot;

pub use events::{Subscription, TransferEvent};
pub use snapshot::{BalanceEntry, LedgerSnapshot, SnapshotError};

pub type Amount = u64;

/// Supply credited to the deployer by [`TokenLedger::deploy`].
pub const TOTAL_SUPPLY: Amount = 1_000_000;

/// Anything usable as a balance key.
pub trait Account: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> Account for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("not enough tokens: balance {available}, requested {requested}")]
    NotEnoughTokens { available: Amount, requested: Amount },
    #[error("crediting {amount} would overflow the recipient balance")]
    BalanceOverflow { amount: Amount },
}

impl LedgerError {
    /// Stable identifier for callers that branch on the failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotEnoughTokens { .. } => "NotEnoughTokens",
            LedgerError::BalanceOverflow { .. } => "BalanceOverflow",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Default for TokenMetadata {
    fn default() -> Self {
        Self {
            name: "My Hardhat Token".to_string(),
            symbol: "MHT".to_string(),
            decimals: 0,
        }
    }
}

struct LedgerState<A> {
    balances: HashMap<A, Amount>,
    events: Vec<TransferEvent<A>>,
    subscribers: Vec<mpsc::Sender<TransferEvent<A>>>,
}

impl<A: Account> LedgerState<A> {
    fn balance(&self, account: &A) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    // zero balances are not stored
    fn set_balance(&mut self, account: &A, amount: Amount) {
        if amount == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(account.clone(), amount);
        }
    }

    fn publish(&mut self, event: TransferEvent<A>) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        self.events.push(event);
    }
}

pub struct TokenLedger<A> {
    total_supply: Amount,
    deployer: A,
    metadata: TokenMetadata,
    state: RwLock<LedgerState<A>>,
}

impl<A: Account> TokenLedger<A> {
    /// Deploys a ledger holding [`TOTAL_SUPPLY`] on `deployer`.
    pub fn deploy(deployer: A) -> Self {
        Self::deploy_with(deployer, TOTAL_SUPPLY, TokenMetadata::default())
    }

    pub fn deploy_with(deployer: A, total_supply: Amount, metadata: TokenMetadata) -> Self {
        let mut balances = HashMap::new();
        if total_supply > 0 {
            balances.insert(deployer.clone(), total_supply);
        }
        info!(
            deployer = ?deployer,
            total_supply,
            symbol = %metadata.symbol,
            "token ledger deployed"
        );
        Self {
            total_supply,
            deployer,
            metadata,
            state: RwLock::new(LedgerState {
                balances,
                events: Vec::new(),
                subscribers: Vec::new(),
            }),
        }
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn deployer(&self) -> &A {
        &self.deployer
    }

    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    /// Current balance of `account`; zero for accounts never credited.
    pub fn balance_of(&self, account: &A) -> Amount {
        self.state.read().balance(account)
    }

    /// Number of accounts holding a non-zero balance.
    pub fn holders(&self) -> usize {
        self.state.read().balances.len()
    }

    /// Moves `amount` from `sender` to `recipient`.
    ///
    /// Validation, debit, credit and notification happen under one write
    /// lock, so readers never see a half-applied transfer and subscribers
    /// receive events in commit order. On error nothing changed and nothing
    /// was emitted. Self-transfers and zero-amount transfers leave balances
    /// untouched but still emit their event.
    pub fn transfer(
        &self,
        sender: &A,
        recipient: &A,
        amount: Amount,
    ) -> Result<TransferEvent<A>, LedgerError> {
        let mut state = self.state.write();
        let available = state.balance(sender);
        if available < amount {
            debug!(
                sender = ?sender,
                available,
                requested = amount,
                "transfer rejected"
            );
            return Err(LedgerError::NotEnoughTokens {
                available,
                requested: amount,
            });
        }
        if sender != recipient && amount > 0 {
            let credited = state
                .balance(recipient)
                .checked_add(amount)
                .ok_or(LedgerError::BalanceOverflow { amount })?;
            state.set_balance(sender, available - amount);
            state.set_balance(recipient, credited);
        }

        let event = TransferEvent {
            seq: state.events.len() as u64,
            from: sender.clone(),
            to: recipient.clone(),
            amount,
        };
        state.publish(event.clone());
        debug!(
            seq = event.seq,
            from = ?event.from,
            to = ?event.to,
            amount,
            "transfer committed"
        );
        Ok(event)
    }

    /// Subscribes to every transfer committed after this call.
    pub fn subscribe(&self) -> Subscription<A> {
        let (tx, rx) = mpsc::channel();
        self.state.write().subscribers.push(tx);
        Subscription::new(rx)
    }

    pub fn events(&self) -> Vec<TransferEvent<A>> {
        self.state.read().events.clone()
    }

    /// Events with `seq >= from_seq`, in commit order.
    pub fn events_since(&self, from_seq: u64) -> Vec<TransferEvent<A>> {
        let state = self.state.read();
        let start = usize::try_from(from_seq)
            .unwrap_or(usize::MAX)
            .min(state.events.len());
        state.events[start..].to_vec()
    }

    fn with_balances<R>(&self, f: impl FnOnce(&HashMap<A, Amount>, u64) -> R) -> R {
        let state = self.state.read();
        f(&state.balances, state.events.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(ledger: &TokenLedger<&'static str>, accounts: &[&'static str]) -> Amount {
        accounts.iter().map(|a| ledger.balance_of(a)).sum()
    }

    #[test]
    fn deploy_credits_whole_supply_to_deployer() {
        let ledger = TokenLedger::deploy("owner");
        assert_eq!(ledger.total_supply(), TOTAL_SUPPLY);
        assert_eq!(ledger.balance_of(&"owner"), TOTAL_SUPPLY);
        assert_eq!(ledger.balance_of(&"stranger"), 0);
        assert_eq!(ledger.holders(), 1);
        assert_eq!(ledger.deployer(), &"owner");
    }

    #[test]
    fn chained_transfers_move_balances() {
        let ledger = TokenLedger::deploy("owner");
        ledger.transfer(&"owner", &"addr1", 50).unwrap();
        assert_eq!(ledger.balance_of(&"addr1"), 50);
        assert_eq!(ledger.balance_of(&"owner"), TOTAL_SUPPLY - 50);

        ledger.transfer(&"addr1", &"addr2", 50).unwrap();
        assert_eq!(ledger.balance_of(&"addr2"), 50);
        assert_eq!(ledger.balance_of(&"addr1"), 0);
        assert_eq!(sum(&ledger, &["owner", "addr1", "addr2"]), TOTAL_SUPPLY);
        // addr1 went back to zero and is no longer stored
        assert_eq!(ledger.holders(), 2);
    }

    #[test]
    fn insufficient_balance_leaves_state_untouched() {
        let ledger = TokenLedger::deploy("owner");
        let sub = ledger.subscribe();
        let err = ledger.transfer(&"addr1", &"owner", 1).unwrap_err();
        assert_eq!(
            err,
            LedgerError::NotEnoughTokens {
                available: 0,
                requested: 1
            }
        );
        assert_eq!(err.code(), "NotEnoughTokens");
        assert_eq!(ledger.balance_of(&"owner"), TOTAL_SUPPLY);
        assert!(ledger.events().is_empty());
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn self_transfer_is_a_noop_that_still_emits() {
        let ledger = TokenLedger::deploy("owner");
        let event = ledger.transfer(&"owner", &"owner", 700).unwrap();
        assert_eq!(ledger.balance_of(&"owner"), TOTAL_SUPPLY);
        assert_eq!((event.from, event.to, event.amount), ("owner", "owner", 700));
        assert_eq!(ledger.events().len(), 1);
    }

    #[test]
    fn self_transfer_above_balance_is_rejected() {
        let ledger = TokenLedger::deploy("owner");
        assert!(matches!(
            ledger.transfer(&"owner", &"owner", TOTAL_SUPPLY + 1),
            Err(LedgerError::NotEnoughTokens { .. })
        ));
    }

    #[test]
    fn zero_amount_transfer_always_succeeds() {
        let ledger = TokenLedger::deploy("owner");
        ledger.transfer(&"nobody", &"owner", 0).unwrap();
        ledger.transfer(&"owner", &"fresh", 0).unwrap();
        assert_eq!(ledger.balance_of(&"owner"), TOTAL_SUPPLY);
        assert_eq!(ledger.balance_of(&"fresh"), 0);
        assert_eq!(ledger.holders(), 1);
        assert_eq!(ledger.events().len(), 2);
    }

    #[test]
    fn recipient_overflow_is_refused_without_mutation() {
        let ledger = TokenLedger::deploy_with("owner", Amount::MAX, TokenMetadata::default());
        // unreachable through transfers alone; seed the slot directly
        ledger.state.write().balances.insert("whale", 10);
        let err = ledger.transfer(&"owner", &"whale", Amount::MAX).unwrap_err();
        assert_eq!(err, LedgerError::BalanceOverflow { amount: Amount::MAX });
        assert_eq!(ledger.balance_of(&"owner"), Amount::MAX);
        assert_eq!(ledger.balance_of(&"whale"), 10);
        assert!(ledger.events().is_empty());
    }

    #[test]
    fn events_since_returns_suffix_in_order() {
        let ledger = TokenLedger::deploy("owner");
        for amount in 1..=4 {
            ledger.transfer(&"owner", &"addr1", amount).unwrap();
        }
        let tail = ledger.events_since(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].seq, 2);
        assert_eq!(tail[1].amount, 4);
        assert!(ledger.events_since(99).is_empty());
    }

    #[test]
    fn zero_supply_ledger_has_no_holders() {
        let ledger = TokenLedger::deploy_with("owner", 0, TokenMetadata::default());
        assert_eq!(ledger.holders(), 0);
        assert_eq!(ledger.balance_of(&"owner"), 0);
    }

    #[test]
    fn independent_ledgers_do_not_share_state() {
        let a = TokenLedger::deploy("owner");
        let b = TokenLedger::deploy("owner");
        a.transfer(&"owner", &"addr1", 10).unwrap();
        assert_eq!(b.balance_of(&"addr1"), 0);
        assert!(b.events().is_empty());
    }
}
