use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Account, Amount, TokenLedger, TokenMetadata};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("state root mismatch")]
    RootMismatch,
    #[error("balance entry {index} is out of order or duplicated")]
    UnsortedBalances { index: usize },
    #[error("balances sum to {actual}, total supply is {expected}")]
    SupplyMismatch { expected: Amount, actual: u128 },
    #[error("account encoding failed: {0}")]
    Encode(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceEntry<A> {
    pub account: A,
    pub amount: Amount,
}

/// Point-in-time copy of a ledger, balances sorted by account.
///
/// `state_root` commits to every field: a header leaf for metadata, supply,
/// deployer and event count, followed by one leaf per balance.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot<A> {
    pub metadata: TokenMetadata,
    pub total_supply: Amount,
    pub deployer: A,
    pub balances: Vec<BalanceEntry<A>>,
    pub event_count: u64,
    #[serde(with = "hex")]
    pub state_root: [u8; 32],
}

impl<A: Account + Ord + Serialize> TokenLedger<A> {
    pub fn snapshot(&self) -> Result<LedgerSnapshot<A>, SnapshotError> {
        let (mut balances, event_count) = self.with_balances(|balances, event_count| {
            let entries: Vec<BalanceEntry<A>> = balances
                .iter()
                .map(|(account, amount)| BalanceEntry {
                    account: account.clone(),
                    amount: *amount,
                })
                .collect();
            (entries, event_count)
        });
        balances.sort_by(|a, b| a.account.cmp(&b.account));
        let mut snapshot = LedgerSnapshot {
            metadata: self.metadata.clone(),
            total_supply: self.total_supply,
            deployer: self.deployer.clone(),
            balances,
            event_count,
            state_root: [0u8; 32],
        };
        snapshot.state_root = snapshot.compute_root()?;
        Ok(snapshot)
    }
}

impl<A: Ord + Serialize> LedgerSnapshot<A> {
    /// Checks account order, recomputes the state root and checks the
    /// balances against the supply.
    pub fn verify(&self) -> Result<(), SnapshotError> {
        for (index, pair) in self.balances.windows(2).enumerate() {
            if pair[0].account >= pair[1].account {
                return Err(SnapshotError::UnsortedBalances { index: index + 1 });
            }
        }
        if self.compute_root()? != self.state_root {
            return Err(SnapshotError::RootMismatch);
        }
        let actual: u128 = self.balances.iter().map(|b| u128::from(b.amount)).sum();
        if actual != u128::from(self.total_supply) {
            return Err(SnapshotError::SupplyMismatch {
                expected: self.total_supply,
                actual,
            });
        }
        Ok(())
    }
}

impl<A: Serialize> LedgerSnapshot<A> {
    /// Merkle root over the header leaf and the balance leaves, in order.
    pub fn compute_root(&self) -> Result<[u8; 32], SnapshotError> {
        let mut leaves: Vec<[u8; 32]> = Vec::with_capacity(self.balances.len() + 1);

        let mut header = Sha256::new();
        header.update(b"header");
        update_framed(&mut header, &encode(&self.metadata)?);
        header.update(self.total_supply.to_le_bytes());
        update_framed(&mut header, &encode(&self.deployer)?);
        header.update(self.event_count.to_le_bytes());
        leaves.push(header.finalize().into());

        for entry in &self.balances {
            let mut hasher = Sha256::new();
            hasher.update(b"balance");
            update_framed(&mut hasher, &encode(&entry.account)?);
            hasher.update(entry.amount.to_le_bytes());
            leaves.push(hasher.finalize().into());
        }
        Ok(build_merkle(leaves))
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, SnapshotError> {
    serde_json::to_vec(value).map_err(|e| SnapshotError::Encode(e.to_string()))
}

fn update_framed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"token-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity(leaves.len().div_ceil(2));
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            // odd leaf pairs with itself
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}
