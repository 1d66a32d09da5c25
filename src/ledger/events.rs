use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Amount;

/// Notification emitted once per successful transfer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferEvent<A> {
    /// Position in the ledger's event log, starting at 0.
    pub seq: u64,
    pub from: A,
    pub to: A,
    pub amount: Amount,
}

/// Receiving end of [`super::TokenLedger::subscribe`].
///
/// Events arrive in commit order. Iterating blocks until the next event and
/// ends once the ledger is dropped.
pub struct Subscription<A> {
    rx: Receiver<TransferEvent<A>>,
}

impl<A> Subscription<A> {
    pub(super) fn new(rx: Receiver<TransferEvent<A>>) -> Self {
        Self { rx }
    }

    pub fn try_next(&self) -> Option<TransferEvent<A>> {
        self.rx.try_recv().ok()
    }

    /// Waits up to `timeout`; `None` on timeout or once the ledger is gone.
    pub fn next_timeout(&self, timeout: Duration) -> Option<TransferEvent<A>> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Everything already delivered and not yet consumed.
    pub fn drain(&self) -> Vec<TransferEvent<A>> {
        self.rx.try_iter().collect()
    }
}

impl<A> Iterator for Subscription<A> {
    type Item = TransferEvent<A>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}
