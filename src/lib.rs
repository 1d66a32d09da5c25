//! Fixed-supply fungible token ledger.
//!
//! * [`ledger`] — the [`TokenLedger`] itself: balances, transfers, the event
//!   log and subscriptions, snapshots with a state root.
//! * [`contract`] — the request/response call surface of a deployed token.
//! * [`host`] — caller identities, signed call envelopes and replay checks.
//! * [`config`] — TOML configuration for the binaries.
//! * [`replay`] — script replay and snapshot files for the `run` and
//!   `verify-snapshot` commands.
//!
//! The ledger knows nothing about keys or transports; the binaries wire the
//! pieces together.

pub mod config;
pub mod contract;
pub mod host;
pub mod ledger;
pub mod logging;
pub mod replay;

pub use contract::{TokenCall, TokenContract, TokenReply};
pub use host::{Address, SignedCall, Signer};
pub use ledger::{Amount, LedgerError, TokenLedger, TransferEvent, TOTAL_SUPPLY};
