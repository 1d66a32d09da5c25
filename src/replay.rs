//! Local replay of call scripts and snapshot files.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::LedgerConfig;
use crate::contract::{parse_script, TokenContract, TokenReply};
use crate::host::Address;
use crate::ledger::LedgerSnapshot;

pub struct ReplayOutcome {
    pub contract: TokenContract,
    pub replies: Vec<TokenReply>,
    pub reverted: usize,
}

/// Deploys a fresh ledger from `cfg` and runs every script step against it.
pub fn replay_script(cfg: &LedgerConfig, deployer: Address, script: &str) -> Result<ReplayOutcome> {
    let steps = parse_script(script)?;
    let contract = TokenContract::deploy(deployer, cfg.total_supply, cfg.metadata.clone());
    let replies: Vec<TokenReply> = steps
        .iter()
        .map(|step| contract.execute(&step.caller, &step.call))
        .collect();
    let reverted = replies.iter().filter(|r| r.is_reverted()).count();
    Ok(ReplayOutcome {
        contract,
        replies,
        reverted,
    })
}

pub fn write_snapshot(path: &Path, snapshot: &LedgerSnapshot<Address>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, serde_json::to_vec_pretty(snapshot)?)
        .with_context(|| format!("writing {}", path.display()))
}

/// Parses a snapshot file; callers still have to [`LedgerSnapshot::verify`] it.
pub fn read_snapshot(path: &Path) -> Result<LedgerSnapshot<Address>> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing snapshot {}", path.display()))
}
