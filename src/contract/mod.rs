use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::host::Address;
use crate::ledger::{Amount, LedgerError, TokenLedger, TokenMetadata, TransferEvent};

/// Calls accepted by a deployed token. The caller is supplied by the
/// execution context and is the implicit sender of a transfer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenCall {
    BalanceOf { account: Address },
    TotalSupply,
    Metadata,
    Transfer { to: Address, amount: Amount },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenReply {
    Balance {
        account: Address,
        amount: Amount,
    },
    TotalSupply {
        amount: Amount,
    },
    Metadata {
        metadata: TokenMetadata,
    },
    Transferred {
        event: TransferEvent<Address>,
    },
    /// `error` is the stable [`LedgerError::code`].
    Reverted {
        error: String,
        message: String,
    },
}

impl TokenReply {
    pub fn reverted(err: &LedgerError) -> Self {
        TokenReply::Reverted {
            error: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_reverted(&self) -> bool {
        matches!(self, TokenReply::Reverted { .. })
    }
}

pub struct TokenContract {
    ledger: Arc<TokenLedger<Address>>,
}

impl TokenContract {
    pub fn deploy(deployer: Address, total_supply: Amount, metadata: TokenMetadata) -> Self {
        Self::from_ledger(Arc::new(TokenLedger::deploy_with(
            deployer,
            total_supply,
            metadata,
        )))
    }

    pub fn from_ledger(ledger: Arc<TokenLedger<Address>>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<TokenLedger<Address>> {
        &self.ledger
    }

    pub fn execute(&self, caller: &Address, call: &TokenCall) -> TokenReply {
        match call {
            TokenCall::BalanceOf { account } => TokenReply::Balance {
                account: *account,
                amount: self.ledger.balance_of(account),
            },
            TokenCall::TotalSupply => TokenReply::TotalSupply {
                amount: self.ledger.total_supply(),
            },
            TokenCall::Metadata => TokenReply::Metadata {
                metadata: self.ledger.metadata().clone(),
            },
            TokenCall::Transfer { to, amount } => match self.ledger.transfer(caller, to, *amount) {
                Ok(event) => TokenReply::Transferred { event },
                Err(err) => TokenReply::reverted(&err),
            },
        }
    }
}

/// One line of a local replay script.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScriptStep {
    pub caller: Address,
    pub call: TokenCall,
}

/// Parses JSON lines, skipping blanks and `#` comments.
pub fn parse_script(text: &str) -> anyhow::Result<Vec<ScriptStep>> {
    let mut steps = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let step: ScriptStep =
            serde_json::from_str(line).with_context(|| format!("script line {}", idx + 1))?;
        steps.push(step);
    }
    Ok(steps)
}
