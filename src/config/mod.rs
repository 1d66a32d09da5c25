use std::fs;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::host::{Address, DEFAULT_REPLAY_CAPACITY};
use crate::ledger::{Amount, TokenMetadata, TOTAL_SUPPLY};

pub const DEFAULT_BIND: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 7878));
/// Largest UDP payload over IPv4.
pub const DEFAULT_MAX_DATAGRAM: usize = 65_507;
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Resolved configuration shared by the binaries.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub metadata: TokenMetadata,
    pub total_supply: Amount,
    pub deployer: Option<Address>,
    pub bind: SocketAddr,
    pub max_datagram: usize,
    pub replay_capacity: usize,
    pub log_filter: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::resolve(FileConfig::default())
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    token: TokenSection,
    #[serde(default)]
    deploy: DeploySection,
    #[serde(default)]
    host: HostSection,
    #[serde(default)]
    log: LogSection,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TokenSection {
    name: Option<String>,
    symbol: Option<String>,
    decimals: Option<u8>,
    total_supply: Option<Amount>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DeploySection {
    deployer: Option<Address>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct HostSection {
    bind: Option<SocketAddr>,
    max_datagram: Option<usize>,
    replay_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LogSection {
    filter: Option<String>,
}

impl LedgerConfig {
    /// Loads `path` when given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("reading ledger configuration from {}", path.display()))?;
                Self::parse(&contents)
                    .with_context(|| format!("parsing ledger configuration at {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let deserializer = toml::Deserializer::new(contents);
        let file: FileConfig = serde_path_to_error::deserialize(deserializer)?;
        Ok(Self::resolve(file))
    }

    fn resolve(file: FileConfig) -> Self {
        let defaults = TokenMetadata::default();
        let metadata = TokenMetadata {
            name: file.token.name.unwrap_or(defaults.name),
            symbol: file.token.symbol.unwrap_or(defaults.symbol),
            decimals: file.token.decimals.unwrap_or(defaults.decimals),
        };
        Self {
            metadata,
            total_supply: file.token.total_supply.unwrap_or(TOTAL_SUPPLY),
            deployer: file.deploy.deployer,
            bind: file.host.bind.unwrap_or(DEFAULT_BIND),
            max_datagram: file.host.max_datagram.unwrap_or(DEFAULT_MAX_DATAGRAM),
            replay_capacity: file
                .host
                .replay_capacity
                .unwrap_or(DEFAULT_REPLAY_CAPACITY),
            log_filter: file
                .log
                .filter
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }

    /// The configured deployer, or an error naming the missing key.
    pub fn require_deployer(&self) -> Result<Address> {
        self.deployer
            .context("deploy.deployer is not set in the ledger configuration")
    }
}
