use std::{net::UdpSocket, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use token_ledger::{
    config::LedgerConfig,
    contract::TokenContract,
    host::{CallHandler, ReplayGuard, ServeReply},
    logging,
};

/// Deploys a ledger and answers signed calls over UDP, one JSON datagram per
/// request and per reply.
#[derive(Parser)]
#[command(name = "token-ledger-serve", version)]
struct Args {
    #[arg(long)]
    config: PathBuf,
    /// Overrides host.bind from the config
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = LedgerConfig::load(Some(&args.config))?;
    logging::init(&cfg.log_filter);

    let deployer = cfg.require_deployer()?;
    let bind = args.bind.unwrap_or(cfg.bind);
    let contract = TokenContract::deploy(deployer, cfg.total_supply, cfg.metadata.clone());
    let mut handler =
        CallHandler::with_guard(contract, ReplayGuard::with_capacity(cfg.replay_capacity));

    let sock = UdpSocket::bind(bind).with_context(|| format!("binding {bind}"))?;
    info!(
        bind = %sock.local_addr()?,
        deployer = %deployer,
        total_supply = cfg.total_supply,
        "serving token ledger"
    );

    let mut buf = vec![0u8; cfg.max_datagram];
    loop {
        let (len, peer) = match sock.recv_from(&mut buf) {
            Ok(v) => v,
            Err(err) => {
                warn!(error = %err, "recv failed");
                continue;
            }
        };
        let reply = handler.handle(&buf[..len]);
        if let ServeReply::Rejected { error } = &reply {
            warn!(peer = %peer, error = %error, "request rejected");
        }
        let bytes = match serde_json::to_vec(&reply) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "encoding reply failed");
                continue;
            }
        };
        if let Err(err) = sock.send_to(&bytes, peer) {
            warn!(peer = %peer, error = %err, "send failed");
        }
    }
}
