use std::{
    net::{SocketAddr, UdpSocket},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::debug;

use token_ledger::{
    config::DEFAULT_MAX_DATAGRAM,
    contract::TokenCall,
    host::{ServeReply, Signer},
    logging,
};

/// Signs one call, sends it to token-ledger-serve and prints the reply.
#[derive(Parser)]
#[command(name = "token-ledger-call", version)]
struct Args {
    #[arg(long)]
    to: SocketAddr,
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,
    #[arg(long)]
    sk_hex: String,
    #[arg(long)]
    nonce: u64,
    /// Call JSON, e.g. '{"type":"balance_of","account":"0x…"}'
    #[arg(long)]
    call: String,
    #[arg(long, default_value_t = 2_000)]
    timeout_ms: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init("warn");

    let signer = Signer::from_hex(&args.sk_hex).context("invalid --sk-hex")?;
    let call: TokenCall = serde_json::from_str(&args.call).context("invalid --call JSON")?;
    let signed = signer.sign_call(args.nonce, call)?;
    let request = serde_json::to_vec(&signed)?;

    let sock = UdpSocket::bind(args.bind).with_context(|| format!("binding {}", args.bind))?;
    sock.set_read_timeout(Some(Duration::from_millis(args.timeout_ms)))?;
    sock.send_to(&request, args.to)
        .with_context(|| format!("sending to {}", args.to))?;
    debug!(to = %args.to, caller = %signer.address(), nonce = args.nonce, "call sent");

    let mut buf = vec![0u8; DEFAULT_MAX_DATAGRAM];
    let (len, peer) = sock
        .recv_from(&mut buf)
        .with_context(|| format!("no reply from {} within {} ms", args.to, args.timeout_ms))?;
    if peer != args.to {
        bail!("reply from unexpected peer {peer}");
    }
    let reply: ServeReply = serde_json::from_slice(&buf[..len]).context("reply parse")?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    if let ServeReply::Rejected { error } = reply {
        bail!("call rejected: {error}");
    }
    Ok(())
}
