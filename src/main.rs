use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use token_ledger::{
    config::{LedgerConfig, DEFAULT_LOG_FILTER},
    contract::TokenCall,
    host::{Address, Signer},
    logging, replay,
};

#[derive(Parser)]
#[command(name = "token-ledger", version, about = "Fixed-supply token ledger tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an ed25519 signer and its address
    Keygen {
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Print the address of a secret key
    Address {
        #[arg(long)]
        sk_hex: String,
    },
    /// Sign a call for token-ledger-serve
    SignCall {
        #[arg(long)]
        sk_hex: String,
        #[arg(long)]
        nonce: u64,
        /// Call JSON, e.g. '{"type":"total_supply"}'
        #[arg(long)]
        call: String,
    },
    /// Replay a JSON-lines script against a freshly deployed ledger
    Run {
        #[arg(long)]
        script: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Overrides deploy.deployer from the config
        #[arg(long)]
        deployer: Option<Address>,
        #[arg(long)]
        snapshot_out: Option<PathBuf>,
    },
    /// Check a snapshot's state root and supply
    VerifySnapshot { snapshot: PathBuf },
}

//==================== helpers ====================//

fn write_all(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut file =
        fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("writing {}", path.display()))
}

fn parse_call(json: &str) -> Result<TokenCall> {
    serde_json::from_str(json).context("invalid --call JSON")
}

//==================== keys ====================//

fn keygen_cmd(out_dir: &Path) -> Result<()> {
    let signer = Signer::generate();
    write_all(&out_dir.join("signer.sk.hex"), signer.secret_hex().as_bytes())?;
    write_all(
        &out_dir.join("signer.pk.hex"),
        signer.verifying_key_hex().as_bytes(),
    )?;
    write_all(
        &out_dir.join("address.txt"),
        signer.address().to_string().as_bytes(),
    )?;
    println!("{}", signer.address());
    info!(dir = %out_dir.display(), "signer written");
    Ok(())
}

fn address_cmd(sk_hex: &str) -> Result<()> {
    let signer = Signer::from_hex(sk_hex).context("invalid --sk-hex")?;
    println!("{}", signer.address());
    Ok(())
}

fn sign_call_cmd(sk_hex: &str, nonce: u64, call: &str) -> Result<()> {
    let signer = Signer::from_hex(sk_hex).context("invalid --sk-hex")?;
    let signed = signer.sign_call(nonce, parse_call(call)?)?;
    println!("{}", serde_json::to_string(&signed)?);
    Ok(())
}

//==================== replay ====================//

/// Configuration for `command`; only `run` reads a file.
fn load_config(command: &Command) -> Result<LedgerConfig> {
    match command {
        Command::Run { config, .. } => LedgerConfig::load(config.as_deref()),
        _ => Ok(LedgerConfig::default()),
    }
}

fn run_cmd(
    cfg: &LedgerConfig,
    script: &Path,
    deployer: Option<Address>,
    snapshot_out: Option<&Path>,
) -> Result<()> {
    let deployer = match deployer {
        Some(addr) => addr,
        None => cfg.require_deployer()?,
    };
    let text = fs::read_to_string(script)
        .with_context(|| format!("reading script {}", script.display()))?;
    let outcome = replay::replay_script(cfg, deployer, &text)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for reply in &outcome.replies {
        serde_json::to_writer(&mut out, reply)?;
        writeln!(out)?;
    }
    info!(
        steps = outcome.replies.len(),
        reverted = outcome.reverted,
        "script replayed"
    );

    if let Some(path) = snapshot_out {
        let snapshot = outcome.contract.ledger().snapshot()?;
        replay::write_snapshot(path, &snapshot)?;
        info!(
            path = %path.display(),
            root = %hex::encode(snapshot.state_root),
            "snapshot written"
        );
    }
    Ok(())
}

fn verify_snapshot_cmd(path: &Path) -> Result<()> {
    let snapshot = replay::read_snapshot(path)?;
    if let Err(err) = snapshot.verify() {
        bail!("verify-snapshot: {err}");
    }
    println!(
        "verify-snapshot: OK ({} holders, supply {}, root {})",
        snapshot.balances.len(),
        snapshot.total_supply,
        hex::encode(snapshot.state_root)
    );
    Ok(())
}

//==================== main ====================//

fn main() -> ExitCode {
    let cli = Cli::parse();
    let cfg = match load_config(&cli.command) {
        Ok(cfg) => cfg,
        Err(err) => {
            logging::init(DEFAULT_LOG_FILTER);
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&cfg.log_filter);
    let result = match &cli.command {
        Command::Keygen { out_dir } => keygen_cmd(out_dir),
        Command::Address { sk_hex } => address_cmd(sk_hex),
        Command::SignCall {
            sk_hex,
            nonce,
            call,
        } => sign_call_cmd(sk_hex, *nonce, call),
        Command::Run {
            script,
            deployer,
            snapshot_out,
            ..
        } => run_cmd(&cfg, script, *deployer, snapshot_out.as_deref()),
        Command::VerifySnapshot { snapshot } => verify_snapshot_cmd(snapshot),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
