//! Operator CLI for the chain verifier
//!
//! `chainctl` feeds a PEM bundle through the same callback path a TLS layer
//! uses (root first, depth counting down to 0) so a chain can be checked
//! against the configured trust store without a live handshake.
//!
//! # Example Usage
//!
//! ```bash
//! # Bundle stored leaf first, as servers send it
//! chainctl verify --host sync.example.com --chain fullchain.pem
//!
//! # Private CA
//! chainctl verify --host sync.internal --chain chain.pem \
//!     --trust-store file --ca-bundle /etc/sync/roots.pem
//!
//! # What does this bundle contain?
//! chainctl inspect --chain fullchain.pem
//! ```

use anyhow::{Context, Result};
use chain_verifier::{
    split_bundle, CertificateChain, CertificateDecoder, CertificateVerifier, TrustStoreSource,
    Verdict, VerifierConfig,
};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Replay and inspect TLS certificate chains
#[derive(Parser, Debug)]
#[command(name = "chainctl")]
#[command(about = "Replay and inspect TLS certificate chains")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a chain through the verifier the way a TLS layer would
    Verify(VerifyArgs),
    /// Print what each certificate in a bundle claims
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Server address to validate the leaf against
    #[arg(long)]
    pub host: String,

    /// PEM bundle holding the chain
    #[arg(long)]
    pub chain: PathBuf,

    /// The bundle lists the root first instead of the leaf
    #[arg(long)]
    pub root_first: bool,

    /// Trust anchor source (native, bundled, file)
    #[arg(long)]
    pub trust_store: Option<TrustStoreSource>,

    /// Additional trusted roots in PEM form
    #[arg(long)]
    pub ca_bundle: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// PEM bundle to inspect
    #[arg(long)]
    pub chain: PathBuf,
}

pub fn init_tracing(verbose: bool, json: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("chain_verifier={level},chain_cli={level}").into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    Ok(())
}

pub fn run(cli: &Cli) -> Result<ExitCode> {
    let mut stdout = std::io::stdout().lock();
    match &cli.command {
        Command::Verify(args) => {
            let verdict = run_verify(args, &mut stdout)?;
            Ok(if verdict == Verdict::Trusted {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Inspect(args) => {
            run_inspect(args, &mut stdout)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Pair each PEM with the depth a TLS layer would report, in delivery order
/// (root first, leaf at depth 0).
pub fn delivery_order(mut pems: Vec<String>, root_first: bool) -> Vec<(String, u32)> {
    if !root_first {
        pems.reverse();
    }
    let count = pems.len();
    pems.into_iter()
        .enumerate()
        .map(|(index, pem)| {
            let depth = u32::try_from(count - 1 - index).unwrap_or(u32::MAX);
            (pem, depth)
        })
        .collect()
}

pub fn run_verify(args: &VerifyArgs, out: &mut dyn Write) -> Result<Verdict> {
    let mut config = VerifierConfig::load(args.config.as_deref())
        .context("failed to load verifier configuration")?;
    if let Some(source) = args.trust_store {
        config.trust_store = source;
    }
    if let Some(path) = &args.ca_bundle {
        config.ca_bundle_path = Some(path.clone());
    }

    let verifier =
        CertificateVerifier::standalone(config).context("failed to initialize verifier")?;

    let text = std::fs::read_to_string(&args.chain)
        .with_context(|| format!("failed to read {}", args.chain.display()))?;
    let pems = split_bundle(&text).context("failed to split PEM bundle")?;
    anyhow::ensure!(!pems.is_empty(), "{} holds no certificates", args.chain.display());

    info!(host = %args.host, certificates = pems.len(), "Replaying chain");

    let mut verdict = Verdict::Pending;
    for (pem, depth) in delivery_order(pems, args.root_first) {
        verdict = verifier.submit(&args.host, &pem, depth);
        writeln!(out, "depth {depth}: {}", describe(&verdict))?;
    }

    writeln!(out, "{}: {}", args.host, describe(&verdict))?;
    Ok(verdict)
}

pub fn run_inspect(args: &InspectArgs, out: &mut dyn Write) -> Result<()> {
    let text = std::fs::read_to_string(&args.chain)
        .with_context(|| format!("failed to read {}", args.chain.display()))?;
    let certs = CertificateDecoder::shared()
        .decode_bundle(&text)
        .context("failed to decode PEM bundle")?;

    for (index, cert) in certs.iter().enumerate() {
        writeln!(out, "[{index}] {}", cert.subject())?;
        writeln!(out, "    issuer:   {}", cert.issuer())?;
        writeln!(out, "    serial:   {}", cert.serial())?;
        writeln!(out, "    validity: {} .. {}", cert.not_before(), cert.not_after())?;
        writeln!(out, "    ca:       {}", cert.is_ca())?;
        writeln!(out, "    dns:      {}", cert.dns_names().join(", "))?;
        let ips = cert.ip_addresses().iter().map(ToString::to_string).collect::<Vec<_>>();
        writeln!(out, "    ip:       {}", ips.join(", "))?;
        writeln!(out, "    sha256:   {}", cert.fingerprint())?;
    }

    // Bundles are stored leaf first; the chain is built from delivery order.
    let mut received = certs;
    received.reverse();
    let chain = CertificateChain::from_received(received);
    writeln!(out, "linked: {}", if chain.is_linked() { "yes" } else { "no" })?;

    Ok(())
}

fn describe(verdict: &Verdict) -> String {
    match verdict {
        Verdict::Pending => "pending".to_string(),
        Verdict::Trusted => "trusted".to_string(),
        Verdict::Rejected(reason) => format!("rejected ({reason})"),
    }
}
