use std::path::PathBuf;

use alloy::signers::local::PrivateKeySigner;
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use pry::config;
use pry::domain::{ConsoleSink, Report};
use pry::infrastructure::{AlloyLedger, EtherscanClient, ProviderConfig};
use pry::inspect::{self, Findings, DEFAULT_HISTORY, DEFAULT_SLOTS};
use pry::runner::{parse_address, ExploitPlan, ExploitRunner};

#[derive(Debug, Parser)]
#[command(
    name = "pry",
    version,
    about = "Pry: owner-takeover exploit runner for Ethereum CTF challenges"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    endpoint: EndpointArgs,

    /// Config file (defaults to $PRY_CONFIG or ~/.config/pry/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log RPC traffic (-v) or everything (-vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Args)]
struct EndpointArgs {
    /// HTTP JSON-RPC endpoint (e.g. http://localhost:8545)
    #[arg(long, global = true)]
    rpc: Option<String>,

    /// WebSocket endpoint (e.g. ws://localhost:8546)
    #[arg(long, global = true)]
    ws: Option<String>,

    /// IPC path (e.g. ~/.ethereum/geth.ipc). Unix only.
    #[arg(long, global = true)]
    ipc: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Take over the target's owner slot and drain it
    Run(RunArgs),

    /// Enumerate an account: balance, nonce, code, storage, tokens and history
    Inspect(InspectArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Setup contract address (overrides [setup].address)
    #[arg(long)]
    setup: Option<String>,

    /// Signer private key (defaults to the env var named by [endpoint].key_env)
    #[arg(long)]
    private_key: Option<String>,
}

#[derive(Debug, Args)]
struct InspectArgs {
    /// Account or contract address
    address: String,

    /// Number of leading storage slots to read
    #[arg(long, default_value_t = DEFAULT_SLOTS)]
    slots: u64,

    /// ERC-20 token to read the account's balance of (repeatable)
    #[arg(long = "token")]
    tokens: Vec<String>,

    /// Number of most recent explorer transactions to list
    #[arg(long, default_value_t = DEFAULT_HISTORY)]
    history: usize,

    /// Explorer API key (defaults to the env var named by [explorer].key_env)
    #[arg(long)]
    explorer_key: Option<String>,

    /// Save verified source of every contract found into this directory
    #[arg(long)]
    source_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = config::load(cli.config.as_deref())?;
    let endpoint = endpoint_from_args_and_config(&cli.endpoint, &config)?;
    tracing::debug!(endpoint = %endpoint.display(), "endpoint selected");

    match cli.command {
        Commands::Run(args) => run_exploit(args, &config, endpoint).await,
        Commands::Inspect(args) => run_inspect(args, &config, endpoint).await,
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "info,pry=debug",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

async fn run_exploit(args: RunArgs, config: &config::Config, endpoint: ProviderConfig) -> Result<()> {
    let plan = ExploitPlan::from_config(config, args.setup.as_deref())?;
    let signer = load_signer(args.private_key.as_deref(), &config.endpoint.key_env)?;

    let ledger = AlloyLedger::connect(&endpoint, signer)
        .await
        .with_context(|| format!("failed to connect to {}", endpoint.display()))?;

    let mut runner = ExploitRunner::new(&ledger, &plan, ConsoleSink::stdout())?;
    let outcome = match runner.run().await {
        Ok(outcome) => outcome,
        Err(err) => {
            let observed = runner.observations().len();
            return Err(err).with_context(|| format!("run aborted after {observed} observations"));
        }
    };

    if !outcome.solved {
        bail!("all writes finalized but {} is still false", plan.solved.signature);
    }
    Ok(())
}

async fn run_inspect(args: InspectArgs, config: &config::Config, endpoint: ProviderConfig) -> Result<()> {
    let address = parse_address(&args.address)?;
    let tokens = args
        .tokens
        .iter()
        .map(|raw| parse_address(raw))
        .collect::<Result<Vec<_>>>()?;
    let ledger = AlloyLedger::connect_read_only(&endpoint)
        .await
        .with_context(|| format!("failed to connect to {}", endpoint.display()))?;

    let mut report = Report::new();
    let mut sink = ConsoleSink::stdout();

    let snapshot = inspect::inspect(&ledger, address, args.slots).await?;
    snapshot.write_report(&mut report, &mut sink);

    for token in tokens {
        let balance = inspect::token_balance(&ledger, token, address).await?;
        balance.write_report(&mut report, &mut sink);
    }

    let api_key = args
        .explorer_key
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .or_else(|| config.explorer.api_key());
    let Some(api_key) = api_key else {
        tracing::info!(
            "no explorer API key (--explorer-key or ${}), skipping history",
            config.explorer.key_env
        );
        return Ok(());
    };

    let explorer = EtherscanClient::new(&config.explorer.url, &api_key, snapshot.chain_id)?;
    let history = inspect::enumerate_history(&ledger, &explorer, address, args.history).await?;
    history.write_report(&mut report, &mut sink);

    if let Some(dir) = args.source_dir {
        for contract in &history.contracts {
            if let Some(path) = contract.write_source(&dir)? {
                tracing::info!(contract = %contract.address, path = %path.display(), "source saved");
            }
        }
    }
    Ok(())
}

fn load_signer(flag: Option<&str>, key_env: &str) -> Result<PrivateKeySigner> {
    let raw = match flag.map(str::trim).filter(|s| !s.is_empty()) {
        Some(key) => key.to_string(),
        None => std::env::var(key_env)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .with_context(|| format!("no private key: pass --private-key or set {key_env}"))?,
    };
    raw.trim()
        .parse::<PrivateKeySigner>()
        .context("private key is not a valid secp256k1 key")
}

fn endpoint_from_args_and_config(
    args: &EndpointArgs,
    config: &config::Config,
) -> Result<ProviderConfig> {
    fn non_empty(value: Option<&str>) -> Option<&str> {
        value.map(str::trim).filter(|s| !s.is_empty())
    }

    // CLI arguments take precedence
    if let Some(ipc) = args.ipc.clone() {
        return ipc_endpoint(ipc);
    }
    if let Some(ws) = non_empty(args.ws.as_deref()) {
        return ProviderConfig::websocket(ws);
    }
    if let Some(rpc) = non_empty(args.rpc.as_deref()) {
        return ProviderConfig::from_url(&normalize_http_endpoint(rpc));
    }

    // Config file
    if let Some(ipc) = non_empty(config.endpoint.ipc.as_deref()) {
        return ipc_endpoint(expand_path(ipc));
    }
    if let Some(ws) = non_empty(config.endpoint.ws.as_deref()) {
        return ProviderConfig::websocket(ws);
    }
    if let Some(rpc) = non_empty(config.endpoint.rpc.as_deref()) {
        return ProviderConfig::from_url(&normalize_http_endpoint(rpc));
    }

    // Default fallback
    Ok(ProviderConfig::Http(normalize_http_endpoint("localhost:8545")))
}

#[cfg(unix)]
fn ipc_endpoint(path: PathBuf) -> Result<ProviderConfig> {
    Ok(ProviderConfig::Ipc(path))
}

#[cfg(not(unix))]
fn ipc_endpoint(_path: PathBuf) -> Result<ProviderConfig> {
    Err(anyhow::anyhow!("IPC is not supported on this platform"))
}

fn normalize_http_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

fn expand_path(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(raw)
}
