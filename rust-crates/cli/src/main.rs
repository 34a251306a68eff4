use clap::{
    ArgGroup,
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::{
    DeploymentEnv,
    DeploymentStore,
};
use solana_sdk::pubkey::Pubkey;
use std::{
    sync::Arc,
    time::Duration,
};
use tokenpo_client::{
    ClientConfig,
    ControllerSnapshot,
    KeypairWallet,
    Move,
    NetworkTarget,
    SessionController,
    SolanaRpc,
    TxError,
    config::parse_commitment,
    constants::{
        DEFAULT_PROGRAM_ID,
        DEFAULT_TREASURY,
    },
    parse_identity,
    state::short_identity,
    wallet::{
        expand_path,
        find_wallet,
        resolve_wallet_dir,
        unlock_wallet,
    },
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

const DEFAULT_KEYPAIR_PATH: &str = "~/.config/solana/id.json";

#[derive(Parser, Debug)]
#[command(
    name = "tokenpo",
    about = "Play rock-paper-scissors against the on-chain program",
    version,
    group(
        ArgGroup::new("network")
            .args(["devnet", "testnet", "local"])
            .required(true)
    )
)]
struct Args {
    /// Connect to Solana devnet
    #[arg(long)]
    devnet: bool,

    /// Connect to Solana testnet
    #[arg(long)]
    testnet: bool,

    /// Connect to a local validator
    #[arg(long)]
    local: bool,

    /// Override the RPC URL for the selected network
    #[arg(long)]
    rpc_url: Option<String>,

    /// Keypair file to sign with (defaults to ~/.config/solana/id.json)
    #[arg(long, conflicts_with = "wallet")]
    keypair: Option<String>,

    /// Named wallet in the wallet directory
    #[arg(long)]
    wallet: Option<String>,

    /// Override the wallet directory (defaults to ~/.config/solana/wallets)
    #[arg(long)]
    wallet_dir: Option<String>,

    /// Program id (defaults to the stored deployment, then the devnet program)
    #[arg(long)]
    program_id: Option<String>,

    /// Treasury receiving play fees
    #[arg(long)]
    treasury: Option<String>,

    /// processed, confirmed or finalized
    #[arg(long, default_value = "confirmed")]
    commitment: String,

    /// Seconds to wait for a confirmation before giving up
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Write logs to a daily rolling file in this directory
    #[arg(long)]
    log_dir: Option<String>,

    /// Store the effective program id and treasury for this network
    #[arg(long)]
    save_deployment: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show session state and balances
    Status,
    /// Pay 0.01 SOL for 5 plays
    Pay,
    /// Play one or more rounds
    Play {
        /// rock, paper or scissors
        player_move: Move,

        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let _log_guard = init_tracing(args.log_dir.as_deref())?;
    tracing::info!("starting tokenpo client");
    deployments::ensure_structure().map_err(|e| eyre!(e))?;

    let (env, network) = network_from_args(&args);
    let config = client_config(&args, env, &network)?;
    let wallet = load_wallet(&args)?;

    let rpc = Arc::new(SolanaRpc::new(network.url(), config.commitment));
    let controller = SessionController::connect(rpc, Arc::new(wallet), config);

    let result = run_command(&controller, &network, &args.command).await;
    let stats = controller.disconnect();
    if stats.total_plays > 0 {
        println!(
            "Session stats: {} plays, {} wins, {} losses, {} ties ({:.1}% win rate, estimated)",
            stats.total_plays,
            stats.wins,
            stats.losses,
            stats.ties,
            stats.win_rate()
        );
    }
    result
}

fn init_tracing(log_dir: Option<&str>) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_dir {
        Some(dir) => {
            let appender = rolling::daily(expand_path(dir), "tokenpo.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|e| eyre!("failed to initialize logging: {e}"))?;
            Ok(Some(guard))
        }
        None => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| eyre!("failed to initialize logging: {e}"))?;
            Ok(None)
        }
    }
}

fn network_from_args(args: &Args) -> (DeploymentEnv, NetworkTarget) {
    let (env, network) = if args.devnet {
        (DeploymentEnv::Dev, NetworkTarget::devnet())
    } else if args.testnet {
        (DeploymentEnv::Test, NetworkTarget::testnet())
    } else {
        (DeploymentEnv::Local, NetworkTarget::local())
    };
    match &args.rpc_url {
        Some(url) => (env, network.with_url(url.clone())),
        None => (env, network),
    }
}

fn client_config(
    args: &Args,
    env: DeploymentEnv,
    network: &NetworkTarget,
) -> Result<ClientConfig> {
    let store = DeploymentStore::new(env).map_err(|e| eyre!(e))?;
    let record = store
        .load()
        .map_err(|e| eyre!(e))
        .wrap_err("loading deployment record")?;

    let program_id = resolve_key(
        args.program_id.as_deref(),
        record.as_ref().map(|r| r.program_id.as_str()),
        DEFAULT_PROGRAM_ID,
    )?;
    let treasury = resolve_key(
        args.treasury.as_deref(),
        record.as_ref().map(|r| r.treasury.as_str()),
        DEFAULT_TREASURY,
    )?;
    let commitment = parse_commitment(&args.commitment)
        .ok_or_else(|| eyre!("unknown commitment level '{}'", args.commitment))?;

    if args.save_deployment {
        store
            .save(deployments::new_record(
                program_id.to_string(),
                treasury.to_string(),
                network.url(),
            ))
            .map_err(|e| eyre!(e))?;
        println!("Saved deployment for {env} to {}", store.path().display());
    }

    Ok(ClientConfig {
        program_id,
        treasury,
        commitment,
        confirm_timeout: Duration::from_secs(args.timeout_secs),
        ..ClientConfig::default()
    })
}

// flag, then stored record, then built-in default
fn resolve_key(flag: Option<&str>, stored: Option<&str>, default: Pubkey) -> Result<Pubkey> {
    match flag.or(stored) {
        Some(raw) => Ok(parse_identity(raw)?),
        None => Ok(default),
    }
}

fn load_wallet(args: &Args) -> Result<KeypairWallet> {
    if let Some(name) = args.wallet.as_deref() {
        let dir = resolve_wallet_dir(args.wallet_dir.as_deref())?;
        let descriptor = find_wallet(&dir, name)?;
        return Ok(unlock_wallet(&descriptor)?);
    }
    let path = expand_path(args.keypair.as_deref().unwrap_or(DEFAULT_KEYPAIR_PATH));
    KeypairWallet::from_file(&path)
        .wrap_err_with(|| format!("loading keypair {}", path.display()))
}

async fn run_command(
    controller: &SessionController,
    network: &NetworkTarget,
    command: &Command,
) -> Result<()> {
    controller.ensure_session().await?;
    match command {
        Command::Status => {
            controller.refresh_balances().await?;
            print_snapshot(&controller.snapshot());
        }
        Command::Pay => {
            let signature = controller.pay_for_plays().await?;
            println!("Paid for plays: {signature}");
            println!("  {}", network.explorer_tx_url(&signature.to_string()));
            print_snapshot(&controller.snapshot());
        }
        Command::Play {
            player_move,
            repeat,
        } => play_rounds(controller, network, *player_move, *repeat).await?,
    }
    Ok(())
}

async fn play_rounds(
    controller: &SessionController,
    network: &NetworkTarget,
    player_move: Move,
    repeat: u32,
) -> Result<()> {
    for round in 1..=repeat {
        match controller.make_play(player_move).await {
            Ok(outcome) => {
                println!(
                    "Round {round}: {} vs {} → {} (estimated)",
                    outcome.player_move, outcome.counter_move, outcome.result
                );
                println!(
                    "  {}",
                    network.explorer_tx_url(&outcome.signature.to_string())
                );
            }
            Err(TxError::NoPlaysLeft) => {
                println!("No plays left! Run `tokenpo pay` to buy 5 more.");
                break;
            }
            Err(err) => {
                if err.is_outcome_unknown() {
                    println!(
                        "The last play may or may not have landed; run `tokenpo status` before playing again."
                    );
                }
                return Err(err.into());
            }
        }
    }
    print_snapshot(&controller.snapshot());
    Ok(())
}

fn print_snapshot(snapshot: &ControllerSnapshot) {
    println!("Wallet    {}", short_identity(&snapshot.owner));
    println!("Session   {}", snapshot.session_address);
    println!("State     {}", snapshot.phase);
    println!("Balance   {:.4} SOL", snapshot.balances.player_sol());
    println!("Treasury  {:.4} SOL", snapshot.balances.treasury_sol());
    if snapshot.stats.total_plays > 0 {
        println!(
            "Stats     {} plays, {} wins, {} losses, {} ties ({:.1}% win rate)",
            snapshot.stats.total_plays,
            snapshot.stats.wins,
            snapshot.stats.losses,
            snapshot.stats.ties,
            snapshot.stats.win_rate()
        );
    }
    if snapshot.stale {
        println!("Session state is stale; refresh before the next operation.");
    }
    println!("Status    {}", snapshot.status);
    for err in &snapshot.errors {
        println!("  ! {err}");
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args__definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn args__network_flag_is_required() {
        let parsed = Args::try_parse_from(["tokenpo", "status"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn args__play_parses_move_and_repeat() {
        let args =
            Args::try_parse_from(["tokenpo", "--devnet", "play", "scissors", "--repeat", "3"])
                .unwrap();
        match args.command {
            Command::Play {
                player_move,
                repeat,
            } => {
                assert_eq!(player_move, Move::Scissors);
                assert_eq!(repeat, 3);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn network_from_args__rpc_url_overrides_default() {
        let args =
            Args::try_parse_from(["tokenpo", "--testnet", "--rpc-url", "http://node:8899", "pay"])
                .unwrap();

        let (env, network) = network_from_args(&args);

        assert_eq!(env, DeploymentEnv::Test);
        assert_eq!(network.url(), "http://node:8899");
    }

    #[test]
    fn resolve_key__flag_beats_stored_record() {
        let flag = Pubkey::new_unique();
        let stored = Pubkey::new_unique();

        let key = resolve_key(
            Some(&flag.to_string()),
            Some(&stored.to_string()),
            DEFAULT_PROGRAM_ID,
        )
        .unwrap();

        assert_eq!(key, flag);
    }

    #[test]
    fn resolve_key__nothing_given__uses_default() {
        let key = resolve_key(None, None, DEFAULT_TREASURY).unwrap();
        assert_eq!(key, DEFAULT_TREASURY);
    }
}
