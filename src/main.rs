use clap::{
    ArgGroup,
    Parser,
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
use std::{
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tictactoe_client::{
    ActionDispatcher,
    Account,
    EngineConfig,
    Outcome,
    SessionContext,
    feed::run_feed,
    generated_abi::Player,
    in_memory_world::InMemoryWorld,
    init_tracing,
    query::SubscriptionQuery,
    store::GameStore,
};
use tracing::{
    info,
    warn,
};

const DEFAULT_ACCOUNT: &str = "0x0127fd5f1fe78a71f8bcd1fec63e3fe2f0486b6ecd5c86a0466c3a21fa5cfcec";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Plays a scripted tic-tac-toe game with optimistic updates",
    long_about = None,
    group(
        ArgGroup::new("network")
            .args(["local", "dev", "test"])
            .required(true)
    )
)]
struct Args {
    /// Moves as `x,y` pairs, alternating X and O
    #[arg(value_parser = parse_move, default_values = ["1,1", "0,0", "0,2", "2,0", "1,0", "1,2", "0,1", "2,1", "2,2"])]
    moves: Vec<(u8, u8)>,

    /// Simulated round trip of every action
    #[arg(long, default_value_t = 150)]
    latency_ms: u64,

    #[arg(long, default_value = ".deployments")]
    deployments_dir: String,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    #[arg(long, default_value = "false")]
    trace_stdout: bool,

    #[arg(long)]
    local: bool,

    #[arg(long)]
    dev: bool,

    #[arg(long)]
    test: bool,
}

fn parse_move(raw: &str) -> Result<(u8, u8), String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got `{raw}`"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<u8>()
            .map_err(|e| format!("bad coordinate `{part}`: {e}"))
    };
    Ok((parse(x)?, parse(y)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let _guard = init_tracing(&args.log_dir, args.trace_stdout);

    let env = if args.local {
        DeploymentEnv::Local
    } else if args.dev {
        DeploymentEnv::Dev
    } else {
        DeploymentEnv::Test
    };
    let store = DeploymentStore::with_root(&args.deployments_dir, env)
        .map_err(|e| eyre!("{e:#}"))
        .wrap_err("opening deployments store")?;
    let record = store
        .load()
        .map_err(|e| eyre!("{e:#}"))
        .wrap_err("loading deployment record")?;
    let (config, game_id, address) = match &record {
        Some(record) => {
            info!(world = %record.world_address, %env, "using deployment record");
            let address = record
                .account_address
                .clone()
                .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string());
            (EngineConfig::from(record), record.game_id, address)
        }
        None => {
            warn!(%env, "no deployment recorded, using defaults");
            (EngineConfig::default(), 0, DEFAULT_ACCOUNT.to_string())
        }
    };

    let account = Account::new(address);
    let session = SessionContext::new(account.clone());
    let (world, feed) = InMemoryWorld::new(
        game_id,
        Duration::from_millis(args.latency_ms),
        config.feed_buffer,
    );
    let game = GameStore::new(SubscriptionQuery::for_game(game_id, Some(&account)));
    let feed_task = tokio::spawn(run_feed(feed, game.clone()));
    let dispatcher = ActionDispatcher::new(game, Arc::new(world), config);

    let handle = dispatcher
        .initialize(&session)
        .into_handle()
        .ok_or_else(|| eyre!("initialize was not dispatched"))?;
    if let Outcome::Reverted(err) = handle.outcome().await {
        return Err(eyre!(err).wrap_err("initializing game"));
    }
    println!("game {game_id} started by {}", account.address());

    let mut player = Player::X;
    for (x, y) in args.moves {
        session.selection.select(player);
        let submission = dispatcher.play(&session, x, y);
        if let Some(reason) = submission.ignored() {
            println!("\n{} at ({x}, {y}) ignored: {reason:?}", player.symbol());
            if dispatcher.view().is_won() {
                break;
            }
            continue;
        }
        println!("\n{} plays ({x}, {y})\n{}", player.symbol(), dispatcher.view());
        let Some(handle) = submission.into_handle() else {
            continue;
        };
        match handle.outcome().await {
            Outcome::Confirmed(receipt) => {
                info!(tx = %receipt.transaction_hash, "move confirmed");
                player = player.opponent();
            }
            Outcome::Reverted(err) => println!("move reverted: {err}"),
        }
    }

    let mut views = dispatcher.subscribe();
    let settled = tokio::time::timeout(
        Duration::from_secs(1),
        views.wait_for(|view| view.optimistic_count() == 0),
    )
    .await
    .is_ok_and(|changed| changed.is_ok());
    if !settled {
        warn!("predictions still outstanding at exit");
    }
    println!("\nfinal board\n{}", dispatcher.view());
    drop(dispatcher);
    feed_task
        .await
        .wrap_err("subscription task panicked")?
        .wrap_err("subscription feed failed")?;
    Ok(())
}
