use anyhow::{
    Context,
    Result,
    ensure,
};
use clap::{
    ArgGroup,
    Args,
    Parser,
    Subcommand,
};
use deployments::{
    DEPLOYMENTS_ROOT,
    DeploymentEnv,
    DeploymentStore,
    compute_manifest_hash,
    ensure_structure,
    record_deployment,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    process::Command,
};

const DEFAULT_RPC_URL: &str = "http://localhost:5050";
const DEFAULT_TORII_URL: &str = "http://localhost:8080";

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Tic-tac-toe client helper tasks (clippy, tests, deployment records)",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run clippy for the entire workspace with warnings-as-errors
    Clippy,
    /// Run the workspace tests
    Test {
        /// Only run the client's integration tests
        #[arg(long)]
        integration_only: bool,
    },
    /// Record a migrated world so the client can find it
    RecordDeployment(RecordArgs),
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("network")
        .args(["local", "dev", "test"])
        .required(true)
))]
struct RecordArgs {
    #[arg(long)]
    world_address: String,

    /// World manifest written by the migration, hashed to detect redeploys
    #[arg(long)]
    manifest: PathBuf,

    #[arg(long, default_value = DEFAULT_RPC_URL)]
    rpc_url: String,

    #[arg(long, default_value = DEFAULT_TORII_URL)]
    torii_url: String,

    #[arg(long, default_value_t = 0)]
    game_id: u32,

    /// Account the client signs with
    #[arg(long)]
    account: Option<String>,

    #[arg(long)]
    action_timeout_ms: Option<u64>,

    #[arg(long)]
    local: bool,

    #[arg(long)]
    dev: bool,

    #[arg(long)]
    test: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = repo_root();

    match cli.command {
        Commands::Clippy => run_clippy(&root)?,
        Commands::Test { integration_only } => run_tests(&root, integration_only)?,
        Commands::RecordDeployment(args) => record(&root, args)?,
    }

    Ok(())
}

fn repo_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("xtask has no parent directory")
        .to_path_buf()
}

fn record(root: &Path, args: RecordArgs) -> Result<()> {
    let env = if args.local {
        DeploymentEnv::Local
    } else if args.dev {
        DeploymentEnv::Dev
    } else {
        DeploymentEnv::Test
    };
    let deployments_root = root.join(DEPLOYMENTS_ROOT);
    ensure_structure(&deployments_root).context("initializing deployment directories")?;
    let store = DeploymentStore::with_root(deployments_root.to_string_lossy(), env)
        .context("opening deployment store")?;

    let manifest_hash =
        compute_manifest_hash(&args.manifest).context("hashing world manifest")?;
    if let Some(previous) = store.load().context("loading previous deployment")? {
        if previous.is_compatible_with_hash(&manifest_hash) {
            println!("Manifest unchanged since {}", previous.deployed_at);
        } else {
            println!(
                "Manifest changed, replacing world {} on {env}",
                previous.world_address
            );
        }
    }

    let mut record = record_deployment(
        &store,
        &args.world_address,
        &manifest_hash,
        &args.rpc_url,
        &args.torii_url,
    )?;
    record.game_id = args.game_id;
    record.account_address = args.account;
    record.action_timeout_ms = args.action_timeout_ms;
    store.save(record.clone())?;
    println!(
        "Recorded world {} on {env} at {}",
        record.world_address,
        store.path().display()
    );
    Ok(())
}

fn run_clippy(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("clippy")
        .arg("--workspace")
        .arg("--all-targets")
        .arg("--all-features")
        .arg("--")
        .arg("-D")
        .arg("warnings")
        .current_dir(root);
    run_command(cmd, "cargo clippy")?;
    Ok(())
}

fn run_tests(root: &Path, integration_only: bool) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("test").current_dir(root);
    if integration_only {
        cmd.arg("-p").arg("tictactoe-client").arg("--tests");
        run_command(cmd, "cargo test -p tictactoe-client --tests")?;
    } else {
        cmd.arg("--workspace");
        run_command(cmd, "cargo test --workspace")?;
    }
    Ok(())
}

fn run_command(mut cmd: Command, label: &str) -> Result<()> {
    println!("Running: {}", label);
    let status = cmd
        .status()
        .with_context(|| format!("failed to run {label}"))?;
    ensure!(status.success(), "{label} failed with status {status}");
    Ok(())
}
