//! ddns-updater - keep a dynamic DNS record on the current public IP.

use clap::{Parser, Subcommand};
use ddns_updater::config::Config;
use ddns_updater::controller::Controller;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ddns-updater")]
#[command(about = "Keeps a dynamic DNS record pointing at the current public IP")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the update loop until SIGINT/SIGTERM (default)
    Run,

    /// Run a single check cycle and exit
    Check,

    /// Validate configuration
    Validate,

    /// Print an example configuration file
    ExampleConfig,
}

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Clean = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<Exit> for ExitCode {
    fn from(code: Exit) -> Self {
        ExitCode::from(code as u8)
    }
}

fn get_config_path(cli_path: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli_path {
        return path;
    }

    let candidates = [
        Config::default_path().ok(),
        Some(PathBuf::from("/etc/ddns-updater/config.toml")),
        Some(PathBuf::from("config.toml")),
    ];

    for candidate in candidates.into_iter().flatten() {
        if candidate.exists() {
            return candidate;
        }
    }

    // Missing file means defaults plus environment.
    Config::default_path().unwrap_or_else(|_| PathBuf::from("config.toml"))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level));
    let (filter, invalid) = match filter {
        Ok(filter) => (filter, false),
        Err(_) => (EnvFilter::new("info"), true),
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    if invalid {
        tracing::warn!("Unknown log level {:?}, using info", level);
    }
}

/// Wait for one signal source. A source that cannot be installed is
/// logged and never resolves, leaving the other source in charge.
async fn wait_for<F>(name: &str, signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => tracing::info!("{} received", name),
        Err(e) => {
            tracing::warn!("Cannot listen for {}: {}", name, e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(unix)]
async fn terminate() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn terminate() -> io::Result<()> {
    std::future::pending().await
}

/// Resolves once SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    tokio::select! {
        _ = wait_for("SIGINT", tokio::signal::ctrl_c()) => {}
        _ = wait_for("SIGTERM", terminate()) => {}
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);
    let config_path = get_config_path(cli.config);

    match dispatch(command, &config_path).await {
        Ok(code) => code.into(),
        Err(e) => {
            tracing::error!("{:#}", e);
            Exit::RuntimeError.into()
        }
    }
}

/// Run `command`. Only commands that need settings load the configuration.
async fn dispatch(command: Commands, config_path: &Path) -> anyhow::Result<Exit> {
    if let Commands::ExampleConfig = command {
        return cmd_example();
    }

    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            init_logging("info");
            tracing::error!("Failed to load {}: {}", config_path.display(), e);
            return Ok(Exit::ConfigError);
        }
    };
    init_logging(&config.log_level);

    match command {
        Commands::Run => cmd_run(config).await,
        Commands::Check => cmd_check(config).await,
        Commands::Validate => cmd_validate(config),
        Commands::ExampleConfig => cmd_example(),
    }
}

fn startup(config: Config) -> Result<Controller, Exit> {
    Controller::new(config).map_err(|e| {
        tracing::error!("{}", e);
        eprintln!("Required settings: DDNS_HOSTNAME, DDNS_USERNAME, DDNS_PASSWORD");
        Exit::ConfigError
    })
}

async fn cmd_run(config: Config) -> anyhow::Result<Exit> {
    let mut controller = match startup(config) {
        Ok(controller) => controller,
        Err(code) => return Ok(code),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    controller.run(shutdown_rx).await?;
    Ok(Exit::Clean)
}

async fn cmd_check(config: Config) -> anyhow::Result<Exit> {
    let mut controller = match startup(config) {
        Ok(controller) => controller,
        Err(code) => return Ok(code),
    };

    let outcomes = controller.run_cycle().await;
    tracing::info!("{}", controller.metrics().snapshot());

    if outcomes.iter().any(|outcome| outcome.is_failure()) {
        Ok(Exit::RuntimeError)
    } else {
        Ok(Exit::Clean)
    }
}

fn cmd_validate(config: Config) -> anyhow::Result<Exit> {
    match config.validated() {
        Ok(config) => {
            println!("Configuration OK");
            println!("  hostname: {}", config.hostname);
            println!("  families: {:?}", config.families());
            println!("  interval: {}s", config.check_interval_secs);
            Ok(Exit::Clean)
        }
        Err(e) => {
            println!("Configuration invalid: {}", e);
            Ok(Exit::ConfigError)
        }
    }
}

fn cmd_example() -> anyhow::Result<Exit> {
    print!("{}", Config::example().to_toml()?);
    Ok(Exit::Clean)
}
