use clap::{Parser, Subcommand, ValueEnum};
use courier::engine::{Engine, StopReason};
use courier::store::Database;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Signal group message processor", long_about = None)]
struct Cli {
    /// Log level (overrides RUST_LOG; default info)
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Write a template config (if missing) and create the attachment directory.
    Init {
        /// Config file path (default: COURIER_CONFIG_PATH or ./config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Start signal-cli in jsonRpc mode and record group messages until interrupted.
    Run {
        /// Config file path (default: COURIER_CONFIG_PATH or ./config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Print the most recent stored messages as JSON lines.
    List {
        /// Config file path (default: COURIER_CONFIG_PATH or ./config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Number of messages to print.
        #[arg(long, short = 'n', default_value_t = 20)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = cli.log_level {
        logger.filter_level(level.filter());
    }
    logger.init();

    match cli.command {
        Some(Commands::Version) => {
            println!("courier {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config }) => {
            if let Err(e) = run_ingest(config).await {
                log::error!("run failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::List { config, limit }) => {
            if let Err(e) = run_list(config, limit) {
                log::error!("list failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(courier::config::default_config_path);
    let attachment_dir = courier::init::init_config(&path)?;
    println!(
        "initialized {} (attachments in {}); set phoneNumber before `courier run`",
        path.display(),
        attachment_dir.display()
    );
    Ok(())
}

async fn run_ingest(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = courier::config::load_config(config_path)?;
    let startup = courier::init::prepare(&config, &path)?;
    let store = Database::open(&startup.database_path)?;

    let (agent, transport) =
        courier::supervisor::spawn_agent(&startup.signal_cli, &startup.phone_number)?;
    log::info!(
        "signal-cli running (pid {}), writing attachments to {}",
        agent.id().map(|p| p.to_string()).unwrap_or_else(|| "?".to_string()),
        startup.attachment_dir.display()
    );

    let mut engine = Engine::new(transport, store, startup.attachment_dir)
        .with_pending_ttl(startup.pending_ttl);
    let outcome = engine.run(shutdown_signal()).await;
    match &outcome {
        Ok(StopReason::Shutdown) => log::info!("shutting down"),
        Ok(StopReason::Eof) => log::warn!("signal-cli closed its output, shutting down"),
        Err(_) => log::error!("ingestion stopped on a fatal error, shutting down"),
    }

    let (transport, store) = engine.into_parts();
    if let Err(e) = agent.shutdown(transport).await {
        log::warn!("stopping signal-cli: {:#}", e);
    }
    store.close()?;
    log::info!("database closed");

    outcome.map(|_| ())
}

fn run_list(config_path: Option<PathBuf>, limit: u32) -> anyhow::Result<()> {
    let (config, path) = courier::config::load_config(config_path)?;
    let db_path = courier::config::resolve_database_path(&config, &path);
    if !db_path.exists() {
        anyhow::bail!("database not found: {}", db_path.display());
    }
    let store = Database::open(&db_path)?;
    for row in store.recent_messages(limit)? {
        println!("{}", serde_json::to_string(&row)?);
    }
    Ok(())
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}
