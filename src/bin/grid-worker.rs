// Grid Trading Worker - CLI
// Runs the multi-bot scheduler and manages individual bots

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};

use grid_bot_worker::{
    start_bot, status_snapshot, stop_bot, BinanceGatewayFactory, BotLog, Database, WorkerConfig,
    WorkerOrchestrator,
};

#[derive(Parser)]
#[command(name = "grid-worker")]
#[command(version = "0.2.0")]
#[command(about = "Multi-bot grid trading worker", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default configuration file and database
    Init,

    /// Run the worker loop for all running bots
    Run {
        /// Process a single bot only
        #[arg(long)]
        bot_id: Option<i64>,

        /// Run one scheduling pass and exit
        #[arg(long)]
        once: bool,
    },

    /// Mark a bot as running so the worker picks it up
    Start {
        #[arg(long)]
        bot_id: i64,
    },

    /// Request a graceful stop for a bot
    Stop {
        #[arg(long)]
        bot_id: i64,
    },

    /// Print a bot's status snapshot as JSON
    Status {
        #[arg(long)]
        bot_id: i64,
    },

    /// Show the newest log entries for a bot
    Logs {
        #[arg(long)]
        bot_id: i64,

        #[arg(long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    std::env::set_var("RUST_LOG", log_level);
    tracing_subscriber::fmt::init();

    match cli.command {
        Commands::Init => {
            let config = WorkerConfig::load_or_create(&cli.config)?;
            let db = Database::new(&config.worker.database_path)?;
            db.run_migrations()?;
            info!("Created {} and {}", cli.config, config.worker.database_path);
            Ok(())
        }

        Commands::Run { bot_id, once } => {
            let config = load_config_or_exit(&cli.config);
            let db = Database::new(&config.worker.database_path)?;
            db.run_migrations()?;

            let factory = Arc::new(BinanceGatewayFactory::new(config.venue.clone()));
            let mut orchestrator =
                WorkerOrchestrator::new(db, factory, &config).with_bot_filter(bot_id);

            if once {
                orchestrator.cycle().await;
                orchestrator.drain().await;
                return Ok(());
            }

            tokio::select! {
                _ = orchestrator.run() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested, waiting for in-flight ticks");
                }
            }
            orchestrator.drain().await;
            Ok(())
        }

        Commands::Start { bot_id } => {
            let config = load_config_or_exit(&cli.config);
            let db = Database::new(&config.worker.database_path)?;
            db.run_migrations()?;
            start_bot(&db, bot_id)?;
            info!("Bot #{} marked running", bot_id);
            Ok(())
        }

        Commands::Stop { bot_id } => {
            let config = load_config_or_exit(&cli.config);
            let db = Database::new(&config.worker.database_path)?;
            db.run_migrations()?;
            stop_bot(&db, bot_id)?;
            info!("Bot #{} marked stopped", bot_id);
            Ok(())
        }

        Commands::Status { bot_id } => {
            let config = load_config_or_exit(&cli.config);
            let db = Database::new(&config.worker.database_path)?;
            db.run_migrations()?;
            let report = status_snapshot(&db, bot_id)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }

        Commands::Logs { bot_id, limit } => {
            let config = load_config_or_exit(&cli.config);
            let db = Database::new(&config.worker.database_path)?;
            db.run_migrations()?;

            let logs = BotLog::list_by_bot(db.connection(), bot_id, limit)?;
            for entry in logs.iter().rev() {
                println!(
                    "[{}] [{}] {}",
                    entry.created_at.as_deref().unwrap_or("-"),
                    entry.level.as_str(),
                    entry.message
                );
            }
            Ok(())
        }
    }
}

fn load_config_or_exit(path: &str) -> WorkerConfig {
    match WorkerConfig::load_or_create(path) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
