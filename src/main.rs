// ABOUTME: Main entry point for parley - console group chat with LLM agents and reminders
// ABOUTME: Initializes logging and config, then runs the chat or an offline reminder command

use anyhow::Result;
use clap::Parser;
use parley::app::{self, App};
use parley::console::{self, Console, ConsoleOutput};
use parley::reminders_cli::{self, ReminderAction};
use parley::{config::Config, logging, metrics, paths};
use parley_agent::BackendRegistry;
use parley_core::ReminderStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: PARLEY_CONFIG_PATH, ./parley.toml, then the XDG config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log more to stderr (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the console chat (default)
    Run,
    /// Manage the reminder file without starting the chat
    Reminders {
        /// Reminder file (default: scheduler.reminders_file, then the XDG data dir)
        #[arg(long)]
        file: Option<PathBuf>,

        #[command(subcommand)]
        action: ReminderAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Log panics before they take the process down
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\nPANIC: {}", panic_info);
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let guard = logging::init_logging(&paths::log_dir(), cli.verbose)?;

    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    tracing::debug!(config = ?config, "Configuration loaded");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            run_chat(config).await?;
            drop(guard);
            // The blocking stdin reader cannot be cancelled and would hold up runtime shutdown
            std::process::exit(0);
        }
        Commands::Reminders { file, action } => {
            let path = file
                .or_else(|| config.scheduler.reminders_path())
                .unwrap_or_else(paths::reminders_file);
            let store = ReminderStore::new(path);
            for line in reminders_cli::run(&store, config.scheduler.tz()?, action)? {
                println!("{line}");
            }
            Ok(())
        }
    }
}

async fn run_chat(config: Config) -> Result<()> {
    if let Some(listen) = config.metrics.listen {
        metrics::init_metrics(listen)?;
    }

    let model = app::model_client(&config)?;
    let backends = BackendRegistry::default();
    let app = App::build(config, Arc::new(ConsoleOutput), model, &backends)?;

    println!(
        "Welcome to {}. Messages without a mention go to @{}. Type HELP for commands.",
        app.config().chat.name,
        app.config().chat.default_recipient
    );

    let running = app.start();
    let watcher = console::spawn_log_watcher(Arc::clone(app.router()));
    let console = Console::new(
        Arc::clone(app.router()),
        Arc::clone(app.scheduler()),
        app.config().chat.default_recipient.clone(),
    );

    tokio::select! {
        _ = console.run(BufReader::new(tokio::io::stdin())) => {}
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => tracing::info!("Interrupted"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
            }
        }
    }

    app.shutdown(running).await;
    watcher.abort();
    println!("\nGoodbye.");
    Ok(())
}
