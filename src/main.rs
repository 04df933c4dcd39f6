use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "kanbanmgr")]
#[command(version, about = "Deadline tracking and column transitions for a GitHub project board")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to ./kanbanmgr.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the webhook server with the daily deadline sweep
    Serve {
        /// Port to serve on (overrides SERVE_PORT and the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Create the deadline database and exit
    InitDb {
        /// Database path (overrides DB_PATH and the config file)
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Rebuild the board once, run a deadline sweep and exit
    Sweep,
    /// Show which deadline a title resolves to
    Parse {
        title: String,
        /// Reference instant (RFC 3339); defaults to now
        #[arg(long)]
        now: Option<String>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration
    Validate,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default = if verbose { "kanbanmgr=debug" } else { "kanbanmgr=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match &cli.command {
        Commands::Serve { port } => cmd::cmd_serve(&cli, *port).await?,
        Commands::InitDb { db_path } => cmd::cmd_init_db(&cli, db_path.clone())?,
        Commands::Sweep => cmd::cmd_sweep(&cli).await?,
        Commands::Parse { title, now } => cmd::cmd_parse(title, now.as_deref())?,
        Commands::Config { command } => cmd::cmd_config(&cli, command.clone())?,
    }

    Ok(())
}
