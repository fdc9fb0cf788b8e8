use clap::{Parser, Subcommand};
use esurfing_client::{Config, Supervisor, shutdown};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "esurfing-client")]
#[command(about = "Keeps ESurfing campus WLAN accounts logged in")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the network and log in whenever the portal intercepts (default)
    Run {
        /// Config file (TOML, or legacy JSON by extension)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Generate a sample config file
    Init {
        /// Where to write it; defaults to the user config directory
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG overrides the -v level
    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command.unwrap_or(Commands::Run { config: None }) {
        Commands::Run { config } => run(config).await,
        Commands::Init { path } => init(path),
    }
}

async fn run(config: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = config.unwrap_or_else(config_path);
    info!("Loading config from {}", path.display());
    let config = Config::load(&path).inspect_err(|e| error!("{}", e))?;

    let (trigger, shutdown) = shutdown::channel();
    ctrlc::set_handler(move || {
        info!("Shutting down...");
        trigger.fire();
    })?;

    let supervisor = Supervisor::start(&config, &shutdown).inspect_err(|e| error!("{}", e))?;
    supervisor.wait().await;
    Ok(())
}

fn init(path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = path.unwrap_or_else(Config::default_path);
    if path.exists() {
        println!("Config already exists: {}", path.display());
        return Ok(());
    }

    Config::sample().save(&path)?;
    println!("Created sample config: {}", path.display());
    println!("Edit the username and password, then run: esurfing-client run");
    Ok(())
}

/// The user config directory if a config lives there, else the working directory
fn config_path() -> PathBuf {
    let default = Config::default_path();
    if default.exists() {
        default
    } else {
        Path::new("config.toml").to_path_buf()
    }
}
