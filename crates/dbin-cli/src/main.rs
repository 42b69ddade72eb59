//! dbin - ephemeral databases in containers

use clap::{Parser, Subcommand};
use dbin_cli::commands;
use dbin_config::{Catalog, GlobalConfig};
use dbin_core::{shutdown_signal, Coordinator, TerminalLauncher};
use dbin_provider::{create_default_provider, ContainerProvider, ProviderType};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "dbin")]
#[command(author, version, about = "Throwaway databases in containers", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override default provider (docker or podman)
    #[arg(long, global = true, value_parser = ["docker", "podman"])]
    provider: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a database, attach its client, and remove everything on exit
    #[command(visible_alias = "run")]
    Start {
        /// Database name (see `dbin list`)
        database: String,
        /// Keep data in this host directory instead of inside the container
        #[arg(long, value_name = "DIR")]
        data_dir: Option<String>,
        /// Stream container logs to stderr
        #[arg(long)]
        debug: bool,
        /// Publish the database on this host port instead of a random one
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List available databases
    List,

    /// Remove containers and networks left behind by interrupted runs
    Cleanup {
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show or edit global configuration
    Config {
        /// Open config in editor
        #[arg(short, long)]
        edit: bool,
    },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = GlobalConfig::load().unwrap_or_else(|e| {
        tracing::warn!("Ignoring unreadable config: {}", e);
        GlobalConfig::default()
    });

    // Commands that don't need a provider
    match &cli.command {
        Commands::Config { edit } => {
            commands::config(*edit).await?;
            return Ok(0);
        }
        Commands::List => {
            let catalog = Catalog::from_config(&config)?;
            commands::list(&catalog, &mut std::io::stdout())?;
            return Ok(0);
        }
        _ => {}
    }

    let provider = connect(cli.provider.as_deref(), &config).await?;
    let stop_timeout = config.defaults.stop_timeout;

    match cli.command {
        Commands::Start {
            database,
            data_dir,
            debug,
            port,
        } => {
            let catalog = Catalog::from_config(&config)?;
            let debug = debug || config.defaults.debug;
            let request = commands::run_request(&database, data_dir.as_deref(), debug, port)?;
            // Install handlers before anything is created
            let shutdown = shutdown_signal()?;
            let coordinator =
                Coordinator::new(provider, Box::new(TerminalLauncher::new()), catalog)
                    .with_stop_timeout(stop_timeout);
            Ok(commands::start(&coordinator, &request, shutdown).await)
        }
        Commands::Cleanup { yes } => {
            commands::cleanup(provider.as_ref(), yes, stop_timeout).await?;
            Ok(0)
        }
        Commands::List | Commands::Config { .. } => Ok(0),
    }
}

async fn connect(
    provider: Option<&str>,
    config: &GlobalConfig,
) -> anyhow::Result<Box<dyn ContainerProvider>> {
    let provider = match provider {
        Some(name) => {
            let provider_type: ProviderType = name.parse().map_err(anyhow::Error::msg)?;
            dbin_provider::connect(provider_type, config).await?
        }
        None => create_default_provider(config).await?,
    };
    let info = provider.info();
    tracing::debug!(
        "Connected to {} {} (API {})",
        info.provider_type,
        info.version,
        info.api_version
    );
    Ok(provider)
}
