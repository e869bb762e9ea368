use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use easel_core::config::Config;

mod watch;

#[derive(Parser)]
#[command(
    name = "easel",
    about = "Live agent canvases — gateway, display client and tooling",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on (default: 18790)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Mirror a canvas in the terminal
    Watch {
        /// Canvas to follow
        canvas_id: String,

        /// Gateway WebSocket base URL (default: ws://127.0.0.1:<port>)
        #[arg(long)]
        url: Option<String>,
    },

    /// Query a running gateway's health
    Status {
        /// Gateway HTTP base URL (default: http://127.0.0.1:<port>)
        #[arg(long)]
        url: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value by dotted path
    Get { key: String },
    /// Check the configuration for problems
    Validate,
}

fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.log_level()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));

    if config.json_logs() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config
    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);

    let config = Config::load(&config_path)?;
    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or_else(|| config.gateway_port());
            tracing::info!(config = %config_path.display(), "Starting Easel gateway on port {port}");

            let (warnings, errors) = config.validate();
            for w in &warnings {
                tracing::warn!("{w}");
            }
            if !errors.is_empty() {
                anyhow::bail!("invalid configuration: {}", errors.join("; "));
            }

            let state = easel_gateway::GatewayState::new(Arc::new(config));
            #[cfg(feature = "metrics")]
            let state = state.with_metrics(easel_gateway::metrics::install_prometheus_recorder()?);

            easel_gateway::start_gateway(Arc::new(state), port).await?;
        }
        Commands::Watch { canvas_id, url } => {
            let base = url.unwrap_or_else(|| format!("ws://127.0.0.1:{}", config.gateway_port()));
            watch::run(
                &base,
                &canvas_id,
                config.history_limit(),
                config.max_snapshots(),
            )
            .await?;
        }
        Commands::Status { url } => {
            let base = url.unwrap_or_else(|| format!("http://127.0.0.1:{}", config.gateway_port()));
            println!("Easel v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Gateway: {base}");

            match reqwest::get(format!("{}/health", base.trim_end_matches('/'))).await {
                Ok(resp) if resp.status().is_success() => {
                    let health: serde_json::Value = resp.json().await?;
                    println!("Status: {}", health["status"].as_str().unwrap_or("unknown"));
                    println!("Version: {}", health["version"].as_str().unwrap_or("?"));
                    println!("Canvases: {}", health["canvases"]);
                    println!(
                        "Connections: {} canvas, {} status, {} agent",
                        health["canvas_connections"],
                        health["status_connections"],
                        health["agent_connections"]
                    );
                    println!(
                        "Dropped messages: {} canvas, {} status",
                        health["bus"]["canvas"]["dropped"], health["bus"]["status"]["dropped"]
                    );
                }
                Ok(resp) => println!("Status: unhealthy (HTTP {})", resp.status()),
                Err(e) => {
                    tracing::debug!(%e, "Health request failed");
                    println!("Status: not running");
                }
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("no config value at '{key}'"),
            },
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for w in &warnings {
                    println!("warning: {w}");
                }
                for e in &errors {
                    println!("error: {e}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
                println!("Configuration OK: {}", config_path.display());
            }
        },
    }

    Ok(())
}
