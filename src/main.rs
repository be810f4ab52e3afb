use anyhow::Result;
use clap::Parser;
use scriptforge::config::Config;
use scriptforge::gateway;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scriptforge", version, about = "Credit-metered AI script generation gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "scriptforge.toml")]
    config: PathBuf,

    /// Override the configured bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the configured bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    if let Some(host) = cli.host {
        config.gateway.host = host;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    gateway::run_gateway(&config).await
}
