use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::EngineConfig;
use crate::demo;
use crate::engine::Engine;
use crate::server::Server;

#[derive(Parser)]
#[command(name = "tickcast")]
#[command(about = "Broadcast a 2D scene to browser viewers over WebSockets")]
#[command(version)]
pub struct Cli {
    /// JSON config file; flags below override it
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Address to bind the WebSocket listener to (e.g. "0.0.0.0:8000")
    #[arg(short, long, global = true)]
    pub addr: Option<String>,

    /// Simulation ticks per second
    #[arg(long, global = true)]
    pub fps: Option<f64>,

    /// Allow several viewers at once instead of evicting the previous one
    #[arg(long, global = true)]
    pub multiplayer: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the demo scene (default)
    Demo,
    /// Print the effective configuration as JSON
    Config,
}

impl Cli {
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => EngineConfig::default(),
        };

        if let Some(addr) = &self.addr {
            config.bind_addr = addr.clone();
        }
        if let Some(fps) = self.fps {
            config.tick_rate = fps;
        }
        if self.multiplayer {
            config.single_session = false;
        }

        config.validate()?;
        Ok(config)
    }
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.engine_config()?;

    match cli.command.unwrap_or(Commands::Demo) {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Demo => {
            let engine = Arc::new(Engine::start(config, demo::assets())?);
            let server = Server::bind(Arc::clone(&engine)).await?;
            info!(addr = %server.local_addr()?, "viewers can connect");

            tokio::select! {
                result = server.run() => result?,
                result = demo::run(Arc::clone(&engine)) => result?,
                _ = tokio::signal::ctrl_c() => info!("shutting down"),
            }
        }
    }

    Ok(())
}
