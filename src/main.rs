pub mod types;
pub mod config;
pub mod data;
pub mod processing;
pub mod render;
pub mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate district counts and write the dashboard artifacts
    Generate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the dashboard and its API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Generate { config } => {
            info!("Generating dashboard data with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            // 1. Load layers
            let layers = data::load_layers(&app_config)?;

            // 2. Aggregate, shorten arrows and write artifacts
            let outputs = render::generate_outputs(&app_config, &layers)?;

            println!("Wrote {}", outputs.counts.display());
            if let Some(arrows) = &outputs.arrows {
                println!("Wrote {}", arrows.display());
            }
            println!("Wrote {}", outputs.legend.display());
            println!("Generation complete!");
        }
        Commands::Serve { config } => {
            info!("Serving dashboard with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            let layers = data::load_layers(&app_config)?;

            server::start_server(app_config, layers).await?;
        }
    }

    Ok(())
}
