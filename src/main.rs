use birthmap::{config, pipeline, render, server};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the birth rate choropleth to an HTML file
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Overrides output.html from the config
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Load and join both sources, report data gaps, render nothing
    Check {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the map, re-reading the statistics on every request
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
        Commands::Render { config, output } => {
            info!("Rendering map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            let (map, _outcome) = pipeline::run(&app_config)?;

            let path = output.as_ref().unwrap_or(&app_config.output.html);
            render::write_map(&map, path)?;
            info!("Rendering complete!");
        }
        Commands::Check { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let outcome = pipeline::prepare(&app_config)?;

            println!(
                "{} regions, {} with data, {} missing",
                outcome.regions.len(),
                outcome.matched_count(),
                outcome.unmatched.len()
            );
            for region in &outcome.unmatched {
                println!("  missing: {}", region.region_name);
            }
            if !outcome.unmatched.is_empty() {
                warn!("some regions have no birth rate data");
            }
        }
        Commands::Serve { config } => {
            info!("Serving map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            // Boundaries are loaded once; statistics are reloaded per request.
            let geometries = pipeline::load_geometries(&app_config)?;

            server::start_server(app_config, geometries).await?;
        }
    }

    Ok(())
}
