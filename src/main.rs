pub mod catalog;
pub mod color;
pub mod config;
pub mod controller;
pub mod data;
pub mod engine;
pub mod error;
pub mod picking;
pub mod projection;
pub mod render;
pub mod scale;
pub mod selection;
pub mod server;
pub mod types;

use catalog::VoteChoice;
use clap::{Parser, Subcommand};
use controller::{AppState, Command};
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
    /// Render one view of the map to an SVG file
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Demographic category id, e.g. country_of_birth
        #[arg(long)]
        category: Option<String>,
        /// Attribute within the category
        #[arg(long)]
        attribute: Option<String>,
        /// Colour by referendum margin instead (leave or remain)
        #[arg(long, conflicts_with_all = ["category", "attribute"])]
        vote: Option<VoteChoice>,
        /// District to zoom in on
        #[arg(long)]
        focus: Option<String>,
        #[arg(short, long, value_name = "FILE", default_value = "map.svg")]
        out: PathBuf,
    },
    /// Serve the map API and static front end
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

    match cli.command {
        Commands::Render { config, category, attribute, vote, focus, out } => {
            info!("Rendering map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(&config)?;
            let loaded = data::load_all(&app_config).await?;
            let mut state = AppState::new(&app_config, loaded)?;

            let mut commands = Vec::new();
            if let Some(id) = category {
                commands.push(Command::SelectCategory { id });
            }
            if let Some(name) = attribute {
                commands.push(Command::SelectAttribute { name });
            }
            if let Some(choice) = vote {
                commands.push(Command::SelectVote { choice });
            }
            if let Some(name) = focus {
                commands.push(Command::ClickDistrict { name });
            }

            let mut frame = state.frame()?;
            for command in commands {
                frame = state.dispatch(command)?;
            }

            render::write_svg(&out, &state, &frame)?;
            info!("Render complete!");
        }
        Commands::Serve { config } => {
            info!("Serving map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(&config)?;
            let loaded = data::load_all(&app_config).await?;
            let state = AppState::new(&app_config, loaded)?;
            server::start_server(app_config, state).await?;
        }
    }

    Ok(())
}
