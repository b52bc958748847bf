pub mod cascade;
pub mod config;
pub mod data;
pub mod processing;
pub mod render;
pub mod server;
pub mod spatial;
pub mod style;
pub mod types;
pub mod view;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use types::{FilterEvent, FilterState};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the interactive dashboard
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print the derived view for a filter as JSON
    Snapshot {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Render the filtered choropleth to a PNG
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(short, long, value_name = "PNG", default_value = "map.png")]
        output: PathBuf,
        /// Image width in pixels (defaults to [render].width)
        #[arg(long)]
        width: Option<u32>,
    },
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last day to include (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long)]
    state: Option<String>,
    #[arg(long)]
    township: Option<String>,
    #[arg(long)]
    group: Option<String>,
}

impl FilterArgs {
    /// The events a user would produce picking these values, in cascade order.
    fn events(&self) -> Vec<FilterEvent> {
        let mut events = Vec::new();
        if let Some(state) = &self.state {
            events.push(FilterEvent::State(state.as_str().into()));
        }
        if let Some(township) = &self.township {
            events.push(FilterEvent::Township(township.as_str().into()));
        }
        if let Some(group) = &self.group {
            events.push(FilterEvent::Group(group.as_str().into()));
        }
        if self.from.is_some() || self.to.is_some() {
            events.push(FilterEvent::DateRange {
                start: self.from,
                end: self.to,
            });
        }
        events
    }
}

async fn load_filtered(
    config: &Path,
    filter_args: &FilterArgs,
) -> anyhow::Result<(view::Dataset, FilterState)> {
    let app_config = config::AppConfig::load_from_file(config)?;
    let dataset = view::Dataset::load(app_config).await?;
    let filter = filter_args
        .events()
        .into_iter()
        .fold(FilterState::default(), FilterState::apply);
    Ok((dataset, filter))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { config } => {
            info!("Serving dashboard with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            server::start_server(app_config).await?;
        }
        Commands::Snapshot { config, filter } => {
            let (dataset, filter) = load_filtered(config, filter).await?;
            let snapshot = dataset.snapshot(&filter);
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::Render {
            config,
            filter,
            output,
            width,
        } => {
            let (dataset, filter) = load_filtered(config, filter).await?;
            let width = width.unwrap_or(dataset.config.render.width);
            render::render_png(&dataset, &filter, output, width)?;
        }
    }

    Ok(())
}
