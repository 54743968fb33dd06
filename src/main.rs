pub mod config;
pub mod coordinator;
pub mod data;
pub mod error;
pub mod geometry;
pub mod headless;
pub mod render;
pub mod scale;
pub mod selection;
pub mod server;
pub mod style;
pub mod table;
pub mod types;
pub mod view;

#[cfg(test)]
mod fixtures;

use anyhow::Context;
use clap::{Parser, Subcommand};
use coordinator::{switch_indicator, ClickOutcome, Dashboard, LoadOutcome};
use headless::HeadlessMap;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use types::{DatasetKind, ViewRole};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the dashboard API and static assets
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Load an indicator, optionally select a feature, and write each view as PNG
    Snapshot {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Indicator key; defaults to the first configured one
        #[arg(short, long)]
        indicator: Option<String>,
        /// Identifier to select before rendering
        #[arg(short, long, value_name = "GEOID")]
        select: Option<String>,
        /// Overrides `snapshot.output_dir`
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            info!("Serving dashboard with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(&config)?;
            server::start_server(app_config).await?;
        }
        Commands::Snapshot {
            config,
            indicator,
            select,
            output,
        } => {
            let mut app_config = config::AppConfig::load_from_file(&config)?;
            if let Some(output) = output {
                app_config.snapshot.output_dir = output;
            }
            let indicator = match indicator {
                Some(key) => key,
                None => app_config
                    .default_indicator()
                    .context("No indicators configured")?
                    .key
                    .clone(),
            };
            let snapshot = app_config.snapshot.clone();

            let fetcher = data::SourceFetcher::new().context("Failed to build HTTP client")?;
            let loader = data::GeoLoader::new(fetcher, &app_config.input.id_field);
            let dashboard = Arc::new(Mutex::new(Dashboard::new(app_config, |_| {
                HeadlessMap::new()
            })));

            // 1. Load both datasets
            let report = switch_indicator(&dashboard, &loader, &indicator).await?;
            if report.hex == LoadOutcome::Failed || report.tract == LoadOutcome::Failed {
                warn!(hex = ?report.hex, tract = ?report.tract, "Rendering with incomplete data");
            }

            let mut dashboard = dashboard.lock();

            // 2. Apply the selection
            if let Some(geoid) = select {
                match dashboard.on_any_view_clicked(&geoid) {
                    ClickOutcome::Selected { skipped, .. } if !skipped.is_empty() => {
                        warn!(geoid = %geoid, skipped = ?skipped, "Selection missing from some views");
                    }
                    ClickOutcome::Selected { .. } => info!(geoid = %geoid, "Selected"),
                    outcome => warn!(geoid = %geoid, outcome = ?outcome, "Selection not applied"),
                }
            }

            // 3. Render
            let maps: Vec<(ViewRole, &HeadlessMap)> = ViewRole::ALL
                .iter()
                .map(|role| (*role, dashboard.view(*role).map()))
                .collect();
            let written = render::write_snapshots(
                &maps,
                snapshot.width,
                snapshot.height,
                &snapshot.output_dir,
            )?;
            for path in written {
                println!("{}", path.display());
            }
            for kind in [DatasetKind::Hex, DatasetKind::Tract] {
                if let Some(legend) = dashboard.legend(kind) {
                    let stops: Vec<String> =
                        legend.stops.iter().map(|s| s.color.to_string()).collect();
                    info!(kind = %kind, min = legend.min, max = legend.max, stops = ?stops, "Legend");
                }
            }
        }
    }

    Ok(())
}
