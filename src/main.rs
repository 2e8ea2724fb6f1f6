mod app;
mod config;
mod interaction;
mod palette;
mod physics;
mod session;
mod source;
mod topology;
mod util;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::VizConfig;
use session::Session;
use source::HttpSnapshotSource;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Base URL of the topology API.
    #[arg(long, env = "BACKEND_URL", default_value = "http://localhost:5010")]
    backend_url: String,
    #[arg(long, default_value_t = 5000)]
    poll_interval_ms: u64,
    #[arg(long, default_value = "default")]
    namespace: String,
    #[arg(long, default_value = "zone")]
    label: String,
    #[arg(long, default_value = "label")]
    display: String,
    #[arg(long)]
    width: Option<f32>,
    #[arg(long)]
    height: Option<f32>,
    /// JSON file overriding layout, palette and drag settings.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, env = "KUPOVI_LOG", default_value = "info")]
    log_filter: String,
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::builder().parse_lossy(filter);
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_filter);

    let mut config = match &args.config {
        Some(path) => VizConfig::load(path)?,
        None => VizConfig::default(),
    };
    if let Some(width) = args.width {
        config.viewport.width = width;
    }
    if let Some(height) = args.height {
        config.viewport.height = height;
    }

    let interval = Duration::from_millis(args.poll_interval_ms.max(100));
    let source = HttpSnapshotSource::new(
        &args.backend_url,
        &args.namespace,
        &args.label,
        &args.display,
        interval,
    )?;
    let source_label = source.url().to_owned();
    info!(url = %source_label, interval_ms = interval.as_millis() as u64, "polling topology API");

    let window_size = [config.viewport.width + 40.0, config.viewport.height + 80.0];
    let session = Session::with_source(config, source, interval);
    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size(window_size),
        ..Default::default()
    };

    eframe::run_native(
        "kupovi",
        options,
        Box::new(move |cc| Ok(Box::new(app::KupoviApp::new(cc, session, source_label)))),
    )
    .map_err(|error| anyhow!("viewer failed: {error}"))
}
