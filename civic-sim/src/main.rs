use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use civic_core::narrator::{FallbackNarrator, Narrator};
use civic_core::{CivicConfig, Simulation};
use civic_sim::{DashboardWriter, Driver, LlmNarrator, RunOptions};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "civic")]
#[command(about = "Run the small-city population simulation headless")]
struct Args {
    /// TOML config file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Real seconds to simulate
    #[arg(short = 't', long, default_value = "120")]
    seconds: f64,

    /// Frames per second
    #[arg(long, default_value = "60")]
    fps: u32,

    /// Keep wall-clock pace instead of running as fast as possible
    #[arg(long)]
    realtime: bool,

    /// Dashboard data file
    #[arg(long, default_value = "dashboard_data.json")]
    dashboard: PathBuf,

    /// Seconds between dashboard writes
    #[arg(long, default_value = "1.0")]
    dashboard_interval: f64,

    /// Skip the dashboard feed
    #[arg(long)]
    no_dashboard: bool,

    /// SQLite database (overrides `persistence.path`)
    #[arg(long)]
    database: Option<String>,

    /// Random seed (overrides `general.seed`)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Use the deterministic narrator even if a model is configured
    #[arg(long)]
    no_llm: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => CivicConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => CivicConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.general.seed = seed;
    }
    if let Some(db) = &args.database {
        config.persistence.path = Some(db.clone());
    }

    init_logging(&config.general.log_level, args.json_logs);

    let narrator: Arc<dyn Narrator> = if args.no_llm {
        Arc::new(FallbackNarrator)
    } else {
        match LlmNarrator::from_config(&config.llm) {
            Ok(narrator) => Arc::new(narrator),
            Err(err) => {
                warn!(%err, "LLM narrator unavailable; using deterministic narrator");
                Arc::new(FallbackNarrator)
            }
        }
    };

    let sim = Simulation::from_config(config, narrator).context("starting simulation")?;
    let dashboard = (!args.no_dashboard).then(|| DashboardWriter::new(&args.dashboard, args.dashboard_interval));
    let mut driver = Driver::new(sim, dashboard);

    let stats = driver.run(RunOptions {
        duration_secs: args.seconds,
        frame_dt: 1.0 / f64::from(args.fps.max(1)),
        realtime: args.realtime,
    });

    let summary = driver.simulation().population_summary();
    info!(
        citizens = summary.total,
        households = summary.households,
        conversations = stats.conversations,
        "Done"
    );
    Ok(())
}

fn init_logging(default_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
