mod adapters;
mod browser;
mod db;
mod enrich;
mod export;
mod orchestrator;
mod paginate;
mod records;
mod sink;
mod state;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use adapters::{colleges::CollegeDirectoryAdapter, jobs::JobBoardAdapter, SearchQuery, SiteAdapter};
use enrich::{gst::GstEnricher, places::PlaceEnricher};
use orchestrator::RunOptions;
use paginate::PaginationConfig;
use sink::DualSink;
use state::{InterruptFlag, RunState};

#[derive(Parser)]
#[command(
    name = "listing_scraper",
    about = "Listing crawler with GST and place enrichment"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Run with a visible browser window (debugging)
    #[arg(long, global = true)]
    headful: bool,

    /// Consecutive stable cycles before the list counts as exhausted
    #[arg(long, global = true, default_value_t = 5)]
    stable_cycles: u32,

    /// Hard ceiling on reveal cycles
    #[arg(long, global = true, default_value_t = 60)]
    max_cycles: u32,

    /// Directory for the exported workbook
    #[arg(long, global = true, default_value = "data")]
    out_dir: PathBuf,

    /// Skip the MySQL mirror even when DB env vars are set
    #[arg(long, global = true)]
    no_db: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the job board for an industry/role in a city
    Jobs { industry: String, city: String },
    /// Crawl the college directory for a course in a state/city
    Colleges {
        state: String,
        city: String,
        course: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    // Startup-class checks before any browser work: a configured mirror with
    // an unreadable CA certificate aborts here.
    let db_config = if cli.no_db {
        None
    } else {
        db::DbConfig::from_env().context("mirror database configuration")?
    };
    if db_config.is_none() {
        warn!("mirror database not configured; workbook is the only output");
    }

    let query = match &cli.command {
        Commands::Jobs { industry, city } => SearchQuery::Jobs {
            industry: industry.clone(),
            city: city.clone(),
        },
        Commands::Colleges { state, city, course } => SearchQuery::Colleges {
            state: state.clone(),
            city: city.clone(),
            course: course.clone(),
        },
    };

    std::fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("creating {}", cli.out_dir.display()))?;
    let export_path = export::versioned_path(&cli.out_dir.join(query.export_file_name()));
    println!("Exporting to {}", export_path.display());

    let session = browser::BrowserSession::launch(cli.headful).await?;
    let page = session.primary_page("about:blank").await?;

    let label = query.source_label();
    let mut adapter: Box<dyn SiteAdapter> = match &query {
        SearchQuery::Jobs { industry, city } => Box::new(JobBoardAdapter::new(
            page,
            industry.clone(),
            city.clone(),
            label,
        )),
        SearchQuery::Colleges { state, city, course } => Box::new(CollegeDirectoryAdapter::new(
            page,
            state.clone(),
            city.clone(),
            course.clone(),
            label,
        )),
    };

    let interrupt = InterruptFlag::new();
    let ctrl_c_flag = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing the record in flight, then flushing");
            ctrl_c_flag.raise();
        }
    });

    let mut state = RunState::new(interrupt);
    let gst = GstEnricher::new(&session);
    let places = PlaceEnricher::new(&session);
    let mut sink = DualSink::new(export_path.clone(), adapter.headers(), db_config);
    let options = RunOptions {
        pagination: PaginationConfig {
            stable_cycles: cli.stable_cycles,
            max_cycles: cli.max_cycles,
        },
        polite_delays: true,
    };

    let outcome = orchestrator::run(
        adapter.as_mut(),
        &gst,
        &places,
        &mut sink,
        &mut state,
        &options,
    )
    .await;

    drop(adapter);
    drop(gst);
    drop(places);
    session.close().await;

    let summary = outcome?;
    println!(
        "{} records in {} cycles{} -> {}",
        summary.records,
        summary.cycles,
        if summary.interrupted { " (interrupted)" } else { "" },
        export_path.display()
    );

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("Done in {}", format_duration(elapsed));
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
