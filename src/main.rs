//! Chart Tiles Pipeline CLI
//!
//! Downloads aeronautical chart rasters and turns them into tiled map databases.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chart_tiles::config::LoggingConfig;
use chart_tiles::{plan_jobs, run_pipeline, Config};

#[derive(Parser)]
#[command(name = "chart-tiles")]
#[command(about = "Turn aeronautical chart rasters into tiled map databases", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "settings.yaml", global = true)]
    config: PathBuf,

    /// Process only the charts at these positions in the chart list
    #[arg(long, value_delimiter = ',', global = true)]
    only: Option<Vec<usize>>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the chart pipeline (default if no command specified)
    Run,

    /// Show the resolved chart date and the jobs a run would process
    Plan,

    /// Validate configuration and check that external tools are installed
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "settings.yaml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::GenerateConfig { output }) = &cli.command {
        init_logging(&LoggingConfig::default())?;
        return generate_config_command(output);
    }

    let mut config = Config::from_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if let Some(only) = cli.only {
        config.process_indexes = Some(only);
    }

    init_logging(&config.logging)?;

    match cli.command {
        None | Some(Commands::Run) => run_command(&config),
        Some(Commands::Plan) => plan_command(&config),
        Some(Commands::Validate) => validate_command(&config),
        Some(Commands::GenerateConfig { .. }) => Ok(()),
    }
}

/// Level used when `RUST_LOG` is unset or unparseable.
const DEFAULT_LOG_LEVEL: &str = "info";

/// Log filter from `RUST_LOG`-style directives.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(directives.as_deref());

    let (stdout_layer, file_layer) = if logging.to_file {
        let file = File::create(&logging.file)
            .with_context(|| format!("failed to create log file {}", logging.file.display()))?;
        let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
        (None, Some(layer))
    } else {
        (Some(fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}

fn run_command(config: &Config) -> Result<()> {
    let report = run_pipeline(config)?;

    let failed = report
        .jobs()
        .iter()
        .filter(|job| job.has_problems())
        .count();
    if failed > 0 {
        tracing::warn!(
            "{} of {} charts had failures (run started {})",
            failed,
            report.jobs().len(),
            report.started().format("%H:%M:%S")
        );
    }

    Ok(())
}

fn plan_command(config: &Config) -> Result<()> {
    let today = chrono::Local::now().date_naive();
    let (date, workspace, jobs) = plan_jobs(config, today)?;

    println!("\n=== Run Plan ===");
    println!("Today: {}", today.format("%m-%d-%Y"));
    println!("Chart date: {}", date);
    println!("Workspace: {}", workspace.root().display());
    println!("Cache: {}", workspace.cache().display());
    println!("Zoom: {}", config.tiles.zoom()?);
    println!(
        "Format: {} (quantize: {})",
        config.tiles.format.as_str(),
        if config.tiles.quantize_enabled() { "yes" } else { "no" }
    );

    println!("\n=== Charts ({}) ===", jobs.len());
    for job in &jobs {
        let cached = if job.archive.is_file() { "cached" } else { "download" };
        println!("{} {} [{}]", job.category, job.chart_name, cached);
        println!("  url: {}", job.url);
        println!("  archive: {}", job.archive.display());
        println!("  clip shapes: {}", job.clip_shape_dir.display());
        println!("  database: {}", job.database.display());
    }
    println!("================\n");

    Ok(())
}

fn validate_command(config: &Config) -> Result<()> {
    config.validate()?;
    println!("Configuration is valid");

    let mut missing = 0;
    for (name, prefix) in config.tools.entries() {
        let program = &prefix[0];
        match which::which(program) {
            Ok(path) => println!("  {:<10} {}", name, path.display()),
            Err(_) => {
                tracing::warn!("{} tool '{}' not found on PATH", name, program);
                missing += 1;
            }
        }
    }
    if missing > 0 {
        println!("{} external tools not found", missing);
    }

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# Chart Tiles Pipeline Configuration

# === CHARTS: What to process ===
# work_name is the name used in the download URL and the cache key.
# IFR charts also need an alias, which names the chart folder and database.
charts:
  - work_name: Denver
    category: vfr
  - work_name: Seattle
    category: vfr
  - work_name: DDECUS
    category: ifr
    alias: Enroute_Low

# Process only these positions in the chart list (omit for all)
# process_indexes: [0, 2]

# === DATES: Published chart cycle dates ===
# The run uses the most recent date between 20 days ahead and 36 days
# behind today. Accepts YYYY-MM-DD, MM-DD-YYYY, MM/DD/YYYY or "January 25, 2024".
chart_dates:
  - "2024-01-25"
  - "2024-02-22"

# Or read them from a JSON file shaped like {"ChartDates": ["..."]}
# chart_dates_file: "chartdates.json"

# === DOWNLOAD: URL templates ===
# <chartdate> becomes MM-DD-YYYY, <charttype> becomes the work name
download:
  ifr_template: "https://aeronav.faa.gov/enroute/<chartdate>/<charttype>.zip"
  vfr_template: "https://aeronav.faa.gov/visual/<chartdate>/sectional-files/<charttype>.zip"

# === TILES: Output tile settings ===
tiles:
  zoom_range: "0-11"
  # png or webp
  format: png
  # Below 100 with png, tiles are palette-reduced
  quality: 100
  # overlay or baselayer
  layer_type: overlay
  attribution: "Aeronautical charts courtesy of the FAA"
  # Worker processes for the tiler
  processes: 4

# === WORKSPACE: Folder layout ===
workspace:
  base_dir: "."
  workarea_name: workarea
  cache_name: chartcache
  clip_shapes_dir: clipshapes
  # Append the chart date to the workarea name
  rename_by_date: false
  # Remove everything except the databases after the run
  clean_process_folders: false

# === TOOLS: External commands (program followed by fixed leading args) ===
# tools:
#   fetch: [wget]
#   unzip: [unzip]
#   translate: [gdal_translate]
#   warp: [gdalwarp]
#   overviews: [gdaladdo]
#   tiler: [gdal2tiles.py]
#   merge: [perl, ./mergetiles.pl]
#   quantize: [pngquant]
#   package: [python3, ./mbutil/mb-util]

# === LOGGING ===
logging:
  # Write the log to a file instead of stdout
  to_file: false
  file: debug.log
"#;

fn generate_config_command(output: &PathBuf) -> Result<()> {
    std::fs::write(output, SAMPLE_CONFIG)?;
    println!("Generated sample configuration at: {}", output.display());
    Ok(())
}
