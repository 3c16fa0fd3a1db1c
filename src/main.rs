// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use cu_comp_analysis::{
    count_records, export, insert_financials, insert_records, latest_report, list_cleaned_records,
    load_analysis_input, load_ceo_csv, load_financials_csv, logging, save_report, setup_workbook, AnalysisPipeline,
    ComparisonMode, Config, Metric,
};

#[derive(Parser)]
#[command(name = "cu-comp")]
#[command(about = "Credit union CEO compensation vs. merger & acquisition analysis")]
#[command(version)]
struct Cli {
    /// TOML configuration file (default: ./cu-comp.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import CEO compensation (and optionally financial metrics) into the workbook
    Import {
        #[arg(long)]
        ceo: Option<PathBuf>,
        #[arg(long)]
        financials: Option<PathBuf>,
    },
    /// Resolve names, flag CEO changes and M&A years, compare periods, run the t-tests
    Analyze {
        /// Override the configured metric
        #[arg(long, value_enum)]
        metric: Option<Metric>,
        /// Override the configured window radius
        #[arg(long)]
        window_radius: Option<i32>,
    },
    /// Print the latest report, optionally exporting every table as CSV
    Report {
        /// Export directory; a bare --export uses paths.export_dir
        #[arg(long, value_name = "DIR", num_args = 0..=1)]
        export: Option<Option<PathBuf>>,
    },
    /// Terminal dashboard
    Ui,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    if matches!(cli.command, Commands::Ui) {
        // Keep log lines off the dashboard
        logging::init_logging("warn", config.logging.json);
    } else {
        logging::init_from_config(&config.logging);
    }

    match cli.command {
        Commands::Import { ceo, financials } => run_import(&config, ceo, financials),
        Commands::Analyze { metric, window_radius } => {
            if let Some(metric) = metric {
                config.analysis.metric = metric;
            }
            if let Some(radius) = window_radius {
                anyhow::ensure!(radius >= 1, "--window-radius must be at least 1");
                config.analysis.window_radius = radius;
            }
            run_analyze(&config)
        }
        Commands::Report { export } => {
            let export_dir = config.export_dir_for(export);
            run_report(&config, export_dir)
        }
        Commands::Ui => run_ui_mode(&config),
    }
}

fn open_workbook(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).with_context(|| format!("Failed to open workbook {}", path.display()))?;
    setup_workbook(&conn)?;
    Ok(conn)
}

fn run_import(config: &Config, ceo: Option<PathBuf>, financials: Option<PathBuf>) -> Result<()> {
    println!("🗄️  Import - CSV → Workbook (SQLite + WAL)");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let ceo_path = ceo
        .or_else(|| config.paths.ceo_csv.clone())
        .context("No CEO compensation CSV given (use --ceo or paths.ceo_csv)")?;
    let financials_path = financials.or_else(|| config.paths.financials_csv.clone());

    // 1. Load CSV
    println!("\n📂 Loading {}...", ceo_path.display());
    let load = load_ceo_csv(&ceo_path)?;
    println!("✓ Loaded {} records ({} dropped: missing compensation or key)", load.rows.len(), load.dropped);

    // 2. Setup workbook
    println!("\n🔧 Setting up workbook...");
    let conn = open_workbook(&config.paths.database)?;
    println!("✓ Workbook ready at {}", config.paths.database.display());

    // 3. Insert records
    println!("\n💾 Inserting records...");
    let summary = insert_records(&conn, &load.rows, &ceo_path.display().to_string())?;
    println!("✓ Inserted: {} records", summary.inserted);
    println!("✓ Skipped duplicates: {}", summary.duplicates);

    // 4. Financial metrics (optional)
    if let Some(path) = financials_path {
        println!("\n📂 Loading {}...", path.display());
        let financials = load_financials_csv(&path)?;
        let summary = insert_financials(&conn, &financials.rows)?;
        println!(
            "✓ Financials: {} inserted, {} duplicates, {} dropped",
            summary.inserted, summary.duplicates, financials.dropped
        );
    }

    println!("\n🔍 Workbook contains {} compensation records", count_records(&conn)?);
    Ok(())
}

fn run_analyze(config: &Config) -> Result<()> {
    println!("📊 Analysis - CEO compensation around M&A years");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = open_workbook(&config.paths.database)?;
    let records = load_analysis_input(&conn)?;
    anyhow::ensure!(!records.is_empty(), "Workbook has no records. Run: cu-comp import --ceo <csv>");

    let calendar = config.event_calendar();
    let report = AnalysisPipeline::new(&calendar, config.settings()).run(records);

    let changes: usize = report.institutions.iter().map(|a| a.ceo_changes).sum();
    println!("\n✓ Institutions analysed: {}", report.institutions.len());
    println!("✓ CEO changes detected: {}", changes);
    println!("✓ Name ties broken: {}", report.ambiguities().len());

    save_report(&conn, &report)?;
    println!("✓ Saved run {}", report.run_id);

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", report.flag_split.summary());
    println!("{}", report.windowed.summary());
    Ok(())
}

fn run_report(config: &Config, export_dir: Option<PathBuf>) -> Result<()> {
    let conn = open_workbook(&config.paths.database)?;

    let flag_split = latest_report(&conn, ComparisonMode::FlagSplit)?;
    let windowed = latest_report(&conn, ComparisonMode::Windowed)?;
    let (Some(flag_split), Some(windowed)) = (flag_split, windowed) else {
        anyhow::bail!("No analysis saved yet. Run: cu-comp analyze");
    };

    println!("📋 Report {} ({})", flag_split.run_id, flag_split.generated_at.format("%Y-%m-%d %H:%M"));
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for stored in [&flag_split, &windowed] {
        let report = &stored.report;
        let (treatment, baseline) = report.mode.labels();
        println!("\n{}", report.summary());
        println!("  {:<36} {:>10} {:>10} {:>10}", "institution", treatment, baseline, "diff");
        for row in &report.rows {
            match row.difference {
                Some(diff) => println!(
                    "  {:<36} {:>10.2} {:>10.2} {:>10.2}",
                    row.institution_name,
                    row.treatment_mean.unwrap_or_default(),
                    row.baseline_mean.unwrap_or_default(),
                    diff
                ),
                None => println!(
                    "  {:<36} excluded: {}",
                    row.institution_name,
                    row.exclusion.as_deref().unwrap_or("-")
                ),
            }
        }
    }

    if let Some(dir) = export_dir {
        let records = list_cleaned_records(&conn)?;
        let paths = export::export_all(&dir, &records, &flag_split.report, &windowed.report)?;
        println!("\n📤 Exported {} files to {}", paths.len(), dir.display());
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &Config) -> Result<()> {
    println!("🖥️  Loading compensation dashboard...\n");

    if !config.paths.database.exists() {
        eprintln!("❌ Workbook not found!");
        eprintln!("   Run: cu-comp import --ceo <csv> && cu-comp analyze");
        std::process::exit(1);
    }

    let conn = open_workbook(&config.paths.database)?;
    let institutions = cu_comp_analysis::list_institutions(&conn)?;
    let reports = [ComparisonMode::FlagSplit, ComparisonMode::Windowed]
        .into_iter()
        .filter_map(|mode| latest_report(&conn, mode).transpose())
        .collect::<Result<Vec<_>>>()?;

    println!("✓ Loaded {} institutions\n", institutions.len());
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(institutions, reports);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &Config) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the JSON API: cargo run --bin cu-comp-server --features server");
    std::process::exit(1);
}
