//! CLI command definitions for jobboard.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::crawler::{
    ConfigError, CrawlConfig, CrawlReport, Crawler, HttpSessionFactory, ListingConfig,
    ValidatedJobRecord,
};
use crate::metrics::{export_metrics, init_metrics};
use crate::storage::jobs::DEFAULT_PAGE_SIZE;
use crate::storage::{JobFilter, JobPage, JobStore, SqliteJobStore};

/// Default SQLite database path.
const DEFAULT_DB_PATH: &str = "jobboard.db";

/// Default output path for `jobboard export`.
const DEFAULT_EXPORT_PATH: &str = "crawled_data.json";

/// Job-board crawler storing postings in a local SQLite database.
#[derive(Parser)]
#[command(name = "jobboard")]
#[command(about = "Crawl job listings concurrently and store them in SQLite")]
#[command(version)]
#[command(
    long_about = "jobboard crawls paginated job listings with a pool of concurrent workers, keeps complete postings and stores them in SQLite.\n\nExample usage:\n  jobboard crawl 20 5 --cap 100\n  jobboard jobs --location Seoul --search backend\n  jobboard export --output crawled_data.json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Crawl listing pages and store the complete postings.
    Crawl(CrawlArgs),

    /// List stored jobs.
    #[command(alias = "ls")]
    Jobs(JobsArgs),

    /// Dump stored companies and jobs to a JSON file.
    Export(ExportArgs),
}

/// Arguments for `jobboard crawl`.
///
/// Unset values fall back to the `CRAWL_*` environment variables, then to
/// built-in defaults.
#[derive(Parser, Debug)]
pub struct CrawlArgs {
    /// Number of listing pages to crawl (default 5).
    pub page_count: Option<u32>,

    /// Number of concurrent workers (default 5).
    pub concurrency: Option<usize>,

    /// Maximum number of jobs to return (default 100).
    #[arg(long)]
    pub cap: Option<usize>,

    /// Stop the crawl after this many seconds and keep what was collected.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Keep postings whose link was already seen in this crawl.
    #[arg(long)]
    pub no_dedupe: bool,

    /// YAML file with the listing URL template and CSS selectors.
    #[arg(long)]
    pub listing_config: Option<PathBuf>,

    /// Listing URL with a `{page}` placeholder. Overrides the listing config.
    #[arg(long)]
    pub url_template: Option<String>,

    /// SQLite database path.
    #[arg(long, env = "JOBBOARD_DB", default_value = DEFAULT_DB_PATH)]
    pub db: PathBuf,

    /// Print the results without storing them.
    #[arg(long)]
    pub no_store: bool,

    /// Output results as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Write Prometheus metrics to this file when the crawl ends.
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,
}

/// Arguments for `jobboard jobs`.
#[derive(Parser, Debug)]
pub struct JobsArgs {
    /// SQLite database path.
    #[arg(long, env = "JOBBOARD_DB", default_value = DEFAULT_DB_PATH)]
    pub db: PathBuf,

    /// Substring of the location.
    #[arg(long)]
    pub location: Option<String>,

    /// Substring of the career requirement.
    #[arg(long)]
    pub career: Option<String>,

    /// Substring of the education requirement.
    #[arg(long)]
    pub education: Option<String>,

    /// Substring of the salary.
    #[arg(long)]
    pub salary: Option<String>,

    /// Substring of the sector tags.
    #[arg(long)]
    pub sectors: Option<String>,

    /// Substring of the title.
    #[arg(short, long)]
    pub search: Option<String>,

    /// Substring of the company name.
    #[arg(long)]
    pub company: Option<String>,

    /// Substring of the position.
    #[arg(long)]
    pub position: Option<String>,

    /// Substring of the tech stack tags.
    #[arg(long)]
    pub tech_stack: Option<String>,

    /// Page number, starting at 1.
    #[arg(short, long, default_value = "1")]
    pub page: u32,

    /// Jobs per page.
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,

    /// Output results as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

impl JobsArgs {
    fn filter(&self) -> JobFilter {
        JobFilter {
            location: self.location.clone(),
            career: self.career.clone(),
            education: self.education.clone(),
            salary: self.salary.clone(),
            sectors: self.sectors.clone(),
            search: self.search.clone(),
            company: self.company.clone(),
            position: self.position.clone(),
            tech_stack: self.tech_stack.clone(),
        }
    }
}

/// Arguments for `jobboard export`.
#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// SQLite database path.
    #[arg(long, env = "JOBBOARD_DB", default_value = DEFAULT_DB_PATH)]
    pub db: PathBuf,

    /// Output JSON file.
    #[arg(short, long, default_value = DEFAULT_EXPORT_PATH)]
    pub output: PathBuf,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows the caller to access global options (like log_level) before
/// running the command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For control over logging initialization, use `parse_cli()` and
/// `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Crawl(args) => run_crawl_command(args).await,
        Commands::Jobs(args) => run_jobs_command(args).await,
        Commands::Export(args) => run_export_command(args).await,
    }
}

// ============================================================================
// Crawl
// ============================================================================

#[derive(Debug, Serialize)]
struct CrawlOutput<'a> {
    crawl_id: Uuid,
    count: usize,
    pages_fetched: u64,
    pages_failed: u64,
    records_rejected: u64,
    records_duplicate: u64,
    timed_out: bool,
    elapsed_ms: u64,
    records: &'a [ValidatedJobRecord],
}

/// Applies CLI overrides on top of an env-derived configuration.
fn apply_crawl_overrides(mut config: CrawlConfig, args: &CrawlArgs) -> CrawlConfig {
    if let Some(page_count) = args.page_count {
        config.page_count = page_count;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(cap) = args.cap {
        config.result_cap = cap;
    }
    if let Some(secs) = args.timeout_secs {
        config.timeout = Some(Duration::from_secs(secs));
    }
    if args.no_dedupe {
        config.dedupe = false;
    }
    config
}

/// Layers CLI overrides on `base` and validates the result once.
fn resolve_crawl_config(base: CrawlConfig, args: &CrawlArgs) -> Result<CrawlConfig, ConfigError> {
    let config = apply_crawl_overrides(base, args);
    config.validate()?;
    Ok(config)
}

fn load_listing_config(args: &CrawlArgs) -> anyhow::Result<ListingConfig> {
    let mut listing = match &args.listing_config {
        Some(path) => ListingConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load listing config {}", path.display()))?,
        None => ListingConfig::default(),
    };

    if let Some(template) = &args.url_template {
        listing = listing.with_url_template(template.clone());
    }

    listing.validate()?;
    Ok(listing)
}

async fn run_crawl_command(args: CrawlArgs) -> anyhow::Result<()> {
    if let Err(e) = init_metrics() {
        warn!(error = %e, "Failed to initialize metrics");
    }

    let config = resolve_crawl_config(CrawlConfig::load_env()?, &args)?;
    let listing = load_listing_config(&args)?;

    let crawler = Crawler::new(Arc::new(HttpSessionFactory::new(listing)), config);
    let report = crawler.crawl().await.context("Crawl failed")?;

    if let Some(e) = &report.teardown_error {
        warn!(error = %e, "Crawl finished but the fetch session did not close cleanly");
    }

    emit_and_store(&report, &args, &mut std::io::stdout()).await?;

    if let Some(path) = &args.metrics_out {
        std::fs::write(path, export_metrics())
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    Ok(())
}

/// Writes the crawl results to `out`, then persists them unless `--no-store`
/// was given. The output is complete before the database is touched.
async fn emit_and_store<W: Write>(
    report: &CrawlReport,
    args: &CrawlArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    if args.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&crawl_output(report))?)?;
    } else {
        write_crawl_report(out, report)?;
    }
    out.flush()?;

    if args.no_store {
        return Ok(());
    }

    let store = SqliteJobStore::open(&args.db)
        .await
        .with_context(|| format!("Failed to open database {}", args.db.display()))?;
    let persisted = store
        .enrich_and_store(&report.records)
        .await
        .context("Failed to store crawled jobs")?;
    info!(db = %args.db.display(), jobs = persisted.len(), "Stored crawl results");

    if !args.json {
        writeln!(out, "  Stored: {}", persisted.len())?;
    }
    Ok(())
}

fn crawl_output(report: &CrawlReport) -> CrawlOutput<'_> {
    CrawlOutput {
        crawl_id: report.crawl_id,
        count: report.len(),
        pages_fetched: report.stats.pages_fetched,
        pages_failed: report.stats.pages_failed,
        records_rejected: report.stats.records_rejected,
        records_duplicate: report.stats.records_duplicate,
        timed_out: report.stats.timed_out,
        elapsed_ms: report.elapsed.as_millis() as u64,
        records: &report.records,
    }
}

/// Formats one crawled job for terminal output. `index` is 1-based.
fn format_record(index: usize, record: &ValidatedJobRecord) -> String {
    format!(
        "[index: {}] Company: {}\n  Title: {}\n  Location: {}\n  Career: {}\n  Education: {}\n  Salary: {}\n  Sectors: {}\n  Link: {}",
        index,
        record.company(),
        record.title(),
        record.location(),
        record.career(),
        record.education(),
        record.salary(),
        record.sectors().join(", "),
        record.link(),
    )
}

fn write_crawl_report<W: Write>(out: &mut W, report: &CrawlReport) -> std::io::Result<()> {
    for (i, record) in report.records.iter().enumerate() {
        writeln!(out, "{}", format_record(i + 1, record))?;
        writeln!(out)?;
    }

    writeln!(
        out,
        "✓ Crawled {} jobs from {} pages in {:.1}s",
        report.len(),
        report.stats.pages_fetched,
        report.elapsed.as_secs_f64()
    )?;
    if report.stats.pages_failed > 0 {
        writeln!(out, "  Failed pages: {}", report.stats.pages_failed)?;
    }
    if report.stats.timed_out {
        writeln!(out, "  Deadline reached; results are partial")?;
    }
    Ok(())
}

// ============================================================================
// Jobs / Export
// ============================================================================

async fn run_jobs_command(args: JobsArgs) -> anyhow::Result<()> {
    let store = SqliteJobStore::open(&args.db)
        .await
        .with_context(|| format!("Failed to open database {}", args.db.display()))?;

    let page = store
        .list_jobs(&args.filter(), args.page, args.page_size)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&page)?);
    } else {
        print_job_page(&page);
    }

    Ok(())
}

fn print_job_page(page: &JobPage) {
    if page.jobs.is_empty() {
        println!("No jobs found.");
        return;
    }

    for job in &page.jobs {
        println!(
            "#{:<6} {} | {} | {} | {}",
            job.id, job.title, job.company, job.location, job.career
        );
        println!("        {}", job.link);
    }

    println!();
    println!(
        "Page {}/{} ({} jobs)",
        page.page, page.total_pages, page.total_items
    );
}

async fn run_export_command(args: ExportArgs) -> anyhow::Result<()> {
    let store = SqliteJobStore::open(&args.db)
        .await
        .with_context(|| format!("Failed to open database {}", args.db.display()))?;

    let summary = store
        .export_json(&args.output)
        .await
        .with_context(|| format!("Failed to export to {}", args.output.display()))?;

    println!(
        "✓ Exported {} companies and {} jobs to {}",
        summary.companies,
        summary.jobs,
        args.output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::record::{sample_record, validate};
    use crate::crawler::PoolStats;
    use clap::CommandFactory;

    fn crawl_args(argv: &[&str]) -> CrawlArgs {
        let cli = Cli::try_parse_from(argv).expect("should parse");
        match cli.command {
            Commands::Crawl(args) => args,
            _ => panic!("Expected Crawl command"),
        }
    }

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_crawl_defaults() {
        let args = crawl_args(&["jobboard", "crawl"]);

        assert!(args.page_count.is_none());
        assert!(args.concurrency.is_none());
        assert!(args.cap.is_none());
        assert!(!args.no_store);
        assert!(!args.json);

        let config = apply_crawl_overrides(CrawlConfig::default(), &args);
        assert_eq!(config, CrawlConfig::default());
    }

    #[test]
    fn test_crawl_overrides() {
        let args = crawl_args(&[
            "jobboard",
            "crawl",
            "20",
            "8",
            "--cap",
            "50",
            "--timeout-secs",
            "90",
            "--no-dedupe",
        ]);

        let config = apply_crawl_overrides(CrawlConfig::default(), &args);
        assert_eq!(config.page_count, 20);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.result_cap, 50);
        assert_eq!(config.timeout, Some(Duration::from_secs(90)));
        assert!(!config.dedupe);
    }

    #[test]
    fn test_url_template_override() {
        let args = crawl_args(&[
            "jobboard",
            "crawl",
            "--url-template",
            "https://jobs.example.com/list?page={page}",
        ]);
        let listing = load_listing_config(&args).expect("should load");
        assert_eq!(listing.page_url(3), "https://jobs.example.com/list?page=3");

        let args = crawl_args(&["jobboard", "crawl", "--url-template", "https://jobs.example.com/"]);
        assert!(load_listing_config(&args).is_err());
    }

    #[test]
    fn test_jobs_filters() {
        let cli = Cli::try_parse_from([
            "jobboard",
            "jobs",
            "--location",
            "Seoul",
            "-s",
            "backend",
            "--page",
            "2",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Jobs(args) => {
                let filter = args.filter();
                assert_eq!(filter.location.as_deref(), Some("Seoul"));
                assert_eq!(filter.search.as_deref(), Some("backend"));
                assert!(filter.company.is_none());
                assert_eq!(args.page, 2);
                assert_eq!(args.page_size, DEFAULT_PAGE_SIZE);
            }
            _ => panic!("Expected Jobs command"),
        }
    }

    #[test]
    fn test_export_defaults() {
        let cli = Cli::try_parse_from(["jobboard", "export"]).expect("should parse");
        match cli.command {
            Commands::Export(args) => {
                assert_eq!(args.output, PathBuf::from(DEFAULT_EXPORT_PATH));
            }
            _ => panic!("Expected Export command"),
        }
    }

    #[test]
    fn test_global_log_level() {
        let cli = Cli::try_parse_from(["jobboard", "jobs", "--log-level", "debug"])
            .expect("should parse");
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_format_record() {
        let record = validate(sample_record("https://jobs.example.com/view?id=9"))
            .expect("sample record is complete");
        let text = format_record(1, &record);

        assert!(text.starts_with("[index: 1] Company: Acme Corp"));
        assert!(text.contains("Sectors: Backend, Server"));
        assert!(text.ends_with("Link: https://jobs.example.com/view?id=9"));
    }

    #[test]
    fn test_cli_overrides_apply_before_validation() {
        let base = CrawlConfig::default().with_result_cap(0);

        let args = crawl_args(&["jobboard", "crawl", "--cap", "50"]);
        let config = resolve_crawl_config(base.clone(), &args).expect("override fixes the cap");
        assert_eq!(config.result_cap, 50);

        let args = crawl_args(&["jobboard", "crawl"]);
        assert!(resolve_crawl_config(base, &args).is_err());
    }

    fn one_record_report() -> CrawlReport {
        let record = validate(sample_record("https://jobs.example.com/view?id=3"))
            .expect("sample record is complete");
        CrawlReport {
            crawl_id: Uuid::new_v4(),
            records: vec![record],
            stats: PoolStats::default(),
            teardown_error: None,
            elapsed: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_report_written_before_store_failure() {
        let dir = tempfile::tempdir().expect("temp dir");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").expect("write blocker file");
        let db = blocker.join("jobs.db");
        let db = db.to_str().expect("utf-8 path");

        let report = one_record_report();

        let args = crawl_args(&["jobboard", "crawl", "--db", db]);
        let mut out = Vec::new();
        let result = emit_and_store(&report, &args, &mut out).await;
        assert!(result.is_err());
        let text = String::from_utf8(out).expect("utf-8 output");
        assert!(text.contains("Link: https://jobs.example.com/view?id=3"));
        assert!(text.contains("✓ Crawled 1 jobs"));
        assert!(!text.contains("Stored:"));

        let args = crawl_args(&["jobboard", "crawl", "--json", "--db", db]);
        let mut out = Vec::new();
        assert!(emit_and_store(&report, &args, &mut out).await.is_err());
        let json: serde_json::Value = serde_json::from_slice(&out).expect("complete JSON");
        assert_eq!(json["count"], 1);
    }

    #[tokio::test]
    async fn test_store_count_follows_report() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = dir.path().join("jobs.db");
        let db = db.to_str().expect("utf-8 path");
        let report = one_record_report();

        let args = crawl_args(&["jobboard", "crawl", "--db", db]);
        let mut out = Vec::new();
        emit_and_store(&report, &args, &mut out)
            .await
            .expect("store should succeed");
        let text = String::from_utf8(out).expect("utf-8 output");
        let crawled = text.find("✓ Crawled").expect("summary line");
        let stored = text.find("  Stored: 1").expect("stored line");
        assert!(crawled < stored);
    }
}
