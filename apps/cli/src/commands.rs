//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use webcatalog_core::CatalogService;
use webcatalog_crawler::CrawlObserver;
use webcatalog_recon::{HttpAdvisor, HttpAdvisorConfig, NullAdvisor, ReconAdvisor};
use webcatalog_shared::{
    AppConfig, DiscoveredUrl, JobConfig, JobId, Phase, expand_home, init_config, load_config,
};
use webcatalog_storage::Storage;
use webcatalog_validator::ValidationProgress;

/// Grace period for in-flight work when the user interrupts a phase.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// webcatalog — structured inventories of web-reachable assets.
#[derive(Parser)]
#[command(
    name = "webcatalog",
    version,
    about = "Discover, validate, and catalog web-reachable assets from a seed URL.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Create a new catalog job for a seed URL.
    Create {
        /// Seed URL to catalog.
        url: String,

        /// Human-readable job name (defaults to the URL hostname).
        #[arg(short, long)]
        name: Option<String>,

        /// Maximum crawl depth.
        #[arg(short, long)]
        depth: Option<u32>,

        /// Maximum number of URLs to discover.
        #[arg(short, long)]
        max_urls: Option<u64>,
    },

    /// Run the mapping phase (discovery + validation) for a job.
    Map {
        /// Job id.
        job: String,
    },

    /// Run the validation phase: re-validate every discovered URL.
    Validate {
        /// Job id.
        job: String,
    },

    /// Show a job's phase statuses and statistics.
    Status {
        /// Job id.
        job: String,
    },

    /// List all jobs.
    List,

    /// Show a phase result for a job.
    Result {
        /// Job id.
        job: String,

        /// Phase name: mapping, validation, extraction, or enhancement.
        #[arg(short, long, default_value = "mapping")]
        phase: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "webcatalog=info",
        1 => "webcatalog=debug",
        _ => "webcatalog=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Create {
            url,
            name,
            depth,
            max_urls,
        } => cmd_create(&url, name.as_deref(), depth, max_urls).await,
        Command::Map { job } => cmd_map(&job).await,
        Command::Validate { job } => cmd_validate(&job).await,
        Command::Status { job } => cmd_status(&job).await,
        Command::List => cmd_list().await,
        Command::Result { job, phase } => cmd_result(&job, &phase).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

/// Open storage and build the service from the resolved config.
async fn build_service(config: &AppConfig) -> Result<CatalogService> {
    let db_path = expand_home(&config.defaults.db_path);
    let storage = Arc::new(Storage::open(&db_path).await?);

    let advisor: Arc<dyn ReconAdvisor> = match &config.recon.endpoint {
        Some(endpoint) => Arc::new(HttpAdvisor::new(HttpAdvisorConfig {
            endpoint: endpoint.clone(),
            api_key_env: config.recon.api_key_env.clone(),
            timeout_secs: config.recon.timeout_secs,
        })?),
        None => Arc::new(NullAdvisor),
    };

    Ok(CatalogService::new(storage, advisor))
}

fn parse_job_id(job: &str) -> Result<JobId> {
    job.parse()
        .map_err(|e| eyre!("invalid job id {job}: {e}"))
}

// ---------------------------------------------------------------------------
// Progress rendering
// ---------------------------------------------------------------------------

/// Spinner-backed observer for crawl and validation progress.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {pos} URLs  {wide_msg}")
                .expect("valid progress template"),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl CrawlObserver for CliProgress {
    fn status(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn urls_discovered(&self, batch: &[DiscoveredUrl]) {
        self.bar.inc(batch.len() as u64);
    }
}

impl ValidationProgress for CliProgress {
    fn progress(&self, validated: usize, total: usize, errors: usize) {
        self.bar
            .set_message(format!("validated {validated}/{total} ({errors} errors)"));
        self.bar.set_position(validated as u64);
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_create(
    url: &str,
    name: Option<&str>,
    depth: Option<u32>,
    max_urls: Option<u64>,
) -> Result<()> {
    let config = load_config()?;
    let service = build_service(&config).await?;

    let job = service
        .create_job(
            name.unwrap_or(""),
            url,
            depth.unwrap_or(config.defaults.crawl_depth),
            max_urls.unwrap_or(config.defaults.max_urls),
            JobConfig::from(&config),
        )
        .await?;

    println!("created job {} ({})", job.id, job.name);
    println!("  seed:      {}", job.seed_url);
    println!("  depth:     {}", job.max_depth);
    println!("  max urls:  {}", job.max_urls);
    println!("run `webcatalog map {}` to start mapping", job.id);
    Ok(())
}

async fn cmd_map(job: &str) -> Result<()> {
    let config = load_config()?;
    let service = Arc::new(build_service(&config).await?);
    let job_id = parse_job_id(job)?;

    let progress = Arc::new(CliProgress::new());
    let handle = service.start_mapping(&job_id, progress.clone()).await?;

    // Ctrl-C sets the job's stop flag; the pipeline stops at its next poll
    // point and keeps partial results.
    {
        let service = service.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(%job_id, "interrupt received, stopping job");
                service.stop_job(&job_id);
            }
        });
    }

    let outcome = handle.join().await;
    progress.finish();
    service.shutdown(SHUTDOWN_GRACE).await;
    outcome?;

    let status = service.get_job_status(&job_id).await?;
    println!("mapping {}", status.mapping);
    println!("  URLs found:   {}", status.statistics.total_urls_found);
    println!("  valid:        {}", status.statistics.valid_urls);
    println!("  broken:       {}", status.statistics.broken_urls);
    println!("  pages fetched: {}", status.statistics.pages_fetched);
    if status.statistics.fetch_errors > 0 {
        println!("  fetch errors: {}", status.statistics.fetch_errors);
    }
    Ok(())
}

async fn cmd_validate(job: &str) -> Result<()> {
    let config = load_config()?;
    let service = build_service(&config).await?;
    let job_id = parse_job_id(job)?;

    let progress = CliProgress::new();
    let result = service.start_validation(&job_id, &progress).await?;
    progress.finish();

    println!(
        "validation {}: {} URLs, {} valid, {} warnings, {} errors",
        if result.success { "completed" } else { "failed" },
        result.processed_urls.len(),
        result.successes(),
        result.warnings(),
        result.errors(),
    );
    Ok(())
}

async fn cmd_status(job: &str) -> Result<()> {
    let config = load_config()?;
    let service = build_service(&config).await?;
    let job_id = parse_job_id(job)?;

    let status = service.get_job_status(&job_id).await?;
    println!("{} ({})", status.name, status.job_id);
    println!("  seed:        {}", status.seed_url);
    println!("  active:      {}", status.active);
    println!("  mapping:     {}", status.mapping);
    println!("  validation:  {}", status.validation);
    println!("  extraction:  {}", status.extraction);
    println!("  enhancement: {}", status.enhancement);
    println!("  URLs found:  {}", status.statistics.total_urls_found);
    if !status.statistics.content_types.is_empty() {
        println!("  content types:");
        let mut entries: Vec<_> = status.statistics.content_types.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (content_type, count) in entries {
            println!("    {count:>6}  {content_type}");
        }
    }
    Ok(())
}

async fn cmd_list() -> Result<()> {
    let config = load_config()?;
    let service = build_service(&config).await?;

    let jobs = service.list_jobs().await?;
    if jobs.is_empty() {
        println!("no jobs yet — create one with `webcatalog create <url>`");
        return Ok(());
    }

    for job in jobs {
        println!(
            "{}  {:<24} {:<11} {} URLs  {}",
            job.id,
            job.name,
            job.mapping.status.to_string(),
            job.statistics.total_urls_found,
            job.seed_url,
        );
    }
    Ok(())
}

async fn cmd_result(job: &str, phase: &str) -> Result<()> {
    let config = load_config()?;
    let service = build_service(&config).await?;
    let job_id = parse_job_id(job)?;

    let phase: Phase = phase.parse().map_err(|e: String| eyre!(e))?;
    let jobs = service.list_jobs().await?;
    let job = jobs
        .into_iter()
        .find(|j| j.id == job_id)
        .ok_or_else(|| eyre!("job not found: {job_id}"))?;

    let result_id = job
        .phase_state(phase)
        .result_id
        .as_deref()
        .ok_or_else(|| eyre!("no {phase} result recorded for this job"))?;

    let result = service
        .get_result(result_id)
        .await?
        .ok_or_else(|| eyre!("result {result_id} not found"))?;

    println!("{} result {} for job {}", result.phase, result.id, result.job_id);
    println!("  created:   {}", result.created_at.to_rfc3339());
    if let Some(completed_at) = result.completed_at {
        println!("  completed: {}", completed_at.to_rfc3339());
    }
    println!("  success:   {}", result.success);
    if let Some(error) = &result.error_message {
        println!("  error:     {error}");
    }
    println!(
        "  URLs: {} total, {} success, {} warnings, {} errors",
        result.processed_urls.len(),
        result.successes(),
        result.warnings(),
        result.errors(),
    );
    if !result.metrics.is_empty() {
        println!("  metrics: {}", serde_json::to_string_pretty(&result.metrics)?);
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("wrote default config to {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
