//! The mapping phase pipeline: reconnaissance → discovery → pipelined
//! validation → aggregation.
//!
//! [`run`] is spawned by the service with an exclusive execution slot. It
//! owns all failure handling for the phase: any error marks the phase
//! FAILED on both the job and the phase result before surfacing through
//! the returned handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use url::Url;

use webcatalog_crawler::{CrawlObserver, CrawlOptions, Crawler};
use webcatalog_recon::{ReconAdvisor, analyze_or_default};
use webcatalog_shared::{
    CatalogError, DiscoveredUrl, DiscoveryProject, JobId, JobStatistics, Phase, PhaseStatus,
    ProcessedStatus, ProcessedUrl, ProcessingJob, Result, StatusClass, ValidationResult,
};
use webcatalog_storage::Storage;
use webcatalog_validator::{ValidationProgress, Validator, ValidatorOptions};

use crate::aggregate::ResultAggregator;

/// Everything a mapping execution needs, moved into the spawned task.
pub(crate) struct MappingContext {
    pub storage: Arc<Storage>,
    pub advisor: Arc<dyn ReconAdvisor>,
    pub observer: Arc<dyn CrawlObserver>,
    pub cancel: CancellationToken,
    /// Allow crawling localhost (integration tests with mock servers).
    pub allow_localhost: bool,
}

/// What `execute` hands back for finalization.
struct ExecuteOutcome {
    job: ProcessingJob,
    cancelled: bool,
}

/// Run the mapping phase to its terminal state. The job's mapping status is
/// already Running and persisted when this is called.
#[instrument(skip_all, fields(job_id = %job_id))]
pub(crate) async fn run(ctx: MappingContext, job_id: JobId) -> Result<()> {
    let aggregator = ResultAggregator::new(job_id.clone(), Phase::Mapping);

    match execute(&ctx, &job_id, &aggregator).await {
        Ok(outcome) => {
            let (status, result) = if outcome.cancelled {
                (PhaseStatus::Cancelled, aggregator.finish_cancelled())
            } else {
                (PhaseStatus::Completed, aggregator.finish_succeeded())
            };
            ctx.storage.save_result(&result).await?;

            let mut job = outcome.job;
            let state = job.phase_state_mut(Phase::Mapping);
            state.status = status;
            state.result_id = Some(result.id.clone());
            state.error = None;
            job.updated_at = Utc::now();
            ctx.storage.save_job(&job).await?;

            ctx.observer.status(&format!("mapping {status}"));
            info!(%status, result_id = %result.id, "mapping finished");
            Ok(())
        }
        Err(e) => {
            let message = e.to_string();
            warn!(error = %message, "mapping failed");

            let result = aggregator.finish_failed(&message);
            if let Err(persist_err) = ctx.storage.save_result(&result).await {
                warn!(error = %persist_err, "failed to persist failed result");
            }
            match ctx.storage.load_job(&job_id.to_string()).await {
                Ok(Some(mut job)) => {
                    let state = job.phase_state_mut(Phase::Mapping);
                    state.status = PhaseStatus::Failed;
                    state.error = Some(message.clone());
                    state.result_id = Some(result.id.clone());
                    job.updated_at = Utc::now();
                    if let Err(persist_err) = ctx.storage.save_job(&job).await {
                        warn!(error = %persist_err, "failed to persist failed job");
                    }
                }
                _ => warn!("failed to reload job for failure marking"),
            }

            ctx.observer.status(&format!("mapping failed: {message}"));
            Err(e)
        }
    }
}

/// The five ordered sub-steps of the mapping phase.
async fn execute(
    ctx: &MappingContext,
    job_id: &JobId,
    aggregator: &ResultAggregator,
) -> Result<ExecuteOutcome> {
    let mut job = ctx
        .storage
        .load_job(&job_id.to_string())
        .await?
        .ok_or_else(|| CatalogError::JobNotFound {
            job_id: job_id.to_string(),
        })?;

    let seed = Url::parse(&job.seed_url)
        .map_err(|e| CatalogError::input(format!("seed URL {}: {e}", job.seed_url)))?;
    let timeout = Duration::from_secs(job.config.request_timeout_secs);

    // --- Step 1: reconnaissance (advisory, degrades to defaults) ---
    ctx.observer.status("analyzing seed URL");
    let hints = analyze_or_default(ctx.advisor.as_ref(), &seed, timeout).await;

    // --- Step 2: create or resume the discovery project ---
    let project = match ctx.storage.load_project(&job_id.to_string()).await? {
        Some(project) => {
            info!(project_id = %project.id, "resuming discovery project");
            project
        }
        None => {
            let mut url_patterns = job.config.include_patterns.clone();
            url_patterns.extend(hints.url_patterns.iter().cloned());

            let project = DiscoveryProject {
                id: job_id.to_string(),
                job_id: job_id.clone(),
                seed_url: job.seed_url.clone(),
                max_depth: hints.recommended_depth.unwrap_or(job.max_depth),
                // The job's budget is a hard cap; the advisor may only
                // narrow it.
                max_urls: hints
                    .recommended_max_urls
                    .unwrap_or(job.max_urls)
                    .min(job.max_urls),
                url_patterns,
                created_at: Utc::now(),
            };
            ctx.storage.save_project(&project).await?;
            info!(
                max_depth = project.max_depth,
                max_urls = project.max_urls,
                "discovery project created"
            );
            project
        }
    };

    // --- Step 3: crawl, streaming new URLs into the pipelined validator ---
    let validator = Arc::new(Validator::new(ValidatorOptions { timeout })?);

    let (batch_tx, worker) = if job.config.validate_during_mapping {
        let (tx, rx) = mpsc::unbounded_channel::<Vec<DiscoveredUrl>>();
        let worker = spawn_pipelined_validation(
            validator.clone(),
            rx,
            job.config.concurrent_validations,
            ctx.observer.clone(),
            ctx.cancel.clone(),
        );
        (Some(tx), Some(worker))
    } else {
        (None, None)
    };

    let pipeline_observer = PipelineObserver {
        inner: ctx.observer.clone(),
        batch_tx,
    };

    let mut crawler = Crawler::new(CrawlOptions {
        concurrency: job.config.crawl_concurrency,
        rate_limit_ms: job.config.rate_limit_ms,
        timeout,
        exclude_patterns: job.config.exclude_patterns.clone(),
    })?;
    if ctx.allow_localhost {
        crawler = crawler.allow_localhost();
    }

    ctx.observer.status("discovering URLs");
    let crawl = crawler
        .crawl(&project, &ctx.storage, &pipeline_observer, &ctx.cancel)
        .await?;

    // Closing the channel lets the worker drain and exit.
    drop(pipeline_observer);
    let mut validated: HashMap<String, ValidationResult> = match worker {
        Some(worker) => worker
            .await
            .map_err(|e| CatalogError::Execution(format!("validation worker failed: {e}")))?,
        None => HashMap::new(),
    };

    // --- Step 4: validate every discovered URL still lacking a result ---
    let remaining: Vec<String> = crawl
        .urls
        .iter()
        .filter(|u| u.validation.is_none() && !validated.contains_key(&u.url))
        .map(|u| u.url.clone())
        .collect();

    if !remaining.is_empty() && !ctx.cancel.is_cancelled() {
        ctx.observer
            .status(&format!("validating {} URLs", remaining.len()));
        let progress = StatusProgress {
            observer: ctx.observer.as_ref(),
        };
        let results = validator
            .validate_batch(
                &remaining,
                job.config.concurrent_validations,
                &progress,
                &ctx.cancel,
            )
            .await;
        for result in results {
            validated.insert(result.url.clone(), result);
        }
    }

    // --- Step 5: merge validations, aggregate outcomes, compute counters ---
    let mut stats = JobStatistics {
        pages_fetched: crawl.pages_fetched as u64,
        fetch_errors: crawl.fetch_errors as u64,
        ..Default::default()
    };
    let mut successes = 0usize;
    let mut warnings = 0usize;
    let mut errors = 0usize;

    for mut record in crawl.urls {
        stats.total_urls_found += 1;

        if let Some(validation) = validated.remove(&record.url) {
            // A result produced only because the stop flag fired is not a
            // terminal validation; leave the URL unvalidated for resume.
            if !was_cancelled(&validation) {
                record.validation = Some(validation);
                ctx.storage
                    .upsert_discovered_url(&project.id, &record)
                    .await?;
            }
        }

        match &record.validation {
            Some(validation) => {
                aggregator.record_validation(validation);
                if validation.valid {
                    successes += 1;
                    stats.valid_urls += 1;
                } else {
                    stats.broken_urls += 1;
                    if validation.class == StatusClass::Error {
                        errors += 1;
                    } else {
                        warnings += 1;
                    }
                }
                if let Some(content_type) = &validation.content_type {
                    *stats.content_types.entry(content_type.clone()).or_insert(0) += 1;
                }
            }
            None => {
                aggregator.record(ProcessedUrl {
                    url: record.url.clone(),
                    status: ProcessedStatus::Pending,
                    message: "not validated (run stopped)".into(),
                    metadata: Default::default(),
                });
            }
        }
    }

    aggregator.set_counts(successes, warnings, errors);
    aggregator.set_metric(
        "duration_ms",
        serde_json::json!(crawl.duration.as_millis() as u64),
    );
    aggregator.set_metric("new_urls", serde_json::json!(crawl.new_urls));

    ctx.observer.status(&format!(
        "mapped {} URLs: {} valid, {} warnings, {} errors",
        stats.total_urls_found, successes, warnings, errors
    ));

    job.statistics = stats;
    let cancelled = crawl.cancelled || ctx.cancel.is_cancelled();
    Ok(ExecuteOutcome { job, cancelled })
}

/// Whether a validation result exists only because the stop flag fired.
fn was_cancelled(validation: &ValidationResult) -> bool {
    validation
        .metadata
        .get("cancelled")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Spawn the worker that validates discovered-URL batches while the crawl
/// is still running. Results are buffered and merged after the crawl so the
/// discovery engine stays the only writer of crawl records.
fn spawn_pipelined_validation(
    validator: Arc<Validator>,
    mut rx: mpsc::UnboundedReceiver<Vec<DiscoveredUrl>>,
    concurrency: usize,
    observer: Arc<dyn CrawlObserver>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<HashMap<String, ValidationResult>> {
    tokio::spawn(async move {
        let mut results: HashMap<String, ValidationResult> = HashMap::new();

        while let Some(batch) = rx.recv().await {
            let urls: Vec<String> = batch
                .into_iter()
                .filter(|u| u.validation.is_none())
                .map(|u| u.url)
                .collect();
            if urls.is_empty() {
                continue;
            }

            let batch_results = validator
                .validate_batch(
                    &urls,
                    concurrency,
                    &webcatalog_validator::SilentProgress,
                    &cancel,
                )
                .await;
            for result in batch_results {
                results.insert(result.url.clone(), result);
            }
            observer.status(&format!("validated {} URLs so far", results.len()));
        }

        results
    })
}

// ---------------------------------------------------------------------------
// Observer adapters
// ---------------------------------------------------------------------------

/// Forwards crawl progress to the caller's observer and tees discovered
/// batches into the pipelined validation channel.
struct PipelineObserver {
    inner: Arc<dyn CrawlObserver>,
    batch_tx: Option<mpsc::UnboundedSender<Vec<DiscoveredUrl>>>,
}

impl CrawlObserver for PipelineObserver {
    fn status(&self, message: &str) {
        self.inner.status(message);
    }

    fn urls_discovered(&self, batch: &[DiscoveredUrl]) {
        self.inner.urls_discovered(batch);
        if let Some(tx) = &self.batch_tx {
            let _ = tx.send(batch.to_vec());
        }
    }
}

/// Adapts batch-validation progress onto the status surface.
struct StatusProgress<'a> {
    observer: &'a dyn CrawlObserver,
}

impl ValidationProgress for StatusProgress<'_> {
    fn progress(&self, validated: usize, total: usize, errors: usize) {
        self.observer.status(&format!(
            "validated {validated}/{total} ({errors} transport errors)"
        ));
    }
}
