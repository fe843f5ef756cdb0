//! Catalog service: the job control surface other layers (CLI, HTTP, UI)
//! wrap.
//!
//! Owns the ProcessingJob state machine. All job mutation goes through this
//! service while it holds the job's exclusive execution slot in the
//! [`JobRegistry`]; later phases are gated on the strictly preceding phase
//! being Completed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument};
use url::Url;

use webcatalog_crawler::CrawlObserver;
use webcatalog_recon::ReconAdvisor;
use webcatalog_shared::{
    CatalogError, CatalogProcessingResult, JobConfig, JobId, JobStatistics, Phase, PhaseStatus,
    ProcessingJob, Result, StatusClass,
};
use webcatalog_storage::Storage;
use webcatalog_validator::{ValidationProgress, Validator, ValidatorOptions};

use crate::aggregate::ResultAggregator;
use crate::mapping::{self, MappingContext};
use crate::registry::JobRegistry;

/// Structured answer to a status poll.
#[derive(Debug, Clone)]
pub struct JobStatusReport {
    pub job_id: JobId,
    pub name: String,
    pub seed_url: String,
    pub mapping: PhaseStatus,
    pub validation: PhaseStatus,
    pub extraction: PhaseStatus,
    pub enhancement: PhaseStatus,
    pub statistics: JobStatistics,
    /// Whether an execution is currently registered (derived, not stored).
    pub active: bool,
}

/// Handle to a mapping execution in flight. The phase's outcome surfaces
/// here; it never propagates as a crash.
pub struct MappingHandle {
    pub job_id: JobId,
    handle: tokio::task::JoinHandle<Result<()>>,
}

impl MappingHandle {
    /// Wait for the mapping execution to reach its terminal state.
    pub async fn join(self) -> Result<()> {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(CatalogError::Execution(format!("mapping task failed: {e}"))),
        }
    }
}

/// The job orchestrator.
pub struct CatalogService {
    storage: Arc<Storage>,
    advisor: Arc<dyn ReconAdvisor>,
    registry: Arc<JobRegistry>,
    allow_localhost: bool,
}

impl CatalogService {
    /// Build a service over the given storage and reconnaissance advisor.
    pub fn new(storage: Arc<Storage>, advisor: Arc<dyn ReconAdvisor>) -> Self {
        Self {
            storage,
            advisor,
            registry: Arc::new(JobRegistry::new()),
            allow_localhost: false,
        }
    }

    /// Allow crawling localhost (integration tests with mock servers).
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    // -----------------------------------------------------------------------
    // Job lifecycle
    // -----------------------------------------------------------------------

    /// Create and persist a new job. Rejects malformed or non-http(s) seed
    /// URLs and a zero URL budget before any side effect.
    pub async fn create_job(
        &self,
        name: &str,
        seed_url: &str,
        max_depth: u32,
        max_urls: u64,
        config: JobConfig,
    ) -> Result<ProcessingJob> {
        let parsed = Url::parse(seed_url)
            .map_err(|e| CatalogError::input(format!("seed URL {seed_url}: {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(CatalogError::input(format!(
                "seed URL must be http or https, got {}",
                parsed.scheme()
            )));
        }
        if max_urls == 0 {
            return Err(CatalogError::input("max_urls must be at least 1"));
        }

        let name = if name.trim().is_empty() {
            parsed.host_str().unwrap_or("catalog").to_string()
        } else {
            name.trim().to_string()
        };

        let job = ProcessingJob::new(name, parsed.to_string(), max_depth, max_urls, config);
        self.storage.save_job(&job).await?;
        info!(job_id = %job.id, seed = %job.seed_url, "job created");
        Ok(job)
    }

    /// Start the mapping phase in the background.
    ///
    /// Rejects the call when an execution is already registered for this
    /// job. The returned handle is how callers observe success, failure, or
    /// cancellation of the phase.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn start_mapping(
        &self,
        job_id: &JobId,
        observer: Arc<dyn CrawlObserver>,
    ) -> Result<MappingHandle> {
        let mut job = self.load_job(job_id).await?;
        let slot = self.registry.register(job_id)?;

        job.mapping.status = PhaseStatus::Running;
        job.mapping.error = None;
        job.updated_at = Utc::now();
        if let Err(e) = self.storage.save_job(&job).await {
            self.registry.release(job_id);
            return Err(e);
        }

        let ctx = MappingContext {
            storage: self.storage.clone(),
            advisor: self.advisor.clone(),
            observer,
            cancel: slot.cancel.clone(),
            allow_localhost: self.allow_localhost,
        };
        let registry = self.registry.clone();
        let task_job_id = job_id.clone();

        let handle = tokio::spawn(async move {
            let outcome = mapping::run(ctx, task_job_id.clone()).await;
            registry.release(&task_job_id);
            slot.finish();
            outcome
        });

        Ok(MappingHandle {
            job_id: job_id.clone(),
            handle,
        })
    }

    /// Run the validation phase: re-validate every discovered URL of the
    /// job's project with fresh results. Gated on mapping being Completed.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn start_validation(
        &self,
        job_id: &JobId,
        progress: &dyn ValidationProgress,
    ) -> Result<CatalogProcessingResult> {
        let mut job = self.load_job(job_id).await?;
        Self::check_gate(&job, Phase::Validation)?;
        let slot = self.registry.register(job_id)?;

        job.validation.status = PhaseStatus::Running;
        job.validation.error = None;
        job.updated_at = Utc::now();
        if let Err(e) = self.storage.save_job(&job).await {
            self.registry.release(job_id);
            return Err(e);
        }

        let outcome = self
            .run_validation_phase(&mut job, progress, &slot.cancel)
            .await;
        self.registry.release(job_id);
        slot.finish();

        match outcome {
            Ok(result) => Ok(result),
            Err(e) => {
                let message = e.to_string();
                job.validation.status = PhaseStatus::Failed;
                job.validation.error = Some(message);
                job.updated_at = Utc::now();
                let _ = self.storage.save_job(&job).await;
                Err(e)
            }
        }
    }

    async fn run_validation_phase(
        &self,
        job: &mut ProcessingJob,
        progress: &dyn ValidationProgress,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<CatalogProcessingResult> {
        let project_id = job.id.to_string();
        let mut records = self.storage.load_discovered_urls(&project_id).await?;
        let urls: Vec<String> = records.iter().map(|r| r.url.clone()).collect();

        let validator = Arc::new(Validator::new(ValidatorOptions {
            timeout: Duration::from_secs(job.config.request_timeout_secs),
        })?);

        let results = validator
            .validate_batch(&urls, job.config.concurrent_validations, progress, cancel)
            .await;

        let aggregator = ResultAggregator::new(job.id.clone(), Phase::Validation);
        let mut successes = 0usize;
        let mut warnings = 0usize;
        let mut errors = 0usize;
        let mut content_types = std::collections::HashMap::new();

        for (record, validation) in records.iter_mut().zip(results) {
            aggregator.record_validation(&validation);
            if validation.valid {
                successes += 1;
            } else if validation.class == StatusClass::Error {
                errors += 1;
            } else {
                warnings += 1;
            }
            if let Some(content_type) = &validation.content_type {
                *content_types.entry(content_type.clone()).or_insert(0u64) += 1;
            }
            record.validation = Some(validation);
            self.storage
                .upsert_discovered_url(&project_id, record)
                .await?;
        }

        aggregator.set_counts(successes, warnings, errors);

        let cancelled = cancel.is_cancelled();
        let (status, result) = if cancelled {
            (PhaseStatus::Cancelled, aggregator.finish_cancelled())
        } else {
            (PhaseStatus::Completed, aggregator.finish_succeeded())
        };
        self.storage.save_result(&result).await?;

        job.statistics.valid_urls = successes as u64;
        job.statistics.broken_urls = (warnings + errors) as u64;
        job.statistics.content_types = content_types;
        job.validation.status = status;
        job.validation.result_id = Some(result.id.clone());
        job.updated_at = Utc::now();
        self.storage.save_job(job).await?;

        info!(%status, total = result.processed_urls.len(), "validation finished");
        Ok(result)
    }

    /// Extraction phase. Content extraction is handled by a downstream
    /// system; here the phase only preserves its gate and lifecycle.
    pub async fn start_extraction(&self, job_id: &JobId) -> Result<CatalogProcessingResult> {
        self.run_passthrough_phase(job_id, Phase::Extraction).await
    }

    /// Enhancement phase. Same lifecycle-only contract as extraction.
    pub async fn start_enhancement(&self, job_id: &JobId) -> Result<CatalogProcessingResult> {
        self.run_passthrough_phase(job_id, Phase::Enhancement).await
    }

    async fn run_passthrough_phase(
        &self,
        job_id: &JobId,
        phase: Phase,
    ) -> Result<CatalogProcessingResult> {
        let mut job = self.load_job(job_id).await?;
        Self::check_gate(&job, phase)?;
        let slot = self.registry.register(job_id)?;

        job.phase_state_mut(phase).status = PhaseStatus::Running;
        job.updated_at = Utc::now();
        if let Err(e) = self.storage.save_job(&job).await {
            self.registry.release(job_id);
            return Err(e);
        }

        let aggregator = ResultAggregator::new(job_id.clone(), phase);
        aggregator.set_counts(0, 0, 0);
        let result = aggregator.finish_succeeded();

        let outcome = async {
            self.storage.save_result(&result).await?;
            let state = job.phase_state_mut(phase);
            state.status = PhaseStatus::Completed;
            state.result_id = Some(result.id.clone());
            job.updated_at = Utc::now();
            self.storage.save_job(&job).await
        }
        .await;

        self.registry.release(job_id);
        slot.finish();
        outcome?;

        info!(%phase, "phase completed (no-op)");
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Control & inspection
    // -----------------------------------------------------------------------

    /// Set the cooperative stop flag for a job's execution. Returns whether
    /// a flag existed. The flag is observed at the next poll point, not
    /// instantly.
    pub fn stop_job(&self, job_id: &JobId) -> bool {
        self.registry.stop(job_id)
    }

    /// Poll a job's status: identity, all four phase statuses, statistics,
    /// and whether an execution is currently registered.
    pub async fn get_job_status(&self, job_id: &JobId) -> Result<JobStatusReport> {
        let job = self.load_job(job_id).await?;
        Ok(JobStatusReport {
            job_id: job.id.clone(),
            name: job.name.clone(),
            seed_url: job.seed_url.clone(),
            mapping: job.mapping.status,
            validation: job.validation.status,
            extraction: job.extraction.status,
            enhancement: job.enhancement.status,
            statistics: job.statistics.clone(),
            active: self.registry.is_active(job_id),
        })
    }

    /// List all persisted jobs.
    pub async fn list_jobs(&self) -> Result<Vec<ProcessingJob>> {
        self.storage.list_jobs().await
    }

    /// Load a phase result by id.
    pub async fn get_result(&self, result_id: &str) -> Result<Option<CatalogProcessingResult>> {
        self.storage.load_result(result_id).await
    }

    /// Best-effort shutdown: signal every registered execution, wait up to
    /// `grace`, then release all tracking state. Residual work past the
    /// grace period is abandoned, not interrupted.
    pub async fn shutdown(&self, grace: Duration) {
        self.registry.shutdown(grace).await;
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn load_job(&self, job_id: &JobId) -> Result<ProcessingJob> {
        self.storage
            .load_job(&job_id.to_string())
            .await?
            .ok_or_else(|| CatalogError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    /// Fail fast, with no state mutation, when the strictly preceding phase
    /// has not completed.
    fn check_gate(job: &ProcessingJob, phase: Phase) -> Result<()> {
        if job.phase_ready(phase) {
            return Ok(());
        }
        let requires = phase
            .preceding()
            .map(|p| p.as_str().to_string())
            .unwrap_or_default();
        Err(CatalogError::PhaseNotReady {
            phase: phase.as_str().to_string(),
            requires,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;
    use webcatalog_crawler::SilentObserver;
    use webcatalog_recon::NullAdvisor;
    use webcatalog_validator::SilentProgress;

    async fn test_service() -> CatalogService {
        let tmp = std::env::temp_dir().join(format!("wc_svc_{}.db", Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&tmp).await.expect("open test db"));
        CatalogService::new(storage, Arc::new(NullAdvisor)).allow_localhost()
    }

    async fn mount_page(server: &wiremock::MockServer, path: &str, body: &str) {
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path(path))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_raw(body.as_bytes(), "text/html"),
            )
            .mount(server)
            .await;
    }

    fn fast_config() -> JobConfig {
        JobConfig {
            request_timeout_secs: 5,
            ..JobConfig::default()
        }
    }

    #[tokio::test]
    async fn create_job_rejects_bad_input_without_side_effects() {
        let service = test_service().await;

        let err = service
            .create_job("x", "not a url", 1, 10, JobConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Input { .. }));

        let err = service
            .create_job("x", "ftp://example.com", 1, 10, JobConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Input { .. }));

        let err = service
            .create_job("x", "https://example.com", 1, 0, JobConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Input { .. }));

        assert!(service.list_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_job_defaults_name_to_host() {
        let service = test_service().await;
        let job = service
            .create_job("", "https://docs.example.com/start", 1, 10, JobConfig::default())
            .await
            .unwrap();
        assert_eq!(job.name, "docs.example.com");
    }

    #[tokio::test]
    async fn mapping_end_to_end() {
        let server = wiremock::MockServer::start().await;
        mount_page(
            &server,
            "/",
            r#"<html><head><title>Root</title></head><body>
                <a href="/articles/one">One</a>
                <a href="/files/report.pdf">Report</a>
            </body></html>"#,
        )
        .await;
        mount_page(&server, "/articles/one", "<html><head><title>One</title></head></html>").await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/files/report.pdf"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf"),
            )
            .mount(&server)
            .await;

        let service = test_service().await;
        let job = service
            .create_job("e2e", &server.uri(), 1, 50, fast_config())
            .await
            .unwrap();

        let handle = service
            .start_mapping(&job.id, Arc::new(SilentObserver))
            .await
            .unwrap();
        handle.join().await.unwrap();

        let status = service.get_job_status(&job.id).await.unwrap();
        assert_eq!(status.mapping, PhaseStatus::Completed);
        assert!(!status.active);
        assert!(status.statistics.total_urls_found <= 50);

        // Every discovered URL carries a validation result, and the phase
        // result covers each discovered URL exactly once.
        let stored = service
            .storage
            .load_discovered_urls(&job.id.to_string())
            .await
            .unwrap();
        assert_eq!(stored.len() as u64, status.statistics.total_urls_found);
        assert!(stored.iter().all(|u| u.validation.is_some()));

        let job = service.load_job(&job.id).await.unwrap();
        let result_id = job.mapping.result_id.as_deref().expect("result id set");
        let result = service.get_result(result_id).await.unwrap().unwrap();
        assert!(result.success);
        assert_eq!(
            result.processed_urls.len() as u64,
            job.statistics.total_urls_found
        );

        let pdf = stored
            .iter()
            .find(|u| u.url.ends_with("report.pdf"))
            .expect("pdf recorded");
        assert_eq!(
            pdf.validation.as_ref().unwrap().asset_type,
            webcatalog_shared::AssetType::Pdf
        );
    }

    #[tokio::test]
    async fn second_mapping_on_running_job_is_rejected() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_raw("<html><body>slow</body></html>".as_bytes(), "text/html")
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&server)
            .await;

        let service = test_service().await;
        let job = service
            .create_job("dup", &server.uri(), 1, 10, fast_config())
            .await
            .unwrap();

        let handle = service
            .start_mapping(&job.id, Arc::new(SilentObserver))
            .await
            .unwrap();

        let second = service
            .start_mapping(&job.id, Arc::new(SilentObserver))
            .await;
        assert!(matches!(second, Err(CatalogError::AlreadyRunning { .. })));

        let status = service.get_job_status(&job.id).await.unwrap();
        assert!(status.active);

        handle.join().await.unwrap();
        assert!(!service.get_job_status(&job.id).await.unwrap().active);
    }

    #[tokio::test]
    async fn validation_phase_is_gated_on_mapping() {
        let service = test_service().await;
        let job = service
            .create_job("gated", "https://example.com", 1, 10, JobConfig::default())
            .await
            .unwrap();

        let err = service
            .start_validation(&job.id, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::PhaseNotReady { .. }));

        // No state was mutated by the rejected call.
        let status = service.get_job_status(&job.id).await.unwrap();
        assert_eq!(status.validation, PhaseStatus::NotStarted);
        assert!(!status.active);

        // Deeper phases are gated the same way.
        let err = service.start_extraction(&job.id).await.unwrap_err();
        assert!(matches!(err, CatalogError::PhaseNotReady { .. }));
    }

    #[tokio::test]
    async fn later_phases_run_in_order_after_mapping() {
        let server = wiremock::MockServer::start().await;
        mount_page(&server, "/", "<html><head><title>Solo</title></head></html>").await;

        let service = test_service().await;
        let job = service
            .create_job("phases", &server.uri(), 1, 10, fast_config())
            .await
            .unwrap();

        service
            .start_mapping(&job.id, Arc::new(SilentObserver))
            .await
            .unwrap()
            .join()
            .await
            .unwrap();

        let validation = service
            .start_validation(&job.id, &SilentProgress)
            .await
            .unwrap();
        assert!(validation.success);
        assert_eq!(validation.processed_urls.len(), 1);

        // Enhancement is still gated until extraction completes.
        let err = service.start_enhancement(&job.id).await.unwrap_err();
        assert!(matches!(err, CatalogError::PhaseNotReady { .. }));

        let extraction = service.start_extraction(&job.id).await.unwrap();
        assert!(extraction.success);
        assert_eq!(extraction.successes(), 0);

        let enhancement = service.start_enhancement(&job.id).await.unwrap();
        assert!(enhancement.success);

        let status = service.get_job_status(&job.id).await.unwrap();
        assert_eq!(status.mapping, PhaseStatus::Completed);
        assert_eq!(status.validation, PhaseStatus::Completed);
        assert_eq!(status.extraction, PhaseStatus::Completed);
        assert_eq!(status.enhancement, PhaseStatus::Completed);
    }

    #[tokio::test]
    async fn stop_job_cancels_a_running_mapping() {
        let server = wiremock::MockServer::start().await;

        // A wide site with slow pages: plenty of cancellation poll points.
        let links: String = (0..50)
            .map(|i| format!(r#"<a href="/page{i}">p{i}</a>"#))
            .collect();
        mount_page(&server, "/", &format!("<html><body>{links}</body></html>")).await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_raw("<html><body>page</body></html>".as_bytes(), "text/html")
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;

        let service = test_service().await;
        let job = service
            .create_job("stoppable", &server.uri(), 2, 1000, fast_config())
            .await
            .unwrap();

        let handle = service
            .start_mapping(&job.id, Arc::new(SilentObserver))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(service.stop_job(&job.id));

        let start = std::time::Instant::now();
        handle.join().await.unwrap();
        // Bounded cancellation latency: far less than crawling 50 slow
        // pages to completion.
        assert!(start.elapsed() < Duration::from_secs(5));

        let status = service.get_job_status(&job.id).await.unwrap();
        assert_eq!(status.mapping, PhaseStatus::Cancelled);
        assert!(!status.active);

        // Partial results are kept for resume.
        let job = service.load_job(&job.id).await.unwrap();
        let result = service
            .get_result(job.mapping.result_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.metrics.get("cancelled"), Some(&serde_json::json!(true)));
    }

    #[tokio::test]
    async fn stop_job_without_execution_returns_false() {
        let service = test_service().await;
        assert!(!service.stop_job(&JobId::new()));
    }

    #[tokio::test]
    async fn mapping_with_unreachable_seed_completes_empty() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let service = test_service().await;
        let job = service
            .create_job("empty", &server.uri(), 1, 10, fast_config())
            .await
            .unwrap();

        service
            .start_mapping(&job.id, Arc::new(SilentObserver))
            .await
            .unwrap()
            .join()
            .await
            .unwrap();

        let status = service.get_job_status(&job.id).await.unwrap();
        assert_eq!(status.mapping, PhaseStatus::Completed);
        assert_eq!(status.statistics.total_urls_found, 0);

        let job = service.load_job(&job.id).await.unwrap();
        let result = service
            .get_result(job.mapping.result_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(result.success);
        assert!(result.processed_urls.is_empty());
        // Zero here is an explicit zero, not a recomputed one.
        assert_eq!(result.success_count, Some(0));
    }

    #[tokio::test]
    async fn shutdown_releases_all_executions() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_raw("<html><body>slow</body></html>".as_bytes(), "text/html")
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let service = test_service().await;
        let job = service
            .create_job("teardown", &server.uri(), 1, 10, fast_config())
            .await
            .unwrap();

        let handle = service
            .start_mapping(&job.id, Arc::new(SilentObserver))
            .await
            .unwrap();

        service.shutdown(Duration::from_secs(5)).await;
        assert!(!service.get_job_status(&job.id).await.unwrap().active);

        // The execution observed its token and terminated cleanly.
        handle.join().await.unwrap();
    }
}
