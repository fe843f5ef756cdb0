//! Core domain types for the webcatalog processing pipeline.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for processing job identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// The four phases of a catalog processing job, in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Mapping,
    Validation,
    Extraction,
    Enhancement,
}

impl Phase {
    /// The phase that must be completed before this one may start.
    /// Mapping has no predecessor.
    pub fn preceding(&self) -> Option<Phase> {
        match self {
            Phase::Mapping => None,
            Phase::Validation => Some(Phase::Mapping),
            Phase::Extraction => Some(Phase::Validation),
            Phase::Enhancement => Some(Phase::Extraction),
        }
    }

    /// Stable name used in storage keys and status output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Mapping => "mapping",
            Phase::Validation => "validation",
            Phase::Extraction => "extraction",
            Phase::Enhancement => "enhancement",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "mapping" => Ok(Phase::Mapping),
            "validation" => Ok(Phase::Validation),
            "extraction" => Ok(Phase::Extraction),
            "enhancement" => Ok(Phase::Enhancement),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}

/// Execution status of a single phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    NotStarted,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PhaseStatus::NotStarted => "not_started",
            PhaseStatus::Running => "running",
            PhaseStatus::Completed => "completed",
            PhaseStatus::Failed => "failed",
            PhaseStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Per-phase bookkeeping stored on the job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseState {
    /// Current status of the phase.
    #[serde(default)]
    pub status: PhaseStatus,
    /// Identifier of the phase result, set once the phase has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
    /// Error text if the phase failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Job configuration & statistics
// ---------------------------------------------------------------------------

/// Per-job runtime configuration. Typed fields for the knobs the pipeline
/// reads; `extra` carries genuinely extensible tags only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Validate URLs while the crawl is still running (pipelined).
    #[serde(default = "default_true")]
    pub validate_during_mapping: bool,
    /// Concurrency bound for batch validation.
    #[serde(default = "default_concurrent_validations")]
    pub concurrent_validations: usize,
    /// Per-request timeout in seconds for crawl fetches and validation probes.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Maximum concurrent crawl fetches.
    #[serde(default = "default_crawl_concurrency")]
    pub crawl_concurrency: u32,
    /// Minimum ms between requests to the target host.
    #[serde(default)]
    pub rate_limit_ms: u64,
    /// URL include glob patterns (empty = everything in scope).
    #[serde(default)]
    pub include_patterns: Vec<String>,
    /// URL exclude glob patterns.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Open tag bag for extensions; not interpreted by the pipeline.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            validate_during_mapping: true,
            concurrent_validations: default_concurrent_validations(),
            request_timeout_secs: default_request_timeout(),
            crawl_concurrency: default_crawl_concurrency(),
            rate_limit_ms: 0,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            extra: HashMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_concurrent_validations() -> usize {
    10
}
fn default_request_timeout() -> u64 {
    15
}
fn default_crawl_concurrency() -> u32 {
    4
}

/// Aggregate counters maintained by the orchestrator across phases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStatistics {
    /// Total distinct URLs discovered for the job's project.
    #[serde(default)]
    pub total_urls_found: u64,
    /// URLs whose last validation was valid.
    #[serde(default)]
    pub valid_urls: u64,
    /// URLs whose last validation was invalid or errored.
    #[serde(default)]
    pub broken_urls: u64,
    /// Pages fetched during discovery.
    #[serde(default)]
    pub pages_fetched: u64,
    /// Fetch failures during discovery (skipped, not fatal).
    #[serde(default)]
    pub fetch_errors: u64,
    /// Histogram keyed by normalized content-type.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub content_types: HashMap<String, u64>,
    /// Open counter bag for extensions.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// ProcessingJob
// ---------------------------------------------------------------------------

/// The durable record of one catalog run. Mutated only by the orchestrator;
/// retained for audit and resume, never deleted automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    /// Unique job identifier.
    pub id: JobId,
    /// Human-readable name.
    pub name: String,
    /// Crawl starting point.
    pub seed_url: String,
    /// Maximum link-follow distance from the seed.
    pub max_depth: u32,
    /// Hard cap on total discovered URLs.
    pub max_urls: u64,
    /// Mapping phase state.
    #[serde(default)]
    pub mapping: PhaseState,
    /// Validation phase state.
    #[serde(default)]
    pub validation: PhaseState,
    /// Extraction phase state.
    #[serde(default)]
    pub extraction: PhaseState,
    /// Enhancement phase state.
    #[serde(default)]
    pub enhancement: PhaseState,
    /// Runtime configuration.
    #[serde(default)]
    pub config: JobConfig,
    /// Aggregate statistics.
    #[serde(default)]
    pub statistics: JobStatistics,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last persisted.
    pub updated_at: DateTime<Utc>,
}

impl ProcessingJob {
    /// Create a new job. Phase states start as NotStarted.
    pub fn new(
        name: impl Into<String>,
        seed_url: impl Into<String>,
        max_depth: u32,
        max_urls: u64,
        config: JobConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            name: name.into(),
            seed_url: seed_url.into(),
            max_depth,
            max_urls,
            mapping: PhaseState::default(),
            validation: PhaseState::default(),
            extraction: PhaseState::default(),
            enhancement: PhaseState::default(),
            config,
            statistics: JobStatistics::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Borrow the state of a phase.
    pub fn phase_state(&self, phase: Phase) -> &PhaseState {
        match phase {
            Phase::Mapping => &self.mapping,
            Phase::Validation => &self.validation,
            Phase::Extraction => &self.extraction,
            Phase::Enhancement => &self.enhancement,
        }
    }

    /// Mutably borrow the state of a phase.
    pub fn phase_state_mut(&mut self, phase: Phase) -> &mut PhaseState {
        match phase {
            Phase::Mapping => &mut self.mapping,
            Phase::Validation => &mut self.validation,
            Phase::Extraction => &mut self.extraction,
            Phase::Enhancement => &mut self.enhancement,
        }
    }

    /// Whether `phase` may transition to Running: its predecessor (if any)
    /// must be Completed.
    pub fn phase_ready(&self, phase: Phase) -> bool {
        match phase.preceding() {
            None => true,
            Some(prev) => self.phase_state(prev).status == PhaseStatus::Completed,
        }
    }
}

// ---------------------------------------------------------------------------
// DiscoveredUrl
// ---------------------------------------------------------------------------

/// How a URL entered the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStatus {
    /// Seen as a link target but not fetched (asset, or beyond depth).
    Listed,
    /// Page was fetched and its links followed.
    Fetched,
    /// Fetch was attempted and failed; the URL stays in the catalog.
    FetchFailed,
}

/// One discovered URL. Identity is `normalized_url`; duplicates collapse
/// to a single record, including across resumed crawl runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredUrl {
    /// The URL as discovered.
    pub url: String,
    /// Dedup key: lowercase, fragment stripped, trailing slash stripped.
    pub normalized_url: String,
    /// Page title, when the page was fetched and had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Link-follow distance from the seed.
    pub depth: u32,
    /// Discovery outcome.
    pub status: DiscoveryStatus,
    /// SHA-256 of the fetched body, when fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Attached validation outcome, absent until validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
    /// Open metadata bag.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    /// When the URL was first recorded.
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredUrl {
    /// Record a URL seen at `depth` with the given status.
    pub fn new(url: &Url, depth: u32, status: DiscoveryStatus) -> Self {
        Self {
            url: url.to_string(),
            normalized_url: normalize_url(url),
            title: None,
            depth,
            status,
            content_hash: None,
            validation: None,
            metadata: HashMap::new(),
            discovered_at: Utc::now(),
        }
    }
}

/// Normalize a URL for deduplication: drop the fragment, lowercase, and
/// strip the trailing slash (except for the root path).
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    let mut s = normalized.to_string().to_ascii_lowercase();
    if s.ends_with('/') && s.matches('/').count() > 3 {
        s.pop();
    }
    s
}

// ---------------------------------------------------------------------------
// ValidationResult
// ---------------------------------------------------------------------------

/// HTTP status classification for a validation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Success,
    Redirect,
    ClientError,
    ServerError,
    /// Transport failure, timeout, or malformed input — no HTTP status.
    Error,
}

impl StatusClass {
    /// Classify an HTTP status code.
    pub fn from_code(code: u16) -> Self {
        match code {
            200..=299 => StatusClass::Success,
            300..=399 => StatusClass::Redirect,
            400..=499 => StatusClass::ClientError,
            _ => StatusClass::ServerError,
        }
    }
}

/// Coarse asset classification inferred from content-type and extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Article,
    Image,
    Video,
    Audio,
    Pdf,
    Document,
    Dataset,
    Archive,
    #[default]
    Other,
}

impl AssetType {
    /// Stable name used in display output and histograms.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Article => "article",
            AssetType::Image => "image",
            AssetType::Video => "video",
            AssetType::Audio => "audio",
            AssetType::Pdf => "pdf",
            AssetType::Document => "document",
            AssetType::Dataset => "dataset",
            AssetType::Archive => "archive",
            AssetType::Other => "other",
        }
    }
}

/// Terminal outcome of one validation attempt for one URL.
///
/// Invariants: `valid` implies `class == Success`; a transport failure is
/// reported as `class == Error` with `valid == false` and the transport
/// error text in `message`. Validation never errors past its boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// The URL that was validated.
    pub url: String,
    /// HTTP status code, absent on transport failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Status classification.
    pub class: StatusClass,
    /// Human-readable outcome message.
    pub message: String,
    /// Response content-type, normalized (parameters stripped, lowercase).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Whether the URL is considered reachable and well-formed.
    pub valid: bool,
    /// Inferred asset classification.
    #[serde(default)]
    pub asset_type: AssetType,
    /// Short display name derived from the URL.
    pub display_name: String,
    /// When the validation ran.
    pub validated_at: DateTime<Utc>,
    /// Open metadata bag.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ValidationResult {
    /// Build an Error-class terminal result (malformed input, transport
    /// failure, timeout, or cancellation).
    pub fn error(url: impl Into<String>, message: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            display_name: display_name_for(&url),
            url,
            status_code: None,
            class: StatusClass::Error,
            message: message.into(),
            content_type: None,
            valid: false,
            asset_type: AssetType::Other,
            validated_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }
}

/// Derive a short display name from the last path segment of a URL,
/// falling back to the host.
pub fn display_name_for(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let segment = parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
                .filter(|s| !s.is_empty());
            segment
                .or_else(|| parsed.host_str().map(str::to_string))
                .unwrap_or_else(|| url.to_string())
        }
        Err(_) => url.to_string(),
    }
}

// ---------------------------------------------------------------------------
// CatalogProcessingResult
// ---------------------------------------------------------------------------

/// Per-URL outcome inside a phase result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessedStatus {
    Success,
    Warning,
    Error,
    Pending,
}

/// One URL's entry in a phase result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedUrl {
    /// The URL processed.
    pub url: String,
    /// Outcome bucket.
    pub status: ProcessedStatus,
    /// Human-readable outcome message.
    pub message: String,
    /// Open metadata bag.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Phase-scoped result container: one instance per (job, phase) execution.
/// Immutable once marked succeeded or failed, except for count corrections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogProcessingResult {
    /// Result identifier (referenced from the job's phase state).
    pub id: String,
    /// Owning job.
    pub job_id: JobId,
    /// Which phase produced this result.
    pub phase: Phase,
    /// When the phase execution started.
    pub created_at: DateTime<Utc>,
    /// When the phase execution finished, if it has.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Whether the execution ran to a terminal state.
    #[serde(default)]
    pub completed: bool,
    /// Whether the execution succeeded.
    #[serde(default)]
    pub success: bool,
    /// Error text when the execution failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Per-URL outcomes.
    #[serde(default)]
    pub processed_urls: Vec<ProcessedUrl>,
    /// Explicitly-set success count. `None` means "not set": accessors fall
    /// back to counting `processed_urls`. An explicit 0 is reported as 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_count: Option<usize>,
    /// Explicitly-set warning count; same set semantics as `success_count`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_count: Option<usize>,
    /// Explicitly-set error count; same set semantics as `success_count`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_count: Option<usize>,
    /// Open metrics bag (content-type histogram, durations, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metrics: HashMap<String, serde_json::Value>,
}

impl CatalogProcessingResult {
    /// Start a fresh result for a phase execution.
    pub fn new(job_id: JobId, phase: Phase) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            job_id,
            phase,
            created_at: Utc::now(),
            completed_at: None,
            completed: false,
            success: false,
            error_message: None,
            processed_urls: Vec::new(),
            success_count: None,
            warning_count: None,
            error_count: None,
            metrics: HashMap::new(),
        }
    }

    /// Successes: the explicit count when set, else derived from entries.
    pub fn successes(&self) -> usize {
        self.success_count
            .unwrap_or_else(|| self.count_status(ProcessedStatus::Success))
    }

    /// Warnings: the explicit count when set, else derived from entries.
    pub fn warnings(&self) -> usize {
        self.warning_count
            .unwrap_or_else(|| self.count_status(ProcessedStatus::Warning))
    }

    /// Errors: the explicit count when set, else derived from entries.
    pub fn errors(&self) -> usize {
        self.error_count
            .unwrap_or_else(|| self.count_status(ProcessedStatus::Error))
    }

    fn count_status(&self, status: ProcessedStatus) -> usize {
        self.processed_urls
            .iter()
            .filter(|p| p.status == status)
            .count()
    }

    /// Mark the result as completed successfully.
    pub fn mark_succeeded(&mut self) {
        self.completed = true;
        self.success = true;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the result as completed with a failure.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.completed = true;
        self.success = false;
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
    }
}

// ---------------------------------------------------------------------------
// DiscoveryProject
// ---------------------------------------------------------------------------

/// The crawl-scoped context for one seed URL: bounds, advised patterns, and
/// the namespace under which discovered URLs are recorded. One per job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryProject {
    /// Project identifier (equal to the owning job id).
    pub id: String,
    /// Owning job.
    pub job_id: JobId,
    /// Crawl starting point.
    pub seed_url: String,
    /// Maximum link-follow distance, possibly advisor-adjusted.
    pub max_depth: u32,
    /// Hard cap on discovered URLs, possibly advisor-adjusted.
    pub max_urls: u64,
    /// Include patterns, seeded from advisor hints when present.
    #[serde(default)]
    pub url_patterns: Vec<String>,
    /// When the project was created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ReconReport
// ---------------------------------------------------------------------------

/// Advisory crawl-tuning hints from the reconnaissance provider. Every
/// field is optional; `default()` is the degenerate no-hints report the
/// pipeline must function with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconReport {
    /// Estimated number of URLs reachable from the seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_url_count: Option<u64>,
    /// Suggested crawl depth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_depth: Option<u32>,
    /// Suggested URL budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_max_urls: Option<u64>,
    /// Suggested include patterns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub url_patterns: Vec<String>,
    /// Free-form analysis notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_roundtrip() {
        let id = JobId::new();
        let s = id.to_string();
        let parsed: JobId = s.parse().expect("parse JobId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn phase_ordering() {
        assert_eq!(Phase::Mapping.preceding(), None);
        assert_eq!(Phase::Validation.preceding(), Some(Phase::Mapping));
        assert_eq!(Phase::Extraction.preceding(), Some(Phase::Validation));
        assert_eq!(Phase::Enhancement.preceding(), Some(Phase::Extraction));
    }

    #[test]
    fn phase_gating_on_job() {
        let mut job = ProcessingJob::new(
            "test",
            "https://example.com",
            1,
            50,
            JobConfig::default(),
        );
        assert!(job.phase_ready(Phase::Mapping));
        assert!(!job.phase_ready(Phase::Validation));

        job.mapping.status = PhaseStatus::Completed;
        assert!(job.phase_ready(Phase::Validation));
        assert!(!job.phase_ready(Phase::Extraction));
    }

    #[test]
    fn normalize_strips_fragment_case_and_trailing_slash() {
        let a = Url::parse("https://Example.COM/Docs/Page/#intro").unwrap();
        let b = Url::parse("https://example.com/docs/page").unwrap();
        assert_eq!(normalize_url(&a), normalize_url(&b));

        // Root path keeps its slash
        let root = Url::parse("https://example.com/").unwrap();
        assert_eq!(normalize_url(&root), "https://example.com/");
    }

    #[test]
    fn validation_error_result_invariants() {
        let result = ValidationResult::error("https://example.com/x", "connection refused");
        assert!(!result.valid);
        assert_eq!(result.class, StatusClass::Error);
        assert!(result.status_code.is_none());
        assert_eq!(result.message, "connection refused");
        assert_eq!(result.display_name, "x");
    }

    #[test]
    fn status_class_from_code() {
        assert_eq!(StatusClass::from_code(200), StatusClass::Success);
        assert_eq!(StatusClass::from_code(204), StatusClass::Success);
        assert_eq!(StatusClass::from_code(301), StatusClass::Redirect);
        assert_eq!(StatusClass::from_code(404), StatusClass::ClientError);
        assert_eq!(StatusClass::from_code(503), StatusClass::ServerError);
    }

    #[test]
    fn explicit_zero_count_is_not_recomputed() {
        let mut result = CatalogProcessingResult::new(JobId::new(), Phase::Mapping);
        result.processed_urls.push(ProcessedUrl {
            url: "https://example.com/a".into(),
            status: ProcessedStatus::Success,
            message: "ok".into(),
            metadata: HashMap::new(),
        });

        // No explicit count: derived from entries.
        assert_eq!(result.successes(), 1);

        // Explicit zero stays zero even though an entry would count as 1.
        result.success_count = Some(0);
        assert_eq!(result.successes(), 0);
    }

    #[test]
    fn result_terminal_transitions() {
        let mut result = CatalogProcessingResult::new(JobId::new(), Phase::Mapping);
        assert!(!result.completed);

        result.mark_failed("seed unreachable");
        assert!(result.completed);
        assert!(!result.success);
        assert_eq!(result.error_message.as_deref(), Some("seed unreachable"));
        assert!(result.completed_at.is_some());
    }

    #[test]
    fn recon_report_degenerate_deserializes() {
        let report: ReconReport = serde_json::from_str("{}").expect("empty report");
        assert!(report.estimated_url_count.is_none());
        assert!(report.recommended_depth.is_none());
        assert!(report.url_patterns.is_empty());
    }

    #[test]
    fn job_serialization_roundtrip() {
        let job = ProcessingJob::new(
            "docs-catalog",
            "https://example.com/docs",
            2,
            500,
            JobConfig::default(),
        );
        let json = serde_json::to_string(&job).expect("serialize");
        let parsed: ProcessingJob = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.id, job.id);
        assert_eq!(parsed.mapping.status, PhaseStatus::NotStarted);
        assert_eq!(parsed.config.concurrent_validations, 10);
    }

    #[test]
    fn display_name_falls_back_to_host() {
        assert_eq!(display_name_for("https://example.com/"), "example.com");
        assert_eq!(
            display_name_for("https://example.com/files/report.pdf"),
            "report.pdf"
        );
    }
}
