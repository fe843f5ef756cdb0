//! Validation engine: bounded-concurrency URL probing.
//!
//! Every submitted URL yields exactly one terminal [`ValidationResult`] —
//! malformed input, transport failures, timeouts, and cancellation are all
//! converted into Error-class results at this boundary, never propagated as
//! faults to the caller.

mod classify;

pub use classify::classify;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

use webcatalog_shared::{
    CatalogError, Result, StatusClass, ValidationResult, display_name_for,
};

/// User-Agent string for validation probes.
const USER_AGENT: &str = concat!("webcatalog/", env!("CARGO_PKG_VERSION"));

/// How often the progress callback fires, in completions.
const PROGRESS_INTERVAL: usize = 25;

// ---------------------------------------------------------------------------
// Progress surface
// ---------------------------------------------------------------------------

/// Batch validation progress: running counts at fixed intervals and at 100%,
/// so very large batches stay observable.
pub trait ValidationProgress: Send + Sync {
    /// `validated` of `total` done so far, `errors` of them Error-class.
    fn progress(&self, validated: usize, total: usize, errors: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ValidationProgress for SilentProgress {
    fn progress(&self, _validated: usize, _total: usize, _errors: usize) {}
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Validator options.
#[derive(Debug, Clone)]
pub struct ValidatorOptions {
    /// Per-probe timeout; a hanging host cannot stall the batch past this.
    pub timeout: Duration,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
        }
    }
}

/// URL validator with a shared HTTP client.
pub struct Validator {
    client: Client,
}

impl Validator {
    /// Create a validator with the given options.
    pub fn new(options: ValidatorOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(options.timeout)
            .build()
            .map_err(|e| CatalogError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Validate a single URL: format check, scheme check, bounded network
    /// probe, status classification, content-type read, asset-type inference.
    ///
    /// Infallible by design — every failure mode becomes an Error-class
    /// result.
    pub async fn validate(&self, url: &str) -> ValidationResult {
        validate_url(&self.client, url).await
    }

    /// Validate a set of URLs concurrently, at most `concurrency` in flight.
    ///
    /// Returns exactly one result per input, in input order; callers
    /// correlate by URL, not by completion order. URLs not yet started when
    /// `cancel` fires yield Error-class "cancelled" results, preserving the
    /// 1:1 invariant.
    #[instrument(skip_all, fields(total = urls.len(), concurrency))]
    pub async fn validate_batch(
        &self,
        urls: &[String],
        concurrency: usize,
        progress: &dyn ValidationProgress,
        cancel: &CancellationToken,
    ) -> Vec<ValidationResult> {
        let total = urls.len();
        if total == 0 {
            return Vec::new();
        }

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let completed = Arc::new(AtomicUsize::new(0));
        let errored = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(total);
        for url in urls {
            let client = self.client.clone();
            let url = url.clone();
            let sem = semaphore.clone();
            let cancel = cancel.clone();
            let completed = completed.clone();
            let errored = errored.clone();

            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire().await.expect("semaphore closed");

                // Cancellation poll point: one check per URL, before the probe.
                let result = if cancel.is_cancelled() {
                    let mut result =
                        ValidationResult::error(url.as_str(), "validation cancelled");
                    result
                        .metadata
                        .insert("cancelled".into(), serde_json::json!(true));
                    result
                } else {
                    validate_url(&client, &url).await
                };

                if result.class == StatusClass::Error {
                    errored.fetch_add(1, Ordering::Relaxed);
                }
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                (result, done)
            }));
        }

        let mut results = Vec::with_capacity(total);
        for (i, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok((result, done)) => {
                    if done % PROGRESS_INTERVAL == 0 || done == total {
                        progress.progress(done, total, errored.load(Ordering::Relaxed));
                    }
                    results.push(result);
                }
                Err(e) => {
                    // A panicked probe still owes its URL a terminal result.
                    errored.fetch_add(1, Ordering::Relaxed);
                    results.push(ValidationResult::error(
                        urls[i].as_str(),
                        format!("validation task failed: {e}"),
                    ));
                }
            }
        }

        info!(
            total,
            errors = errored.load(Ordering::Relaxed),
            cancelled = cancel.is_cancelled(),
            "batch validation finished"
        );

        results
    }
}

/// The single-URL validation sequence, over a shared HTTP client.
async fn validate_url(client: &Client, url: &str) -> ValidationResult {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => return ValidationResult::error(url, format!("malformed URL: {e}")),
    };

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return ValidationResult::error(url, format!("unsupported scheme: {other}"));
        }
    }

    debug!(%url, "validating");

    let response = match client.get(parsed.as_str()).send().await {
        Ok(response) => response,
        Err(e) => {
            let message = if e.is_timeout() {
                format!("request timed out: {e}")
            } else {
                format!("request failed: {e}")
            };
            return ValidationResult::error(url, message);
        }
    };

    let status_code = response.status().as_u16();
    let class = StatusClass::from_code(status_code);
    let valid = class == StatusClass::Success;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(normalize_content_type);

    let asset_type = classify(content_type.as_deref(), url);

    let message = match class {
        StatusClass::Redirect => format!("HTTP {status_code} (redirect not followed)"),
        _ => format!("HTTP {status_code}"),
    };

    ValidationResult {
        display_name: display_name_for(url),
        url: url.to_string(),
        status_code: Some(status_code),
        class,
        message,
        content_type,
        valid,
        asset_type,
        validated_at: chrono::Utc::now(),
        metadata: Default::default(),
    }
}

/// Normalize a content-type header value: strip parameters, lowercase.
fn normalize_content_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or(value)
        .trim()
        .to_ascii_lowercase()
}
