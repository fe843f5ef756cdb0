//! Result aggregator: incremental accumulation of per-URL outcomes into a
//! phase result.
//!
//! Safe to update from the pipeline while the phase is still running and to
//! read consistently from a status poller; snapshots clone under the lock.

use std::sync::Mutex;

use webcatalog_shared::{
    CatalogProcessingResult, JobId, Phase, ProcessedStatus, ProcessedUrl, StatusClass,
    ValidationResult,
};

/// Mutex-guarded accumulator for one phase execution.
pub struct ResultAggregator {
    inner: Mutex<CatalogProcessingResult>,
}

impl ResultAggregator {
    /// Start aggregating for a fresh (job, phase) execution.
    pub fn new(job_id: JobId, phase: Phase) -> Self {
        Self {
            inner: Mutex::new(CatalogProcessingResult::new(job_id, phase)),
        }
    }

    /// Identifier of the result being built.
    pub fn result_id(&self) -> String {
        self.inner.lock().expect("aggregator poisoned").id.clone()
    }

    /// Append a per-URL outcome.
    pub fn record(&self, entry: ProcessedUrl) {
        self.inner
            .lock()
            .expect("aggregator poisoned")
            .processed_urls
            .push(entry);
    }

    /// Append a per-URL outcome derived from a validation result, and bump
    /// the content-type histogram when one was observed.
    pub fn record_validation(&self, validation: &ValidationResult) {
        let status = if validation.valid {
            ProcessedStatus::Success
        } else if validation.class == StatusClass::Error {
            ProcessedStatus::Error
        } else {
            ProcessedStatus::Warning
        };

        let mut inner = self.inner.lock().expect("aggregator poisoned");
        inner.processed_urls.push(ProcessedUrl {
            url: validation.url.clone(),
            status,
            message: validation.message.clone(),
            metadata: Default::default(),
        });

        if let Some(content_type) = &validation.content_type {
            let histogram = inner
                .metrics
                .entry("content_types".to_string())
                .or_insert_with(|| serde_json::json!({}));
            if let Some(map) = histogram.as_object_mut() {
                let count = map.get(content_type).and_then(|v| v.as_u64()).unwrap_or(0);
                map.insert(content_type.clone(), serde_json::json!(count + 1));
            }
        }
    }

    /// Set the explicit outcome counters. Explicit counts take precedence
    /// over lazy recomputation; an explicit zero stays zero.
    pub fn set_counts(&self, successes: usize, warnings: usize, errors: usize) {
        let mut inner = self.inner.lock().expect("aggregator poisoned");
        inner.success_count = Some(successes);
        inner.warning_count = Some(warnings);
        inner.error_count = Some(errors);
    }

    /// Set a metric value.
    pub fn set_metric(&self, key: &str, value: serde_json::Value) {
        self.inner
            .lock()
            .expect("aggregator poisoned")
            .metrics
            .insert(key.to_string(), value);
    }

    /// Consistent point-in-time copy for status pollers.
    pub fn snapshot(&self) -> CatalogProcessingResult {
        self.inner.lock().expect("aggregator poisoned").clone()
    }

    /// Finish successfully and return the final result.
    pub fn finish_succeeded(self) -> CatalogProcessingResult {
        let mut result = self.inner.into_inner().expect("aggregator poisoned");
        result.mark_succeeded();
        result
    }

    /// Finish as failed with an error message and return the final result.
    pub fn finish_failed(self, message: impl Into<String>) -> CatalogProcessingResult {
        let mut result = self.inner.into_inner().expect("aggregator poisoned");
        result.mark_failed(message);
        result
    }

    /// Finish after a cooperative stop: the gathered data is kept and the
    /// result is marked completed (cancellation is not an error), with a
    /// `cancelled` metric so consumers can tell it was partial.
    pub fn finish_cancelled(self) -> CatalogProcessingResult {
        let mut result = self.inner.into_inner().expect("aggregator poisoned");
        result.metrics.insert("cancelled".into(), serde_json::json!(true));
        result.mark_succeeded();
        result
    }
}
