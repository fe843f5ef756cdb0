//! Reconnaissance advisor client.
//!
//! Before mapping a seed URL, the orchestrator may ask an external analysis
//! provider for crawl-tuning hints (estimated volume, suggested depth, URL
//! patterns). The provider is a black box; every hint is optional, and the
//! pipeline must run correctly with no hints at all, so failures here
//! degrade to [`ReconReport::default`] rather than aborting a job.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

use webcatalog_shared::{CatalogError, ReconReport, Result};

/// User-Agent string for advisor requests.
const USER_AGENT: &str = concat!("webcatalog/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow when calling the advisor.
const MAX_REDIRECTS: usize = 3;

// ---------------------------------------------------------------------------
// ReconAdvisor
// ---------------------------------------------------------------------------

/// Seam for the external reconnaissance provider.
#[async_trait]
pub trait ReconAdvisor: Send + Sync {
    /// Analyze a seed URL and return advisory crawl-tuning hints.
    async fn analyze(&self, seed_url: &Url) -> Result<ReconReport>;
}

/// Advisor that returns the degenerate no-hints report. Used when no
/// endpoint is configured and in tests.
#[derive(Debug, Default)]
pub struct NullAdvisor;

#[async_trait]
impl ReconAdvisor for NullAdvisor {
    async fn analyze(&self, _seed_url: &Url) -> Result<ReconReport> {
        Ok(ReconReport::default())
    }
}

// ---------------------------------------------------------------------------
// HttpAdvisor
// ---------------------------------------------------------------------------

/// Configuration for the HTTP advisor client.
#[derive(Debug, Clone)]
pub struct HttpAdvisorConfig {
    /// Analysis endpoint URL.
    pub endpoint: String,
    /// Name of the env var holding the API key (never the key itself).
    pub api_key_env: String,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

/// HTTP client for the reconnaissance provider. POSTs the seed URL and
/// parses the optional-field JSON response.
pub struct HttpAdvisor {
    config: HttpAdvisorConfig,
    client: Client,
}

impl HttpAdvisor {
    /// Build an advisor client against the configured endpoint.
    pub fn new(config: HttpAdvisorConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CatalogError::Recon(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl ReconAdvisor for HttpAdvisor {
    #[instrument(skip_all, fields(seed_url = %seed_url))]
    async fn analyze(&self, seed_url: &Url) -> Result<ReconReport> {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .json(&serde_json::json!({ "seed_url": seed_url.as_str() }));

        if let Ok(key) = std::env::var(&self.config.api_key_env) {
            if !key.is_empty() {
                request = request.bearer_auth(key);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| CatalogError::Recon(format!("{}: {e}", self.config.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Recon(format!(
                "{}: HTTP {status}",
                self.config.endpoint
            )));
        }

        let report: ReconReport = response
            .json()
            .await
            .map_err(|e| CatalogError::Recon(format!("invalid advisor response: {e}")))?;

        info!(
            estimated = ?report.estimated_url_count,
            depth = ?report.recommended_depth,
            patterns = report.url_patterns.len(),
            "reconnaissance report received"
        );

        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Bounded advisory call
// ---------------------------------------------------------------------------

/// Call the advisor with an outer deadline and swallow failures: an
/// unavailable, slow, or malformed advisor yields the degenerate report so
/// the caller falls back to its configured defaults.
pub async fn analyze_or_default(
    advisor: &dyn ReconAdvisor,
    seed_url: &Url,
    deadline: Duration,
) -> ReconReport {
    match tokio::time::timeout(deadline, advisor.analyze(seed_url)).await {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => {
            debug!(error = %e, "advisor call failed, using defaults");
            ReconReport::default()
        }
        Err(_) => {
            debug!(deadline_ms = deadline.as_millis() as u64, "advisor call timed out");
            ReconReport::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_advisor_returns_degenerate_report() {
        let advisor = NullAdvisor;
        let url = Url::parse("https://example.com").unwrap();
        let report = advisor.analyze(&url).await.unwrap();
        assert!(report.estimated_url_count.is_none());
        assert!(report.recommended_depth.is_none());
        assert!(report.url_patterns.is_empty());
    }

    #[tokio::test]
    async fn http_advisor_parses_partial_hints() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/analyze"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(
                r#"{"recommended_depth": 2, "url_patterns": ["/docs/**"]}"#,
            ))
            .mount(&server)
            .await;

        let advisor = HttpAdvisor::new(HttpAdvisorConfig {
            endpoint: format!("{}/analyze", server.uri()),
            api_key_env: "WC_TEST_NO_SUCH_KEY".into(),
            timeout_secs: 5,
        })
        .unwrap();

        let url = Url::parse("https://example.com").unwrap();
        let report = advisor.analyze(&url).await.unwrap();
        assert_eq!(report.recommended_depth, Some(2));
        assert!(report.estimated_url_count.is_none());
        assert_eq!(report.url_patterns, vec!["/docs/**".to_string()]);
    }

    #[tokio::test]
    async fn http_advisor_error_status_is_an_error() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let advisor = HttpAdvisor::new(HttpAdvisorConfig {
            endpoint: server.uri(),
            api_key_env: "WC_TEST_NO_SUCH_KEY".into(),
            timeout_secs: 5,
        })
        .unwrap();

        let url = Url::parse("https://example.com").unwrap();
        assert!(advisor.analyze(&url).await.is_err());
    }

    #[tokio::test]
    async fn analyze_or_default_swallows_failure() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let advisor = HttpAdvisor::new(HttpAdvisorConfig {
            endpoint: server.uri(),
            api_key_env: "WC_TEST_NO_SUCH_KEY".into(),
            timeout_secs: 5,
        })
        .unwrap();

        let url = Url::parse("https://example.com").unwrap();
        let report =
            analyze_or_default(&advisor, &url, Duration::from_secs(1)).await;
        assert!(report.recommended_depth.is_none());
    }

    #[tokio::test]
    async fn analyze_or_default_bounds_a_slow_advisor() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string("{}")
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let advisor = HttpAdvisor::new(HttpAdvisorConfig {
            endpoint: server.uri(),
            api_key_env: "WC_TEST_NO_SUCH_KEY".into(),
            timeout_secs: 30,
        })
        .unwrap();

        let url = Url::parse("https://example.com").unwrap();
        let start = std::time::Instant::now();
        let report =
            analyze_or_default(&advisor, &url, Duration::from_millis(200)).await;
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(report.estimated_url_count.is_none());
    }
}
