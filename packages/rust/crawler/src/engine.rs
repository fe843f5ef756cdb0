//! Crawl engine internals: scope checks, SSRF guard, fetch workers, and the
//! resumable BFS coordinator.
//!
//! Parallel fetches run behind a semaphore; the dedup index and the frontier
//! queue are owned by the coordinating task alone, so writes to them are
//! serialized without locks.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use webcatalog_shared::{
    CatalogError, DiscoveredUrl, DiscoveryProject, DiscoveryStatus, Result, normalize_url,
};
use webcatalog_storage::Storage;

use crate::CrawlObserver;

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("webcatalog/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Options & outcome
// ---------------------------------------------------------------------------

/// Runtime knobs for the crawl engine. Depth, budget, and include patterns
/// come from the [`DiscoveryProject`], not from here.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Maximum concurrent page fetches.
    pub concurrency: u32,
    /// Minimum ms between requests.
    pub rate_limit_ms: u64,
    /// Per-fetch timeout.
    pub timeout: Duration,
    /// URL exclude glob patterns.
    pub exclude_patterns: Vec<String>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            rate_limit_ms: 0,
            timeout: Duration::from_secs(15),
            exclude_patterns: Vec::new(),
        }
    }
}

/// Summary of a completed (or cancelled) crawl run.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    /// All URLs recorded for the project: prior runs plus this run, with no
    /// duplicate normalized URL.
    pub urls: Vec<DiscoveredUrl>,
    /// How many of `urls` were newly discovered by this run.
    pub new_urls: usize,
    /// Pages fetched by this run.
    pub pages_fetched: usize,
    /// Fetch failures skipped by this run.
    pub fetch_errors: usize,
    /// Whether the run stopped because the cancellation token fired.
    pub cancelled: bool,
    /// Wall-clock duration of this run.
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// Resumable, deduplicating web crawler.
pub struct Crawler {
    options: CrawlOptions,
    client: Client,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_localhost: bool,
}

impl Crawler {
    /// Create a new crawler with the given options.
    pub fn new(options: CrawlOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(options.timeout)
            .build()
            .map_err(|e| CatalogError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            options,
            client,
            allow_localhost: false,
        })
    }

    /// Allow crawling localhost/private IPs (for integration tests).
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    /// Crawl the project's seed URL, recording discovered URLs in `storage`.
    ///
    /// Resumable: URLs already recorded for the project seed the dedup index
    /// and only URLs not previously known reach `observer.urls_discovered`.
    /// The returned outcome carries prior ∪ new. A total crawl failure (seed
    /// unreachable on a fresh project) is reported through the outcome and
    /// the observer, never as an `Err`.
    #[instrument(skip_all, fields(project_id = %project.id, seed = %project.seed_url))]
    pub async fn crawl(
        &self,
        project: &DiscoveryProject,
        storage: &Storage,
        observer: &dyn CrawlObserver,
        cancel: &CancellationToken,
    ) -> Result<CrawlOutcome> {
        let start_time = std::time::Instant::now();
        let max_urls = project.max_urls as usize;

        let seed = match Url::parse(&project.seed_url) {
            Ok(url) => url,
            Err(e) => {
                observer.status(&format!("seed URL is not parseable: {e}"));
                return Ok(CrawlOutcome {
                    urls: Vec::new(),
                    new_urls: 0,
                    pages_fetched: 0,
                    fetch_errors: 1,
                    cancelled: false,
                    duration: start_time.elapsed(),
                });
            }
        };

        let scope = CrawlScope::new(&seed, &project.url_patterns, &self.options.exclude_patterns);
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1) as usize));

        // Seed the dedup index from prior runs.
        let mut records: Vec<DiscoveredUrl> = storage.load_discovered_urls(&project.id).await?;
        let mut index: HashMap<String, usize> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.normalized_url.clone(), i))
            .collect();
        let prior_count = records.len();

        // Frontier: the seed, plus prior records that were never successfully
        // fetched (a cancelled run leaves Listed pages behind; resume
        // continues from them).
        let mut frontier: VecDeque<(Url, u32)> = VecDeque::new();
        frontier.push_back((seed.clone(), 0));
        for record in &records {
            if matches!(
                record.status,
                DiscoveryStatus::Listed | DiscoveryStatus::FetchFailed
            ) && record.depth <= project.max_depth
                && looks_like_page(&record.url)
            {
                if let Ok(url) = Url::parse(&record.url) {
                    frontier.push_back((url, record.depth));
                }
            }
        }

        if prior_count > 0 {
            info!(prior = prior_count, "resuming crawl with prior results");
            observer.status(&format!("resuming: {prior_count} URLs already recorded"));
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut new_urls = 0usize;
        let mut pages_fetched = 0usize;
        let mut fetch_errors = 0usize;
        let mut cancelled = false;
        let mut seed_failed = false;

        info!(
            max_depth = project.max_depth,
            max_urls = project.max_urls,
            concurrency = self.options.concurrency,
            "starting crawl"
        );

        'waves: while !frontier.is_empty() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if records.len() >= max_urls {
                observer.status(&format!("URL budget reached ({max_urls})"));
                break;
            }

            // Take a batch from the frontier (up to the concurrency limit),
            // skipping URLs already fetched in this run.
            let mut batch: Vec<(Url, u32)> = Vec::new();
            while batch.len() < self.options.concurrency.max(1) as usize {
                let Some((url, depth)) = frontier.pop_front() else {
                    break;
                };
                let normalized = normalize_url(&url);
                if visited.contains(&normalized) {
                    continue;
                }
                if !self.allow_localhost && is_ssrf_target(&url) {
                    warn!(%url, "SSRF protection: blocked");
                    continue;
                }
                visited.insert(normalized);
                batch.push((url, depth));
            }
            if batch.is_empty() {
                continue;
            }

            let mut handles = Vec::new();
            for (url, depth) in batch {
                let client = self.client.clone();
                let sem = semaphore.clone();
                let rate_limit = self.options.rate_limit_ms;

                handles.push(tokio::spawn(async move {
                    let _permit = sem.acquire().await.expect("semaphore closed");

                    // Rate limiting
                    if rate_limit > 0 {
                        tokio::time::sleep(Duration::from_millis(rate_limit)).await;
                    }

                    let fetched = fetch_page(&client, &url).await;
                    (url, depth, fetched)
                }));
            }

            let mut new_batch: Vec<DiscoveredUrl> = Vec::new();

            for handle in handles {
                // Cancellation poll point: one check per completed fetch.
                if cancel.is_cancelled() {
                    cancelled = true;
                }

                let (url, depth, fetched) = match handle.await {
                    Ok(tuple) => tuple,
                    Err(e) => {
                        warn!(error = %e, "fetch task failed");
                        fetch_errors += 1;
                        continue;
                    }
                };
                let normalized = normalize_url(&url);

                match fetched {
                    Ok(page) => {
                        pages_fetched += 1;

                        // Record (or upgrade) the fetched page itself.
                        match index.get(&normalized) {
                            Some(&i) => {
                                let record = &mut records[i];
                                record.status = DiscoveryStatus::Fetched;
                                record.title = page.title.clone();
                                record.content_hash = Some(page.content_hash.clone());
                                storage.upsert_discovered_url(&project.id, record).await?;
                            }
                            None => {
                                if records.len() >= max_urls {
                                    continue;
                                }
                                let mut record =
                                    DiscoveredUrl::new(&url, depth, DiscoveryStatus::Fetched);
                                record.title = page.title.clone();
                                record.content_hash = Some(page.content_hash.clone());
                                storage.upsert_discovered_url(&project.id, &record).await?;
                                index.insert(normalized.clone(), records.len());
                                records.push(record.clone());
                                new_batch.push(record);
                                new_urls += 1;
                            }
                        }

                        if cancelled || depth >= project.max_depth {
                            continue;
                        }

                        // Record in-scope links and enqueue page-like ones.
                        for link in &page.links {
                            let Ok(link_url) = Url::parse(link) else {
                                continue;
                            };
                            if !scope.in_scope(&link_url) {
                                debug!(url = %link_url, "out of scope, skipping");
                                continue;
                            }
                            let link_normalized = normalize_url(&link_url);

                            if let Some(&i) = index.get(&link_normalized) {
                                // Known URL: re-enqueue only if it still needs
                                // a fetch (left over from a cancelled run).
                                let record = &records[i];
                                if record.status == DiscoveryStatus::Listed
                                    && looks_like_page(&record.url)
                                {
                                    frontier.push_back((link_url, depth + 1));
                                }
                                continue;
                            }

                            if records.len() >= max_urls {
                                break;
                            }

                            let record = DiscoveredUrl::new(
                                &link_url,
                                depth + 1,
                                DiscoveryStatus::Listed,
                            );
                            storage.upsert_discovered_url(&project.id, &record).await?;
                            index.insert(link_normalized, records.len());
                            records.push(record.clone());
                            new_batch.push(record);
                            new_urls += 1;

                            if looks_like_page(link_url.as_str()) {
                                frontier.push_back((link_url, depth + 1));
                            }
                        }
                    }
                    Err(e) => {
                        fetch_errors += 1;
                        warn!(%url, error = %e, "page fetch failed, skipping");

                        match index.get(&normalized) {
                            Some(&i) => {
                                let record = &mut records[i];
                                record.status = DiscoveryStatus::FetchFailed;
                                storage.upsert_discovered_url(&project.id, record).await?;
                            }
                            None if records.is_empty() => {
                                // Fresh project and the seed itself is
                                // unreachable: total crawl failure.
                                seed_failed = true;
                                observer.status(&format!("seed unreachable: {e}"));
                            }
                            None => {
                                if records.len() >= max_urls {
                                    continue;
                                }
                                let record = DiscoveredUrl::new(
                                    &url,
                                    depth,
                                    DiscoveryStatus::FetchFailed,
                                );
                                storage.upsert_discovered_url(&project.id, &record).await?;
                                index.insert(normalized.clone(), records.len());
                                records.push(record.clone());
                                new_batch.push(record);
                                new_urls += 1;
                            }
                        }
                    }
                }
            }

            if !new_batch.is_empty() {
                observer.urls_discovered(&new_batch);
            }
            observer.status(&format!(
                "{} pages fetched, {} URLs recorded ({} new)",
                pages_fetched,
                records.len(),
                new_urls
            ));

            if seed_failed {
                break 'waves;
            }
        }

        if cancelled {
            observer.status("crawl stopped, partial results kept");
        }

        let outcome = CrawlOutcome {
            urls: records,
            new_urls,
            pages_fetched,
            fetch_errors,
            cancelled,
            duration: start_time.elapsed(),
        };

        info!(
            total = outcome.urls.len(),
            new = outcome.new_urls,
            pages_fetched = outcome.pages_fetched,
            fetch_errors = outcome.fetch_errors,
            cancelled = outcome.cancelled,
            duration_ms = outcome.duration.as_millis(),
            "crawl finished"
        );

        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Scope checking
// ---------------------------------------------------------------------------

/// Determines which URLs are "in scope" for a crawl.
struct CrawlScope {
    /// Base host that URLs must match.
    base_host: String,
    /// Include patterns (if non-empty, URL path must match at least one).
    include_patterns: Vec<regex::Regex>,
    /// Exclude patterns (if URL path matches any, it's excluded).
    exclude_patterns: Vec<regex::Regex>,
}

impl CrawlScope {
    fn new(seed: &Url, include: &[String], exclude: &[String]) -> Self {
        let base_host = seed.host_str().unwrap_or("").to_ascii_lowercase();

        let include_patterns = include.iter().filter_map(|p| glob_to_regex(p)).collect();
        let exclude_patterns = exclude.iter().filter_map(|p| glob_to_regex(p)).collect();

        Self {
            base_host,
            include_patterns,
            exclude_patterns,
        }
    }

    fn in_scope(&self, url: &Url) -> bool {
        // Must be http/https
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }

        // Must match base host
        if url.host_str().unwrap_or("").to_ascii_lowercase() != self.base_host {
            return false;
        }

        let path = url.path();

        // Check exclude patterns
        for pattern in &self.exclude_patterns {
            if pattern.is_match(path) {
                return false;
            }
        }

        // Check include patterns (if any configured, must match at least one)
        if !self.include_patterns.is_empty() {
            return self.include_patterns.iter().any(|p| p.is_match(path));
        }

        true
    }
}

/// Convert a glob-like pattern to a regex.
fn glob_to_regex(pattern: &str) -> Option<regex::Regex> {
    let escaped = regex::escape(pattern)
        .replace(r"\*\*", ".*")
        .replace(r"\*", "[^/]*")
        .replace(r"\?", ".");
    regex::Regex::new(&format!("^{escaped}$")).ok()
}

/// Extensions treated as fetchable pages; everything else is recorded as a
/// Listed asset but never fetched for links.
fn looks_like_page(url: &str) -> bool {
    let path = match Url::parse(url) {
        Ok(u) => u.path().to_ascii_lowercase(),
        Err(_) => return false,
    };
    match path.rsplit('/').next().and_then(|seg| seg.rsplit_once('.')) {
        None => true,
        Some((_, ext)) => matches!(ext, "html" | "htm" | "xhtml" | "php" | "asp" | "aspx"),
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    // Block non-HTTP schemes
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    // Block private/loopback IPs
    if let Some(host) = url.host_str() {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return is_private_ip(&ip);
        }
        // Block known local hostnames
        if host == "localhost"
            || host == "[::1]"
            || host.ends_with(".local")
            || host.ends_with(".internal")
        {
            return true;
        }
    }

    false
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

// ---------------------------------------------------------------------------
// Page fetching
// ---------------------------------------------------------------------------

/// A fetched page with the pieces the coordinator needs.
struct PageFetch {
    title: Option<String>,
    links: Vec<String>,
    content_hash: String,
}

/// Fetch a single page; extract links only from HTML responses.
async fn fetch_page(client: &Client, url: &Url) -> Result<PageFetch> {
    debug!(%url, "fetching page");

    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| CatalogError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(CatalogError::Network(format!("{url}: HTTP {status}")));
    }

    let is_html = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml"))
        .unwrap_or(true);

    let body = response
        .text()
        .await
        .map_err(|e| CatalogError::Network(format!("{url}: body read failed: {e}")))?;

    let content_hash = compute_hash(&body);

    if !is_html {
        return Ok(PageFetch {
            title: None,
            links: Vec::new(),
            content_hash,
        });
    }

    let doc = Html::parse_document(&body);
    let links = extract_links(&doc, url);
    let title = extract_title(&doc);

    Ok(PageFetch {
        title,
        links,
        content_hash,
    })
}

/// Extract all links from a document, resolved against the base URL.
fn extract_links(doc: &Html, base_url: &Url) -> Vec<String> {
    let link_sel = Selector::parse("a[href]").unwrap();
    let mut links = Vec::new();

    for el in doc.select(&link_sel) {
        if let Some(href) = el.value().attr("href") {
            // Skip anchors, javascript:, mailto:
            if href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
            {
                continue;
            }

            // Resolve relative URLs
            if let Ok(resolved) = base_url.join(href) {
                let mut resolved = resolved;
                resolved.set_fragment(None);
                links.push(resolved.to_string());
            }
        }
    }

    links
}

/// Extract the page title: `<title>` first, `<h1>` as a fallback.
fn extract_title(doc: &Html) -> Option<String> {
    let title_sel = Selector::parse("title").unwrap();
    let h1_sel = Selector::parse("h1").unwrap();

    doc.select(&title_sel)
        .next()
        .or_else(|| doc.select(&h1_sel).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod crawler_tests {
    use super::*;
    use crate::SilentObserver;
    use chrono::Utc;
    use std::sync::Mutex;
    use uuid::Uuid;
    use webcatalog_shared::JobId;

    /// Observer that captures batches and status lines for assertions.
    #[derive(Default)]
    struct CapturingObserver {
        batches: Mutex<Vec<Vec<DiscoveredUrl>>>,
        statuses: Mutex<Vec<String>>,
    }

    impl CrawlObserver for CapturingObserver {
        fn status(&self, message: &str) {
            self.statuses.lock().unwrap().push(message.to_string());
        }
        fn urls_discovered(&self, batch: &[DiscoveredUrl]) {
            self.batches.lock().unwrap().push(batch.to_vec());
        }
    }

    impl CapturingObserver {
        fn emitted(&self) -> Vec<DiscoveredUrl> {
            self.batches.lock().unwrap().iter().flatten().cloned().collect()
        }
    }

    fn test_project(seed: &str, max_depth: u32, max_urls: u64) -> DiscoveryProject {
        DiscoveryProject {
            id: Uuid::now_v7().to_string(),
            job_id: JobId::new(),
            seed_url: seed.into(),
            max_depth,
            max_urls,
            url_patterns: Vec::new(),
            created_at: Utc::now(),
        }
    }

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("wc_crawl_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[test]
    fn test_glob_patterns() {
        let re = glob_to_regex("/docs/**").unwrap();
        assert!(re.is_match("/docs/guide/intro"));
        assert!(!re.is_match("/blog/post"));

        let re = glob_to_regex("/a/*").unwrap();
        assert!(re.is_match("/a/b"));
        assert!(!re.is_match("/a/b/c"));
    }

    #[test]
    fn test_scope_same_host_and_excludes() {
        let seed = Url::parse("https://docs.example.com/guide/").unwrap();
        let scope = CrawlScope::new(&seed, &[], &["/login/**".into()]);

        assert!(scope.in_scope(&Url::parse("https://docs.example.com/guide/intro").unwrap()));
        assert!(scope.in_scope(&Url::parse("https://docs.example.com/other").unwrap()));
        assert!(!scope.in_scope(&Url::parse("https://other.example.com/guide").unwrap()));
        assert!(!scope.in_scope(&Url::parse("https://docs.example.com/login/form").unwrap()));
        assert!(!scope.in_scope(&Url::parse("ftp://docs.example.com/file").unwrap()));
    }

    #[test]
    fn test_scope_include_patterns() {
        let seed = Url::parse("https://example.com/").unwrap();
        let scope = CrawlScope::new(&seed, &["/docs/**".into()], &[]);

        assert!(scope.in_scope(&Url::parse("https://example.com/docs/a").unwrap()));
        assert!(!scope.in_scope(&Url::parse("https://example.com/blog/a").unwrap()));
    }

    #[test]
    fn test_looks_like_page() {
        assert!(looks_like_page("https://example.com/docs/guide"));
        assert!(looks_like_page("https://example.com/page.html"));
        assert!(!looks_like_page("https://example.com/photo.jpg"));
        assert!(!looks_like_page("https://example.com/data/export.csv"));
    }

    #[test]
    fn test_ssrf_protection() {
        assert!(is_ssrf_target(&Url::parse("file:///etc/passwd").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://192.168.1.1/admin").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://127.0.0.1:8080/").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://localhost:3000/api").unwrap()));
        assert!(!is_ssrf_target(&Url::parse("https://docs.example.com/page").unwrap()));
    }

    #[test]
    fn test_extract_links_and_title() {
        let html = r##"<html><head><title>Page One</title></head><body>
            <a href="/page2">Page 2</a>
            <a href="#section">Anchor</a>
            <a href="mailto:x@example.com">Mail</a>
            <a href="relative/path">Relative</a>
        </body></html>"##;

        let doc = Html::parse_document(html);
        let base = Url::parse("https://docs.example.com/page1").unwrap();
        let links = extract_links(&doc, &base);

        assert!(links.contains(&"https://docs.example.com/page2".to_string()));
        assert!(links.contains(&"https://docs.example.com/relative/path".to_string()));
        assert!(!links.iter().any(|l| l.contains('#')));
        assert!(!links.iter().any(|l| l.starts_with("mailto:")));

        assert_eq!(extract_title(&doc).as_deref(), Some("Page One"));
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

    #[tokio::test]
    async fn crawl_discovers_pages_and_assets() {
        let server = wiremock::MockServer::start().await;

        mount_page(
            &server,
            "/",
            r#"<html><head><title>Root</title></head><body>
                <a href="/page2">Page 2</a>
                <a href="/photo.jpg">Photo</a>
            </body></html>"#,
        )
        .await;
        mount_page(
            &server,
            "/page2",
            r#"<html><head><title>Two</title></head><body>
                <a href="/page3">Page 3</a>
            </body></html>"#,
        )
        .await;
        mount_page(&server, "/page3", "<html><head><title>Three</title></head></html>").await;

        let storage = test_storage().await;
        let project = test_project(&server.uri(), 3, 50);
        let observer = CapturingObserver::default();
        let cancel = CancellationToken::new();

        let crawler = Crawler::new(CrawlOptions::default()).unwrap().allow_localhost();
        let outcome = crawler
            .crawl(&project, &storage, &observer, &cancel)
            .await
            .unwrap();

        assert!(!outcome.cancelled);
        assert_eq!(outcome.pages_fetched, 3);
        // root, page2, page3, photo.jpg
        assert_eq!(outcome.urls.len(), 4);
        assert_eq!(outcome.new_urls, 4);

        let photo = outcome
            .urls
            .iter()
            .find(|u| u.url.ends_with("/photo.jpg"))
            .expect("photo recorded");
        assert_eq!(photo.status, DiscoveryStatus::Listed);

        let root = outcome
            .urls
            .iter()
            .find(|u| u.depth == 0)
            .expect("seed recorded");
        assert_eq!(root.status, DiscoveryStatus::Fetched);
        assert_eq!(root.title.as_deref(), Some("Root"));

        // Observer saw every new URL exactly once.
        let emitted = observer.emitted();
        assert_eq!(emitted.len(), 4);

        // Everything was persisted for resume.
        let stored = storage.load_discovered_urls(&project.id).await.unwrap();
        assert_eq!(stored.len(), 4);
    }

    #[tokio::test]
    async fn crawl_respects_depth() {
        let server = wiremock::MockServer::start().await;

        mount_page(&server, "/", r#"<html><body><a href="/page2">2</a></body></html>"#).await;
        mount_page(&server, "/page2", r#"<html><body><a href="/page3">3</a></body></html>"#).await;
        mount_page(&server, "/page3", "<html><body>deep</body></html>").await;

        let storage = test_storage().await;
        let project = test_project(&server.uri(), 1, 50);
        let cancel = CancellationToken::new();

        let crawler = Crawler::new(CrawlOptions::default()).unwrap().allow_localhost();
        let outcome = crawler
            .crawl(&project, &storage, &SilentObserver, &cancel)
            .await
            .unwrap();

        // Seed (depth 0) and page2 (depth 1) fetched; page2's links are
        // beyond max_depth so page3 is never recorded.
        assert_eq!(outcome.pages_fetched, 2);
        assert!(!outcome.urls.iter().any(|u| u.url.ends_with("/page3")));
    }

    #[tokio::test]
    async fn crawl_respects_url_budget() {
        let server = wiremock::MockServer::start().await;

        let many_links: String = (0..20)
            .map(|i| format!(r#"<a href="/page{i}">p{i}</a>"#))
            .collect();
        mount_page(&server, "/", &format!("<html><body>{many_links}</body></html>")).await;

        let storage = test_storage().await;
        let project = test_project(&server.uri(), 2, 5);
        let cancel = CancellationToken::new();

        let crawler = Crawler::new(CrawlOptions::default()).unwrap().allow_localhost();
        let outcome = crawler
            .crawl(&project, &storage, &SilentObserver, &cancel)
            .await
            .unwrap();

        assert!(outcome.urls.len() <= 5);
    }

    #[tokio::test]
    async fn crawl_resume_emits_only_new_urls() {
        let server = wiremock::MockServer::start().await;

        mount_page(&server, "/", r#"<html><body><a href="/page2">2</a></body></html>"#).await;
        mount_page(&server, "/page2", "<html><body>two</body></html>").await;

        let storage = test_storage().await;
        let project = test_project(&server.uri(), 2, 50);
        let cancel = CancellationToken::new();
        let crawler = Crawler::new(CrawlOptions::default()).unwrap().allow_localhost();

        let first = crawler
            .crawl(&project, &storage, &SilentObserver, &cancel)
            .await
            .unwrap();
        assert_eq!(first.new_urls, 2);

        // Second run over the same project: same site, nothing new.
        let observer = CapturingObserver::default();
        let second = crawler
            .crawl(&project, &storage, &observer, &cancel)
            .await
            .unwrap();

        assert_eq!(second.urls.len(), 2);
        assert_eq!(second.new_urls, 0);
        assert!(observer.emitted().is_empty());

        // No duplicate normalized URLs in the union.
        let mut keys: Vec<&str> =
            second.urls.iter().map(|u| u.normalized_url.as_str()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), second.urls.len());
    }

    #[tokio::test]
    async fn crawl_continues_past_fetch_failures() {
        let server = wiremock::MockServer::start().await;

        mount_page(
            &server,
            "/",
            r#"<html><body><a href="/broken">broken</a><a href="/ok">ok</a></body></html>"#,
        )
        .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/broken"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;
        mount_page(&server, "/ok", "<html><body>fine</body></html>").await;

        let storage = test_storage().await;
        let project = test_project(&server.uri(), 2, 50);
        let cancel = CancellationToken::new();

        let crawler = Crawler::new(CrawlOptions::default()).unwrap().allow_localhost();
        let outcome = crawler
            .crawl(&project, &storage, &SilentObserver, &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.fetch_errors, 1);
        let broken = outcome
            .urls
            .iter()
            .find(|u| u.url.ends_with("/broken"))
            .expect("broken link recorded");
        assert_eq!(broken.status, DiscoveryStatus::FetchFailed);
        assert!(outcome.urls.iter().any(|u| u.url.ends_with("/ok")));
    }

    #[tokio::test]
    async fn crawl_seed_unreachable_is_not_an_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let project = test_project(&server.uri(), 2, 50);
        let observer = CapturingObserver::default();
        let cancel = CancellationToken::new();

        let crawler = Crawler::new(CrawlOptions::default()).unwrap().allow_localhost();
        let outcome = crawler
            .crawl(&project, &storage, &observer, &cancel)
            .await
            .unwrap();

        assert!(outcome.urls.is_empty());
        assert_eq!(outcome.fetch_errors, 1);
        assert!(
            observer
                .statuses
                .lock()
                .unwrap()
                .iter()
                .any(|s| s.contains("seed unreachable"))
        );
    }

    #[tokio::test]
    async fn crawl_observes_cancellation() {
        let server = wiremock::MockServer::start().await;
        mount_page(&server, "/", r#"<html><body><a href="/p">p</a></body></html>"#).await;

        let storage = test_storage().await;
        let project = test_project(&server.uri(), 2, 50);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let crawler = Crawler::new(CrawlOptions::default()).unwrap().allow_localhost();
        let outcome = crawler
            .crawl(&project, &storage, &SilentObserver, &cancel)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.pages_fetched, 0);
    }
}
