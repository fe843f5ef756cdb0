//! libSQL persistence gateway (embedded, offline).
//!
//! The [`Storage`] struct wraps a libSQL database behind a small
//! save/load/list surface: every persisted object is one JSON record under
//! a `(category, id)` key, overwritten atomically on save. No transactional
//! guarantees beyond single-record atomicity — callers that need
//! read-modify-write exclusivity (the orchestrator on jobs) enforce it via
//! the job registry, not the database.

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use webcatalog_shared::{
    CatalogError, CatalogProcessingResult, DiscoveredUrl, DiscoveryProject, ProcessingJob, Result,
};

/// Category for [`ProcessingJob`] records.
pub const CATEGORY_JOBS: &str = "jobs";
/// Category for [`CatalogProcessingResult`] records.
pub const CATEGORY_RESULTS: &str = "results";
/// Category for [`DiscoveryProject`] records.
pub const CATEGORY_PROJECTS: &str = "projects";

/// Per-project category for discovered URL records.
pub fn urls_category(project_id: &str) -> String {
    format!("urls:{project_id}")
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CatalogError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| CatalogError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    CatalogError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Generic record surface
    // -----------------------------------------------------------------------

    /// Save (insert or overwrite) a record under `(category, id)`.
    pub async fn save_record<T: Serialize>(
        &self,
        category: &str,
        id: &str,
        value: &T,
    ) -> Result<()> {
        let body =
            serde_json::to_string(value).map_err(|e| CatalogError::Storage(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO records (category, id, body, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(category, id) DO UPDATE SET
                   body = excluded.body,
                   updated_at = excluded.updated_at",
                params![category, id, body.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| CatalogError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Load a record by `(category, id)`, or `None` if absent.
    pub async fn load_record<T: DeserializeOwned>(
        &self,
        category: &str,
        id: &str,
    ) -> Result<Option<T>> {
        let mut rows = self
            .conn
            .query(
                "SELECT body FROM records WHERE category = ?1 AND id = ?2",
                params![category, id],
            )
            .await
            .map_err(|e| CatalogError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let body: String = row
                    .get(0)
                    .map_err(|e| CatalogError::Storage(e.to_string()))?;
                let value = serde_json::from_str(&body)
                    .map_err(|e| CatalogError::Storage(format!("corrupt record: {e}")))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(CatalogError::Storage(e.to_string())),
        }
    }

    /// List all record ids in a category, in insertion-then-update order.
    pub async fn list_ids(&self, category: &str) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM records WHERE category = ?1 ORDER BY updated_at, id",
                params![category],
            )
            .await
            .map_err(|e| CatalogError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(
                row.get::<String>(0)
                    .map_err(|e| CatalogError::Storage(e.to_string()))?,
            );
        }
        Ok(results)
    }

    /// Load every record in a category.
    pub async fn list_records<T: DeserializeOwned>(&self, category: &str) -> Result<Vec<T>> {
        let mut rows = self
            .conn
            .query(
                "SELECT body FROM records WHERE category = ?1 ORDER BY updated_at, id",
                params![category],
            )
            .await
            .map_err(|e| CatalogError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let body: String = row
                .get(0)
                .map_err(|e| CatalogError::Storage(e.to_string()))?;
            results.push(
                serde_json::from_str(&body)
                    .map_err(|e| CatalogError::Storage(format!("corrupt record: {e}")))?,
            );
        }
        Ok(results)
    }

    /// Delete a record. Missing records are not an error.
    pub async fn delete_record(&self, category: &str, id: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM records WHERE category = ?1 AND id = ?2",
                params![category, id],
            )
            .await
            .map_err(|e| CatalogError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Job operations
    // -----------------------------------------------------------------------

    /// Persist a job (insert or overwrite by id).
    pub async fn save_job(&self, job: &ProcessingJob) -> Result<()> {
        self.save_record(CATEGORY_JOBS, &job.id.to_string(), job).await
    }

    /// Load a job by id.
    pub async fn load_job(&self, job_id: &str) -> Result<Option<ProcessingJob>> {
        self.load_record(CATEGORY_JOBS, job_id).await
    }

    /// List all jobs.
    pub async fn list_jobs(&self) -> Result<Vec<ProcessingJob>> {
        self.list_records(CATEGORY_JOBS).await
    }

    // -----------------------------------------------------------------------
    // Phase result operations
    // -----------------------------------------------------------------------

    /// Persist a phase result.
    pub async fn save_result(&self, result: &CatalogProcessingResult) -> Result<()> {
        self.save_record(CATEGORY_RESULTS, &result.id, result).await
    }

    /// Load a phase result by id.
    pub async fn load_result(&self, result_id: &str) -> Result<Option<CatalogProcessingResult>> {
        self.load_record(CATEGORY_RESULTS, result_id).await
    }

    // -----------------------------------------------------------------------
    // Discovery project operations
    // -----------------------------------------------------------------------

    /// Persist a discovery project.
    pub async fn save_project(&self, project: &DiscoveryProject) -> Result<()> {
        self.save_record(CATEGORY_PROJECTS, &project.id, project).await
    }

    /// Load a discovery project by id.
    pub async fn load_project(&self, project_id: &str) -> Result<Option<DiscoveryProject>> {
        self.load_record(CATEGORY_PROJECTS, project_id).await
    }

    // -----------------------------------------------------------------------
    // Discovered URL operations
    // -----------------------------------------------------------------------

    /// Upsert a discovered URL for a project, keyed by its normalized URL so
    /// the same URL seen twice (including across resumed runs) stays one
    /// record.
    pub async fn upsert_discovered_url(
        &self,
        project_id: &str,
        url: &DiscoveredUrl,
    ) -> Result<()> {
        self.save_record(&urls_category(project_id), &url.normalized_url, url)
            .await
    }

    /// Load all discovered URLs recorded for a project.
    pub async fn load_discovered_urls(&self, project_id: &str) -> Result<Vec<DiscoveredUrl>> {
        self.list_records(&urls_category(project_id)).await
    }
}
