//! Shared types, error model, and configuration for webcatalog.
//!
//! This crate is the foundation depended on by all other webcatalog crates.
//! It provides:
//! - [`CatalogError`] — the unified error type
//! - Domain types ([`ProcessingJob`], [`DiscoveredUrl`], [`ValidationResult`],
//!   [`CatalogProcessingResult`], [`JobId`])
//! - Configuration ([`AppConfig`], [`JobConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlPoliciesConfig, DefaultsConfig, ReconConfig, config_dir, config_file_path,
    expand_home, init_config, load_config, load_config_from,
};
pub use error::{CatalogError, Result};
pub use types::{
    AssetType, CatalogProcessingResult, DiscoveredUrl, DiscoveryProject, DiscoveryStatus, JobConfig,
    JobId, JobStatistics, Phase, PhaseState, PhaseStatus, ProcessedStatus, ProcessedUrl,
    ProcessingJob, ReconReport, StatusClass, ValidationResult, display_name_for, normalize_url,
};
