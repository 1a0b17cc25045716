//! Garmin Flux - Normalization and cross-domain analysis of Garmin Connect exports
//!
//! Flux turns one export archive into date-indexed tables through a
//! deterministic pipeline: archive extraction → per-domain loading with
//! timestamp normalization → cross-domain merge → correlation → insights.
//!
//! ## Modules
//!
//! - **Loaders**: Activities, Sleep, Health-Status, Hydration, Body-Battery and Stress tables
//! - **Merge / Correlation**: One wide table per calendar date and its Pearson matrix
//! - **Pipeline**: [`ExportAnalyzer`], one session over one archive

pub mod archive;
pub mod config;
pub mod correlation;
pub mod error;
pub mod insights;
pub mod loaders;
pub mod merge;
pub mod normalizer;
pub mod pipeline;
pub mod summary;
pub mod types;

pub use config::{AnalyzerConfig, DuplicatePolicy};
pub use error::AnalysisError;
pub use merge::{DomainTables, MergedTable};
pub use pipeline::{analyze_export, AnalysisReport, ExportAnalyzer};
pub use types::{Domain, Notice, NoticeKind};

/// Flux version embedded in every report
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "garmin-flux";
