//! # Event Sources
//!
//! Event Sources finds the publishers of Schema.org events that are relevant to
//! one metropolitan region. It streams N-Quads dumps, rebuilds the Event
//! entities they describe, matches each Event's location against the region and
//! classifies every publishing domain as `INCLUDE`, `EXCLUDE` or `UNKNOWN`.
//!
//! The work runs in two phases separated by a hard barrier:
//!
//! - Phase 1 labels every known domain with a static signal (positive, neutral
//!   or negative) from its name alone.
//! - Phase 2 parses the source files on a pool of worker threads, skips the
//!   statements of negative domains, geo-matches every Event and folds the
//!   results into a per-domain ledger that is classified once all files are done.
//!
//! ## Example
//!
//! ```rust,no_run
//! use event_sources::config::PipelineConfig;
//! use event_sources::pipeline::{Pipeline, RunOptions};
//! use event_sources::signals::DomainRecord;
//!
//! fn example() -> event_sources::Result<()> {
//!     let mut pipeline = Pipeline::new(PipelineConfig::default())?;
//!     pipeline.classify_domains(&[DomainRecord::new("torontojazz.com", "com")]);
//!     let report = pipeline.run(&["data/part-0.gz".into()], &RunOptions::default());
//!     for record in pipeline.classifications() {
//!         println!("{} {:?} {:.2}", record.domain, record.classification, record.confidence);
//!     }
//!     println!("{} files processed", report.files_processed);
//!     Ok(())
//! }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::struct_excessive_bools)]

/// Core data structures and types
pub mod core;

/// Run configuration and reference data
pub mod config;

/// N-Quads line parsing and source file reading
pub mod parsing;

/// Event reconstruction from graph windows
pub mod extraction;

/// Static domain signals computed before any file is read
pub mod signals;

/// Location matching against the target region
pub mod geo;

/// Per-domain aggregation and the final decision table
pub mod scoring;

/// The phase-ordered driver tying the components together
pub mod pipeline;

pub mod error {
    //! Error types and result definitions

    use std::path::PathBuf;

    use thiserror::Error;

    /// Result type alias for pipeline operations
    pub type Result<T> = std::result::Result<T, Error>;

    /// Main error type for the crate
    ///
    /// Only configuration problems escape a run. Statement and file problems are
    /// recovered where they happen and show up as counters in the run report.
    #[derive(Debug, Error)]
    pub enum Error {
        /// Configuration error
        #[error("Configuration error: {0}")]
        Config(String),
        /// Configuration file could not be parsed
        #[error("Configuration parse error: {0}")]
        ConfigParse(#[from] toml::de::Error),
        /// IO error
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),
        /// A source file could not be opened, decompressed or read
        #[error("Source error in {}: {reason}", path.display())]
        Source { path: PathBuf, reason: String },
        /// A domain that the pipeline has no record of
        #[error("Unknown domain: {0}")]
        UnknownDomain(String),
        /// Ledger snapshot could not be encoded or decoded
        #[error("Snapshot error: {0}")]
        Snapshot(String),
        /// Other error
        #[error("Error: {0}")]
        Other(String),
    }
}

// Re-export commonly used types
pub use error::{Error, Result};
