use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::extraction::{ExtractionStats, StopReason};
use crate::scoring::{Classification, ClassificationRecord};

/// A source file that contributed nothing to the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Summary of one `Pipeline::run`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub files_processed: u64,
    pub files_failed: Vec<FileFailure>,
    pub stats: ExtractionStats,
    pub malformed_percent: f64,
    /// Domains per final classification
    pub domains_by_classification: BTreeMap<Classification, u64>,
    /// Events per final classification of their domain
    pub events_by_classification: BTreeMap<Classification, u64>,
    /// Set when the event budget or a cancellation ended the run early
    pub stopped: Option<StopReason>,
    pub elapsed_seconds: f64,
}

impl RunReport {
    pub(crate) fn absorb(&mut self, worker: WorkerReport) {
        self.files_processed += worker.files_processed;
        self.files_failed.extend(worker.failures);
        self.stats.merge(&worker.stats);
        if self.stopped.is_none() {
            self.stopped = worker.stopped;
        }
    }

    pub(crate) fn count_classifications<'a>(&mut self, records: impl Iterator<Item = &'a ClassificationRecord>) {
        self.domains_by_classification.clear();
        self.events_by_classification.clear();
        for record in records {
            *self.domains_by_classification.entry(record.classification).or_insert(0) += 1;
            *self.events_by_classification.entry(record.classification).or_insert(0) += record.total_events;
        }
    }

    pub fn domains_with(&self, classification: Classification) -> u64 {
        self.domains_by_classification.get(&classification).copied().unwrap_or(0)
    }
}

/// What one worker thread did before the queue ran dry.
#[derive(Debug, Default)]
pub(crate) struct WorkerReport {
    pub files_processed: u64,
    pub failures: Vec<FileFailure>,
    pub stats: ExtractionStats,
    pub stopped: Option<StopReason>,
}
