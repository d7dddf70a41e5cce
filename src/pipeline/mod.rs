//! Phase-ordered driver.
//!
//! 1. [`Pipeline::classify_domains`] labels every known domain from its name.
//! 2. [`Pipeline::run`] streams the source files on a pool of worker threads and
//!    folds per-file partial tallies into the shared ledger.
//! 3. Once every worker has joined, each ledger entry is classified exactly once
//!    and the results are available through [`Pipeline::classifications`].

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::core::Event;
use crate::extraction::{EventBudget, Extractor, StopReason};
use crate::geo::GeoMatcher;
use crate::scoring::{
    Classification, ClassificationRecord, DecisionRule, DomainLedger, DomainScorer, DomainTally,
    PartialTallies,
};
use crate::signals::{DomainRecord, DomainSignal, SignalClassifier, SignalTable};
use crate::{Error, Result};

pub mod report;

pub use report::{FileFailure, RunReport};

use report::WorkerReport;

/// Options for a single pass over the corpus.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop once this many Events have been emitted across all workers
    pub max_events: Option<u64>,
    /// Only process files whose name is listed; empty means all
    pub only_files: Vec<String>,
    /// Cooperative cancellation, checked between files and between windows
    pub cancel: Option<Arc<AtomicBool>>,
}

impl RunOptions {
    fn selects(&self, path: &Path) -> bool {
        if self.only_files.is_empty() {
            return true;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        self.only_files.iter().any(|wanted| wanted == name || path.ends_with(wanted))
    }
}

/// Shared, read-only state handed to every worker thread.
struct WorkerContext {
    extractor: Extractor,
    geo: GeoMatcher,
    ledger: Arc<DomainLedger>,
    budget: Arc<EventBudget>,
    cancel: Arc<AtomicBool>,
    sample_cap: usize,
}

pub struct Pipeline {
    config: PipelineConfig,
    classifier: SignalClassifier,
    geo: GeoMatcher,
    scorer: DomainScorer,
    signals: Arc<SignalTable>,
    ledger: Arc<DomainLedger>,
    records: BTreeMap<String, ClassificationRecord>,
    /// Tallies as of the last completion barrier
    tallies: BTreeMap<String, DomainTally>,
}

impl Pipeline {
    /// Validates the configuration and builds the matchers. Configuration
    /// errors are the only errors that escape the pipeline.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let geo = GeoMatcher::new(&config.geo)?;
        Ok(Self {
            classifier: SignalClassifier::new(&config.signals),
            scorer: DomainScorer::new(&config.scoring),
            ledger: Arc::new(DomainLedger::new(config.scoring.samples_per_domain)),
            geo,
            signals: Arc::new(SignalTable::default()),
            records: BTreeMap::new(),
            tallies: BTreeMap::new(),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Phase 1. Must run before [`Pipeline::run`], or every domain is neutral.
    pub fn classify_domains(&mut self, records: &[DomainRecord]) -> &SignalTable {
        info!(domains = records.len(), "classifying domain signals");
        let table = self.classifier.classify_all(records);
        let counts = table.counts();
        info!(
            positive = counts.get(&DomainSignal::Positive).copied().unwrap_or(0),
            neutral = counts.get(&DomainSignal::Neutral).copied().unwrap_or(0),
            negative = counts.get(&DomainSignal::Negative).copied().unwrap_or(0),
            "domain signals ready"
        );
        self.signals = Arc::new(table);
        &self.signals
    }

    pub fn signal_table(&self) -> &SignalTable {
        &self.signals
    }

    pub fn ledger(&self) -> &DomainLedger {
        &self.ledger
    }

    /// Phase 2 and the completion barrier.
    ///
    /// Files are pulled from a shared queue by `workers` threads. A file that
    /// cannot be opened, decompressed or read contributes nothing and is listed
    /// in the report; the run always completes.
    pub fn run(&mut self, files: &[PathBuf], options: &RunOptions) -> RunReport {
        let started = Instant::now();
        let queue: VecDeque<PathBuf> = files.iter().filter(|p| options.selects(p)).cloned().collect();
        let worker_count = self.config.workers.min(queue.len()).max(1);
        info!(files = queue.len(), workers = worker_count, "starting extraction");

        let context = Arc::new(WorkerContext {
            extractor: Extractor::new(
                &self.config.extraction,
                Arc::clone(&self.signals),
                self.config.revisit_negative_domains,
            ),
            geo: self.geo.clone(),
            ledger: Arc::clone(&self.ledger),
            budget: Arc::new(EventBudget::new(options.max_events)),
            cancel: options.cancel.clone().unwrap_or_default(),
            sample_cap: self.config.scoring.samples_per_domain,
        });
        let queue = Arc::new(Mutex::new(queue));

        let handles: Vec<_> = (0..worker_count)
            .map(|worker| {
                let context = Arc::clone(&context);
                let queue = Arc::clone(&queue);
                thread::spawn(move || work(worker, &context, &queue))
            })
            .collect();

        let mut report = RunReport::default();
        for handle in handles {
            match handle.join() {
                Ok(worker) => report.absorb(worker),
                Err(_) => warn!("extraction worker panicked; its current file is lost"),
            }
        }

        self.finalize();
        report.count_classifications(self.records.values());
        report.malformed_percent = report.stats.malformed_percent();
        report.elapsed_seconds = started.elapsed().as_secs_f64();

        match report.stopped {
            Some(StopReason::BudgetExhausted) => info!(limit = ?options.max_events, "event budget exhausted"),
            Some(StopReason::Cancelled) => warn!("run cancelled before all files were read"),
            None => {}
        }
        info!(
            files = report.files_processed,
            failed = report.files_failed.len(),
            events = report.stats.events_emitted,
            include = report.domains_with(Classification::Include),
            exclude = report.domains_with(Classification::Exclude),
            unknown = report.domains_with(Classification::Unknown),
            "run finished"
        );
        report
    }

    /// Classifies every domain in the ledger. Runs once per completed pass.
    fn finalize(&mut self) {
        self.tallies = self.ledger.snapshot().tallies;
        self.records = self
            .tallies
            .iter()
            .map(|(domain, tally)| {
                let signal = self.signals.signal_of(domain);
                let effective = if self.config.revisit_negative_domains && signal == DomainSignal::Negative {
                    DomainSignal::Neutral
                } else {
                    signal
                };
                let mut record = self.scorer.classify(domain, effective, tally);
                record.signal = signal;
                (domain.clone(), record)
            })
            .collect();
    }

    /// Records ranked by confidence, highest first, ties broken by domain.
    pub fn classifications(&self) -> Vec<&ClassificationRecord> {
        let mut ranked: Vec<&ClassificationRecord> = self.records.values().collect();
        ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence).then_with(|| a.domain.cmp(&b.domain)));
        ranked
    }

    pub fn classification(&self, domain: &str) -> Option<&ClassificationRecord> {
        self.records.get(domain)
    }

    /// UNKNOWN domains, in ranked order, for the external review step.
    pub fn review_queue(&self) -> Vec<&ClassificationRecord> {
        self.classifications().into_iter().filter(|r| r.classification == Classification::Unknown).collect()
    }

    /// Retained sample Events of every INCLUDE domain, in ranked order.
    pub fn event_samples(&self) -> Vec<&Event> {
        self.classifications()
            .into_iter()
            .filter(|r| r.classification == Classification::Include)
            .filter_map(|r| self.tallies.get(&r.domain))
            .flat_map(|tally| tally.samples.iter())
            .collect()
    }

    /// Write entry point for an external reviewer.
    pub fn override_classification(&mut self, domain: &str, classification: Classification) -> Result<()> {
        let record = self.records.get_mut(domain).ok_or_else(|| Error::UnknownDomain(domain.to_string()))?;
        info!(domain, from = record.classification.as_str(), to = classification.as_str(), "manual override");
        record.classification = classification;
        record.decided_by = DecisionRule::ManualOverride;
        record.reviewed = true;
        Ok(())
    }
}

fn work(worker: usize, context: &WorkerContext, queue: &Mutex<VecDeque<PathBuf>>) -> WorkerReport {
    let mut report = WorkerReport::default();
    loop {
        if context.budget.is_exhausted() {
            report.stopped.get_or_insert(StopReason::BudgetExhausted);
            break;
        }
        if context.cancel.load(std::sync::atomic::Ordering::Relaxed) {
            report.stopped.get_or_insert(StopReason::Cancelled);
            break;
        }
        let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        let Some(path) = next else { break };
        process_file(worker, context, &path, &mut report);
    }
    report
}

fn process_file(worker: usize, context: &WorkerContext, path: &Path, report: &mut WorkerReport) {
    debug!(worker, path = %path.display(), "processing file");
    let stream = match context.extractor.open(path) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "skipping unreadable file");
            report.failures.push(FileFailure { path: path.to_path_buf(), reason: err.to_string() });
            return;
        }
    };
    let mut stream = stream.with_budget(Arc::clone(&context.budget)).with_cancel(Arc::clone(&context.cancel));

    let mut partial = PartialTallies::new();
    for event in stream.by_ref() {
        let result = event.location.as_ref().map(|l| context.geo.match_location(l)).unwrap_or_default();
        partial.entry(event.domain.clone()).or_default().fold(event, &result, context.sample_cap);
    }

    let outcome = stream.into_outcome();
    report.stats.merge(&outcome.stats);
    if let Some(err) = outcome.error {
        warn!(path = %path.display(), error = %err, "discarding partially read file");
        report.failures.push(FileFailure { path: path.to_path_buf(), reason: err.to_string() });
        return;
    }

    context.ledger.merge_partial(&partial);
    for domain in outcome.domains_seen.iter().chain(&outcome.negative_domains) {
        context.ledger.touch(domain);
    }
    report.files_processed += 1;
    if report.stopped.is_none() {
        report.stopped = outcome.stopped;
    }
    info!(
        path = %path.display(),
        lines = outcome.stats.lines_read,
        events = outcome.stats.events_emitted,
        malformed = outcome.stats.malformed_lines,
        skipped_negative = outcome.stats.skipped_negative,
        domains = outcome.domains_seen.len(),
        "finished file"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_options_select_by_name() {
        let options = RunOptions { only_files: vec!["part-1.gz".into()], ..Default::default() };
        assert!(options.selects(Path::new("/data/part-1.gz")));
        assert!(!options.selects(Path::new("/data/part-11.gz")));
        assert!(RunOptions::default().selects(Path::new("anything.nq")));
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let mut config = PipelineConfig::default();
        config.workers = 0;
        assert!(matches!(Pipeline::new(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_override_unknown_domain_fails() {
        let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let err = pipeline.override_classification("nowhere.ca", Classification::Include).unwrap_err();
        assert!(matches!(err, Error::UnknownDomain(_)));
    }

    #[test]
    fn test_empty_run_completes() {
        let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let report = pipeline.run(&[], &RunOptions::default());
        assert_eq!(report.files_processed, 0);
        assert!(pipeline.classifications().is_empty());
    }
}
