use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::ExtractionConfig;
use crate::core::Event;
use crate::extraction::arena::GraphWindow;
use crate::extraction::reconstruct::Reconstructor;
use crate::parsing::{parse_quad_line, peek_graph, LineSource};
use crate::signals::{domain_of_url, DomainSignal, SignalTable};
use crate::{Error, Result};

/// Data-quality counters for one source file. Summable across files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub lines_read: u64,
    pub statements_parsed: u64,
    pub malformed_lines: u64,
    /// Lines dropped unparsed because their domain is negative
    pub skipped_negative: u64,
    pub statements_without_graph: u64,
    pub windows_flushed: u64,
    /// Windows closed early at the statement cap
    pub oversized_flushes: u64,
    pub events_emitted: u64,
    /// Events whose graph does not name an http(s) page
    pub events_unattributed: u64,
    pub unresolved_references: u64,
    /// Nodes reached a second time below the same Event
    pub cycles_broken: u64,
    pub depth_limit_hits: u64,
}

impl ExtractionStats {
    pub fn merge(&mut self, other: &ExtractionStats) {
        self.lines_read += other.lines_read;
        self.statements_parsed += other.statements_parsed;
        self.malformed_lines += other.malformed_lines;
        self.skipped_negative += other.skipped_negative;
        self.statements_without_graph += other.statements_without_graph;
        self.windows_flushed += other.windows_flushed;
        self.oversized_flushes += other.oversized_flushes;
        self.events_emitted += other.events_emitted;
        self.events_unattributed += other.events_unattributed;
        self.unresolved_references += other.unresolved_references;
        self.cycles_broken += other.cycles_broken;
        self.depth_limit_hits += other.depth_limit_hits;
    }

    /// Share of parse attempts that were rejected, in percent.
    pub fn malformed_percent(&self) -> f64 {
        let attempted = self.statements_parsed + self.malformed_lines;
        if attempted > 0 {
            (self.malformed_lines as f64 / attempted as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Cap on the number of Events emitted across every stream sharing it.
#[derive(Debug, Default)]
pub struct EventBudget {
    limit: Option<u64>,
    taken: AtomicU64,
}

impl EventBudget {
    pub fn unlimited() -> Self {
        Self { limit: None, taken: AtomicU64::new(0) }
    }

    pub fn limited(limit: u64) -> Self {
        Self { limit: Some(limit), taken: AtomicU64::new(0) }
    }

    pub fn new(limit: Option<u64>) -> Self {
        Self { limit, taken: AtomicU64::new(0) }
    }

    /// Claims one Event. Returns false once the limit has been reached.
    pub fn try_take(&self) -> bool {
        match self.limit {
            None => {
                self.taken.fetch_add(1, Ordering::Relaxed);
                true
            }
            Some(limit) => self
                .taken
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1))
                .is_ok(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.taken.load(Ordering::Acquire) >= limit)
    }

    pub fn taken(&self) -> u64 {
        self.taken.load(Ordering::Acquire)
    }
}

/// Why a stream ended before the end of its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    BudgetExhausted,
    Cancelled,
}

/// Shared, immutable extraction settings. One per run, borrowed by every stream.
pub struct Extractor {
    event_types: HashSet<String>,
    max_depth: usize,
    max_window_statements: usize,
    signals: Arc<SignalTable>,
    revisit_negative: bool,
}

impl Extractor {
    pub fn new(config: &ExtractionConfig, signals: Arc<SignalTable>, revisit_negative: bool) -> Self {
        Self {
            event_types: config.event_types.iter().cloned().collect(),
            max_depth: config.max_depth,
            max_window_statements: config.max_window_statements,
            signals,
            revisit_negative,
        }
    }

    /// Opens a file from the start. Calling it again rescans the same sequence.
    pub fn open(&self, path: &Path) -> Result<EventStream<'_>> {
        Ok(self.stream(LineSource::open(path)?))
    }

    pub fn stream(&self, source: LineSource) -> EventStream<'_> {
        EventStream {
            source,
            state: StreamState {
                extractor: self,
                window: GraphWindow::new(),
                pending: VecDeque::new(),
                stats: ExtractionStats::default(),
                domains_seen: BTreeSet::new(),
                negative_domains: BTreeSet::new(),
                last_graph: None,
                budget: None,
                cancel: None,
                stopped: None,
            },
            error: None,
            finished: false,
        }
    }
}

/// Lazy, pull-based sequence of the Events of one source file.
///
/// Events come out in graph-window order: everything a window produced is
/// queued when the window closes, then handed out one at a time.
pub struct EventStream<'a> {
    source: LineSource,
    state: StreamState<'a>,
    error: Option<Error>,
    finished: bool,
}

struct StreamState<'a> {
    extractor: &'a Extractor,
    window: GraphWindow,
    pending: VecDeque<Event>,
    stats: ExtractionStats,
    domains_seen: BTreeSet<String>,
    negative_domains: BTreeSet<String>,
    last_graph: Option<(String, bool)>,
    budget: Option<Arc<EventBudget>>,
    cancel: Option<Arc<AtomicBool>>,
    stopped: Option<StopReason>,
}

/// Everything a finished stream leaves behind.
#[derive(Debug)]
pub struct StreamOutcome {
    pub stats: ExtractionStats,
    /// Domains with at least one parsed statement
    pub domains_seen: BTreeSet<String>,
    /// Negative domains whose statements were skipped
    pub negative_domains: BTreeSet<String>,
    pub stopped: Option<StopReason>,
    /// Read or decompression failure that ended the file early
    pub error: Option<Error>,
}

impl<'a> EventStream<'a> {
    pub fn with_budget(mut self, budget: Arc<EventBudget>) -> Self {
        self.state.budget = Some(budget);
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.state.cancel = Some(cancel);
        self
    }

    pub fn stats(&self) -> &ExtractionStats {
        &self.state.stats
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn stopped(&self) -> Option<StopReason> {
        self.state.stopped
    }

    pub fn into_outcome(self) -> StreamOutcome {
        StreamOutcome {
            stats: self.state.stats,
            domains_seen: self.state.domains_seen,
            negative_domains: self.state.negative_domains,
            stopped: self.state.stopped,
            error: self.error,
        }
    }

    /// Reads lines until a window closes with events, the file ends or a stop fires.
    ///
    /// Budget and cancellation are only looked at between windows, so the
    /// window being read is always reconstructed whole.
    fn fill(&mut self) {
        if self.state.stop_requested() {
            self.finished = true;
            return;
        }
        loop {
            let flushed = self.state.stats.windows_flushed;
            match self.source.next_line() {
                Err(err) => {
                    warn!(path = %self.source.path().display(), error = %err, "source read failed");
                    self.error = Some(err);
                    self.finished = true;
                    return;
                }
                Ok(None) => {
                    self.state.close_window();
                    self.finished = true;
                    return;
                }
                Ok(Some(line)) => {
                    self.state.handle_line(line);
                    if self.state.stopped.is_some() {
                        self.finished = true;
                        return;
                    }
                    if !self.state.pending.is_empty() {
                        return;
                    }
                    if self.state.stats.windows_flushed != flushed && self.state.stop_requested() {
                        self.finished = true;
                        return;
                    }
                }
            }
        }
    }
}

impl Iterator for EventStream<'_> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.state.pending.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }
            self.fill();
        }
    }
}

impl StreamState<'_> {
    fn handle_line(&mut self, line: &str) {
        self.stats.lines_read += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return;
        }

        if let Some(graph) = peek_graph(line) {
            if self.skips_graph(graph) {
                self.stats.skipped_negative += 1;
                return;
            }
        }

        let statement = match parse_quad_line(line) {
            Ok(statement) => statement,
            Err(err) => {
                self.stats.malformed_lines += 1;
                trace!(error = %err, "skipping malformed line");
                return;
            }
        };
        self.stats.statements_parsed += 1;
        if statement.graph.is_none() {
            self.stats.statements_without_graph += 1;
        }

        if !self.window.accepts(statement.graph.as_deref()) {
            self.close_window();
        }
        self.window.push(statement);

        if self.window.len() >= self.extractor.max_window_statements {
            self.stats.oversized_flushes += 1;
            debug!(
                graph = self.window.graph().unwrap_or("-"),
                statements = self.window.len(),
                "graph window hit the statement cap, flushing early"
            );
            let graph = self.window.graph().map(str::to_string);
            self.close_window();
            // the rest of the graph continues in a fresh window
            self.window.reset(graph);
        }
    }

    /// Negative-domain check on the peeked graph, cached for consecutive lines.
    fn skips_graph(&mut self, graph: &str) -> bool {
        if let Some((last, skip)) = &self.last_graph {
            if last == graph {
                return *skip;
            }
        }
        let mut skip = false;
        if !self.extractor.revisit_negative {
            if let Some(domain) = domain_of_url(graph) {
                if self.extractor.signals.signal_of(&domain) == DomainSignal::Negative {
                    skip = true;
                    self.negative_domains.insert(domain);
                }
            }
        }
        self.last_graph = Some((graph.to_string(), skip));
        skip
    }

    /// Reconstructs the open window, queues its events and empties it.
    fn close_window(&mut self) {
        if self.window.is_empty() {
            return;
        }
        self.stats.windows_flushed += 1;
        let domain = self.window.graph().and_then(domain_of_url);

        let events = Reconstructor::new(&self.window, &self.extractor.event_types, self.extractor.max_depth)
            .events(domain.as_deref().unwrap_or_default(), &mut self.stats);

        match domain {
            None => self.stats.events_unattributed += events.len() as u64,
            Some(domain) => {
                for event in events {
                    if !self.budget.as_ref().map_or(true, |b| b.try_take()) {
                        self.stopped = Some(StopReason::BudgetExhausted);
                        break;
                    }
                    self.stats.events_emitted += 1;
                    self.pending.push_back(event);
                }
                self.domains_seen.insert(domain);
            }
        }
        self.window.reset(None);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.load(Ordering::Relaxed))
    }

    fn stop_requested(&mut self) -> bool {
        if self.stopped.is_some() {
            return true;
        }
        if self.is_cancelled() {
            self.stopped = Some(StopReason::Cancelled);
        } else if self.budget.as_ref().is_some_and(|b| b.is_exhausted()) {
            self.stopped = Some(StopReason::BudgetExhausted);
        }
        self.stopped.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{DomainRecord, SignalClassifier};
    use std::io::Cursor;

    fn extractor(records: &[DomainRecord]) -> Extractor {
        let config = crate::config::PipelineConfig::default();
        let table = SignalClassifier::new(&config.signals).classify_all(records);
        Extractor::new(&config.extraction, Arc::new(table), false)
    }

    fn source(text: &str) -> LineSource {
        LineSource::from_reader(Path::new("mem.nq"), Cursor::new(text.as_bytes().to_vec()))
    }

    const EVENT_A: &str = r#"_:e1 <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://schema.org/Event> <https://a.ca/1> .
_:e1 <http://schema.org/name> "First" <https://a.ca/1> .
"#;

    const EVENT_B: &str = r#"_:e1 <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://schema.org/Event> <https://b.de/x> .
_:e1 <http://schema.org/name> "Zweite" <https://b.de/x> .
"#;

    #[test]
    fn test_same_label_in_two_graphs_gives_two_events() {
        let input = format!("{}{}", EVENT_A, EVENT_A.replace("a.ca/1", "c.com/2"));
        let extractor = extractor(&[]);
        let events: Vec<Event> = extractor.stream(source(&input)).collect();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].domain, "a.ca");
        assert_eq!(events[1].domain, "c.com");
    }

    #[test]
    fn test_negative_graph_is_skipped_unparsed() {
        let input = format!("{}{}", EVENT_B, EVENT_A);
        let extractor = extractor(&[DomainRecord::new("b.de", "de")]);
        let mut stream = extractor.stream(source(&input));
        let events: Vec<Event> = stream.by_ref().collect();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name.as_deref(), Some("First"));
        let outcome = stream.into_outcome();
        assert_eq!(outcome.stats.skipped_negative, 2);
        assert!(outcome.negative_domains.contains("b.de"));
        assert!(!outcome.domains_seen.contains("b.de"));
    }

    #[test]
    fn test_budget_stops_between_windows() {
        let input = format!("{}{}", EVENT_A, EVENT_A.replace("a.ca/1", "a.ca/2"));
        let extractor = extractor(&[]);
        let budget = Arc::new(EventBudget::limited(1));
        let mut stream = extractor.stream(source(&input)).with_budget(budget.clone());

        assert_eq!(stream.by_ref().count(), 1);
        assert_eq!(stream.stopped(), Some(StopReason::BudgetExhausted));
        assert!(budget.is_exhausted());
    }

    #[test]
    fn test_cancel_takes_effect_at_next_window() {
        let input = format!(
            "{}{}{}",
            EVENT_A,
            EVENT_A.replace("a.ca/1", "a.ca/2"),
            EVENT_A.replace("a.ca/1", "a.ca/3")
        );
        let extractor = extractor(&[]);
        let cancel = Arc::new(AtomicBool::new(false));
        let mut stream = extractor.stream(source(&input)).with_cancel(Arc::clone(&cancel));

        assert_eq!(stream.next().map(|e| e.source_url), Some("https://a.ca/1".to_string()));
        cancel.store(true, Ordering::Relaxed);

        assert!(stream.next().is_none());
        assert_eq!(stream.stopped(), Some(StopReason::Cancelled));
        // the line that opened the second window was read, nothing after it
        assert_eq!(stream.stats().lines_read, 3);
        assert_eq!(stream.stats().events_emitted, 1);
    }

    #[test]
    fn test_graphless_events_are_unattributed() {
        let input = "_:e <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://schema.org/Event> .\n";
        let extractor = extractor(&[]);
        let mut stream = extractor.stream(source(input));

        assert_eq!(stream.by_ref().count(), 0);
        let stats = stream.stats();
        assert_eq!(stats.events_unattributed, 1);
        assert_eq!(stats.statements_without_graph, 1);
    }

    #[test]
    fn test_stats_merge_sums_counters() {
        let mut total = ExtractionStats { lines_read: 3, malformed_lines: 1, ..Default::default() };
        total.merge(&ExtractionStats { lines_read: 7, statements_parsed: 9, ..Default::default() });
        assert_eq!(total.lines_read, 10);
        assert_eq!(total.statements_parsed, 9);
        assert_eq!(total.malformed_percent(), 10.0);
    }
}
