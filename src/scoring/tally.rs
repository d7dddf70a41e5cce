use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::Event;
use crate::geo::{MatchResult, MatchTier, Strategy};

/// Running evidence for one domain.
///
/// Only counters, sums and a bounded, totally ordered sample list: merging two
/// tallies gives the same result in either order, which keeps the final
/// classification independent of how files were spread over workers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainTally {
    pub total_events: u64,
    pub events_with_location: u64,
    pub events_with_start_date: u64,
    /// Events whose strongest tier was a postal code
    pub postal_matches: u64,
    pub bounding_box_matches: u64,
    pub locality_matches: u64,
    pub region_matches: u64,
    pub anti_pattern_hits: u64,
    /// How often each strategy fired, at any tier
    pub strategy_hits: BTreeMap<Strategy, u64>,
    /// Best events seen so far, best first
    pub samples: Vec<Event>,
}

impl DomainTally {
    pub fn fold(&mut self, event: Event, result: &MatchResult, sample_cap: usize) {
        self.total_events += 1;
        if event.location.is_some() {
            self.events_with_location += 1;
        }
        if event.start_date.is_some() {
            self.events_with_start_date += 1;
        }
        match result.tier {
            MatchTier::PostalCode => self.postal_matches += 1,
            MatchTier::BoundingBox => self.bounding_box_matches += 1,
            MatchTier::Locality => self.locality_matches += 1,
            MatchTier::Region => self.region_matches += 1,
            MatchTier::None => {}
        }
        if result.anti_pattern {
            self.anti_pattern_hits += 1;
        }
        for strategy in &result.strategies {
            *self.strategy_hits.entry(*strategy).or_insert(0) += 1;
        }
        self.offer_sample(event, sample_cap);
    }

    pub fn merge(&mut self, other: &DomainTally, sample_cap: usize) {
        self.total_events += other.total_events;
        self.events_with_location += other.events_with_location;
        self.events_with_start_date += other.events_with_start_date;
        self.postal_matches += other.postal_matches;
        self.bounding_box_matches += other.bounding_box_matches;
        self.locality_matches += other.locality_matches;
        self.region_matches += other.region_matches;
        self.anti_pattern_hits += other.anti_pattern_hits;
        for (strategy, hits) in &other.strategy_hits {
            *self.strategy_hits.entry(*strategy).or_insert(0) += hits;
        }
        self.samples.extend(other.samples.iter().cloned());
        self.samples.sort_by(compare_samples);
        self.samples.dedup();
        self.samples.truncate(sample_cap);
    }

    pub fn matched_events(&self) -> u64 {
        self.postal_matches + self.bounding_box_matches + self.locality_matches + self.region_matches
    }

    pub fn tier_count(&self, tier: MatchTier) -> u64 {
        match tier {
            MatchTier::PostalCode => self.postal_matches,
            MatchTier::BoundingBox => self.bounding_box_matches,
            MatchTier::Locality => self.locality_matches,
            MatchTier::Region => self.region_matches,
            MatchTier::None => self.total_events - self.matched_events(),
        }
    }

    pub fn anti_pattern_ratio(&self) -> f64 {
        if self.total_events > 0 {
            self.anti_pattern_hits as f64 / self.total_events as f64
        } else {
            0.0
        }
    }

    /// Tags of every strategy that fired at least once, strongest first.
    pub fn match_reasons(&self) -> Vec<String> {
        self.strategy_hits.iter().filter(|(_, n)| **n > 0).map(|(s, _)| s.tag().to_string()).collect()
    }

    fn offer_sample(&mut self, event: Event, sample_cap: usize) {
        if sample_cap == 0 {
            return;
        }
        match self.samples.binary_search_by(|probe| compare_samples(probe, &event)) {
            Ok(_) => {}
            Err(pos) if pos < sample_cap => {
                self.samples.insert(pos, event);
                self.samples.truncate(sample_cap);
            }
            Err(_) => {}
        }
    }
}

/// Total order on samples: richest first, then by content.
fn compare_samples(a: &Event, b: &Event) -> Ordering {
    // equal keys fall back to the full record so ties never depend on arrival order
    sample_key(a).cmp(&sample_key(b)).then_with(|| format!("{:?}", a).cmp(&format!("{:?}", b)))
}

fn sample_key(event: &Event) -> (Reverse<u8>, &str, &str, Option<&str>, Option<&str>, &str) {
    (
        Reverse(event.sample_quality()),
        event.source_url.as_str(),
        event.subject.as_str(),
        event.name.as_deref(),
        event.start_date.as_deref(),
        event.event_type.as_str(),
    )
}
