use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::geo::MatchTier;
use crate::scoring::tally::DomainTally;
use crate::signals::DomainSignal;

/// Final three-way decision for a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Include,
    Exclude,
    Unknown,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Include => "INCLUDE",
            Classification::Exclude => "EXCLUDE",
            Classification::Unknown => "UNKNOWN",
        }
    }
}

/// Row of the decision table that produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    NegativeSignal,
    AntiPatternDominance,
    Confident,
    InsufficientSample,
    Possible,
    LowScore,
    ManualOverride,
}

/// One output row per domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub domain: String,
    pub signal: DomainSignal,
    pub classification: Classification,
    pub decided_by: DecisionRule,
    pub confidence: f64,
    pub total_events: u64,
    pub matched_events: u64,
    pub anti_pattern_hits: u64,
    pub postal_matches: u64,
    pub bounding_box_matches: u64,
    pub locality_matches: u64,
    pub region_matches: u64,
    pub match_reasons: Vec<String>,
    /// Set once an external review has overridden the classification
    pub reviewed: bool,
}

/// Pure decision table over (signal, score, sample size, anti-pattern ratio).
#[derive(Debug, Clone)]
pub struct DomainScorer {
    config: ScoringConfig,
}

impl DomainScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self { config: config.clone() }
    }

    pub fn tier_weight(&self, tier: MatchTier) -> f64 {
        match tier {
            MatchTier::PostalCode => self.config.postal_weight,
            MatchTier::BoundingBox => self.config.bounding_box_weight,
            MatchTier::Locality => self.config.locality_weight,
            MatchTier::Region => self.config.region_weight,
            MatchTier::None => 0.0,
        }
    }

    /// Confidence in [0, 1], computed from integer counters only.
    pub fn confidence(&self, signal: DomainSignal, tally: &DomainTally) -> f64 {
        if tally.total_events == 0 {
            return match signal {
                DomainSignal::Positive => self.config.positive_default_score,
                DomainSignal::Neutral => self.config.neutral_default_score,
                DomainSignal::Negative => 0.0,
            };
        }
        let evidence: f64 =
            MatchTier::POSITIVE.iter().map(|tier| tally.tier_count(*tier) as f64 * self.tier_weight(*tier)).sum();
        let penalty = tally.anti_pattern_hits as f64 * self.config.anti_pattern_penalty;
        let bonus = if signal == DomainSignal::Positive { self.config.positive_signal_bonus } else { 0.0 };

        ((evidence - penalty) / tally.total_events as f64 + bonus).clamp(0.0, 1.0)
    }

    pub fn decide(&self, signal: DomainSignal, tally: &DomainTally) -> (Classification, DecisionRule, f64) {
        let score = self.confidence(signal, tally);
        let enough = tally.total_events >= self.config.min_events;

        let (classification, rule) = if signal == DomainSignal::Negative {
            (Classification::Exclude, DecisionRule::NegativeSignal)
        } else if enough && tally.anti_pattern_ratio() >= self.config.anti_pattern_ratio {
            (Classification::Exclude, DecisionRule::AntiPatternDominance)
        } else if score >= self.config.include_threshold {
            if enough {
                (Classification::Include, DecisionRule::Confident)
            } else {
                (Classification::Unknown, DecisionRule::InsufficientSample)
            }
        } else if score >= self.config.possible_threshold {
            (Classification::Unknown, DecisionRule::Possible)
        } else {
            (Classification::Exclude, DecisionRule::LowScore)
        };
        (classification, rule, score)
    }

    pub fn classify(&self, domain: &str, signal: DomainSignal, tally: &DomainTally) -> ClassificationRecord {
        let (classification, decided_by, confidence) = self.decide(signal, tally);
        ClassificationRecord {
            domain: domain.to_string(),
            signal,
            classification,
            decided_by,
            confidence,
            total_events: tally.total_events,
            matched_events: tally.matched_events(),
            anti_pattern_hits: tally.anti_pattern_hits,
            postal_matches: tally.postal_matches,
            bounding_box_matches: tally.bounding_box_matches,
            locality_matches: tally.locality_matches,
            region_matches: tally.region_matches,
            match_reasons: tally.match_reasons(),
            reviewed: false,
        }
    }
}
