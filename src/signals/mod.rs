//! Static domain signals.
//!
//! Phase 1 of a run labels every domain of the metadata table as positive,
//! neutral or negative from its name alone. The extractor uses the table to
//! skip negative domains and the scorer uses it as prior evidence. Nothing in
//! here looks at event content.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SignalConfig;

pub mod domain;

pub use domain::{domain_of_url, normalize_domain};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainSignal {
    Positive,
    Neutral,
    Negative,
}

impl DomainSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            DomainSignal::Positive => "POSITIVE",
            DomainSignal::Neutral => "NEUTRAL",
            DomainSignal::Negative => "NEGATIVE",
        }
    }
}

/// One rule of the first-match signal table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalRule {
    /// Domain or one of its parents is in the institution registry (positive)
    KnownInstitution,
    /// A primary or municipality keyword appears in the name (positive)
    Keyword,
    /// Suffix is the target country code (positive)
    HomeTld,
    /// Suffix is on the foreign deny-list (negative)
    ForeignTld,
}

/// Evidence found for a domain, kept for auditing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SignalReason {
    KnownInstitution,
    Keyword(String),
    Municipality(String),
    HomeTld,
    ForeignTld(String),
    CompetingRegion(String),
    Malformed,
}

/// One row of the domain metadata table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub domain: String,
    pub tld: String,
    pub part_file: Option<String>,
    pub quads: Option<u64>,
    pub entities: Option<u64>,
}

impl DomainRecord {
    pub fn new(domain: &str, tld: &str) -> Self {
        Self { domain: domain.to_string(), tld: tld.to_string(), part_file: None, quads: None, entities: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalAssessment {
    pub domain: String,
    pub tld: String,
    pub signal: DomainSignal,
    /// Ranking hint for deciding which part files to fetch first
    pub priority: f64,
    pub reasons: Vec<SignalReason>,
}

/// Pure classifier over the static reference lists.
pub struct SignalClassifier {
    config: SignalConfig,
    institutions: HashSet<String>,
    keywords: Vec<String>,
}

impl SignalClassifier {
    pub fn new(config: &SignalConfig) -> Self {
        let institutions = config.known_institutions.iter().map(|d| normalize_domain(d)).collect();
        let keywords = config
            .primary_keywords
            .iter()
            .chain(&config.municipality_keywords)
            .chain(&config.competing_regions)
            .map(|k| k.trim().to_ascii_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { config: config.clone(), institutions, keywords }
    }

    pub fn assess(&self, record: &DomainRecord) -> SignalAssessment {
        let name = normalize_domain(&record.domain);
        let row_tld = record.tld.trim().trim_start_matches('.').to_ascii_lowercase();

        if !domain::is_well_formed(&name) {
            return SignalAssessment {
                domain: name,
                tld: row_tld,
                signal: DomainSignal::Neutral,
                priority: 0.0,
                reasons: vec![SignalReason::Malformed],
            };
        }

        let compound = domain::effective_tld(&name, &self.config.foreign_tlds);
        let tld = if compound.contains('.') || row_tld.is_empty() { compound.to_string() } else { row_tld };

        let keyword_refs: Vec<&str> = self.keywords.iter().map(|k| k.as_str()).collect();
        let words = domain::segment_labels(&name, &tld, &keyword_refs);

        let mut reasons = Vec::new();
        let institution = self.is_institution(&name);
        if institution {
            reasons.push(SignalReason::KnownInstitution);
        }
        for keyword in &self.config.primary_keywords {
            if words.iter().any(|w| w == keyword) {
                reasons.push(SignalReason::Keyword(keyword.clone()));
            }
        }
        for city in &self.config.municipality_keywords {
            if words.iter().any(|w| w == city) {
                reasons.push(SignalReason::Municipality(city.clone()));
            }
        }
        let home = tld == self.config.home_tld;
        if home {
            reasons.push(SignalReason::HomeTld);
        }
        let foreign = self.config.foreign_tlds.iter().any(|t| *t == tld);
        if foreign {
            reasons.push(SignalReason::ForeignTld(tld.clone()));
        }
        for region in &self.config.competing_regions {
            if words.iter().any(|w| w == region) {
                reasons.push(SignalReason::CompetingRegion(region.clone()));
            }
        }

        let has_keyword = reasons
            .iter()
            .any(|r| matches!(r, SignalReason::Keyword(_) | SignalReason::Municipality(_)));
        let signal = self
            .config
            .rule_order
            .iter()
            .find_map(|rule| match rule {
                SignalRule::KnownInstitution if institution => Some(DomainSignal::Positive),
                SignalRule::Keyword if has_keyword => Some(DomainSignal::Positive),
                SignalRule::HomeTld if home => Some(DomainSignal::Positive),
                SignalRule::ForeignTld if foreign => Some(DomainSignal::Negative),
                _ => None,
            })
            .unwrap_or(DomainSignal::Neutral);

        let priority = if signal == DomainSignal::Negative { 0.0 } else { priority_score(&reasons) };
        SignalAssessment { domain: name, tld, signal, priority, reasons }
    }

    fn is_institution(&self, domain: &str) -> bool {
        if self.institutions.contains(domain) {
            return true;
        }
        // subdomains of a registered institution inherit it
        domain.match_indices('.').any(|(i, _)| self.institutions.contains(&domain[i + 1..]))
    }

    /// Runs phase 1 over a metadata table.
    pub fn classify_all(&self, records: &[DomainRecord]) -> SignalTable {
        let mut table = SignalTable::default();
        for record in records {
            let assessment = self.assess(record);
            debug!(domain = %assessment.domain, signal = assessment.signal.as_str(), "assessed domain");
            table.insert(assessment);
        }
        table
    }
}

fn priority_score(reasons: &[SignalReason]) -> f64 {
    let score = reasons.iter().fold(0.0, |score, reason| {
        score
            + match reason {
                SignalReason::KnownInstitution => 100.0,
                SignalReason::Keyword(k) if k == "toronto" => 50.0,
                SignalReason::Keyword(_) => 20.0,
                SignalReason::Municipality(_) => 30.0,
                SignalReason::HomeTld => 10.0,
                SignalReason::CompetingRegion(_) => -25.0,
                SignalReason::ForeignTld(_) | SignalReason::Malformed => 0.0,
            }
    });
    f64::max(score, 0.0)
}

/// Signal of every domain from the metadata table. Immutable once phase 1 ends.
#[derive(Debug, Clone, Default)]
pub struct SignalTable {
    entries: HashMap<String, SignalAssessment>,
}

impl SignalTable {
    pub fn insert(&mut self, assessment: SignalAssessment) {
        self.entries.insert(assessment.domain.clone(), assessment);
    }

    pub fn get(&self, domain: &str) -> Option<&SignalAssessment> {
        self.entries.get(domain).or_else(|| self.entries.get(&normalize_domain(domain)))
    }

    /// Signal of a domain; domains missing from the table are neutral.
    pub fn signal_of(&self, domain: &str) -> DomainSignal {
        self.get(domain).map_or(DomainSignal::Neutral, |a| a.signal)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn counts(&self) -> BTreeMap<DomainSignal, usize> {
        let mut counts = BTreeMap::new();
        for assessment in self.entries.values() {
            *counts.entry(assessment.signal).or_insert(0) += 1;
        }
        counts
    }

    pub fn negative_domains(&self) -> impl Iterator<Item = &str> {
        self.entries.values().filter(|a| a.signal == DomainSignal::Negative).map(|a| a.domain.as_str())
    }

    /// Assessments ordered by priority, highest first.
    pub fn ranked(&self) -> Vec<&SignalAssessment> {
        let mut ranked: Vec<&SignalAssessment> = self.entries.values().collect();
        ranked.sort_by(|a, b| b.priority.total_cmp(&a.priority).then_with(|| a.domain.cmp(&b.domain)));
        ranked
    }
}
