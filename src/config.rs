//! Run configuration.
//!
//! Every reference list and threshold the pipeline uses lives here. The
//! defaults describe Toronto and the Greater Toronto Area; a TOML file can
//! override any subset of them. Configuration is loaded once per run, validated
//! before the first file is opened and never mutated afterwards.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::extraction::vocabulary::schema;
use crate::geo::BoundingBox;
use crate::signals::SignalRule;
use crate::{Error, Result};

/// Top-level configuration for a classification run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub signals: SignalConfig,
    pub extraction: ExtractionConfig,
    pub geo: GeoConfig,
    pub scoring: ScoringConfig,
    /// Number of worker threads pulling source files
    pub workers: usize,
    /// Parse negative domains too and classify them on their event evidence
    pub revisit_negative_domains: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            signals: SignalConfig::default(),
            extraction: ExtractionConfig::default(),
            geo: GeoConfig::default(),
            scoring: ScoringConfig::default(),
            workers: std::thread::available_parallelism().map_or(4, |n| n.get()),
            revisit_negative_domains: false,
        }
    }
}

/// Reference data for the static domain signal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Target-region keywords; any of these in a domain name makes it positive
    pub primary_keywords: Vec<String>,
    /// Municipalities of the metro area, also positive keywords
    pub municipality_keywords: Vec<String>,
    /// Other metros of the home country; they only lower the priority score
    pub competing_regions: Vec<String>,
    /// Curated registry of domains known to publish for the region
    pub known_institutions: Vec<String>,
    /// Country-code suffix of the target country
    pub home_tld: String,
    /// Deny-list of foreign country and regional suffixes
    pub foreign_tlds: Vec<String>,
    /// Order in which the rules are tried; the first one that fires decides
    pub rule_order: Vec<SignalRule>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            primary_keywords: strings(&["toronto", "gta", "yyz", "the6ix", "6ix"]),
            municipality_keywords: strings(&[
                "mississauga", "brampton", "vaughan", "markham", "richmondhill", "scarborough",
                "etobicoke", "northyork", "eastyork", "oakville", "burlington", "hamilton",
                "pickering", "ajax", "whitby", "oshawa", "newmarket", "aurora", "kingcity",
                "caledon", "milton", "halton", "peel", "york", "durham",
            ]),
            competing_regions: strings(&[
                "vancouver", "calgary", "edmonton", "winnipeg", "montreal", "quebec", "ottawa",
                "halifax", "victoria", "saskatoon", "regina",
            ]),
            known_institutions: strings(&[
                "toronto.ca", "ontario.ca", "utoronto.ca", "yorku.ca", "ryerson.ca",
                "torontomu.ca", "senecacollege.ca", "georgebrown.ca", "humber.ca",
                "centennialcollege.ca", "rcmusic.com", "masseyhall.com", "theex.com",
                "rogerscentre.com", "scotiabankarena.com", "budweiserstage.com", "ago.ca",
                "rom.on.ca", "tiff.net", "ontarioplace.com", "harbourfrontcentre.com", "nfrb.ca",
                "coc.ca", "mlse.com", "bluejays.com", "torontofc.ca", "argonauts.ca",
                "caribana.com", "luminatofestival.com", "nuitblanche.com", "tasteoftoronto.com",
            ]),
            home_tld: "ca".to_string(),
            foreign_tlds: strings(&[
                "co.uk", "org.uk", "ac.uk", "co.nz", "com.au", "co.za", "co.jp", "co.in", "co.kr",
                "com.br", "com.mx", "com.ar", "com.cn", "com.tw", "com.hk", "com.sg", "com.my",
                "com.ph", "com.pk", "com.tr", "com.ua", "uk", "de", "fr", "it", "es", "nl", "be",
                "at", "ch", "pl", "cz", "se", "no", "dk", "fi", "pt", "gr", "ie", "hu", "ro", "bg",
                "ru", "cn", "jp", "kr", "in", "br", "mx", "ar", "au", "nz", "za", "ae", "il", "sg",
                "my", "th", "ph", "id", "vn",
            ]),
            rule_order: vec![
                SignalRule::KnownInstitution,
                SignalRule::Keyword,
                SignalRule::HomeTld,
                SignalRule::ForeignTld,
            ],
        }
    }
}

/// Streaming extraction knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Full type IRIs that mark a subject as an Event
    pub event_types: Vec<String>,
    /// Maximum nesting followed below an Event node
    pub max_depth: usize,
    /// Statements buffered for one graph before the window is flushed early
    pub max_window_statements: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        let local_names = [
            "Event", "BusinessEvent", "ChildrensEvent", "ComedyEvent", "CourseInstance",
            "DanceEvent", "DeliveryEvent", "EducationEvent", "ExhibitionEvent", "Festival",
            "FoodEvent", "LiteraryEvent", "MusicEvent", "PublicationEvent", "SaleEvent",
            "ScreeningEvent", "SocialEvent", "SportsEvent", "TheaterEvent", "VisualArtsEvent",
        ];
        let event_types = [schema::HTTP, schema::HTTPS]
            .iter()
            .flat_map(|ns| local_names.iter().map(move |name| format!("{}{}", ns, name)))
            .collect();

        Self { event_types, max_depth: 4, max_window_statements: 100_000 }
    }
}

/// Reference geography of the target region
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Postal prefixes of the core city
    pub core_postal_prefixes: Vec<String>,
    /// Postal prefixes of the surrounding metro area
    pub extended_postal_prefixes: Vec<String>,
    /// Shape of a (possibly truncated) postal code of the target country
    pub postal_pattern: String,
    pub core_box: BoundingBox,
    pub extended_box: BoundingBox,
    /// Degrees beyond the extended box after which a point is confidently foreign
    pub far_margin_degrees: f64,
    /// City and neighbourhood names of the region, lower case
    pub localities: Vec<String>,
    /// Province name and its abbreviations, lower case
    pub region_names: Vec<String>,
    /// Names of the target country as they appear in addresses, lower case
    pub home_country_names: Vec<String>,
    /// Well-known places outside the region, lower case
    pub foreign_places: Vec<String>,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            core_postal_prefixes: strings(&["M1", "M2", "M3", "M4", "M5", "M6", "M7", "M8", "M9"]),
            extended_postal_prefixes: strings(&[
                // Peel
                "L4T", "L4V", "L4W", "L4X", "L4Y", "L4Z", "L5A", "L5B", "L5C", "L5E", "L5G", "L5H",
                "L5J", "L5K", "L5L", "L5M", "L5N", "L5P", "L5R", "L5S", "L5T", "L5V", "L5W", "L6P",
                "L6R", "L6S", "L6T", "L6V", "L6W", "L6X", "L6Y", "L6Z", "L7C",
                // York
                "L3P", "L3R", "L3S", "L3T", "L4B", "L4C", "L4E", "L4G", "L4H", "L4J", "L4K", "L4L",
                "L4S", "L6A", "L6B", "L6C", "L6E", "L6G",
                // Durham
                "L1H", "L1J", "L1K", "L1L", "L1M", "L1N", "L1P", "L1R", "L1S", "L1T", "L1V", "L1W",
                "L1X", "L1Y", "L1Z",
                // Halton
                "L6H", "L6J", "L6K", "L6L", "L6M", "L7G", "L7J", "L7K", "L7L", "L7M", "L7N", "L7P",
                "L7R", "L7S", "L7T",
                // Hamilton
                "L8E", "L8G", "L8H", "L8J", "L8K", "L8L", "L8M", "L8N", "L8P", "L8R", "L8S", "L8T",
                "L8V", "L8W", "L9A", "L9B", "L9C", "L9G", "L9H", "L9K",
            ]),
            postal_pattern: r"^[ABCEGHJ-NPRSTVXY][0-9](?:[A-Z](?:[0-9](?:[A-Z][0-9]?)?)?)?$"
                .to_string(),
            core_box: BoundingBox { min_lat: 43.58, max_lat: 43.86, min_lon: -79.64, max_lon: -79.10 },
            extended_box: BoundingBox {
                min_lat: 43.40,
                max_lat: 44.30,
                min_lon: -80.20,
                max_lon: -78.80,
            },
            far_margin_degrees: 10.0,
            localities: strings(&[
                "toronto", "north york", "northyork", "scarborough", "etobicoke", "east york",
                "eastyork", "york", "downtown toronto", "midtown", "the annex", "kensington",
                "liberty village", "queen west", "king west", "parkdale", "leslieville",
                "riverdale", "beaches", "the beach", "yorkville", "rosedale", "forest hill",
                "lawrence park", "mississauga", "brampton", "caledon", "port credit",
                "streetsville", "meadowvale", "erin mills", "square one", "vaughan",
                "richmond hill", "markham", "thornhill", "woodbridge", "maple", "concord",
                "unionville", "stouffville", "newmarket", "aurora", "king city", "nobleton",
                "kleinburg", "pickering", "ajax", "whitby", "oshawa", "clarington", "bowmanville",
                "courtice", "uxbridge", "port perry", "oakville", "burlington", "milton",
                "halton hills", "georgetown", "acton", "hamilton", "dundas", "ancaster",
                "stoney creek", "waterdown",
            ]),
            region_names: strings(&["ontario", "on", "ont"]),
            home_country_names: strings(&["canada", "ca", "can"]),
            foreign_places: strings(&[
                "london", "england", "united kingdom", "scotland", "ireland", "new york",
                "los angeles", "chicago", "boston", "san francisco", "seattle", "miami",
                "united states", "usa", "paris", "france", "berlin", "germany", "madrid", "spain",
                "rome", "italy", "amsterdam", "netherlands", "sydney", "melbourne", "australia",
                "auckland", "new zealand", "tokyo", "japan", "singapore", "hong kong", "mumbai",
                "india", "dubai", "vancouver", "calgary", "edmonton", "winnipeg", "montreal",
                "ottawa", "halifax", "british columbia", "alberta", "quebec",
            ]),
        }
    }
}

/// Weights and thresholds of the decision table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub postal_weight: f64,
    pub bounding_box_weight: f64,
    pub locality_weight: f64,
    /// Weakest tier; corroborates other evidence
    pub region_weight: f64,
    /// Subtracted once per event carrying the anti-pattern flag
    pub anti_pattern_penalty: f64,
    /// Added to the normalized score of positive domains
    pub positive_signal_bonus: f64,
    /// Score of a positive domain that produced no events
    pub positive_default_score: f64,
    /// Score of a neutral domain that produced no events
    pub neutral_default_score: f64,
    pub include_threshold: f64,
    pub possible_threshold: f64,
    /// Events required before a domain may be included or excluded as foreign
    pub min_events: u64,
    /// Share of anti-pattern events that marks a confidently foreign source
    pub anti_pattern_ratio: f64,
    /// Sample events retained per domain for export
    pub samples_per_domain: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            postal_weight: 1.0,
            bounding_box_weight: 0.9,
            locality_weight: 0.75,
            region_weight: 0.3,
            anti_pattern_penalty: 1.0,
            positive_signal_bonus: 0.1,
            positive_default_score: 0.5,
            neutral_default_score: 0.25,
            include_threshold: 0.6,
            possible_threshold: 0.3,
            min_events: 3,
            anti_pattern_ratio: 0.8,
            samples_per_domain: 3,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Rejects configurations the decision table cannot work with.
    pub fn validate(&self) -> Result<()> {
        let signals = &self.signals;
        require_non_empty("signals.primary_keywords", &signals.primary_keywords)?;
        if signals.home_tld.trim().is_empty() {
            return Err(Error::Config("signals.home_tld must not be empty".into()));
        }
        if signals.rule_order.is_empty() {
            return Err(Error::Config("signals.rule_order must name at least one rule".into()));
        }

        let extraction = &self.extraction;
        require_non_empty("extraction.event_types", &extraction.event_types)?;
        if extraction.max_depth == 0 {
            return Err(Error::Config("extraction.max_depth must be at least 1".into()));
        }
        if extraction.max_window_statements == 0 {
            return Err(Error::Config("extraction.max_window_statements must be positive".into()));
        }

        let geo = &self.geo;
        require_non_empty("geo.core_postal_prefixes", &geo.core_postal_prefixes)?;
        require_non_empty("geo.localities", &geo.localities)?;
        require_non_empty("geo.region_names", &geo.region_names)?;
        require_non_empty("geo.foreign_places", &geo.foreign_places)?;
        regex::Regex::new(&geo.postal_pattern)
            .map_err(|e| Error::Config(format!("geo.postal_pattern is not a valid regex: {}", e)))?;
        for (name, bbox) in [("geo.core_box", &geo.core_box), ("geo.extended_box", &geo.extended_box)] {
            if !bbox.is_well_formed() {
                return Err(Error::Config(format!("{} has inverted or invalid bounds", name)));
            }
        }
        if !geo.extended_box.encloses(&geo.core_box) {
            return Err(Error::Config("geo.extended_box must contain geo.core_box".into()));
        }
        if !(geo.far_margin_degrees.is_finite() && geo.far_margin_degrees >= 0.0) {
            return Err(Error::Config("geo.far_margin_degrees must be non-negative".into()));
        }

        let scoring = &self.scoring;
        let weights = [
            scoring.postal_weight,
            scoring.bounding_box_weight,
            scoring.locality_weight,
            scoring.region_weight,
        ];
        if weights.iter().any(|w| !(w.is_finite() && *w > 0.0)) {
            return Err(Error::Config("tier weights must be positive".into()));
        }
        if weights.windows(2).any(|pair| pair[0] <= pair[1]) {
            return Err(Error::Config(
                "tier weights must strictly decrease from postal code down to region".into(),
            ));
        }
        for (name, value) in [
            ("scoring.include_threshold", scoring.include_threshold),
            ("scoring.possible_threshold", scoring.possible_threshold),
            ("scoring.anti_pattern_ratio", scoring.anti_pattern_ratio),
            ("scoring.positive_default_score", scoring.positive_default_score),
            ("scoring.neutral_default_score", scoring.neutral_default_score),
            ("scoring.positive_signal_bonus", scoring.positive_signal_bonus),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{} must lie in [0, 1], got {}", name, value)));
            }
        }
        if !(scoring.anti_pattern_penalty.is_finite() && scoring.anti_pattern_penalty >= 0.0) {
            return Err(Error::Config("scoring.anti_pattern_penalty must be non-negative".into()));
        }
        if scoring.possible_threshold > scoring.include_threshold {
            return Err(Error::Config(
                "scoring.possible_threshold must not exceed scoring.include_threshold".into(),
            ));
        }
        if scoring.region_weight + scoring.positive_signal_bonus >= scoring.include_threshold {
            return Err(Error::Config(
                "region matches alone would reach scoring.include_threshold".into(),
            ));
        }
        if scoring.min_events == 0 {
            return Err(Error::Config("scoring.min_events must be at least 1".into()));
        }

        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        Ok(())
    }
}

fn require_non_empty(name: &str, values: &[String]) -> Result<()> {
    if values.iter().all(|v| v.trim().is_empty()) {
        return Err(Error::Config(format!("{} must not be empty", name)));
    }
    Ok(())
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}
