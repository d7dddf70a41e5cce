use std::collections::HashSet;

use regex::Regex;

use crate::config::GeoConfig;
use crate::core::{Coordinates, Location};
use crate::geo::{BoundingBox, GeoArea, MatchResult, Strategy};
use crate::{Error, Result};

/// Multi-strategy matcher for one target region.
///
/// Every strategy is evaluated independently and all hits are kept; the result
/// records the strongest positive tier for scoring. Pure function of the
/// Location and the configuration it was built from.
#[derive(Debug, Clone)]
pub struct GeoMatcher {
    core_prefixes: Vec<String>,
    extended_prefixes: Vec<String>,
    postal_pattern: Regex,
    core_box: BoundingBox,
    extended_box: BoundingBox,
    far_box: BoundingBox,
    locality_names: HashSet<String>,
    /// Longest first, so multi-word names are tried before their parts
    locality_phrases: Vec<String>,
    region_names: HashSet<String>,
    home_countries: HashSet<String>,
    foreign_places: Vec<String>,
}

impl GeoMatcher {
    pub fn new(config: &GeoConfig) -> Result<Self> {
        let postal_pattern = Regex::new(&config.postal_pattern)
            .map_err(|e| Error::Config(format!("invalid postal pattern: {}", e)))?;

        let mut locality_phrases = lower_all(&config.localities);
        locality_phrases.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        locality_phrases.dedup();
        let mut foreign_places = lower_all(&config.foreign_places);
        foreign_places.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        foreign_places.dedup();

        Ok(Self {
            core_prefixes: config.core_postal_prefixes.iter().map(|p| normalize_postal(p)).collect(),
            extended_prefixes: config.extended_postal_prefixes.iter().map(|p| normalize_postal(p)).collect(),
            postal_pattern,
            core_box: config.core_box,
            extended_box: config.extended_box,
            far_box: config.extended_box.expanded(config.far_margin_degrees),
            locality_names: locality_phrases.iter().cloned().collect(),
            locality_phrases,
            region_names: lower_all(&config.region_names).into_iter().collect(),
            home_countries: lower_all(&config.home_country_names).into_iter().collect(),
            foreign_places,
        })
    }

    pub fn match_location(&self, location: &Location) -> MatchResult {
        let mut result = MatchResult::default();
        if location.is_empty() {
            return result;
        }

        if let Some(area) = location.postal_code.as_deref().and_then(|p| self.postal_area(p)) {
            result.record(Strategy::PostalCode);
            result.record_area(area);
        }

        if let Some(point) = location.coordinates {
            self.match_point(point, &mut result);
        }

        let locality = location.locality.as_deref().map(normalize_text);
        let region = location.region.as_deref().map(normalize_text);
        let country = location.country.as_deref().map(normalize_text);

        let foreign = [&locality, &region, &country]
            .into_iter()
            .flatten()
            .any(|text| self.foreign_places.iter().any(|place| find_phrase(text, place).is_some()));
        if foreign {
            result.record(Strategy::ForeignPlace);
        }

        // the place name stands in for a missing or unmatched locality
        let name = location.name.as_deref().map(normalize_text);
        if [&locality, &name].into_iter().flatten().any(|text| self.is_local(text)) {
            result.record(Strategy::Locality);
        }

        if let Some(region) = &region {
            let home_country = country.as_ref().map_or(true, |c| self.home_countries.contains(c));
            if home_country && self.region_names.contains(region.trim_end_matches('.')) {
                result.record(Strategy::Region);
            }
        }

        result
    }

    /// Core or extended area of a postal code; `None` when it matches neither
    /// or no postal code can be found in `raw`.
    pub fn postal_area(&self, raw: &str) -> Option<GeoArea> {
        let postal = self.find_postal(raw)?;
        if self.core_prefixes.iter().any(|p| postal.starts_with(p.as_str())) {
            Some(GeoArea::Core)
        } else if self.extended_prefixes.iter().any(|p| postal.starts_with(p.as_str())) {
            Some(GeoArea::Extended)
        } else {
            None
        }
    }

    /// The postal code in a free-form value such as `"M5B 1W8, Canada"`.
    ///
    /// The whole value is tried first, then a full six-character code among its
    /// tokens (alone or split over two), then a three-character area code.
    fn find_postal(&self, raw: &str) -> Option<String> {
        let whole = normalize_postal(raw);
        if !whole.is_empty() && self.postal_pattern.is_match(&whole) {
            return Some(whole);
        }

        let tokens: Vec<String> = raw
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_ascii_uppercase)
            .collect();
        let is_postal = |candidate: &str, len: usize| candidate.len() == len && self.postal_pattern.is_match(candidate);

        for (i, token) in tokens.iter().enumerate() {
            if is_postal(token.as_str(), 6) {
                return Some(token.clone());
            }
            if let Some(next) = tokens.get(i + 1) {
                let joined = format!("{}{}", token, next);
                if is_postal(joined.as_str(), 6) {
                    return Some(joined);
                }
            }
        }
        tokens.into_iter().find(|t| is_postal(t.as_str(), 3))
    }

    fn match_point(&self, point: Coordinates, result: &mut MatchResult) {
        if self.core_box.contains(point) {
            result.record(Strategy::BoundingBox);
            result.record_area(GeoArea::Core);
        } else if self.extended_box.contains(point) {
            result.record(Strategy::BoundingBox);
            result.record_area(GeoArea::Extended);
        } else if !self.far_box.contains(point) {
            result.record(Strategy::DistantCoordinates);
        }
        // between the extended box and the far margin: imprecise, not foreign
    }

    fn is_local(&self, text: &str) -> bool {
        if self.locality_names.contains(text) {
            return true;
        }
        // "New York" must not count as the York neighbourhood
        let masked = self
            .foreign_places
            .iter()
            .fold(text.to_string(), |acc, place| mask_phrase(&acc, place));
        self.locality_phrases.iter().any(|phrase| find_phrase(&masked, phrase).is_some())
    }
}

fn lower_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| normalize_text(v)).filter(|v| !v.is_empty()).collect()
}

/// Lower case with runs of whitespace collapsed.
fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn normalize_postal(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace() && *c != '-').collect::<String>().to_uppercase()
}

/// Byte offset of `phrase` in `text` where it stands as whole words.
fn find_phrase(text: &str, phrase: &str) -> Option<usize> {
    if phrase.is_empty() {
        return None;
    }
    let mut from = 0;
    while let Some(offset) = text[from..].find(phrase) {
        let start = from + offset;
        let end = start + phrase.len();
        let before = text[..start].chars().next_back().map_or(true, |c| !c.is_alphanumeric());
        let after = text[end..].chars().next().map_or(true, |c| !c.is_alphanumeric());
        if before && after {
            return Some(start);
        }
        from = start + text[start..].chars().next().map_or(1, |c| c.len_utf8());
    }
    None
}

fn mask_phrase(text: &str, phrase: &str) -> String {
    let mut masked = text.to_string();
    while let Some(start) = find_phrase(&masked, phrase) {
        masked.replace_range(start..start + phrase.len(), &" ".repeat(phrase.len()));
    }
    masked
}
