//! Geographic matching of Event locations against the target region.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::Coordinates;

pub mod matcher;

pub use matcher::GeoMatcher;

/// Axis-aligned latitude/longitude rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, point: Coordinates) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.latitude)
            && (self.min_lon..=self.max_lon).contains(&point.longitude)
    }

    /// The box grown by `margin` degrees on every side.
    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min_lat: self.min_lat - margin,
            max_lat: self.max_lat + margin,
            min_lon: self.min_lon - margin,
            max_lon: self.max_lon + margin,
        }
    }

    pub fn encloses(&self, other: &BoundingBox) -> bool {
        self.min_lat <= other.min_lat
            && self.max_lat >= other.max_lat
            && self.min_lon <= other.min_lon
            && self.max_lon >= other.max_lon
    }

    pub fn is_well_formed(&self) -> bool {
        let values = [self.min_lat, self.max_lat, self.min_lon, self.max_lon];
        values.iter().all(|v| v.is_finite()) && self.min_lat < self.max_lat && self.min_lon < self.max_lon
    }
}

/// Strength of the best positive strategy that fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    #[default]
    None,
    Region,
    Locality,
    BoundingBox,
    PostalCode,
}

impl MatchTier {
    pub const POSITIVE: [MatchTier; 4] =
        [MatchTier::PostalCode, MatchTier::BoundingBox, MatchTier::Locality, MatchTier::Region];
}

/// Individual matching strategies. Ordered by strength, anti-patterns last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    PostalCode,
    BoundingBox,
    Locality,
    Region,
    /// Locality, region or country names a well-known foreign place
    ForeignPlace,
    /// Coordinates far outside every configured box
    DistantCoordinates,
}

impl Strategy {
    pub fn tag(self) -> &'static str {
        match self {
            Strategy::PostalCode => "postal_code",
            Strategy::BoundingBox => "bounding_box",
            Strategy::Locality => "locality",
            Strategy::Region => "region",
            Strategy::ForeignPlace => "foreign_place",
            Strategy::DistantCoordinates => "distant_coordinates",
        }
    }

    pub fn tier(self) -> MatchTier {
        match self {
            Strategy::PostalCode => MatchTier::PostalCode,
            Strategy::BoundingBox => MatchTier::BoundingBox,
            Strategy::Locality => MatchTier::Locality,
            Strategy::Region => MatchTier::Region,
            Strategy::ForeignPlace | Strategy::DistantCoordinates => MatchTier::None,
        }
    }

    pub fn is_anti_pattern(self) -> bool {
        matches!(self, Strategy::ForeignPlace | Strategy::DistantCoordinates)
    }
}

/// Which of the nested areas a postal code or point fell into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoArea {
    Extended,
    Core,
}

/// Outcome of matching one Location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Every strategy that fired, positive and anti-pattern alike
    pub strategies: BTreeSet<Strategy>,
    /// Strongest positive tier reached
    pub tier: MatchTier,
    pub anti_pattern: bool,
    pub area: Option<GeoArea>,
}

impl MatchResult {
    pub fn record(&mut self, strategy: Strategy) {
        self.strategies.insert(strategy);
        self.tier = self.tier.max(strategy.tier());
        if strategy.is_anti_pattern() {
            self.anti_pattern = true;
        }
    }

    pub fn record_area(&mut self, area: GeoArea) {
        self.area = self.area.max(Some(area));
    }

    pub fn is_match(&self) -> bool {
        self.tier != MatchTier::None
    }

    /// Strategy tags, strongest first.
    pub fn reasons(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.tag()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_keeps_the_maximum() {
        let mut result = MatchResult::default();
        result.record(Strategy::Region);
        result.record(Strategy::PostalCode);
        result.record(Strategy::Locality);

        assert_eq!(result.tier, MatchTier::PostalCode);
        assert_eq!(result.reasons(), vec!["postal_code", "locality", "region"]);
        assert!(!result.anti_pattern);
    }

    #[test]
    fn test_anti_pattern_does_not_raise_tier() {
        let mut result = MatchResult::default();
        result.record(Strategy::ForeignPlace);
        assert_eq!(result.tier, MatchTier::None);
        assert!(result.anti_pattern);
        assert!(!result.is_match());
    }

    #[test]
    fn test_core_area_wins() {
        let mut result = MatchResult::default();
        result.record_area(GeoArea::Core);
        result.record_area(GeoArea::Extended);
        assert_eq!(result.area, Some(GeoArea::Core));
    }

    #[test]
    fn test_expanded_box() {
        let bbox = BoundingBox { min_lat: 43.0, max_lat: 44.0, min_lon: -80.0, max_lon: -79.0 };
        let far = bbox.expanded(1.0);
        assert!(far.encloses(&bbox));
        assert!(far.contains(Coordinates::new(44.5, -80.5).unwrap()));
        assert!(!bbox.contains(Coordinates::new(44.5, -80.5).unwrap()));
    }
}
