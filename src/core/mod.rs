//! Core data structures shared by the parser, the reconstructor and the matcher

use serde::{Deserialize, Serialize};

pub mod interner;
pub use interner::Interner;

/// One RDF term as it appears in a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Iri(String),
    BlankNode(String),
    Literal { value: String, datatype: Option<String>, language: Option<String> },
}

impl Term {
    pub fn literal(value: &str) -> Self {
        Term::Literal { value: value.to_string(), datatype: None, language: None }
    }

    /// True for terms that can name a subject elsewhere in the window.
    pub fn is_reference(&self) -> bool {
        matches!(self, Term::Iri(_) | Term::BlankNode(_))
    }

    /// Key under which the subject arena stores this term. Blank nodes keep the
    /// `_:` prefix so they never collide with an IRI of the same text.
    pub fn subject_key(&self) -> Option<String> {
        match self {
            Term::Iri(iri) => Some(iri.clone()),
            Term::BlankNode(label) => Some(format!("_:{}", label)),
            Term::Literal { .. } => None,
        }
    }

    /// Lexical value of a literal, or the IRI text of an IRI.
    pub fn text(&self) -> Option<&str> {
        match self {
            Term::Literal { value, .. } => Some(value),
            Term::Iri(iri) => Some(iri),
            Term::BlankNode(_) => None,
        }
    }
}

/// Parsed N-Quads statement. The graph is absent for triple lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub subject: Term,
    pub predicate: String,
    pub object: Term,
    pub graph: Option<String>,
}

/// WGS84 point. Only constructed from finite values inside the valid ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self { latitude, longitude })
    }

    /// Parses the raw literal pair found in markup. Either both parse or neither counts.
    pub fn parse(latitude: &str, longitude: &str) -> Option<Self> {
        let lat = latitude.trim().parse::<f64>().ok()?;
        let lon = longitude.trim().parse::<f64>().ok()?;
        Self::new(lat, lon)
    }
}

/// Place an Event happens at, flattened from the nested Place/PostalAddress/GeoCoordinates nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: Option<String>,
    pub street_address: Option<String>,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub coordinates: Option<Coordinates>,
}

impl Location {
    /// A location with no field the matcher could use.
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_none()
            && [
                &self.name,
                &self.street_address,
                &self.locality,
                &self.region,
                &self.postal_code,
                &self.country,
            ]
            .iter()
            .all(|field| field.as_deref().map_or(true, |v| v.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organizer {
    pub name: Option<String>,
    pub url: Option<String>,
}

impl Organizer {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.url.is_none()
    }
}

/// One Schema.org Event rebuilt from the statements of a graph window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Publishing domain, taken from the graph IRI host
    pub domain: String,
    /// Graph IRI, the page the markup was found on
    pub source_url: String,
    /// Subject label of the Event node (`_:b0` or an IRI)
    pub subject: String,
    /// Local name of the matched type, e.g. `MusicEvent`
    pub event_type: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub url: Option<String>,
    pub location: Option<Location>,
    pub organizer: Option<Organizer>,
}

impl Event {
    /// Ranking used when keeping a handful of sample events per domain.
    pub fn sample_quality(&self) -> u8 {
        let mut quality = 0;
        if self.location.is_some() {
            quality += 2;
        }
        if self.start_date.is_some() {
            quality += 1;
        }
        if self.name.is_some() {
            quality += 1;
        }
        quality
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_require_valid_ranges() {
        assert!(Coordinates::parse("43.65", "-79.38").is_some());
        assert!(Coordinates::parse("143.65", "-79.38").is_none());
        assert!(Coordinates::parse("43.65", "").is_none());
        assert!(Coordinates::parse("NaN", "-79.38").is_none());
    }

    #[test]
    fn test_location_blank_fields_are_empty() {
        let location = Location { locality: Some("  ".into()), ..Default::default() };
        assert!(location.is_empty());

        let location = Location { postal_code: Some("M5B".into()), ..Default::default() };
        assert!(!location.is_empty());
    }

    #[test]
    fn test_blank_node_subject_key_is_prefixed() {
        assert_eq!(Term::BlankNode("b0".into()).subject_key().as_deref(), Some("_:b0"));
        assert_eq!(Term::literal("x").subject_key(), None);
    }
}
