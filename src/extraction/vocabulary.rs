//! Vocabulary used when rebuilding Schema.org events.
//!
//! Schema.org markup in the wild mixes `http` and `https` namespaces, vendor
//! prefixes and casing (`startdate`), so properties are matched by their
//! lower-cased local name instead of by full IRI.

/// RDF vocabulary constants
pub mod rdf {
    /// rdf:type IRI
    pub const TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
}

/// Schema.org namespaces
pub mod schema {
    pub const HTTP: &str = "http://schema.org/";
    pub const HTTPS: &str = "https://schema.org/";
}

/// Part of an IRI after the last `#` or `/`.
pub fn local_name(iri: &str) -> &str {
    let trimmed = iri.trim_end_matches(['/', '#']);
    trimmed.rfind(['#', '/']).map_or(trimmed, |i| &trimmed[i + 1..])
}

/// Properties read from the Event node itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventField {
    Name,
    Description,
    StartDate,
    EndDate,
    Url,
    Location,
    Organizer,
}

impl EventField {
    pub fn from_local_name(local: &str) -> Option<Self> {
        match local.to_ascii_lowercase().as_str() {
            "name" | "title" => Some(Self::Name),
            "description" => Some(Self::Description),
            "startdate" => Some(Self::StartDate),
            "enddate" => Some(Self::EndDate),
            "url" => Some(Self::Url),
            "location" => Some(Self::Location),
            "organizer" => Some(Self::Organizer),
            _ => None,
        }
    }

    /// Only these point at nested nodes worth materializing.
    pub fn is_nested(self) -> bool {
        matches!(self, Self::Location | Self::Organizer)
    }
}

/// Properties flattened into a [`Location`](crate::core::Location), at any nesting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationField {
    Name,
    StreetAddress,
    Locality,
    Region,
    PostalCode,
    Country,
    Latitude,
    Longitude,
}

impl LocationField {
    pub fn from_local_name(local: &str) -> Option<Self> {
        match local.to_ascii_lowercase().as_str() {
            "name" => Some(Self::Name),
            "address" | "streetaddress" => Some(Self::StreetAddress),
            "addresslocality" => Some(Self::Locality),
            "addressregion" => Some(Self::Region),
            "postalcode" => Some(Self::PostalCode),
            "addresscountry" => Some(Self::Country),
            "latitude" | "lat" => Some(Self::Latitude),
            "longitude" | "lng" | "lon" | "long" => Some(Self::Longitude),
            _ => None,
        }
    }
}
