//! Rebuilds Event records from a closed graph window.
//!
//! Nested nodes are materialized into an owned tree starting at each Event.
//! A node that already appears on the path from the Event down to it is left
//! empty, which breaks self-referential blank-node graphs. Shared nodes that do
//! not form a cycle are materialized under every branch that reaches them.
//! Depth is capped by `max_depth`.

use std::collections::HashSet;

use crate::core::{Coordinates, Event, Location, Organizer, Term};
use crate::extraction::arena::GraphWindow;
use crate::extraction::stream::ExtractionStats;
use crate::extraction::vocabulary::{local_name, EventField, LocationField};

/// A materialized property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Literal text
    Text(String),
    /// IRI with no statements of its own in the window
    Link(String),
    Node(Node),
    /// Unresolved blank node, cycle back to an ancestor, or depth cut-off
    Missing,
}

/// A materialized subject. Property keys are lower-cased local names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub label: String,
    pub types: Vec<String>,
    pub properties: Vec<(String, Value)>,
}

impl Node {
    fn first_text(&self, key: &str) -> Option<&str> {
        self.properties.iter().find_map(|(k, v)| match v {
            Value::Text(text) if k == key && !text.trim().is_empty() => Some(text.trim()),
            _ => None,
        })
    }

    fn first_link_or_text(&self, key: &str) -> Option<&str> {
        self.properties.iter().find_map(|(k, v)| match v {
            Value::Text(text) | Value::Link(text) if k == key && !text.trim().is_empty() => {
                Some(text.trim())
            }
            _ => None,
        })
    }
}

/// Reads Events out of one window.
pub struct Reconstructor<'w> {
    window: &'w GraphWindow,
    event_types: &'w HashSet<String>,
    max_depth: usize,
}

impl<'w> Reconstructor<'w> {
    pub fn new(window: &'w GraphWindow, event_types: &'w HashSet<String>, max_depth: usize) -> Self {
        Self { window, event_types, max_depth }
    }

    /// Every subject typed as an Event, in order of first appearance.
    pub fn events(&self, domain: &str, stats: &mut ExtractionStats) -> Vec<Event> {
        let source_url = self.window.graph().unwrap_or_default();
        let mut events = Vec::new();
        for id in self.window.ids() {
            let Some(bucket) = self.window.bucket(id) else { continue };
            let Some(event_type) = bucket.types.iter().find(|t| self.event_types.contains(*t)) else {
                continue;
            };
            let root = self.materialize_event(id, stats);
            events.push(event_from_node(&root, local_name(event_type), domain, source_url));
        }
        events
    }

    /// Materializes an Event node, following only its location and organizer.
    ///
    /// Cycles are detected against the path from the Event down to the node
    /// being resolved, so a node shared by two branches resolves in both.
    pub fn materialize_event(&self, id: u32, stats: &mut ExtractionStats) -> Node {
        let mut path = HashSet::from([id]);
        let mut root = self.shell(id);
        let Some(bucket) = self.window.bucket(id) else { return root };

        for (predicate, object) in &bucket.properties {
            let key = local_name(predicate).to_ascii_lowercase();
            let nested = EventField::from_local_name(&key).is_some_and(|f| f.is_nested());
            let value = if nested {
                self.resolve(object, 1, &mut path, stats)
            } else {
                shallow(object)
            };
            root.properties.push((key, value));
        }
        root
    }

    fn resolve(
        &self,
        term: &Term,
        depth: usize,
        path: &mut HashSet<u32>,
        stats: &mut ExtractionStats,
    ) -> Value {
        let Some(id) = self.window.lookup(term) else {
            return match term {
                Term::BlankNode(_) => {
                    stats.unresolved_references += 1;
                    Value::Missing
                }
                other => shallow(other),
            };
        };
        if path.contains(&id) {
            stats.cycles_broken += 1;
            return Value::Missing;
        }
        if depth > self.max_depth {
            stats.depth_limit_hits += 1;
            return Value::Missing;
        }
        path.insert(id);

        let mut node = self.shell(id);
        if let Some(bucket) = self.window.bucket(id) {
            for (predicate, object) in &bucket.properties {
                let value = self.resolve(object, depth + 1, path, stats);
                node.properties.push((local_name(predicate).to_ascii_lowercase(), value));
            }
        }
        path.remove(&id);
        Value::Node(node)
    }

    fn shell(&self, id: u32) -> Node {
        Node {
            label: self.window.label(id).unwrap_or_default().to_string(),
            types: self.window.bucket(id).map(|b| b.types.clone()).unwrap_or_default(),
            properties: Vec::new(),
        }
    }
}

fn shallow(term: &Term) -> Value {
    match term {
        Term::Literal { value, .. } => Value::Text(value.clone()),
        Term::Iri(iri) => Value::Link(iri.clone()),
        Term::BlankNode(_) => Value::Missing,
    }
}

/// Flattens a materialized Event node into an Event record.
pub fn event_from_node(root: &Node, event_type: &str, domain: &str, source_url: &str) -> Event {
    let mut event = Event {
        domain: domain.to_string(),
        source_url: source_url.to_string(),
        subject: root.label.clone(),
        event_type: event_type.to_string(),
        name: None,
        description: None,
        start_date: None,
        end_date: None,
        url: None,
        location: None,
        organizer: None,
    };

    for (key, value) in &root.properties {
        let Some(field) = EventField::from_local_name(key) else { continue };
        match field {
            EventField::Name => set_text(&mut event.name, value),
            EventField::Description => set_text(&mut event.description, value),
            EventField::StartDate => set_text(&mut event.start_date, value),
            EventField::EndDate => set_text(&mut event.end_date, value),
            EventField::Url => {
                if event.url.is_none() {
                    if let Value::Text(v) | Value::Link(v) = value {
                        event.url = non_blank(v);
                    }
                }
            }
            EventField::Location => {
                if event.location.is_none() {
                    event.location = location_from_value(value);
                }
            }
            EventField::Organizer => {
                if event.organizer.is_none() {
                    event.organizer = organizer_from_value(value);
                }
            }
        }
    }
    event
}

/// Location payload of a `location` value; `None` when nothing usable was found.
pub fn location_from_value(value: &Value) -> Option<Location> {
    match value {
        Value::Text(text) => non_blank(text).map(|name| Location { name: Some(name), ..Default::default() }),
        Value::Node(node) => {
            let mut acc = LocationAccumulator::default();
            acc.fill(node, true);
            acc.finish()
        }
        Value::Link(_) | Value::Missing => None,
    }
}

fn organizer_from_value(value: &Value) -> Option<Organizer> {
    let organizer = match value {
        Value::Text(text) => Organizer { name: non_blank(text), url: None },
        Value::Link(iri) => Organizer { name: None, url: non_blank(iri) },
        Value::Node(node) => Organizer {
            name: node.first_text("name").or_else(|| node.first_text("legalname")).map(str::to_string),
            url: node.first_link_or_text("url").map(str::to_string),
        },
        Value::Missing => return None,
    };
    (!organizer.is_empty()).then_some(organizer)
}

#[derive(Default)]
struct LocationAccumulator {
    location: Location,
    latitude: Option<String>,
    longitude: Option<String>,
}

impl LocationAccumulator {
    /// Own literals first, then nested nodes, so the outer node wins ties.
    fn fill(&mut self, node: &Node, top: bool) {
        for (key, value) in &node.properties {
            let (Some(field), Value::Text(text)) = (LocationField::from_local_name(key), value) else {
                continue;
            };
            let slot = match field {
                LocationField::Name if top => &mut self.location.name,
                LocationField::Name => continue,
                LocationField::StreetAddress => &mut self.location.street_address,
                LocationField::Locality => &mut self.location.locality,
                LocationField::Region => &mut self.location.region,
                LocationField::PostalCode => &mut self.location.postal_code,
                LocationField::Country => &mut self.location.country,
                LocationField::Latitude => &mut self.latitude,
                LocationField::Longitude => &mut self.longitude,
            };
            if slot.is_none() {
                *slot = non_blank(text);
            }
        }

        for (key, value) in &node.properties {
            let Value::Node(child) = value else { continue };
            if EventField::from_local_name(key) == Some(EventField::Organizer) {
                continue;
            }
            if LocationField::from_local_name(key) == Some(LocationField::Country) {
                // Country nodes carry the country in their name
                if self.location.country.is_none() {
                    self.location.country = child.first_text("name").map(str::to_string);
                }
                continue;
            }
            self.fill(child, false);
        }
    }

    fn finish(self) -> Option<Location> {
        let mut location = self.location;
        if let (Some(lat), Some(lon)) = (&self.latitude, &self.longitude) {
            location.coordinates = Coordinates::parse(lat, lon);
        }
        (!location.is_empty()).then_some(location)
    }
}

fn set_text(slot: &mut Option<String>, value: &Value) {
    if slot.is_none() {
        if let Value::Text(text) = value {
            *slot = non_blank(text);
        }
    }
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
