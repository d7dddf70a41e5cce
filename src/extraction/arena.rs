use crate::core::{Interner, Statement, Term};
use crate::extraction::vocabulary::rdf;

/// Statements of one subject inside the current window.
#[derive(Debug, Default, Clone)]
pub struct SubjectBucket {
    /// `rdf:type` objects, in statement order
    pub types: Vec<String>,
    /// Every other (predicate, object) pair, in statement order
    pub properties: Vec<(String, Term)>,
}

/// Subject arena for one run of statements that share a graph.
///
/// Buckets are addressed by interned id; references between subjects are
/// resolved by looking the object label up again, never by pointer, so cycles
/// in the data cannot create cycles in the arena.
#[derive(Debug, Default)]
pub struct GraphWindow {
    graph: Option<String>,
    interner: Interner,
    buckets: Vec<SubjectBucket>,
    statements: usize,
}

impl GraphWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> Option<&str> {
        self.graph.as_deref()
    }

    /// True when a statement of `graph` belongs to the open window.
    pub fn accepts(&self, graph: Option<&str>) -> bool {
        self.statements == 0 || self.graph.as_deref() == graph
    }

    /// Drops all buckets and opens a window for `graph`.
    pub fn reset(&mut self, graph: Option<String>) {
        self.graph = graph;
        self.interner.clear();
        self.buckets.clear();
        self.statements = 0;
    }

    pub fn push(&mut self, statement: Statement) {
        let Some(key) = statement.subject.subject_key() else {
            return;
        };
        if self.statements == 0 {
            self.graph = statement.graph;
        }
        let id = self.interner.intern(&key) as usize;
        if id == self.buckets.len() {
            self.buckets.push(SubjectBucket::default());
        }
        let bucket = &mut self.buckets[id];
        match statement.object {
            Term::Iri(type_iri) if statement.predicate == rdf::TYPE => bucket.types.push(type_iri),
            object => bucket.properties.push((statement.predicate, object)),
        }
        self.statements += 1;
    }

    pub fn len(&self) -> usize {
        self.statements
    }

    pub fn is_empty(&self) -> bool {
        self.statements == 0
    }

    pub fn subject_count(&self) -> usize {
        self.buckets.len()
    }

    /// Id of the bucket an object term refers to, if that subject is in the window.
    pub fn lookup(&self, term: &Term) -> Option<u32> {
        self.interner.get(&term.subject_key()?)
    }

    pub fn bucket(&self, id: u32) -> Option<&SubjectBucket> {
        self.buckets.get(id as usize)
    }

    pub fn label(&self, id: u32) -> Option<&str> {
        self.interner.resolve(id)
    }

    /// Bucket ids in order of first appearance.
    pub fn ids(&self) -> impl Iterator<Item = u32> {
        0..self.buckets.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(subject: &str, predicate: &str, object: Term) -> Statement {
        Statement {
            subject: Term::BlankNode(subject.into()),
            predicate: predicate.into(),
            object,
            graph: Some("https://example.ca/".into()),
        }
    }

    #[test]
    fn test_types_and_properties_are_split() {
        let mut window = GraphWindow::new();
        window.push(statement("e", rdf::TYPE, Term::Iri("http://schema.org/Event".into())));
        window.push(statement("e", "http://schema.org/name", Term::literal("Jazz")));
        window.push(statement("p", "http://schema.org/name", Term::literal("Hall")));

        assert_eq!(window.len(), 3);
        assert_eq!(window.subject_count(), 2);
        assert_eq!(window.graph(), Some("https://example.ca/"));

        let event = window.lookup(&Term::BlankNode("e".into())).unwrap();
        let bucket = window.bucket(event).unwrap();
        assert_eq!(bucket.types, vec!["http://schema.org/Event".to_string()]);
        assert_eq!(bucket.properties.len(), 1);
    }

    #[test]
    fn test_window_accepts_only_its_graph() {
        let mut window = GraphWindow::new();
        assert!(window.accepts(Some("https://a.ca/")));

        window.push(statement("e", "http://schema.org/name", Term::literal("x")));
        assert!(window.accepts(Some("https://example.ca/")));
        assert!(!window.accepts(Some("https://other.ca/")));
        assert!(!window.accepts(None));

        window.reset(Some("https://other.ca/".into()));
        assert!(window.is_empty());
        assert_eq!(window.lookup(&Term::BlankNode("e".into())), None);
    }
}
