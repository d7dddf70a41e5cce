use thiserror::Error;

use crate::core::{Statement, Term};

/// Why a line could not be read as a statement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuadParseError {
    #[error("empty line")]
    Empty,
    #[error("expected {expected} for {position}")]
    UnexpectedTerm { position: &'static str, expected: &'static str },
    #[error("unterminated IRI in {0}")]
    UnterminatedIri(&'static str),
    #[error("invalid character in IRI of {0}")]
    InvalidIri(&'static str),
    #[error("empty blank node label in {0}")]
    EmptyBlankNode(&'static str),
    #[error("unterminated literal")]
    UnterminatedLiteral,
    #[error("invalid escape sequence in literal")]
    InvalidEscape,
    #[error("missing terminating '.'")]
    MissingTerminator,
    #[error("unexpected content after the statement")]
    TrailingContent,
}

/// Parse one N-Quads (or N-Triples) line into a Statement.
///
/// Accepts:
/// - IRIs: `<http://schema.org/name>`
/// - Blank nodes: `_:b0`
/// - Literals with escapes: `"Café \"Night\""`, typed `"43.6"^^<...#double>` or tagged `"Toronto"@en`
/// - An optional graph term before the terminating `.`
pub fn parse_quad_line(line: &str) -> Result<Statement, QuadParseError> {
    let mut cursor = Cursor::new(line);
    cursor.skip_whitespace();
    if cursor.is_done() {
        return Err(QuadParseError::Empty);
    }

    let subject = cursor.parse_reference("subject")?;
    let predicate = cursor.parse_iri("predicate")?;
    let object = cursor.parse_object()?;

    cursor.skip_whitespace();
    let graph = match cursor.peek() {
        Some(b'<') => Some(cursor.parse_iri("graph")?),
        Some(b'_') => match cursor.parse_blank_node("graph")? {
            Term::BlankNode(label) => Some(format!("_:{}", label)),
            _ => None,
        },
        _ => None,
    };

    cursor.skip_whitespace();
    if cursor.peek() != Some(b'.') {
        return Err(QuadParseError::MissingTerminator);
    }
    cursor.advance(1);
    cursor.skip_whitespace();
    if !cursor.is_done() && cursor.peek() != Some(b'#') {
        return Err(QuadParseError::TrailingContent);
    }

    Ok(Statement { subject, predicate, object, graph })
}

/// Graph IRI of a quad line without parsing the rest of it.
///
/// Reads the last `<...>` term before the terminating dot. Lines without a graph
/// report their object IRI (or nothing for literal objects); callers only use
/// this to decide whether a line can be skipped.
pub fn peek_graph(line: &str) -> Option<&str> {
    let trimmed = line.trim_end();
    let trimmed = trimmed.strip_suffix('.')?.trim_end();
    let inner = trimmed.strip_suffix('>')?;
    let start = inner.rfind('<')?;
    if start == 0 || !inner.as_bytes()[start - 1].is_ascii_whitespace() {
        return None;
    }
    Some(&inner[start + 1..])
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn is_done(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn parse_reference(&mut self, position: &'static str) -> Result<Term, QuadParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(b'<') => Ok(Term::Iri(self.parse_iri(position)?)),
            Some(b'_') => self.parse_blank_node(position),
            _ => Err(QuadParseError::UnexpectedTerm { position, expected: "an IRI or blank node" }),
        }
    }

    fn parse_iri(&mut self, position: &'static str) -> Result<String, QuadParseError> {
        self.skip_whitespace();
        if self.peek() != Some(b'<') {
            return Err(QuadParseError::UnexpectedTerm { position, expected: "'<'" });
        }
        let body = &self.rest()[1..];
        let end = body.find('>').ok_or(QuadParseError::UnterminatedIri(position))?;
        let iri = &body[..end];
        if iri.bytes().any(|b| matches!(b, b' ' | b'<' | b'"' | b'\t')) {
            return Err(QuadParseError::InvalidIri(position));
        }
        self.advance(end + 2);
        Ok(iri.to_string())
    }

    fn parse_blank_node(&mut self, position: &'static str) -> Result<Term, QuadParseError> {
        if !self.rest().starts_with("_:") {
            return Err(QuadParseError::UnexpectedTerm { position, expected: "'_:'" });
        }
        let body = &self.rest()[2..];
        let mut len = body
            .find(|c: char| c.is_whitespace() || c == '<' || c == '"')
            .unwrap_or(body.len());
        // labels never end with '.', so a glued dot is the terminator
        while len > 0 && body.as_bytes()[len - 1] == b'.' {
            len -= 1;
        }
        if len == 0 {
            return Err(QuadParseError::EmptyBlankNode(position));
        }
        let label = body[..len].to_string();
        self.advance(2 + len);
        Ok(Term::BlankNode(label))
    }

    fn parse_object(&mut self) -> Result<Term, QuadParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(b'"') => self.parse_literal(),
            Some(b'<' | b'_') => self.parse_reference("object"),
            _ => Err(QuadParseError::UnexpectedTerm {
                position: "object",
                expected: "an IRI, blank node or literal",
            }),
        }
    }

    fn parse_literal(&mut self) -> Result<Term, QuadParseError> {
        self.advance(1);
        let mut value = String::new();
        let mut chars = self.rest().char_indices();
        let consumed = loop {
            let (i, c) = chars.next().ok_or(QuadParseError::UnterminatedLiteral)?;
            match c {
                '"' => break i + 1,
                '\\' => {
                    let (_, escape) = chars.next().ok_or(QuadParseError::UnterminatedLiteral)?;
                    match escape {
                        't' => value.push('\t'),
                        'b' => value.push('\u{8}'),
                        'n' => value.push('\n'),
                        'r' => value.push('\r'),
                        'f' => value.push('\u{c}'),
                        '"' => value.push('"'),
                        '\'' => value.push('\''),
                        '\\' => value.push('\\'),
                        'u' | 'U' => {
                            let width = if escape == 'u' { 4 } else { 8 };
                            let mut hex = String::with_capacity(width);
                            for _ in 0..width {
                                let (_, h) = chars.next().ok_or(QuadParseError::InvalidEscape)?;
                                hex.push(h);
                            }
                            let code = u32::from_str_radix(&hex, 16)
                                .map_err(|_| QuadParseError::InvalidEscape)?;
                            value.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                        }
                        _ => return Err(QuadParseError::InvalidEscape),
                    }
                }
                _ => value.push(c),
            }
        };
        self.advance(consumed);

        let mut datatype = None;
        let mut language = None;
        if self.rest().starts_with("^^") {
            self.advance(2);
            datatype = Some(self.parse_iri("datatype")?);
        } else if self.rest().starts_with('@') {
            self.advance(1);
            let tag_len = self
                .rest()
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
                .unwrap_or(self.rest().len());
            if tag_len == 0 {
                return Err(QuadParseError::UnexpectedTerm { position: "object", expected: "a language tag" });
            }
            language = Some(self.rest()[..tag_len].to_string());
            self.advance(tag_len);
        }

        Ok(Term::Literal { value, datatype, language })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: &str = "http://schema.org/name";

    #[test]
    fn test_parse_quad_with_blank_nodes() {
        let line = r#"_:b0 <http://schema.org/location> _:b1 <https://example.ca/e/1> ."#;
        let statement = parse_quad_line(line).unwrap();

        assert_eq!(statement.subject, Term::BlankNode("b0".into()));
        assert_eq!(statement.predicate, "http://schema.org/location");
        assert_eq!(statement.object, Term::BlankNode("b1".into()));
        assert_eq!(statement.graph.as_deref(), Some("https://example.ca/e/1"));
    }

    #[test]
    fn test_parse_escaped_literal() {
        let line = r#"_:b0 <http://schema.org/name> "Café \"Jazz\"\tNight" <https://example.ca/> ."#;
        let statement = parse_quad_line(line).unwrap();

        assert_eq!(statement.object, Term::literal("Café \"Jazz\"\tNight"));
    }

    #[test]
    fn test_parse_typed_and_tagged_literals() {
        let typed = r#"_:g <http://schema.org/latitude> "43.65"^^<http://www.w3.org/2001/XMLSchema#double> <https://a.ca/> ."#;
        match parse_quad_line(typed).unwrap().object {
            Term::Literal { value, datatype, language } => {
                assert_eq!(value, "43.65");
                assert_eq!(datatype.as_deref(), Some("http://www.w3.org/2001/XMLSchema#double"));
                assert_eq!(language, None);
            }
            other => panic!("expected literal, got {:?}", other),
        }

        let tagged = format!(r#"_:p <{}> "Toronto"@en-CA <https://a.ca/> ."#, NAME);
        match parse_quad_line(&tagged).unwrap().object {
            Term::Literal { language, .. } => assert_eq!(language.as_deref(), Some("en-CA")),
            other => panic!("expected literal, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_triple_without_graph() {
        let statement = parse_quad_line(r#"<http://a/s> <http://a/p> "v" ."#).unwrap();
        assert_eq!(statement.graph, None);
    }

    #[test]
    fn test_glued_terminator_after_blank_node() {
        let statement = parse_quad_line("<http://a/s> <http://a/p> _:b9.").unwrap();
        assert_eq!(statement.object, Term::BlankNode("b9".into()));
    }

    #[test]
    fn test_malformed_lines() {
        assert_eq!(parse_quad_line("   "), Err(QuadParseError::Empty));
        assert_eq!(
            parse_quad_line(r#"_:b0 <http://schema.org/name> "open literal <https://a.ca/> ."#),
            Err(QuadParseError::UnterminatedLiteral)
        );
        assert_eq!(
            parse_quad_line(r#"_:b0 <http://schema.org/name "x" <https://a.ca/> ."#),
            Err(QuadParseError::InvalidIri("predicate"))
        );
        assert_eq!(
            parse_quad_line(r#"_:b0 <http://schema.org/name> "x" <https://a.ca/>"#),
            Err(QuadParseError::MissingTerminator)
        );
        assert!(matches!(
            parse_quad_line(r#""lit" <http://schema.org/name> "x" ."#),
            Err(QuadParseError::UnexpectedTerm { position: "subject", .. })
        ));
        assert_eq!(
            parse_quad_line(r#"_:b0 <http://a/p> "x" <https://a.ca/> <https://b.ca/> ."#),
            Err(QuadParseError::MissingTerminator)
        );
    }

    #[test]
    fn test_peek_graph() {
        let line = r#"_:b0 <http://schema.org/name> "A > B" <https://www.example.de/page> ."#;
        assert_eq!(peek_graph(line), Some("https://www.example.de/page"));
        assert_eq!(peek_graph(r#"_:b0 <http://a/p> "x" ."#), None);
        assert_eq!(peek_graph("garbage"), None);
    }
}
