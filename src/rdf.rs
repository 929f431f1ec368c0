//! Minimal RDF term model and N-Triples style rendering, enough to express
//! `INSERT DATA` payloads and decode SPARQL JSON results.

use crate::constants::{XSD_INTEGER, XSD_STRING};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Iri(String),
    Literal {
        value: String,
        datatype: Option<String>,
    },
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    pub fn plain(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
        }
    }

    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        let datatype = datatype.into();
        // xsd:string and a plain literal are the same term in RDF 1.1
        if datatype == XSD_STRING {
            return Term::plain(value);
        }
        Term::Literal {
            value: value.into(),
            datatype: Some(datatype),
        }
    }

    pub fn integer(value: i64) -> Self {
        Term::typed(value.to_string(), XSD_INTEGER)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{}>", escape_iri(iri)),
            Term::Literal { value, datatype } => {
                write!(f, "\"{}\"", escape_literal(value))?;
                if let Some(dt) = datatype {
                    write!(f, "^^<{}>", escape_iri(dt))?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: impl Into<String>, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}> <{}> {} .",
            escape_iri(&self.subject),
            escape_iri(&self.predicate),
            self.object
        )
    }
}

fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Percent-encode the characters IRIREF forbids.
fn escape_iri(iri: &str) -> String {
    let mut out = String::with_capacity(iri.len());
    for c in iri.chars() {
        match c {
            '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\' | ' ' => {
                out.push_str(&format!("%{:02X}", c as u32))
            }
            c if (c as u32) <= 0x20 => out.push_str(&format!("%{:02X}", c as u32)),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_ntriples_lines() {
        let t = Triple::new(
            "https://example.org/res/publication-0",
            "https://schema.org/name",
            Term::plain("Say \"hi\"\nthere"),
        );
        assert_eq!(
            t.to_string(),
            r#"<https://example.org/res/publication-0> <https://schema.org/name> "Say \"hi\"\nthere" ."#
        );
    }

    #[test]
    fn integers_carry_xsd_datatype() {
        assert_eq!(
            Term::integer(2003).to_string(),
            "\"2003\"^^<http://www.w3.org/2001/XMLSchema#integer>"
        );
        assert_eq!(Term::typed("x", XSD_STRING), Term::plain("x"));
    }

    #[test]
    fn iris_escape_spaces() {
        assert_eq!(Term::iri("http://e.org/a b").to_string(), "<http://e.org/a%20b>");
    }
}
