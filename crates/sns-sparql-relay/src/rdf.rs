// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RDF terms and the SPARQL `INSERT DATA` writer.
//!
//! Domain triples are checked against RDF 1.1 (absolute IRIs, valid
//! datatypes) by lowering them to [`oxrdf`] terms, whose N-Triples
//! rendering is also the update body:
//! ```text
//! INSERT DATA {
//! <subject> <predicate> "literal"^^<datatype> .
//! <subject> <predicate> <iri> .
//! }
//! ```

use oxrdf::{Literal, NamedNode};
use thiserror::Error;

/// `rdf:type` predicate.
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// Prefixes expanded when they appear in a datatype tag.
const WELL_KNOWN_PREFIXES: &[(&str, &str)] = &[
    ("xsd:", "http://www.w3.org/2001/XMLSchema#"),
    ("rdf:", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs:", "http://www.w3.org/2000/01/rdf-schema#"),
];

/// Characters percent-encoded when a raw value becomes part of an IRI.
const IRI_RESERVED: &[char] = &['<', '>', '"', '{', '}', '|', '^', '`', '\\', '#', '%'];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RdfError {
    #[error("invalid IRI {iri:?}: {reason}")]
    Iri { iri: String, reason: String },

    #[error("unknown datatype {0:?} (use xsd:, rdf:, rdfs: or an absolute IRI)")]
    Datatype(String),
}

/// Object position of a triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// A URI reference.
    Iri(String),
    /// A literal with an optional datatype tag.
    Literal {
        value: String,
        datatype: Option<String>,
    },
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri(value.into())
    }

    /// Plain string literal without a datatype.
    pub fn plain(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
        }
    }

    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: Some(datatype.into()),
        }
    }

    pub fn to_oxrdf(&self) -> Result<oxrdf::Term, RdfError> {
        Ok(match self {
            Term::Iri(iri) => named_node(iri)?.into(),
            Term::Literal {
                value,
                datatype: None,
            } => Literal::new_simple_literal(value.as_str()).into(),
            Term::Literal {
                value,
                datatype: Some(dt),
            } => Literal::new_typed_literal(value.as_str(), datatype_node(dt)?).into(),
        })
    }
}

/// An RDF statement. Subject and predicate are always IRIs.
#[derive(Debug, Clone, PartialEq, Eq)]
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

    pub fn to_oxrdf(&self) -> Result<oxrdf::Triple, RdfError> {
        Ok(oxrdf::Triple::new(
            named_node(&self.subject)?,
            named_node(&self.predicate)?,
            self.object.to_oxrdf()?,
        ))
    }
}

/// Accumulates triples and renders them as a single `INSERT DATA` update.
pub struct UpdateWriter {
    triples: Vec<oxrdf::Triple>,
}

impl UpdateWriter {
    pub fn new() -> Self {
        Self {
            triples: Vec::new(),
        }
    }

    /// Queue a triple. Nothing is queued when a term is not valid RDF.
    pub fn add_triple(&mut self, triple: &Triple) -> Result<(), RdfError> {
        self.triples.push(triple.to_oxrdf()?);
        Ok(())
    }

    /// Render the accumulated triples, leaving the writer empty.
    pub fn finish(&mut self) -> String {
        let mut out = String::from("INSERT DATA {\n");
        for triple in std::mem::take(&mut self.triples) {
            out.push_str(&format!("{} .\n", triple));
        }
        out.push('}');
        out
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }
}

impl Default for UpdateWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a batch of triples as one `INSERT DATA` statement.
///
/// Fails without output if any triple is not valid RDF.
pub fn insert_data(triples: &[Triple]) -> Result<String, RdfError> {
    let mut writer = UpdateWriter::new();
    for triple in triples {
        writer.add_triple(triple)?;
    }
    Ok(writer.finish())
}

/// Parse an absolute IRI.
pub fn named_node(iri: &str) -> Result<NamedNode, RdfError> {
    NamedNode::new(iri).map_err(|e| RdfError::Iri {
        iri: iri.to_string(),
        reason: e.to_string(),
    })
}

/// Resolve a configured datatype tag to its IRI.
///
/// `xsd:`, `rdf:` and `rdfs:` names are expanded; anything else must be an
/// absolute `scheme://` IRI.
pub fn datatype_node(datatype: &str) -> Result<NamedNode, RdfError> {
    for (prefix, namespace) in WELL_KNOWN_PREFIXES {
        if let Some(local) = datatype.strip_prefix(prefix) {
            return named_node(&format!("{}{}", namespace, local));
        }
    }
    if datatype.contains("://") {
        named_node(datatype)
    } else {
        Err(RdfError::Datatype(datatype.to_string()))
    }
}

/// Percent-encode characters that cannot appear verbatim in an IRI
/// segment (delimiters, whitespace, controls).
pub fn encode_iri_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if (c as u32) <= 0x20 || c == '\u{7f}' || IRI_RESERVED.contains(&c) {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        } else {
            out.push(c);
        }
    }
    out
}
