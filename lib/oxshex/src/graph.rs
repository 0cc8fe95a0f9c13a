//! Access to the data graph.
//!
//! To validate your own graph storage, implement [`RelationshipSource`].

use crate::index::PredicateIndex;
use oxrdf::{Graph, Term, Triple, TripleRef};

/// Read access to the triples around a node.
///
/// No ordering is required: results are treated as unordered multisets.
pub trait RelationshipSource {
    /// Returns the triples whose subject is `node`.
    fn relationships_from(&self, node: &Term) -> Vec<Triple>;

    /// Returns the triples whose object is `node`.
    fn relationships_to(&self, node: &Term) -> Vec<Triple>;
}

impl RelationshipSource for Graph {
    fn relationships_from(&self, node: &Term) -> Vec<Triple> {
        match node {
            Term::NamedNode(n) => self
                .triples_for_subject(n)
                .map(TripleRef::into_owned)
                .collect(),
            Term::BlankNode(b) => self
                .triples_for_subject(b)
                .map(TripleRef::into_owned)
                .collect(),
            // Literals are never subjects
            _ => Vec::new(),
        }
    }

    fn relationships_to(&self, node: &Term) -> Vec<Triple> {
        self.triples_for_object(node)
            .map(TripleRef::into_owned)
            .collect()
    }
}

impl<T: RelationshipSource + ?Sized> RelationshipSource for &T {
    fn relationships_from(&self, node: &Term) -> Vec<Triple> {
        (**self).relationships_from(node)
    }

    fn relationships_to(&self, node: &Term) -> Vec<Triple> {
        (**self).relationships_to(node)
    }
}

/// Selects the outgoing triples of `node` that some forward leaf of `index` may consume.
///
/// Triples with other predicates can never be matched, dropping them bounds the
/// partition search before it starts.
pub fn select_candidates(
    source: &(impl RelationshipSource + ?Sized),
    node: &Term,
    index: &PredicateIndex,
) -> Vec<Triple> {
    let mut candidates = source.relationships_from(node);
    candidates.retain(|t| index.accepts_forward(&t.predicate));
    candidates
}
