//! ShEx (Shape Expressions) triple expression matching for RDF graphs.
//!
//! A [ShEx](https://shex.io/) shape constrains the triples around a node with a
//! [`TripleExpression`]: conjunctions ([`EachOf`](TripleExpression::EachOf)),
//! disjunctions ([`OneOf`](TripleExpression::OneOf)), repetitions and
//! [`TripleConstraint`] leaves with cardinalities. Deciding whether a node matches is a
//! search: the node triples have to be split between the parts of the expression so
//! that every part holds.
//!
//! # Core Concepts
//!
//! - **Schema**: labelled shape and triple expressions ([`ShapesSchema`])
//! - **Matching**: [`validate`] a node against a triple expression through a [`MatchContext`]
//! - **Shapes**: validate nodes against labelled shapes with [`ShexValidator`]
//! - **Report**: explanations of non-conformance ([`ValidationReport`], [`ReportItem`])
//! - **Limits**: bound the search with [`MatchLimits`]
//!
//! # Quick Start
//!
//! ```
//! use oxrdf::{Graph, NamedNode, Triple};
//! use oxshex::{
//!     Cardinality, Shape, ShapeExpression, ShapeLabel, ShapesSchema, ShexValidator,
//!     TripleConstraint, ViolationKind,
//! };
//!
//! let ex = |name: &str| NamedNode::new_unchecked(format!("http://example.org/{name}"));
//!
//! // <Team> { ex:member . {2} }
//! let mut schema = ShapesSchema::new();
//! schema.add_shape(
//!     ShapeLabel::from(ex("Team")),
//!     ShapeExpression::Shape(Shape::new(
//!         TripleConstraint::new(ex("member")).with_cardinality(Cardinality::exactly(2)),
//!     )),
//! );
//!
//! let mut graph = Graph::new();
//! for member in ["alice", "bob", "carol"] {
//!     graph.insert(&Triple::new(ex("team"), ex("member"), ex(member)));
//! }
//!
//! let validator = ShexValidator::new(schema);
//! let report = validator.validate_node(&graph, &ex("team").into(), &ShapeLabel::from(ex("Team")))?;
//! assert!(!report.conforms());
//! assert_eq!(report.items_of_kind(ViolationKind::MaxCardinality).count(), 1);
//! # Result::<_, Box<dyn std::error::Error>>::Ok(())
//! ```
//!
//! # Custom graphs and value checks
//!
//! The matcher reads the data through [`RelationshipSource`], implemented for
//! [`oxrdf::Graph`], and delegates value expressions to a [`ValueSatisfier`].
//! [`ShexValidator`] is the full ShEx satisfier, [`AnyValue`] accepts everything.

#![doc(test(attr(deny(warnings))))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc(html_favicon_url = "https://raw.githubusercontent.com/oxigraph/oxigraph/main/logo.svg")]
#![doc(html_logo_url = "https://raw.githubusercontent.com/oxigraph/oxigraph/main/logo.svg")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod context;
mod error;
mod graph;
mod index;
mod limits;
mod matcher;
mod model;
mod partition;
mod report;
mod validator;

#[cfg(test)]
mod tests;

pub use context::{AnyValue, MatchContext, TripleExprTable, ValueSatisfier};
pub use error::{ShexError, ShexSchemaError, ShexValidationError};
pub use graph::{RelationshipSource, select_candidates};
pub use index::{LeafPosition, PredicateIndex};
pub use limits::MatchLimits;
pub use matcher::{check_closed, matches, validate};
pub use model::{
    Cardinality, NodeConstraint, NodeKind, NumericFacet, SchemaRefs, Shape, ShapeExpression,
    ShapeLabel, ShapesSchema, StringFacet, TripleConstraint, TripleExpression, ValueSetValue,
};
pub use report::{
    ReportCollector, ReportItem, ReportSink, ShapeAssociation, ValidationReport, ViolationKind,
};
pub use validator::ShexValidator;
