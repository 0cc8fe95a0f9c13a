//! Predicate index of a triple expression.

use crate::context::TripleExprTable;
use crate::error::ShexSchemaError;
use crate::model::{ShapeLabel, TripleExpression};
use oxrdf::NamedNode;
use rustc_hash::FxHashMap;

/// Position of a [`TripleConstraint`](crate::TripleConstraint) inside a triple expression.
///
/// The same constraint may be reached through several references, so leaves are
/// identified by the path leading to them rather than by the constraint itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeafPosition {
    path: Vec<usize>,
    inverse: bool,
}

impl LeafPosition {
    /// Child indexes from the root to the leaf. Repetitions and references count as
    /// a single child with index 0.
    pub fn path(&self) -> &[usize] {
        &self.path
    }

    /// Whether the leaf matches triples pointing to the focus node.
    pub fn is_inverse(&self) -> bool {
        self.inverse
    }
}

/// Maps every predicate a triple expression can consume to the leaves accepting it.
///
/// Building is pure and schemas are immutable, so an index can be computed once and
/// shared between threads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredicateIndex {
    entries: FxHashMap<NamedNode, Vec<LeafPosition>>,
}

impl PredicateIndex {
    /// Indexes `expression`, following references through `table`.
    ///
    /// Fails as soon as a reference has no target.
    pub fn build(
        expression: &TripleExpression,
        table: &(impl TripleExprTable + ?Sized),
    ) -> Result<Self, ShexSchemaError> {
        let mut builder = IndexBuilder {
            table,
            path: Vec::new(),
            in_progress: Vec::new(),
            entries: FxHashMap::default(),
        };
        builder.visit(expression)?;
        Ok(Self {
            entries: builder.entries,
        })
    }

    /// Leaves accepting the predicate.
    pub fn positions(&self, predicate: &NamedNode) -> &[LeafPosition] {
        self.entries.get(predicate).map_or(&[][..], Vec::as_slice)
    }

    /// Returns true if some leaf, in any direction, accepts the predicate.
    pub fn contains(&self, predicate: &NamedNode) -> bool {
        self.entries.contains_key(predicate)
    }

    /// Returns true if some forward leaf accepts the predicate, i.e. an outgoing triple
    /// with this predicate may be consumed.
    pub fn accepts_forward(&self, predicate: &NamedNode) -> bool {
        self.positions(predicate).iter().any(|p| !p.inverse)
    }

    /// All indexed predicates.
    pub fn predicates(&self) -> impl Iterator<Item = &NamedNode> {
        self.entries.keys()
    }

    /// Number of indexed predicates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the expression contains no leaf.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct IndexBuilder<'a, T: ?Sized> {
    table: &'a T,
    path: Vec<usize>,
    /// References being expanded, to stop on cycles.
    in_progress: Vec<&'a ShapeLabel>,
    entries: FxHashMap<NamedNode, Vec<LeafPosition>>,
}

impl<'a, T: TripleExprTable + ?Sized> IndexBuilder<'a, T> {
    fn visit(&mut self, expression: &'a TripleExpression) -> Result<(), ShexSchemaError> {
        match expression {
            TripleExpression::EachOf(children) | TripleExpression::OneOf(children) => {
                for (i, child) in children.iter().enumerate() {
                    self.visit_child(i, child)?;
                }
            }
            TripleExpression::Repeat { expression, .. } => self.visit_child(0, expression)?,
            TripleExpression::Constraint(constraint) => {
                self.entries
                    .entry(constraint.predicate.clone())
                    .or_default()
                    .push(LeafPosition {
                        path: self.path.clone(),
                        inverse: constraint.inverse,
                    });
            }
            TripleExpression::Ref(label) => {
                let table = self.table;
                let target = table
                    .triple_expression(label)
                    .ok_or_else(|| ShexSchemaError::undefined_triple_expr_ref(label))?;
                // A cycle adds no new predicate
                if !self.in_progress.contains(&label) {
                    self.in_progress.push(label);
                    self.visit_child(0, target)?;
                    self.in_progress.pop();
                }
            }
            TripleExpression::Empty => {}
        }
        Ok(())
    }

    fn visit_child(
        &mut self,
        i: usize,
        child: &'a TripleExpression,
    ) -> Result<(), ShexSchemaError> {
        self.path.push(i);
        let result = self.visit(child);
        self.path.pop();
        result
    }
}
