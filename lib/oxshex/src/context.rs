//! Evaluation context shared by the whole recursion of one validation.

use crate::error::{ShexError, ShexSchemaError};
use crate::graph::RelationshipSource;
use crate::index::PredicateIndex;
use crate::limits::{LimitTracker, MatchLimits};
use crate::model::{ShapeExpression, ShapeLabel, ShapesSchema, TripleExpression};
use crate::report::{ReportItem, ReportSink};
use oxrdf::{Term, Triple};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::ptr;
use std::rc::Rc;

/// Resolves [`TripleExpression::Ref`] labels.
pub trait TripleExprTable {
    /// Returns the triple expression with the given label.
    fn triple_expression(&self, label: &ShapeLabel) -> Option<&TripleExpression>;
}

impl TripleExprTable for ShapesSchema {
    fn triple_expression(&self, label: &ShapeLabel) -> Option<&TripleExpression> {
        self.get_triple_expr(label)
    }
}

/// Decides whether a node satisfies the value expression of a triple constraint.
///
/// Implementations may call back into [`validate`](crate::validate) with the same
/// context, e.g. for nested or recursive shapes.
pub trait ValueSatisfier<'a> {
    /// Returns true if `node` satisfies `value_expr`.
    fn satisfies(
        &self,
        ctx: &MatchContext<'a>,
        value_expr: &'a ShapeExpression,
        node: &Term,
    ) -> Result<bool, ShexError>;
}

/// Accepts every value. Suitable for schemas without value expressions.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyValue;

impl<'a> ValueSatisfier<'a> for AnyValue {
    fn satisfies(
        &self,
        _: &MatchContext<'a>,
        _: &'a ShapeExpression,
        _: &Term,
    ) -> Result<bool, ShexError> {
        Ok(true)
    }
}

/// Context of one top-level validation call.
///
/// Gives access to the data graph, the schema reference table, the value shape
/// collaborator and the report sink. The schema side is borrowed for the whole
/// lifetime `'a`, which allows caching one [`PredicateIndex`] per expression.
///
/// Reports emitted while exploring are buffered: they are dropped when the enclosing
/// [`validate`](crate::validate) call succeeds and forwarded to the sink by
/// [`flush_reports`](Self::flush_reports) or when the context is dropped.
pub struct MatchContext<'a> {
    graph: &'a dyn RelationshipSource,
    table: &'a dyn TripleExprTable,
    satisfier: &'a dyn ValueSatisfier<'a>,
    sink: &'a dyn ReportSink,
    limits: LimitTracker,
    indexes: RefCell<FxHashMap<*const TripleExpression, Rc<PredicateIndex>>>,
    pending: RefCell<Vec<ReportItem>>,
}

impl<'a> MatchContext<'a> {
    /// Creates a context with default [`MatchLimits`].
    pub fn new(
        graph: &'a dyn RelationshipSource,
        table: &'a dyn TripleExprTable,
        satisfier: &'a dyn ValueSatisfier<'a>,
        sink: &'a dyn ReportSink,
    ) -> Self {
        Self::with_limits(graph, table, satisfier, sink, MatchLimits::default())
    }

    /// Creates a context with the given limits.
    pub fn with_limits(
        graph: &'a dyn RelationshipSource,
        table: &'a dyn TripleExprTable,
        satisfier: &'a dyn ValueSatisfier<'a>,
        sink: &'a dyn ReportSink,
        limits: MatchLimits,
    ) -> Self {
        Self {
            graph,
            table,
            satisfier,
            sink,
            limits: LimitTracker::new(limits),
            indexes: RefCell::default(),
            pending: RefCell::default(),
        }
    }

    /// Outgoing triples of `node`.
    pub fn relationships_from(&self, node: &Term) -> Vec<Triple> {
        self.graph.relationships_from(node)
    }

    /// Incoming triples of `node`.
    pub fn relationships_to(&self, node: &Term) -> Vec<Triple> {
        self.graph.relationships_to(node)
    }

    /// The data graph.
    pub fn graph(&self) -> &'a dyn RelationshipSource {
        self.graph
    }

    /// Resolves a triple expression reference.
    pub fn resolve(&self, label: &ShapeLabel) -> Result<&'a TripleExpression, ShexSchemaError> {
        self.table
            .triple_expression(label)
            .ok_or_else(|| ShexSchemaError::undefined_triple_expr_ref(label))
    }

    /// Evaluates a value expression through the value shape collaborator.
    pub fn satisfies(&self, value_expr: &'a ShapeExpression, node: &Term) -> Result<bool, ShexError> {
        self.satisfier.satisfies(self, value_expr, node)
    }

    /// Returns the predicate index of `expression`, computing it on first use.
    pub fn index_for(
        &self,
        expression: &'a TripleExpression,
    ) -> Result<Rc<PredicateIndex>, ShexSchemaError> {
        // Keyed by address: expressions are borrowed for 'a, so an address is never reused
        let key = ptr::from_ref(expression);
        if let Some(index) = self.indexes.borrow().get(&key) {
            return Ok(Rc::clone(index));
        }
        let index = Rc::new(PredicateIndex::build(expression, self.table)?);
        self.indexes.borrow_mut().insert(key, Rc::clone(&index));
        Ok(index)
    }

    /// Buffers a report item.
    pub fn report(&self, item: ReportItem) {
        self.pending.borrow_mut().push(item);
    }

    /// Position in the report buffer, to be passed to [`discard_reports_since`](Self::discard_reports_since).
    pub fn report_mark(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Drops the reports buffered since `mark`.
    pub fn discard_reports_since(&self, mark: usize) {
        self.pending.borrow_mut().truncate(mark);
    }

    /// Forwards the buffered reports to the sink.
    pub fn flush_reports(&self) {
        for item in self.pending.borrow_mut().drain(..) {
            self.sink.report(item);
        }
    }

    pub(crate) fn enter(&self) -> Result<(), ShexError> {
        Ok(self.limits.enter()?)
    }

    pub(crate) fn exit(&self) {
        self.limits.exit();
    }

    pub(crate) fn depth(&self) -> usize {
        self.limits.depth()
    }

    pub(crate) fn record_partition(&self) -> Result<(), ShexError> {
        Ok(self.limits.record_partition()?)
    }

    /// Number of partitions and assignments tried so far.
    pub fn partitions_tried(&self) -> usize {
        self.limits.partitions()
    }
}

impl Drop for MatchContext<'_> {
    fn drop(&mut self) {
        self.flush_reports();
    }
}
