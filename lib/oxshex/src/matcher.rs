//! Triple expression matching.
//!
//! [`validate`] selects the outgoing triples of a node that the expression may consume
//! and asks [`matches`] whether some split of them satisfies the expression. Each
//! evaluator is a backtracking search: conjunctions try every placement of the triples
//! among their children, repetitions every partition into the allowed number of groups.

use crate::context::MatchContext;
use crate::error::ShexError;
use crate::graph::select_candidates;
use crate::index::PredicateIndex;
use crate::model::{Cardinality, TripleConstraint, TripleExpression};
use crate::partition::{Assignments, set_partitions};
use crate::report::{ReportItem, ViolationKind};
use oxrdf::{NamedNode, Term, Triple};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

/// Validates `node` against `expression`.
///
/// If `closed` is set, every outgoing triple of `node` must also have a predicate the
/// expression may consume or one listed in `extras`.
///
/// Returns `Ok(false)` when the node does not conform, with explanations pushed to the
/// context report buffer. Errors are reserved for broken schemas and exceeded limits.
///
/// ```
/// use oxrdf::{Graph, NamedNode, Triple};
/// use oxshex::{AnyValue, Cardinality, MatchContext, ShapesSchema, TripleConstraint, TripleExpression};
/// use rustc_hash::FxHashSet;
///
/// let ex = |name: &str| NamedNode::new_unchecked(format!("http://example.org/{name}"));
/// let mut graph = Graph::new();
/// for employee in ["a", "b", "c"] {
///     graph.insert(&Triple::new(ex("n"), ex("hasEmployee"), ex(employee)));
/// }
/// let expression = TripleExpression::from(
///     TripleConstraint::new(ex("hasEmployee")).with_cardinality(Cardinality::new(2, Some(3))?),
/// );
///
/// let schema = ShapesSchema::new();
/// let ctx = MatchContext::new(&graph, &schema, &AnyValue, &());
/// assert!(oxshex::validate(&ctx, &expression, &ex("n").into(), &FxHashSet::default(), true)?);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub fn validate<'a>(
    ctx: &MatchContext<'a>,
    expression: &'a TripleExpression,
    node: &Term,
    extras: &FxHashSet<NamedNode>,
    closed: bool,
) -> Result<bool, ShexError> {
    debug!(%node, closed, "validating node");
    let mark = ctx.report_mark();
    let index = ctx.index_for(expression)?;
    let candidates = select_candidates(ctx.graph(), node, &index);
    let candidates = candidates.iter().collect::<Vec<_>>();
    let mut conforms = matches(ctx, &candidates, node, expression, extras)?;
    if conforms && closed {
        conforms = check_closed(ctx, node, &index, extras);
    }
    if conforms {
        ctx.discard_reports_since(mark);
    }
    debug!(
        %node,
        conforms,
        candidates = candidates.len(),
        partitions = ctx.partitions_tried(),
        "validated node"
    );
    Ok(conforms)
}

/// Returns true if `candidates` can be consumed by `expression`.
///
/// Every candidate must be consumed: a triple that no part of the expression accepts
/// makes the match fail.
pub fn matches<'a>(
    ctx: &MatchContext<'a>,
    candidates: &[&Triple],
    node: &Term,
    expression: &'a TripleExpression,
    extras: &FxHashSet<NamedNode>,
) -> Result<bool, ShexError> {
    ctx.enter()?;
    let mark = ctx.report_mark();
    let result = dispatch(ctx, candidates, node, expression, extras);
    ctx.exit();
    if matches!(result, Ok(true)) {
        // Failures of explored branches do not explain a success
        ctx.discard_reports_since(mark);
    }
    result
}

fn dispatch<'a>(
    ctx: &MatchContext<'a>,
    candidates: &[&Triple],
    node: &Term,
    expression: &'a TripleExpression,
    extras: &FxHashSet<NamedNode>,
) -> Result<bool, ShexError> {
    match expression {
        TripleExpression::EachOf(children) => match_each_of(ctx, candidates, node, children, extras),
        TripleExpression::OneOf(alternatives) => {
            match_one_of(ctx, candidates, node, alternatives, extras)
        }
        TripleExpression::Repeat {
            expression,
            cardinality,
        } => {
            cardinality.check()?;
            if cardinality.is_default() {
                matches(ctx, candidates, node, expression, extras)
            } else if cardinality.min == 0 && candidates.is_empty() {
                Ok(true)
            } else {
                match_repeat(ctx, candidates, node, expression, *cardinality, extras)
            }
        }
        TripleExpression::Constraint(constraint) => {
            match_constraint(ctx, candidates, node, constraint, extras)
        }
        TripleExpression::Ref(label) => {
            let target = ctx.resolve(label)?;
            matches(ctx, candidates, node, target, extras)
        }
        TripleExpression::Empty => Ok(candidates.is_empty()),
    }
}

fn match_each_of<'a>(
    ctx: &MatchContext<'a>,
    candidates: &[&Triple],
    node: &Term,
    children: &'a [TripleExpression],
    extras: &FxHashSet<NamedNode>,
) -> Result<bool, ShexError> {
    let indexes = children
        .iter()
        .map(|child| ctx.index_for(child))
        .collect::<Result<Vec<_>, _>>()?;
    let mut choices = Vec::with_capacity(candidates.len());
    for triple in candidates {
        let legal = indexes
            .iter()
            .enumerate()
            .filter(|(_, index)| index.accepts_forward(&triple.predicate))
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        if legal.is_empty() {
            trace!(%triple, "triple is accepted by no branch of the conjunction");
            ctx.report(
                ReportItem::new(
                    node.clone(),
                    ViolationKind::UnplaceableTriple,
                    "no part of the expression accepts this triple",
                )
                .with_predicate(triple.predicate.clone())
                .with_value(triple.object.clone()),
            );
            return Ok(false);
        }
        choices.push(legal);
    }

    let mut explanation = Explanation::new(ctx);
    for groups in Assignments::new(candidates, &choices, children.len()) {
        ctx.record_partition()?;
        if all_match(ctx, children.iter().zip(&groups), node, extras)? {
            return Ok(true);
        }
        explanation.attempt_failed();
    }
    trace!(%node, "no placement satisfies the conjunction");
    Ok(false)
}

fn match_one_of<'a>(
    ctx: &MatchContext<'a>,
    candidates: &[&Triple],
    node: &Term,
    alternatives: &'a [TripleExpression],
    extras: &FxHashSet<NamedNode>,
) -> Result<bool, ShexError> {
    let mut explanation = Explanation::new(ctx);
    for alternative in alternatives {
        if matches(ctx, candidates, node, alternative, extras)? {
            return Ok(true);
        }
        explanation.attempt_failed();
    }
    Ok(false)
}

fn match_repeat<'a>(
    ctx: &MatchContext<'a>,
    candidates: &[&Triple],
    node: &Term,
    target: &'a TripleExpression,
    cardinality: Cardinality,
    extras: &FxHashSet<NamedNode>,
) -> Result<bool, ShexError> {
    // A partition into more groups than items is empty
    let lower = usize::try_from(cardinality.min.max(1)).unwrap_or(usize::MAX);
    let upper = cardinality
        .max
        .map_or(candidates.len(), |max| {
            usize::try_from(max).unwrap_or(usize::MAX)
        })
        .min(candidates.len());
    let mut explanation = Explanation::new(ctx);
    for k in lower..=upper {
        for partition in set_partitions(candidates, k) {
            ctx.record_partition()?;
            if all_match(
                ctx,
                partition.iter().map(|group| (target, group)),
                node,
                extras,
            )? {
                return Ok(true);
            }
            explanation.attempt_failed();
        }
    }
    trace!(%node, %cardinality, candidates = candidates.len(), "repetition exhausted");
    Ok(false)
}

/// Returns true if every group is consumed by its expression, stopping at the first failure.
fn all_match<'a, 'g, 't: 'g>(
    ctx: &MatchContext<'a>,
    pairs: impl IntoIterator<Item = (&'a TripleExpression, &'g Vec<&'t Triple>)>,
    node: &Term,
    extras: &FxHashSet<NamedNode>,
) -> Result<bool, ShexError> {
    for (expression, group) in pairs {
        if !matches(ctx, group, node, expression, extras)? {
            trace!(%node, size = group.len(), depth = ctx.depth(), "group rejected");
            return Ok(false);
        }
    }
    Ok(true)
}

fn match_constraint<'a>(
    ctx: &MatchContext<'a>,
    candidates: &[&Triple],
    node: &Term,
    constraint: &'a TripleConstraint,
    extras: &FxHashSet<NamedNode>,
) -> Result<bool, ShexError> {
    let cardinality = constraint.cardinality;
    cardinality.check()?;
    let predicate = &constraint.predicate;

    // (triple, value) pairs, the value being the far end from `node`
    let arcs = if constraint.inverse {
        if let Some(other) = candidates.first() {
            trace!(
                %predicate,
                other = %other.predicate,
                "inverse constraint given outgoing triples"
            );
            return Ok(false);
        }
        ctx.relationships_to(node)
            .into_iter()
            .filter(|t| t.predicate == *predicate)
            .map(|t| Term::from(t.subject))
            .collect::<Vec<_>>()
    } else {
        if let Some(other) = candidates.iter().find(|t| t.predicate != *predicate) {
            trace!(%predicate, other = %other.predicate, "group holds a foreign predicate");
            return Ok(false);
        }
        candidates.iter().map(|t| t.object.clone()).collect()
    };

    let mut positive = 0;
    let mut negative = Vec::new();
    for value in arcs {
        let satisfied = match constraint.value_expr.as_deref() {
            Some(value_expr) => ctx.satisfies(value_expr, &value)?,
            None => true,
        };
        if satisfied {
            positive += 1;
        } else {
            negative.push(value);
        }
    }

    if positive < cardinality.min as usize {
        ctx.report(
            ReportItem::new(
                node.clone(),
                ViolationKind::MinCardinality,
                format!(
                    "{positive} matching value(s) where at least {} are required",
                    cardinality.min
                ),
            )
            .with_predicate(predicate.clone()),
        );
        return Ok(false);
    }
    if !extras.contains(predicate) && !negative.is_empty() {
        for value in negative {
            ctx.report(
                ReportItem::new(
                    node.clone(),
                    ViolationKind::UnmatchedValue,
                    "value does not satisfy the value expression",
                )
                .with_predicate(predicate.clone())
                .with_value(value),
            );
        }
        return Ok(false);
    }
    if cardinality.is_exceeded_by(positive) {
        ctx.report(
            ReportItem::new(
                node.clone(),
                ViolationKind::MaxCardinality,
                format!("{positive} matching value(s) outside of the cardinality {cardinality}"),
            )
            .with_predicate(predicate.clone()),
        );
        return Ok(false);
    }
    Ok(true)
}

/// Checks that every outgoing triple of `node` may be consumed by the expression
/// indexed by `index` or has a predicate in `extras`.
///
/// Reports every offending triple.
pub fn check_closed(
    ctx: &MatchContext<'_>,
    node: &Term,
    index: &PredicateIndex,
    extras: &FxHashSet<NamedNode>,
) -> bool {
    let mut closed = true;
    for triple in ctx.relationships_from(node) {
        if !index.accepts_forward(&triple.predicate) && !extras.contains(&triple.predicate) {
            ctx.report(
                ReportItem::new(
                    node.clone(),
                    ViolationKind::Closed,
                    "predicate not allowed by the closed shape",
                )
                .with_predicate(triple.predicate)
                .with_value(triple.object),
            );
            closed = false;
        }
    }
    closed
}

/// Keeps the reports of the first failed attempt of a search and drops the others.
struct Explanation<'c, 'a> {
    ctx: &'c MatchContext<'a>,
    mark: usize,
    kept: bool,
}

impl<'c, 'a> Explanation<'c, 'a> {
    fn new(ctx: &'c MatchContext<'a>) -> Self {
        Self {
            ctx,
            mark: ctx.report_mark(),
            kept: false,
        }
    }

    fn attempt_failed(&mut self) {
        if self.kept {
            self.ctx.discard_reports_since(self.mark);
        } else {
            self.kept = true;
            self.mark = self.ctx.report_mark();
        }
    }
}
