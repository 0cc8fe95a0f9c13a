//! Validation reports.
//!
//! The matcher explains failures with [`ReportItem`]s pushed to a [`ReportSink`].
//! Reports are advisory: they never change the boolean outcome of a match.

use crate::model::ShapeLabel;
use oxrdf::{NamedNode, Term};
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Kind of a reported problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Fewer matching triples than the constraint minimum.
    MinCardinality,
    /// More matching triples than the constraint maximum.
    MaxCardinality,
    /// A triple with the constraint predicate whose value does not satisfy the value expression.
    UnmatchedValue,
    /// A triple that no branch of a conjunction can consume.
    UnplaceableTriple,
    /// A triple outside of a closed shape.
    Closed,
    /// A node constraint does not hold.
    NodeConstraint,
    /// The operand of a negation holds.
    ShapeNot,
    /// No operand of a disjunction holds.
    ShapeOr,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MinCardinality => "MinCardinality",
            Self::MaxCardinality => "MaxCardinality",
            Self::UnmatchedValue => "UnmatchedValue",
            Self::UnplaceableTriple => "UnplaceableTriple",
            Self::Closed => "Closed",
            Self::NodeConstraint => "NodeConstraint",
            Self::ShapeNot => "ShapeNot",
            Self::ShapeOr => "ShapeOr",
        })
    }
}

/// A diagnostic about a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportItem {
    /// The node being validated.
    pub focus_node: Term,
    /// The kind of problem.
    pub kind: ViolationKind,
    /// The predicate involved, if any.
    pub predicate: Option<NamedNode>,
    /// The offending value, if any.
    pub value: Option<Term>,
    /// Human-readable message.
    pub message: String,
}

impl ReportItem {
    /// Creates a new report item.
    pub fn new(focus_node: Term, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            focus_node,
            kind,
            predicate: None,
            value: None,
            message: message.into(),
        }
    }

    /// Sets the predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: NamedNode) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Sets the value.
    #[must_use]
    pub fn with_value(mut self, value: Term) -> Self {
        self.value = Some(value);
        self
    }
}

impl fmt::Display for ReportItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}: {}", self.kind, self.focus_node, self.message)?;
        if let Some(predicate) = &self.predicate {
            write!(f, " [predicate: {predicate}]")?;
        }
        if let Some(value) = &self.value {
            write!(f, " [value: {value}]")?;
        }
        Ok(())
    }
}

/// Destination of report items.
///
/// Sinks may be shared by validations running on several threads, so appending
/// goes through a shared reference.
pub trait ReportSink: Sync {
    /// Appends an item.
    fn report(&self, item: ReportItem);
}

/// A sink dropping everything.
impl ReportSink for () {
    fn report(&self, _: ReportItem) {}
}

/// Thread-safe [`ReportSink`] keeping every item in memory.
#[derive(Debug, Default)]
pub struct ReportCollector {
    items: Mutex<Vec<ReportItem>>,
}

impl ReportCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of collected items.
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the collected items.
    pub fn into_items(self) -> Vec<ReportItem> {
        self.items
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReportSink for ReportCollector {
    fn report(&self, item: ReportItem) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
    }
}

/// Outcome of validating one node against one shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeAssociation {
    /// Validated node.
    pub node: Term,
    /// Shape the node was validated against.
    pub shape: ShapeLabel,
    /// Whether the node conforms.
    pub conforms: bool,
}

/// Validation report over one or more node/shape associations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    associations: Vec<ShapeAssociation>,
    items: Vec<ReportItem>,
}

impl ValidationReport {
    /// Creates a report.
    pub fn new(associations: Vec<ShapeAssociation>, items: Vec<ReportItem>) -> Self {
        Self {
            associations,
            items,
        }
    }

    /// Returns true if every association conforms.
    pub fn conforms(&self) -> bool {
        self.associations.iter().all(|a| a.conforms)
    }

    /// Returns the per association results.
    pub fn associations(&self) -> &[ShapeAssociation] {
        &self.associations
    }

    /// Returns the diagnostics.
    pub fn items(&self) -> &[ReportItem] {
        &self.items
    }

    /// Returns the diagnostics of the given kind.
    pub fn items_of_kind(&self, kind: ViolationKind) -> impl Iterator<Item = &ReportItem> {
        self.items.iter().filter(move |item| item.kind == kind)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for association in &self.associations {
            writeln!(
                f,
                "{}@{}: {}",
                association.node,
                association.shape,
                if association.conforms {
                    "conforms"
                } else {
                    "does not conform"
                }
            )?;
        }
        for (i, item) in self.items.iter().enumerate() {
            writeln!(f, "  {}. {item}", i + 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Term {
        NamedNode::new_unchecked("http://example.org/x").into()
    }

    #[test]
    fn test_collector_is_thread_safe() {
        let collector = ReportCollector::new();
        std::thread::scope(|s| {
            for i in 0..4 {
                let collector = &collector;
                s.spawn(move || {
                    collector.report(ReportItem::new(
                        node(),
                        ViolationKind::MinCardinality,
                        format!("item {i}"),
                    ));
                });
            }
        });
        assert_eq!(collector.len(), 4);
        assert_eq!(collector.into_items().len(), 4);
    }

    #[test]
    fn test_report_conformance() {
        let shape = ShapeLabel::from(NamedNode::new_unchecked("http://example.org/S"));
        let report = ValidationReport::new(
            vec![
                ShapeAssociation {
                    node: node(),
                    shape: shape.clone(),
                    conforms: true,
                },
                ShapeAssociation {
                    node: node(),
                    shape,
                    conforms: false,
                },
            ],
            vec![ReportItem::new(node(), ViolationKind::Closed, "extra triple")],
        );
        assert!(!report.conforms());
        assert_eq!(report.items_of_kind(ViolationKind::Closed).count(), 1);
        assert_eq!(report.items_of_kind(ViolationKind::ShapeOr).count(), 0);
        assert!(ValidationReport::default().conforms());
    }

    #[test]
    fn test_item_display() {
        let item = ReportItem::new(node(), ViolationKind::MaxCardinality, "3 > 2")
            .with_predicate(NamedNode::new_unchecked("http://example.org/p"));
        assert_eq!(
            item.to_string(),
            "MaxCardinality on <http://example.org/x>: 3 > 2 [predicate: <http://example.org/p>]"
        );
    }
}
