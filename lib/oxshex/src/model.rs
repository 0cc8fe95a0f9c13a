//! ShEx schema model.
//!
//! - [`ShapeLabel`] - Identifier for shapes and labelled triple expressions
//! - [`ShapeExpression`] - Constraint on a node (boolean combinations, node constraints, shapes)
//! - [`TripleExpression`] - Constraint tree matched against the triples around a node
//! - [`TripleConstraint`] - Leaf of a triple expression
//! - [`Cardinality`] - Min/max occurrences
//! - [`ShapesSchema`] - Labelled shape and triple expressions

use crate::error::ShexSchemaError;
use oxrdf::{BlankNode, Literal, NamedNode, NamedOrBlankNode, Term};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::sync::Arc;

/// Label of a shape or of a triple expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShapeLabel {
    /// Named shape (IRI).
    Iri(NamedNode),
    /// Anonymous shape (blank node).
    BNode(BlankNode),
}

impl ShapeLabel {
    /// Creates a shape label from a named or blank node.
    pub fn from_named_or_blank(node: NamedOrBlankNode) -> Self {
        match node {
            NamedOrBlankNode::NamedNode(n) => Self::Iri(n),
            NamedOrBlankNode::BlankNode(b) => Self::BNode(b),
        }
    }

    /// Converts to a Term.
    pub fn to_term(&self) -> Term {
        match self {
            Self::Iri(n) => n.clone().into(),
            Self::BNode(b) => b.clone().into(),
        }
    }
}

impl From<NamedNode> for ShapeLabel {
    fn from(n: NamedNode) -> Self {
        Self::Iri(n)
    }
}

impl From<BlankNode> for ShapeLabel {
    fn from(b: BlankNode) -> Self {
        Self::BNode(b)
    }
}

impl fmt::Display for ShapeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri(n) => write!(f, "<{}>", n.as_str()),
            Self::BNode(b) => write!(f, "_:{}", b.as_str()),
        }
    }
}

/// Shape expression: a constraint on a single node.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeExpression {
    /// All operands must hold.
    ShapeAnd(Vec<ShapeExpression>),

    /// At least one operand must hold.
    ShapeOr(Vec<ShapeExpression>),

    /// The operand must not hold.
    ShapeNot(Box<ShapeExpression>),

    /// Constraint on the node itself.
    NodeConstraint(NodeConstraint),

    /// Constraint on the triples around the node.
    Shape(Shape),

    /// Shape defined outside of the schema. Always holds.
    ShapeExternal,

    /// Reference to a labelled shape expression.
    ShapeRef(ShapeLabel),
}

impl ShapeExpression {
    /// Collects the shape and triple expression references reachable without
    /// following references.
    pub fn collect_refs<'a>(&'a self, refs: &mut SchemaRefs<'a>) {
        match self {
            Self::ShapeAnd(operands) | Self::ShapeOr(operands) => {
                for operand in operands {
                    operand.collect_refs(refs);
                }
            }
            Self::ShapeNot(operand) => operand.collect_refs(refs),
            Self::ShapeRef(label) => refs.shapes.push(label),
            Self::Shape(shape) => shape.expression.collect_refs(refs),
            Self::NodeConstraint(_) | Self::ShapeExternal => {}
        }
    }
}

/// References found while walking a schema, see [`ShapesSchema::check_integrity`].
#[derive(Debug, Default)]
pub struct SchemaRefs<'a> {
    /// Referenced shape labels.
    pub shapes: Vec<&'a ShapeLabel>,
    /// Referenced triple expression labels.
    pub triple_exprs: Vec<&'a ShapeLabel>,
    /// All cardinalities met on the way.
    pub cardinalities: Vec<Cardinality>,
}

/// Shape: constraint on the neighbourhood of a node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Shape {
    /// Whether triples with predicates outside of the expression are forbidden.
    pub closed: bool,

    /// Predicates whose triples may be left unmatched.
    pub extra: FxHashSet<NamedNode>,

    /// Triple expression the neighbourhood must match.
    pub expression: TripleExpression,
}

impl Shape {
    /// Creates an open shape with the given triple expression.
    pub fn new(expression: impl Into<TripleExpression>) -> Self {
        Self {
            closed: false,
            extra: FxHashSet::default(),
            expression: expression.into(),
        }
    }

    /// Sets whether the shape is closed.
    #[must_use]
    pub fn with_closed(mut self, closed: bool) -> Self {
        self.closed = closed;
        self
    }

    /// Adds an `EXTRA` predicate.
    #[must_use]
    pub fn with_extra(mut self, predicate: NamedNode) -> Self {
        self.extra.insert(predicate);
        self
    }
}

/// Triple expression: the constraint tree matched against the triples of a node.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TripleExpression {
    /// Every sub-expression matches its own share of the triples.
    EachOf(Vec<TripleExpression>),

    /// One of the sub-expressions matches all the triples.
    OneOf(Vec<TripleExpression>),

    /// The sub-expression matches a number of non-empty groups of the triples.
    Repeat {
        /// Repeated expression.
        expression: Box<TripleExpression>,
        /// Number of repetitions.
        cardinality: Cardinality,
    },

    /// Leaf constraint.
    Constraint(TripleConstraint),

    /// Reference to a labelled triple expression of the schema.
    Ref(ShapeLabel),

    /// Matches without consuming anything.
    #[default]
    Empty,
}

impl TripleExpression {
    /// Builds a repetition of `expression`.
    pub fn repeat(expression: impl Into<Self>, cardinality: Cardinality) -> Self {
        Self::Repeat {
            expression: Box::new(expression.into()),
            cardinality,
        }
    }

    /// Collects references and cardinalities, without following references.
    pub fn collect_refs<'a>(&'a self, refs: &mut SchemaRefs<'a>) {
        match self {
            Self::EachOf(children) | Self::OneOf(children) => {
                for child in children {
                    child.collect_refs(refs);
                }
            }
            Self::Repeat {
                expression,
                cardinality,
            } => {
                refs.cardinalities.push(*cardinality);
                expression.collect_refs(refs);
            }
            Self::Constraint(constraint) => {
                refs.cardinalities.push(constraint.cardinality);
                if let Some(value_expr) = &constraint.value_expr {
                    value_expr.collect_refs(refs);
                }
            }
            Self::Ref(label) => refs.triple_exprs.push(label),
            Self::Empty => {}
        }
    }
}

impl From<TripleConstraint> for TripleExpression {
    fn from(constraint: TripleConstraint) -> Self {
        Self::Constraint(constraint)
    }
}

/// Leaf of a triple expression.
///
/// Matches triples with the given predicate whose other end satisfies `value_expr`.
#[derive(Debug, Clone, PartialEq)]
pub struct TripleConstraint {
    /// Predicate IRI for this constraint.
    pub predicate: NamedNode,

    /// Shape expression the values must satisfy. `None` accepts any value.
    pub value_expr: Option<Box<ShapeExpression>>,

    /// Number of matching triples.
    pub cardinality: Cardinality,

    /// Whether the focus node is the object of the triples instead of the subject.
    pub inverse: bool,
}

impl TripleConstraint {
    /// Creates a constraint matching exactly one triple with any value.
    pub fn new(predicate: NamedNode) -> Self {
        Self {
            predicate,
            value_expr: None,
            cardinality: Cardinality::default(),
            inverse: false,
        }
    }

    /// Sets the value expression.
    #[must_use]
    pub fn with_value_expr(mut self, value_expr: ShapeExpression) -> Self {
        self.value_expr = Some(Box::new(value_expr));
        self
    }

    /// Sets the cardinality.
    #[must_use]
    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    /// Sets whether this constraint is inverse.
    #[must_use]
    pub fn with_inverse(mut self, inverse: bool) -> Self {
        self.inverse = inverse;
        self
    }
}

/// Cardinality constraint (min/max occurrences).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cardinality {
    /// Minimum number of occurrences.
    pub min: u32,

    /// Maximum number of occurrences, `None` if unbounded.
    pub max: Option<u32>,
}

impl Cardinality {
    /// Creates a cardinality constraint with min and max.
    pub fn new(min: u32, max: Option<u32>) -> Result<Self, ShexSchemaError> {
        let cardinality = Self { min, max };
        cardinality.check()?;
        Ok(cardinality)
    }

    /// Creates a cardinality constraint for exactly n occurrences.
    pub fn exactly(n: u32) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    /// `?`
    pub fn optional() -> Self {
        Self {
            min: 0,
            max: Some(1),
        }
    }

    /// `*`
    pub fn zero_or_more() -> Self {
        Self { min: 0, max: None }
    }

    /// `+`
    pub fn one_or_more() -> Self {
        Self { min: 1, max: None }
    }

    /// Fails if the maximum is lower than the minimum.
    pub fn check(&self) -> Result<(), ShexSchemaError> {
        match self.max {
            Some(max) if max < self.min => {
                Err(ShexSchemaError::invalid_cardinality(self.min, self.max))
            }
            _ => Ok(()),
        }
    }

    /// Returns true if this cardinality allows the given count.
    pub fn allows(&self, count: usize) -> bool {
        count >= self.min as usize && self.max.is_none_or(|max| count <= max as usize)
    }

    /// Returns true if the count is above the maximum.
    pub fn is_exceeded_by(&self, count: usize) -> bool {
        self.max.is_some_and(|max| count > max as usize)
    }

    /// Returns true if this is the default cardinality (exactly 1).
    pub fn is_default(&self) -> bool {
        self.min == 1 && self.max == Some(1)
    }
}

impl Default for Cardinality {
    fn default() -> Self {
        Self::exactly(1)
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (0, None) => write!(f, "*"),
            (1, None) => write!(f, "+"),
            (0, Some(1)) => write!(f, "?"),
            (min, None) => write!(f, "{{{min},}}"),
            (min, Some(max)) if min == max => write!(f, "{{{min}}}"),
            (min, Some(max)) => write!(f, "{{{min},{max}}}"),
        }
    }
}

/// Node constraint: constraint on the node itself.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeConstraint {
    /// Required node kind.
    pub node_kind: Option<NodeKind>,

    /// Required datatype for literals.
    pub datatype: Option<NamedNode>,

    /// String facets (length, pattern).
    pub string_facets: Vec<StringFacet>,

    /// Numeric facets.
    pub numeric_facets: Vec<NumericFacet>,

    /// Allowed values. Empty means any value.
    pub values: Vec<ValueSetValue>,
}

impl NodeConstraint {
    /// Creates a node constraint with the given node kind.
    pub fn with_node_kind(node_kind: NodeKind) -> Self {
        Self {
            node_kind: Some(node_kind),
            ..Self::default()
        }
    }

    /// Creates a node constraint with the given datatype.
    pub fn with_datatype(datatype: NamedNode) -> Self {
        Self {
            datatype: Some(datatype),
            ..Self::default()
        }
    }

    /// Creates a node constraint accepting only the given values.
    pub fn with_values(values: impl IntoIterator<Item = ValueSetValue>) -> Self {
        Self {
            values: values.into_iter().collect(),
            ..Self::default()
        }
    }
}

/// Node kind constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// IRI node.
    Iri,
    /// Blank node.
    BNode,
    /// Literal value.
    Literal,
    /// IRI or blank node.
    NonLiteral,
}

impl NodeKind {
    /// Returns true if the given term matches this node kind.
    pub fn matches(&self, term: &Term) -> bool {
        match self {
            Self::Iri => matches!(term, Term::NamedNode(_)),
            Self::BNode => matches!(term, Term::BlankNode(_)),
            Self::Literal => matches!(term, Term::Literal(_)),
            Self::NonLiteral => matches!(term, Term::NamedNode(_) | Term::BlankNode(_)),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri => write!(f, "IRI"),
            Self::BNode => write!(f, "BNODE"),
            Self::Literal => write!(f, "LITERAL"),
            Self::NonLiteral => write!(f, "NONLITERAL"),
        }
    }
}

/// String facet constraint (length, pattern).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringFacet {
    /// Exact string length.
    Length(usize),
    /// Minimum string length.
    MinLength(usize),
    /// Maximum string length.
    MaxLength(usize),
    /// Regular expression pattern.
    Pattern {
        /// Regex pattern.
        pattern: String,
        /// Regex flags among `i`, `m`, `s` and `x`.
        flags: Option<String>,
    },
}

/// Numeric facet constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericFacet {
    /// Minimum inclusive value.
    MinInclusive(Literal),
    /// Minimum exclusive value.
    MinExclusive(Literal),
    /// Maximum inclusive value.
    MaxInclusive(Literal),
    /// Maximum exclusive value.
    MaxExclusive(Literal),
    /// Maximum total number of digits.
    TotalDigits(u32),
    /// Maximum number of fractional digits.
    FractionDigits(u32),
}

/// Value in a value set constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueSetValue {
    /// Exact RDF term.
    ObjectValue(Term),

    /// IRI prefix.
    IriStem(String),

    /// IRI prefix with exclusions.
    IriStemRange {
        /// Base stem to match.
        stem: String,
        /// Values to exclude.
        exclusions: Vec<ValueSetValue>,
    },

    /// Literal lexical form prefix.
    LiteralStem(String),

    /// Literal lexical form prefix with exclusions.
    LiteralStemRange {
        /// Base stem to match.
        stem: String,
        /// Values to exclude.
        exclusions: Vec<ValueSetValue>,
    },

    /// Language tag prefix.
    LanguageStem(String),

    /// Language tag prefix with exclusions.
    LanguageStemRange {
        /// Base stem to match.
        stem: String,
        /// Values to exclude.
        exclusions: Vec<ValueSetValue>,
    },
}

impl ValueSetValue {
    /// Creates an IRI stem value.
    pub fn iri_stem(stem: impl Into<String>) -> Self {
        Self::IriStem(stem.into())
    }

    /// Creates a literal stem value.
    pub fn literal_stem(stem: impl Into<String>) -> Self {
        Self::LiteralStem(stem.into())
    }

    /// Creates a language stem value.
    pub fn language_stem(stem: impl Into<String>) -> Self {
        Self::LanguageStem(stem.into())
    }
}

/// Shapes schema: labelled shape expressions and labelled triple expressions.
///
/// Schemas are immutable once built and can be shared between threads.
#[derive(Debug, Clone, Default)]
pub struct ShapesSchema {
    shapes: FxHashMap<ShapeLabel, Arc<ShapeExpression>>,
    triple_exprs: FxHashMap<ShapeLabel, Arc<TripleExpression>>,
    start: Option<ShapeLabel>,
    /// Insertion order of `shapes`.
    all_labels: Vec<ShapeLabel>,
}

impl ShapesSchema {
    /// Creates a new empty shapes schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a shape expression with the given label.
    pub fn add_shape(&mut self, label: ShapeLabel, expr: ShapeExpression) {
        if !self.shapes.contains_key(&label) {
            self.all_labels.push(label.clone());
        }
        self.shapes.insert(label, Arc::new(expr));
    }

    /// Adds a labelled triple expression, target of [`TripleExpression::Ref`].
    pub fn add_triple_expr(&mut self, label: ShapeLabel, expr: TripleExpression) {
        self.triple_exprs.insert(label, Arc::new(expr));
    }

    /// Gets a shape expression by label.
    pub fn get_shape(&self, label: &ShapeLabel) -> Option<&ShapeExpression> {
        self.shapes.get(label).map(AsRef::as_ref)
    }

    /// Gets a labelled triple expression.
    pub fn get_triple_expr(&self, label: &ShapeLabel) -> Option<&TripleExpression> {
        self.triple_exprs.get(label).map(AsRef::as_ref)
    }

    /// Returns the shape labels in insertion order.
    pub fn labels(&self) -> impl Iterator<Item = &ShapeLabel> {
        self.all_labels.iter()
    }

    /// Sets the start shape.
    pub fn set_start(&mut self, label: ShapeLabel) {
        self.start = Some(label);
    }

    /// Gets the start shape label.
    pub fn start(&self) -> Option<&ShapeLabel> {
        self.start.as_ref()
    }

    /// Returns true if the schema has no shape.
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Returns the number of shapes.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Checks that every reference resolves and every cardinality is well-formed.
    ///
    /// The matcher performs the same checks lazily, this allows to reject a broken
    /// schema before validating anything.
    pub fn check_integrity(&self) -> Result<(), ShexSchemaError> {
        let mut refs = SchemaRefs::default();
        for expr in self.shapes.values() {
            expr.collect_refs(&mut refs);
        }
        for expr in self.triple_exprs.values() {
            expr.collect_refs(&mut refs);
        }
        if let Some(start) = &self.start {
            refs.shapes.push(start);
        }
        if let Some(label) = refs
            .shapes
            .iter()
            .find(|label| !self.shapes.contains_key(**label))
        {
            return Err(ShexSchemaError::undefined_shape_ref(label));
        }
        if let Some(label) = refs
            .triple_exprs
            .iter()
            .find(|label| !self.triple_exprs.contains_key(**label))
        {
            return Err(ShexSchemaError::undefined_triple_expr_ref(label));
        }
        refs.cardinalities.iter().try_for_each(Cardinality::check)
    }
}
