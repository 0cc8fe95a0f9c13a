//! Shape expression satisfaction.
//!
//! [`ShexValidator`] validates nodes against the labelled shapes of a [`ShapesSchema`].
//! Shapes are delegated to the triple expression matcher; the validator itself handles
//! boolean combinations, references and node constraints and is the value shape
//! collaborator of the matcher for nested shapes.

use crate::context::{MatchContext, ValueSatisfier};
use crate::error::{ShexError, ShexSchemaError};
use crate::graph::RelationshipSource;
use crate::limits::MatchLimits;
use crate::matcher::validate;
use crate::model::{
    NodeConstraint, NumericFacet, ShapeExpression, ShapeLabel, ShapesSchema, StringFacet,
    ValueSetValue,
};
use crate::report::{
    ReportCollector, ReportItem, ReportSink, ShapeAssociation, ValidationReport, ViolationKind,
};
use oxrdf::{Literal, Term};
use oxsdatatypes::{Decimal, Double};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use regex::{Regex, RegexBuilder};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::str::FromStr;
use tracing::{debug, trace};

/// ShEx validator for validating RDF graphs against the shapes of a schema.
///
/// ```
/// use oxrdf::{Graph, NamedNode, Triple};
/// use oxshex::{
///     Cardinality, NodeConstraint, NodeKind, Shape, ShapeExpression, ShapeLabel, ShapesSchema,
///     ShexValidator, TripleConstraint,
/// };
///
/// let ex = |name: &str| NamedNode::new_unchecked(format!("http://example.org/{name}"));
/// let mut schema = ShapesSchema::new();
/// schema.add_shape(
///     ShapeLabel::from(ex("Company")),
///     ShapeExpression::Shape(Shape::new(
///         TripleConstraint::new(ex("hasEmployee"))
///             .with_value_expr(ShapeExpression::NodeConstraint(NodeConstraint::with_node_kind(
///                 NodeKind::Iri,
///             )))
///             .with_cardinality(Cardinality::one_or_more()),
///     )),
/// );
///
/// let mut graph = Graph::new();
/// graph.insert(&Triple::new(ex("acme"), ex("hasEmployee"), ex("alice")));
///
/// let validator = ShexValidator::new(schema);
/// let report = validator.validate_node(&graph, &ex("acme").into(), &ShapeLabel::from(ex("Company")))?;
/// assert!(report.conforms());
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug, Clone)]
pub struct ShexValidator {
    schema: ShapesSchema,
    limits: MatchLimits,
}

impl ShexValidator {
    /// Creates a new validator with the given shapes schema and default limits.
    pub fn new(schema: ShapesSchema) -> Self {
        Self {
            schema,
            limits: MatchLimits::default(),
        }
    }

    /// Sets the limits applied to each validated node.
    #[must_use]
    pub fn with_limits(mut self, limits: MatchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Returns a reference to the shapes schema.
    pub fn schema(&self) -> &ShapesSchema {
        &self.schema
    }

    /// Returns the limits applied to each validated node.
    pub fn limits(&self) -> &MatchLimits {
        &self.limits
    }

    /// Validates `node` against the shape labelled `label`.
    pub fn validate_node(
        &self,
        graph: &impl RelationshipSource,
        node: &Term,
        label: &ShapeLabel,
    ) -> Result<ValidationReport, ShexError> {
        let collector = ReportCollector::new();
        let conforms = self.validate_node_with_sink(graph, node, label, &collector)?;
        Ok(ValidationReport::new(
            vec![ShapeAssociation {
                node: node.clone(),
                shape: label.clone(),
                conforms,
            }],
            collector.into_items(),
        ))
    }

    /// Validates `node` against the shape labelled `label`, pushing the explanations of a
    /// failure to `sink`.
    ///
    /// The sink may be shared by validations running concurrently.
    pub fn validate_node_with_sink(
        &self,
        graph: &impl RelationshipSource,
        node: &Term,
        label: &ShapeLabel,
        sink: &dyn ReportSink,
    ) -> Result<bool, ShexError> {
        let session = ShapeSession::new(&self.schema);
        let ctx = MatchContext::with_limits(graph, &self.schema, &session, sink, self.limits.clone());
        let conforms = session.check_label(&ctx, node, label)?;
        ctx.flush_reports();
        debug!(%node, shape = %label, conforms, "validated shape association");
        Ok(conforms)
    }

    /// Validates `node` against the start shape of the schema.
    pub fn validate_start(
        &self,
        graph: &impl RelationshipSource,
        node: &Term,
    ) -> Result<ValidationReport, ShexError> {
        let start = self
            .schema
            .start()
            .ok_or(ShexSchemaError::MissingStartShape)?;
        self.validate_node(graph, node, start)
    }

    /// Validates every `(node, shape)` association of a shape map.
    ///
    /// Each association gets its own evaluation context, they only share the schema.
    pub fn validate_shape_map(
        &self,
        graph: &impl RelationshipSource,
        shape_map: &[(Term, ShapeLabel)],
    ) -> Result<ValidationReport, ShexError> {
        let collector = ReportCollector::new();
        let associations = shape_map
            .iter()
            .map(|(node, shape)| {
                Ok(ShapeAssociation {
                    node: node.clone(),
                    shape: shape.clone(),
                    conforms: self.validate_node_with_sink(graph, node, shape, &collector)?,
                })
            })
            .collect::<Result<Vec<_>, ShexError>>()?;
        Ok(ValidationReport::new(associations, collector.into_items()))
    }

    /// Same as [`validate_shape_map`](Self::validate_shape_map), validating associations
    /// in parallel on the rayon thread pool.
    ///
    /// Report items of different associations may be interleaved.
    #[cfg(feature = "rayon")]
    pub fn validate_shape_map_parallel(
        &self,
        graph: &(impl RelationshipSource + Sync),
        shape_map: &[(Term, ShapeLabel)],
    ) -> Result<ValidationReport, ShexError> {
        let collector = ReportCollector::new();
        let associations = shape_map
            .par_iter()
            .map(|(node, shape)| {
                Ok(ShapeAssociation {
                    node: node.clone(),
                    shape: shape.clone(),
                    conforms: self.validate_node_with_sink(graph, node, shape, &collector)?,
                })
            })
            .collect::<Result<Vec<_>, ShexError>>()?;
        Ok(ValidationReport::new(associations, collector.into_items()))
    }
}

/// State of the validation of one shape association.
struct ShapeSession<'s> {
    schema: &'s ShapesSchema,
    /// `(node, shape)` pairs being checked, assumed to hold when reached again.
    in_progress: RefCell<FxHashSet<(Term, ShapeLabel)>>,
    regexes: RefCell<FxHashMap<(String, Option<String>), Regex>>,
}

impl<'a, 's: 'a> ValueSatisfier<'a> for ShapeSession<'s> {
    fn satisfies(
        &self,
        ctx: &MatchContext<'a>,
        value_expr: &'a ShapeExpression,
        node: &Term,
    ) -> Result<bool, ShexError> {
        self.check(ctx, value_expr, node)
    }
}

impl<'s> ShapeSession<'s> {
    fn new(schema: &'s ShapesSchema) -> Self {
        Self {
            schema,
            in_progress: RefCell::default(),
            regexes: RefCell::default(),
        }
    }

    fn check_label<'a>(
        &self,
        ctx: &MatchContext<'a>,
        node: &Term,
        label: &ShapeLabel,
    ) -> Result<bool, ShexError>
    where
        's: 'a,
    {
        let schema = self.schema;
        let expression = schema
            .get_shape(label)
            .ok_or_else(|| ShexSchemaError::undefined_shape_ref(label))?;
        let key = (node.clone(), label.clone());
        if !self.in_progress.borrow_mut().insert(key.clone()) {
            trace!(%node, shape = %label, "recursive shape reference assumed to hold");
            return Ok(true);
        }
        let result = self.check(ctx, expression, node);
        self.in_progress.borrow_mut().remove(&key);
        result
    }

    fn check<'a>(
        &self,
        ctx: &MatchContext<'a>,
        expression: &'a ShapeExpression,
        node: &Term,
    ) -> Result<bool, ShexError>
    where
        's: 'a,
    {
        ctx.enter()?;
        let result = self.check_expression(ctx, expression, node);
        ctx.exit();
        result
    }

    fn check_expression<'a>(
        &self,
        ctx: &MatchContext<'a>,
        expression: &'a ShapeExpression,
        node: &Term,
    ) -> Result<bool, ShexError>
    where
        's: 'a,
    {
        match expression {
            ShapeExpression::ShapeAnd(operands) => {
                for operand in operands {
                    if !self.check(ctx, operand, node)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            ShapeExpression::ShapeOr(operands) => {
                let mark = ctx.report_mark();
                for operand in operands {
                    if self.check(ctx, operand, node)? {
                        ctx.discard_reports_since(mark);
                        return Ok(true);
                    }
                }
                ctx.report(ReportItem::new(
                    node.clone(),
                    ViolationKind::ShapeOr,
                    format!("none of the {} alternatives holds", operands.len()),
                ));
                Ok(false)
            }
            ShapeExpression::ShapeNot(operand) => {
                let mark = ctx.report_mark();
                let holds = self.check(ctx, operand, node)?;
                ctx.discard_reports_since(mark);
                if holds {
                    ctx.report(ReportItem::new(
                        node.clone(),
                        ViolationKind::ShapeNot,
                        "the negated shape holds",
                    ));
                }
                Ok(!holds)
            }
            ShapeExpression::NodeConstraint(constraint) => {
                self.check_node_constraint(ctx, constraint, node)
            }
            ShapeExpression::Shape(shape) => {
                validate(ctx, &shape.expression, node, &shape.extra, shape.closed)
            }
            ShapeExpression::ShapeExternal => {
                debug!(%node, "external shape accepted without checking");
                Ok(true)
            }
            ShapeExpression::ShapeRef(label) => self.check_label(ctx, node, label),
        }
    }

    fn check_node_constraint(
        &self,
        ctx: &MatchContext<'_>,
        constraint: &NodeConstraint,
        node: &Term,
    ) -> Result<bool, ShexError> {
        let mut violations = Vec::new();

        if let Some(node_kind) = constraint.node_kind {
            if !node_kind.matches(node) {
                violations.push(format!("expected node kind {node_kind}"));
            }
        }

        if let Some(datatype) = &constraint.datatype {
            let matching = match node {
                Term::Literal(literal) => literal.datatype() == datatype.as_ref(),
                _ => false,
            };
            if !matching {
                violations.push(format!("expected a literal of datatype {datatype}"));
            }
        }

        for facet in &constraint.string_facets {
            if let Some(violation) = self.check_string_facet(facet, node)? {
                violations.push(violation);
            }
        }

        for facet in &constraint.numeric_facets {
            if let Some(violation) = check_numeric_facet(facet, node) {
                violations.push(violation);
            }
        }

        if !constraint.values.is_empty() && !constraint.values.iter().any(|v| v.contains(node)) {
            violations.push("value is not in the value set".into());
        }

        let conforms = violations.is_empty();
        for message in violations {
            ctx.report(
                ReportItem::new(node.clone(), ViolationKind::NodeConstraint, message)
                    .with_value(node.clone()),
            );
        }
        Ok(conforms)
    }

    fn check_string_facet(
        &self,
        facet: &StringFacet,
        node: &Term,
    ) -> Result<Option<String>, ShexSchemaError> {
        let Some(value) = lexical_form(node) else {
            return Ok(Some("string facets do not apply to blank nodes".into()));
        };
        let length = value.chars().count();
        Ok(match facet {
            StringFacet::Length(expected) => {
                (length != *expected).then(|| format!("length {length} is not {expected}"))
            }
            StringFacet::MinLength(min) => {
                (length < *min).then(|| format!("length {length} is less than {min}"))
            }
            StringFacet::MaxLength(max) => {
                (length > *max).then(|| format!("length {length} is greater than {max}"))
            }
            StringFacet::Pattern { pattern, flags } => {
                let regex = self.regex(pattern, flags.as_deref())?;
                (!regex.is_match(value)).then(|| format!("value does not match /{pattern}/"))
            }
        })
    }

    fn regex(&self, pattern: &str, flags: Option<&str>) -> Result<Regex, ShexSchemaError> {
        let key = (pattern.to_owned(), flags.map(str::to_owned));
        if let Some(regex) = self.regexes.borrow().get(&key) {
            return Ok(regex.clone());
        }
        let regex = compile_pattern(pattern, flags)?;
        self.regexes.borrow_mut().insert(key, regex.clone());
        Ok(regex)
    }
}

/// Compiles an XPath style pattern with its `i`, `m`, `s` and `x` flags.
fn compile_pattern(pattern: &str, flags: Option<&str>) -> Result<Regex, ShexSchemaError> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.unwrap_or_default().chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            _ => {
                return Err(ShexSchemaError::invalid_regex(
                    pattern,
                    format!("unsupported flag '{flag}'"),
                ));
            }
        };
    }
    builder
        .build()
        .map_err(|e| ShexSchemaError::invalid_regex(pattern, e))
}

/// String facets apply to the IRI of named nodes and the lexical form of literals.
fn lexical_form(term: &Term) -> Option<&str> {
    match term {
        Term::NamedNode(node) => Some(node.as_str()),
        Term::Literal(literal) => Some(literal.value()),
        _ => None,
    }
}

fn check_numeric_facet(facet: &NumericFacet, node: &Term) -> Option<String> {
    let Term::Literal(literal) = node else {
        return Some("numeric facets require a literal".into());
    };
    match facet {
        NumericFacet::MinInclusive(bound) => {
            check_bound(literal, bound, |o| o != Ordering::Less, "at least")
        }
        NumericFacet::MinExclusive(bound) => {
            check_bound(literal, bound, |o| o == Ordering::Greater, "greater than")
        }
        NumericFacet::MaxInclusive(bound) => {
            check_bound(literal, bound, |o| o != Ordering::Greater, "at most")
        }
        NumericFacet::MaxExclusive(bound) => {
            check_bound(literal, bound, |o| o == Ordering::Less, "less than")
        }
        NumericFacet::TotalDigits(max) => match digits(literal) {
            Some((total, _)) if total <= *max => None,
            Some((total, _)) => Some(format!("{total} digits where at most {max} are allowed")),
            None => Some(format!("{} is not a decimal", literal.value())),
        },
        NumericFacet::FractionDigits(max) => match digits(literal) {
            Some((_, fraction)) if fraction <= *max => None,
            Some((_, fraction)) => Some(format!(
                "{fraction} fraction digits where at most {max} are allowed"
            )),
            None => Some(format!("{} is not a decimal", literal.value())),
        },
    }
}

fn check_bound(
    literal: &Literal,
    bound: &Literal,
    accepts: impl Fn(Ordering) -> bool,
    relation: &str,
) -> Option<String> {
    let ordering = Double::from_str(literal.value())
        .ok()
        .zip(Double::from_str(bound.value()).ok())
        .and_then(|(value, bound)| value.partial_cmp(&bound));
    match ordering {
        Some(ordering) if accepts(ordering) => None,
        Some(_) => Some(format!(
            "{} is not {relation} {}",
            literal.value(),
            bound.value()
        )),
        None => Some(format!(
            "{} is not comparable to {}",
            literal.value(),
            bound.value()
        )),
    }
}

/// Total and fraction digit counts of the canonical decimal form of a literal.
fn digits(literal: &Literal) -> Option<(u32, u32)> {
    let canonical = Decimal::from_str(literal.value()).ok()?.to_string();
    let unsigned = canonical.trim_start_matches('-');
    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let integer = integer.trim_start_matches('0');
    let fraction = fraction.trim_end_matches('0');
    let total = u32::try_from(integer.len() + fraction.len()).ok()?;
    let fraction = u32::try_from(fraction.len()).ok()?;
    Some((total, fraction))
}

impl ValueSetValue {
    /// Returns true if the term is in this value set entry.
    pub fn contains(&self, term: &Term) -> bool {
        match self {
            Self::ObjectValue(value) => term == value,
            Self::IriStem(stem) => iri_has_stem(term, stem),
            Self::IriStemRange { stem, exclusions } => {
                iri_has_stem(term, stem) && !excluded(term, exclusions)
            }
            Self::LiteralStem(stem) => literal_has_stem(term, stem),
            Self::LiteralStemRange { stem, exclusions } => {
                literal_has_stem(term, stem) && !excluded(term, exclusions)
            }
            Self::LanguageStem(stem) => language_has_stem(term, stem),
            Self::LanguageStemRange { stem, exclusions } => {
                language_has_stem(term, stem) && !excluded(term, exclusions)
            }
        }
    }
}

fn excluded(term: &Term, exclusions: &[ValueSetValue]) -> bool {
    exclusions.iter().any(|exclusion| exclusion.contains(term))
}

fn iri_has_stem(term: &Term, stem: &str) -> bool {
    matches!(term, Term::NamedNode(node) if node.as_str().starts_with(stem))
}

fn literal_has_stem(term: &Term, stem: &str) -> bool {
    matches!(term, Term::Literal(literal) if literal.value().starts_with(stem))
}

/// Language stems match whole subtags, case insensitively: `en` matches `en-GB` but not `eng`.
fn language_has_stem(term: &Term, stem: &str) -> bool {
    let Term::Literal(literal) = term else {
        return false;
    };
    let Some(language) = literal.language() else {
        return false;
    };
    if stem.is_empty() {
        return true;
    }
    language.len() >= stem.len()
        && language.is_char_boundary(stem.len())
        && language[..stem.len()].eq_ignore_ascii_case(stem)
        && matches!(language.as_bytes().get(stem.len()), None | Some(b'-'))
}
