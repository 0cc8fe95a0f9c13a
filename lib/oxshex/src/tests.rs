//! Scenario tests of the matching engine and the shape validator.

#![cfg(test)]

use crate::{
    AnyValue, Cardinality, MatchContext, MatchLimits, NodeConstraint, NodeKind, ReportCollector,
    ReportItem, Shape, ShapeExpression, ShapeLabel, ShapesSchema, ShexError, ShexSchemaError,
    ShexValidationError, ShexValidator, TripleConstraint, TripleExpression, ViolationKind,
    matches, validate,
};
use oxrdf::vocab::xsd;
use oxrdf::{Graph, NamedNode, Term};
use oxrdfio::{RdfFormat, RdfParser};
use rustc_hash::FxHashSet;

// =============================================================================
// Helper Functions
// =============================================================================

/// Helper to parse a Turtle string into a Graph, with `ex:` bound to `http://example.org/`.
fn parse_turtle(turtle: &str) -> Graph {
    let data = format!("PREFIX ex: <http://example.org/>\n{turtle}");
    let mut graph = Graph::new();
    for quad in RdfParser::from_format(RdfFormat::Turtle).for_reader(data.as_bytes()) {
        graph.insert(quad.expect("Failed to parse turtle").as_ref());
    }
    graph
}

fn ex(name: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://example.org/{name}"))
}

fn term(name: &str) -> Term {
    ex(name).into()
}

fn label(name: &str) -> ShapeLabel {
    ShapeLabel::from(ex(name))
}

fn leaf(predicate: &str, cardinality: Cardinality) -> TripleExpression {
    TripleConstraint::new(ex(predicate))
        .with_cardinality(cardinality)
        .into()
}

fn bounded(min: u32, max: u32) -> Cardinality {
    Cardinality::new(min, Some(max)).unwrap()
}

/// Validates `node` with the engine alone, accepting every value.
fn check(
    graph: &Graph,
    schema: &ShapesSchema,
    expression: &TripleExpression,
    node: &str,
    extras: &[&str],
    closed: bool,
) -> Result<(bool, Vec<ReportItem>), ShexError> {
    let extras = extras.iter().map(|p| ex(p)).collect::<FxHashSet<_>>();
    let sink = ReportCollector::new();
    let conforms = {
        let ctx = MatchContext::new(graph, schema, &AnyValue, &sink);
        validate(&ctx, expression, &term(node), &extras, closed)?
    };
    Ok((conforms, sink.into_items()))
}

fn conforms(graph: &Graph, expression: &TripleExpression, node: &str, closed: bool) -> bool {
    check(graph, &ShapesSchema::new(), expression, node, &[], closed)
        .unwrap()
        .0
}

// =============================================================================
// Engine Properties
// =============================================================================

#[test]
fn test_validate_is_deterministic() {
    let graph = parse_turtle("ex:n ex:p ex:a, ex:b, ex:c, ex:d ; ex:q ex:e .");
    let schema = ShapesSchema::new();
    let expressions = [
        TripleExpression::EachOf(vec![
            TripleExpression::repeat(leaf("p", bounded(1, 2)), bounded(2, 2)),
            leaf("q", Cardinality::default()),
        ]),
        TripleExpression::repeat(leaf("p", Cardinality::default()), bounded(2, 3)),
    ];
    for expression in &expressions {
        let first = check(&graph, &schema, expression, "n", &[], true).unwrap();
        for _ in 0..3 {
            assert_eq!(check(&graph, &schema, expression, "n", &[], true).unwrap(), first);
        }
    }

    // Reusing the same context gives the same answers too
    let ctx = MatchContext::new(&graph, &schema, &AnyValue, &());
    let extras = FxHashSet::default();
    let answers = expressions
        .iter()
        .map(|e| validate(&ctx, e, &term("n"), &extras, true).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(answers, [true, false]);
    for (expression, answer) in expressions.iter().zip(answers) {
        assert_eq!(validate(&ctx, expression, &term("n"), &extras, true).unwrap(), answer);
    }
}

#[test]
fn test_widening_extras_is_monotonic() {
    let graph = parse_turtle("ex:n ex:p ex:a ; ex:q ex:b ; ex:r ex:c .");
    let schema = ShapesSchema::new();
    let expressions = [
        leaf("p", Cardinality::default()),
        TripleExpression::EachOf(vec![
            leaf("p", Cardinality::optional()),
            leaf("q", Cardinality::default()),
        ]),
        TripleExpression::OneOf(vec![
            leaf("q", Cardinality::default()),
            leaf("s", Cardinality::zero_or_more()),
        ]),
    ];
    let extras_chain: [&[&str]; 4] = [&[], &["q"], &["q", "r"], &["p", "q", "r", "s"]];
    for expression in &expressions {
        for closed in [false, true] {
            let mut passed = false;
            for extras in extras_chain {
                let (conforms, _) = check(&graph, &schema, expression, "n", extras, closed).unwrap();
                assert!(
                    conforms || !passed,
                    "widening extras to {extras:?} broke {expression:?}"
                );
                passed = conforms;
            }
        }
    }
}

#[test]
fn test_repeat_zero_zero_forbids_target_predicates() {
    let forbidden = TripleExpression::repeat(leaf("p", Cardinality::default()), bounded(0, 0));
    let without = parse_turtle("ex:n ex:q ex:a .");
    let with = parse_turtle("ex:n ex:p ex:a ; ex:q ex:b .");
    assert!(conforms(&without, &forbidden, "n", false));
    assert!(!conforms(&with, &forbidden, "n", false));
    // Nothing at all around the node
    assert!(conforms(&without, &forbidden, "unknown", true));
}

#[test]
fn test_repeat_one_one_is_its_target() {
    let target = leaf("p", bounded(1, 2));
    let repeated = TripleExpression::repeat(target.clone(), Cardinality::exactly(1));
    let schema = ShapesSchema::new();
    for data in [
        "ex:n ex:q ex:x .",
        "ex:n ex:p ex:a .",
        "ex:n ex:p ex:a, ex:b .",
        "ex:n ex:p ex:a, ex:b, ex:c .",
    ] {
        let graph = parse_turtle(data);
        let extras = FxHashSet::default();
        let ctx = MatchContext::new(&graph, &schema, &AnyValue, &());
        let direct = validate(&ctx, &target, &term("n"), &extras, false).unwrap();
        let through_repeat = validate(&ctx, &repeated, &term("n"), &extras, false).unwrap();
        assert_eq!(direct, through_repeat, "on {data}");
        assert_eq!(ctx.partitions_tried(), 0);
    }
}

#[test]
fn test_conjunction_fails_on_unplaceable_triple() {
    let graph = parse_turtle("ex:n ex:p ex:a ; ex:q ex:b ; ex:r ex:c .");
    let schema = ShapesSchema::new();
    let expression = TripleExpression::EachOf(vec![
        leaf("p", Cardinality::zero_or_more()),
        leaf("q", Cardinality::zero_or_more()),
    ]);
    let sink = ReportCollector::new();
    {
        let ctx = MatchContext::new(&graph, &schema, &AnyValue, &sink);
        let triples = ctx.relationships_from(&term("n"));
        let candidates = triples.iter().collect::<Vec<_>>();
        assert_eq!(candidates.len(), 3);
        assert!(!matches(&ctx, &candidates, &term("n"), &expression, &FxHashSet::default()).unwrap());
        // No assignment was even tried
        assert_eq!(ctx.partitions_tried(), 0);
    }
    let items = sink.into_items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, ViolationKind::UnplaceableTriple);
    assert_eq!(items[0].predicate, Some(ex("r")));

    // Candidate selection keeps ex:r out unless the shape is closed
    assert!(conforms(&graph, &expression, "n", false));
    assert!(!conforms(&graph, &expression, "n", true));
}

#[test]
fn test_four_triples_do_not_fit_two_singleton_groups() {
    let graph = parse_turtle("ex:n ex:p ex:a, ex:b, ex:c, ex:d .");
    let two_singletons = TripleExpression::repeat(leaf("p", Cardinality::exactly(1)), bounded(2, 2));
    assert!(!conforms(&graph, &two_singletons, "n", false));
    assert!(!conforms(&graph, &two_singletons, "n", true));

    let two = parse_turtle("ex:n ex:p ex:a, ex:b .");
    assert!(conforms(&two, &two_singletons, "n", true));

    let two_pairs = TripleExpression::repeat(leaf("p", Cardinality::exactly(2)), bounded(2, 2));
    assert!(conforms(&graph, &two_pairs, "n", true));
}

#[test]
fn test_one_of_passes_through() {
    let graph = parse_turtle("ex:n ex:p ex:a .");
    let never = leaf("p", Cardinality::exactly(5));
    let always = leaf("p", Cardinality::zero_or_more());
    assert!(!conforms(&graph, &never, "n", false));
    assert!(conforms(&graph, &always, "n", false));

    let one_of = |alternatives: &[&TripleExpression]| {
        TripleExpression::OneOf(alternatives.iter().map(|e| (*e).clone()).collect())
    };
    assert!(conforms(&graph, &one_of(&[&never, &always]), "n", false));
    assert!(conforms(&graph, &one_of(&[&always, &never]), "n", false));
    assert!(!conforms(&graph, &one_of(&[&never, &never]), "n", false));
    // Inclusive: both alternatives holding is fine
    assert!(conforms(&graph, &one_of(&[&always, &always]), "n", false));
}

#[test]
fn test_one_of_inverse_alternative_does_not_take_outgoing_triples() {
    let graph = parse_turtle("ex:n ex:q ex:a .");
    let incoming: TripleExpression = TripleConstraint::new(ex("p"))
        .with_inverse(true)
        .with_cardinality(Cardinality::zero_or_more())
        .into();
    let expression = TripleExpression::OneOf(vec![incoming, leaf("q", Cardinality::exactly(2))]);
    assert!(!conforms(&graph, &expression, "n", true));
    assert!(!conforms(&graph, &expression, "n", false));

    // The forward alternative still consumes the triple when it can
    let expression = TripleExpression::OneOf(vec![
        TripleConstraint::new(ex("p"))
            .with_inverse(true)
            .with_cardinality(Cardinality::zero_or_more())
            .into(),
        leaf("q", Cardinality::default()),
    ]);
    assert!(conforms(&graph, &expression, "n", true));
}

#[test]
fn test_one_of_empty_alternative_does_not_take_triples() {
    let graph = parse_turtle("ex:n ex:q ex:a .");
    let expression =
        TripleExpression::OneOf(vec![TripleExpression::Empty, leaf("q", Cardinality::exactly(2))]);
    assert!(!conforms(&graph, &expression, "n", false));

    // Without triples to consume the empty alternative holds
    let expression =
        TripleExpression::OneOf(vec![TripleExpression::Empty, leaf("p", Cardinality::default())]);
    assert!(conforms(&graph, &expression, "n", false));
}

#[test]
fn test_closed_shape() {
    let graph = parse_turtle("ex:n ex:p ex:a ; ex:q ex:b .");
    let schema = ShapesSchema::new();
    let expression = leaf("p", Cardinality::default());

    assert!(check(&graph, &schema, &expression, "n", &[], false).unwrap().0);

    let (closed, items) = check(&graph, &schema, &expression, "n", &[], true).unwrap();
    assert!(!closed);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, ViolationKind::Closed);
    assert_eq!(items[0].predicate, Some(ex("q")));
    assert_eq!(items[0].value, Some(term("b")));

    let (closed, items) = check(&graph, &schema, &expression, "n", &["q"], true).unwrap();
    assert!(closed);
    assert!(items.is_empty());
}

#[test]
fn test_has_employee_example() {
    let graph = parse_turtle("ex:n ex:hasEmployee ex:a, ex:b, ex:c .");
    let schema = ShapesSchema::new();

    let (conforms, items) =
        check(&graph, &schema, &leaf("hasEmployee", bounded(2, 3)), "n", &[], false).unwrap();
    assert!(conforms);
    assert!(items.is_empty());

    let (conforms, items) =
        check(&graph, &schema, &leaf("hasEmployee", bounded(2, 2)), "n", &[], false).unwrap();
    assert!(!conforms);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, ViolationKind::MaxCardinality);
    assert_eq!(items[0].focus_node, term("n"));
    assert_eq!(items[0].predicate, Some(ex("hasEmployee")));
}

#[test]
fn test_empty_candidates_reach_optional_branches() {
    let graph = parse_turtle("ex:n ex:p ex:a .");
    let expression = TripleExpression::EachOf(vec![
        leaf("p", Cardinality::default()),
        leaf("q", Cardinality::optional()),
        TripleExpression::repeat(leaf("r", Cardinality::default()), Cardinality::zero_or_more()),
        TripleExpression::Empty,
    ]);
    assert!(conforms(&graph, &expression, "n", true));
    assert!(conforms(&graph, &TripleExpression::Empty, "n", false));
    assert!(!conforms(&graph, &TripleExpression::Empty, "n", true));
}

#[test]
fn test_inverse_constraint() {
    let graph = parse_turtle(
        "ex:alice ex:worksFor ex:acme .
         ex:bob ex:worksFor ex:acme .
         ex:acme ex:name \"ACME\" .",
    );
    let staffed = TripleExpression::EachOf(vec![
        leaf("name", Cardinality::default()),
        TripleConstraint::new(ex("worksFor"))
            .with_inverse(true)
            .with_cardinality(Cardinality::one_or_more())
            .into(),
    ]);
    assert!(conforms(&graph, &staffed, "acme", true));
    // alice has no incoming ex:worksFor and no ex:name
    assert!(!conforms(&graph, &staffed, "alice", false));
}

// =============================================================================
// Schema Errors
// =============================================================================

#[test]
fn test_references_are_resolved() {
    let graph = parse_turtle("ex:n ex:p ex:a ; ex:q ex:b .");
    let mut schema = ShapesSchema::new();
    schema.add_triple_expr(label("named"), leaf("q", Cardinality::default()));
    let expression = TripleExpression::EachOf(vec![
        leaf("p", Cardinality::default()),
        TripleExpression::Ref(label("named")),
    ]);
    assert!(check(&graph, &schema, &expression, "n", &[], true).unwrap().0);
}

#[test]
fn test_dangling_reference_is_a_schema_error() {
    let graph = parse_turtle("ex:n ex:p ex:a .");
    let mut schema = ShapesSchema::new();
    let expression = TripleExpression::EachOf(vec![
        leaf("p", Cardinality::default()),
        TripleExpression::Ref(label("missing")),
    ]);
    let error = check(&graph, &schema, &expression, "n", &[], false).unwrap_err();
    assert!(matches!(
        error,
        ShexError::Schema(ShexSchemaError::UndefinedTripleExprRef { .. })
    ));

    schema.add_shape(label("S"), ShapeExpression::Shape(Shape::new(expression)));
    assert!(matches!(
        schema.check_integrity(),
        Err(ShexSchemaError::UndefinedTripleExprRef { .. })
    ));
}

#[test]
fn test_invalid_cardinality_is_a_schema_error() {
    assert_eq!(
        Cardinality::new(3, Some(1)),
        Err(ShexSchemaError::InvalidCardinality {
            min: 3,
            max: Some(1)
        })
    );

    let graph = parse_turtle("ex:n ex:p ex:a .");
    let expression = TripleExpression::repeat(
        leaf("p", Cardinality::default()),
        Cardinality {
            min: 2,
            max: Some(0),
        },
    );
    let error = check(&graph, &ShapesSchema::new(), &expression, "n", &[], false).unwrap_err();
    assert!(error.is_schema_error());
}

// =============================================================================
// Limits
// =============================================================================

#[test]
fn test_partition_limit_aborts_search() {
    let graph = parse_turtle("ex:n ex:p ex:a, ex:b, ex:c, ex:d, ex:e, ex:f .");
    let schema = ShapesSchema::new();
    // Never satisfiable, so the search explores every partition
    let expression = TripleExpression::repeat(leaf("p", Cardinality::exactly(7)), bounded(1, 6));
    let ctx = MatchContext::with_limits(
        &graph,
        &schema,
        &AnyValue,
        &(),
        MatchLimits::default().with_max_partitions(10),
    );
    let error = validate(&ctx, &expression, &term("n"), &FxHashSet::default(), false).unwrap_err();
    assert!(matches!(
        error,
        ShexError::Validation(ShexValidationError::MaxPartitions { limit: 10, .. })
    ));
}

#[test]
fn test_recursion_limit_stops_reference_loops() {
    let graph = parse_turtle("ex:n ex:p ex:a .");
    let mut schema = ShapesSchema::new();
    schema.add_triple_expr(label("loop"), TripleExpression::Ref(label("loop")));
    let expression = TripleExpression::Ref(label("loop"));
    let ctx = MatchContext::with_limits(
        &graph,
        &schema,
        &AnyValue,
        &(),
        MatchLimits::default().with_max_recursion_depth(16),
    );
    let error = validate(&ctx, &expression, &term("n"), &FxHashSet::default(), false).unwrap_err();
    assert!(matches!(
        error,
        ShexError::Validation(ShexValidationError::MaxRecursionDepth { limit: 16, .. })
    ));
}

// =============================================================================
// Shape Validator
// =============================================================================

fn company_schema() -> ShapesSchema {
    let mut schema = ShapesSchema::new();
    schema.add_shape(
        label("Person"),
        ShapeExpression::Shape(Shape::new(
            TripleConstraint::new(ex("name")).with_value_expr(ShapeExpression::NodeConstraint(
                NodeConstraint::with_datatype(xsd::STRING.into_owned()),
            )),
        )),
    );
    schema.add_shape(
        label("Company"),
        ShapeExpression::Shape(
            Shape::new(
                TripleConstraint::new(ex("hasEmployee"))
                    .with_value_expr(ShapeExpression::ShapeRef(label("Person")))
                    .with_cardinality(bounded(2, 3)),
            )
            .with_closed(true),
        ),
    );
    schema.set_start(label("Company"));
    schema
}

#[test]
fn test_nested_shapes() {
    let graph = parse_turtle(
        "ex:acme ex:hasEmployee ex:alice, ex:bob .
         ex:alice ex:name \"Alice\" .
         ex:bob ex:name \"Bob\" .
         ex:initech ex:hasEmployee ex:alice, ex:bob, ex:peter .
         ex:peter ex:name 42 .",
    );
    let validator = ShexValidator::new(company_schema());

    let report = validator.validate_start(&graph, &term("acme")).unwrap();
    assert!(report.conforms(), "{report}");
    assert!(report.items().is_empty());

    let report = validator.validate_start(&graph, &term("initech")).unwrap();
    assert!(!report.conforms());
    assert_eq!(report.items_of_kind(ViolationKind::UnmatchedValue).count(), 1);
    assert!(report.items_of_kind(ViolationKind::NodeConstraint).count() >= 1);
}

#[test]
fn test_recursive_shape_reference_holds_on_cycles() {
    let graph = parse_turtle(
        "ex:alice ex:knows ex:bob .
         ex:bob ex:knows ex:alice .",
    );
    let mut schema = ShapesSchema::new();
    schema.add_shape(
        label("Person"),
        ShapeExpression::Shape(Shape::new(
            TripleConstraint::new(ex("knows"))
                .with_value_expr(ShapeExpression::ShapeRef(label("Person")))
                .with_cardinality(Cardinality::zero_or_more()),
        )),
    );
    let validator = ShexValidator::new(schema);
    let report = validator
        .validate_node(&graph, &term("alice"), &label("Person"))
        .unwrap();
    assert!(report.conforms());
}

#[test]
fn test_shape_boolean_operators() {
    let graph = parse_turtle("ex:n ex:p ex:a .");
    let iri = ShapeExpression::NodeConstraint(NodeConstraint::with_node_kind(NodeKind::Iri));
    let literal = ShapeExpression::NodeConstraint(NodeConstraint::with_node_kind(NodeKind::Literal));
    let mut schema = ShapesSchema::new();
    schema.add_shape(label("Iri"), iri.clone());
    schema.add_shape(label("NotIri"), ShapeExpression::ShapeNot(Box::new(iri.clone())));
    schema.add_shape(
        label("Either"),
        ShapeExpression::ShapeOr(vec![literal.clone(), iri.clone()]),
    );
    schema.add_shape(label("Both"), ShapeExpression::ShapeAnd(vec![literal, iri]));
    let validator = ShexValidator::new(schema);
    let node = term("n");

    assert!(validator.validate_node(&graph, &node, &label("Iri")).unwrap().conforms());
    assert!(validator.validate_node(&graph, &node, &label("Either")).unwrap().conforms());

    let report = validator.validate_node(&graph, &node, &label("NotIri")).unwrap();
    assert!(!report.conforms());
    assert_eq!(report.items().len(), 1);
    assert_eq!(report.items()[0].kind, ViolationKind::ShapeNot);

    let report = validator.validate_node(&graph, &node, &label("Both")).unwrap();
    assert!(!report.conforms());
    assert_eq!(report.items_of_kind(ViolationKind::NodeConstraint).count(), 1);
}

#[test]
fn test_validator_schema_errors() {
    let graph = Graph::new();
    let validator = ShexValidator::new(ShapesSchema::new());
    assert!(matches!(
        validator.validate_start(&graph, &term("n")),
        Err(ShexError::Schema(ShexSchemaError::MissingStartShape))
    ));
    assert!(matches!(
        validator.validate_node(&graph, &term("n"), &label("Missing")),
        Err(ShexError::Schema(ShexSchemaError::UndefinedShapeRef { .. }))
    ));
}

#[test]
fn test_shape_map() {
    let graph = parse_turtle(
        "ex:acme ex:hasEmployee ex:alice, ex:bob .
         ex:alice ex:name \"Alice\" .
         ex:bob ex:name \"Bob\" .
         ex:solo ex:hasEmployee ex:alice .",
    );
    let validator = ShexValidator::new(company_schema());
    let report = validator
        .validate_shape_map(
            &graph,
            &[
                (term("acme"), label("Company")),
                (term("solo"), label("Company")),
                (term("alice"), label("Person")),
            ],
        )
        .unwrap();
    let outcomes = report
        .associations()
        .iter()
        .map(|a| a.conforms)
        .collect::<Vec<_>>();
    assert_eq!(outcomes, [true, false, true]);
    assert!(!report.conforms());
    assert_eq!(report.items_of_kind(ViolationKind::MinCardinality).count(), 1);
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_validations_share_schema_and_sink() {
    let graph = parse_turtle(
        "ex:acme ex:hasEmployee ex:alice, ex:bob .
         ex:alice ex:name \"Alice\" .
         ex:bob ex:name \"Bob\" .
         ex:solo ex:hasEmployee ex:alice .",
    );
    let validator = ShexValidator::new(company_schema());
    let collector = ReportCollector::new();
    let nodes = ["acme", "solo", "acme", "solo", "acme", "solo"];
    let outcomes = std::thread::scope(|s| {
        let handles = nodes
            .iter()
            .map(|node| {
                let (validator, graph, collector) = (&validator, &graph, &collector);
                s.spawn(move || {
                    validator
                        .validate_node_with_sink(graph, &term(node), &label("Company"), collector)
                        .unwrap()
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    });
    assert_eq!(outcomes, [true, false, true, false, true, false]);
    // One explanation per failing association
    assert_eq!(collector.len(), 3);
}

#[cfg(feature = "rayon")]
#[test]
fn test_parallel_shape_map() {
    let graph = parse_turtle(
        "ex:acme ex:hasEmployee ex:alice, ex:bob .
         ex:alice ex:name \"Alice\" .
         ex:bob ex:name \"Bob\" .",
    );
    let validator = ShexValidator::new(company_schema());
    let shape_map = [
        (term("acme"), label("Company")),
        (term("alice"), label("Person")),
        (term("bob"), label("Company")),
    ];
    let sequential = validator.validate_shape_map(&graph, &shape_map).unwrap();
    let parallel = validator
        .validate_shape_map_parallel(&graph, &shape_map)
        .unwrap();
    assert_eq!(sequential.associations(), parallel.associations());
}
