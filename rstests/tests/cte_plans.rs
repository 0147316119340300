use polyq_core::arrays::scalar::ScalarValue;
use polyq_core::expr::comparison_expr::ComparisonOperator;
use polyq_core::expr::{column, compare, eq, lit, unqualified};
use polyq_core::logical::query::{
    CteDefinition,
    FromNode,
    JoinKind,
    OrderByExpr,
    QueryModifiers,
    QueryNode,
    SelectExpr,
    SelectNode,
};
use polyq_core::row;
use polyq_core::runtime::cancel::CancellationToken;
use polyq_error::ErrorKind;
use rstests::{cities_source, engine_with, select, sorted, table};

fn cte(name: &str, body: SelectNode) -> CteDefinition {
    CteDefinition::new(name, QueryNode::select(body))
}

fn extract(name: &str) -> CteDefinition {
    cte(
        name,
        select(
            table("cities", "c"),
            &[("c", "City"), ("c", "Population")],
        ),
    )
}

fn transform(name: &str, from: &str, op: ComparisonOperator, population: i64) -> CteDefinition {
    cte(
        name,
        select(
            FromNode::cte(from, "e"),
            &[("e", "City"), ("e", "Population")],
        )
        .with_where(compare(op, column("e", "Population"), lit(population))),
    )
}

/// Three extracts, three transforms, one enrich joining the transforms and
/// a summary on top.
fn etl_query() -> QueryNode {
    let enrich_from = FromNode::join(
        FromNode::join(
            FromNode::cte("transform_a", "a"),
            FromNode::cte("transform_b", "b"),
            JoinKind::Inner,
            Some(eq(column("a", "City"), column("b", "City"))),
        ),
        FromNode::cte("transform_c", "c"),
        JoinKind::Inner,
        Some(eq(column("b", "City"), column("c", "City"))),
    );

    QueryNode::select(select(FromNode::cte("summary", "s"), &[("s", "City")])).with_ctes([
        extract("extract_a"),
        extract("extract_b"),
        extract("extract_c"),
        transform(
            "transform_a",
            "extract_a",
            ComparisonOperator::Gt,
            1_000_000,
        ),
        transform("transform_b", "extract_b", ComparisonOperator::Gt, 0),
        transform(
            "transform_c",
            "extract_c",
            ComparisonOperator::Lt,
            2_000_000,
        ),
        cte(
            "enrich",
            select(enrich_from, &[("a", "City"), ("a", "Population")]),
        ),
        CteDefinition::new(
            "summary",
            QueryNode::select(select(FromNode::cte("enrich", "x"), &[("x", "City")]))
                .with_modifiers(QueryModifiers {
                    order_by: vec![OrderByExpr {
                        expr: unqualified("City"),
                        desc: false,
                    }],
                    skip: None,
                    take: None,
                }),
        ),
    ])
}

#[test]
fn etl_plan_shape() {
    let engine = engine_with([("cities", cities_source())]).unwrap();
    let plan = engine.plan(&etl_query()).unwrap();
    let ctes = plan.cte_plan().unwrap();

    assert_eq!(8, ctes.total_cte_count());
    assert_eq!(4, ctes.level_count());
    assert_eq!(3, ctes.max_parallelism());
    assert!(ctes.can_parallelize());

    assert_eq!(
        vec!["extract_a", "extract_b", "extract_c"],
        ctes.levels()[0].ctes
    );
    assert_eq!(Some(2), ctes.level_of("enrich"));
    assert_eq!(Some(3), ctes.level_of("summary"));
    // Both joins in enrich are equi-joins.
    assert_eq!(2, plan.hash_join_count());
}

#[test]
fn etl_executes_level_by_level() {
    let engine = engine_with([("cities", cities_source())]).unwrap();
    let result = engine
        .execute(&etl_query(), &CancellationToken::new())
        .unwrap();

    // Over a million and under two million.
    assert_eq!(
        vec![row!["Munich"], row!["Prague"], row!["Warsaw"]],
        sorted(result.output.rows.clone())
    );

    assert_eq!(4, result.stats.cte_levels_executed());
    assert_eq!(2, result.stats.hash_tables_built());

    let timings = result.stats.cte_timings();
    assert_eq!(8, timings.len());
    let summary = timings.iter().find(|t| t.name == "summary").unwrap();
    assert_eq!(3, summary.level);
    assert_eq!(3, summary.rows);
}

#[test]
fn worker_count_does_not_change_results() {
    let mut engine = engine_with([("cities", cities_source())]).unwrap();
    let parallel = engine
        .execute(&etl_query(), &CancellationToken::new())
        .unwrap();

    engine
        .set_setting("cte_worker_threads", ScalarValue::Int64(1))
        .unwrap();
    let serial = engine
        .execute(&etl_query(), &CancellationToken::new())
        .unwrap();

    assert_eq!(parallel.output.rows, serial.output.rows);
}

#[test]
fn forward_reference_is_leveled() {
    let engine = engine_with([("cities", cities_source())]).unwrap();
    let query = QueryNode::select(select(FromNode::cte("late", "l"), &[("l", "City")]))
        .with_ctes([
            cte("late", select(FromNode::cte("early", "e"), &[("e", "City")])),
            extract("early"),
        ]);

    let plan = engine.plan(&query).unwrap();
    let ctes = plan.cte_plan().unwrap();
    assert_eq!(Some(0), ctes.level_of("early"));
    assert_eq!(Some(1), ctes.level_of("late"));

    let result = engine.execute(&query, &CancellationToken::new()).unwrap();
    assert_eq!(6, result.num_rows());
}

#[test]
fn cycle_rejected_before_any_scan() {
    let cities = cities_source();
    let engine = engine_with([("cities", cities.clone())]).unwrap();
    let query = QueryNode::select(select(table("cities", "c"), &[("c", "City")])).with_ctes([
        cte("a", select(FromNode::cte("c", "x"), &[("x", "City")])),
        cte("b", select(FromNode::cte("a", "x"), &[("x", "City")])),
        cte("c", select(FromNode::cte("b", "x"), &[("x", "City")])),
    ]);

    let err = engine
        .execute(&query, &CancellationToken::new())
        .unwrap_err();
    assert_eq!(ErrorKind::Structural, err.kind());
    assert!(err.get_field("cycle").is_some(), "{err}");
    assert!(cities.received_hints().is_empty());
}

#[test]
fn undefined_and_recursive_references() {
    let engine = engine_with([("cities", cities_source())]).unwrap();

    let undefined = QueryNode::select(select(table("cities", "c"), &[("c", "City")]))
        .with_ctes([cte(
            "a",
            select(FromNode::cte("nope", "n"), &[("n", "City")]),
        )]);
    let err = engine.plan(&undefined).unwrap_err();
    assert_eq!(ErrorKind::Structural, err.kind());
    assert_eq!(Some("nope"), err.get_field("missing"));

    let recursive = QueryNode::select(select(table("cities", "c"), &[("c", "City")]))
        .with_ctes([cte("a", select(FromNode::cte("a", "x"), &[("x", "City")]))]);
    let err = engine.plan(&recursive).unwrap_err();
    assert_eq!(ErrorKind::Structural, err.kind());
    assert_eq!(Some("a"), err.get_field("cte"));
}

#[test]
fn duplicate_names_opt_in() {
    let mut engine = engine_with([("cities", cities_source())]).unwrap();
    let query = QueryNode::select(select(FromNode::cte("a", "x"), &[("x", "City")])).with_ctes([
        extract("a"),
        cte(
            "a",
            select(table("cities", "c"), &[("c", "City")]).with_where(eq(
                column("c", "Country"),
                lit("CZ"),
            )),
        ),
    ]);

    let err = engine.plan(&query).unwrap_err();
    assert_eq!(ErrorKind::Structural, err.kind());

    engine
        .set_setting("allow_duplicate_cte_names", ScalarValue::Boolean(true))
        .unwrap();
    let result = engine.execute(&query, &CancellationToken::new()).unwrap();
    // Last definition wins.
    assert_eq!(
        vec![row!["Brno"], row!["Prague"]],
        sorted(result.output.rows.clone())
    );
}

#[test]
fn cte_group_by_keys() {
    let engine = engine_with([("cities", cities_source())]).unwrap();
    let query = QueryNode::select(select(FromNode::cte("countries", "k"), &[("k", "Country")]))
        .with_ctes([cte(
            "countries",
            SelectNode::new(
                table("cities", "c"),
                [SelectExpr::new(column("c", "Country"))],
            )
            .with_group_by([column("c", "Country")]),
        )]);

    let result = engine.execute(&query, &CancellationToken::new()).unwrap();
    assert_eq!(
        vec![row!["PL"], row!["DE"], row!["CZ"]],
        result.output.rows
    );
}
