use std::sync::Arc;

use polyq_core::arrays::datatype::DataType;
use polyq_core::arrays::field::{ColumnSchema, Field};
use polyq_core::arrays::scalar::ScalarValue;
use polyq_core::expr::comparison_expr::ComparisonOperator;
use polyq_core::expr::{and, column, compare, eq, unqualified};
use polyq_core::logical::query::{
    FromNode,
    JoinKind,
    OrderByExpr,
    QueryModifiers,
    QueryNode,
};
use polyq_core::row;
use polyq_core::runtime::cancel::CancellationToken;
use polyq_core::storage::memory::MemorySource;
use polyq_core::storage::retrieval::QueryHints;
use polyq_error::ErrorKind;
use rstests::{cities_source, engine_with, select, sorted, table};

const ALIASES: [&str; 5] = ["t0", "t1", "t2", "t3", "t4"];

fn capitals_source() -> Arc<MemorySource> {
    Arc::new(MemorySource::new(
        ColumnSchema::new([
            Field::new("Country", DataType::Utf8),
            Field::new("Capital", DataType::Utf8),
        ]),
        [
            row!["PL", "Warsaw"],
            row!["DE", "Berlin"],
            row!["FR", "Paris"],
        ],
    ))
}

/// `t0 JOIN t1 ON t0.City = t1.City JOIN t2 ON t1.City = t2.City ...`
fn join_chain(joins: usize) -> FromNode {
    let mut from = table("cities", ALIASES[0]);
    for idx in 1..=joins {
        from = FromNode::join(
            from,
            table("cities", ALIASES[idx]),
            JoinKind::Inner,
            Some(eq(
                column(ALIASES[idx - 1], "City"),
                column(ALIASES[idx], "City"),
            )),
        );
    }
    from
}

#[test]
fn n_way_equi_join_builds_n_hash_tables() {
    for joins in 1..=4 {
        let cities = cities_source();
        let engine = engine_with([("cities", cities.clone())]).unwrap();
        let query = QueryNode::select(select(
            join_chain(joins),
            &[(ALIASES[joins], "City"), (ALIASES[0], "Population")],
        ));

        let plan = engine.plan(&query).unwrap();
        assert_eq!(joins, plan.hash_join_count());

        let result = engine.execute_plan(&plan, &CancellationToken::new()).unwrap();
        assert_eq!(joins, result.stats.hash_tables_built(), "joins: {joins}");
        assert_eq!(0, result.stats.nested_loop_joins());
        assert_eq!(6, result.num_rows());

        // Multi-table queries never receive hints.
        for hints in cities.received_hints() {
            assert_eq!(QueryHints::NONE, hints);
        }
    }
}

#[test]
fn chained_keys_reference_earlier_tables() {
    // Third join keys on the first table, not the one just joined.
    let engine = engine_with([("cities", cities_source()), ("capitals", capitals_source())])
        .unwrap();
    let from = FromNode::join(
        FromNode::join(
            table("cities", "a"),
            table("cities", "b"),
            JoinKind::Inner,
            Some(eq(column("a", "City"), column("b", "City"))),
        ),
        table("capitals", "k"),
        JoinKind::Inner,
        Some(eq(column("k", "Capital"), column("a", "City"))),
    );
    let query = QueryNode::select(select(from, &[("k", "Country"), ("b", "City")]));

    let result = engine.execute(&query, &CancellationToken::new()).unwrap();
    assert_eq!(2, result.stats.hash_tables_built());
    assert_eq!(
        vec![row!["DE", "Berlin"], row!["PL", "Warsaw"]],
        sorted(result.output.rows.clone())
    );
}

#[test]
fn left_outer_preserves_every_left_row() {
    let engine = engine_with([("cities", cities_source()), ("capitals", capitals_source())])
        .unwrap();
    let from = FromNode::join(
        table("cities", "c"),
        table("capitals", "k"),
        JoinKind::Left,
        Some(eq(column("c", "City"), column("k", "Capital"))),
    );
    let query = QueryNode::select(select(
        from,
        &[("c", "City"), ("k", "Country"), ("k", "Capital")],
    ));

    let result = engine.execute(&query, &CancellationToken::new()).unwrap();
    let rows = result.output.rows;

    // n = 6 left rows, k = 2 of them match.
    assert_eq!(6, rows.len());
    let unmatched: Vec<_> = rows
        .iter()
        .filter(|row| row.values[1..].iter().all(ScalarValue::is_null))
        .collect();
    assert_eq!(4, unmatched.len());
    assert!(rows.contains(&row!["Warsaw", "PL", "Warsaw"]));
}

#[test]
fn right_and_full_outer() {
    let engine = engine_with([("cities", cities_source()), ("capitals", capitals_source())])
        .unwrap();
    let join = |kind| {
        QueryNode::select(select(
            FromNode::join(
                table("cities", "c"),
                table("capitals", "k"),
                kind,
                Some(eq(column("c", "City"), column("k", "Capital"))),
            ),
            &[("c", "City"), ("k", "Capital")],
        ))
    };

    let right = engine
        .execute(&join(JoinKind::Right), &CancellationToken::new())
        .unwrap();
    assert_eq!(
        vec![
            row![None::<&str>, "Paris"],
            row!["Berlin", "Berlin"],
            row!["Warsaw", "Warsaw"],
        ],
        sorted(right.output.rows.clone())
    );

    let full = engine
        .execute(&join(JoinKind::Full), &CancellationToken::new())
        .unwrap();
    // 2 matched, 4 unmatched cities, 1 unmatched capital.
    assert_eq!(7, full.num_rows());
}

#[test]
fn hash_joins_disabled_match_hash_results() {
    let mut engine = engine_with([("cities", cities_source()), ("capitals", capitals_source())])
        .unwrap();
    let query = QueryNode::select(select(
        FromNode::join(
            table("cities", "c"),
            table("capitals", "k"),
            JoinKind::Left,
            Some(eq(column("c", "Country"), column("k", "Country"))),
        ),
        &[("c", "City"), ("k", "Capital")],
    ));

    let hashed = engine.execute(&query, &CancellationToken::new()).unwrap();
    assert_eq!(1, hashed.stats.hash_tables_built());

    engine
        .set_setting("enable_hash_joins", ScalarValue::Boolean(false))
        .unwrap();
    let looped = engine.execute(&query, &CancellationToken::new()).unwrap();
    assert_eq!(0, looped.stats.hash_tables_built());
    assert_eq!(1, looped.stats.nested_loop_joins());

    assert_eq!(
        sorted(hashed.output.rows.clone()),
        sorted(looped.output.rows.clone())
    );
}

#[test]
fn non_equi_condition_falls_back_to_nested_loop() {
    let engine = engine_with([("cities", cities_source())]).unwrap();
    let query = QueryNode::select(select(
        FromNode::join(
            table("cities", "a"),
            table("cities", "b"),
            JoinKind::Inner,
            Some(and([
                eq(column("a", "Country"), column("b", "Country")),
                compare(
                    ComparisonOperator::Lt,
                    column("a", "Population"),
                    column("b", "Population"),
                ),
            ])),
        ),
        &[("a", "City"), ("b", "City")],
    ));

    let plan = engine.plan(&query).unwrap();
    assert_eq!(0, plan.hash_join_count());

    let result = engine.execute_plan(&plan, &CancellationToken::new()).unwrap();
    assert_eq!(1, result.stats.nested_loop_joins());
    assert_eq!(
        vec![
            row!["Brno", "Prague"],
            row!["Krakow", "Warsaw"],
            row!["Munich", "Berlin"],
        ],
        sorted(result.output.rows.clone())
    );
}

#[test]
fn cross_join() {
    let engine = engine_with([("cities", cities_source()), ("capitals", capitals_source())])
        .unwrap();
    let query = QueryNode::select(select(
        FromNode::join(
            table("cities", "c"),
            table("capitals", "k"),
            JoinKind::Cross,
            None,
        ),
        &[("c", "City"), ("k", "Capital")],
    ));

    let result = engine.execute(&query, &CancellationToken::new()).unwrap();
    assert_eq!(18, result.num_rows());
}

#[test]
fn ambiguous_unqualified_key_is_structural() {
    let engine = engine_with([("cities", cities_source())]).unwrap();
    let query = QueryNode::select(select(
        FromNode::join(
            table("cities", "a"),
            table("cities", "b"),
            JoinKind::Inner,
            Some(eq(unqualified("City"), column("b", "City"))),
        ),
        &[("a", "City")],
    ));

    let err = engine.plan(&query).unwrap_err();
    assert_eq!(ErrorKind::Structural, err.kind());
}

#[test]
fn null_filled_rows_match_in_later_join() {
    let engine = engine_with([("cities", cities_source()), ("capitals", capitals_source())])
        .unwrap();
    // No city is named after a country, so every `k` column is null-filled.
    // The rows still carry `a.City` into the next join.
    let from = FromNode::join(
        FromNode::join(
            table("cities", "a"),
            table("capitals", "k"),
            JoinKind::Left,
            Some(eq(column("a", "City"), column("k", "Country"))),
        ),
        table("cities", "c"),
        JoinKind::Inner,
        Some(eq(column("a", "City"), column("c", "City"))),
    );
    let query = QueryNode::select(select(
        from,
        &[("a", "City"), ("k", "Capital"), ("c", "Country")],
    ));

    let plan = engine.plan(&query).unwrap();
    assert_eq!(2, plan.hash_join_count());

    let result = engine.execute_plan(&plan, &CancellationToken::new()).unwrap();
    assert_eq!(
        vec![
            row!["Berlin", None::<&str>, "DE"],
            row!["Brno", None::<&str>, "CZ"],
            row!["Krakow", None::<&str>, "PL"],
            row!["Munich", None::<&str>, "DE"],
            row!["Prague", None::<&str>, "CZ"],
            row!["Warsaw", None::<&str>, "PL"],
        ],
        sorted(result.output.rows.clone())
    );
}

#[test]
fn nan_keys_agree_across_strategies() {
    let floats = Arc::new(MemorySource::new(
        ColumnSchema::new([Field::new("f", DataType::Float64)]),
        [row![f64::NAN], row![1.5_f64], row![None::<f64>]],
    ));
    let mut engine = engine_with([("floats", floats)]).unwrap();
    let join = |kind| {
        QueryNode::select(select(
            FromNode::join(
                table("floats", "a"),
                table("floats", "b"),
                kind,
                Some(eq(column("a", "f"), column("b", "f"))),
            ),
            &[("a", "f"), ("b", "f")],
        ))
    };

    let run = |engine: &polyq_core::engine::Engine, kind| {
        sorted(
            engine
                .execute(&join(kind), &CancellationToken::new())
                .unwrap()
                .output
                .rows,
        )
    };

    let hashed_inner = run(&engine, JoinKind::Inner);
    let hashed_left = run(&engine, JoinKind::Left);
    assert_eq!(vec![row![1.5_f64, 1.5_f64]], hashed_inner);
    assert_eq!(3, hashed_left.len());

    engine
        .set_setting("enable_hash_joins", ScalarValue::Boolean(false))
        .unwrap();
    assert_eq!(hashed_inner, run(&engine, JoinKind::Inner));
    assert_eq!(hashed_left, run(&engine, JoinKind::Left));
}

#[test]
fn repeated_projection_ambiguous_only_when_referenced() {
    let engine = engine_with([("cities", cities_source())]).unwrap();
    let query = QueryNode::select(select(table("cities", "c"), &[("c", "City"), ("c", "City")]));

    let result = engine.execute(&query, &CancellationToken::new()).unwrap();
    assert_eq!(6, result.num_rows());
    let rows = &result.output.rows;
    assert!(rows.iter().all(|row| row.values[0] == row.values[1]));

    let ordered = query.with_modifiers(QueryModifiers {
        order_by: vec![OrderByExpr {
            expr: unqualified("City"),
            desc: false,
        }],
        skip: None,
        take: None,
    });
    let err = engine.plan(&ordered).unwrap_err();
    assert_eq!(ErrorKind::Structural, err.kind());
}
