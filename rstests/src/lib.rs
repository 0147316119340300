//! Shared fixtures for end-to-end tests.

use std::sync::Arc;

use polyq_core::arrays::datatype::DataType;
use polyq_core::arrays::field::{ColumnSchema, Field};
use polyq_core::arrays::row::Row;
use polyq_core::engine::Engine;
use polyq_core::expr::column;
use polyq_core::logical::query::{FromNode, SelectExpr, SelectNode};
use polyq_core::row;
use polyq_core::storage::memory::{MemoryCatalog, MemorySource};
use polyq_error::Result;

/// Schema name every fixture table is registered under.
pub const TEST_SCHEMA: &str = "test";

pub fn cities_schema() -> ColumnSchema {
    ColumnSchema::new([
        Field::new("City", DataType::Utf8),
        Field::new("Population", DataType::Int64),
        Field::new("Country", DataType::Utf8),
    ])
}

pub fn cities_rows() -> Vec<Row> {
    vec![
        row!["Warsaw", 1_800_000_i64, "PL"],
        row!["Krakow", 800_000_i64, "PL"],
        row!["Berlin", 3_600_000_i64, "DE"],
        row!["Munich", 1_500_000_i64, "DE"],
        row!["Prague", 1_300_000_i64, "CZ"],
        row!["Brno", 380_000_i64, "CZ"],
    ]
}

pub fn cities_source() -> Arc<MemorySource> {
    Arc::new(MemorySource::new(cities_schema(), cities_rows()))
}

/// Single column table `n` holding `0..count`.
pub fn numbers_source(count: i64) -> Arc<MemorySource> {
    Arc::new(MemorySource::new(
        ColumnSchema::new([Field::new("n", DataType::Int64)]),
        (0..count).map(|v| row![v]),
    ))
}

/// Create an engine with each source registered as `#test.<name>`.
pub fn engine_with<I>(tables: I) -> Result<Engine>
where
    I: IntoIterator<Item = (&'static str, Arc<MemorySource>)>,
{
    logutil::init_test();

    let mut catalog = MemoryCatalog::new();
    for (name, source) in tables {
        catalog.register(TEST_SCHEMA, name, source);
    }
    Engine::try_new(Arc::new(catalog))
}

pub fn table(name: &str, alias: &str) -> FromNode {
    FromNode::table(TEST_SCHEMA, name, alias)
}

/// Select qualified columns by `(alias, name)`.
pub fn select(from: FromNode, columns: &[(&str, &str)]) -> SelectNode {
    SelectNode::new(
        from,
        columns
            .iter()
            .map(|(alias, name)| SelectExpr::new(column(*alias, *name))),
    )
}

/// Sort rows by value for order-insensitive comparisons.
pub fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort_by(|a, b| {
        a.values
            .iter()
            .zip(&b.values)
            .map(|(a, b)| a.total_cmp(b))
            .find(|ord| ord.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    rows
}
