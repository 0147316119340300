use std::fmt;

use ahash::RandomState;
use hashbrown::HashMap;
use polyq_error::{DbError, Result};

use crate::arrays::datatype::DataType;
use crate::arrays::field::ColumnSchema;

/// A column in a row shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeColumn {
    /// Alias of the source this column came from.
    pub alias: String,
    pub name: String,
    pub datatype: DataType,
}

/// Maps alias-qualified column names to flat positions in a row.
///
/// A shape may hold the same `(alias, name)` more than once, e.g. for
/// `SELECT c.City, c.City`. That's only an error once such a column is
/// referenced.
///
/// Shapes are composed as joins are compiled: the shape of `(a JOIN b) JOIN c`
/// is the concatenation of the shapes of `a`, `b` and `c`, so `b.Population`
/// resolves to the same position whether it's referenced in the second join
/// or a later one. Resolution happens once at plan time; execution only ever
/// sees positions.
#[derive(Debug, Clone, Default)]
pub struct RowShape {
    columns: Vec<ShapeColumn>,
    /// (alias, name) -> positions
    positions: HashMap<(String, String), Vec<usize>, RandomState>,
}

impl RowShape {
    pub fn new(columns: impl IntoIterator<Item = ShapeColumn>) -> Self {
        let mut shape = RowShape::default();
        for column in columns {
            shape.push(column);
        }
        shape
    }

    /// Create a shape for a single source, qualifying every column with
    /// `alias`.
    pub fn for_source(alias: &str, schema: &ColumnSchema) -> Self {
        Self::new(schema.fields.iter().map(|field| ShapeColumn {
            alias: alias.to_string(),
            name: field.name.clone(),
            datatype: field.datatype,
        }))
    }

    /// Create the shape of a joined row: all left columns followed by all
    /// right columns.
    pub fn join(left: &RowShape, right: &RowShape) -> Result<Self> {
        for alias in right.aliases() {
            if left.contains_alias(alias) {
                return Err(DbError::structural(format!(
                    "Alias '{alias}' used for more than one source in the same FROM clause"
                ))
                .with_field("alias", alias));
            }
        }

        let mut shape = left.clone();
        for column in &right.columns {
            shape.push(column.clone());
        }
        Ok(shape)
    }

    fn push(&mut self, column: ShapeColumn) {
        self.positions
            .entry((column.alias.clone(), column.name.clone()))
            .or_default()
            .push(self.columns.len());
        self.columns.push(column);
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[ShapeColumn] {
        &self.columns
    }

    pub fn column(&self, idx: usize) -> Option<&ShapeColumn> {
        self.columns.get(idx)
    }

    /// Distinct aliases in order of first appearance.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        let mut seen: Vec<&str> = Vec::new();
        self.columns.iter().filter_map(move |col| {
            if seen.contains(&col.alias.as_str()) {
                None
            } else {
                seen.push(col.alias.as_str());
                Some(col.alias.as_str())
            }
        })
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.columns.iter().any(|col| col.alias == alias)
    }

    /// Try to resolve a column, returning None if the column doesn't exist in
    /// this shape.
    ///
    /// Errors if the reference matches more than one column.
    pub fn try_resolve(&self, alias: Option<&str>, name: &str) -> Result<Option<usize>> {
        match alias {
            Some(alias) => {
                match self
                    .positions
                    .get(&(alias.to_string(), name.to_string()))
                    .map(Vec::as_slice)
                {
                    None | Some([]) => Ok(None),
                    Some([idx]) => Ok(Some(*idx)),
                    Some(_) => Err(DbError::structural(format!(
                        "Column reference '{alias}.{name}' is ambiguous"
                    ))
                    .with_field("column", format!("{alias}.{name}"))),
                }
            }
            None => {
                let mut found = None;
                for (idx, col) in self.columns.iter().enumerate() {
                    if col.name != name {
                        continue;
                    }
                    if let Some(prev) = found {
                        let prev: &ShapeColumn = &self.columns[prev];
                        return Err(DbError::structural(format!(
                            "Column reference '{name}' is ambiguous"
                        ))
                        .with_field("candidate", format!("{}.{}", prev.alias, prev.name))
                        .with_field("candidate", format!("{}.{}", col.alias, col.name)));
                    }
                    found = Some(idx);
                }
                Ok(found)
            }
        }
    }

    /// Resolve a column to its position, erroring if it doesn't exist.
    pub fn resolve(&self, alias: Option<&str>, name: &str) -> Result<usize> {
        self.try_resolve(alias, name)?.ok_or_else(|| {
            let reference = match alias {
                Some(alias) => format!("{alias}.{name}"),
                None => name.to_string(),
            };
            DbError::structural(format!("Missing column '{reference}'"))
                .with_field("available", self)
        })
    }
}

impl fmt::Display for RowShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, col) in self.columns.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}.{}", col.alias, col.name)?;
        }
        write!(f, "]")
    }
}
