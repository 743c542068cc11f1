//! Tabular values shared by the executor, the projection table and the cache.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Int(n) => write!(f, "{}", n),
            Cell::Float(x) => {
                let mut buffer = ryu::Buffer::new();
                f.write_str(buffer.format(*x))
            }
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<i64> for Cell {
    fn from(n: i64) -> Self {
        Cell::Int(n)
    }
}

impl From<f64> for Cell {
    fn from(x: f64) -> Self {
        Cell::Float(x)
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::Bool(b)
    }
}

/// Storage type of a column when cells travel as plain text.
///
/// Text columns split on how an empty field reads back: `Text` keeps it as an
/// empty string, `NullableText` as null. A column holding both, or several
/// kinds, is `Mixed` and every non-null field carries a kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Null,
    Bool,
    Int,
    Float,
    Text,
    NullableText,
    Mixed,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CellCodecError {
    #[error("Unknown column type '{0}'")]
    UnknownType(String),

    #[error("Cannot read '{raw}' as a {column_type} cell")]
    BadField { column_type: &'static str, raw: String },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Bool,
    Int,
    Float,
    Text,
}

impl ColumnType {
    /// Narrowest type that reads every cell back unchanged.
    pub fn of<'a>(cells: impl IntoIterator<Item = &'a Cell>) -> Self {
        let mut kind = None;
        let mut has_null = false;
        let mut has_empty_text = false;

        for cell in cells {
            let k = match cell {
                Cell::Null => {
                    has_null = true;
                    continue;
                }
                Cell::Bool(_) => Kind::Bool,
                Cell::Int(_) => Kind::Int,
                Cell::Float(_) => Kind::Float,
                Cell::Text(s) => {
                    has_empty_text |= s.is_empty();
                    Kind::Text
                }
            };
            match kind {
                None => kind = Some(k),
                Some(seen) if seen != k => return ColumnType::Mixed,
                Some(_) => {}
            }
        }

        match kind {
            None => ColumnType::Null,
            Some(Kind::Bool) => ColumnType::Bool,
            Some(Kind::Int) => ColumnType::Int,
            Some(Kind::Float) => ColumnType::Float,
            Some(Kind::Text) => match (has_null, has_empty_text) {
                (false, _) => ColumnType::Text,
                (true, false) => ColumnType::NullableText,
                (true, true) => ColumnType::Mixed,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Null => "null",
            ColumnType::Bool => "bool",
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
            ColumnType::NullableText => "text?",
            ColumnType::Mixed => "mixed",
        }
    }

    /// Text form of `cell` within a column of this type.
    pub fn encode(&self, cell: &Cell) -> String {
        match (self, cell) {
            (_, Cell::Null) => String::new(),
            (ColumnType::Mixed, Cell::Bool(b)) => format!("b:{}", b),
            (ColumnType::Mixed, Cell::Int(n)) => format!("i:{}", n),
            (ColumnType::Mixed, Cell::Float(_)) => format!("f:{}", cell),
            (ColumnType::Mixed, Cell::Text(s)) => format!("s:{}", s),
            _ => cell.to_string(),
        }
    }

    pub fn decode(&self, raw: &str) -> Result<Cell, CellCodecError> {
        let bad = || CellCodecError::BadField {
            column_type: self.as_str(),
            raw: raw.to_string(),
        };

        if raw.is_empty() && *self != ColumnType::Text {
            return Ok(Cell::Null);
        }
        match self {
            ColumnType::Null => Err(bad()),
            ColumnType::Bool => parse_bool(raw).ok_or_else(bad),
            ColumnType::Int => raw.parse().map(Cell::Int).map_err(|_| bad()),
            ColumnType::Float => raw.parse().map(Cell::Float).map_err(|_| bad()),
            ColumnType::Text | ColumnType::NullableText => Ok(Cell::Text(raw.to_string())),
            ColumnType::Mixed => {
                let (tag, value) = raw.split_once(':').ok_or_else(bad)?;
                match tag {
                    "b" => parse_bool(value).ok_or_else(bad),
                    "i" => value.parse().map(Cell::Int).map_err(|_| bad()),
                    "f" => value.parse().map(Cell::Float).map_err(|_| bad()),
                    "s" => Ok(Cell::Text(value.to_string())),
                    _ => Err(bad()),
                }
            }
        }
    }
}

fn parse_bool(raw: &str) -> Option<Cell> {
    match raw {
        "true" => Some(Cell::Bool(true)),
        "false" => Some(Cell::Bool(false)),
        _ => None,
    }
}

impl std::str::FromStr for ColumnType {
    type Err = CellCodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(ColumnType::Null),
            "bool" => Ok(ColumnType::Bool),
            "int" => Ok(ColumnType::Int),
            "float" => Ok(ColumnType::Float),
            "text" => Ok(ColumnType::Text),
            "text?" => Ok(ColumnType::NullableText),
            "mixed" => Ok(ColumnType::Mixed),
            other => Err(CellCodecError::UnknownType(other.to_string())),
        }
    }
}

/// One result row, keyed by column name.
pub type Record = BTreeMap<String, Cell>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("Row has {got} cells, frame has {expected} columns")]
    RowWidth { expected: usize, got: usize },
}

/// A column-named table of cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl DataFrame {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), FrameError> {
        if row.len() != self.columns.len() {
            return Err(FrameError::RowWidth {
                expected: self.columns.len(),
                got: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Build a frame from records; columns are the union of record keys in name order.
    pub fn from_records(records: &[Record]) -> Self {
        let mut columns: Vec<String> = records
            .iter()
            .flat_map(|r| r.keys().cloned())
            .collect();
        columns.sort();
        columns.dedup();

        let rows = records
            .iter()
            .map(|r| {
                columns
                    .iter()
                    .map(|c| r.get(c).cloned().unwrap_or(Cell::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }
}
