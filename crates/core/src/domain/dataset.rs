use serde::{Deserialize, Serialize};
use std::fmt;

/// Column names checked (case-insensitively, in order) when labelling a row as a stock.
const STOCK_COLUMNS: [&str; 4] = ["stock", "ticker", "symbol", "name"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => f.write_str("NaN"),
            CellValue::Bool(b) => write!(f, "{b}"),
            // Spreadsheets store every number as a float; print whole numbers without ".0".
            CellValue::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

/// One spreadsheet row: column name to value, in sheet column order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    pub cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new(cells: Vec<(String, CellValue)>) -> Self {
        Self { cells }
    }

    pub fn first(&self) -> Option<&CellValue> {
        self.cells.first().map(|(_, value)| value)
    }

    /// Human label for the stock this row describes. `position` is 0-based and only used
    /// when the row carries no usable value.
    pub fn stock_label(&self, position: usize) -> String {
        let named = STOCK_COLUMNS.iter().find_map(|wanted| {
            self.cells
                .iter()
                .find(|(name, _)| name.trim().eq_ignore_ascii_case(wanted))
                .map(|(_, value)| value)
        });

        match named.or_else(|| self.first()) {
            Some(value) if !value.is_null() => value.to_string().trim().to_string(),
            _ => (position + 1).to_string(),
        }
    }
}

/// One investor's holdings, keyed by the source file name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PortfolioDataset {
    pub identifier: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl PortfolioDataset {
    pub fn new(identifier: impl Into<String>, columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            identifier: identifier.into(),
            columns,
            rows,
        }
    }

    /// Builds a dataset from a header and positional rows. Short rows are padded with nulls.
    pub fn from_table(
        identifier: impl Into<String>,
        columns: Vec<String>,
        table: Vec<Vec<CellValue>>,
    ) -> Self {
        let rows = table
            .into_iter()
            .map(|values| {
                let mut values = values.into_iter();
                Row::new(
                    columns
                        .iter()
                        .map(|c| (c.clone(), values.next().unwrap_or(CellValue::Null)))
                        .collect(),
                )
            })
            .collect();
        Self::new(identifier, columns, rows)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Non-null values of the first column, space-joined.
    pub fn first_column_text(&self) -> String {
        self.rows
            .iter()
            .filter_map(Row::first)
            .filter(|value| !value.is_null())
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
