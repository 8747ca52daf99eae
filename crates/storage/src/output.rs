//! Query results and their text rendering.

use std::fmt::{self, Write as _};

use rusqlite::types::Value;

/// Text returned for statements that produce no rows.
pub const NO_ROWS: &str = "Query ran successfully.";

const SEPARATOR: &str = " | ";

/// Everything a statement produced.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    /// Result column names; empty for statements without a result set.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryOutput {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One header line of column names, then one line per row.
///
/// Text values are written verbatim, so a value containing ` | ` or a
/// newline cannot be told apart from a column or row boundary. Callers that
/// need exact values should read [`QueryOutput::rows`] instead.
impl fmt::Display for QueryOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return f.write_str(NO_ROWS);
        }

        f.write_str(&self.columns.join(SEPARATOR))?;
        for row in &self.rows {
            f.write_char('\n')?;
            for (i, value) in row.iter().enumerate() {
                if i > 0 {
                    f.write_str(SEPARATOR)?;
                }
                write_value(f, value)?;
            }
        }
        Ok(())
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Null => f.write_str("NULL"),
        Value::Integer(i) => write!(f, "{i}"),
        Value::Real(r) => write!(f, "{r}"),
        Value::Text(s) => f.write_str(s),
        Value::Blob(bytes) => {
            f.write_str("x'")?;
            for b in bytes {
                write!(f, "{b:02X}")?;
            }
            f.write_char('\'')
        }
    }
}
