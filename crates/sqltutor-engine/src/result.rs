//! Query execution results and learner-facing previews.

use serde::{Deserialize, Serialize};

/// A single value in a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    /// SQL `NULL`.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// Double-precision float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r:?}"),
            Self::Text(s) => f.write_str(s),
            Self::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Outcome of running one query.
///
/// Produced fresh by the executor on every call and never mutated. Failures
/// are carried as values: `success == false` with `error` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the query ran.
    pub success: bool,

    /// Result rows, in the order the executor produced them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Vec<CellValue>>>,

    /// Result column names, in select-list order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,

    /// Executor error message, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Creates a successful result.
    #[must_use]
    pub const fn success(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            success: true,
            rows: Some(rows),
            columns: Some(columns),
            error: None,
        }
    }

    /// Creates a failed result carrying the executor's message.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            rows: None,
            columns: None,
            error: Some(error.into()),
        }
    }

    /// Returns the rows, or an empty slice when absent.
    #[must_use]
    pub fn rows(&self) -> &[Vec<CellValue>] {
        self.rows.as_deref().unwrap_or(&[])
    }

    /// Returns the column names, or an empty slice when absent.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        self.columns.as_deref().unwrap_or(&[])
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows().len()
    }

    /// Builds a truncated preview of this result for display.
    #[must_use]
    pub fn preview(&self, limit: usize) -> ResultPreview {
        let rows = self.rows();
        let shown = rows.len().min(limit);
        ResultPreview {
            columns: self.columns().to_vec(),
            rows: rows[..shown].to_vec(),
            remaining: rows.len() - shown,
        }
    }
}

/// The first rows of a result set, plus how many were left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPreview {
    /// Column names in positional order.
    pub columns: Vec<String>,
    /// Displayed rows.
    pub rows: Vec<Vec<CellValue>>,
    /// Number of rows omitted after the displayed ones.
    pub remaining: usize,
}

impl ResultPreview {
    /// Returns `true` if rows were omitted.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.remaining > 0
    }
}

impl std::fmt::Display for ResultPreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.rows.is_empty() {
            return f.write_str("(No rows returned)");
        }

        let header = self.columns.join(" | ");
        writeln!(f, "{header}")?;
        writeln!(f, "{}", "-".repeat(header.chars().count()))?;

        for (i, row) in self.rows.iter().enumerate() {
            let line = row
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" | ");
            if i + 1 < self.rows.len() || self.is_truncated() {
                writeln!(f, "{line}")?;
            } else {
                write!(f, "{line}")?;
            }
        }

        if self.is_truncated() {
            write!(f, "... ({} more rows)", self.remaining)?;
        }
        Ok(())
    }
}
