//! Result-set equivalence.
//!
//! Two results are equivalent when both ran, their column names match
//! position for position, and their rows are equal as multisets. Row order is
//! ignored because queries without `ORDER BY` may legitimately reorder rows.
//!
//! Cells are compared through a type-tagged canonical form:
//! - integers and reals share the numeric tag, and an integral real prints
//!   like the integer, so `1` and `1.0` are equal;
//! - text keeps its own tag, so integer `1` and text `'1'` differ;
//! - there is no numeric tolerance: `0.1 + 0.2` and `0.3` differ.

use crate::result::{CellValue, ExecutionResult};

/// Canonical, totally ordered form of a cell.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum CanonicalCell {
    Null,
    Number(String),
    Text(String),
    Blob(Vec<u8>),
}

impl From<&CellValue> for CanonicalCell {
    fn from(value: &CellValue) -> Self {
        match value {
            CellValue::Null => Self::Null,
            CellValue::Integer(i) => Self::Number(i.to_string()),
            CellValue::Real(r) => Self::Number(canonical_real(*r)),
            CellValue::Text(s) => Self::Text(s.clone()),
            CellValue::Blob(b) => Self::Blob(b.clone()),
        }
    }
}

/// Renders a float so that integral values match the integer rendering.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn canonical_real(value: f64) -> String {
    // Beyond 2^53 an f64 no longer identifies a unique integer.
    const EXACT_LIMIT: f64 = 9_007_199_254_740_992.0;

    if value.is_finite() && value.fract() == 0.0 && value.abs() <= EXACT_LIMIT {
        // -0.0 and 0.0 both land here and render as "0".
        (value as i64).to_string()
    } else {
        format!("{value:?}")
    }
}

fn canonical_rows(result: &ExecutionResult) -> Vec<Vec<CanonicalCell>> {
    let mut rows: Vec<Vec<CanonicalCell>> = result
        .rows()
        .iter()
        .map(|row| row.iter().map(CanonicalCell::from).collect())
        .collect();
    rows.sort_unstable();
    rows
}

/// Decides whether two executed results are equivalent.
///
/// Returns `false` whenever either input did not run, regardless of content.
/// When the reference fails, it is the caller's job to report that as a
/// reference defect rather than a learner mistake.
pub fn results_equivalent(a: &ExecutionResult, b: &ExecutionResult) -> bool {
    if !a.success || !b.success {
        return false;
    }

    if a.columns() != b.columns() {
        return false;
    }

    if a.row_count() != b.row_count() {
        return false;
    }

    canonical_rows(a) == canonical_rows(b)
}
