//! Built-in leaf operators.
//!
//! Each operator reads its parameters once at build time; column targeting is
//! operator-local (an explicit `column` parameter wins over the index passed
//! down by the caller).

mod cells;
mod context;
mod fields;

use importkit_shared::{
    ColumnIndex, ConfigError, Context, Element, RowData, Target, TransformError,
};

use crate::element::Operator;
use crate::params::Params;

pub use cells::{Base64Operator, RegexReplaceOperator, TrimOperator};
pub use context::{FromContextOperator, SetContextOperator};
pub use fields::{
    ConstantOperator, IntegerOperator, PUBLISHED_FIELD, PublishedOperator, SplitterOperator,
    UppercaseOperator, ValueOperator,
};

/// Box an operator for a registry factory.
pub(crate) fn boxed<O: Operator + 'static>(op: O) -> Result<Box<dyn Operator>, ConfigError> {
    let op: Box<dyn Operator> = Box::new(op);
    Ok(op)
}

/// The column an operator acts on for this invocation.
fn resolve_column(own: Option<ColumnIndex>, passed: ColumnIndex) -> ColumnIndex {
    own.unwrap_or(passed)
}

/// Read a cell, failing with a `TransformError` when the row is too short.
fn read_cell<'r>(
    kind: &str,
    row: &'r RowData,
    column: ColumnIndex,
) -> Result<&'r str, TransformError> {
    row.cell(column).ok_or_else(|| {
        TransformError::new(
            kind,
            column,
            format!("row has {} cell(s), no column {column}", row.len()),
        )
    })
}

// ---------------------------------------------------------------------------
// ignore
// ---------------------------------------------------------------------------

/// Does nothing. Used to mark a source column as deliberately unmapped.
#[derive(Debug, Default)]
pub struct IgnoreOperator;

impl IgnoreOperator {
    pub const KIND: &'static str = "ignore";

    pub fn from_params(_params: &Params<'_>) -> Result<Self, ConfigError> {
        Ok(Self)
    }
}

impl Operator for IgnoreOperator {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn process(
        &self,
        _element: &Element,
        _target: &mut Target,
        _row: &mut RowData,
        _column: ColumnIndex,
        _context: &mut Context,
    ) -> Result<(), TransformError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_cell_out_of_range() {
        let row = RowData::from(&["a"][..]);
        let err = read_cell("value", &row, ColumnIndex(3)).unwrap_err();
        assert_eq!(err.column, ColumnIndex(3));
        assert!(err.cause.contains("1 cell(s)"));
    }

    #[test]
    fn explicit_column_wins() {
        assert_eq!(
            resolve_column(Some(ColumnIndex(2)), ColumnIndex(0)),
            ColumnIndex(2)
        );
        assert_eq!(resolve_column(None, ColumnIndex(1)), ColumnIndex(1));
    }
}
