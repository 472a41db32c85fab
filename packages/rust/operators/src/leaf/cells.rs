//! Operators that rewrite a row cell in place for later siblings.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use importkit_shared::{
    ColumnIndex, ConfigError, Context, Element, RowData, Target, TransformError,
};
use regex::Regex;

use super::{read_cell, resolve_column};
use crate::element::Operator;
use crate::params::Params;

/// Replace the cell at `column` with `value`. The caller has already read the
/// cell, so the column exists.
fn replace_cell(row: &mut RowData, column: ColumnIndex, value: String) {
    if let Some(cell) = row.cell_mut(column) {
        *cell = value;
    }
}

// ---------------------------------------------------------------------------
// trim
// ---------------------------------------------------------------------------

/// Strips surrounding whitespace from a cell.
#[derive(Debug)]
pub struct TrimOperator {
    column: Option<ColumnIndex>,
}

impl TrimOperator {
    pub const KIND: &'static str = "trim";

    pub fn new(column: Option<ColumnIndex>) -> Self {
        Self { column }
    }

    pub fn from_params(params: &Params<'_>) -> Result<Self, ConfigError> {
        Ok(Self::new(params.column()?))
    }
}

impl Operator for TrimOperator {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn process(
        &self,
        _element: &Element,
        _target: &mut Target,
        row: &mut RowData,
        column: ColumnIndex,
        _context: &mut Context,
    ) -> Result<(), TransformError> {
        let column = resolve_column(self.column, column);
        let trimmed = read_cell(Self::KIND, row, column)?.trim().to_string();
        replace_cell(row, column, trimmed);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// base64
// ---------------------------------------------------------------------------

/// Decodes a base64 cell into UTF-8 text.
#[derive(Debug)]
pub struct Base64Operator {
    column: Option<ColumnIndex>,
}

impl Base64Operator {
    pub const KIND: &'static str = "base64";

    pub fn new(column: Option<ColumnIndex>) -> Self {
        Self { column }
    }

    pub fn from_params(params: &Params<'_>) -> Result<Self, ConfigError> {
        Ok(Self::new(params.column()?))
    }
}

impl Operator for Base64Operator {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn process(
        &self,
        _element: &Element,
        _target: &mut Target,
        row: &mut RowData,
        column: ColumnIndex,
        _context: &mut Context,
    ) -> Result<(), TransformError> {
        let column = resolve_column(self.column, column);
        let cell = read_cell(Self::KIND, row, column)?;

        let bytes = STANDARD
            .decode(cell.trim())
            .map_err(|e| TransformError::new(Self::KIND, column, format!("invalid base64: {e}")))?;
        let decoded = String::from_utf8(bytes).map_err(|e| {
            TransformError::new(Self::KIND, column, format!("decoded bytes are not UTF-8: {e}"))
        })?;

        replace_cell(row, column, decoded);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// regex_replace
// ---------------------------------------------------------------------------

/// Rewrites every match of `pattern` in a cell with `replacement`
/// (`$1`-style group references allowed).
#[derive(Debug)]
pub struct RegexReplaceOperator {
    pattern: Regex,
    replacement: String,
    column: Option<ColumnIndex>,
}

impl RegexReplaceOperator {
    pub const KIND: &'static str = "regex_replace";

    pub fn new(pattern: Regex, replacement: impl Into<String>, column: Option<ColumnIndex>) -> Self {
        Self {
            pattern,
            replacement: replacement.into(),
            column,
        }
    }

    pub fn from_params(params: &Params<'_>) -> Result<Self, ConfigError> {
        let raw = params.required_str("pattern")?;
        let pattern =
            Regex::new(&raw).map_err(|e| ConfigError::invalid(Self::KIND, "pattern", e.to_string()))?;
        Ok(Self::new(
            pattern,
            params.required_str("replacement")?,
            params.column()?,
        ))
    }
}

impl Operator for RegexReplaceOperator {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn process(
        &self,
        _element: &Element,
        _target: &mut Target,
        row: &mut RowData,
        column: ColumnIndex,
        _context: &mut Context,
    ) -> Result<(), TransformError> {
        let column = resolve_column(self.column, column);
        let cell = read_cell(Self::KIND, row, column)?;
        let replaced = self
            .pattern
            .replace_all(cell, self.replacement.as_str())
            .into_owned();
        replace_cell(row, column, replaced);
        Ok(())
    }
}
