//! Operators that write into the target.

use importkit_shared::{
    ColumnIndex, ConfigError, Context, Element, RowData, Target, TransformError,
};
use serde_json::Value;

use super::{read_cell, resolve_column};
use crate::element::Operator;
use crate::params::Params;

// ---------------------------------------------------------------------------
// value
// ---------------------------------------------------------------------------

/// Copies a cell into a target field, localized when a locale is active.
///
/// An empty cell writes `default` when one is configured and is skipped
/// otherwise, so blank import columns do not clobber existing data.
#[derive(Debug)]
pub struct ValueOperator {
    field: String,
    column: Option<ColumnIndex>,
    default: Option<Value>,
}

impl ValueOperator {
    pub const KIND: &'static str = "value";

    pub fn new(
        field: impl Into<String>,
        column: Option<ColumnIndex>,
        default: Option<Value>,
    ) -> Self {
        Self {
            field: field.into(),
            column,
            default,
        }
    }

    pub fn from_params(params: &Params<'_>) -> Result<Self, ConfigError> {
        Ok(Self::new(
            params.required_str("field")?,
            params.column()?,
            params.optional_value("default"),
        ))
    }
}

impl Operator for ValueOperator {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn process(
        &self,
        _element: &Element,
        target: &mut Target,
        row: &mut RowData,
        column: ColumnIndex,
        context: &mut Context,
    ) -> Result<(), TransformError> {
        let column = resolve_column(self.column, column);
        let cell = read_cell(Self::KIND, row, column)?;

        let value = if cell.is_empty() {
            match &self.default {
                Some(default) => default.clone(),
                None => return Ok(()),
            }
        } else {
            Value::String(cell.to_string())
        };

        target.set(self.field.as_str(), value, context.locale());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// constant
// ---------------------------------------------------------------------------

/// Writes a fixed value, regardless of the row.
#[derive(Debug)]
pub struct ConstantOperator {
    field: String,
    value: Value,
}

impl ConstantOperator {
    pub const KIND: &'static str = "constant";

    pub fn new(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }

    pub fn from_params(params: &Params<'_>) -> Result<Self, ConfigError> {
        Ok(Self::new(
            params.required_str("field")?,
            params.required_value("value")?,
        ))
    }
}

impl Operator for ConstantOperator {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn process(
        &self,
        _element: &Element,
        target: &mut Target,
        _row: &mut RowData,
        _column: ColumnIndex,
        context: &mut Context,
    ) -> Result<(), TransformError> {
        target.set(self.field.as_str(), self.value.clone(), context.locale());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// uppercase
// ---------------------------------------------------------------------------

/// Writes the upper-cased cell into a target field.
#[derive(Debug)]
pub struct UppercaseOperator {
    field: String,
    column: Option<ColumnIndex>,
}

impl UppercaseOperator {
    pub const KIND: &'static str = "uppercase";

    pub fn new(field: impl Into<String>, column: Option<ColumnIndex>) -> Self {
        Self {
            field: field.into(),
            column,
        }
    }

    pub fn from_params(params: &Params<'_>) -> Result<Self, ConfigError> {
        Ok(Self::new(params.required_str("field")?, params.column()?))
    }
}

impl Operator for UppercaseOperator {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn process(
        &self,
        _element: &Element,
        target: &mut Target,
        row: &mut RowData,
        column: ColumnIndex,
        context: &mut Context,
    ) -> Result<(), TransformError> {
        let column = resolve_column(self.column, column);
        let upper = read_cell(Self::KIND, row, column)?.to_uppercase();
        target.set(self.field.as_str(), Value::String(upper), context.locale());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// integer
// ---------------------------------------------------------------------------

/// Parses a cell as a signed integer. Empty cells are skipped.
#[derive(Debug)]
pub struct IntegerOperator {
    field: String,
    column: Option<ColumnIndex>,
}

impl IntegerOperator {
    pub const KIND: &'static str = "integer";

    pub fn new(field: impl Into<String>, column: Option<ColumnIndex>) -> Self {
        Self {
            field: field.into(),
            column,
        }
    }

    pub fn from_params(params: &Params<'_>) -> Result<Self, ConfigError> {
        Ok(Self::new(params.required_str("field")?, params.column()?))
    }
}

impl Operator for IntegerOperator {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn process(
        &self,
        _element: &Element,
        target: &mut Target,
        row: &mut RowData,
        column: ColumnIndex,
        context: &mut Context,
    ) -> Result<(), TransformError> {
        let column = resolve_column(self.column, column);
        let cell = read_cell(Self::KIND, row, column)?.trim();
        if cell.is_empty() {
            return Ok(());
        }

        let n: i64 = cell.parse().map_err(|e| {
            TransformError::new(Self::KIND, column, format!("'{cell}' is not an integer: {e}"))
        })?;
        target.set(self.field.as_str(), Value::from(n), context.locale());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// published
// ---------------------------------------------------------------------------

/// Target field written by [`PublishedOperator`].
pub const PUBLISHED_FIELD: &str = "published";

/// Parses a boolean cell into the target's `published` flag.
#[derive(Debug)]
pub struct PublishedOperator {
    column: Option<ColumnIndex>,
}

impl PublishedOperator {
    pub const KIND: &'static str = "published";

    pub fn new(column: Option<ColumnIndex>) -> Self {
        Self { column }
    }

    pub fn from_params(params: &Params<'_>) -> Result<Self, ConfigError> {
        Ok(Self::new(params.column()?))
    }
}

impl Operator for PublishedOperator {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn process(
        &self,
        _element: &Element,
        target: &mut Target,
        row: &mut RowData,
        column: ColumnIndex,
        _context: &mut Context,
    ) -> Result<(), TransformError> {
        let column = resolve_column(self.column, column);
        let cell = read_cell(Self::KIND, row, column)?;
        let published = match cell.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => {
                return Err(TransformError::new(
                    Self::KIND,
                    column,
                    format!("'{cell}' is not a boolean"),
                ));
            }
        };
        target.set(PUBLISHED_FIELD, Value::Bool(published), None);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// splitter
// ---------------------------------------------------------------------------

/// Splits a cell on a delimiter and writes the trimmed, non-empty parts as an
/// array.
#[derive(Debug)]
pub struct SplitterOperator {
    field: String,
    delimiter: String,
    column: Option<ColumnIndex>,
}

impl SplitterOperator {
    pub const KIND: &'static str = "splitter";

    pub fn new(
        field: impl Into<String>,
        delimiter: impl Into<String>,
        column: Option<ColumnIndex>,
    ) -> Self {
        Self {
            field: field.into(),
            delimiter: delimiter.into(),
            column,
        }
    }

    pub fn from_params(params: &Params<'_>) -> Result<Self, ConfigError> {
        let delimiter = params.required_str("delimiter")?;
        if delimiter.is_empty() {
            return Err(ConfigError::invalid(
                Self::KIND,
                "delimiter",
                "must not be empty",
            ));
        }
        Ok(Self::new(params.required_str("field")?, delimiter, params.column()?))
    }
}

impl Operator for SplitterOperator {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn process(
        &self,
        _element: &Element,
        target: &mut Target,
        row: &mut RowData,
        column: ColumnIndex,
        context: &mut Context,
    ) -> Result<(), TransformError> {
        let column = resolve_column(self.column, column);
        let parts: Vec<Value> = read_cell(Self::KIND, row, column)?
            .split(self.delimiter.as_str())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| Value::String(part.to_string()))
            .collect();
        target.set(self.field.as_str(), Value::Array(parts), context.locale());
        Ok(())
    }
}
