//! Operators that pass values between nodes through the row context.

use importkit_shared::{
    ColumnIndex, ConfigError, Context, Element, LOCALE_KEY, RowData, Target, TransformError,
};
use serde_json::Value;

use super::{read_cell, resolve_column};
use crate::element::Operator;
use crate::params::Params;

/// Stores a cell under `key` in the row context.
#[derive(Debug)]
pub struct SetContextOperator {
    key: String,
    column: Option<ColumnIndex>,
}

impl SetContextOperator {
    pub const KIND: &'static str = "set_context";

    pub fn new(key: impl Into<String>, column: Option<ColumnIndex>) -> Self {
        Self {
            key: key.into(),
            column,
        }
    }

    pub fn from_params(params: &Params<'_>) -> Result<Self, ConfigError> {
        let key = params.required_str("key")?;
        if key == LOCALE_KEY {
            return Err(ConfigError::invalid(
                Self::KIND,
                "key",
                format!("'{LOCALE_KEY}' is reserved for locale_switcher"),
            ));
        }
        Ok(Self::new(key, params.column()?))
    }
}

impl Operator for SetContextOperator {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn process(
        &self,
        _element: &Element,
        _target: &mut Target,
        row: &mut RowData,
        column: ColumnIndex,
        context: &mut Context,
    ) -> Result<(), TransformError> {
        let column = resolve_column(self.column, column);
        let cell = read_cell(Self::KIND, row, column)?;
        context.insert(self.key.as_str(), Value::String(cell.to_string()));
        Ok(())
    }
}

/// Copies `context[key]` into a target field. A missing key fails the row.
#[derive(Debug)]
pub struct FromContextOperator {
    field: String,
    key: String,
}

impl FromContextOperator {
    pub const KIND: &'static str = "from_context";

    pub fn new(field: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            key: key.into(),
        }
    }

    pub fn from_params(params: &Params<'_>) -> Result<Self, ConfigError> {
        Ok(Self::new(
            params.required_str("field")?,
            params.required_str("key")?,
        ))
    }
}

impl Operator for FromContextOperator {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn process(
        &self,
        _element: &Element,
        target: &mut Target,
        _row: &mut RowData,
        column: ColumnIndex,
        context: &mut Context,
    ) -> Result<(), TransformError> {
        let value = context.get(&self.key).cloned().ok_or_else(|| {
            TransformError::new(
                Self::KIND,
                column,
                format!("context has no value for '{}'", self.key),
            )
        })?;
        target.set(self.field.as_str(), value, context.locale());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_then_read_context() {
        let element = Element::new("e", "Product");
        let mut target = Target::new();
        let mut row = RowData::from(&["EUR", "12"][..]);
        let mut context = Context::new();

        SetContextOperator::new("currency", None)
            .process(&element, &mut target, &mut row, ColumnIndex(0), &mut context)
            .expect("set_context");
        assert_eq!(context.get("currency"), Some(&json!("EUR")));

        FromContextOperator::new("price_currency", "currency")
            .process(&element, &mut target, &mut row, ColumnIndex(1), &mut context)
            .expect("from_context");
        assert_eq!(target.get("price_currency"), Some(&json!("EUR")));
    }

    #[test]
    fn set_context_rejects_locale_key() {
        let map = json!({ "key": "locale" });
        let map = map.as_object().expect("object");
        let err = SetContextOperator::from_params(&Params::new("set_context", map)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParam { ref param, .. } if param == "key"));

        let map = json!({ "key": "currency", "column": 1 });
        let map = map.as_object().expect("object");
        assert!(SetContextOperator::from_params(&Params::new("set_context", map)).is_ok());
    }

    #[test]
    fn from_context_missing_key_fails() {
        let err = FromContextOperator::new("x", "nope")
            .process(
                &Element::new("e", "Product"),
                &mut Target::new(),
                &mut RowData::default(),
                ColumnIndex(5),
                &mut Context::new(),
            )
            .unwrap_err();
        assert_eq!(err.column, ColumnIndex(5));
        assert!(err.cause.contains("'nope'"));
    }
}
