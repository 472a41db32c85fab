//! Typed access to a node's configuration parameters.

use importkit_shared::{ColumnIndex, ConfigError};
use serde_json::{Map, Value};

/// Parameters of one mapping node, tagged with the node's kind so every
/// lookup failure names the operator it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    kind: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Params<'a> {
    pub fn new(kind: &'a str, map: &'a Map<String, Value>) -> Self {
        Self { kind, map }
    }

    pub fn kind(&self) -> &'a str {
        self.kind
    }

    /// A required string parameter.
    pub fn required_str(&self, name: &str) -> Result<String, ConfigError> {
        self.optional_str(name)?
            .ok_or_else(|| ConfigError::missing(self.kind, name))
    }

    /// An optional string parameter; present but non-string is an error.
    pub fn optional_str(&self, name: &str) -> Result<Option<String>, ConfigError> {
        match self.map.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(ConfigError::invalid(
                self.kind,
                name,
                format!("expected a string, got {other}"),
            )),
        }
    }

    /// A required parameter of any JSON type.
    pub fn required_value(&self, name: &str) -> Result<Value, ConfigError> {
        self.map
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::missing(self.kind, name))
    }

    /// An optional parameter of any JSON type.
    pub fn optional_value(&self, name: &str) -> Option<Value> {
        self.map.get(name).cloned()
    }

    /// The optional `column` parameter pinning an operator to one cell.
    pub fn column(&self) -> Result<Option<ColumnIndex>, ConfigError> {
        match self.map.get("column") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .map(|n| Some(ColumnIndex(n)))
                .ok_or_else(|| {
                    ConfigError::invalid(self.kind, "column", "expected a non-negative integer")
                }),
            Some(other) => Err(ConfigError::invalid(
                self.kind,
                "column",
                format!("expected a non-negative integer, got {other}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test params must be an object"),
        }
    }

    #[test]
    fn required_str_reports_kind() {
        let m = map(json!({}));
        let params = Params::new("constant", &m);
        let err = params.required_str("field").unwrap_err();
        assert_eq!(err, ConfigError::missing("constant", "field"));
    }

    #[test]
    fn wrong_type_is_invalid() {
        let m = map(json!({ "field": 3 }));
        let params = Params::new("value", &m);
        assert!(matches!(
            params.required_str("field"),
            Err(ConfigError::InvalidParam { .. })
        ));
    }

    #[test]
    fn column_parsing() {
        let m = map(json!({ "column": 2 }));
        assert_eq!(Params::new("trim", &m).column(), Ok(Some(ColumnIndex(2))));

        let m = map(json!({}));
        assert_eq!(Params::new("trim", &m).column(), Ok(None));

        let m = map(json!({ "column": -1 }));
        assert!(Params::new("trim", &m).column().is_err());

        let m = map(json!({ "column": "0" }));
        assert!(Params::new("trim", &m).column().is_err());
    }
}
