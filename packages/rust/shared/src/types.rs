//! Core domain types for importkit transform runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Context key holding the active locale while a `locale_switcher` runs.
pub const LOCALE_KEY: &str = "locale";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Element
// ---------------------------------------------------------------------------

/// Identity of a source element, as known to the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub String);

impl From<&str> for ElementId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ElementId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The source record being imported. Read-only to the transform tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Stable identity used when saving targets.
    pub id: ElementId,
    /// Data-object class name (e.g. `Product`).
    #[serde(default, rename = "class")]
    pub class_name: String,
    /// Unpublished elements are only imported in admin mode.
    #[serde(default = "default_published")]
    pub published: bool,
    /// Arbitrary existing field values operators may consult.
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
}

fn default_published() -> bool {
    true
}

impl Element {
    /// Create a published element with no fields.
    pub fn new(id: impl Into<ElementId>, class_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class_name: class_name.into(),
            published: true,
            fields: serde_json::Map::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// ColumnIndex / RowData
// ---------------------------------------------------------------------------

/// Index of the cell an operator invocation concerns.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ColumnIndex(pub usize);

impl std::fmt::Display for ColumnIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw input cells for one row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowData(pub Vec<String>);

impl RowData {
    /// Cell at `column`, if the row is wide enough.
    pub fn cell(&self, column: ColumnIndex) -> Option<&str> {
        self.0.get(column.0).map(String::as_str)
    }

    /// Mutable cell at `column`, for operators that normalize in place.
    pub fn cell_mut(&mut self, column: ColumnIndex) -> Option<&mut String> {
        self.0.get_mut(column.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for RowData {
    fn from(cells: Vec<String>) -> Self {
        Self(cells)
    }
}

impl From<&[&str]> for RowData {
    fn from(cells: &[&str]) -> Self {
        Self(cells.iter().map(|c| (*c).to_string()).collect())
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Structured output accumulated for one row.
///
/// Plain fields and per-locale fields are kept apart so a localized write
/// never shadows the unlocalized value of the same name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Unlocalized field values.
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    /// Localized field values, keyed by locale then field.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub localized: BTreeMap<String, BTreeMap<String, Value>>,
}

impl Target {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` into `field`, under `locale` when one is given.
    pub fn set(&mut self, field: impl Into<String>, value: Value, locale: Option<&str>) {
        match locale {
            Some(locale) => {
                self.localized
                    .entry(locale.to_string())
                    .or_default()
                    .insert(field.into(), value);
            }
            None => {
                self.fields.insert(field.into(), value);
            }
        }
    }

    /// Unlocalized value of `field`.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Value of `field` for `locale`.
    pub fn get_localized(&self, locale: &str, field: &str) -> Option<&Value> {
        self.localized.get(locale).and_then(|f| f.get(field))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.localized.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Per-row scratch space shared by every node of one tree traversal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context(BTreeMap<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Insert a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// The active locale, if a `locale_switcher` set one.
    pub fn locale(&self) -> Option<&str> {
        self.0.get(LOCALE_KEY).and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
