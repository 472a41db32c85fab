//! Element batch input files.
//!
//! The input is a JSON array of records:
//!
//! ```json
//! [
//!   { "id": "p-1", "class": "Product", "published": true,
//!     "fields": { "sku": "A-1" }, "rows": [["alice", "12"], ["bob", "x"]] }
//! ]
//! ```

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr, eyre};
use importkit_shared::{Element, RowData};
use serde::Deserialize;

/// One element and the rows to import for it.
#[derive(Debug, Deserialize)]
struct InputRecord {
    #[serde(flatten)]
    element: Element,
    #[serde(default)]
    rows: Vec<Vec<String>>,
}

/// A parsed batch, split into the two parallel sequences the runner takes.
#[derive(Debug, Default)]
pub(crate) struct Batch {
    pub elements: Vec<Element>,
    pub rows: Vec<Vec<RowData>>,
}

impl Batch {
    pub fn row_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }
}

/// Parse a batch from JSON text.
pub(crate) fn parse_batch(content: &str) -> Result<Batch> {
    let records: Vec<InputRecord> = serde_json::from_str(content)?;

    let mut batch = Batch::default();
    for record in records {
        if record.element.id.0.is_empty() {
            return Err(eyre!("element with empty id in input"));
        }
        batch.elements.push(record.element);
        batch
            .rows
            .push(record.rows.into_iter().map(RowData::from).collect());
    }
    Ok(batch)
}

/// Load a batch from a JSON file.
pub(crate) fn load_batch(path: &Path) -> Result<Batch> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read input '{}'", path.display()))?;
    parse_batch(&content).wrap_err_with(|| format!("invalid input file '{}'", path.display()))
}
