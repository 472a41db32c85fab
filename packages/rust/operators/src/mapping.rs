//! Mapping definitions and the tree builder.
//!
//! A mapping file describes the transform tree as nested nodes:
//!
//! ```json
//! {
//!   "name": "products",
//!   "root": {
//!     "kind": "iterator",
//!     "children": [
//!       { "kind": "uppercase", "params": { "field": "name", "column": 0 } },
//!       { "kind": "constant", "params": { "field": "status", "value": "imported" } }
//!     ]
//!   }
//! }
//! ```
//!
//! TOML files use the same shape. The tree is built once, before any row is
//! processed; a malformed definition fails the whole run up front.

use std::path::Path;

use importkit_shared::{ConfigError, ImportKitError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::element::ConfigElement;
use crate::params::Params;
use crate::registry::{Factory, OperatorRegistry};

/// Default limit on tree nesting.
pub const DEFAULT_MAX_DEPTH: usize = 32;

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// One node of a mapping definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
    /// Registered operator kind.
    pub kind: String,
    /// Operator parameters.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
    /// Child nodes, in execution order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDef>,
}

impl NodeDef {
    /// A node with no parameters and no children.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: Map::new(),
            children: Vec::new(),
        }
    }

    /// Add a parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Append a child.
    pub fn child(mut self, child: NodeDef) -> Self {
        self.children.push(child);
        self
    }
}

/// A named transform tree definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    /// Human-readable name, used in logs.
    pub name: String,
    /// Root of the tree.
    pub root: NodeDef,
}

/// Source format of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingFormat {
    Json,
    Toml,
}

impl MappingFormat {
    /// Pick the format from a file extension; anything but `.toml` is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

/// Parse a mapping from text.
pub fn parse_mapping(
    content: &str,
    format: MappingFormat,
) -> std::result::Result<Mapping, ConfigError> {
    match format {
        MappingFormat::Json => serde_json::from_str(content).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        }),
        MappingFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        }),
    }
}

/// Load a mapping from a `.json` or `.toml` file.
pub fn load_mapping(path: &Path) -> Result<Mapping> {
    let content = std::fs::read_to_string(path).map_err(|e| ImportKitError::io(path, e))?;
    let mapping = parse_mapping(&content, MappingFormat::from_path(path)).map_err(|e| {
        ImportKitError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    debug!(path = %path.display(), name = %mapping.name, "loaded mapping");
    Ok(mapping)
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Turns a [`NodeDef`] into an immutable [`ConfigElement`] tree.
pub struct TreeBuilder<'r> {
    registry: &'r OperatorRegistry,
    max_depth: usize,
}

impl<'r> TreeBuilder<'r> {
    pub fn new(registry: &'r OperatorRegistry) -> Self {
        Self {
            registry,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Limit how deeply the definition may nest (the root is depth 1).
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Build the whole tree, failing on the first malformed node.
    pub fn build(&self, def: &NodeDef) -> std::result::Result<ConfigElement, ConfigError> {
        let root = self.build_node(def, 1)?;
        debug!(
            root = root.kind(),
            nodes = root.node_count(),
            depth = root.depth(),
            "built transform tree"
        );
        Ok(root)
    }

    fn build_node(
        &self,
        def: &NodeDef,
        depth: usize,
    ) -> std::result::Result<ConfigElement, ConfigError> {
        if depth > self.max_depth {
            return Err(ConfigError::TooDeep {
                max_depth: self.max_depth,
            });
        }

        let factory = self
            .registry
            .get(&def.kind)
            .ok_or_else(|| ConfigError::UnknownOperator {
                kind: def.kind.clone(),
            })?;
        let params = Params::new(&def.kind, &def.params);

        match factory {
            Factory::Leaf(make) => {
                if !def.children.is_empty() {
                    return Err(ConfigError::UnexpectedChildren {
                        kind: def.kind.clone(),
                        count: def.children.len(),
                    });
                }
                Ok(ConfigElement::Leaf(make(&params)?))
            }
            Factory::Composite(make) => {
                let children = def
                    .children
                    .iter()
                    .map(|child| self.build_node(child, depth + 1))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                make(&params, children)
            }
        }
    }
}
