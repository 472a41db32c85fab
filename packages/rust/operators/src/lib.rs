//! The column transform tree.
//!
//! This crate provides:
//! - [`Operator`]: the unit of transform behavior
//! - [`ConfigElement`]: a tree node, with the [`Composite`] ("iterator") and
//!   [`LocaleSwitcher`] structural variants
//! - [`leaf`]: built-in leaf operators
//! - [`OperatorRegistry`]: kind name → node factory
//! - [`mapping`]: mapping definitions and the [`TreeBuilder`]

pub mod element;
pub mod leaf;
pub mod mapping;
pub mod params;
pub mod registry;

pub use element::{
    Composite, ConfigElement, ITERATOR_KIND, LOCALE_SWITCHER_KIND, LocaleSwitcher, Operator,
};
pub use mapping::{
    DEFAULT_MAX_DEPTH, Mapping, MappingFormat, NodeDef, TreeBuilder, load_mapping, parse_mapping,
};
pub use params::Params;
pub use registry::{CompositeFactory, Factory, LeafFactory, OperatorRegistry};
