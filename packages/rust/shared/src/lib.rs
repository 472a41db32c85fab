//! Shared types, error model, and configuration for importkit.
//!
//! This crate is the foundation depended on by all other importkit crates.
//! It provides:
//! - [`ImportKitError`] and the per-class errors ([`TransformError`],
//!   [`PersistError`], [`ConfigError`])
//! - Domain types ([`Element`], [`Target`], [`RowData`], [`Context`], [`RunId`])
//! - The [`Persister`] seam
//! - Configuration ([`AppConfig`], [`RunSettings`], config loading)

pub mod config;
pub mod error;
pub mod persist;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, RunSettings, StorageConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_config,
};
pub use error::{ConfigError, ImportKitError, PersistError, Result, TransformError};
pub use persist::Persister;
pub use types::{
    ColumnIndex, Context, Element, ElementId, LOCALE_KEY, RowData, RunId, Target,
};
