//! The transform tree: the [`Operator`] capability, tree nodes, and the
//! composite operators that recurse into children.

use std::fmt;

use importkit_shared::{
    ColumnIndex, Context, Element, LOCALE_KEY, RowData, Target, TransformError,
};
use serde_json::Value;

/// Kind name of the sequential composite.
pub const ITERATOR_KIND: &str = "iterator";

/// Kind name of the locale-scoping composite.
pub const LOCALE_SWITCHER_KIND: &str = "locale_switcher";

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A unit of transform behavior.
///
/// `process` communicates only through its mutable arguments; success is
/// silent. Implementations must validate their input before writing so that a
/// failure leaves `target` untouched by the failing operator.
pub trait Operator: Send + Sync + fmt::Debug {
    /// Kind name used in mapping files, errors and logs.
    fn kind(&self) -> &str;

    /// Apply the operator to one row.
    fn process(
        &self,
        element: &Element,
        target: &mut Target,
        row: &mut RowData,
        column: ColumnIndex,
        context: &mut Context,
    ) -> Result<(), TransformError>;
}

// ---------------------------------------------------------------------------
// ConfigElement
// ---------------------------------------------------------------------------

/// One node of a transform tree.
///
/// Leaves are open-ended through [`Operator`]; the structural variants are a
/// closed set so that child traversal never goes through dynamic dispatch.
#[derive(Debug)]
pub enum ConfigElement {
    /// A concrete operator with no children.
    Leaf(Box<dyn Operator>),
    /// Runs children in order.
    Composite(Composite),
    /// Runs children with a locale set in the context.
    LocaleSwitcher(LocaleSwitcher),
}

impl ConfigElement {
    /// Wrap a concrete operator as a leaf node.
    pub fn leaf(operator: impl Operator + 'static) -> Self {
        Self::Leaf(Box::new(operator))
    }

    /// Build an `iterator` node over `children`.
    pub fn iterator(children: Vec<ConfigElement>) -> Self {
        Self::Composite(Composite::new(children))
    }

    /// Kind name of this node.
    pub fn kind(&self) -> &str {
        match self {
            Self::Leaf(op) => op.kind(),
            Self::Composite(c) => c.kind(),
            Self::LocaleSwitcher(l) => l.kind(),
        }
    }

    /// Children in configured order; empty for leaves.
    pub fn children(&self) -> &[ConfigElement] {
        match self {
            Self::Leaf(_) => &[],
            Self::Composite(c) => c.children(),
            Self::LocaleSwitcher(l) => l.children.children(),
        }
    }

    /// Number of levels in the subtree rooted here (a lone leaf is 1).
    pub fn depth(&self) -> usize {
        1 + self
            .children()
            .iter()
            .map(ConfigElement::depth)
            .max()
            .unwrap_or(0)
    }

    /// Number of nodes in the subtree rooted here.
    pub fn node_count(&self) -> usize {
        1 + self
            .children()
            .iter()
            .map(ConfigElement::node_count)
            .sum::<usize>()
    }

    /// Evaluate this subtree against one row.
    pub fn process(
        &self,
        element: &Element,
        target: &mut Target,
        row: &mut RowData,
        column: ColumnIndex,
        context: &mut Context,
    ) -> Result<(), TransformError> {
        match self {
            Self::Leaf(op) => op.process(element, target, row, column, context),
            Self::Composite(c) => c.process(element, target, row, column, context),
            Self::LocaleSwitcher(l) => l.process(element, target, row, column, context),
        }
    }
}

// ---------------------------------------------------------------------------
// Composite ("iterator")
// ---------------------------------------------------------------------------

/// Invokes each child in declared order with the same arguments.
///
/// Fail-fast: the first child error is returned unchanged and later siblings
/// are not invoked.
#[derive(Debug, Default)]
pub struct Composite {
    children: Vec<ConfigElement>,
}

impl Composite {
    pub fn new(children: Vec<ConfigElement>) -> Self {
        Self { children }
    }

    pub fn children(&self) -> &[ConfigElement] {
        &self.children
    }
}

impl Operator for Composite {
    fn kind(&self) -> &str {
        ITERATOR_KIND
    }

    fn process(
        &self,
        element: &Element,
        target: &mut Target,
        row: &mut RowData,
        column: ColumnIndex,
        context: &mut Context,
    ) -> Result<(), TransformError> {
        for child in &self.children {
            child.process(element, target, row, column, context)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LocaleSwitcher
// ---------------------------------------------------------------------------

/// Runs its children with `context["locale"]` set, so locale-aware operators
/// write localized fields. The previous locale is restored afterwards, on
/// failure too.
#[derive(Debug)]
pub struct LocaleSwitcher {
    locale: String,
    children: Composite,
}

impl LocaleSwitcher {
    pub fn new(locale: impl Into<String>, children: Vec<ConfigElement>) -> Self {
        Self {
            locale: locale.into(),
            children: Composite::new(children),
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }
}

impl Operator for LocaleSwitcher {
    fn kind(&self) -> &str {
        LOCALE_SWITCHER_KIND
    }

    fn process(
        &self,
        element: &Element,
        target: &mut Target,
        row: &mut RowData,
        column: ColumnIndex,
        context: &mut Context,
    ) -> Result<(), TransformError> {
        let previous = context.insert(LOCALE_KEY, Value::String(self.locale.clone()));
        let result = self.children.process(element, target, row, column, context);
        match previous {
            Some(value) => {
                context.insert(LOCALE_KEY, value);
            }
            None => {
                context.remove(LOCALE_KEY);
            }
        }
        result
    }
}
