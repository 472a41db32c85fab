//! Operator registry: maps kind names in mapping files to node factories.

use std::collections::BTreeMap;

use importkit_shared::ConfigError;

use crate::element::{
    ConfigElement, ITERATOR_KIND, LOCALE_SWITCHER_KIND, LocaleSwitcher, Operator,
};
use crate::leaf::{
    Base64Operator, ConstantOperator, FromContextOperator, IgnoreOperator, IntegerOperator,
    PublishedOperator, RegexReplaceOperator, SetContextOperator, SplitterOperator, TrimOperator,
    UppercaseOperator, ValueOperator, boxed,
};
use crate::params::Params;

/// Builds a leaf operator from its parameters.
pub type LeafFactory = fn(&Params<'_>) -> Result<Box<dyn Operator>, ConfigError>;

/// Builds a structural node from its parameters and already-built children.
pub type CompositeFactory =
    fn(&Params<'_>, Vec<ConfigElement>) -> Result<ConfigElement, ConfigError>;

/// How a registered kind turns into a tree node.
#[derive(Clone, Copy)]
pub enum Factory {
    /// Childless operator; children in the definition are rejected.
    Leaf(LeafFactory),
    /// Node that owns children.
    Composite(CompositeFactory),
}

impl Factory {
    /// `"leaf"` or `"composite"`, for listings.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Leaf(_) => "leaf",
            Self::Composite(_) => "composite",
        }
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.shape())
    }
}

/// Holds every known operator kind.
pub struct OperatorRegistry {
    factories: BTreeMap<String, Factory>,
}

impl OperatorRegistry {
    /// Create a registry with all built-in operators.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(
            ITERATOR_KIND,
            Factory::Composite(|_, children| Ok(ConfigElement::iterator(children))),
        );
        registry.register(
            LOCALE_SWITCHER_KIND,
            Factory::Composite(|p, children| {
                let locale = p.required_str("locale")?;
                if locale.is_empty() {
                    return Err(ConfigError::invalid(p.kind(), "locale", "must not be empty"));
                }
                Ok(ConfigElement::LocaleSwitcher(LocaleSwitcher::new(
                    locale, children,
                )))
            }),
        );
        registry.register(
            IgnoreOperator::KIND,
            Factory::Leaf(|p| boxed(IgnoreOperator::from_params(p)?)),
        );
        registry.register(
            ValueOperator::KIND,
            Factory::Leaf(|p| boxed(ValueOperator::from_params(p)?)),
        );
        registry.register(
            ConstantOperator::KIND,
            Factory::Leaf(|p| boxed(ConstantOperator::from_params(p)?)),
        );
        registry.register(
            UppercaseOperator::KIND,
            Factory::Leaf(|p| boxed(UppercaseOperator::from_params(p)?)),
        );
        registry.register(
            IntegerOperator::KIND,
            Factory::Leaf(|p| boxed(IntegerOperator::from_params(p)?)),
        );
        registry.register(
            PublishedOperator::KIND,
            Factory::Leaf(|p| boxed(PublishedOperator::from_params(p)?)),
        );
        registry.register(
            SplitterOperator::KIND,
            Factory::Leaf(|p| boxed(SplitterOperator::from_params(p)?)),
        );
        registry.register(
            TrimOperator::KIND,
            Factory::Leaf(|p| boxed(TrimOperator::from_params(p)?)),
        );
        registry.register(
            Base64Operator::KIND,
            Factory::Leaf(|p| boxed(Base64Operator::from_params(p)?)),
        );
        registry.register(
            RegexReplaceOperator::KIND,
            Factory::Leaf(|p| boxed(RegexReplaceOperator::from_params(p)?)),
        );
        registry.register(
            SetContextOperator::KIND,
            Factory::Leaf(|p| boxed(SetContextOperator::from_params(p)?)),
        );
        registry.register(
            FromContextOperator::KIND,
            Factory::Leaf(|p| boxed(FromContextOperator::from_params(p)?)),
        );
        registry
    }

    /// Create a registry with no operators at all.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register (or replace) the factory for `kind`. Returns the replaced one.
    pub fn register(&mut self, kind: impl Into<String>, factory: Factory) -> Option<Factory> {
        self.factories.insert(kind.into(), factory)
    }

    /// Look up the factory for `kind`.
    pub fn get(&self, kind: &str) -> Option<Factory> {
        self.factories.get(kind).copied()
    }

    /// All registered kinds, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = (&str, &Factory)> {
        self.factories.iter().map(|(k, f)| (k.as_str(), f))
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
