//! Extension factories: the constructor tables an entry point resolves to.

use omnihost_core::types::ExtensionDescriptor;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::extension::Extension;
use crate::isolation::IsolationContext;
use crate::value::{DependencyValue, ParamType};

/// What a constructor gets besides its positional arguments.
#[derive(Clone)]
pub struct ConstructionContext {
    pub extension_id: String,
    pub descriptor: ExtensionDescriptor,
    pub isolation: Arc<IsolationContext>,
}

pub type ConstructorFn = Arc<
    dyn Fn(&ConstructionContext, Vec<DependencyValue>) -> anyhow::Result<Arc<dyn Extension>>
        + Send
        + Sync,
>;

/// One construction signature of an extension type.
#[derive(Clone)]
pub struct ConstructorSignature {
    params: Vec<ParamType>,
    build: ConstructorFn,
}

impl ConstructorSignature {
    pub fn new<F>(params: Vec<ParamType>, build: F) -> Self
    where
        F: Fn(&ConstructionContext, Vec<DependencyValue>) -> anyhow::Result<Arc<dyn Extension>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            params,
            build: Arc::new(build),
        }
    }

    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn invoke(
        &self,
        ctx: &ConstructionContext,
        args: Vec<DependencyValue>,
    ) -> anyhow::Result<Arc<dyn Extension>> {
        (self.build)(ctx, args)
    }
}

impl fmt::Debug for ConstructorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        write!(f, "({})", params.join(", "))
    }
}

/// An extension implementation type: its entry-point name and constructors
/// in declaration order.
#[derive(Debug, Clone)]
pub struct ExtensionFactory {
    entry_point: String,
    constructors: Vec<ConstructorSignature>,
}

impl ExtensionFactory {
    pub fn new(entry_point: impl Into<String>) -> Self {
        Self {
            entry_point: entry_point.into(),
            constructors: Vec::new(),
        }
    }

    /// Adds a constructor signature.
    pub fn constructor<F>(mut self, params: Vec<ParamType>, build: F) -> Self
    where
        F: Fn(&ConstructionContext, Vec<DependencyValue>) -> anyhow::Result<Arc<dyn Extension>>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.push(ConstructorSignature::new(params, build));
        self
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn constructors(&self) -> &[ConstructorSignature] {
        &self.constructors
    }
}

/// Entry point name -> factory.
#[derive(Default)]
pub struct FactoryTable {
    factories: RwLock<HashMap<String, Arc<ExtensionFactory>>>,
}

impl FactoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory, returning the one it replaced.
    pub fn register(&self, factory: ExtensionFactory) -> Option<Arc<ExtensionFactory>> {
        let entry_point = factory.entry_point.clone();
        let previous = self
            .factories
            .write()
            .insert(entry_point.clone(), Arc::new(factory));
        if previous.is_some() {
            tracing::warn!(entry_point = %entry_point, "Replacing registered extension factory");
        }
        previous
    }

    pub fn get(&self, entry_point: &str) -> Option<Arc<ExtensionFactory>> {
        self.factories.read().get(entry_point).cloned()
    }

    pub fn contains(&self, entry_point: &str) -> bool {
        self.factories.read().contains_key(entry_point)
    }

    pub fn entry_points(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.read().is_empty()
    }
}

impl fmt::Debug for FactoryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryTable")
            .field("entry_points", &self.entry_points())
            .finish()
    }
}
