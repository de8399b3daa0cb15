//! Dynamic instantiation of extension types.
//!
//! Constructors are tried tier by tier, each tier in declaration order:
//!
//! 1. exact: every argument has exactly the declared parameter type
//! 2. compatible: numeric representations are interchangeable, `any`
//!    accepts everything, optional parameters accept null and default
//!    envelopes are unwrapped first
//! 3. arity: any constructor with the right parameter count
//!
//! Each constructor is invoked at most once, in the first tier it matches.
//! Arguments are coerced to the chosen signature before invocation. When
//! every tier fails the instantiator either builds a [`SyntheticExtension`]
//! or reports [`InstantiationError::NoUsableConstructor`].

use async_trait::async_trait;
use omnihost_core::error::InstantiationError;
use omnihost_core::types::ExtensionDescriptor;
use omnihost_extension_api::{
    ConstructionContext, ConstructorSignature, DependencyValue, Extension, ExtensionFactory,
    ExtensionState, IsolationContext, ParamType,
};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchTier {
    Exact,
    Compatible,
    Arity,
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchTier::Exact => write!(f, "exact"),
            MatchTier::Compatible => write!(f, "compatible"),
            MatchTier::Arity => write!(f, "arity"),
        }
    }
}

const TIERS: [MatchTier; 3] = [MatchTier::Exact, MatchTier::Compatible, MatchTier::Arity];

/// Builds extension instances from factories and positional dependencies.
#[derive(Debug, Clone)]
pub struct DynamicInstantiator {
    synthetic_fallback: bool,
}

impl Default for DynamicInstantiator {
    fn default() -> Self {
        Self::new(true)
    }
}

impl DynamicInstantiator {
    pub fn new(synthetic_fallback: bool) -> Self {
        Self { synthetic_fallback }
    }

    pub fn synthetic_fallback(&self) -> bool {
        self.synthetic_fallback
    }

    /// Instantiates `factory` for `descriptor` with `args`.
    pub fn instantiate(
        &self,
        factory: &ExtensionFactory,
        isolation: Arc<IsolationContext>,
        descriptor: &ExtensionDescriptor,
        args: Vec<DependencyValue>,
    ) -> Result<Arc<dyn Extension>, InstantiationError> {
        let ctx = ConstructionContext {
            extension_id: descriptor.id.clone(),
            descriptor: descriptor.clone(),
            isolation,
        };

        let mut failures = Vec::new();
        let mut tried = HashSet::new();
        for tier in TIERS {
            for (index, signature) in factory.constructors().iter().enumerate() {
                if tried.contains(&index) || !signature_matches(tier, signature.params(), &args) {
                    continue;
                }
                tried.insert(index);

                debug!(
                    extension_id = %descriptor.id,
                    tier = %tier,
                    constructor = index,
                    signature = ?signature,
                    "Invoking constructor"
                );
                match invoke(signature, &ctx, &args) {
                    Ok(instance) => return Ok(instance),
                    Err(e) => {
                        warn!(
                            extension_id = %descriptor.id,
                            tier = %tier,
                            signature = ?signature,
                            error = %e,
                            "Constructor failed"
                        );
                        failures.push(format!("{} {:?}: {}", tier, signature, e));
                    }
                }
            }
        }

        let reason = if failures.is_empty() {
            format!(
                "no constructor of {} accepts {} argument(s)",
                factory.constructors().len(),
                args.len()
            )
        } else {
            failures.join("; ")
        };

        if self.synthetic_fallback {
            error!(
                extension_id = %descriptor.id,
                entry_point = %factory.entry_point(),
                reason = %reason,
                "Falling back to a synthetic extension; it serves nothing"
            );
            let instance: Arc<dyn Extension> =
                Arc::new(SyntheticExtension::new(descriptor, ctx.isolation));
            return Ok(instance);
        }

        Err(InstantiationError::no_constructor(
            &descriptor.id,
            factory.entry_point(),
            reason,
        ))
    }
}

fn invoke(
    signature: &ConstructorSignature,
    ctx: &ConstructionContext,
    args: &[DependencyValue],
) -> anyhow::Result<Arc<dyn Extension>> {
    let coerced = signature
        .params()
        .iter()
        .zip(args.iter().cloned())
        .map(|(param, value)| coerce(param, value, &ctx.extension_id))
        .collect();
    signature.invoke(ctx, coerced)
}

fn signature_matches(tier: MatchTier, params: &[ParamType], args: &[DependencyValue]) -> bool {
    if params.len() != args.len() {
        return false;
    }
    match tier {
        MatchTier::Exact => params.iter().zip(args).all(|(p, a)| accepts_exact(p, a)),
        MatchTier::Compatible => params.iter().zip(args).all(|(p, a)| accepts_compatible(p, a)),
        MatchTier::Arity => true,
    }
}

fn accepts_exact(param: &ParamType, value: &DependencyValue) -> bool {
    match (param, value) {
        (ParamType::Optional(_), DependencyValue::Null) => true,
        (ParamType::Optional(inner), value) => accepts_exact(inner, value),
        (ParamType::Bool, DependencyValue::Bool(_))
        | (ParamType::Int, DependencyValue::Int(_))
        | (ParamType::Long, DependencyValue::Long(_))
        | (ParamType::Float, DependencyValue::Float(_))
        | (ParamType::Double, DependencyValue::Double(_))
        | (ParamType::Text, DependencyValue::Text(_)) => true,
        (ParamType::Object { type_id, .. }, DependencyValue::Object(obj)) => {
            obj.type_id() == *type_id
        }
        _ => false,
    }
}

fn accepts_compatible(param: &ParamType, value: &DependencyValue) -> bool {
    let value = match value {
        DependencyValue::Default(_) => value.clone().unwrap_default(),
        other => other.clone(),
    };
    match (param, &value) {
        (ParamType::Any, _) => true,
        (ParamType::Optional(_), DependencyValue::Null) => true,
        (ParamType::Optional(inner), value) => accepts_compatible(inner, value),
        (param, value) if param.is_numeric() && value.is_numeric() => true,
        (param, value) => accepts_exact(param, value),
    }
}

/// Coerces one argument to `param`; anything that cannot be converted
/// becomes `Null`.
fn coerce(param: &ParamType, value: DependencyValue, extension_id: &str) -> DependencyValue {
    let value = value.unwrap_default();
    if value.is_null() {
        return value;
    }

    let coerced = match param.base() {
        ParamType::Any => Some(value.clone()),
        ParamType::Bool => value.as_bool().map(DependencyValue::Bool),
        ParamType::Int => value
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(DependencyValue::Int),
        ParamType::Long => value.as_i64().map(DependencyValue::Long),
        ParamType::Float => value.as_f64().map(|v| DependencyValue::Float(v as f32)),
        ParamType::Double => value.as_f64().map(DependencyValue::Double),
        ParamType::Text => Some(DependencyValue::Text(stringify(&value))),
        ParamType::Object { type_id, .. } => match &value {
            DependencyValue::Object(obj) if obj.type_id() == *type_id => Some(value.clone()),
            _ => None,
        },
        // base() never returns Optional
        ParamType::Optional(_) => None,
    };

    coerced.unwrap_or_else(|| {
        warn!(
            extension_id = %extension_id,
            expected = %param,
            actual = %value.kind(),
            "Cannot coerce dependency, passing null"
        );
        DependencyValue::Null
    })
}

fn stringify(value: &DependencyValue) -> String {
    match value {
        DependencyValue::Null => String::new(),
        DependencyValue::Bool(v) => v.to_string(),
        DependencyValue::Int(v) => v.to_string(),
        DependencyValue::Long(v) => v.to_string(),
        DependencyValue::Float(v) => v.to_string(),
        DependencyValue::Double(v) => v.to_string(),
        DependencyValue::Text(v) => v.clone(),
        DependencyValue::Object(obj) => obj.type_name().to_string(),
        DependencyValue::Default(inner) => stringify(inner),
    }
}

/// Inert placeholder registered when no constructor could be used.
///
/// Reports version `1.0.0`, author `System`, starts enabled and does
/// nothing on start or stop.
pub struct SyntheticExtension {
    state: ExtensionState,
}

impl SyntheticExtension {
    pub const VERSION: &'static str = "1.0.0";
    pub const AUTHOR: &'static str = "System";

    pub fn new(descriptor: &ExtensionDescriptor, isolation: Arc<IsolationContext>) -> Self {
        let mut descriptor = descriptor.clone();
        descriptor.version = Self::VERSION.to_string();
        descriptor.author = Some(Self::AUTHOR.to_string());
        if descriptor.name.is_empty() {
            descriptor.name = descriptor.id.clone();
        }
        Self {
            state: ExtensionState::new(descriptor, Some(isolation)),
        }
    }
}

#[async_trait]
impl Extension for SyntheticExtension {
    fn metadata(&self) -> &ExtensionDescriptor {
        self.state.descriptor()
    }

    fn isolation_context(&self) -> Option<Arc<IsolationContext>> {
        self.state.isolation()
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.state.mark_started();
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.state.mark_stopped();
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    fn set_enabled(&self, enabled: bool) {
        self.state.set_enabled(enabled);
    }

    fn is_started(&self) -> bool {
        self.state.is_started()
    }
}
