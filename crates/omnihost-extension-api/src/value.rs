//! Dependency values handed to extension constructors and the parameter
//! types constructors declare.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A value supplied positionally to an extension constructor.
#[derive(Clone)]
pub enum DependencyValue {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Object(ObjectValue),
    /// Envelope carrying a default; unwrapped before coercion
    Default(Box<DependencyValue>),
}

impl DependencyValue {
    /// Wraps any shareable collaborator as an object value.
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        DependencyValue::Object(ObjectValue::new(value))
    }

    /// Wraps a value in the default envelope.
    pub fn wrapped(value: DependencyValue) -> Self {
        DependencyValue::Default(Box::new(value))
    }

    /// Strips any number of default envelopes.
    pub fn unwrap_default(self) -> DependencyValue {
        match self {
            DependencyValue::Default(inner) => inner.unwrap_default(),
            other => other,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DependencyValue::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DependencyValue::Int(_)
                | DependencyValue::Long(_)
                | DependencyValue::Float(_)
                | DependencyValue::Double(_)
        )
    }

    /// Numeric view as f64, if numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DependencyValue::Int(v) => Some(*v as f64),
            DependencyValue::Long(v) => Some(*v as f64),
            DependencyValue::Float(v) => Some(*v as f64),
            DependencyValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view as i64, truncating floating values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DependencyValue::Int(v) => Some(*v as i64),
            DependencyValue::Long(v) => Some(*v),
            DependencyValue::Float(v) => Some(*v as i64),
            DependencyValue::Double(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DependencyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DependencyValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Downcasts an object value to a concrete collaborator type.
    pub fn downcast<T: Any + Send + Sync + Clone>(&self) -> Option<T> {
        match self {
            DependencyValue::Object(obj) => obj.downcast_ref::<T>().cloned(),
            _ => None,
        }
    }

    /// Short label of the runtime kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DependencyValue::Null => "null",
            DependencyValue::Bool(_) => "bool",
            DependencyValue::Int(_) => "int",
            DependencyValue::Long(_) => "long",
            DependencyValue::Float(_) => "float",
            DependencyValue::Double(_) => "double",
            DependencyValue::Text(_) => "text",
            DependencyValue::Object(obj) => obj.type_name(),
            DependencyValue::Default(_) => "default",
        }
    }
}

impl fmt::Debug for DependencyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyValue::Null => write!(f, "Null"),
            DependencyValue::Bool(v) => write!(f, "Bool({})", v),
            DependencyValue::Int(v) => write!(f, "Int({})", v),
            DependencyValue::Long(v) => write!(f, "Long({})", v),
            DependencyValue::Float(v) => write!(f, "Float({})", v),
            DependencyValue::Double(v) => write!(f, "Double({})", v),
            DependencyValue::Text(v) => write!(f, "Text({:?})", v),
            DependencyValue::Object(obj) => write!(f, "Object({})", obj.type_name()),
            DependencyValue::Default(inner) => write!(f, "Default({:?})", inner),
        }
    }
}

impl From<bool> for DependencyValue {
    fn from(v: bool) -> Self {
        DependencyValue::Bool(v)
    }
}

impl From<i32> for DependencyValue {
    fn from(v: i32) -> Self {
        DependencyValue::Int(v)
    }
}

impl From<i64> for DependencyValue {
    fn from(v: i64) -> Self {
        DependencyValue::Long(v)
    }
}

impl From<f32> for DependencyValue {
    fn from(v: f32) -> Self {
        DependencyValue::Float(v)
    }
}

impl From<f64> for DependencyValue {
    fn from(v: f64) -> Self {
        DependencyValue::Double(v)
    }
}

impl From<String> for DependencyValue {
    fn from(v: String) -> Self {
        DependencyValue::Text(v)
    }
}

impl From<&str> for DependencyValue {
    fn from(v: &str) -> Self {
        DependencyValue::Text(v.to_string())
    }
}

/// Type-erased collaborator with its concrete type recorded.
#[derive(Clone)]
pub struct ObjectValue {
    value: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl ObjectValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

/// Parameter type a constructor declares for one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Bool,
    Int,
    Long,
    Float,
    Double,
    Text,
    Object {
        type_id: TypeId,
        type_name: &'static str,
    },
    /// Accepts any value
    Any,
    /// Accepts the inner type or null
    Optional(Box<ParamType>),
}

impl ParamType {
    /// Parameter expecting a collaborator of type `T`.
    pub fn object<T: Any>() -> Self {
        ParamType::Object {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Nullable variant of `inner`.
    pub fn optional(inner: ParamType) -> Self {
        ParamType::Optional(Box::new(inner))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ParamType::Int | ParamType::Long | ParamType::Float | ParamType::Double
        )
    }

    /// Strips the optional wrapper.
    pub fn base(&self) -> &ParamType {
        match self {
            ParamType::Optional(inner) => inner.base(),
            other => other,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Bool => write!(f, "bool"),
            ParamType::Int => write!(f, "int"),
            ParamType::Long => write!(f, "long"),
            ParamType::Float => write!(f, "float"),
            ParamType::Double => write!(f, "double"),
            ParamType::Text => write!(f, "text"),
            ParamType::Object { type_name, .. } => write!(f, "{}", type_name),
            ParamType::Any => write!(f, "any"),
            ParamType::Optional(inner) => write!(f, "{}?", inner),
        }
    }
}
