use crate::datetime::NormalizedDateTime;
use crate::error::Result;
use recon_model::{FieldKind, Value, normalize_name};
use std::fmt;
use std::sync::Arc;

/// A transform applied to a raw source value before it is assigned to a
/// cached attribute.
///
/// Implementations must either return the coerced value or fail; they never
/// touch anything but their input.
pub trait ManagedAttribute: fmt::Debug + Send + Sync {
    /// Name used to refer to the transform from configuration.
    fn name(&self) -> &'static str;

    /// Kind of the values [`manage`](Self::manage) produces. Only fields of
    /// this kind can be mapped through the transform.
    fn kind(&self) -> FieldKind;

    fn manage(&self, value: &Value) -> Result<Value>;
}

/// Look up a built-in managed attribute transform by name.
pub fn managed_attribute(name: &str) -> Option<Arc<dyn ManagedAttribute>> {
    match name {
        "datetime" => Some(Arc::new(NormalizedDateTime)),
        _ => None,
    }
}

/// The source-side half of a mapping entry: a source attribute name,
/// optionally wrapped with the transform its raw value must go through.
#[derive(Clone)]
pub enum AttributeKey {
    Plain(String),
    Managed {
        name: String,
        transform: Arc<dyn ManagedAttribute>,
    },
}

impl AttributeKey {
    pub fn managed(name: impl Into<String>, transform: impl ManagedAttribute + 'static) -> Self {
        Self::Managed {
            name: name.into(),
            transform: Arc::new(transform),
        }
    }

    /// Name of the source attribute.
    pub fn name(&self) -> &str {
        match self {
            Self::Plain(name) | Self::Managed { name, .. } => name,
        }
    }

    pub fn transform(&self) -> Option<&dyn ManagedAttribute> {
        match self {
            Self::Plain(_) => None,
            Self::Managed { transform, .. } => Some(transform.as_ref()),
        }
    }

    pub(crate) fn normalized(self) -> Self {
        match self {
            Self::Plain(name) => Self::Plain(normalize_name(&name)),
            Self::Managed { name, transform } => Self::Managed {
                name: normalize_name(&name),
                transform,
            },
        }
    }
}

impl fmt::Debug for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(name) => f.debug_tuple("Plain").field(name).finish(),
            Self::Managed { name, transform } => f
                .debug_struct("Managed")
                .field("name", name)
                .field("transform", &transform.name())
                .finish(),
        }
    }
}

impl PartialEq for AttributeKey {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name() && self.transform().map(|t| t.name()) == other.transform().map(|t| t.name())
    }
}

impl From<&str> for AttributeKey {
    fn from(name: &str) -> Self {
        Self::Plain(name.to_string())
    }
}
impl From<String> for AttributeKey {
    fn from(name: String) -> Self {
        Self::Plain(name)
    }
}
