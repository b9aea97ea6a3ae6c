//! Component Registry
//!
//! The catalog of known physical components. Each component is described by a
//! static [`ComponentDescriptor`]: an ordered table of constructor fields with
//! a semantic role, a declared type, an optional default and a description.
//! Descriptors are declared once at registration; nothing in the crate
//! inspects live constructors.
//!
//! Components are grouped into [`Family`]s. Schema generation walks families
//! in dependency order (cosmology first, simulators last), so the registry
//! keeps members of each family in registration order.
//!
//! The registry is an explicit object handed by reference to schema
//! synthesis. Populate it before any schema is built and treat it as
//! read-only afterwards; [`SharedRegistry`] wraps one instance for callers
//! that hold it across threads.
//!
//! ```rust,ignore
//! let mut registry = Registry::new();
//! registry.register(
//!     ComponentDescriptor::new("SIS", Family::SingleLens)
//!         .with_param("z_l", "Redshift of the lens")
//!         .with_param("th_ein", "Einstein radius")
//!         .with_dependency("cosmology", "Cosmology model"),
//! )?;
//! let sis = registry.get_by_name("SIS")?;
//! ```

use crate::params::valid_segment;
use crate::{LensingError, Result};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

mod builtin;

// ============================================================================
// Families
// ============================================================================

/// Semantic grouping of components, in schema build order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Cosmology,
    LightSource,
    SingleLens,
    MultiLens,
    Simulator,
}

impl Family {
    /// All families, in the order unions must be built.
    pub fn all() -> [Family; 5] {
        [
            Family::Cosmology,
            Family::LightSource,
            Family::SingleLens,
            Family::MultiLens,
            Family::Simulator,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Family::Cosmology => "cosmology",
            Family::LightSource => "light_sources",
            Family::SingleLens => "single_lenses",
            Family::MultiLens => "multi_lenses",
            Family::Simulator => "simulators",
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Field Specs
// ============================================================================

/// Declared type of a constructor field.
///
/// Model parameters are always [`ValueType::Tensor`]; plain keywords use the
/// scalar types. `List` and `Optional` compose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Tensor,
    Float,
    Int,
    Bool,
    Str,
    Component,
    List(Box<ValueType>),
    Optional(Box<ValueType>),
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueType::Tensor => write!(f, "tensor"),
            ValueType::Float => write!(f, "float"),
            ValueType::Int => write!(f, "int"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::Str => write!(f, "string"),
            ValueType::Component => write!(f, "component"),
            ValueType::List(inner) => write!(f, "list of {inner}"),
            ValueType::Optional(inner) => write!(f, "optional {inner}"),
        }
    }
}

/// Semantic role of a constructor field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    /// Physical model parameter, tensor-valued; lands in the `params` block.
    Param,
    /// Reference to another component, validated by a union schema.
    Dependency,
    /// Reference to a list of other components.
    DependencyList,
    /// Plain structural keyword; lands in the `init_kwargs` block.
    Keyword,
}

/// One row of a descriptor table.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub role: FieldRole,
    pub value_type: ValueType,
    pub default: Option<serde_json::Value>,
    pub description: String,
}

impl FieldSpec {
    /// Whether validation demands a value for this field.
    ///
    /// Model parameters are never required (an absent value means the
    /// parameter is dynamic); single dependencies always are; list
    /// dependencies default to empty; keywords are required exactly when no
    /// default was declared.
    pub fn is_required(&self) -> bool {
        match self.role {
            FieldRole::Param => false,
            FieldRole::Dependency => true,
            FieldRole::DependencyList => false,
            FieldRole::Keyword => self.default.is_none(),
        }
    }
}

// ============================================================================
// Component Descriptor
// ============================================================================

/// Static description of one component's constructor surface.
///
/// Field order is declaration order and flows through to schemas, validated
/// configs and parameter namespaces. The implicit instance-name argument of
/// components is never part of a descriptor.
#[derive(Debug, Clone)]
pub struct ComponentDescriptor {
    kind: String,
    family: Family,
    description: String,
    fields: IndexMap<String, FieldSpec>,
}

impl ComponentDescriptor {
    pub fn new(kind: impl Into<String>, family: Family) -> Self {
        Self {
            kind: kind.into(),
            family,
            description: String::new(),
            fields: IndexMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// A tensor-valued model parameter with no default (dynamic unless a
    /// value is supplied).
    pub fn with_param(self, name: &str, description: &str) -> Self {
        self.push_field(FieldSpec {
            name: name.to_string(),
            role: FieldRole::Param,
            value_type: ValueType::Tensor,
            default: None,
            description: description.to_string(),
        })
    }

    /// A tensor-valued model parameter with a default value.
    pub fn with_param_default(
        self,
        name: &str,
        default: impl Into<serde_json::Value>,
        description: &str,
    ) -> Self {
        self.push_field(FieldSpec {
            name: name.to_string(),
            role: FieldRole::Param,
            value_type: ValueType::Tensor,
            default: Some(default.into()),
            description: description.to_string(),
        })
    }

    /// A reference to a single other component.
    pub fn with_dependency(self, name: &str, description: &str) -> Self {
        self.push_field(FieldSpec {
            name: name.to_string(),
            role: FieldRole::Dependency,
            value_type: ValueType::Component,
            default: None,
            description: description.to_string(),
        })
    }

    /// A reference to a list of other components.
    pub fn with_dependency_list(self, name: &str, description: &str) -> Self {
        self.push_field(FieldSpec {
            name: name.to_string(),
            role: FieldRole::DependencyList,
            value_type: ValueType::List(Box::new(ValueType::Component)),
            default: None,
            description: description.to_string(),
        })
    }

    /// A plain keyword with a default.
    pub fn with_keyword(
        self,
        name: &str,
        value_type: ValueType,
        default: impl Into<serde_json::Value>,
        description: &str,
    ) -> Self {
        self.push_field(FieldSpec {
            name: name.to_string(),
            role: FieldRole::Keyword,
            value_type,
            default: Some(default.into()),
            description: description.to_string(),
        })
    }

    /// A plain keyword with no default; validation requires it.
    pub fn with_required_keyword(
        self,
        name: &str,
        value_type: ValueType,
        description: &str,
    ) -> Self {
        self.push_field(FieldSpec {
            name: name.to_string(),
            role: FieldRole::Keyword,
            value_type,
            default: None,
            description: description.to_string(),
        })
    }

    fn push_field(mut self, spec: FieldSpec) -> Self {
        self.fields.insert(spec.name.clone(), spec);
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Catalog of component descriptors, keyed by kind.
///
/// Registration order is preserved, which fixes member order inside each
/// family's union schema.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    components: IndexMap<String, ComponentDescriptor>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry populated with the built-in component catalog.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_builtins(&mut registry);
        registry
    }

    /// Register a component descriptor. Kinds are unique across families,
    /// and kind and field names must be usable as namespace segments.
    pub fn register(&mut self, descriptor: ComponentDescriptor) -> Result<()> {
        if !valid_segment(descriptor.kind()) {
            return Err(LensingError::Config(format!(
                "component kind '{}' is not a valid namespace segment",
                descriptor.kind()
            )));
        }
        for field in descriptor.fields() {
            if !valid_segment(&field.name) {
                return Err(LensingError::Config(format!(
                    "field '{}.{}' is not a valid namespace segment",
                    descriptor.kind(),
                    field.name
                )));
            }
        }
        if self.components.contains_key(descriptor.kind()) {
            return Err(LensingError::Config(format!(
                "component '{}' is already registered",
                descriptor.kind()
            )));
        }
        debug!(
            kind = descriptor.kind(),
            family = %descriptor.family(),
            fields = descriptor.field_count(),
            "registered component"
        );
        self.components
            .insert(descriptor.kind().to_string(), descriptor);
        Ok(())
    }

    /// Resolve a component by its registered kind name.
    pub fn get_by_name(&self, name: &str) -> Result<&ComponentDescriptor> {
        self.components.get(name).ok_or_else(|| {
            LensingError::Resolution(format!("component '{name}' is not registered"))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// Descriptors of one family, in registration order.
    pub fn list_family(&self, family: Family) -> Vec<&ComponentDescriptor> {
        self.components
            .values()
            .filter(|d| d.family() == family)
            .collect()
    }

    /// Kind names of one family, in registration order.
    pub fn kinds(&self, family: Family) -> Vec<&str> {
        self.list_family(family).iter().map(|d| d.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// A registry shared across threads. Registration must still complete before
/// any schema is built.
pub type SharedRegistry = Arc<RwLock<Registry>>;

/// Wrap a registry for shared use.
pub fn shared(registry: Registry) -> SharedRegistry {
    Arc::new(RwLock::new(registry))
}
