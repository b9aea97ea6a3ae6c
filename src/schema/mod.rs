//! Schema Synthesis
//!
//! Turns a [`ComponentDescriptor`] into a validator for untagged
//! configuration data of the shape:
//!
//! ```json
//! {
//!   "kind": "SIE",
//!   "params": { "z_l": 0.5, "b": 1.4 },
//!   "init_kwargs": { "cosmology": { "kind": "FlatLambdaCDM" } }
//! }
//! ```
//!
//! The synthesized [`ComponentSchema`] has three conceptual blocks:
//!
//! - `kind`: a literal tag fixed to the descriptor's registered name. It
//!   uniquely determines which concrete component a validated instance
//!   reconstructs.
//! - `params`: the physical model parameters. Every supplied value is coerced
//!   into an f32 tensor (numbers, flat lists, nested lists); an absent value
//!   makes that parameter dynamic.
//! - `init_kwargs`: structural constructor keywords. Dependency references
//!   are validated by the union schema of the referenced family and become
//!   nested sub-configs.
//!
//! Validation produces a [`ComponentConfig`], and [`ComponentConfig::build`]
//! reconstructs the live [`Component`] tree with its parameter namespace.
//! Synthesis itself never fails on bad data; data problems surface at
//! validation time with the offending field path.

use crate::params::{Namespace, Parameter};
use crate::registry::{ComponentDescriptor, Family, FieldRole, Registry, ValueType};
use crate::tensor::{coerce_tensor, json_type_name};
use crate::{LensingError, Result};
use candle_core::{Device, Tensor};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

pub mod union;

use union::UnionSchema;

// ============================================================================
// Schema Fields
// ============================================================================

/// A model parameter slot in a schema's `params` block.
#[derive(Debug, Clone)]
pub struct ParamField {
    pub name: String,
    pub default: Option<Value>,
    pub description: String,
}

/// How a dependency-reference field validates its value.
#[derive(Debug, Clone)]
pub enum Dependency {
    /// Exactly one sub-config, required.
    Single(Arc<UnionSchema>),
    /// A list of sub-configs, defaulting to empty.
    List(Arc<UnionSchema>),
}

/// A slot in a schema's `init_kwargs` block.
#[derive(Debug, Clone)]
pub struct KwargField {
    pub name: String,
    pub value_type: ValueType,
    pub required: bool,
    pub default: Option<Value>,
    pub description: String,
    /// Present when this keyword is a dependency reference.
    pub dependency: Option<Dependency>,
}

// ============================================================================
// Synthesis
// ============================================================================

/// A validator for one component's configuration data.
#[derive(Debug, Clone)]
pub struct ComponentSchema {
    kind: String,
    family: Family,
    params: Vec<ParamField>,
    init_kwargs: Vec<KwargField>,
    descriptor: ComponentDescriptor,
}

/// Synthesize a component schema from a descriptor.
///
/// `dependencies` maps constructor-argument names to the union schemas their
/// values validate against. Every dependency field the descriptor declares
/// must have an entry here; whether the value is a single sub-config or a
/// list follows the descriptor's field role.
pub fn synthesize(
    descriptor: &ComponentDescriptor,
    dependencies: &IndexMap<String, Arc<UnionSchema>>,
) -> Result<ComponentSchema> {
    let mut params = Vec::new();
    let mut init_kwargs = Vec::new();

    for field in descriptor.fields() {
        match field.role {
            FieldRole::Param => params.push(ParamField {
                name: field.name.clone(),
                default: field.default.clone(),
                description: field.description.clone(),
            }),
            FieldRole::Dependency | FieldRole::DependencyList => {
                let union = dependencies.get(&field.name).ok_or_else(|| {
                    LensingError::Resolution(format!(
                        "no dependency schema provided for '{}.{}'",
                        descriptor.kind(),
                        field.name
                    ))
                })?;
                let dependency = match field.role {
                    FieldRole::Dependency => Dependency::Single(Arc::clone(union)),
                    _ => Dependency::List(Arc::clone(union)),
                };
                init_kwargs.push(KwargField {
                    name: field.name.clone(),
                    value_type: field.value_type.clone(),
                    required: field.is_required(),
                    default: None,
                    description: field.description.clone(),
                    dependency: Some(dependency),
                });
            }
            FieldRole::Keyword => init_kwargs.push(KwargField {
                name: field.name.clone(),
                value_type: field.value_type.clone(),
                required: field.is_required(),
                default: field.default.clone(),
                description: field.description.clone(),
                dependency: None,
            }),
        }
    }

    Ok(ComponentSchema {
        kind: descriptor.kind().to_string(),
        family: descriptor.family(),
        params,
        init_kwargs,
        descriptor: descriptor.clone(),
    })
}

/// Synthesize by registered name, resolving the descriptor via the registry.
pub fn synthesize_by_name(
    name: &str,
    dependencies: &IndexMap<String, Arc<UnionSchema>>,
    registry: &Registry,
) -> Result<ComponentSchema> {
    let descriptor = registry.get_by_name(name)?;
    synthesize(descriptor, dependencies)
}

impl ComponentSchema {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn param_fields(&self) -> &[ParamField] {
        &self.params
    }

    pub fn kwarg_fields(&self) -> &[KwargField] {
        &self.init_kwargs
    }

    pub fn descriptor(&self) -> &ComponentDescriptor {
        &self.descriptor
    }

    fn err(&self, field: impl Into<String>, reason: impl Into<String>) -> LensingError {
        LensingError::Validation {
            kind: self.kind.clone(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The schema's zero-argument `params` instance: every field at its
    /// declared default, absent defaults left dynamic.
    pub fn default_params(&self, device: &Device) -> Result<IndexMap<String, Option<Tensor>>> {
        self.validate_params(None, device)
    }

    /// Validate untagged configuration data into a [`ComponentConfig`].
    ///
    /// `kind` may be omitted (it defaults to this schema's tag) but must
    /// match when present. Unknown fields anywhere are rejected with the
    /// offending path.
    pub fn validate(&self, data: &Value, device: &Device) -> Result<ComponentConfig> {
        let obj = data.as_object().ok_or_else(|| {
            self.err(
                "<root>",
                format!("expected an object, got {}", json_type_name(data)),
            )
        })?;

        if let Some(kind_value) = obj.get("kind") {
            let kind = kind_value
                .as_str()
                .ok_or_else(|| self.err("kind", "expected a string"))?;
            if kind != self.kind {
                return Err(self.err(
                    "kind",
                    format!("expected '{}', got '{kind}'", self.kind),
                ));
            }
        }

        for key in obj.keys() {
            if key != "kind" && key != "params" && key != "init_kwargs" {
                return Err(self.err(key, "unknown field"));
            }
        }

        let params = self.validate_params(obj.get("params"), device)?;
        let init_kwargs = self.validate_kwargs(obj.get("init_kwargs"), device)?;

        Ok(ComponentConfig {
            kind: self.kind.clone(),
            descriptor: self.descriptor.clone(),
            params,
            init_kwargs,
        })
    }

    fn validate_params(
        &self,
        data: Option<&Value>,
        device: &Device,
    ) -> Result<IndexMap<String, Option<Tensor>>> {
        let supplied = match data {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(other) => {
                return Err(self.err(
                    "params",
                    format!("expected an object, got {}", json_type_name(other)),
                ))
            }
        };

        if let Some(map) = supplied {
            for key in map.keys() {
                if !self.params.iter().any(|p| &p.name == key) {
                    return Err(self.err(format!("params.{key}"), "unknown parameter"));
                }
            }
        }

        let mut out = IndexMap::new();
        for field in &self.params {
            let path = || format!("params.{}", field.name);
            let value = match supplied.and_then(|m| m.get(&field.name)) {
                // An explicit null unsets the parameter: it stays dynamic
                // even when a default exists.
                Some(Value::Null) => None,
                Some(v) => Some(
                    coerce_tensor(v, device).map_err(|e| self.err(path(), e.to_string()))?,
                ),
                None => match &field.default {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(
                        coerce_tensor(v, device).map_err(|e| self.err(path(), e.to_string()))?,
                    ),
                },
            };
            out.insert(field.name.clone(), value);
        }
        Ok(out)
    }

    fn validate_kwargs(
        &self,
        data: Option<&Value>,
        device: &Device,
    ) -> Result<IndexMap<String, ConfigValue>> {
        let supplied = match data {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(other) => {
                return Err(self.err(
                    "init_kwargs",
                    format!("expected an object, got {}", json_type_name(other)),
                ))
            }
        };

        if let Some(map) = supplied {
            for key in map.keys() {
                if !self.init_kwargs.iter().any(|k| &k.name == key) {
                    return Err(self.err(format!("init_kwargs.{key}"), "unknown keyword"));
                }
            }
        }

        let mut out = IndexMap::new();
        for field in &self.init_kwargs {
            let path = format!("init_kwargs.{}", field.name);
            let given = supplied.and_then(|m| m.get(&field.name));

            let value = match &field.dependency {
                Some(Dependency::Single(union)) => match given {
                    None | Some(Value::Null) => {
                        return Err(self.err(path, "required field is missing"))
                    }
                    Some(v) => ConfigValue::Component(Box::new(union.validate(v, device)?)),
                },
                Some(Dependency::List(union)) => match given {
                    None | Some(Value::Null) => ConfigValue::Components(Vec::new()),
                    Some(Value::Array(items)) => {
                        let mut configs = Vec::with_capacity(items.len());
                        for item in items {
                            configs.push(union.validate(item, device)?);
                        }
                        ConfigValue::Components(configs)
                    }
                    Some(other) => {
                        return Err(self.err(
                            path,
                            format!("expected a list, got {}", json_type_name(other)),
                        ))
                    }
                },
                None => {
                    let raw = match given {
                        Some(v) => Some(v),
                        None => field.default.as_ref(),
                    };
                    match raw {
                        None => return Err(self.err(path, "required field is missing")),
                        Some(v) => coerce_keyword(&field.value_type, v, device)
                            .map_err(|reason| self.err(path, reason))?,
                    }
                }
            };
            out.insert(field.name.clone(), value);
        }
        Ok(out)
    }
}

// ============================================================================
// Validated Values
// ============================================================================

/// A validated `init_kwargs` value. Dispatch is exhaustive; there is no
/// catch-all variant.
#[derive(Debug, Clone)]
pub enum ConfigValue {
    Tensor(Tensor),
    Float(f64),
    Int(i64),
    Bool(bool),
    Str(String),
    List(Vec<ConfigValue>),
    Component(Box<ComponentConfig>),
    Components(Vec<ComponentConfig>),
    None,
}

fn coerce_keyword(
    value_type: &ValueType,
    value: &Value,
    device: &Device,
) -> std::result::Result<ConfigValue, String> {
    match value_type {
        ValueType::Float => value
            .as_f64()
            .map(ConfigValue::Float)
            .ok_or_else(|| format!("expected a float, got {}", json_type_name(value))),
        ValueType::Int => value
            .as_i64()
            .map(ConfigValue::Int)
            .ok_or_else(|| format!("expected an int, got {}", json_type_name(value))),
        ValueType::Bool => value
            .as_bool()
            .map(ConfigValue::Bool)
            .ok_or_else(|| format!("expected a bool, got {}", json_type_name(value))),
        ValueType::Str => value
            .as_str()
            .map(|s| ConfigValue::Str(s.to_string()))
            .ok_or_else(|| format!("expected a string, got {}", json_type_name(value))),
        ValueType::Tensor => coerce_tensor(value, device)
            .map(ConfigValue::Tensor)
            .map_err(|e| e.to_string()),
        ValueType::Optional(inner) => match value {
            Value::Null => Ok(ConfigValue::None),
            v => coerce_keyword(inner, v, device),
        },
        ValueType::List(inner) => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| coerce_keyword(inner, item, device))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(ConfigValue::List),
            other => Err(format!("expected a list, got {}", json_type_name(other))),
        },
        ValueType::Component => {
            Err("component values are validated through dependency schemas".to_string())
        }
    }
}

/// A validated component configuration: the typed form of one
/// `{kind, params, init_kwargs}` record.
#[derive(Debug, Clone)]
pub struct ComponentConfig {
    kind: String,
    descriptor: ComponentDescriptor,
    params: IndexMap<String, Option<Tensor>>,
    init_kwargs: IndexMap<String, ConfigValue>,
}

impl ComponentConfig {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn descriptor(&self) -> &ComponentDescriptor {
        &self.descriptor
    }

    /// Ordered model parameters; `None` marks a dynamic parameter.
    pub fn params(&self) -> &IndexMap<String, Option<Tensor>> {
        &self.params
    }

    pub fn init_kwargs(&self) -> &IndexMap<String, ConfigValue> {
        &self.init_kwargs
    }

    /// The tensor value of one parameter, if it has one.
    pub fn param(&self, name: &str) -> Option<&Tensor> {
        self.params.get(name).and_then(|v| v.as_ref())
    }

    pub fn kwarg(&self, name: &str) -> Option<&ConfigValue> {
        self.init_kwargs.get(name)
    }

    /// Reconstruct the live component named after its kind.
    pub fn build(&self) -> Result<Component> {
        self.build_named(self.kind.clone())
    }

    /// Reconstruct the live component under an explicit instance name.
    pub fn build_named(&self, name: impl Into<String>) -> Result<Component> {
        let mut params = Namespace::new();
        for (pname, value) in &self.params {
            let parameter = match value {
                Some(t) => Parameter::static_value(pname.clone(), t.clone()),
                None => Parameter::dynamic(pname.clone()),
            };
            params.insert_param(pname, parameter)?;
        }

        let mut settings = IndexMap::new();
        let mut children = IndexMap::new();
        let mut groups = IndexMap::new();
        for (kname, value) in &self.init_kwargs {
            match value {
                ConfigValue::Component(sub) => {
                    children.insert(kname.clone(), sub.build()?);
                }
                ConfigValue::Components(subs) => {
                    let built: Result<Vec<Component>> =
                        subs.iter().map(|s| s.build()).collect();
                    groups.insert(kname.clone(), built?);
                }
                other => {
                    settings.insert(kname.clone(), other.clone());
                }
            }
        }

        Ok(Component {
            name: name.into(),
            kind: self.kind.clone(),
            params,
            settings,
            children,
            groups,
        })
    }
}

// ============================================================================
// Live Components
// ============================================================================

/// A reconstructed component instance: its own parameters plus the
/// sub-components its configuration referenced.
#[derive(Debug, Clone)]
pub struct Component {
    name: String,
    kind: String,
    params: Namespace,
    settings: IndexMap<String, ConfigValue>,
    children: IndexMap<String, Component>,
    groups: IndexMap<String, Vec<Component>>,
}

impl Component {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// This component's own parameter leaves.
    pub fn params(&self) -> &Namespace {
        &self.params
    }

    /// Plain keyword settings (everything that is not a sub-component).
    pub fn settings(&self) -> &IndexMap<String, ConfigValue> {
        &self.settings
    }

    /// Single sub-components, by constructor-argument name.
    pub fn children(&self) -> &IndexMap<String, Component> {
        &self.children
    }

    /// List-valued sub-components, by constructor-argument name.
    pub fn groups(&self) -> &IndexMap<String, Vec<Component>> {
        &self.groups
    }

    /// The full parameter namespace of this component tree.
    ///
    /// Own parameters sit at the root; each single sub-component becomes a
    /// group under its argument name; each list becomes a group of
    /// sub-groups named by member kind, where a repeated kind takes the
    /// first unused `{kind}_{n}` suffix.
    pub fn namespace(&self) -> Result<Namespace> {
        let mut ns = self.params.clone();
        for (role, child) in &self.children {
            ns.insert_group(role, child.namespace()?)?;
        }
        for (role, members) in &self.groups {
            let mut group = Namespace::new();
            for member in members {
                // take the first free name; a registered kind that already
                // ends in `_{n}` keeps its own slot
                let mut member_name = member.kind().to_string();
                let mut suffix = 1;
                while group.contains(&member_name) {
                    member_name = format!("{}_{suffix}", member.kind());
                    suffix += 1;
                }
                group.insert_group(&member_name, member.namespace()?)?;
            }
            ns.insert_group(role, group)?;
        }
        Ok(ns)
    }
}
