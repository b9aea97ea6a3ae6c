//! Discriminated Unions
//!
//! A [`UnionSchema`] aggregates the component schemas of one family and
//! dispatches untagged data on its `kind` tag. Dispatch fails closed: a tag
//! outside the member set is a [`LensingError::Discrimination`], reported
//! separately from shape problems so callers can tell "unknown kind" apart
//! from "wrong data".
//!
//! [`build_all`] produces the whole schema surface in the one order that
//! works: cosmology first (no dependencies), then light sources, then single
//! lenses (which embed the cosmology union), then multi lenses (which embed
//! a list of the single-lens union), then simulators (which embed light and
//! lens unions by role).

use super::{synthesize, ComponentConfig, ComponentSchema};
use crate::registry::{Family, Registry};
use crate::tensor::json_type_name;
use crate::{LensingError, Result};
use candle_core::Device;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Union Schema
// ============================================================================

/// A tagged union of component schemas, discriminated by `kind`.
#[derive(Debug, Clone)]
pub struct UnionSchema {
    label: String,
    members: IndexMap<String, ComponentSchema>,
}

impl UnionSchema {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            members: IndexMap::new(),
        }
    }

    /// Add a member schema. Tags are unique within a union.
    pub fn insert(&mut self, schema: ComponentSchema) -> Result<()> {
        if self.members.contains_key(schema.kind()) {
            return Err(LensingError::Config(format!(
                "duplicate kind '{}' in {} union",
                schema.kind(),
                self.label
            )));
        }
        self.members.insert(schema.kind().to_string(), schema);
        Ok(())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Member tags, in insertion order.
    pub fn kinds(&self) -> Vec<&str> {
        self.members.keys().map(|k| k.as_str()).collect()
    }

    pub fn member(&self, kind: &str) -> Option<&ComponentSchema> {
        self.members.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.members.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Validate untagged data by dispatching on its `kind` tag.
    ///
    /// The tag is required here (unlike component-level validation, where it
    /// defaults); without it there is nothing to dispatch on.
    pub fn validate(&self, data: &Value, device: &Device) -> Result<ComponentConfig> {
        let obj = data.as_object().ok_or_else(|| LensingError::Validation {
            kind: self.label.clone(),
            field: "<root>".to_string(),
            reason: format!("expected an object, got {}", json_type_name(data)),
        })?;

        let kind = match obj.get("kind") {
            None | Some(Value::Null) => {
                return Err(LensingError::Validation {
                    kind: self.label.clone(),
                    field: "kind".to_string(),
                    reason: "missing discriminator".to_string(),
                })
            }
            Some(Value::String(s)) => s.as_str(),
            Some(other) => {
                return Err(LensingError::Validation {
                    kind: self.label.clone(),
                    field: "kind".to_string(),
                    reason: format!("expected a string, got {}", json_type_name(other)),
                })
            }
        };

        let member = self
            .members
            .get(kind)
            .ok_or_else(|| LensingError::Discrimination {
                kind: kind.to_string(),
                union: self.label.clone(),
                known: self.kinds().join(", "),
            })?;
        member.validate(data, device)
    }
}

// ============================================================================
// Family Building
// ============================================================================

/// Build the union of one family, synthesizing each member against the given
/// dependency schemas.
pub fn build_family(
    registry: &Registry,
    family: Family,
    dependencies: &IndexMap<String, Arc<UnionSchema>>,
) -> Result<UnionSchema> {
    let mut union = UnionSchema::new(family.label());
    for descriptor in registry.list_family(family) {
        union.insert(synthesize(descriptor, dependencies)?)?;
    }
    debug!(family = %family, members = union.len(), "built family union");
    Ok(union)
}

/// The full schema surface over one registry.
#[derive(Debug, Clone)]
pub struct SchemaSet {
    pub cosmology: Arc<UnionSchema>,
    pub light_sources: Arc<UnionSchema>,
    pub single_lenses: Arc<UnionSchema>,
    /// Single and multi lenses together, in that order.
    pub lenses: Arc<UnionSchema>,
    pub simulators: Arc<UnionSchema>,
}

/// Build every family union in dependency order.
pub fn build_all(registry: &Registry) -> Result<SchemaSet> {
    let no_deps = IndexMap::new();

    let cosmology = Arc::new(build_family(registry, Family::Cosmology, &no_deps)?);
    let light_sources = Arc::new(build_family(registry, Family::LightSource, &no_deps)?);

    let mut lens_deps = IndexMap::new();
    lens_deps.insert("cosmology".to_string(), Arc::clone(&cosmology));
    let single_lenses = Arc::new(build_family(registry, Family::SingleLens, &lens_deps)?);

    let mut multi_deps = IndexMap::new();
    multi_deps.insert("cosmology".to_string(), Arc::clone(&cosmology));
    multi_deps.insert("lenses".to_string(), Arc::clone(&single_lenses));
    let multi_lenses = build_family(registry, Family::MultiLens, &multi_deps)?;

    let mut lenses = UnionSchema::new("lenses");
    for schema in single_lenses.members.values() {
        lenses.insert(schema.clone())?;
    }
    for schema in multi_lenses.members.values() {
        lenses.insert(schema.clone())?;
    }
    let lenses = Arc::new(lenses);

    let mut sim_deps = IndexMap::new();
    sim_deps.insert("source".to_string(), Arc::clone(&light_sources));
    sim_deps.insert("lens_light".to_string(), Arc::clone(&light_sources));
    sim_deps.insert("lens".to_string(), Arc::clone(&lenses));
    let simulators = Arc::new(build_family(registry, Family::Simulator, &sim_deps)?);

    Ok(SchemaSet {
        cosmology,
        light_sources,
        single_lenses,
        lenses,
        simulators,
    })
}
