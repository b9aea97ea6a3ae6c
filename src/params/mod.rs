//! Parameters and Namespaces
//!
//! A simulator's parameter space is an ordered tree. Leaves are [`Parameter`]s,
//! interior nodes are sub-namespaces keyed by component name, and every leaf is
//! reachable by a dotted path such as `lens.cosmology.h0`.
//!
//! Two views exist over the same tree: the nested view (walk groups by name)
//! and the flat view ([`Namespace::flatten`], dotted leaf paths in declaration
//! order). Flattening is lossless and order-preserving, which is what makes
//! snapshots reproducible.
//!
//! ## Static vs. Dynamic
//!
//! Every parameter is either *static* (a fixed tensor value, captured by
//! snapshots) or *dynamic* (a free variable supplied at call time, never
//! snapshotted). The distinction is fixed at construction:
//!
//! ```rust,ignore
//! let fixed = Parameter::static_value("z_l", Tensor::new(0.5f32, &device)?);
//! let free = Parameter::dynamic("x0");
//! assert!(fixed.is_static() && free.is_dynamic());
//! ```

use crate::{LensingError, Result};
use candle_core::{DType, Tensor};
use indexmap::IndexMap;

// ============================================================================
// Parameter
// ============================================================================

/// Whether a parameter holds a fixed value or is supplied per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Static,
    Dynamic,
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamKind::Static => write!(f, "static"),
            ParamKind::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// A named leaf of the parameter tree.
///
/// Static parameters always hold a value (possibly the canonical empty tensor
/// for "declared but unassigned"); dynamic parameters never do.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    value: Option<Tensor>,
    kind: ParamKind,
}

impl Parameter {
    /// A static parameter with a fixed tensor value.
    pub fn static_value(name: impl Into<String>, value: Tensor) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            kind: ParamKind::Static,
        }
    }

    /// A dynamic parameter; its value is supplied at call time.
    pub fn dynamic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            kind: ParamKind::Dynamic,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&Tensor> {
        self.value.as_ref()
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn is_static(&self) -> bool {
        self.kind == ParamKind::Static
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind == ParamKind::Dynamic
    }

    /// Shape of the held value, if any.
    pub fn shape(&self) -> Option<&[usize]> {
        self.value.as_ref().map(|t| t.dims())
    }

    /// Dtype of the held value, if any.
    pub fn dtype(&self) -> Option<DType> {
        self.value.as_ref().map(|t| t.dtype())
    }
}

// ============================================================================
// Namespace
// ============================================================================

/// One node of the parameter tree: a leaf or a named sub-tree.
#[derive(Debug, Clone)]
pub enum Entry {
    Param(Parameter),
    Group(Namespace),
}

/// An ordered, nested mapping from names to parameters.
///
/// Insertion order is iteration order at every level, so the flat view is
/// deterministic for a given construction sequence.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    entries: IndexMap<String, Entry>,
}

/// True if `name` can stand as one segment of a dotted path: non-empty,
/// alphanumerics, `_` and `-` only.
pub(crate) fn valid_segment(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// Validate a dotted path and split it into segments.
fn split_path(path: &str) -> Result<Vec<&str>> {
    if path.is_empty() {
        return Err(LensingError::Namespace("empty path".to_string()));
    }
    let segments: Vec<&str> = path.split('.').collect();
    for segment in &segments {
        if !valid_segment(segment) {
            return Err(LensingError::Namespace(format!(
                "invalid segment '{segment}' in path '{path}'"
            )));
        }
    }
    Ok(segments)
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries at this level (leaves and groups).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries at this level in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Insert a parameter at a dotted path, creating intermediate groups.
    ///
    /// Re-inserting at an existing leaf path replaces the parameter. A path
    /// that crosses an existing leaf, or lands on an existing group, is a
    /// namespace error.
    pub fn insert_param(&mut self, path: &str, param: Parameter) -> Result<()> {
        let segments = split_path(path)?;
        let (leaf, groups) = segments
            .split_last()
            .ok_or_else(|| LensingError::Namespace(format!("empty path '{path}'")))?;

        let target = self.descend_mut(groups, path)?;
        match target.entries.get(*leaf) {
            Some(Entry::Group(_)) => Err(LensingError::Namespace(format!(
                "'{path}' is a group, not a parameter"
            ))),
            _ => {
                target.entries.insert((*leaf).to_string(), Entry::Param(param));
                Ok(())
            }
        }
    }

    /// Insert a whole sub-namespace at a dotted path.
    pub fn insert_group(&mut self, path: &str, group: Namespace) -> Result<()> {
        let segments = split_path(path)?;
        let (leaf, groups) = segments
            .split_last()
            .ok_or_else(|| LensingError::Namespace(format!("empty path '{path}'")))?;

        let target = self.descend_mut(groups, path)?;
        match target.entries.get(*leaf) {
            Some(Entry::Param(_)) => Err(LensingError::Namespace(format!(
                "'{path}' is a parameter, not a group"
            ))),
            _ => {
                target.entries.insert((*leaf).to_string(), Entry::Group(group));
                Ok(())
            }
        }
    }

    fn descend_mut(&mut self, groups: &[&str], path: &str) -> Result<&mut Namespace> {
        let mut current = self;
        for segment in groups {
            let entry = current
                .entries
                .entry((*segment).to_string())
                .or_insert_with(|| Entry::Group(Namespace::new()));
            match entry {
                Entry::Group(ns) => current = ns,
                Entry::Param(_) => {
                    return Err(LensingError::Namespace(format!(
                        "'{segment}' in path '{path}' is a parameter, not a group"
                    )))
                }
            }
        }
        Ok(current)
    }

    /// Look up an entry by dotted path.
    pub fn entry(&self, path: &str) -> Option<&Entry> {
        let segments: Vec<&str> = path.split('.').collect();
        let (leaf, groups) = segments.split_last()?;
        let mut current = self;
        for segment in groups {
            match current.entries.get(*segment) {
                Some(Entry::Group(ns)) => current = ns,
                _ => return None,
            }
        }
        current.entries.get(*leaf)
    }

    /// Look up a parameter by dotted path.
    pub fn param(&self, path: &str) -> Option<&Parameter> {
        match self.entry(path) {
            Some(Entry::Param(p)) => Some(p),
            _ => None,
        }
    }

    /// Look up a sub-namespace by dotted path.
    pub fn group(&self, path: &str) -> Option<&Namespace> {
        match self.entry(path) {
            Some(Entry::Group(ns)) => Some(ns),
            _ => None,
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entry(path).is_some()
    }

    /// Flat view: dotted leaf paths to parameters, in declaration order.
    pub fn flatten(&self) -> IndexMap<String, Parameter> {
        let mut flat = IndexMap::new();
        self.flatten_into("", &mut flat);
        flat
    }

    fn flatten_into(&self, prefix: &str, flat: &mut IndexMap<String, Parameter>) {
        for (name, entry) in &self.entries {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            match entry {
                Entry::Param(p) => {
                    flat.insert(path, p.clone());
                }
                Entry::Group(ns) => ns.flatten_into(&path, flat),
            }
        }
    }

    /// Flat view restricted to static leaves.
    pub fn static_params(&self) -> IndexMap<String, Parameter> {
        self.flatten()
            .into_iter()
            .filter(|(_, p)| p.is_static())
            .collect()
    }

    /// Flat view restricted to dynamic leaves.
    pub fn dynamic_params(&self) -> IndexMap<String, Parameter> {
        self.flatten()
            .into_iter()
            .filter(|(_, p)| p.is_dynamic())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::cpu_device;

    fn scalar(x: f32) -> Tensor {
        Tensor::new(x, &cpu_device()).unwrap()
    }

    #[test]
    fn test_static_and_dynamic_construction() {
        let p = Parameter::static_value("z_l", scalar(0.5));
        assert_eq!(p.name(), "z_l");
        assert!(p.is_static());
        assert!(p.value().is_some());
        assert_eq!(p.shape().unwrap(), &[] as &[usize]);
        assert_eq!(p.dtype().unwrap(), DType::F32);

        let d = Parameter::dynamic("x0");
        assert!(d.is_dynamic());
        assert!(d.value().is_none());
        assert!(d.shape().is_none());
    }

    #[test]
    fn test_insert_and_get_by_dotted_path() {
        let mut ns = Namespace::new();
        ns.insert_param("lens.cosmology.h0", Parameter::static_value("h0", scalar(67.66)))
            .unwrap();
        ns.insert_param("lens.z_l", Parameter::static_value("z_l", scalar(0.5)))
            .unwrap();

        let h0 = ns.param("lens.cosmology.h0").unwrap();
        assert_eq!(h0.value().unwrap().to_scalar::<f32>().unwrap(), 67.66);
        assert!(ns.group("lens").unwrap().contains("z_l"));
        assert!(ns.param("lens.missing").is_none());
        assert!(ns.group("lens.z_l").is_none());
    }

    #[test]
    fn test_flatten_preserves_declaration_order() {
        let mut ns = Namespace::new();
        ns.insert_param("sim.z_s", Parameter::dynamic("z_s")).unwrap();
        ns.insert_param("lens.z_l", Parameter::static_value("z_l", scalar(0.5)))
            .unwrap();
        ns.insert_param("lens.b", Parameter::static_value("b", scalar(1.4)))
            .unwrap();
        ns.insert_param("source.Ie", Parameter::dynamic("Ie")).unwrap();

        let flat = ns.flatten();
        let keys: Vec<&String> = flat.keys().collect();
        assert_eq!(keys, vec!["sim.z_s", "lens.z_l", "lens.b", "source.Ie"]);
    }

    #[test]
    fn test_flatten_is_lossless() {
        let mut inner = Namespace::new();
        inner
            .insert_param("h0", Parameter::static_value("h0", scalar(67.66)))
            .unwrap();
        let mut ns = Namespace::new();
        ns.insert_group("cosmology", inner).unwrap();
        ns.insert_param("z_l", Parameter::static_value("z_l", scalar(0.5)))
            .unwrap();

        let flat = ns.flatten();
        assert_eq!(flat.len(), 2);
        assert!(flat.contains_key("cosmology.h0"));
        assert!(flat.contains_key("z_l"));
    }

    #[test]
    fn test_static_dynamic_filtering() {
        let mut ns = Namespace::new();
        ns.insert_param("a", Parameter::static_value("a", scalar(1.0)))
            .unwrap();
        ns.insert_param("b", Parameter::dynamic("b")).unwrap();
        ns.insert_param("grp.c", Parameter::static_value("c", scalar(3.0)))
            .unwrap();

        let statics = ns.static_params();
        assert_eq!(statics.len(), 2);
        assert!(statics.contains_key("a"));
        assert!(statics.contains_key("grp.c"));

        let dynamics = ns.dynamic_params();
        assert_eq!(dynamics.len(), 1);
        assert!(dynamics.contains_key("b"));
    }

    #[test]
    fn test_reinsert_replaces_leaf() {
        let mut ns = Namespace::new();
        ns.insert_param("a", Parameter::static_value("a", scalar(1.0)))
            .unwrap();
        ns.insert_param("a", Parameter::static_value("a", scalar(2.0)))
            .unwrap();
        assert_eq!(ns.len(), 1);
        let a = ns.param("a").unwrap();
        assert_eq!(a.value().unwrap().to_scalar::<f32>().unwrap(), 2.0);
    }

    #[test]
    fn test_leaf_group_conflicts_are_errors() {
        let mut ns = Namespace::new();
        ns.insert_param("lens", Parameter::dynamic("lens")).unwrap();

        let err = ns
            .insert_param("lens.z_l", Parameter::dynamic("z_l"))
            .unwrap_err();
        assert!(err.to_string().contains("not a group"));

        let err = ns.insert_group("lens", Namespace::new()).unwrap_err();
        assert!(err.to_string().contains("not a group"));
    }

    #[test]
    fn test_invalid_paths_rejected() {
        let mut ns = Namespace::new();
        assert!(ns.insert_param("", Parameter::dynamic("x")).is_err());
        assert!(ns.insert_param("a..b", Parameter::dynamic("x")).is_err());
        assert!(ns.insert_param("a b", Parameter::dynamic("x")).is_err());
        assert!(ns.insert_param("ok.z-1_x", Parameter::dynamic("x")).is_ok());
    }
}
