//! State Snapshots
//!
//! [`StateDict`] captures a simulator's static parameter values at a point in
//! time: an ordered mapping from dotted parameter path to tensor, stamped
//! with the software version and a UTC creation time, and locked from the
//! moment it exists. The mutating methods are on the surface because callers
//! reach for them, but they fail unconditionally; deriving a changed
//! snapshot means constructing a new one ([`StateDict::merged`]).
//!
//! Snapshots serialize to the safetensors format with the metadata embedded
//! in the header, one tensor-table entry per static parameter:
//!
//! ```rust,ignore
//! let state = StateDict::from_namespace(&sim.namespace()?, &device)?;
//! state.save("checkpoint.safetensors")?;
//! let restored = StateDict::load("checkpoint.safetensors", &device)?;
//! assert!(state.content_eq(&restored)?);
//! ```
//!
//! Dynamic parameters have no fixed value and are never part of a snapshot;
//! static parameters that hold no tensor yet are normalized to a canonical
//! empty tensor so a snapshot is always complete over the static set.

use crate::params::{Namespace, Parameter};
use crate::tensor::{from_f32_bytes, sanitize, tensors_equal, to_f32_parts};
use crate::{LensingError, Result};
use candle_core::{Device, Tensor};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use indexmap::IndexMap;
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Metadata key for the library version that produced a snapshot.
pub const METADATA_SOFTWARE_VERSION: &str = "software_version";
/// Metadata key for the UTC creation time of a snapshot.
pub const METADATA_CREATED_TIME: &str = "created_time";

// ============================================================================
// Metadata
// ============================================================================

/// Snapshot provenance, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMetadata {
    pub software_version: String,
    pub created_time: DateTime<Utc>,
}

impl StateMetadata {
    /// Stamp with the crate version and the current wall clock.
    ///
    /// The timestamp is truncated to whole seconds, which is the precision
    /// the persisted layout carries; a snapshot therefore round-trips its
    /// metadata exactly.
    fn stamp() -> Self {
        Self {
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            created_time: Utc::now().trunc_subsecs(0),
        }
    }

    /// Creation time as an ISO-8601 string at second precision.
    pub fn created_time_str(&self) -> String {
        self.created_time
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            (
                METADATA_SOFTWARE_VERSION.to_string(),
                self.software_version.clone(),
            ),
            (METADATA_CREATED_TIME.to_string(), self.created_time_str()),
        ])
    }

    fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let software_version = map.get(METADATA_SOFTWARE_VERSION).ok_or_else(|| {
            LensingError::Serialization(format!("missing '{METADATA_SOFTWARE_VERSION}' metadata"))
        })?;
        let created_raw = map.get(METADATA_CREATED_TIME).ok_or_else(|| {
            LensingError::Serialization(format!("missing '{METADATA_CREATED_TIME}' metadata"))
        })?;
        let created_time = DateTime::parse_from_rfc3339(created_raw)
            .map_err(|e| {
                LensingError::Serialization(format!("bad '{METADATA_CREATED_TIME}': {e}"))
            })?
            .with_timezone(&Utc);
        Ok(Self {
            software_version: software_version.clone(),
            created_time,
        })
    }
}

// ============================================================================
// StateDict
// ============================================================================

/// An immutable, ordered snapshot of static parameter values.
#[derive(Debug, Clone)]
pub struct StateDict {
    entries: IndexMap<String, Tensor>,
    metadata: StateMetadata,
}

impl StateDict {
    /// Construct from literal name→tensor pairs and lock.
    ///
    /// Duplicate names follow last-write-wins before the lock takes effect.
    pub fn new<I: IntoIterator<Item = (String, Tensor)>>(entries: I) -> Self {
        let mut collected = IndexMap::new();
        for (name, tensor) in entries {
            collected.insert(name, tensor);
        }
        Self {
            entries: collected,
            metadata: StateMetadata::stamp(),
        }
    }

    fn with_metadata(entries: IndexMap<String, Tensor>, metadata: StateMetadata) -> Self {
        Self { entries, metadata }
    }

    pub fn metadata(&self) -> &StateMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Tensor> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Always fails: snapshots cannot be modified after creation.
    pub fn set(&mut self, _key: &str, _value: Tensor) -> Result<()> {
        Err(LensingError::Immutable)
    }

    /// Always fails: snapshots cannot be modified after creation.
    pub fn remove(&mut self, _key: &str) -> Result<()> {
        Err(LensingError::Immutable)
    }

    /// A new snapshot from this content plus overrides, last write wins.
    /// The result carries a fresh timestamp.
    pub fn merged<I: IntoIterator<Item = (String, Tensor)>>(&self, overrides: I) -> StateDict {
        let mut entries = self.entries.clone();
        for (name, tensor) in overrides {
            entries.insert(name, tensor);
        }
        StateDict::new(entries)
    }

    // ------------------------------------------------------------------
    // Namespace conversion
    // ------------------------------------------------------------------

    /// Snapshot the static leaves of a namespace.
    ///
    /// The namespace may be the full nested tree or an already-flattened
    /// static subset; both give the same snapshot because only static leaves
    /// are taken and each value is sanitized on the way in.
    pub fn from_namespace(namespace: &Namespace, device: &Device) -> Result<StateDict> {
        let mut entries = IndexMap::new();
        for (path, param) in namespace.static_params() {
            entries.insert(path, sanitize(param.value(), device)?);
        }
        Ok(StateDict::new(entries))
    }

    /// Rebuild a namespace of static parameters from this snapshot.
    ///
    /// The inverse of [`StateDict::from_namespace`] restricted to static
    /// content; dynamic parameters are not represented here.
    pub fn to_namespace(&self) -> Result<Namespace> {
        let mut namespace = Namespace::new();
        for (path, tensor) in &self.entries {
            let leaf = path.rsplit('.').next().unwrap_or(path);
            namespace.insert_param(path, Parameter::static_value(leaf, tensor.clone()))?;
        }
        Ok(namespace)
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Serialize to safetensors bytes with the metadata embedded.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buffers: Vec<(String, Vec<usize>, Vec<f32>)> =
            Vec::with_capacity(self.entries.len());
        for (name, tensor) in &self.entries {
            let (shape, data) = to_f32_parts(tensor)?;
            buffers.push((name.clone(), shape, data));
        }

        let mut views: Vec<(&str, TensorView)> = Vec::with_capacity(buffers.len());
        for (name, shape, data) in &buffers {
            let view = TensorView::new(Dtype::F32, shape.clone(), bytemuck::cast_slice(data))
                .map_err(|e| LensingError::Serialization(e.to_string()))?;
            views.push((name.as_str(), view));
        }

        let bytes = safetensors::serialize(views, &Some(self.metadata.to_map()))
            .map_err(|e| LensingError::Serialization(e.to_string()))?;
        debug!(
            entries = self.entries.len(),
            bytes = bytes.len(),
            "serialized state dict"
        );
        Ok(bytes)
    }

    /// Restore a snapshot from safetensors bytes.
    ///
    /// The embedded metadata is restored verbatim, so provenance survives a
    /// round trip. Entry order follows the byte stream, which the format
    /// normalizes; content equality is unaffected.
    pub fn deserialize(bytes: &[u8], device: &Device) -> Result<StateDict> {
        let tensors = SafeTensors::deserialize(bytes)
            .map_err(|e| LensingError::Serialization(e.to_string()))?;

        let mut entries = IndexMap::new();
        for (name, view) in tensors.tensors() {
            if view.dtype() != Dtype::F32 {
                return Err(LensingError::Serialization(format!(
                    "unsupported dtype {:?} for '{name}'",
                    view.dtype()
                )));
            }
            let tensor = from_f32_bytes(view.shape(), view.data(), device)?;
            entries.insert(name.to_string(), tensor);
        }

        let (_, header) = SafeTensors::read_metadata(bytes)
            .map_err(|e| LensingError::Serialization(e.to_string()))?;
        let metadata = match header.metadata() {
            Some(map) => StateMetadata::from_map(map)?,
            None => {
                return Err(LensingError::Serialization(
                    "missing snapshot metadata".to_string(),
                ))
            }
        };

        Ok(StateDict::with_metadata(entries, metadata))
    }

    /// Write the serialized snapshot to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.serialize()?)?;
        Ok(())
    }

    /// Read a snapshot back from a file.
    pub fn load(path: impl AsRef<Path>, device: &Device) -> Result<StateDict> {
        let data = std::fs::read(path)?;
        Self::deserialize(&data, device)
    }

    // ------------------------------------------------------------------
    // Comparison
    // ------------------------------------------------------------------

    /// Content equality: same key set, equal tensors under the
    /// canonical-empty rule. Key order and metadata are not compared.
    pub fn content_eq(&self, other: &StateDict) -> Result<bool> {
        if self.entries.len() != other.entries.len() {
            return Ok(false);
        }
        for (key, value) in &self.entries {
            match other.entries.get(key) {
                None => return Ok(false),
                Some(theirs) => {
                    if !tensors_equal(value, theirs)? {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }
}
