//! # lensing-core
//!
//! Infrastructure core for a differentiable gravitational-lensing simulation
//! toolkit: physical components (cosmologies, lenses, light sources) composed
//! into simulators whose parameters live in ordered namespaces, validated by
//! dynamically generated schemas and captured as immutable snapshots.
//!
//! ## Overview
//!
//! Physical models are opaque here. What this crate provides is the machinery
//! around them:
//!
//! - **Registry**: a catalog of component descriptors grouped into semantic
//!   families (cosmology, light source, single lens, multi lens, simulator)
//! - **Schema**: per-component validators synthesized from descriptor tables,
//!   aggregated into discriminated unions keyed by a `kind` tag
//! - **Params**: ordered, nested parameter namespaces with static (fixed) and
//!   dynamic (supplied per call) leaves
//! - **State**: `StateDict`, an immutable ordered snapshot of all static
//!   parameter values, serializable to safetensors with embedded metadata
//! - **Config**: JSON/TOML simulator configuration loading against the
//!   generated schema surface
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lensing_core::prelude::*;
//!
//! // Built-in component catalog
//! let registry = Registry::with_builtins();
//!
//! // Generate the full schema surface (cosmology -> ... -> simulators)
//! let schemas = build_all(&registry)?;
//!
//! // Validate untagged configuration data
//! let config = schemas.lenses.validate(&serde_json::json!({
//!     "kind": "SIE",
//!     "params": { "z_l": 0.5, "b": 1.4 },
//!     "init_kwargs": { "cosmology": { "kind": "FlatLambdaCDM" } },
//! }), &device)?;
//!
//! // Reconstruct the live component and snapshot its static parameters
//! let lens = config.build()?;
//! let state = StateDict::from_namespace(&lens.namespace()?, &device)?;
//! let blob = state.serialize()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `metal`: Apple Metal GPU acceleration
//! - `cuda`: NVIDIA CUDA GPU acceleration

pub mod config;
pub mod params;
pub mod registry;
pub mod schema;
pub mod state;
pub mod tensor;

// Re-export candle types for convenience
pub use candle_core::{DType, Device, Tensor};

/// Error types for lensing core operations
#[derive(Debug, thiserror::Error)]
pub enum LensingError {
    /// A `StateDict` was mutated after construction. Never recoverable.
    #[error("'StateDict' cannot be modified after creation.")]
    Immutable,

    /// A component name or dependency reference is not in the registry.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Configuration data failed validation against a component schema.
    #[error("Validation error for '{kind}.{field}': {reason}")]
    Validation {
        kind: String,
        field: String,
        reason: String,
    },

    /// A `kind` tag matched no member of a discriminated union.
    #[error("Unknown kind '{kind}' for {union}, expected one of: {known}")]
    Discrimination {
        kind: String,
        union: String,
        known: String,
    },

    #[error("Tensor operation failed: {0}")]
    Tensor(String),

    #[error("Namespace error: {0}")]
    Namespace(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for lensing core operations
pub type Result<T> = std::result::Result<T, LensingError>;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{DType, Device, Tensor};
    pub use crate::{LensingError, Result};

    // Tensor utilities
    pub use crate::tensor::{best_device, cpu_device, gpu_disabled};

    // Parameters
    pub use crate::params::{Namespace, ParamKind, Parameter};

    // Registry
    pub use crate::registry::{
        ComponentDescriptor, Family, FieldRole, FieldSpec, Registry, SharedRegistry, ValueType,
    };

    // Schema surface
    pub use crate::schema::union::{build_all, build_family, SchemaSet, UnionSchema};
    pub use crate::schema::{synthesize, Component, ComponentConfig, ComponentSchema, ConfigValue};

    // State snapshots
    pub use crate::state::{StateDict, StateMetadata};

    // Config loading
    pub use crate::config::{build_simulator, load_simulator, load_value};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let device = best_device();
        assert!(
            matches!(device, Device::Cpu)
                || matches!(device, Device::Metal(_))
                || matches!(device, Device::Cuda(_))
        );
    }

    #[test]
    fn test_error_display() {
        use crate::LensingError;

        let err = LensingError::Immutable;
        assert_eq!(
            err.to_string(),
            "'StateDict' cannot be modified after creation."
        );

        let err = LensingError::Validation {
            kind: "SIE".to_string(),
            field: "params.z_l".to_string(),
            reason: "expected a number".to_string(),
        };
        assert!(err.to_string().contains("SIE.params.z_l"));

        let err = LensingError::Discrimination {
            kind: "Baz".to_string(),
            union: "lenses".to_string(),
            known: "SIE, SIS".to_string(),
        };
        assert!(err.to_string().contains("Baz"));
        assert!(err.to_string().contains("SIE, SIS"));
    }
}
