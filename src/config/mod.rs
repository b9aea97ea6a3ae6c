//! Configuration Loading
//!
//! Builds simulators from configuration files. JSON and TOML are both
//! accepted; TOML is brought to the common JSON value form first, so one
//! validation path serves both formats.
//!
//! ```rust,ignore
//! let registry = Registry::with_builtins();
//! let schemas = build_all(&registry)?;
//! let sim = build_simulator("sim.toml", &schemas, &best_device())?;
//! let state = StateDict::from_namespace(&sim.namespace()?, &device)?;
//! ```

use crate::schema::union::SchemaSet;
use crate::schema::{Component, ComponentConfig};
use crate::{LensingError, Result};
use candle_core::Device;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Load a configuration file into a JSON value.
///
/// The format follows the file extension: `.json` or `.toml`.
pub fn load_value(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(LensingError::Io)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("json") => Ok(serde_json::from_str(&content)?),
        Some("toml") => {
            let parsed: toml::Value = toml::from_str(&content).map_err(|e| {
                LensingError::Config(format!("failed to parse '{}': {e}", path.display()))
            })?;
            Ok(serde_json::to_value(parsed)?)
        }
        _ => Err(LensingError::Config(format!(
            "unsupported configuration format for '{}', expected .json or .toml",
            path.display()
        ))),
    }
}

/// Load and validate a simulator configuration file.
pub fn load_simulator(
    path: impl AsRef<Path>,
    schemas: &SchemaSet,
    device: &Device,
) -> Result<ComponentConfig> {
    let value = load_value(path.as_ref())?;
    let config = schemas.simulators.validate(&value, device)?;
    debug!(
        path = %path.as_ref().display(),
        kind = config.kind(),
        "loaded simulator configuration"
    );
    Ok(config)
}

/// Load, validate and reconstruct a simulator in one step.
pub fn build_simulator(
    path: impl AsRef<Path>,
    schemas: &SchemaSet,
    device: &Device,
) -> Result<Component> {
    load_simulator(path, schemas, device)?.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::schema::union::build_all;
    use crate::state::StateDict;
    use crate::tensor::cpu_device;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const SIM_JSON: &str = r#"{
        "kind": "LensSource",
        "params": { "z_s": 1.5 },
        "init_kwargs": {
            "lens": {
                "kind": "SIE",
                "params": { "z_l": 0.5, "b": 1.4 },
                "init_kwargs": { "cosmology": { "kind": "FlatLambdaCDM" } }
            },
            "source": { "kind": "Sersic", "params": { "n": 2.0 } },
            "lens_light": { "kind": "Sersic" },
            "pixelscale": 0.05,
            "pixels_x": 100
        }
    }"#;

    const SIM_TOML: &str = r#"
kind = "LensSource"

[params]
z_s = 1.5

[init_kwargs]
pixelscale = 0.05
pixels_x = 100

[init_kwargs.lens]
kind = "SIE"

[init_kwargs.lens.params]
z_l = 0.5
b = 1.4

[init_kwargs.lens.init_kwargs.cosmology]
kind = "FlatLambdaCDM"

[init_kwargs.source]
kind = "Sersic"

[init_kwargs.source.params]
n = 2.0

[init_kwargs.lens_light]
kind = "Sersic"
"#;

    fn write_fixture(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_value_json() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "sim.json", SIM_JSON);
        let value = load_value(&path).unwrap();
        assert_eq!(value["kind"], "LensSource");
        assert_eq!(value["init_kwargs"]["pixels_x"], 100);
    }

    #[test]
    fn test_load_value_toml() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "sim.toml", SIM_TOML);
        let value = load_value(&path).unwrap();
        assert_eq!(value["kind"], "LensSource");
        assert_eq!(value["init_kwargs"]["lens"]["kind"], "SIE");
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "sim.yaml", "kind: LensSource");
        let err = load_value(&path).unwrap_err();
        assert!(matches!(err, LensingError::Config(_)));
        assert!(err.to_string().contains("sim.yaml"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_value("/nonexistent/sim.json").unwrap_err();
        assert!(matches!(err, LensingError::Io(_)));
    }

    #[test]
    fn test_build_simulator_from_json() {
        let device = cpu_device();
        let schemas = build_all(&Registry::with_builtins()).unwrap();
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "sim.json", SIM_JSON);

        let sim = build_simulator(&path, &schemas, &device).unwrap();
        assert_eq!(sim.kind(), "LensSource");

        let ns = sim.namespace().unwrap();
        assert_eq!(
            ns.param("z_s").unwrap().value().unwrap().to_scalar::<f32>().unwrap(),
            1.5
        );
        assert!(ns.param("lens.q").unwrap().is_dynamic());
        assert_eq!(
            ns.param("lens.cosmology.h0")
                .unwrap()
                .value()
                .unwrap()
                .to_scalar::<f32>()
                .unwrap(),
            67.66
        );
    }

    #[test]
    fn test_json_and_toml_give_the_same_snapshot() {
        let device = cpu_device();
        let schemas = build_all(&Registry::with_builtins()).unwrap();
        let dir = TempDir::new().unwrap();
        let json_path = write_fixture(&dir, "sim.json", SIM_JSON);
        let toml_path = write_fixture(&dir, "sim.toml", SIM_TOML);

        let from_json = build_simulator(&json_path, &schemas, &device).unwrap();
        let from_toml = build_simulator(&toml_path, &schemas, &device).unwrap();

        let a = StateDict::from_namespace(&from_json.namespace().unwrap(), &device).unwrap();
        let b = StateDict::from_namespace(&from_toml.namespace().unwrap(), &device).unwrap();
        assert!(a.content_eq(&b).unwrap());
    }

    #[test]
    fn test_unknown_kind_in_file_fails_closed() {
        let device = cpu_device();
        let schemas = build_all(&Registry::with_builtins()).unwrap();
        let dir = TempDir::new().unwrap();
        let path = write_fixture(
            &dir,
            "sim.json",
            r#"{ "kind": "WarpDrive", "init_kwargs": {} }"#,
        );

        let err = load_simulator(&path, &schemas, &device).unwrap_err();
        assert!(matches!(err, LensingError::Discrimination { .. }));
    }
}
