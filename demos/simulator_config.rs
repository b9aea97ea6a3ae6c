//! Simulator configuration, validation and snapshotting
//!
//! Demonstrates: registry → schema surface → validate → build → snapshot
//!
//! Run with:
//! ```bash
//! cargo run --example simulator_config
//! ```

use lensing_core::prelude::*;
use serde_json::json;

fn main() -> Result<()> {
    // 1. The component catalog, grouped into families
    let registry = Registry::with_builtins();
    println!("Registered components: {}", registry.len());
    println!("Single lenses: {:?}", registry.kinds(Family::SingleLens));

    // 2. Generate the schema surface in dependency order
    let schemas = build_all(&registry)?;
    println!("Lens union members: {:?}", schemas.lenses.kinds());

    // 3. Validate untagged configuration data against the simulator union
    let device = best_device();
    let config = schemas.simulators.validate(
        &json!({
            "kind": "LensSource",
            "params": { "z_s": 1.5 },
            "init_kwargs": {
                "lens": {
                    "kind": "SIE",
                    "params": { "z_l": 0.5, "b": 1.4 },
                    "init_kwargs": { "cosmology": { "kind": "FlatLambdaCDM" } }
                },
                "source": { "kind": "Sersic", "params": { "n": 2.0, "Re": 0.8 } },
                "lens_light": { "kind": "Sersic" },
                "pixelscale": 0.05,
                "pixels_x": 100
            }
        }),
        &device,
    )?;
    println!("\nValidated a '{}' configuration", config.kind());

    // 4. Unknown kinds fail closed with the member list
    let bad = schemas.lenses.validate(&json!({ "kind": "WarpDrive" }), &device);
    println!("Rejected: {}", bad.unwrap_err());

    // 5. Reconstruct the live component tree and walk its namespace
    let sim = config.build()?;
    let namespace = sim.namespace()?;
    println!("\n--- Parameters ---");
    for (path, param) in namespace.flatten() {
        match param.value() {
            Some(t) => println!("{path}: {} {:?}", param.kind(), t.dims()),
            None => println!("{path}: {}", param.kind()),
        }
    }

    // 6. Snapshot the static parameters and round-trip through safetensors
    let state = StateDict::from_namespace(&namespace, &device)?;
    let bytes = state.serialize()?;
    println!("\nSnapshot: {} entries, {} bytes", state.len(), bytes.len());
    println!("Version: {}", state.metadata().software_version);
    println!("Created: {}", state.metadata().created_time_str());

    let restored = StateDict::deserialize(&bytes, &device)?;
    println!("Round trip content equal: {}", state.content_eq(&restored)?);

    Ok(())
}
