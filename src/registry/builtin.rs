//! Built-in Component Catalog
//!
//! Descriptor tables for the components shipped with the toolkit. The physics
//! lives elsewhere; these tables only pin down each constructor surface so
//! schemas and parameter namespaces can be generated for it.

use super::{ComponentDescriptor, Family, Registry, ValueType};
use serde_json::json;

pub(crate) fn register_builtins(registry: &mut Registry) {
    for descriptor in catalog() {
        registry
            .register(descriptor)
            .expect("builtin catalog is well formed");
    }
}

fn catalog() -> Vec<ComponentDescriptor> {
    vec![
        // Cosmology
        ComponentDescriptor::new("FlatLambdaCDM", Family::Cosmology)
            .with_description("Flat Lambda-CDM cosmology with no radiation")
            .with_param_default("h0", 67.66, "Hubble constant over 100")
            .with_param_default("critical_density_0", 127.2792, "Critical density at z=0")
            .with_param_default("Om0", 0.30966, "Matter density parameter at z=0"),
        // Light sources
        ComponentDescriptor::new("Sersic", Family::LightSource)
            .with_description("Sersic brightness profile")
            .with_param("x0", "X coordinate of the profile center")
            .with_param("y0", "Y coordinate of the profile center")
            .with_param("q", "Axis ratio")
            .with_param("phi", "Position angle")
            .with_param("n", "Sersic index")
            .with_param("Re", "Effective radius")
            .with_param("Ie", "Brightness at the effective radius")
            .with_keyword(
                "use_lenstronomy_convention",
                ValueType::Bool,
                false,
                "Use the lenstronomy definition of the Sersic index",
            ),
        ComponentDescriptor::new("Pixelated", Family::LightSource)
            .with_description("Pixelated source image interpolated on the fly")
            .with_param("x0", "X coordinate of the image center")
            .with_param("y0", "Y coordinate of the image center")
            .with_param("pixelscale", "Angular size of an image pixel")
            .with_param("image", "Source image to interpolate")
            .with_keyword(
                "shape",
                ValueType::Optional(Box::new(ValueType::List(Box::new(ValueType::Int)))),
                json!(null),
                "Shape of the source image",
            ),
        // Single lenses
        ComponentDescriptor::new("SIE", Family::SingleLens)
            .with_description("Singular isothermal ellipsoid")
            .with_param("z_l", "Redshift of the lens")
            .with_param("x0", "X coordinate of the lens center")
            .with_param("y0", "Y coordinate of the lens center")
            .with_param("q", "Axis ratio")
            .with_param("phi", "Position angle")
            .with_param("b", "Einstein radius")
            .with_dependency("cosmology", "Cosmology model")
            .with_keyword("s", ValueType::Float, 0.0, "Core softening length"),
        ComponentDescriptor::new("SIS", Family::SingleLens)
            .with_description("Singular isothermal sphere")
            .with_param("z_l", "Redshift of the lens")
            .with_param("x0", "X coordinate of the lens center")
            .with_param("y0", "Y coordinate of the lens center")
            .with_param("th_ein", "Einstein radius")
            .with_dependency("cosmology", "Cosmology model")
            .with_keyword("s", ValueType::Float, 0.0, "Core softening length"),
        ComponentDescriptor::new("EPL", Family::SingleLens)
            .with_description("Elliptical power-law profile")
            .with_param("z_l", "Redshift of the lens")
            .with_param("x0", "X coordinate of the lens center")
            .with_param("y0", "Y coordinate of the lens center")
            .with_param("q", "Axis ratio")
            .with_param("phi", "Position angle")
            .with_param("b", "Einstein radius")
            .with_param("t", "Power-law slope")
            .with_dependency("cosmology", "Cosmology model")
            .with_keyword("s", ValueType::Float, 0.0, "Core softening length")
            .with_keyword(
                "n_iter",
                ValueType::Int,
                18,
                "Iterations of the deflection-angle series",
            ),
        ComponentDescriptor::new("Point", Family::SingleLens)
            .with_description("Point mass lens")
            .with_param("z_l", "Redshift of the lens")
            .with_param("x0", "X coordinate of the lens center")
            .with_param("y0", "Y coordinate of the lens center")
            .with_param("th_ein", "Einstein radius")
            .with_dependency("cosmology", "Cosmology model")
            .with_keyword("s", ValueType::Float, 0.0, "Core softening length"),
        ComponentDescriptor::new("ExternalShear", Family::SingleLens)
            .with_description("External shear field")
            .with_param("z_l", "Redshift of the shear plane")
            .with_param("x0", "X coordinate of the shear center")
            .with_param("y0", "Y coordinate of the shear center")
            .with_param("gamma_1", "First shear component")
            .with_param("gamma_2", "Second shear component")
            .with_dependency("cosmology", "Cosmology model"),
        ComponentDescriptor::new("NFW", Family::SingleLens)
            .with_description("Navarro-Frenk-White halo")
            .with_param("z_l", "Redshift of the lens")
            .with_param("x0", "X coordinate of the halo center")
            .with_param("y0", "Y coordinate of the halo center")
            .with_param("m", "Mass of the halo")
            .with_param("c", "Concentration")
            .with_dependency("cosmology", "Cosmology model")
            .with_keyword(
                "use_case",
                ValueType::Str,
                "batchable",
                "Kernel variant, batchable or differentiable",
            ),
        // Multi lenses
        ComponentDescriptor::new("SinglePlane", Family::MultiLens)
            .with_description("Several lens models collapsed onto one plane")
            .with_param("z_l", "Redshift of the lens plane")
            .with_dependency("cosmology", "Cosmology model")
            .with_dependency_list("lenses", "Lens models in the plane"),
        // Simulators
        ComponentDescriptor::new("LensSource", Family::Simulator)
            .with_description("Lensed image of a source with optional lens light")
            .with_param("z_s", "Redshift of the source")
            .with_dependency("lens", "Lens mass model")
            .with_dependency("source", "Source light model")
            .with_dependency("lens_light", "Lens light model")
            .with_required_keyword("pixelscale", ValueType::Float, "Angular size of a pixel")
            .with_required_keyword("pixels_x", ValueType::Int, "Pixels per image side")
            .with_keyword(
                "upsample_factor",
                ValueType::Int,
                1,
                "Supersampling factor for the image plane",
            )
            .with_keyword(
                "quad_level",
                ValueType::Optional(Box::new(ValueType::Int)),
                json!(null),
                "Gauss-Legendre quadrature level for pixel integration",
            ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FieldRole;

    #[test]
    fn test_catalog_kinds_per_family() {
        let registry = Registry::with_builtins();
        assert_eq!(registry.kinds(Family::Cosmology), vec!["FlatLambdaCDM"]);
        assert_eq!(
            registry.kinds(Family::LightSource),
            vec!["Sersic", "Pixelated"]
        );
        assert_eq!(
            registry.kinds(Family::SingleLens),
            vec!["SIE", "SIS", "EPL", "Point", "ExternalShear", "NFW"]
        );
        assert_eq!(registry.kinds(Family::MultiLens), vec!["SinglePlane"]);
        assert_eq!(registry.kinds(Family::Simulator), vec!["LensSource"]);
    }

    #[test]
    fn test_single_lenses_declare_cosmology_dependency() {
        let registry = Registry::with_builtins();
        for descriptor in registry.list_family(Family::SingleLens) {
            let dep = descriptor
                .field("cosmology")
                .unwrap_or_else(|| panic!("{} lacks a cosmology field", descriptor.kind()));
            assert_eq!(dep.role, FieldRole::Dependency);
        }
    }

    #[test]
    fn test_single_plane_holds_a_lens_list() {
        let registry = Registry::with_builtins();
        let plane = registry.get_by_name("SinglePlane").unwrap();
        assert_eq!(
            plane.field("lenses").unwrap().role,
            FieldRole::DependencyList
        );
        assert!(!plane.field("lenses").unwrap().is_required());
    }

    #[test]
    fn test_simulator_required_keywords() {
        let registry = Registry::with_builtins();
        let sim = registry.get_by_name("LensSource").unwrap();
        assert!(sim.field("pixelscale").unwrap().is_required());
        assert!(sim.field("pixels_x").unwrap().is_required());
        assert!(!sim.field("upsample_factor").unwrap().is_required());
        assert!(!sim.field("quad_level").unwrap().is_required());
    }

    #[test]
    fn test_cosmology_defaults_present() {
        let registry = Registry::with_builtins();
        let cosmo = registry.get_by_name("FlatLambdaCDM").unwrap();
        for field in cosmo.fields() {
            assert!(field.default.is_some(), "{} lacks a default", field.name);
        }
    }
}
