//! Tensor Utilities
//!
//! Device selection, coercion of raw configuration values into tensors, and
//! the conversions backing safetensors persistence.
//!
//! All physical parameter values in this crate are f32 tensors. Configuration
//! data arrives as JSON values (numbers, flat lists, nested lists) and is
//! coerced here; uninitialized values are normalized to a canonical empty
//! tensor so snapshots can represent "declared but not yet assigned".
//!
//! ## Device Selection
//!
//! GPU use is opt-in via the `metal`/`cuda` features. Set `LENSING_NO_GPU=1`
//! to force CPU mode regardless of features:
//!
//! ```bash
//! export LENSING_NO_GPU=1
//! ```

use crate::{LensingError, Result};
use candle_core::{DType, Device, Tensor};
use serde_json::Value;
use tracing::info;

// ============================================================================
// Device Selection
// ============================================================================

/// Check if GPU is disabled via environment variable.
///
/// Set `LENSING_NO_GPU=1` to force CPU-only mode.
pub fn gpu_disabled() -> bool {
    std::env::var("LENSING_NO_GPU")
        .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
        .unwrap_or(false)
}

/// Get the best available device for tensor operations
///
/// Priority:
/// 1. Check `LENSING_NO_GPU` env var (forces CPU if set)
/// 2. Metal (Apple Silicon)
/// 3. CUDA (NVIDIA GPUs)
/// 4. CPU (fallback)
pub fn best_device() -> Device {
    if gpu_disabled() {
        info!("💻 Using CPU device (LENSING_NO_GPU set)");
        return Device::Cpu;
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            info!("🍎 Using Metal device (Apple Silicon)");
            return device;
        }
    }

    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            info!("🟢 Using CUDA device (NVIDIA GPU)");
            return device;
        }
    }

    info!("💻 Using CPU device");
    Device::Cpu
}

/// Force CPU device, ignoring GPU availability.
///
/// Snapshots compared or serialized in tests use this for determinism.
pub fn cpu_device() -> Device {
    Device::Cpu
}

// ============================================================================
// Coercion
// ============================================================================

/// Coerce a JSON value into an f32 tensor.
///
/// Accepted shapes:
/// - number → rank-0 tensor
/// - flat list of numbers → rank-1 tensor
/// - rectangular nested lists → rank-n tensor
///
/// Anything else (strings, booleans, objects, ragged nesting) is rejected
/// with a message naming what was seen; callers attach the field path.
pub fn coerce_tensor(value: &Value, device: &Device) -> Result<Tensor> {
    match value {
        Value::Number(n) => {
            let x = n
                .as_f64()
                .ok_or_else(|| LensingError::Tensor(format!("non-finite number: {n}")))?;
            Ok(Tensor::new(x as f32, device)?)
        }
        Value::Array(_) => {
            let mut shape: Vec<usize> = Vec::new();
            let mut flat: Vec<f32> = Vec::new();
            collect_numeric(value, 0, &mut shape, &mut flat)?;
            let expected: usize = shape.iter().product();
            if flat.len() != expected {
                return Err(LensingError::Tensor(
                    "ragged nested sequence cannot form a tensor".to_string(),
                ));
            }
            Ok(Tensor::from_vec(flat, shape.as_slice(), device)?)
        }
        other => Err(LensingError::Tensor(format!(
            "cannot convert {} to a tensor",
            json_type_name(other)
        ))),
    }
}

fn collect_numeric(
    value: &Value,
    depth: usize,
    shape: &mut Vec<usize>,
    flat: &mut Vec<f32>,
) -> Result<()> {
    match value {
        Value::Number(n) => {
            if depth != shape.len() {
                return Err(LensingError::Tensor(
                    "ragged nested sequence cannot form a tensor".to_string(),
                ));
            }
            let x = n
                .as_f64()
                .ok_or_else(|| LensingError::Tensor(format!("non-finite number: {n}")))?;
            flat.push(x as f32);
            Ok(())
        }
        Value::Array(items) => {
            if depth == shape.len() {
                // the first leaf fixes the rank; a deeper sibling after it
                // is ragged
                if !flat.is_empty() {
                    return Err(LensingError::Tensor(
                        "ragged nested sequence cannot form a tensor".to_string(),
                    ));
                }
                shape.push(items.len());
            } else if shape[depth] != items.len() {
                return Err(LensingError::Tensor(
                    "ragged nested sequence cannot form a tensor".to_string(),
                ));
            }
            for item in items {
                collect_numeric(item, depth + 1, shape, flat)?;
            }
            Ok(())
        }
        other => Err(LensingError::Tensor(format!(
            "cannot convert {} to a tensor",
            json_type_name(other)
        ))),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Empty-value Normalization
// ============================================================================

/// The canonical empty tensor: zero elements, rank 1, f32.
pub fn empty_tensor(device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_vec(Vec::<f32>::new(), 0usize, device)?)
}

/// True if the tensor holds no elements.
pub fn is_empty(tensor: &Tensor) -> bool {
    tensor.elem_count() == 0
}

/// Normalize a possibly-missing value for snapshotting.
///
/// Uninitialized (`None`) and zero-element tensors both map to the canonical
/// empty tensor; everything else passes through unchanged.
pub fn sanitize(value: Option<&Tensor>, device: &Device) -> Result<Tensor> {
    match value {
        Some(t) if !is_empty(t) => Ok(t.clone()),
        _ => empty_tensor(device),
    }
}

/// Elementwise tensor equality with the canonical-empty rule.
///
/// Two zero-element tensors compare equal regardless of their shapes or
/// dtypes; non-empty tensors must match in shape and in every element.
pub fn tensors_equal(a: &Tensor, b: &Tensor) -> Result<bool> {
    if is_empty(a) && is_empty(b) {
        return Ok(true);
    }
    if a.dims() != b.dims() {
        return Ok(false);
    }
    let av = to_f32_data(a)?;
    let bv = to_f32_data(b)?;
    Ok(av == bv)
}

// ============================================================================
// Safetensors Conversions
// ============================================================================

/// Flatten a tensor into (shape, f32 data) for a safetensors view.
pub fn to_f32_parts(tensor: &Tensor) -> Result<(Vec<usize>, Vec<f32>)> {
    let shape = tensor.dims().to_vec();
    Ok((shape, to_f32_data(tensor)?))
}

/// Rebuild a tensor from the shape and raw bytes of a safetensors view.
pub fn from_f32_bytes(shape: &[usize], data: &[u8], device: &Device) -> Result<Tensor> {
    let float_data: Vec<f32> = bytemuck::cast_slice(data).to_vec();
    Ok(Tensor::from_vec(float_data, shape, device)?)
}

fn to_f32_data(tensor: &Tensor) -> Result<Vec<f32>> {
    if is_empty(tensor) {
        return Ok(Vec::new());
    }
    Ok(tensor
        .to_dtype(DType::F32)?
        .flatten_all()?
        .to_vec1::<f32>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_scalar() {
        let device = cpu_device();
        let t = coerce_tensor(&json!(1.5), &device).unwrap();
        assert_eq!(t.dims(), &[] as &[usize]);
        assert_eq!(t.to_scalar::<f32>().unwrap(), 1.5);
    }

    #[test]
    fn test_coerce_flat_list() {
        let device = cpu_device();
        let t = coerce_tensor(&json!([1.0, 2.0, 3.0]), &device).unwrap();
        assert_eq!(t.dims(), &[3]);
        assert_eq!(t.to_vec1::<f32>().unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_coerce_nested_list() {
        let device = cpu_device();
        let t = coerce_tensor(&json!([[1.0, 2.0], [3.0, 4.0]]), &device).unwrap();
        assert_eq!(t.dims(), &[2, 2]);
        assert_eq!(
            t.to_vec2::<f32>().unwrap(),
            vec![vec![1.0, 2.0], vec![3.0, 4.0]]
        );
    }

    #[test]
    fn test_coerce_rejects_ragged() {
        let device = cpu_device();
        let err = coerce_tensor(&json!([[1.0, 2.0], [3.0]]), &device).unwrap_err();
        assert!(err.to_string().contains("ragged"));
    }

    #[test]
    fn test_coerce_rejects_mixed_depth_siblings() {
        // scalars and lists at the same level never form a tensor, even when
        // the element count matches the inferred shape product
        let device = cpu_device();
        let err = coerce_tensor(&json!([1.0, [2.0]]), &device).unwrap_err();
        assert!(err.to_string().contains("ragged"));
        let err = coerce_tensor(&json!([1, 2, [3]]), &device).unwrap_err();
        assert!(err.to_string().contains("ragged"));
        let err = coerce_tensor(&json!([[1.0], 2.0]), &device).unwrap_err();
        assert!(err.to_string().contains("ragged"));
    }

    #[test]
    fn test_coerce_rejects_strings() {
        let device = cpu_device();
        let err = coerce_tensor(&json!("1.0"), &device).unwrap_err();
        assert!(err.to_string().contains("a string"));
    }

    #[test]
    fn test_empty_tensor_canonical() {
        let device = cpu_device();
        let e = empty_tensor(&device).unwrap();
        assert!(is_empty(&e));
        assert_eq!(e.dims(), &[0]);
    }

    #[test]
    fn test_sanitize_maps_none_and_empty_to_canonical() {
        let device = cpu_device();
        let none = sanitize(None, &device).unwrap();
        assert!(is_empty(&none));

        let already_empty = Tensor::from_vec(Vec::<f32>::new(), (0,), &device).unwrap();
        let kept = sanitize(Some(&already_empty), &device).unwrap();
        assert!(is_empty(&kept));

        let full = Tensor::new(2.0f32, &device).unwrap();
        let passed = sanitize(Some(&full), &device).unwrap();
        assert_eq!(passed.to_scalar::<f32>().unwrap(), 2.0);
    }

    #[test]
    fn test_differently_shaped_empties_are_equal() {
        // Zero-element tensors are one canonical "empty" for comparison,
        // whatever shape produced them.
        let device = cpu_device();
        let a = Tensor::from_vec(Vec::<f32>::new(), (0,), &device).unwrap();
        let b = Tensor::from_vec(Vec::<f32>::new(), (2, 0), &device).unwrap();
        assert!(tensors_equal(&a, &b).unwrap());
    }

    #[test]
    fn test_tensors_equal_values() {
        let device = cpu_device();
        let a = Tensor::from_vec(vec![1.0f32, 2.0], (2,), &device).unwrap();
        let b = Tensor::from_vec(vec![1.0f32, 2.0], (2,), &device).unwrap();
        let c = Tensor::from_vec(vec![1.0f32, 3.0], (2,), &device).unwrap();
        let d = Tensor::from_vec(vec![1.0f32, 2.0], (2, 1), &device).unwrap();
        assert!(tensors_equal(&a, &b).unwrap());
        assert!(!tensors_equal(&a, &c).unwrap());
        assert!(!tensors_equal(&a, &d).unwrap());
    }

    #[test]
    fn test_f32_parts_round_trip() {
        let device = cpu_device();
        let t = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0], (2, 2), &device).unwrap();
        let (shape, data) = to_f32_parts(&t).unwrap();
        assert_eq!(shape, vec![2, 2]);
        let bytes: &[u8] = bytemuck::cast_slice(&data);
        let back = from_f32_bytes(&shape, bytes, &device).unwrap();
        assert!(tensors_equal(&t, &back).unwrap());
    }

    #[test]
    fn test_scalar_round_trips_through_parts() {
        let device = cpu_device();
        let t = Tensor::new(7.0f32, &device).unwrap();
        let (shape, data) = to_f32_parts(&t).unwrap();
        assert!(shape.is_empty());
        assert_eq!(data, vec![7.0]);
        let bytes: &[u8] = bytemuck::cast_slice(&data);
        let back = from_f32_bytes(&shape, bytes, &device).unwrap();
        assert!(tensors_equal(&t, &back).unwrap());
    }
}
