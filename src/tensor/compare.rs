//! Element-wise tensor comparison with tolerance

use anyhow::{bail, Result};
use candle_core::{DType, Tensor};
use std::fmt::Write;

use crate::config::CompareConfig;

/// Statistics of one tensor comparison
#[derive(Debug, Clone, PartialEq)]
pub struct TensorDiff {
    /// Shape shared by both tensors
    pub shape: Vec<usize>,
    /// Maximum absolute difference
    pub max_abs_diff: f64,
    /// Mean absolute difference
    pub mean_abs_diff: f64,
    /// Number of elements beyond tolerance
    pub num_diffs: usize,
    /// Total number of elements
    pub total_elements: usize,
    /// Offending elements as (index, expected, actual, diff)
    pub diffs: Vec<(usize, f64, f64, f64)>,
}

impl TensorDiff {
    /// True if no element exceeded the tolerance
    pub fn passed(&self) -> bool {
        self.num_diffs == 0
    }
}

/// Compare float values with tolerance
///
/// `expected` is the reference side. A NaN on either side always counts
/// as a difference.
pub fn compare_values(expected: &[f64], actual: &[f64], config: &CompareConfig) -> TensorDiff {
    let mut max_diff = 0.0f64;
    let mut sum_diff = 0.0f64;
    let mut diffs = Vec::new();

    for (i, (&e, &a)) in expected.iter().zip(actual.iter()).enumerate() {
        let diff = (e - a).abs();
        if diff.is_nan() {
            max_diff = f64::NAN;
        } else if !max_diff.is_nan() {
            max_diff = max_diff.max(diff);
        }
        sum_diff += diff;

        if !(diff <= config.tolerance(e)) {
            diffs.push((i, e, a, diff));
        }
    }

    TensorDiff {
        shape: vec![expected.len()],
        max_abs_diff: max_diff,
        mean_abs_diff: sum_diff / expected.len().max(1) as f64,
        num_diffs: diffs.len(),
        total_elements: expected.len(),
        diffs,
    }
}

/// Check two tensors for closeness, failing on shape mismatch or on any
/// element beyond tolerance
pub fn allclose(expected: &Tensor, actual: &Tensor, config: &CompareConfig) -> Result<TensorDiff> {
    let expected_shape = expected.dims().to_vec();
    let actual_shape = actual.dims().to_vec();
    if expected_shape != actual_shape {
        bail!(
            "Shape mismatch: expected {:?}, got {:?}",
            expected_shape,
            actual_shape
        );
    }

    // f64 holds every supported dtype exactly
    let e: Vec<f64> = expected.flatten_all()?.to_dtype(DType::F64)?.to_vec1()?;
    let a: Vec<f64> = actual.flatten_all()?.to_dtype(DType::F64)?.to_vec1()?;

    let mut diff = compare_values(&e, &a, config);
    diff.shape = expected_shape;

    if !diff.passed() {
        let mut msg = format!(
            "Not equal to tolerance atol={:e}, rtol={:e}\n\
             Mismatched elements: {} / {}, max_diff={:.2e}, mean_diff={:.2e}, shape {:?}",
            config.atol,
            config.rtol,
            diff.num_diffs,
            diff.total_elements,
            diff.max_abs_diff,
            diff.mean_abs_diff,
            diff.shape
        );
        if config.verbose {
            for (i, (idx, expected, actual, d)) in diff.diffs.iter().enumerate() {
                if i >= config.max_diffs {
                    let _ = write!(msg, "\n  ... and {} more", diff.diffs.len() - i);
                    break;
                }
                let _ = write!(
                    msg,
                    "\n  [{}] expected={:.6}, actual={:.6}, diff={:.2e}",
                    idx, expected, actual, d
                );
            }
        }
        bail!(msg);
    }

    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn config(atol: f64, rtol: f64) -> CompareConfig {
        CompareConfig {
            atol,
            rtol,
            ..Default::default()
        }
    }

    #[test]
    fn test_compare_values() {
        let config = config(1e-4, 1e-3);

        let expected = vec![1.0, 2.0, 3.0];
        let actual = vec![1.0, 2.0, 3.0];
        let diff = compare_values(&expected, &actual, &config);
        assert_eq!(diff.max_abs_diff, 0.0);
        assert_eq!(diff.num_diffs, 0);

        let actual = vec![1.0001, 2.0001, 3.0001];
        let diff = compare_values(&expected, &actual, &config);
        assert!(diff.max_abs_diff < 0.001);
        assert_eq!(diff.num_diffs, 0);

        let actual = vec![1.1, 2.1, 3.1];
        let diff = compare_values(&expected, &actual, &config);
        assert_eq!(diff.num_diffs, 3);
    }

    #[test]
    fn test_compare_values_nan_never_passes() {
        let diff = compare_values(&[f64::NAN], &[f64::NAN], &config(1.0, 0.0));
        assert_eq!(diff.num_diffs, 1);
        assert!(diff.max_abs_diff.is_nan());
    }

    #[test]
    fn test_allclose_shape_mismatch() {
        let dev = Device::Cpu;
        let a = Tensor::new(&[1f32, 2.0], &dev).unwrap();
        let b = Tensor::new(&[[1f32, 2.0]], &dev).unwrap();
        let err = allclose(&a, &b, &CompareConfig::default()).unwrap_err();
        assert!(err.to_string().contains("Shape mismatch"));
    }

    #[test]
    fn test_allclose_verbose_lists_diffs() {
        let dev = Device::Cpu;
        let a = Tensor::new(&[1f32, 2.0, 3.0], &dev).unwrap();
        let b = Tensor::new(&[1f32, 2.5, 3.5], &dev).unwrap();
        let cfg = CompareConfig {
            verbose: true,
            max_diffs: 1,
            ..Default::default()
        };
        let msg = allclose(&a, &b, &cfg).unwrap_err().to_string();
        assert!(msg.contains("Mismatched elements: 2 / 3"));
        assert!(msg.contains("[1] expected=2.000000"));
        assert!(msg.contains("... and 1 more"));
    }

    #[test]
    fn test_allclose_passes_within_atol() {
        let dev = Device::Cpu;
        let a = Tensor::new(&[1f64, 2.0], &dev).unwrap();
        let b = Tensor::new(&[1f64, 2.0], &dev).unwrap();
        let diff = allclose(&a, &b, &CompareConfig::default()).unwrap();
        assert!(diff.passed());
        assert_eq!(diff.shape, vec![2]);
    }

    #[test]
    fn test_allclose_keeps_f64_precision() {
        let dev = Device::Cpu;
        let a = Tensor::new(&[1000.0f64], &dev).unwrap();
        let b = Tensor::new(&[1000.00001f64], &dev).unwrap();
        let err = allclose(&a, &b, &CompareConfig::default()).unwrap_err();
        assert!(err.to_string().contains("Mismatched elements: 1 / 1"));

        let diff = allclose(&a, &b, &config(1e-4, 0.0)).unwrap();
        assert!(diff.max_abs_diff > 9e-6 && diff.max_abs_diff < 1.1e-5);
    }
}
