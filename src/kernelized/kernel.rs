// Kernel functions evaluated on a subset of the state dimensions

use serde::{Deserialize, Serialize};

use crate::error::{FddError, FddResult};

/// Kernel shape shared by every feature of a kernelized representation.
///
/// All kernels compare `x` and `center` only on the listed dimensions,
/// scaling dimension `d` by `widths[d]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelKind {
    /// `exp(-sum(((x - c) / w)^2))`
    #[default]
    Gaussian,
    /// Gaussian shifted down by `threshold`, clipped at zero and rescaled to peak at 1
    TruncatedGaussian { threshold: f64 },
    /// `min(max(0, 1 - |x - c| / w))`
    LinfTriangle,
    /// 1 when every `|x - c| < w`, else 0
    Linf,
    /// 1 when `x` and `c` fall in the same width-sized cell, else 0
    Discretization,
}

impl KernelKind {
    pub fn validate(&self) -> FddResult<()> {
        if let KernelKind::TruncatedGaussian { threshold } = self {
            if !(0.0..1.0).contains(threshold) {
                return Err(FddError::config(format!(
                    "truncated gaussian threshold {} must lie in [0, 1)",
                    threshold
                )));
            }
        }
        Ok(())
    }

    pub fn evaluate(&self, x: &[f64], center: &[f64], dims: &[usize], widths: &[f64]) -> f64 {
        match self {
            KernelKind::Gaussian => gaussian(x, center, dims, widths),
            KernelKind::TruncatedGaussian { threshold } => {
                let res = gaussian(x, center, dims, widths) - threshold;
                if res < 0.0 {
                    0.0
                } else {
                    res / (1.0 - threshold)
                }
            }
            KernelKind::LinfTriangle => dims
                .iter()
                .map(|&d| (1.0 - (x[d] - center[d]).abs() / widths[d]).max(0.0))
                .fold(1.0, f64::min),
            KernelKind::Linf => indicator(dims.iter().all(|&d| (x[d] - center[d]).abs() < widths[d])),
            KernelKind::Discretization => indicator(
                dims.iter()
                    .all(|&d| (x[d] / widths[d]).floor() == (center[d] / widths[d]).floor()),
            ),
        }
    }
}

fn gaussian(x: &[f64], center: &[f64], dims: &[usize], widths: &[f64]) -> f64 {
    let sq: f64 = dims
        .iter()
        .map(|&d| {
            let z = (x[d] - center[d]) / widths[d];
            z * z
        })
        .sum();
    (-sq).exp()
}

fn indicator(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}
