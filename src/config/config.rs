use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::DomainSpec;
use crate::error::{map_io_err, FddError, FddResult};
use crate::ifdd::{Ifdd, IfddK, RelevanceMode};
use crate::kernelized::{KernelKind, KernelizedIfdd};
use crate::representation::{Discoverable, WeightInit};

/// Parameters of the binary iFDD representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfddConfig {
    /// Relevance at or above which a potential is promoted. Values <= 0
    /// promote every observed pair.
    #[serde(default = "default_discovery_threshold")]
    pub discovery_threshold: f64,
    /// Let activated conjunctions consume their base features
    #[serde(default = "default_true")]
    pub sparsify: bool,
    /// Memoize resolved activations per active base set
    #[serde(default)]
    pub use_cache: bool,
    /// Upper bound on features added by one batch discovery
    #[serde(default = "default_max_batch_discovery")]
    pub max_batch_discovery: usize,
    /// Batch discovery only promotes relevances strictly above this
    #[serde(default)]
    pub batch_threshold: f64,
    #[serde(default)]
    pub relevance: RelevanceMode,
    /// Initialization of new weights; `None` picks parent sums when
    /// sparsifying and zeros otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_init: Option<WeightInit>,
    /// Bins per continuous dimension of the initial discretization
    #[serde(default = "default_discretization")]
    pub discretization: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Trace every new running maximum of the relevance
    #[serde(default)]
    pub print_max_relevance: bool,
}

impl Default for IfddConfig {
    fn default() -> Self {
        Self {
            discovery_threshold: default_discovery_threshold(),
            sparsify: true,
            use_cache: false,
            max_batch_discovery: default_max_batch_discovery(),
            batch_threshold: 0.0,
            relevance: RelevanceMode::Plus,
            weight_init: None,
            discretization: default_discretization(),
            seed: default_seed(),
            print_max_relevance: false,
        }
    }
}

impl IfddConfig {
    pub fn validate(&self) -> FddResult<()> {
        if self.discovery_threshold.is_nan() {
            return Err(FddError::config("discovery_threshold is NaN"));
        }
        if self.batch_threshold.is_nan() {
            return Err(FddError::config("batch_threshold is NaN"));
        }
        if self.discretization == 0 {
            return Err(FddError::config("discretization must be at least 1"));
        }
        Ok(())
    }

    /// Weight initialization policy in effect
    pub fn weight_init(&self) -> WeightInit {
        self.weight_init.unwrap_or(if self.sparsify {
            WeightInit::ParentSum
        } else {
            WeightInit::Zero
        })
    }
}

/// iFDD(kappa): binary iFDD with eligibility-traced relevance statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfddKConfig {
    #[serde(flatten)]
    pub ifdd: IfddConfig,
    /// Trace decay of the relevance statistics
    #[serde(default)]
    pub lambda: f64,
    /// Probability of using the classic (absolute) relevance on a step
    #[serde(default = "default_kappa")]
    pub kappa: f64,
    /// Update only the potentials active on a step, replaying the skipped
    /// steps when they next become active
    #[serde(default)]
    pub lazy: bool,
}

impl Default for IfddKConfig {
    fn default() -> Self {
        Self {
            ifdd: IfddConfig::default(),
            lambda: 0.0,
            kappa: default_kappa(),
            lazy: false,
        }
    }
}

impl IfddKConfig {
    pub fn validate(&self) -> FddResult<()> {
        self.ifdd.validate()?;
        if !(0.0..=1.0).contains(&self.lambda) {
            return Err(FddError::config(format!("lambda {} must lie in [0, 1]", self.lambda)));
        }
        if !(0.0..=1.0).contains(&self.kappa) {
            return Err(FddError::config(format!("kappa {} must lie in [0, 1]", self.kappa)));
        }
        Ok(())
    }
}

/// Parameters of the kernelized iFDD representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelizedConfig {
    #[serde(default)]
    pub kernel: KernelKind,
    /// Kernel width of every state dimension
    pub kernel_widths: Vec<f64>,
    /// Kernel output above which a feature counts as active
    #[serde(default = "default_active_threshold")]
    pub active_threshold: f64,
    /// Candidates are promoted when relevance exceeds this
    #[serde(default = "default_discover_threshold")]
    pub discover_threshold: f64,
    /// Divide the feature vector by its sum
    #[serde(default = "default_true")]
    pub normalization: bool,
    /// 0: none, 1: smooth consumption, 2: hard consumption of active
    /// features, 3: hard consumption of every covering feature
    #[serde(default = "default_kernel_sparsify")]
    pub sparsify: u8,
    /// Most active features per dimension before no base feature is added
    #[serde(default = "default_max_active_base_feat")]
    pub max_active_base_feat: usize,
    /// Kernel output of the closest feature above which no base feature is added
    #[serde(default = "default_max_base_feat_sim")]
    pub max_base_feat_sim: f64,
}

impl KernelizedConfig {
    /// Defaults for everything except the kernel widths
    pub fn with_widths(kernel_widths: Vec<f64>) -> Self {
        Self {
            kernel: KernelKind::default(),
            kernel_widths,
            active_threshold: default_active_threshold(),
            discover_threshold: default_discover_threshold(),
            normalization: true,
            sparsify: default_kernel_sparsify(),
            max_active_base_feat: default_max_active_base_feat(),
            max_base_feat_sim: default_max_base_feat_sim(),
        }
    }

    pub fn validate(&self) -> FddResult<()> {
        self.kernel.validate()?;
        if self.kernel_widths.is_empty() {
            return Err(FddError::config("kernel_widths must not be empty"));
        }
        if let Some(w) = self.kernel_widths.iter().find(|w| !(w.is_finite() && **w > 0.0)) {
            return Err(FddError::config(format!("kernel width {} must be positive", w)));
        }
        if self.active_threshold.is_nan() || self.discover_threshold.is_nan() {
            return Err(FddError::config("thresholds must not be NaN"));
        }
        if self.sparsify > 3 {
            return Err(FddError::config(format!(
                "sparsify level {} must be between 0 and 3",
                self.sparsify
            )));
        }
        if self.max_base_feat_sim.is_nan() {
            return Err(FddError::config("max_base_feat_sim is NaN"));
        }
        Ok(())
    }
}

/// Which representation to build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepresentationKind {
    Ifdd(IfddConfig),
    IfddK(IfddKConfig),
    Kernelized(KernelizedConfig),
}

/// A domain together with the representation to build over it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentationConfig {
    pub domain: DomainSpec,
    pub representation: RepresentationKind,
}

impl RepresentationConfig {
    pub fn load(path: &Path) -> FddResult<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let content = std::fs::read_to_string(path).map_err(map_io_err(path))?;

        let config: Self = match ext {
            "json" => serde_json::from_str(&content)?,
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            _ => {
                return Err(FddError::invalid_argument(format!(
                    "Unsupported config format: {}",
                    ext
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> FddResult<()> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let content = match ext {
            "json" => serde_json::to_string_pretty(self)?,
            "yaml" | "yml" => serde_yaml::to_string(self)?,
            "toml" => toml::to_string(self)?,
            _ => {
                return Err(FddError::invalid_argument(format!(
                    "Unsupported config format: {}",
                    ext
                )))
            }
        };

        std::fs::write(path, content).map_err(map_io_err(path))?;
        Ok(())
    }

    pub fn validate(&self) -> FddResult<()> {
        self.domain.validate()?;
        match &self.representation {
            RepresentationKind::Ifdd(c) => c.validate(),
            RepresentationKind::IfddK(c) => c.validate(),
            RepresentationKind::Kernelized(c) => {
                c.validate()?;
                if c.kernel_widths.len() != self.domain.state_space_dims() {
                    return Err(FddError::config(format!(
                        "{} kernel widths for {} state dimensions",
                        c.kernel_widths.len(),
                        self.domain.state_space_dims()
                    )));
                }
                Ok(())
            }
        }
    }

    /// Construct the configured representation
    pub fn build(&self) -> FddResult<Box<dyn Discoverable>> {
        self.validate()?;
        Ok(match &self.representation {
            RepresentationKind::Ifdd(c) => Box::new(Ifdd::new(&self.domain, c.clone())?),
            RepresentationKind::IfddK(c) => Box::new(IfddK::new(&self.domain, c.clone())?),
            RepresentationKind::Kernelized(c) => {
                Box::new(KernelizedIfdd::new(&self.domain, c.clone())?)
            }
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_discovery_threshold() -> f64 {
    1.0
}

fn default_max_batch_discovery() -> usize {
    1
}

fn default_discretization() -> usize {
    20
}

fn default_seed() -> u64 {
    1
}

fn default_kappa() -> f64 {
    1e-5
}

fn default_active_threshold() -> f64 {
    0.01
}

fn default_discover_threshold() -> f64 {
    0.01
}

fn default_kernel_sparsify() -> u8 {
    1
}

fn default_max_active_base_feat() -> usize {
    2
}

fn default_max_base_feat_sim() -> f64 {
    0.7
}
