// ifdd - adaptive feature discovery for linear reinforcement learning
// Binary iFDD, iFDD(kappa) and kernelized iFDD representations with a
// reference SARSA(lambda) driver

pub mod config;
pub mod domain;
pub mod error;
pub mod ifdd;
pub mod kernelized;
pub mod learner;
pub mod representation;

pub use config::{IfddConfig, IfddKConfig, KernelizedConfig, RepresentationConfig, RepresentationKind};
pub use domain::{DimLimits, DomainSpec};
pub use error::{FddError, FddResult};
pub use ifdd::{Ifdd, IfddK, RelevanceMode};
pub use kernelized::{KernelKind, KernelizedIfdd};
pub use learner::{EGreedy, Policy, SarsaLambda};
pub use representation::{Discoverable, FeatureVector, Representation, WeightVector};

use anyhow::Result;
use tracing::info;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Install the default colored logger
pub fn init() -> Result<()> {
    init_with_logger(true)
}

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Without ANSI colors the output goes to stderr in a compact format, so
/// that stdout stays free for results.
pub fn init_with_logger(ansi_colors: bool) -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    if !ansi_colors {
        fmt::Subscriber::builder()
            .with_ansi(false)
            .with_writer(std::io::stderr)
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .without_time()
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install logger: {}", e))?;
    } else {
        fmt::Subscriber::builder()
            .with_ansi(true)
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install logger: {}", e))?;
    }

    info!("ifdd v{}", version());
    Ok(())
}
