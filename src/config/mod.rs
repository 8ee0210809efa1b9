// Serializable configuration of domains and representations

#[allow(clippy::module_inception)]
pub mod config;

pub use config::{IfddConfig, IfddKConfig, KernelizedConfig, RepresentationConfig, RepresentationKind};
