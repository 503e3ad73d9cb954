// Public modules
pub mod config;
pub mod engine;
pub mod error;
pub mod parsing;
pub mod sources;
pub mod types;

// Re-export commonly used items
pub use config::{load_config, load_config_with_env, EnvironmentProvider, MockEnvironment, SystemEnvironment};
pub use engine::OptimizationEngine;
pub use error::{OptimizeError, SourceError, SourceOrigin};
pub use parsing::{parse_cpu_to_millicores, parse_memory_to_bytes, utilization_pct};
pub use sources::{KubeMetricsSource, KubeObjectSource, MetricsSource, ObjectSource};
pub use types::*;
