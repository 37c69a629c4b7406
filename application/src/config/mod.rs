//! Application-level configuration.
//!
//! - [`RuntimeConfig`]: consensus, temperature, condensation, lessons,
//!   context limits and runtime timings

pub mod runtime_config;

pub use runtime_config::{
    CondensationParams, ConsensusParams, ContextLimits, LessonParams, RuntimeConfig,
};
