//! Error types for plife.
//!
//! The simulation contains numerical instability instead of reporting it, so
//! the only failures surfaced to callers are configuration problems: a
//! scenario that cannot be loaded, or parameters that leave nothing to
//! simulate.

use std::fmt;

/// Errors that can occur while loading or saving a scenario file.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read or write the file.
    Io(std::io::Error),
    /// The file contents are not a valid scenario.
    Json(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to access scenario file: {}", e),
            ConfigError::Json(e) => write!(f, "Invalid scenario JSON: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Json(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Json(e)
    }
}

/// Errors that can occur when initializing or editing a simulation.
#[derive(Debug)]
pub enum SimulationError {
    /// No particle types were provided, so the interaction matrix would be empty.
    NoParticleTypes,
    /// The particle store would have no slots.
    ZeroCapacity,
    /// A global parameter is outside its valid range.
    InvalidParameter {
        /// Parameter name as it appears in [`SimParams`](crate::SimParams).
        name: &'static str,
        /// The rejected value.
        value: f32,
    },
    /// A type index does not exist in the current type table.
    TypeOutOfRange {
        /// The offending index.
        index: usize,
        /// Number of configured types.
        type_count: usize,
    },
    /// The operation needs an initialized simulation.
    NotInitialized,
    /// Loading the scenario failed.
    Config(ConfigError),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::NoParticleTypes => write!(f, "No particle types provided. Use .with_particle_type() to add one."),
            SimulationError::ZeroCapacity => write!(f, "Particle capacity is zero"),
            SimulationError::InvalidParameter { name, value } => {
                write!(f, "Invalid value {} for parameter '{}'", value, name)
            }
            SimulationError::TypeOutOfRange { index, type_count } => write!(
                f,
                "Particle type {} out of range ({} types configured)",
                index, type_count
            ),
            SimulationError::NotInitialized => write!(f, "Simulation is not initialized. Call .initialize() first."),
            SimulationError::Config(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for SimulationError {
    fn from(e: ConfigError) -> Self {
        SimulationError::Config(e)
    }
}
