//! # Communications interface crate.
//!
//! Provides the serialisable interface types which the mapping core publishes to the rest of the
//! vehicle software (telemetry, map export).

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Telemetry definitions for equipment (like the mapping core)
pub mod eqpt;
