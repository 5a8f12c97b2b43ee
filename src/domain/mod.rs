//! Domain layer - pure admission-control logic with no I/O.
//!
//! This layer contains the core concepts and invariants:
//! - Categories and tier configuration
//! - Admission decisions
//! - The token bucket used in degraded mode
//! - Exponential backoff and violation records
//!
//! All types in this layer are pure and easily testable.

pub mod actor;
pub mod backoff;
pub mod bucket;
pub mod decision;
pub mod tier;
pub mod timing;
