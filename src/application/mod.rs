//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Tier catalog (category to tier lookup)
//! - Admission controller (decision making and failover)
//! - Local fallback state and violation tracking
//! - Reaper (periodic memory bounding)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod catalog;
pub mod controller;
pub(crate) mod failover;
pub mod health;
pub mod local;
pub mod metrics;
pub mod ports;
pub mod reaper;
pub mod violations;
