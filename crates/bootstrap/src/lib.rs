//! Phased concurrent startup of long-initializing components.
//!
//! Components are grouped by phase and phases run in ascending order. All
//! components of a phase start concurrently; the next phase begins only once
//! every one of them has finished, and any failure aborts the bootstrap.

pub mod coordinator;
pub mod error;

pub use coordinator::{AsyncStart, Bootstrap, BootstrapReport, ComponentReport, PhaseReport};
pub use error::BootstrapError;
