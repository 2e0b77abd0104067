//! Built-in pipeline stages.
//!
//! 1. [`context_init`] - create the request context, log ingress
//! 2. [`error_trap`] - turn failures into responses (failures only)
//! 3. [`metrics_recorder`] - record duration and count

pub mod context_init;
pub mod error_trap;
pub mod metrics_recorder;

pub use context_init::ContextInitializer;
pub use error_trap::{ErrorTrap, TrapDisposition, GENERIC_ERROR_MESSAGE};
pub use metrics_recorder::{MetricObservation, MetricsRecorder};
