//! Application layer containing the lifecycle orchestration.
//!
//! [`engine::TransitionEngine`] owns every status change. The escrow triggers,
//! the retry engine and the settlement sweep only decide which transition to
//! request; [`lifecycle::LifecycleService`] wires them together and exposes the
//! operator actions. [`runtime::LifecycleRuntime`] schedules the periodic jobs
//! on `tokio`.

pub mod engine;
pub mod escrow;
pub mod lifecycle;
pub mod retry;
pub mod runtime;
pub mod settlement;
