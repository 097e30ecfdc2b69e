//! The Meridian query scheduler.
//!
//! Owns the small DAG of backend calls for one research question and drives
//! the resilience core around each call: affordability gates and timeout
//! bounds from `meridian-budget`, retry/skip/fail decisions from
//! `meridian-recovery`, and a durable checkpoint per transition from
//! `meridian-checkpoint`.
//!
//! Backend adapters plug in through the [`NodeExecutor`] trait; this crate
//! never speaks a wire protocol itself. Parallel branches produce
//! [`meridian_types::StateDelta`]s that the coordinator merges at a
//! single-writer barrier before every checkpoint write, and a shared
//! cancellation token stops in-flight siblings the moment any budget ceiling
//! is hit.

mod config;
mod error;
mod events;
mod executor;
mod scheduler;

pub use config::SchedulerConfig;
pub use error::{Error, Result};
pub use events::ProgressEmitter;
pub use executor::{NodeCall, NodeExecutor, NodeOutcome};
pub use scheduler::{QueryOutcome, QueryReport, QueryScheduler};
