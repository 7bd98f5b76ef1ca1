//! Polling pipeline for the injury report.
//!
//! - `InjuryService`: fetch, parse, guard, diff, store update and broadcast
//! - `schedule::run`: drives cycles at wall-clock aligned triggers

pub mod circuit_breaker;
pub mod diff;
pub mod hub;
pub mod schedule;
pub mod service;
pub mod store;

pub use circuit_breaker::{GuardResult, RunGuard};
pub use diff::diff;
pub use hub::{NotificationHub, Subscription};
pub use schedule::next_trigger;
pub use service::{CycleOutcome, CycleStage, InjuryService};
pub use store::InjuryStore;
