// src/models/mod.rs

//! Domain models for the injury report service.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod injury;
mod report;

// Re-export all public types
pub use config::{
    ColumnLayout, Config, FetcherConfig, GuardConfig, LoggingConfig, RetentionConfig,
    ScheduleConfig, ServerConfig, Span,
};
pub use injury::{InjuryKey, InjuryNotification, InjuryRecord, InjuryStatus, NotificationKind};
pub use report::{Column, LogicalRow, PAGE_OFFSET, PositionedFragment};
