//! Run guard for parsed reports.
//!
//! Keeps a bad parse from wiping the store. A report that yields no records
//! is never applied, and an optional threshold rejects reports whose record
//! count collapses compared to what is stored.

use crate::models::{GuardConfig, InjuryRecord};

/// Guard that decides whether a parsed batch may replace the store.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    config: GuardConfig,
}

/// Result of a guard check.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardResult {
    /// Safe to apply the batch
    Safe {
        current_count: usize,
        previous_count: usize,
    },
    /// Store is empty or below baseline, nothing to compare against
    ColdStart { current_count: usize },
    /// Record count dropped past the threshold
    Triggered {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
    },
    /// Parse produced no records
    EmptyResult,
}

impl GuardResult {
    /// Whether the batch may be applied.
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe { .. } | Self::ColdStart { .. })
    }
}

impl RunGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    /// Check a parsed batch against the number of stored records.
    pub fn check(&self, current: &[InjuryRecord], previous_count: usize) -> GuardResult {
        let current_count = current.len();

        if current_count == 0 {
            return GuardResult::EmptyResult;
        }

        let Some(max_drop_percent) = self.config.max_drop_percent else {
            return GuardResult::Safe {
                current_count,
                previous_count,
            };
        };

        if previous_count < self.config.min_baseline {
            return GuardResult::ColdStart { current_count };
        }

        if current_count < previous_count {
            let drop = previous_count - current_count;
            let drop_percent = (drop as f64 / previous_count as f64) * 100.0;

            if drop_percent > f64::from(max_drop_percent) {
                return GuardResult::Triggered {
                    current_count,
                    previous_count,
                    drop_percent,
                };
            }
        }

        GuardResult::Safe {
            current_count,
            previous_count,
        }
    }

    /// Check and log the verdict.
    pub fn evaluate(&self, current: &[InjuryRecord], previous_count: usize) -> GuardResult {
        let result = self.check(current, previous_count);
        match &result {
            GuardResult::Safe {
                current_count,
                previous_count,
            } => {
                log::debug!(
                    "Run guard: SAFE ({} records, was {})",
                    current_count,
                    previous_count
                );
            }
            GuardResult::ColdStart { current_count } => {
                log::info!(
                    "Run guard: COLD START ({} records, store below baseline)",
                    current_count
                );
            }
            GuardResult::Triggered {
                current_count,
                previous_count,
                drop_percent,
            } => {
                log::error!(
                    "Run guard: TRIGGERED! {} → {} records ({:.1}% drop > {}% threshold)",
                    previous_count,
                    current_count,
                    drop_percent,
                    self.config.max_drop_percent.unwrap_or_default()
                );
            }
            GuardResult::EmptyResult => {
                log::error!("Run guard: EMPTY RESULT - keeping current store");
            }
        }
        result
    }
}
