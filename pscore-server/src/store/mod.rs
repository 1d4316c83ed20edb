//! Score Store
//!
//! Queries over the score tables, stage weights, appeals and the adjustment
//! history. Write access is split by concern: only the Adjustment Service
//! calls [`scores::write_adjustment`] and [`history::append`]; only the
//! Reconciliation Engine calls the `upsert_*` and `delete_orphan` functions.
//! [`task_scores::ensure`] is shared: reconciliation creates default rows and
//! the Adjustment Service creates one for an assignee not yet reconciled.

pub mod appeals;
pub mod final_scores;
pub mod history;
pub mod scores;
pub mod stage_scores;
pub mod task_scores;
pub mod weights;

/// Result of an idempotent derived-value upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}
