//! Score engine services
//!
//! - [`reconcile`]: idempotent re-derivation of task, stage and final tiers
//! - [`adjustment`]: justified, audited manual deltas on a single row
//! - [`group_scoring`]: uniform or per-member adjustments across a task's assignees
//! - [`appeals`]: member appeals and reviewer resolution
//! - [`weights`]: leader-managed stage weights

pub mod adjustment;
pub mod appeals;
pub mod group_scoring;
pub mod reconcile;
pub mod weights;

pub use adjustment::{AdjustmentOutcome, AdjustmentRequest, AdjustmentService, AdjustmentTarget};
pub use appeals::{AppealDetails, AppealService, AttachmentView};
pub use group_scoring::{GroupAdjustmentReport, MemberAdjustment, MemberOutcome};
pub use reconcile::{ReconcileFailure, ReconcileReport, ReconcileStep, Reconciler};
pub use weights::{WeightChange, WeightService};
