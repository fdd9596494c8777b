pub mod applier;
pub mod planner;
pub mod report;

pub use applier::{ApplyOutcome, ApplyProgress, Applier, UninstallOutcome};
pub use planner::{CopyOp, Plan, ReconciliationPlanner};
pub use report::{CheckReport, InstallContext, InstallReport, ListedProfile, SkippedEntry, UninstallReport};
