//! Single-purpose underwriting rules. Each one turns facts into a `Decision` and never
//! swallows a collaborator failure.

mod blacklist;
mod dsr;
mod rejection;
mod scoring;
mod tenor_limit;
mod vehicle_age;

pub use blacklist::{evaluate_blacklist, BlacklistOutcome, MAX_OVERDUE_DAYS};
pub use dsr::{
    compute_dsr, evaluate_dsr, evaluate_total_dsr, DsrInputs, DsrResult, DsrTrack,
    AO_FAST_TRACK_MIN_CONTRACT_MONTHS,
};
pub use rejection::evaluate_rejection_history;
pub use scoring::{
    bureau_hit_branch, evaluate_scoring, fast_track_by_ownership, fast_track_by_segment,
    no_hit_branch, ScoringBranch, ScoringOutcome,
};
pub use tenor_limit::{evaluate_tenor_limit, TENOR_LIMIT};
pub use vehicle_age::{evaluate_vehicle_age, vehicle_age_at_maturity, VehicleAgeInput};
