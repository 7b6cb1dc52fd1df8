use serde_json::json;

use super::super::codes::{Decision, DecisionCode, SourceDecision};
use super::super::collaborators::RejectionHistory;
use crate::config::PolicyConfig;

pub fn evaluate_rejection_history(history: &RejectionHistory, policy: &PolicyConfig) -> Decision {
    let info = json!({
        "reject_count_nik": history.reject_count_nik,
        "reject_count_pmk_dsr": history.reject_count_pmk_dsr,
        "max_reject_nik": policy.max_reject_nik,
        "max_reject_pmk_dsr": policy.max_reject_pmk_dsr,
    });

    let code = if history.reject_count_nik >= policy.max_reject_nik {
        DecisionCode::RejectionHistoryNik
    } else if history.reject_count_pmk_dsr >= policy.max_reject_pmk_dsr {
        DecisionCode::RejectionHistoryDsr
    } else {
        DecisionCode::RejectionHistoryClear
    };

    Decision::new(code, SourceDecision::RejectionHistory).with_info(info)
}
