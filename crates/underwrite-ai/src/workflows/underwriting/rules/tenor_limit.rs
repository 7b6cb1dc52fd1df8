use serde_json::json;

use super::super::codes::{Decision, DecisionCode, SourceDecision};
use super::super::collaborators::{TenorExclusionList, UnderwritingError};

/// Longest tenor any cluster may book, and only clusters on the exclusion list at that.
pub const TENOR_LIMIT: u32 = 36;

pub async fn evaluate_tenor_limit(
    tenor: u32,
    cluster: &str,
    exclusions: &dyn TenorExclusionList,
) -> Result<Decision, UnderwritingError> {
    if tenor < TENOR_LIMIT {
        return Ok(Decision::new(
            DecisionCode::TenorLimitNotApplicable,
            SourceDecision::TenorLimit,
        ));
    }

    if tenor > TENOR_LIMIT {
        return Ok(
            Decision::new(DecisionCode::TenorExceedsPolicy, SourceDecision::TenorLimit)
                .with_reason(format!("tenor {tenor} exceeds policy limit {TENOR_LIMIT}"))
                .with_info(json!({ "tenor": tenor, "cluster": cluster })),
        );
    }

    let excluded = exclusions.is_cluster_excluded(cluster).await?;
    let code = if excluded {
        DecisionCode::TenorClusterAllowed
    } else {
        DecisionCode::TenorClusterNotAllowed
    };

    Ok(Decision::new(code, SourceDecision::TenorLimit)
        .with_info(json!({ "tenor": tenor, "cluster": cluster, "cluster_in_list": excluded })))
}
