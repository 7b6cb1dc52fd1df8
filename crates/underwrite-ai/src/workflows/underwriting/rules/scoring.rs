use serde::{Deserialize, Serialize};
use serde_json::json;

use super::super::codes::{Decision, DecisionCode, SourceDecision};
use super::super::collaborators::{
    ScoreBand, ScoringRequest, ScoringResult, ScoringService, UnderwritingError,
};
use super::super::domain::{
    ApplicantFacts, CustomerClassification, CustomerSegment, CustomerStatus, PefindoResult,
};
use crate::config::PolicyConfig;

/// Which branch of the classifier produced the decision, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringBranch {
    FastTrackBySegment,
    FastTrackByOwnership,
    BureauHit,
    NoHit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringOutcome {
    pub branch: ScoringBranch,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring: Option<ScoringResult>,
}

/// PRIME/PRIORITY customers with an active installment and overdue days within policy.
pub fn fast_track_by_segment(
    classification: Option<&CustomerClassification>,
    policy: &PolicyConfig,
) -> Option<Decision> {
    let classification = classification?;
    let record = classification.record();

    let eligible = classification.segment().is_fast_track()
        && record.installment_amount > 0.0
        && record.max_overdue_days <= policy.fast_track_max_overdue_days;

    eligible.then(|| {
        Decision::new(DecisionCode::ScoreSegmentFastTrack, SourceDecision::Scoring).with_info(
            json!({
                "segment": classification.segment(),
                "max_overdue_days": record.max_overdue_days,
            }),
        )
    })
}

/// BPKB held in a configured same-name relationship and a clean bureau result.
pub fn fast_track_by_ownership(
    bpkb_owner_code: &str,
    pefindo_result: PefindoResult,
    policy: &PolicyConfig,
) -> Option<Decision> {
    let eligible =
        pefindo_result == PefindoResult::Pass && policy.is_same_name_bpkb(bpkb_owner_code);

    eligible.then(|| {
        Decision::new(DecisionCode::ScoreOwnershipFastTrack, SourceDecision::Scoring)
            .with_info(json!({ "bpkb_owner_code": bpkb_owner_code.trim() }))
    })
}

/// Either party is known to the bureau.
pub fn bureau_hit_branch(
    pefindo_result: PefindoResult,
    scoring: &ScoringResult,
    policy: &PolicyConfig,
) -> Decision {
    if pefindo_result == PefindoResult::Reject {
        return below_threshold(scoring).with_reason("bureau result REJECT");
    }

    match scoring.score_result {
        ScoreBand::High | ScoreBand::Medium => scored_pass(scoring),
        ScoreBand::Low => ass_override(scoring, policy).unwrap_or_else(|| below_threshold(scoring)),
    }
}

/// Neither party is known to the bureau.
pub fn no_hit_branch(scoring: &ScoringResult, policy: &PolicyConfig) -> Decision {
    match scoring.score_result {
        ScoreBand::High => scored_pass(scoring),
        ScoreBand::Medium | ScoreBand::Low => {
            ass_override(scoring, policy).unwrap_or_else(|| below_threshold(scoring))
        }
    }
}

fn ass_override(scoring: &ScoringResult, policy: &PolicyConfig) -> Option<Decision> {
    policy
        .ass_override(&scoring.segment, scoring.score)
        .map(|band| {
            Decision::new(DecisionCode::ScoreAssOverride, SourceDecision::Scoring).with_info(
                json!({
                    "score": scoring.score,
                    "segment": scoring.segment,
                    "band_min": band.min_score,
                    "band_max": band.max_score,
                }),
            )
        })
}

fn scored_pass(scoring: &ScoringResult) -> Decision {
    Decision::new(DecisionCode::ScorePass, SourceDecision::Scoring).with_info(scoring_info(scoring))
}

fn below_threshold(scoring: &ScoringResult) -> Decision {
    Decision::new(DecisionCode::ScoreBelowThreshold, SourceDecision::Scoring)
        .with_info(scoring_info(scoring))
}

fn scoring_info(scoring: &ScoringResult) -> serde_json::Value {
    json!({
        "score_result": scoring.score_result,
        "score": scoring.score,
        "segment": scoring.segment,
        "status": scoring.status,
        "is_tsi": scoring.is_tsi,
    })
}

/// Runs the branches in precedence order; the scoring service is only called when
/// neither fast-track applies.
pub async fn evaluate_scoring(
    facts: &ApplicantFacts,
    classification: Option<&CustomerClassification>,
    policy: &PolicyConfig,
    service: &dyn ScoringService,
) -> Result<ScoringOutcome, UnderwritingError> {
    if let Some(decision) = fast_track_by_segment(classification, policy) {
        return Ok(ScoringOutcome {
            branch: ScoringBranch::FastTrackBySegment,
            decision,
            scoring: None,
        });
    }

    if let Some(decision) = fast_track_by_ownership(
        &facts.vehicle.bpkb_owner_code,
        facts.bureau.pefindo_result,
        policy,
    ) {
        return Ok(ScoringOutcome {
            branch: ScoringBranch::FastTrackByOwnership,
            decision,
            scoring: None,
        });
    }

    let cb_found = facts.cb_found();
    let request = ScoringRequest {
        prospect_id: facts.prospect_id.clone(),
        id_number: facts.identity.id_number.clone(),
        monthly_income: facts.monthly_income,
        zip_code: facts.zip_code.clone(),
        profession: facts.employment.profession.clone(),
        pefindo_result: facts.bureau.pefindo_result,
        cb_found,
        customer_status: classification
            .map(CustomerClassification::status)
            .unwrap_or(CustomerStatus::New),
        customer_segment: classification
            .map(CustomerClassification::segment)
            .unwrap_or(CustomerSegment::Regular),
    };
    let scoring = service.score(&request).await?;

    let (branch, decision) = if cb_found {
        (
            ScoringBranch::BureauHit,
            bureau_hit_branch(facts.bureau.pefindo_result, &scoring, policy),
        )
    } else {
        (ScoringBranch::NoHit, no_hit_branch(&scoring, policy))
    };

    Ok(ScoringOutcome {
        branch,
        decision,
        scoring: Some(scoring),
    })
}
