use serde::{Deserialize, Serialize};
use serde_json::json;

use super::super::codes::{Decision, DecisionCode, SourceDecision};
use super::super::collaborators::UnderwritingError;
use super::super::domain::{ApplicantFacts, CustomerClassification, CustomerStatus, TopUpFacts};
use crate::config::PolicyConfig;

/// Minimum age of an active contract before an AO customer qualifies for the DSR fast-track.
pub const AO_FAST_TRACK_MIN_CONTRACT_MONTHS: u32 = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DsrInputs {
    pub own_installment: f64,
    pub spouse_installment: f64,
    pub other_lender_installments: f64,
    pub bureau_installments: f64,
    pub monthly_income: f64,
    pub spouse_income: f64,
    pub ntf: f64,
    pub top_up: Option<TopUpFacts>,
}

impl DsrInputs {
    pub fn from_facts(facts: &ApplicantFacts) -> Self {
        Self {
            own_installment: facts.loan.installment_amount,
            spouse_installment: 0.0,
            other_lender_installments: facts.other_lender_installments,
            bureau_installments: facts.bureau.installments,
            monthly_income: facts.monthly_income,
            spouse_income: facts
                .spouse_under_review()
                .map(|spouse| spouse.monthly_income)
                .unwrap_or(0.0),
            ntf: facts.loan.ntf,
            top_up: facts.top_up.clone(),
        }
    }

    fn total_installments(&self) -> f64 {
        self.own_installment
            + self.spouse_installment
            + self.other_lender_installments
            + self.bureau_installments
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DsrResult {
    pub dsr: f64,
    pub decision: Decision,
}

/// How a first-stage DSR evaluation was routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DsrTrack {
    New,
    SegmentFastTrack,
    TopUp,
    Standard,
}

impl DsrTrack {
    pub fn select(
        inputs: &DsrInputs,
        classification: Option<&CustomerClassification>,
        policy: &PolicyConfig,
    ) -> Self {
        let Some(classification) = classification else {
            return DsrTrack::New;
        };

        match classification.status() {
            CustomerStatus::New => DsrTrack::New,
            CustomerStatus::Ro | CustomerStatus::Ao => {
                if segment_fast_track(classification, policy) {
                    DsrTrack::SegmentFastTrack
                } else if inputs.top_up.is_some() {
                    DsrTrack::TopUp
                } else {
                    DsrTrack::Standard
                }
            }
        }
    }
}

fn segment_fast_track(classification: &CustomerClassification, policy: &PolicyConfig) -> bool {
    let record = classification.record();
    if !classification.segment().is_fast_track()
        || record.max_overdue_days > policy.fast_track_max_overdue_days
    {
        return false;
    }

    match classification.status() {
        CustomerStatus::Ao => record
            .contract_age_months
            .is_some_and(|months| months >= AO_FAST_TRACK_MIN_CONTRACT_MONTHS),
        CustomerStatus::Ro => record
            .months_since_contract_expiry
            .is_some_and(|months| months <= policy.prime_max_months_since_expiry),
        CustomerStatus::New => false,
    }
}

/// `installments * 100 / income`, rounded to two decimals.
pub fn compute_dsr(installments: f64, income: f64) -> Result<f64, UnderwritingError> {
    if income.is_nan() || income <= 0.0 {
        return Err(UnderwritingError::BadRequest(format!(
            "monthly income must be positive to compute DSR, found {income}"
        )));
    }
    Ok(round2(installments.max(0.0) * 100.0 / income))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn threshold_decision(dsr: f64, policy: &PolicyConfig, track: DsrTrack) -> Decision {
    let info = json!({ "dsr": dsr, "threshold": policy.dsr_threshold, "track": track });
    if dsr > policy.dsr_threshold {
        Decision::new(DecisionCode::DsrAboveThreshold, SourceDecision::Dsr)
            .with_reason(format!("DSR {dsr:.2} > threshold {:.2}", policy.dsr_threshold))
            .with_info(info)
    } else {
        Decision::new(DecisionCode::DsrPass, SourceDecision::Dsr).with_info(info)
    }
}

pub fn evaluate_dsr(
    inputs: &DsrInputs,
    classification: Option<&CustomerClassification>,
    policy: &PolicyConfig,
) -> Result<DsrResult, UnderwritingError> {
    let income = inputs.monthly_income + inputs.spouse_income;
    let track = DsrTrack::select(inputs, classification, policy);

    match track {
        DsrTrack::New | DsrTrack::Standard => {
            let dsr = compute_dsr(inputs.total_installments(), income)?;
            Ok(DsrResult {
                dsr,
                decision: threshold_decision(dsr, policy, track),
            })
        }
        DsrTrack::SegmentFastTrack => {
            let dsr = compute_dsr(inputs.total_installments(), income)?;
            let decision = Decision::new(DecisionCode::DsrSegmentFastTrack, SourceDecision::Dsr)
                .with_info(json!({ "dsr": dsr, "track": track }));
            Ok(DsrResult { dsr, decision })
        }
        DsrTrack::TopUp => evaluate_top_up(inputs, income, policy),
    }
}

fn evaluate_top_up(
    inputs: &DsrInputs,
    income: f64,
    policy: &PolicyConfig,
) -> Result<DsrResult, UnderwritingError> {
    let Some(top_up) = inputs.top_up.as_ref() else {
        return Err(UnderwritingError::BadRequest(
            "top-up evaluation requires top-up facts".to_string(),
        ));
    };

    let installments = inputs.total_installments() - top_up.existing_installment;
    let dsr = compute_dsr(installments, income)?;

    let disbursement = inputs.ntf - top_up.outstanding_principal;
    if disbursement.is_nan() || disbursement <= 0.0 {
        return Err(UnderwritingError::BadRequest(format!(
            "top-up disbursement must be positive, computed {disbursement:.2}"
        )));
    }

    let disbursement_pct = round2(disbursement * 100.0 / inputs.ntf);
    if disbursement_pct < policy.min_top_up_disbursement_pct {
        let decision = Decision::new(DecisionCode::TopUpDisbursementTooLow, SourceDecision::Dsr)
            .with_reason(format!(
                "top-up disbursement {disbursement_pct:.2}% below minimum {:.2}%",
                policy.min_top_up_disbursement_pct
            ))
            .with_info(json!({
                "dsr": dsr,
                "disbursement": disbursement,
                "disbursement_pct": disbursement_pct,
            }));
        return Ok(DsrResult { dsr, decision });
    }

    Ok(DsrResult {
        dsr,
        decision: threshold_decision(dsr, policy, DsrTrack::TopUp),
    })
}

/// Second stage: first-stage DSR plus the bureau debt ratio, against the same threshold.
pub fn evaluate_total_dsr(
    first_stage_dsr: f64,
    bureau_debt_ratio: f64,
    classification: Option<&CustomerClassification>,
    policy: &PolicyConfig,
) -> DsrResult {
    let total = round2(first_stage_dsr + bureau_debt_ratio.max(0.0));
    let info = json!({
        "dsr": first_stage_dsr,
        "bureau_debt_ratio": bureau_debt_ratio,
        "total_dsr": total,
        "threshold": policy.dsr_threshold,
    });

    if let Some(classification) = classification {
        if total_dsr_fast_track(classification, policy) {
            return DsrResult {
                dsr: total,
                decision: Decision::new(
                    DecisionCode::TotalDsrSegmentFastTrack,
                    SourceDecision::TotalDsr,
                )
                .with_info(info),
            };
        }
    }

    let decision = if total > policy.dsr_threshold {
        Decision::new(DecisionCode::TotalDsrAboveThreshold, SourceDecision::TotalDsr)
            .with_reason(format!(
                "total DSR {total:.2} > threshold {:.2}",
                policy.dsr_threshold
            ))
            .with_info(info)
    } else {
        Decision::new(DecisionCode::TotalDsrPass, SourceDecision::TotalDsr).with_info(info)
    };

    DsrResult {
        dsr: total,
        decision,
    }
}

fn total_dsr_fast_track(classification: &CustomerClassification, policy: &PolicyConfig) -> bool {
    if !classification.segment().is_fast_track() {
        return false;
    }

    match classification.status() {
        CustomerStatus::Ao => true,
        CustomerStatus::Ro => classification
            .record()
            .months_since_contract_expiry
            .is_some_and(|months| months <= policy.prime_max_months_since_expiry),
        CustomerStatus::New => false,
    }
}
