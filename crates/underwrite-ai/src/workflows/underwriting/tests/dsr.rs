use super::common::*;

use crate::config::PolicyConfig;
use crate::workflows::underwriting::codes::{DecisionCode, DecisionResult, SourceDecision};
use crate::workflows::underwriting::collaborators::UnderwritingError;
use crate::workflows::underwriting::domain::{
    CustomerClassification, CustomerRecord, CustomerSegment, TopUpFacts,
};
use crate::workflows::underwriting::rules::{
    compute_dsr, evaluate_dsr, evaluate_total_dsr, DsrInputs, DsrTrack,
};

fn new_customer_inputs(installment: f64) -> DsrInputs {
    DsrInputs {
        own_installment: installment,
        spouse_installment: 0.0,
        other_lender_installments: 0.0,
        bureau_installments: 0.0,
        monthly_income: 5_000_000.0,
        spouse_income: 0.0,
        ntf: 100_000_000.0,
        top_up: None,
    }
}

fn prime_active() -> CustomerClassification {
    CustomerClassification::from_record(CustomerRecord {
        segment: CustomerSegment::Prime,
        max_overdue_days: 3,
        ..active_record(1_000_000.0)
    })
}

#[test]
fn new_customer_at_twenty_percent_passes() {
    let result = evaluate_dsr(&new_customer_inputs(1_000_000.0), None, &PolicyConfig::default())
        .expect("dsr computes");

    assert_eq!(result.dsr, 20.0);
    assert_eq!(result.decision.result(), DecisionResult::Pass);
    assert_eq!(result.decision.code(), DecisionCode::DsrPass);
    assert_eq!(result.decision.source(), SourceDecision::Dsr);
}

#[test]
fn new_customer_at_forty_percent_rejects() {
    let result = evaluate_dsr(&new_customer_inputs(2_000_000.0), None, &PolicyConfig::default())
        .expect("dsr computes");

    assert_eq!(result.dsr, 40.0);
    assert_eq!(result.decision.result(), DecisionResult::Reject);
    assert_eq!(result.decision.code(), DecisionCode::DsrAboveThreshold);
    assert!(result.decision.reason().contains("> threshold"));
}

#[test]
fn zero_income_is_a_bad_request() {
    assert!(matches!(
        compute_dsr(1_000_000.0, 0.0),
        Err(UnderwritingError::BadRequest(_))
    ));
}

#[test]
fn spouse_income_and_installments_join_the_ratio() {
    let mut inputs = new_customer_inputs(1_000_000.0);
    inputs.spouse_installment = 500_000.0;
    inputs.other_lender_installments = 500_000.0;
    inputs.spouse_income = 5_000_000.0;

    let result = evaluate_dsr(&inputs, None, &PolicyConfig::default()).expect("dsr computes");
    assert_eq!(result.dsr, 20.0);
}

#[test]
fn prime_active_customer_is_fast_tracked_regardless_of_ratio() {
    let classification = prime_active();
    let inputs = new_customer_inputs(4_000_000.0);
    let policy = PolicyConfig::default();

    assert_eq!(
        DsrTrack::select(&inputs, Some(&classification), &policy),
        DsrTrack::SegmentFastTrack
    );
    let result = evaluate_dsr(&inputs, Some(&classification), &policy).expect("dsr computes");
    assert_eq!(result.decision.code(), DecisionCode::DsrSegmentFastTrack);
    assert_eq!(result.dsr, 80.0);
}

#[test]
fn young_prime_contract_falls_back_to_threshold() {
    let classification = CustomerClassification::from_record(CustomerRecord {
        segment: CustomerSegment::Prime,
        contract_age_months: Some(2),
        ..active_record(1_000_000.0)
    });
    let inputs = new_customer_inputs(4_000_000.0);

    let result = evaluate_dsr(&inputs, Some(&classification), &PolicyConfig::default())
        .expect("dsr computes");
    assert_eq!(result.decision.code(), DecisionCode::DsrAboveThreshold);
}

#[test]
fn top_up_subtracts_existing_installment() {
    let classification = CustomerClassification::from_record(active_record(1_000_000.0));
    let mut inputs = new_customer_inputs(2_500_000.0);
    inputs.top_up = Some(TopUpFacts {
        existing_installment: 1_000_000.0,
        outstanding_principal: 60_000_000.0,
    });

    let policy = PolicyConfig::default();
    assert_eq!(
        DsrTrack::select(&inputs, Some(&classification), &policy),
        DsrTrack::TopUp
    );
    let result = evaluate_dsr(&inputs, Some(&classification), &policy).expect("dsr computes");
    assert_eq!(result.dsr, 30.0);
    assert_eq!(result.decision.code(), DecisionCode::DsrPass);
}

#[test]
fn top_up_with_small_disbursement_rejects() {
    let classification = CustomerClassification::from_record(active_record(1_000_000.0));
    let mut inputs = new_customer_inputs(1_500_000.0);
    inputs.top_up = Some(TopUpFacts {
        existing_installment: 1_000_000.0,
        outstanding_principal: 95_000_000.0,
    });

    let result = evaluate_dsr(&inputs, Some(&classification), &PolicyConfig::default())
        .expect("dsr computes");
    assert_eq!(result.decision.code(), DecisionCode::TopUpDisbursementTooLow);
}

#[test]
fn top_up_without_disbursement_is_a_bad_request() {
    let classification = CustomerClassification::from_record(active_record(1_000_000.0));
    let mut inputs = new_customer_inputs(1_500_000.0);
    inputs.top_up = Some(TopUpFacts {
        existing_installment: 1_000_000.0,
        outstanding_principal: 100_000_000.0,
    });

    assert!(matches!(
        evaluate_dsr(&inputs, Some(&classification), &PolicyConfig::default()),
        Err(UnderwritingError::BadRequest(_))
    ));
}

#[test]
fn total_dsr_adds_bureau_ratio() {
    let policy = PolicyConfig::default();

    let pass = evaluate_total_dsr(20.0, 10.0, None, &policy);
    assert_eq!(pass.dsr, 30.0);
    assert_eq!(pass.decision.code(), DecisionCode::TotalDsrPass);

    let reject = evaluate_total_dsr(20.0, 20.0, None, &policy);
    assert_eq!(reject.decision.code(), DecisionCode::TotalDsrAboveThreshold);
    assert_eq!(reject.decision.source(), SourceDecision::TotalDsr);
}

#[test]
fn total_dsr_fast_tracks_prime_active_and_recent_repeat_orders() {
    let policy = PolicyConfig::default();
    let active = prime_active();
    assert_eq!(
        evaluate_total_dsr(30.0, 30.0, Some(&active), &policy).decision.code(),
        DecisionCode::TotalDsrSegmentFastTrack
    );

    let repeat = |months| {
        CustomerClassification::from_record(CustomerRecord {
            segment: CustomerSegment::Priority,
            restructure_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 10),
            months_since_contract_expiry: Some(months),
            ..CustomerRecord::default()
        })
    };
    assert_eq!(
        evaluate_total_dsr(30.0, 30.0, Some(&repeat(4)), &policy).decision.code(),
        DecisionCode::TotalDsrSegmentFastTrack
    );
    assert_eq!(
        evaluate_total_dsr(30.0, 30.0, Some(&repeat(9)), &policy).decision.code(),
        DecisionCode::TotalDsrAboveThreshold
    );
}
