//! Fan-out of the LTV and pricing checks across every tenor the pricing program offers.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::collaborators::{
    Collaborators, LoanAmountQuery, TenorCandidate, UnderwritingError,
};
use super::domain::{ApplicantFacts, CustomerClassification, CustomerStatus};
use super::ltv::{rule_key_for, AgeVehicleBand, LtvEngine, LtvQuery, LtvRule};
use super::rules::{evaluate_tenor_limit, vehicle_age_at_maturity, TENOR_LIMIT};
use crate::config::PolicyConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenorRequest {
    pub applicant: ApplicantFacts,
    /// Looked up through the customer collaborator when absent.
    #[serde(default)]
    pub customer_status: Option<CustomerStatus>,
    /// Amount each offer must be able to finance. Defaults to the requested AF.
    #[serde(default)]
    pub requested_amount: Option<f64>,
}

impl TenorRequest {
    pub fn new(applicant: ApplicantFacts) -> Self {
        Self {
            applicant,
            customer_status: None,
            requested_amount: None,
        }
    }

    pub fn requested_amount(&self) -> f64 {
        self.requested_amount.unwrap_or(self.applicant.loan.af)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenorOffer {
    pub tenor: u32,
    pub ltv: u32,
    pub otr: f64,
    pub loan_amount_max: f64,
    pub installment_amount: f64,
    pub af: f64,
    pub ntf: f64,
    pub admin_fee: f64,
    pub dp_amount: f64,
    pub is_psa: bool,
    pub dealer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FanOutMode {
    Offers,
    MaxLoan,
}

/// Read-only inputs shared by every tenor task.
struct TenorContext {
    facts: ApplicantFacts,
    customer_status: CustomerStatus,
    requested_amount: f64,
    age_today: u32,
    max_vehicle_age: u32,
    rules: Arc<[LtvRule]>,
    ltv: LtvEngine,
    collaborators: Collaborators,
    mode: FanOutMode,
}

/// Eligible offers sorted by ascending tenor.
///
/// Every tenor task runs to completion. If any of them fails the offers are discarded and the
/// error of the lowest failing tenor is returned.
pub async fn evaluate_tenor_offers(
    request: &TenorRequest,
    collaborators: &Collaborators,
    policy: &PolicyConfig,
    today: NaiveDate,
) -> Result<Vec<TenorOffer>, UnderwritingError> {
    let offers = fan_out(request, collaborators, policy, today, FanOutMode::Offers).await?;
    info!(
        prospect_id = %request.applicant.prospect_id.0,
        offers = offers.len(),
        "tenor offers evaluated"
    );
    Ok(offers)
}

/// Largest loan amount across eligible tenors, `None` when no tenor qualifies.
pub async fn max_loan_amount(
    request: &TenorRequest,
    collaborators: &Collaborators,
    policy: &PolicyConfig,
    today: NaiveDate,
) -> Result<Option<f64>, UnderwritingError> {
    let offers = fan_out(request, collaborators, policy, today, FanOutMode::MaxLoan).await?;
    Ok(offers
        .iter()
        .map(|offer| offer.loan_amount_max)
        .fold(None, |max: Option<f64>, amount| {
            Some(max.map_or(amount, |current| current.max(amount)))
        }))
}

async fn resolve_status(
    request: &TenorRequest,
    collaborators: &Collaborators,
) -> Result<CustomerStatus, UnderwritingError> {
    if let Some(status) = request.customer_status {
        return Ok(status);
    }
    let record = collaborators
        .customers
        .lookup_customer(&request.applicant.identity)
        .await?;
    Ok(record
        .map(|record| CustomerClassification::from_record(record).status())
        .unwrap_or(CustomerStatus::New))
}

async fn fan_out(
    request: &TenorRequest,
    collaborators: &Collaborators,
    policy: &PolicyConfig,
    today: NaiveDate,
    mode: FanOutMode,
) -> Result<Vec<TenorOffer>, UnderwritingError> {
    let facts = &request.applicant;
    let age_today = vehicle_age_at_maturity(&facts.vehicle.manufacture_year, 0, today.year())?;
    let customer_status = resolve_status(request, collaborators).await?;

    let candidates = collaborators
        .pricing
        .lookup_pricing_program(&facts.branch.branch_id, facts.loan.otr)
        .await?;
    let rules: Arc<[LtvRule]> = collaborators
        .ltv_rules
        .lookup_ltv_rules(&rule_key_for(facts))
        .await?
        .into();

    debug!(
        prospect_id = %facts.prospect_id.0,
        candidates = candidates.len(),
        rules = rules.len(),
        "fanning out tenor evaluation"
    );

    let context = Arc::new(TenorContext {
        facts: facts.clone(),
        customer_status,
        requested_amount: request.requested_amount(),
        age_today,
        max_vehicle_age: policy.max_vehicle_age,
        rules,
        ltv: LtvEngine::new(Arc::clone(&collaborators.history)),
        collaborators: collaborators.clone(),
        mode,
    });

    let mut tasks = JoinSet::new();
    for candidate in candidates {
        let context = Arc::clone(&context);
        tasks.spawn(async move {
            let tenor = candidate.tenor;
            (tenor, evaluate_candidate(&context, candidate).await)
        });
    }

    let mut offers = Vec::new();
    let mut failure: Option<(u32, UnderwritingError)> = None;
    while let Some(joined) = tasks.join_next().await {
        let (tenor, result) = match joined {
            Ok(pair) => pair,
            Err(join_error) => (
                u32::MAX,
                Err(UnderwritingError::upstream(
                    "tenor evaluation",
                    join_error.to_string(),
                )),
            ),
        };

        match result {
            Ok(Some(offer)) => offers.push(offer),
            Ok(None) => {}
            Err(error) => {
                warn!(tenor, error = %error, "tenor evaluation failed");
                let lower = failure.as_ref().map_or(true, |(failed, _)| tenor < *failed);
                if lower {
                    failure = Some((tenor, error));
                }
            }
        }
    }

    if let Some((_, error)) = failure {
        return Err(error);
    }

    offers.sort_by_key(|offer| offer.tenor);
    Ok(offers)
}

async fn evaluate_candidate(
    context: &TenorContext,
    candidate: TenorCandidate,
) -> Result<Option<TenorOffer>, UnderwritingError> {
    let tenor = candidate.tenor;
    let facts = &context.facts;

    if tenor > TENOR_LIMIT {
        return Ok(None);
    }
    let limit = evaluate_tenor_limit(
        tenor,
        &facts.branch.cluster,
        context.collaborators.tenor_exclusions.as_ref(),
    )
    .await?;
    if limit.is_reject() {
        debug!(tenor, code = %limit.code(), "tenor skipped by tenor limit");
        return Ok(None);
    }

    let age_at_maturity = context.age_today + tenor / 12;
    if age_at_maturity > context.max_vehicle_age {
        debug!(tenor, age_at_maturity, "tenor skipped by vehicle age");
        return Ok(None);
    }

    let query = LtvQuery::from_facts(
        facts,
        tenor,
        context.customer_status,
        AgeVehicleBand::from_age(age_at_maturity),
    );
    let matched = context
        .ltv
        .evaluate(&facts.prospect_id, &context.rules, &query, facts.simulation)
        .await?;
    if matched.ltv == 0 {
        return Ok(None);
    }

    let quote = context
        .collaborators
        .pricing
        .lookup_max_loan_amount(&LoanAmountQuery {
            tenor,
            program_id: candidate.program_id.clone(),
            branch_id: facts.branch.branch_id.clone(),
            otr: facts.loan.otr,
            ltv: matched.ltv,
        })
        .await?;
    if quote.loan_amount_max < context.requested_amount {
        return Ok(None);
    }

    let installment_amount = match context.mode {
        FanOutMode::Offers => {
            context
                .collaborators
                .pricing
                .lookup_installment(
                    tenor,
                    &candidate.program_id,
                    &facts.branch.branch_id,
                    quote.ntf,
                )
                .await?
        }
        FanOutMode::MaxLoan => 0.0,
    };

    Ok(Some(TenorOffer {
        tenor,
        ltv: matched.ltv,
        otr: facts.loan.otr,
        loan_amount_max: quote.loan_amount_max,
        installment_amount,
        af: quote.af,
        ntf: quote.ntf,
        admin_fee: quote.admin_fee,
        dp_amount: quote.dp_amount,
        is_psa: candidate.is_psa,
        dealer: candidate.dealer,
    }))
}
