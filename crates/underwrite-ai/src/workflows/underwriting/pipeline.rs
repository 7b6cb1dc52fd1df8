use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use super::codes::{Decision, DecisionCode, SourceDecision};
use super::collaborators::{Collaborators, UnderwritingError};
use super::domain::{
    ApplicantFacts, CustomerClassification, CustomerSegment, CustomerStatus, CustomerType,
    ProspectId,
};
use super::ltv::{rule_key_for, AgeVehicleBand, LtvEngine, LtvQuery};
use super::rules::{
    evaluate_blacklist, evaluate_dsr, evaluate_rejection_history, evaluate_scoring,
    evaluate_tenor_limit, evaluate_total_dsr, evaluate_vehicle_age, vehicle_age_at_maturity,
    DsrInputs, VehicleAgeInput,
};
use super::tenor::{self, TenorOffer, TenorRequest};
use crate::config::{ConfigError, PolicyConfig, PolicyProvider};

/// Stage at which the pipeline stopped with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Blacklist,
    SpouseBlacklist,
    RejectionHistory,
    TenorLimit,
    VehicleAge,
    Scoring,
    Ltv,
    Dsr,
    TotalDsr,
    Persistence,
    TenorEvaluation,
}

impl PipelineStage {
    pub const fn label(self) -> &'static str {
        match self {
            PipelineStage::Blacklist => "blacklist",
            PipelineStage::SpouseBlacklist => "spouse_blacklist",
            PipelineStage::RejectionHistory => "rejection_history",
            PipelineStage::TenorLimit => "tenor_limit",
            PipelineStage::VehicleAge => "vehicle_age",
            PipelineStage::Scoring => "scoring",
            PipelineStage::Ltv => "ltv",
            PipelineStage::Dsr => "dsr",
            PipelineStage::TotalDsr => "total_dsr",
            PipelineStage::Persistence => "persistence",
            PipelineStage::TenorEvaluation => "tenor_evaluation",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("underwriting policy unavailable: {0}")]
    Config(#[from] ConfigError),
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: PipelineStage,
        #[source]
        source: UnderwritingError,
    },
}

impl PipelineError {
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            PipelineError::Config(_) => None,
        }
    }

    pub fn underwriting(&self) -> Option<&UnderwritingError> {
        match self {
            PipelineError::Stage { source, .. } => Some(source),
            PipelineError::Config(_) => None,
        }
    }
}

fn at(stage: PipelineStage) -> impl FnOnce(UnderwritingError) -> PipelineError {
    move |source| {
        warn!(stage = %stage, error = %source, "underwriting stage failed");
        PipelineError::Stage { stage, source }
    }
}

/// Audit record handed to the decision history once the pipeline settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrail {
    pub prospect_id: ProspectId,
    pub stages: Vec<Decision>,
    pub final_decision: Decision,
    pub customer_type: CustomerType,
    pub customer_status: CustomerStatus,
    pub customer_segment: CustomerSegment,
    pub ltv: Option<u32>,
    pub dsr: Option<f64>,
    pub total_dsr: Option<f64>,
    pub simulation: bool,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub prospect_id: ProspectId,
    pub decision: Decision,
    pub trail: Vec<Decision>,
    pub customer_type: CustomerType,
    pub customer_status: CustomerStatus,
    pub customer_segment: CustomerSegment,
}

impl From<DecisionTrail> for PipelineOutcome {
    fn from(trail: DecisionTrail) -> Self {
        Self {
            prospect_id: trail.prospect_id,
            decision: trail.final_decision,
            trail: trail.stages,
            customer_type: trail.customer_type,
            customer_status: trail.customer_status,
            customer_segment: trail.customer_segment,
        }
    }
}

/// Per-request accumulator. Each pushed decision is kept; a reject ends the run.
struct TrailBuilder {
    stages: Vec<Decision>,
    customer_type: CustomerType,
    customer_status: CustomerStatus,
    customer_segment: CustomerSegment,
    ltv: Option<u32>,
    dsr: Option<f64>,
    total_dsr: Option<f64>,
}

impl TrailBuilder {
    fn new() -> Self {
        Self {
            stages: Vec::new(),
            customer_type: CustomerType::Clean,
            customer_status: CustomerStatus::New,
            customer_segment: CustomerSegment::Regular,
            ltv: None,
            dsr: None,
            total_dsr: None,
        }
    }

    /// Returns true when the decision ends the run.
    fn push(&mut self, stage: PipelineStage, decision: Decision) -> bool {
        debug!(stage = %stage, code = %decision.code(), result = decision.result().label(), "stage decided");
        let reject = decision.is_reject();
        self.stages.push(decision);
        reject
    }

    fn note_customer_type(&mut self, customer_type: CustomerType) {
        self.customer_type = match (self.customer_type, customer_type) {
            (CustomerType::Blacklist, _) | (_, CustomerType::Blacklist) => CustomerType::Blacklist,
            (CustomerType::Warning, _) | (_, CustomerType::Warning) => CustomerType::Warning,
            _ => CustomerType::Clean,
        };
    }

    fn finish(self, facts: &ApplicantFacts) -> DecisionTrail {
        let final_decision = match self.stages.last() {
            Some(last) if last.is_reject() => last.clone(),
            _ => Decision::new(DecisionCode::Approved, SourceDecision::Pipeline),
        };

        DecisionTrail {
            prospect_id: facts.prospect_id.clone(),
            stages: self.stages,
            final_decision,
            customer_type: self.customer_type,
            customer_status: self.customer_status,
            customer_segment: self.customer_segment,
            ltv: self.ltv,
            dsr: self.dsr,
            total_dsr: self.total_dsr,
            simulation: facts.simulation,
            evaluated_at: Utc::now(),
        }
    }
}

/// Orchestrates the rule stages over the shared collaborators.
pub struct UnderwritingService {
    collaborators: Collaborators,
    policy: Arc<dyn PolicyProvider>,
    ltv: LtvEngine,
}

impl UnderwritingService {
    pub fn new(collaborators: Collaborators, policy: Arc<dyn PolicyProvider>) -> Self {
        let ltv = LtvEngine::new(Arc::clone(&collaborators.history));
        Self {
            collaborators,
            policy,
            ltv,
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Runs every stage in order, stopping at the first REJECT. The trail is persisted
    /// before returning unless the request is a simulation.
    pub async fn run_decision_pipeline(
        &self,
        facts: &ApplicantFacts,
        today: NaiveDate,
    ) -> Result<PipelineOutcome, PipelineError> {
        let policy = self.policy.current()?;
        let mut trail = TrailBuilder::new();

        if self.run_stages(facts, today, &policy, &mut trail).await? {
            debug!(prospect_id = %facts.prospect_id.0, "pipeline short-circuited");
        }

        let trail = trail.finish(facts);
        if !facts.simulation {
            self.collaborators
                .history
                .persist_trail(&trail)
                .await
                .map_err(at(PipelineStage::Persistence))?;
        }

        info!(
            prospect_id = %trail.prospect_id.0,
            decision = %trail.final_decision.code(),
            source = trail.final_decision.source().label(),
            stages = trail.stages.len(),
            "underwriting decision"
        );

        Ok(trail.into())
    }

    /// Returns true when a stage rejected.
    async fn run_stages(
        &self,
        facts: &ApplicantFacts,
        today: NaiveDate,
        policy: &PolicyConfig,
        trail: &mut TrailBuilder,
    ) -> Result<bool, PipelineError> {
        let collaborators = &self.collaborators;

        let applicant = collaborators
            .customers
            .lookup_customer(&facts.identity)
            .await
            .map_err(at(PipelineStage::Blacklist))?
            .map(CustomerClassification::from_record);
        let outcome = evaluate_blacklist(0, applicant.as_ref());
        trail.customer_status = outcome.customer_status;
        trail.customer_segment = applicant
            .as_ref()
            .map(CustomerClassification::segment)
            .unwrap_or_default();
        trail.note_customer_type(outcome.customer_type);
        if trail.push(PipelineStage::Blacklist, outcome.decision) {
            return Ok(true);
        }

        let mut spouse_installment = 0.0;
        if let Some(spouse) = facts.spouse_under_review() {
            let classification = collaborators
                .customers
                .lookup_customer(&spouse.identity)
                .await
                .map_err(at(PipelineStage::SpouseBlacklist))?
                .map(CustomerClassification::from_record);
            let outcome = evaluate_blacklist(1, classification.as_ref());
            spouse_installment = classification
                .as_ref()
                .map(|spouse| spouse.record().installment_amount)
                .unwrap_or(0.0);
            trail.note_customer_type(outcome.customer_type);
            if trail.push(PipelineStage::SpouseBlacklist, outcome.decision) {
                return Ok(true);
            }
        }

        let rejections = collaborators
            .rejections
            .lookup_rejections(&facts.identity.id_number)
            .await
            .map_err(at(PipelineStage::RejectionHistory))?;
        if trail.push(
            PipelineStage::RejectionHistory,
            evaluate_rejection_history(&rejections, policy),
        ) {
            return Ok(true);
        }

        let tenor = facts.loan.tenor;
        let decision = evaluate_tenor_limit(
            tenor,
            &facts.branch.cluster,
            collaborators.tenor_exclusions.as_ref(),
        )
        .await
        .map_err(at(PipelineStage::TenorLimit))?;
        if trail.push(PipelineStage::TenorLimit, decision) {
            return Ok(true);
        }

        let input = VehicleAgeInput {
            manufacture_year: &facts.vehicle.manufacture_year,
            cluster: &facts.branch.cluster,
            bpkb_name_type: facts.vehicle.bpkb_name_type,
            tenor,
            pefindo_result: facts.bureau.pefindo_result,
            af: facts.loan.af,
            today,
        };
        let decision = evaluate_vehicle_age(&input, policy, collaborators.vehicle_age_rules.as_ref())
            .await
            .map_err(at(PipelineStage::VehicleAge))?;
        if trail.push(PipelineStage::VehicleAge, decision) {
            return Ok(true);
        }

        let scoring = evaluate_scoring(facts, applicant.as_ref(), policy, collaborators.scoring.as_ref())
            .await
            .map_err(at(PipelineStage::Scoring))?;
        debug!(branch = ?scoring.branch, "scoring branch selected");
        if trail.push(PipelineStage::Scoring, scoring.decision) {
            return Ok(true);
        }

        let decision = self
            .ltv_eligibility(facts, today, trail)
            .await
            .map_err(at(PipelineStage::Ltv))?;
        if trail.push(PipelineStage::Ltv, decision) {
            return Ok(true);
        }

        let mut inputs = DsrInputs::from_facts(facts);
        inputs.spouse_installment = spouse_installment;
        let dsr = evaluate_dsr(&inputs, applicant.as_ref(), policy).map_err(at(PipelineStage::Dsr))?;
        trail.dsr = Some(dsr.dsr);
        if trail.push(PipelineStage::Dsr, dsr.decision) {
            return Ok(true);
        }

        let total = evaluate_total_dsr(dsr.dsr, facts.bureau.debt_ratio, applicant.as_ref(), policy);
        trail.total_dsr = Some(total.dsr);
        Ok(trail.push(PipelineStage::TotalDsr, total.decision))
    }

    async fn ltv_eligibility(
        &self,
        facts: &ApplicantFacts,
        today: NaiveDate,
        trail: &mut TrailBuilder,
    ) -> Result<Decision, UnderwritingError> {
        let tenor = facts.loan.tenor;
        let age = vehicle_age_at_maturity(&facts.vehicle.manufacture_year, tenor, today.year())?;
        let rules = self
            .collaborators
            .ltv_rules
            .lookup_ltv_rules(&rule_key_for(facts))
            .await?;
        let query = LtvQuery::from_facts(
            facts,
            tenor,
            trail.customer_status,
            AgeVehicleBand::from_age(age),
        );
        let matched = self
            .ltv
            .evaluate(&facts.prospect_id, &rules, &query, facts.simulation)
            .await?;
        trail.ltv = Some(matched.ltv);

        let max_af = facts.loan.otr * f64::from(matched.ltv) / 100.0;
        let info = json!({
            "ltv": matched.ltv,
            "rule_id": matched.rule_id,
            "max_tenor": matched.max_tenor,
            "adjust_tenor_allowed": matched.adjust_tenor_allowed,
            "age_vehicle": query.age_band.label(),
            "af": facts.loan.af,
            "max_af": max_af,
        });

        let decision = if matched.ltv == 0 {
            Decision::new(DecisionCode::LtvNotAvailable, SourceDecision::Ltv)
        } else if facts.loan.af > max_af {
            Decision::new(DecisionCode::LtvExceeded, SourceDecision::Ltv).with_reason(format!(
                "AF {:.2} exceeds LTV {}% of OTR ({max_af:.2})",
                facts.loan.af, matched.ltv
            ))
        } else {
            Decision::new(DecisionCode::LtvEligible, SourceDecision::Ltv)
        };

        Ok(decision.with_info(info))
    }

    pub async fn tenor_offers(
        &self,
        request: &TenorRequest,
        today: NaiveDate,
    ) -> Result<Vec<TenorOffer>, PipelineError> {
        let policy = self.policy.current()?;
        tenor::evaluate_tenor_offers(request, &self.collaborators, &policy, today)
            .await
            .map_err(at(PipelineStage::TenorEvaluation))
    }

    pub async fn max_loan_amount(
        &self,
        request: &TenorRequest,
        today: NaiveDate,
    ) -> Result<Option<f64>, PipelineError> {
        let policy = self.policy.current()?;
        tenor::max_loan_amount(request, &self.collaborators, &policy, today)
            .await
            .map_err(at(PipelineStage::TenorEvaluation))
    }
}
