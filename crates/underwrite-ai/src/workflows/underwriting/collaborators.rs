use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::codes::DecisionResult;
use super::domain::{
    BpkbNameType, CustomerRecord, CustomerSegment, CustomerStatus, PefindoResult,
    PersonalIdentity, ProspectId,
};
use super::ltv::{LtvAuditRecord, LtvRule};
use super::pipeline::DecisionTrail;

/// Failure raised by a rule stage or one of its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum UnderwritingError {
    #[error("{lookup} lookup timed out")]
    UpstreamTimeout { lookup: &'static str },
    #[error("{lookup} lookup failed: {message}")]
    Upstream {
        lookup: &'static str,
        message: String,
    },
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl UnderwritingError {
    pub fn upstream(lookup: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            lookup,
            message: message.into(),
        }
    }
}

/// Prior-loan lookup. `Ok(None)` is the NEW-customer case, not a failure.
#[async_trait]
pub trait CustomerLookup: Send + Sync {
    async fn lookup_customer(
        &self,
        identity: &PersonalIdentity,
    ) -> Result<Option<CustomerRecord>, UnderwritingError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionHistory {
    pub reject_count_pmk_dsr: u32,
    pub reject_count_nik: u32,
}

/// Adapters are responsible for encrypting the ID number before it leaves the process.
#[async_trait]
pub trait RejectionHistoryLookup: Send + Sync {
    async fn lookup_rejections(&self, id_number: &str)
        -> Result<RejectionHistory, UnderwritingError>;
}

/// Key under which an LTV rule table is published.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LtvRuleKey {
    pub pefindo_result: PefindoResult,
    pub cluster: String,
    pub branch_grade: Option<String>,
}

/// Returns rules in the order the matcher must walk them.
#[async_trait]
pub trait LtvRuleSource: Send + Sync {
    async fn lookup_ltv_rules(&self, key: &LtvRuleKey) -> Result<Vec<LtvRule>, UnderwritingError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleAgeQuery {
    pub age: u32,
    pub cluster: String,
    pub bpkb_name_type: BpkbNameType,
    pub tenor: u32,
    pub pefindo_result: PefindoResult,
    pub af: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleAgeRuleOutcome {
    pub result: DecisionResult,
    #[serde(default)]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub info: Value,
}

#[async_trait]
pub trait VehicleAgeRuleSource: Send + Sync {
    async fn lookup_vehicle_age_rule(
        &self,
        query: &VehicleAgeQuery,
    ) -> Result<VehicleAgeRuleOutcome, UnderwritingError>;
}

/// Clusters allowed to book a 36 month tenor.
#[async_trait]
pub trait TenorExclusionList: Send + Sync {
    async fn is_cluster_excluded(&self, cluster: &str) -> Result<bool, UnderwritingError>;
}

/// One tenor offered by the pricing program for the applicant's branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenorCandidate {
    pub tenor: u32,
    pub program_id: String,
    pub dealer: String,
    #[serde(default)]
    pub is_psa: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanAmountQuery {
    pub tenor: u32,
    pub program_id: String,
    pub branch_id: String,
    pub otr: f64,
    pub ltv: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanAmountQuote {
    pub loan_amount_max: f64,
    pub af: f64,
    pub ntf: f64,
    pub admin_fee: f64,
    pub dp_amount: f64,
}

#[async_trait]
pub trait PricingService: Send + Sync {
    async fn lookup_pricing_program(
        &self,
        branch_id: &str,
        otr: f64,
    ) -> Result<Vec<TenorCandidate>, UnderwritingError>;

    async fn lookup_max_loan_amount(
        &self,
        query: &LoanAmountQuery,
    ) -> Result<LoanAmountQuote, UnderwritingError>;

    async fn lookup_installment(
        &self,
        tenor: u32,
        program_id: &str,
        branch_id: &str,
        ntf: f64,
    ) -> Result<f64, UnderwritingError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreBand {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub prospect_id: ProspectId,
    pub id_number: String,
    pub monthly_income: f64,
    pub zip_code: String,
    pub profession: String,
    pub pefindo_result: PefindoResult,
    pub cb_found: bool,
    pub customer_status: CustomerStatus,
    pub customer_segment: CustomerSegment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    pub score_result: ScoreBand,
    pub score: f64,
    pub segment: String,
    pub status: String,
    #[serde(default)]
    pub is_tsi: bool,
}

#[async_trait]
pub trait ScoringService: Send + Sync {
    async fn score(&self, request: &ScoringRequest) -> Result<ScoringResult, UnderwritingError>;
}

/// Audit sink for final decision trails and LTV matches.
#[async_trait]
pub trait DecisionHistory: Send + Sync {
    async fn persist_trail(&self, trail: &DecisionTrail) -> Result<(), UnderwritingError>;
    async fn record_ltv(&self, record: &LtvAuditRecord) -> Result<(), UnderwritingError>;
}

/// Handles to every collaborator the pipeline and tenor evaluator need.
#[derive(Clone)]
pub struct Collaborators {
    pub customers: Arc<dyn CustomerLookup>,
    pub rejections: Arc<dyn RejectionHistoryLookup>,
    pub ltv_rules: Arc<dyn LtvRuleSource>,
    pub vehicle_age_rules: Arc<dyn VehicleAgeRuleSource>,
    pub tenor_exclusions: Arc<dyn TenorExclusionList>,
    pub pricing: Arc<dyn PricingService>,
    pub scoring: Arc<dyn ScoringService>,
    pub history: Arc<dyn DecisionHistory>,
}
