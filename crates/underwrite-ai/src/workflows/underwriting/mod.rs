//! Vehicle-loan underwriting: ordered rule stages, the LTV/tenor mapping engine and the
//! parallel tenor evaluator.
//!
//! Every external system is reached through the traits in [`collaborators`]; the policy dials
//! arrive as an explicit [`PolicyConfig`](crate::config::PolicyConfig) loaded once per request.

pub mod codes;
pub mod collaborators;
pub mod domain;
pub mod ltv;
pub mod pipeline;
pub mod router;
pub mod rules;
pub mod tables;
pub mod tenor;

#[cfg(test)]
mod tests;

pub use codes::{Decision, DecisionCode, DecisionResult, SourceDecision};
pub use collaborators::{
    Collaborators, CustomerLookup, DecisionHistory, LoanAmountQuery, LoanAmountQuote, LtvRuleKey,
    LtvRuleSource, PricingService, RejectionHistory, RejectionHistoryLookup, ScoreBand,
    ScoringRequest, ScoringResult, ScoringService, TenorCandidate, TenorExclusionList,
    UnderwritingError, VehicleAgeQuery, VehicleAgeRuleOutcome, VehicleAgeRuleSource,
};
pub use domain::{
    ApplicantFacts, BadType, BpkbNameType, BranchFacts, BureauFacts, CustomerClassification,
    CustomerRecord, CustomerSegment, CustomerStatus, CustomerType, EmploymentInfo, LoanRequest,
    MaritalStatus, PefindoResult, PersonalIdentity, ProspectId, SpouseFacts, TopUpFacts,
    VehicleFacts,
};
pub use ltv::{
    match_ltv, AgeVehicleBand, LtvAuditRecord, LtvEngine, LtvMatchOutcome, LtvQuery, LtvRule,
};
pub use pipeline::{
    DecisionTrail, PipelineError, PipelineOutcome, PipelineStage, UnderwritingService,
};
pub use router::{underwriting_router, DecisionRequest, TenorOffersRequest};
pub use tables::{LtvRuleTable, TableError, VehicleAgeRule, VehicleAgeRuleTable};
pub use tenor::{evaluate_tenor_offers, max_loan_amount, TenorOffer, TenorRequest};
