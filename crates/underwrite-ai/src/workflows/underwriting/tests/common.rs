use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::config::PolicyConfig;
use crate::workflows::underwriting::codes::DecisionResult;
use crate::workflows::underwriting::collaborators::{
    Collaborators, CustomerLookup, DecisionHistory, LoanAmountQuery, LoanAmountQuote, LtvRuleKey,
    LtvRuleSource, PricingService, RejectionHistory, RejectionHistoryLookup, ScoreBand,
    ScoringRequest, ScoringResult, ScoringService, TenorCandidate, TenorExclusionList,
    UnderwritingError, VehicleAgeQuery, VehicleAgeRuleOutcome, VehicleAgeRuleSource,
};
use crate::workflows::underwriting::domain::{
    ApplicantFacts, BpkbNameType, BranchFacts, BureauFacts, CustomerRecord, EmploymentInfo,
    LoanRequest, MaritalStatus, PefindoResult, PersonalIdentity, ProspectId, SpouseFacts,
    VehicleFacts,
};
use crate::workflows::underwriting::ltv::{AgeVehicleBand, LtvAuditRecord, LtvRule};
use crate::workflows::underwriting::pipeline::{DecisionTrail, UnderwritingService};

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date")
}

pub(super) fn identity(id_number: &str, legal_name: &str) -> PersonalIdentity {
    PersonalIdentity {
        id_number: id_number.to_string(),
        legal_name: legal_name.to_string(),
        birth_date: NaiveDate::from_ymd_opt(1990, 4, 12).expect("valid date"),
        mother_name: "SITI AMINAH".to_string(),
    }
}

/// Single applicant, 24 month tenor, DSR 20% and a clean bureau result.
pub(super) fn applicant() -> ApplicantFacts {
    ApplicantFacts {
        prospect_id: ProspectId("SAL-0001".to_string()),
        identity: identity("3174010101900001", "BUDI SANTOSO"),
        marital_status: MaritalStatus::Single,
        spouse: None,
        zip_code: "12940".to_string(),
        employment: EmploymentInfo {
            profession: "KRYSW".to_string(),
            employment_type: "PERMANENT".to_string(),
            length_of_employment_months: 48,
        },
        monthly_income: 10_000_000.0,
        branch: BranchFacts {
            branch_id: "BR-426".to_string(),
            cluster: "Cluster A".to_string(),
            grade: Some("A".to_string()),
        },
        loan: LoanRequest {
            tenor: 24,
            otr: 200_000_000.0,
            ntf: 152_000_000.0,
            af: 150_000_000.0,
            dp_amount: 50_000_000.0,
            admin_fee: 2_000_000.0,
            installment_amount: 2_000_000.0,
        },
        vehicle: VehicleFacts {
            manufacture_year: "2020".to_string(),
            bpkb_name_type: BpkbNameType::DifferentName,
            bpkb_owner_code: "O".to_string(),
        },
        bureau: BureauFacts {
            pefindo_result: PefindoResult::Pass,
            cb_found: true,
            outstanding_debt: 0.0,
            installments: 0.0,
            debt_ratio: 5.0,
            pbk_score: Some("GOOD".to_string()),
        },
        other_lender_installments: 0.0,
        top_up: None,
        simulation: false,
    }
}

pub(super) fn married_applicant() -> ApplicantFacts {
    let mut facts = applicant();
    facts.marital_status = MaritalStatus::Married;
    facts.spouse = Some(SpouseFacts {
        identity: identity("3174014101920002", "RINA SANTOSO"),
        monthly_income: 0.0,
        cb_found: false,
    });
    facts
}

pub(super) fn ltv_rule(id: i64, tenor_start: u32, tenor_end: u32, ltv: u32) -> LtvRule {
    LtvRule {
        id,
        tenor_start,
        tenor_end,
        bpkb_name_type: BpkbNameType::DifferentName,
        age_vehicle: AgeVehicleBand::Any,
        pefindo_result: PefindoResult::Pass,
        baki_debet_start: 0.0,
        baki_debet_end: None,
        customer_status: None,
        pbk_score: None,
        grade_branch: None,
        ltv,
    }
}

pub(super) fn scoring_result(score_result: ScoreBand, score: f64) -> ScoringResult {
    ScoringResult {
        score_result,
        score,
        segment: "A1".to_string(),
        status: "ASS-SCORE".to_string(),
        is_tsi: false,
    }
}

pub(super) fn active_record(installment_amount: f64) -> CustomerRecord {
    CustomerRecord {
        installment_amount,
        number_of_paid_installment: Some(8),
        contract_age_months: Some(8),
        ..CustomerRecord::default()
    }
}

#[derive(Default)]
pub(super) struct MemoryCustomers {
    records: Mutex<HashMap<String, CustomerRecord>>,
    lookups: AtomicUsize,
}

impl MemoryCustomers {
    pub(super) fn insert(&self, id_number: &str, record: CustomerRecord) {
        self.records
            .lock()
            .expect("customer lock")
            .insert(id_number.to_string(), record);
    }

    pub(super) fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CustomerLookup for MemoryCustomers {
    async fn lookup_customer(
        &self,
        identity: &PersonalIdentity,
    ) -> Result<Option<CustomerRecord>, UnderwritingError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .records
            .lock()
            .expect("customer lock")
            .get(&identity.id_number)
            .cloned())
    }
}

#[derive(Default)]
pub(super) struct FixedRejections(Mutex<RejectionHistory>);

impl FixedRejections {
    pub(super) fn set(&self, history: RejectionHistory) {
        *self.0.lock().expect("rejection lock") = history;
    }
}

#[async_trait]
impl RejectionHistoryLookup for FixedRejections {
    async fn lookup_rejections(
        &self,
        _id_number: &str,
    ) -> Result<RejectionHistory, UnderwritingError> {
        Ok(*self.0.lock().expect("rejection lock"))
    }
}

#[derive(Default)]
pub(super) struct StaticLtvRules {
    rules: Mutex<Vec<LtvRule>>,
    lookups: AtomicUsize,
}

impl StaticLtvRules {
    pub(super) fn set(&self, rules: Vec<LtvRule>) {
        *self.rules.lock().expect("ltv lock") = rules;
    }

    pub(super) fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LtvRuleSource for StaticLtvRules {
    async fn lookup_ltv_rules(&self, _key: &LtvRuleKey) -> Result<Vec<LtvRule>, UnderwritingError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.rules.lock().expect("ltv lock").clone())
    }
}

pub(super) struct StaticVehicleAgeRules(Mutex<DecisionResult>);

impl Default for StaticVehicleAgeRules {
    fn default() -> Self {
        Self(Mutex::new(DecisionResult::Pass))
    }
}

impl StaticVehicleAgeRules {
    pub(super) fn set(&self, result: DecisionResult) {
        *self.0.lock().expect("vehicle age lock") = result;
    }
}

#[async_trait]
impl VehicleAgeRuleSource for StaticVehicleAgeRules {
    async fn lookup_vehicle_age_rule(
        &self,
        _query: &VehicleAgeQuery,
    ) -> Result<VehicleAgeRuleOutcome, UnderwritingError> {
        Ok(VehicleAgeRuleOutcome {
            result: *self.0.lock().expect("vehicle age lock"),
            rule_id: Some("VA-TEST".to_string()),
            info: serde_json::Value::Null,
        })
    }
}

#[derive(Default)]
pub(super) struct ExclusionList {
    clusters: Mutex<HashSet<String>>,
    lookups: AtomicUsize,
}

impl ExclusionList {
    pub(super) fn allow(&self, cluster: &str) {
        self.clusters
            .lock()
            .expect("exclusion lock")
            .insert(cluster.to_string());
    }

    pub(super) fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenorExclusionList for ExclusionList {
    async fn is_cluster_excluded(&self, cluster: &str) -> Result<bool, UnderwritingError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.clusters.lock().expect("exclusion lock").contains(cluster))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PricingFailure {
    Timeout,
    Upstream,
}

/// Loan amounts follow `otr * ltv / 100`; installments are `ntf / tenor`.
#[derive(Default)]
pub(super) struct FakePricing {
    candidates: Mutex<Vec<TenorCandidate>>,
    failures: Mutex<HashMap<u32, PricingFailure>>,
    quotes: AtomicUsize,
}

impl FakePricing {
    pub(super) fn offer_tenors(&self, tenors: &[u32]) {
        *self.candidates.lock().expect("pricing lock") = tenors
            .iter()
            .map(|tenor| TenorCandidate {
                tenor: *tenor,
                program_id: format!("PRG-{tenor}"),
                dealer: "PT MOTOR JAYA".to_string(),
                is_psa: *tenor == 12,
            })
            .collect();
    }

    pub(super) fn fail_tenor(&self, tenor: u32, failure: PricingFailure) {
        self.failures
            .lock()
            .expect("pricing lock")
            .insert(tenor, failure);
    }

    pub(super) fn quotes(&self) -> usize {
        self.quotes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PricingService for FakePricing {
    async fn lookup_pricing_program(
        &self,
        _branch_id: &str,
        _otr: f64,
    ) -> Result<Vec<TenorCandidate>, UnderwritingError> {
        Ok(self.candidates.lock().expect("pricing lock").clone())
    }

    async fn lookup_max_loan_amount(
        &self,
        query: &LoanAmountQuery,
    ) -> Result<LoanAmountQuote, UnderwritingError> {
        self.quotes.fetch_add(1, Ordering::SeqCst);
        // Longer tenors settle later so completion order differs from request order.
        for _ in 0..(query.tenor / 6) {
            tokio::task::yield_now().await;
        }

        let failure = self
            .failures
            .lock()
            .expect("pricing lock")
            .get(&query.tenor)
            .copied();
        match failure {
            Some(PricingFailure::Timeout) => {
                return Err(UnderwritingError::UpstreamTimeout {
                    lookup: "max loan amount",
                })
            }
            Some(PricingFailure::Upstream) => {
                return Err(UnderwritingError::upstream(
                    "max loan amount",
                    format!("tenor {} unavailable", query.tenor),
                ))
            }
            None => {}
        }

        let loan_amount_max = query.otr * f64::from(query.ltv) / 100.0;
        Ok(LoanAmountQuote {
            loan_amount_max,
            af: loan_amount_max,
            ntf: loan_amount_max + 2_000_000.0,
            admin_fee: 2_000_000.0,
            dp_amount: query.otr - loan_amount_max,
        })
    }

    async fn lookup_installment(
        &self,
        tenor: u32,
        _program_id: &str,
        _branch_id: &str,
        ntf: f64,
    ) -> Result<f64, UnderwritingError> {
        Ok((ntf / f64::from(tenor)).round())
    }
}

pub(super) struct FakeScoring {
    result: Mutex<ScoringResult>,
    calls: AtomicUsize,
}

impl Default for FakeScoring {
    fn default() -> Self {
        Self {
            result: Mutex::new(scoring_result(ScoreBand::High, 780.0)),
            calls: AtomicUsize::new(0),
        }
    }
}

impl FakeScoring {
    pub(super) fn set(&self, result: ScoringResult) {
        *self.result.lock().expect("scoring lock") = result;
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringService for FakeScoring {
    async fn score(&self, _request: &ScoringRequest) -> Result<ScoringResult, UnderwritingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.lock().expect("scoring lock").clone())
    }
}

#[derive(Default)]
pub(super) struct MemoryHistory {
    trails: Mutex<Vec<DecisionTrail>>,
    ltv: Mutex<Vec<LtvAuditRecord>>,
}

impl MemoryHistory {
    pub(super) fn trails(&self) -> Vec<DecisionTrail> {
        self.trails.lock().expect("history lock").clone()
    }

    pub(super) fn ltv_records(&self) -> Vec<LtvAuditRecord> {
        self.ltv.lock().expect("history lock").clone()
    }
}

#[async_trait]
impl DecisionHistory for MemoryHistory {
    async fn persist_trail(&self, trail: &DecisionTrail) -> Result<(), UnderwritingError> {
        self.trails
            .lock()
            .expect("history lock")
            .push(trail.clone());
        Ok(())
    }

    async fn record_ltv(&self, record: &LtvAuditRecord) -> Result<(), UnderwritingError> {
        self.ltv.lock().expect("history lock").push(record.clone());
        Ok(())
    }
}

pub(super) struct UnavailableHistory;

#[async_trait]
impl DecisionHistory for UnavailableHistory {
    async fn persist_trail(&self, _trail: &DecisionTrail) -> Result<(), UnderwritingError> {
        Err(UnderwritingError::upstream("decision history", "database unavailable"))
    }

    async fn record_ltv(&self, _record: &LtvAuditRecord) -> Result<(), UnderwritingError> {
        Ok(())
    }
}

/// Every collaborator as an in-memory fake, pre-loaded with rules that approve `applicant()`.
pub(super) struct Harness {
    pub(super) customers: Arc<MemoryCustomers>,
    pub(super) rejections: Arc<FixedRejections>,
    pub(super) ltv_rules: Arc<StaticLtvRules>,
    pub(super) vehicle_age_rules: Arc<StaticVehicleAgeRules>,
    pub(super) exclusions: Arc<ExclusionList>,
    pub(super) pricing: Arc<FakePricing>,
    pub(super) scoring: Arc<FakeScoring>,
    pub(super) history: Arc<MemoryHistory>,
}

impl Harness {
    pub(super) fn new() -> Self {
        let harness = Self {
            customers: Arc::new(MemoryCustomers::default()),
            rejections: Arc::new(FixedRejections::default()),
            ltv_rules: Arc::new(StaticLtvRules::default()),
            vehicle_age_rules: Arc::new(StaticVehicleAgeRules::default()),
            exclusions: Arc::new(ExclusionList::default()),
            pricing: Arc::new(FakePricing::default()),
            scoring: Arc::new(FakeScoring::default()),
            history: Arc::new(MemoryHistory::default()),
        };
        harness
            .ltv_rules
            .set(vec![ltv_rule(1, 1, 35, 80), ltv_rule(2, 36, 36, 75)]);
        harness.pricing.offer_tenors(&[12, 24, 36]);
        harness
    }

    pub(super) fn collaborators(&self) -> Collaborators {
        Collaborators {
            customers: self.customers.clone(),
            rejections: self.rejections.clone(),
            ltv_rules: self.ltv_rules.clone(),
            vehicle_age_rules: self.vehicle_age_rules.clone(),
            tenor_exclusions: self.exclusions.clone(),
            pricing: self.pricing.clone(),
            scoring: self.scoring.clone(),
            history: self.history.clone(),
        }
    }

    pub(super) fn service(&self) -> UnderwritingService {
        self.service_with(PolicyConfig::default())
    }

    pub(super) fn service_with(&self, policy: PolicyConfig) -> UnderwritingService {
        UnderwritingService::new(self.collaborators(), Arc::new(policy))
    }
}
