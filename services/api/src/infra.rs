use async_trait::async_trait;
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{BTreeSet, HashMap};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;
use underwrite_ai::config::PolicyProvider;
use underwrite_ai::error::AppError;
use underwrite_ai::workflows::underwriting::{
    Collaborators, CustomerLookup, CustomerRecord, DecisionHistory, DecisionTrail,
    LoanAmountQuery, LoanAmountQuote, LtvAuditRecord, LtvRuleTable, PefindoResult,
    PersonalIdentity, PricingService, RejectionHistory, RejectionHistoryLookup, ScoreBand,
    ScoringRequest, ScoringResult, ScoringService, TenorCandidate, TenorExclusionList,
    UnderwritingError, UnderwritingService, VehicleAgeRuleTable,
};

const BUNDLED_LTV_RULES: &str = include_str!("../../../crates/underwrite-ai/fixtures/ltv_rules.csv");
const BUNDLED_VEHICLE_AGE_RULES: &str =
    include_str!("../../../crates/underwrite-ai/fixtures/vehicle_age_rules.csv");

const PROGRAM_TENORS: [u32; 5] = [6, 12, 18, 24, 36];
const ADMIN_FEE: f64 = 2_000_000.0;
const MONTHLY_FLAT_RATE: f64 = 0.012;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Rule tables backing the LTV and vehicle-age stages.
pub(crate) struct RuleTables {
    pub(crate) ltv: LtvRuleTable,
    pub(crate) vehicle_age: VehicleAgeRuleTable,
}

impl RuleTables {
    /// Loads the CSV tables from disk, falling back to the bundled sample tables.
    pub(crate) fn load(
        ltv_path: Option<&Path>,
        vehicle_age_path: Option<&Path>,
    ) -> Result<Self, AppError> {
        let ltv = match ltv_path {
            Some(path) => LtvRuleTable::from_path(path)?,
            None => LtvRuleTable::from_reader(Cursor::new(BUNDLED_LTV_RULES))?,
        };
        let vehicle_age = match vehicle_age_path {
            Some(path) => VehicleAgeRuleTable::from_path(path)?,
            None => VehicleAgeRuleTable::from_reader(Cursor::new(BUNDLED_VEHICLE_AGE_RULES))?,
        };

        info!(
            ltv_rules = ltv.len(),
            vehicle_age_rules = vehicle_age.len(),
            "rule tables loaded"
        );
        Ok(Self { ltv, vehicle_age })
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryCustomerLookup {
    records: Arc<Mutex<HashMap<String, CustomerRecord>>>,
}

impl InMemoryCustomerLookup {
    #[cfg(test)]
    pub(crate) fn insert(&self, id_number: &str, record: CustomerRecord) {
        self.records
            .lock()
            .expect("customer mutex poisoned")
            .insert(id_number.to_string(), record);
    }
}

#[async_trait]
impl CustomerLookup for InMemoryCustomerLookup {
    async fn lookup_customer(
        &self,
        identity: &PersonalIdentity,
    ) -> Result<Option<CustomerRecord>, UnderwritingError> {
        let guard = self.records.lock().expect("customer mutex poisoned");
        Ok(guard.get(&identity.id_number).cloned())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryRejectionHistory {
    history: Arc<Mutex<HashMap<String, RejectionHistory>>>,
}

#[async_trait]
impl RejectionHistoryLookup for InMemoryRejectionHistory {
    async fn lookup_rejections(
        &self,
        id_number: &str,
    ) -> Result<RejectionHistory, UnderwritingError> {
        let guard = self.history.lock().expect("rejection mutex poisoned");
        Ok(guard.get(id_number).copied().unwrap_or_default())
    }
}

/// Clusters cleared to book the 36 month tenor.
#[derive(Clone)]
pub(crate) struct ClusterAllowList {
    clusters: BTreeSet<String>,
}

impl Default for ClusterAllowList {
    fn default() -> Self {
        Self {
            clusters: ["Cluster A", "Cluster B"]
                .iter()
                .map(|cluster| cluster.to_string())
                .collect(),
        }
    }
}

#[async_trait]
impl TenorExclusionList for ClusterAllowList {
    async fn is_cluster_excluded(&self, cluster: &str) -> Result<bool, UnderwritingError> {
        Ok(self.clusters.contains(cluster.trim()))
    }
}

/// Flat-rate program offering the same tenor grid at every branch.
#[derive(Default, Clone)]
pub(crate) struct FlatRatePricing;

#[async_trait]
impl PricingService for FlatRatePricing {
    async fn lookup_pricing_program(
        &self,
        branch_id: &str,
        _otr: f64,
    ) -> Result<Vec<TenorCandidate>, UnderwritingError> {
        Ok(PROGRAM_TENORS
            .iter()
            .map(|tenor| TenorCandidate {
                tenor: *tenor,
                program_id: format!("FLAT-{branch_id}-{tenor}"),
                dealer: "NON PSA".to_string(),
                is_psa: false,
            })
            .collect())
    }

    async fn lookup_max_loan_amount(
        &self,
        query: &LoanAmountQuery,
    ) -> Result<LoanAmountQuote, UnderwritingError> {
        if query.otr <= 0.0 {
            return Err(UnderwritingError::BadRequest(format!(
                "otr must be positive, found {}",
                query.otr
            )));
        }

        let af = (query.otr * f64::from(query.ltv) / 100.0).floor();
        Ok(LoanAmountQuote {
            loan_amount_max: af,
            af,
            ntf: af + ADMIN_FEE,
            admin_fee: ADMIN_FEE,
            dp_amount: query.otr - af,
        })
    }

    async fn lookup_installment(
        &self,
        tenor: u32,
        _program_id: &str,
        _branch_id: &str,
        ntf: f64,
    ) -> Result<f64, UnderwritingError> {
        if tenor == 0 {
            return Err(UnderwritingError::BadRequest("tenor must be positive".to_string()));
        }
        let months = f64::from(tenor);
        Ok((ntf * (1.0 + MONTHLY_FLAT_RATE * months) / months).round())
    }
}

/// Deterministic stand-in for the scoring engine, driven by the bureau result.
#[derive(Default, Clone)]
pub(crate) struct BureauScoring;

#[async_trait]
impl ScoringService for BureauScoring {
    async fn score(&self, request: &ScoringRequest) -> Result<ScoringResult, UnderwritingError> {
        let (score_result, score) = match (request.pefindo_result, request.cb_found) {
            (PefindoResult::Pass, true) => (ScoreBand::High, 760.0),
            (PefindoResult::Pass, false) | (PefindoResult::NoHit, _) => (ScoreBand::Medium, 610.0),
            (PefindoResult::Reject, _) => (ScoreBand::Low, 420.0),
        };

        Ok(ScoringResult {
            score_result,
            score,
            segment: request.customer_status.label().to_string(),
            status: "BUREAU".to_string(),
            is_tsi: false,
        })
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryDecisionHistory {
    trails: Arc<Mutex<Vec<DecisionTrail>>>,
    ltv: Arc<Mutex<Vec<LtvAuditRecord>>>,
}

impl InMemoryDecisionHistory {
    #[cfg(test)]
    pub(crate) fn trails(&self) -> Vec<DecisionTrail> {
        self.trails.lock().expect("history mutex poisoned").clone()
    }
}

#[async_trait]
impl DecisionHistory for InMemoryDecisionHistory {
    async fn persist_trail(&self, trail: &DecisionTrail) -> Result<(), UnderwritingError> {
        let mut guard = self.trails.lock().expect("history mutex poisoned");
        guard.push(trail.clone());
        Ok(())
    }

    async fn record_ltv(&self, record: &LtvAuditRecord) -> Result<(), UnderwritingError> {
        let mut guard = self.ltv.lock().expect("history mutex poisoned");
        guard.push(record.clone());
        Ok(())
    }
}

/// In-process collaborators used by both `serve` and `evaluate`.
#[derive(Default, Clone)]
pub(crate) struct InMemoryBackends {
    pub(crate) customers: InMemoryCustomerLookup,
    pub(crate) rejections: InMemoryRejectionHistory,
    pub(crate) history: InMemoryDecisionHistory,
}

impl InMemoryBackends {
    pub(crate) fn collaborators(&self, tables: RuleTables) -> Collaborators {
        Collaborators {
            customers: Arc::new(self.customers.clone()),
            rejections: Arc::new(self.rejections.clone()),
            ltv_rules: Arc::new(tables.ltv),
            vehicle_age_rules: Arc::new(tables.vehicle_age),
            tenor_exclusions: Arc::new(ClusterAllowList::default()),
            pricing: Arc::new(FlatRatePricing),
            scoring: Arc::new(BureauScoring),
            history: Arc::new(self.history.clone()),
        }
    }

    pub(crate) fn service(
        &self,
        tables: RuleTables,
        policy: Arc<dyn PolicyProvider>,
    ) -> UnderwritingService {
        UnderwritingService::new(self.collaborators(tables), policy)
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
