//! LTV and maximum-tenor selection over a table of overlapping range rules.
//!
//! Rules are walked once in the order the rule source returned them. Among ordinary matches
//! the last one wins; a fixed-LTV match locks the result and ends the walk. The maximum
//! eligible tenor is computed in a separate pass and does not depend on which rule won.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::collaborators::{DecisionHistory, LtvRuleKey, UnderwritingError};
use super::domain::{ApplicantFacts, BpkbNameType, CustomerStatus, PefindoResult, ProspectId};
use super::rules::TENOR_LIMIT;

/// Tenor that carries the fixed-LTV program for new, different-name applicants.
pub const FIXED_LTV_TENOR: u32 = 18;

/// Vehicle-age bucket used by LTV rules. An empty band on a rule matches any vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeVehicleBand {
    #[serde(rename = "≤12")]
    UpToTwelve,
    #[serde(rename = "＞12")]
    OverTwelve,
    #[default]
    #[serde(rename = "")]
    Any,
}

impl AgeVehicleBand {
    pub const YOUNG_VEHICLE_MAX_AGE: u32 = 12;

    pub fn from_age(age: u32) -> Self {
        if age <= Self::YOUNG_VEHICLE_MAX_AGE {
            AgeVehicleBand::UpToTwelve
        } else {
            AgeVehicleBand::OverTwelve
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            AgeVehicleBand::UpToTwelve => "≤12",
            AgeVehicleBand::OverTwelve => "＞12",
            AgeVehicleBand::Any => "",
        }
    }

    fn admits(self, vehicle: AgeVehicleBand) -> bool {
        self == AgeVehicleBand::Any || self == vehicle
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LtvRule {
    pub id: i64,
    pub tenor_start: u32,
    pub tenor_end: u32,
    pub bpkb_name_type: BpkbNameType,
    #[serde(default)]
    pub age_vehicle: AgeVehicleBand,
    pub pefindo_result: PefindoResult,
    #[serde(default)]
    pub baki_debet_start: f64,
    /// Upper outstanding-debt bound; `None` leaves the range open.
    #[serde(default)]
    pub baki_debet_end: Option<f64>,
    #[serde(default)]
    pub customer_status: Option<CustomerStatus>,
    #[serde(default)]
    pub pbk_score: Option<String>,
    #[serde(default)]
    pub grade_branch: Option<String>,
    pub ltv: u32,
}

impl LtvRule {
    fn covers_tenor(&self, tenor: u32) -> bool {
        self.tenor_start <= tenor && tenor <= self.tenor_end
    }

    fn covers_debt(&self, outstanding_debt: f64) -> bool {
        self.baki_debet_start <= outstanding_debt
            && self.baki_debet_end.map_or(true, |end| outstanding_debt <= end)
    }

    /// Ownership check for tenors below the limit: same-name rules are reserved for same-name
    /// applicants, different-name rules apply to both.
    fn admits_short_tenor_owner(&self, applicant: BpkbNameType) -> bool {
        self.bpkb_name_type == BpkbNameType::DifferentName || applicant == BpkbNameType::SameName
    }

    /// Longest tenor this rule can grant the applicant under the matching constraints.
    fn eligible_tenor_end(&self, query: &LtvQuery) -> Option<u32> {
        if self.ltv == 0 {
            return None;
        }
        if self.bpkb_name_type == query.bpkb_name_type && self.age_vehicle.admits(query.age_band) {
            return Some(self.tenor_end);
        }
        // Below the limit neither strict ownership nor the age band applies.
        if self.tenor_start < TENOR_LIMIT && self.admits_short_tenor_owner(query.bpkb_name_type) {
            return Some(self.tenor_end.min(TENOR_LIMIT - 1));
        }
        None
    }
}

/// Applicant-side inputs to a single LTV match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LtvQuery {
    pub tenor: u32,
    pub bpkb_name_type: BpkbNameType,
    pub pefindo_result: PefindoResult,
    pub outstanding_debt: f64,
    pub age_band: AgeVehicleBand,
    pub customer_status: CustomerStatus,
    pub pbk_score: Option<String>,
    pub branch_grade: Option<String>,
}

impl LtvQuery {
    pub fn from_facts(
        facts: &ApplicantFacts,
        tenor: u32,
        customer_status: CustomerStatus,
        age_band: AgeVehicleBand,
    ) -> Self {
        Self {
            tenor,
            bpkb_name_type: facts.vehicle.bpkb_name_type,
            pefindo_result: facts.bureau.pefindo_result,
            outstanding_debt: facts.bureau.outstanding_debt,
            age_band,
            customer_status,
            pbk_score: facts.bureau.pbk_score.clone(),
            branch_grade: facts.branch.grade.clone(),
        }
    }

    fn on_fixed_track(&self) -> bool {
        self.tenor == FIXED_LTV_TENOR
            && self.customer_status == CustomerStatus::New
            && self.bpkb_name_type == BpkbNameType::DifferentName
    }
}

pub fn rule_key_for(facts: &ApplicantFacts) -> LtvRuleKey {
    LtvRuleKey {
        pefindo_result: facts.bureau.pefindo_result,
        cluster: facts.branch.cluster.clone(),
        branch_grade: facts.branch.grade.clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LtvMatchOutcome {
    pub ltv: u32,
    pub adjust_tenor_allowed: bool,
    pub rule_id: Option<i64>,
    pub max_tenor: u32,
    pub fixed: bool,
}

fn fixed_match(rule: &LtvRule, query: &LtvQuery) -> bool {
    query.on_fixed_track()
        && rule.covers_tenor(FIXED_LTV_TENOR)
        && rule.customer_status == Some(CustomerStatus::New)
        && rule.bpkb_name_type == BpkbNameType::DifferentName
        && rule.pbk_score.is_some()
        && rule.pbk_score == query.pbk_score
        && rule.grade_branch.is_some()
        && rule.grade_branch == query.branch_grade
}

fn range_match(rule: &LtvRule, query: &LtvQuery) -> bool {
    if rule.pefindo_result != query.pefindo_result || !rule.covers_tenor(query.tenor) {
        return false;
    }
    if rule.pefindo_result == PefindoResult::Reject && !rule.covers_debt(query.outstanding_debt) {
        return false;
    }

    if query.tenor >= TENOR_LIMIT {
        rule.bpkb_name_type == query.bpkb_name_type && rule.age_vehicle.admits(query.age_band)
    } else if query.tenor != FIXED_LTV_TENOR {
        rule.admits_short_tenor_owner(query.bpkb_name_type)
    } else {
        false
    }
}

fn max_eligible_tenor(rules: &[LtvRule], query: &LtvQuery) -> u32 {
    rules
        .iter()
        .filter_map(|rule| rule.eligible_tenor_end(query))
        .max()
        .unwrap_or(0)
}

/// Pure matcher. Identical inputs always give identical outcomes.
pub fn match_ltv(rules: &[LtvRule], query: &LtvQuery) -> LtvMatchOutcome {
    let mut ltv = 0;
    let mut rule_id = None;
    let mut fixed = false;

    for rule in rules {
        if fixed_match(rule, query) {
            ltv = rule.ltv;
            rule_id = Some(rule.id);
            fixed = true;
            break;
        }
        if range_match(rule, query) {
            ltv = rule.ltv;
            rule_id = Some(rule.id);
        }
    }

    let max_tenor = max_eligible_tenor(rules, query);

    LtvMatchOutcome {
        ltv,
        adjust_tenor_allowed: max_tenor > 0 && query.tenor > max_tenor,
        rule_id,
        max_tenor,
        fixed,
    }
}

/// One persisted LTV evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LtvAuditRecord {
    pub prospect_id: ProspectId,
    pub query: LtvQuery,
    pub outcome: LtvMatchOutcome,
    pub rules_considered: usize,
    pub recorded_at: DateTime<Utc>,
}

/// Matcher bound to the audit sink. Records every evaluation that is not a simulation.
#[derive(Clone)]
pub struct LtvEngine {
    history: Arc<dyn DecisionHistory>,
}

impl LtvEngine {
    pub fn new(history: Arc<dyn DecisionHistory>) -> Self {
        Self { history }
    }

    pub async fn evaluate(
        &self,
        prospect_id: &ProspectId,
        rules: &[LtvRule],
        query: &LtvQuery,
        simulation: bool,
    ) -> Result<LtvMatchOutcome, UnderwritingError> {
        let outcome = match_ltv(rules, query);
        debug!(
            prospect_id = %prospect_id.0,
            tenor = query.tenor,
            ltv = outcome.ltv,
            rule_id = ?outcome.rule_id,
            max_tenor = outcome.max_tenor,
            "ltv matched"
        );

        if !simulation {
            let record = LtvAuditRecord {
                prospect_id: prospect_id.clone(),
                query: query.clone(),
                outcome,
                rules_considered: rules.len(),
                recorded_at: Utc::now(),
            };
            self.history.record_ltv(&record).await?;
        }

        Ok(outcome)
    }
}
