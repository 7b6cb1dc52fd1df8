use chrono::{Datelike, NaiveDate};
use serde_json::json;

use super::super::codes::{Decision, DecisionCode, DecisionResult, SourceDecision};
use super::super::collaborators::{UnderwritingError, VehicleAgeQuery, VehicleAgeRuleSource};
use super::super::domain::{BpkbNameType, PefindoResult};
use crate::config::PolicyConfig;

/// Facts consumed by the vehicle-age rule.
#[derive(Debug, Clone)]
pub struct VehicleAgeInput<'a> {
    pub manufacture_year: &'a str,
    pub cluster: &'a str,
    pub bpkb_name_type: BpkbNameType,
    pub tenor: u32,
    pub pefindo_result: PefindoResult,
    pub af: f64,
    pub today: NaiveDate,
}

/// Age of the vehicle in whole years at the end of the tenor.
pub fn vehicle_age_at_maturity(
    manufacture_year: &str,
    tenor: u32,
    current_year: i32,
) -> Result<u32, UnderwritingError> {
    let trimmed = manufacture_year.trim();
    let year: i32 = trimmed.parse().map_err(|_| {
        UnderwritingError::BadRequest(format!("manufacture year '{trimmed}' is not a year"))
    })?;

    if year > current_year {
        return Err(UnderwritingError::BadRequest(format!(
            "manufacture year {year} is after {current_year}"
        )));
    }

    let age_today = current_year
        .checked_sub(year)
        .and_then(|years| u32::try_from(years).ok())
        .ok_or_else(|| {
            UnderwritingError::BadRequest(format!("manufacture year {year} is out of range"))
        })?;

    Ok(age_today + tenor / 12)
}

pub async fn evaluate_vehicle_age(
    input: &VehicleAgeInput<'_>,
    policy: &PolicyConfig,
    rules: &dyn VehicleAgeRuleSource,
) -> Result<Decision, UnderwritingError> {
    let age = vehicle_age_at_maturity(input.manufacture_year, input.tenor, input.today.year())?;

    let mut info = json!({
        "manufacture_year": input.manufacture_year.trim(),
        "age": age,
        "max_age": policy.max_vehicle_age,
        "cluster": input.cluster,
        "bpkb_name_type": input.bpkb_name_type,
        "tenor": input.tenor,
        "pefindo_result": input.pefindo_result,
        "af": input.af,
    });

    if age > policy.max_vehicle_age {
        return Ok(
            Decision::new(DecisionCode::VehicleTooOld, SourceDecision::VehicleAge)
                .with_reason(format!(
                    "vehicle age {age} exceeds policy maximum {}",
                    policy.max_vehicle_age
                ))
                .with_info(info),
        );
    }

    let query = VehicleAgeQuery {
        age,
        cluster: input.cluster.to_string(),
        bpkb_name_type: input.bpkb_name_type,
        tenor: input.tenor,
        pefindo_result: input.pefindo_result,
        af: input.af,
    };
    let matched = rules.lookup_vehicle_age_rule(&query).await?;

    info["rule_id"] = json!(matched.rule_id);
    info["rule_result"] = json!(matched.result);
    info["rule_info"] = matched.info;

    let code = match matched.result {
        DecisionResult::Reject => DecisionCode::VehicleAgeClusterRule,
        DecisionResult::Pass => DecisionCode::VehicleAgePass,
    };

    Ok(Decision::new(code, SourceDecision::VehicleAge).with_info(info))
}
