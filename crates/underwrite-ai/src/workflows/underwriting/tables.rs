//! CSV-backed rule tables for the LTV matcher and the vehicle-age rule.
//!
//! Row order in the file is the order the LTV matcher walks, so loaders never sort.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::json;

use super::codes::DecisionResult;
use super::collaborators::{
    LtvRuleKey, LtvRuleSource, UnderwritingError, VehicleAgeQuery, VehicleAgeRuleOutcome,
    VehicleAgeRuleSource,
};
use super::domain::{BpkbNameType, CustomerStatus, PefindoResult};
use super::ltv::{AgeVehicleBand, LtvRule};

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("failed to open rule table: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed rule table: {0}")]
    Csv(#[from] csv::Error),
    #[error("line {line}: invalid {column} '{value}'")]
    InvalidValue {
        /// File line of the offending record, counting the header as line 1.
        line: u64,
        column: &'static str,
        value: String,
    },
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty()))
}

/// Deserializes every record, pairing it with its line in the file.
fn read_rows<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<(u64, T)>, TableError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let mut record = csv::StringRecord::new();
    let mut rows = Vec::new();

    while csv_reader.read_record(&mut record)? {
        let line = record.position().map_or(0, |position| position.line());
        rows.push((line, record.deserialize(Some(&headers))?));
    }

    Ok(rows)
}

fn parse_pefindo(line: u64, value: &str) -> Result<PefindoResult, TableError> {
    match value.trim().to_ascii_uppercase().as_str() {
        "PASS" => Ok(PefindoResult::Pass),
        "REJECT" => Ok(PefindoResult::Reject),
        "NO_HIT" | "NOHIT" => Ok(PefindoResult::NoHit),
        _ => Err(invalid(line, "pefindo_result", value)),
    }
}

fn parse_bpkb(line: u64, value: u8) -> Result<BpkbNameType, TableError> {
    BpkbNameType::try_from(value).map_err(|_| invalid(line, "bpkb_name_type", &value.to_string()))
}

fn parse_age_band(line: u64, value: Option<&str>) -> Result<AgeVehicleBand, TableError> {
    match value {
        None => Ok(AgeVehicleBand::Any),
        Some("≤12") | Some("<=12") => Ok(AgeVehicleBand::UpToTwelve),
        Some("＞12") | Some(">12") => Ok(AgeVehicleBand::OverTwelve),
        Some(other) => Err(invalid(line, "age_vehicle", other)),
    }
}

fn parse_status(line: u64, value: Option<&str>) -> Result<Option<CustomerStatus>, TableError> {
    match value.map(str::to_ascii_uppercase).as_deref() {
        None => Ok(None),
        Some("NEW") => Ok(Some(CustomerStatus::New)),
        Some("RO") => Ok(Some(CustomerStatus::Ro)),
        Some("AO") => Ok(Some(CustomerStatus::Ao)),
        Some(other) => Err(invalid(line, "customer_status", other)),
    }
}

fn invalid(line: u64, column: &'static str, value: &str) -> TableError {
    TableError::InvalidValue {
        line,
        column,
        value: value.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct LtvRow {
    id: i64,
    cluster: String,
    pefindo_result: String,
    tenor_start: u32,
    tenor_end: u32,
    bpkb_name_type: u8,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    age_vehicle: Option<String>,
    #[serde(default)]
    baki_debet_start: Option<f64>,
    #[serde(default)]
    baki_debet_end: Option<f64>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    customer_status: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pbk_score: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    grade_branch: Option<String>,
    ltv: u32,
}

#[derive(Debug, Clone, PartialEq)]
struct LtvEntry {
    cluster: String,
    rule: LtvRule,
}

/// LTV rules published per cluster, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LtvRuleTable {
    entries: Vec<LtvEntry>,
}

impl LtvRuleTable {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut entries = Vec::new();

        for (line, row) in read_rows::<LtvRow, _>(reader)? {
            let rule = LtvRule {
                id: row.id,
                tenor_start: row.tenor_start,
                tenor_end: row.tenor_end,
                bpkb_name_type: parse_bpkb(line, row.bpkb_name_type)?,
                age_vehicle: parse_age_band(line, row.age_vehicle.as_deref())?,
                pefindo_result: parse_pefindo(line, &row.pefindo_result)?,
                baki_debet_start: row.baki_debet_start.unwrap_or(0.0),
                baki_debet_end: row.baki_debet_end,
                customer_status: parse_status(line, row.customer_status.as_deref())?,
                pbk_score: row.pbk_score,
                grade_branch: row.grade_branch,
                ltv: row.ltv,
            };
            entries.push(LtvEntry {
                cluster: row.cluster,
                rule,
            });
        }

        Ok(Self { entries })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TableError> {
        Self::from_reader(File::open(path)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rules for the key, in file order. Rows without a branch grade apply to every grade.
    pub fn rules_for(&self, key: &LtvRuleKey) -> Vec<LtvRule> {
        self.entries
            .iter()
            .filter(|entry| entry.cluster == key.cluster)
            .filter(|entry| entry.rule.pefindo_result == key.pefindo_result)
            .filter(|entry| {
                entry.rule.grade_branch.is_none() || entry.rule.grade_branch == key.branch_grade
            })
            .map(|entry| entry.rule.clone())
            .collect()
    }
}

#[async_trait]
impl LtvRuleSource for LtvRuleTable {
    async fn lookup_ltv_rules(&self, key: &LtvRuleKey) -> Result<Vec<LtvRule>, UnderwritingError> {
        Ok(self.rules_for(key))
    }
}

#[derive(Debug, Deserialize)]
struct VehicleAgeRow {
    id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    cluster: Option<String>,
    #[serde(default)]
    bpkb_name_type: Option<u8>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pefindo_result: Option<String>,
    age_min: u32,
    age_max: u32,
    tenor_min: u32,
    tenor_max: u32,
    #[serde(default)]
    af_max: Option<f64>,
    result: String,
}

/// One row of the vehicle-age table. `None` columns match anything.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleAgeRule {
    pub id: String,
    pub cluster: Option<String>,
    pub bpkb_name_type: Option<BpkbNameType>,
    pub pefindo_result: Option<PefindoResult>,
    pub age_min: u32,
    pub age_max: u32,
    pub tenor_min: u32,
    pub tenor_max: u32,
    pub af_max: Option<f64>,
    pub result: DecisionResult,
}

impl VehicleAgeRule {
    fn matches(&self, query: &VehicleAgeQuery) -> bool {
        self.cluster.as_deref().map_or(true, |cluster| cluster == query.cluster)
            && self
                .bpkb_name_type
                .map_or(true, |bpkb| bpkb == query.bpkb_name_type)
            && self
                .pefindo_result
                .map_or(true, |pefindo| pefindo == query.pefindo_result)
            && (self.age_min..=self.age_max).contains(&query.age)
            && (self.tenor_min..=self.tenor_max).contains(&query.tenor)
            && self.af_max.map_or(true, |af_max| query.af <= af_max)
    }
}

/// First matching row decides; no match is a PASS.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleAgeRuleTable {
    rules: Vec<VehicleAgeRule>,
}

impl VehicleAgeRuleTable {
    pub fn new(rules: Vec<VehicleAgeRule>) -> Self {
        Self { rules }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut rules = Vec::new();

        for (line, row) in read_rows::<VehicleAgeRow, _>(reader)? {
            let result = match row.result.to_ascii_uppercase().as_str() {
                "PASS" => DecisionResult::Pass,
                "REJECT" => DecisionResult::Reject,
                _ => return Err(invalid(line, "result", &row.result)),
            };
            rules.push(VehicleAgeRule {
                id: row.id,
                cluster: row.cluster,
                bpkb_name_type: row
                    .bpkb_name_type
                    .map(|value| parse_bpkb(line, value))
                    .transpose()?,
                pefindo_result: row
                    .pefindo_result
                    .as_deref()
                    .map(|value| parse_pefindo(line, value))
                    .transpose()?,
                age_min: row.age_min,
                age_max: row.age_max,
                tenor_min: row.tenor_min,
                tenor_max: row.tenor_max,
                af_max: row.af_max,
                result,
            });
        }

        Ok(Self { rules })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TableError> {
        Self::from_reader(File::open(path)?)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn evaluate(&self, query: &VehicleAgeQuery) -> VehicleAgeRuleOutcome {
        match self.rules.iter().find(|rule| rule.matches(query)) {
            Some(rule) => VehicleAgeRuleOutcome {
                result: rule.result,
                rule_id: Some(rule.id.clone()),
                info: json!({
                    "age_min": rule.age_min,
                    "age_max": rule.age_max,
                    "tenor_min": rule.tenor_min,
                    "tenor_max": rule.tenor_max,
                }),
            },
            None => VehicleAgeRuleOutcome {
                result: DecisionResult::Pass,
                rule_id: None,
                info: json!({ "matched": false }),
            },
        }
    }
}

#[async_trait]
impl VehicleAgeRuleSource for VehicleAgeRuleTable {
    async fn lookup_vehicle_age_rule(
        &self,
        query: &VehicleAgeQuery,
    ) -> Result<VehicleAgeRuleOutcome, UnderwritingError> {
        Ok(self.evaluate(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LTV_CSV: &str = "\
id,cluster,pefindo_result,tenor_start,tenor_end,bpkb_name_type,age_vehicle,baki_debet_start,baki_debet_end,customer_status,pbk_score,grade_branch,ltv
1,Cluster A,PASS,1,35,0,,,,,,,80
2,Cluster A,PASS,36,36,1,≤12,,,,,,75
3,Cluster B,PASS,1,35,0,,,,,,,70
4,Cluster A,REJECT,1,35,0,,0,5000000,,,,60
5,Cluster A,PASS,13,24,0,,,,NEW,GOOD,A,85
";

    #[test]
    fn ltv_rules_keep_file_order_per_key() {
        let table = LtvRuleTable::from_reader(LTV_CSV.as_bytes()).expect("table parses");
        assert_eq!(table.len(), 5);

        let key = LtvRuleKey {
            pefindo_result: PefindoResult::Pass,
            cluster: "Cluster A".to_string(),
            branch_grade: Some("B".to_string()),
        };
        let ids: Vec<i64> = table.rules_for(&key).iter().map(|rule| rule.id).collect();
        assert_eq!(ids, vec![1, 2]);

        let graded = LtvRuleKey {
            branch_grade: Some("A".to_string()),
            ..key
        };
        let ids: Vec<i64> = table.rules_for(&graded).iter().map(|rule| rule.id).collect();
        assert_eq!(ids, vec![1, 2, 5]);
    }

    #[test]
    fn ltv_columns_are_parsed_into_rule_fields() {
        let table = LtvRuleTable::from_reader(LTV_CSV.as_bytes()).expect("table parses");
        let key = LtvRuleKey {
            pefindo_result: PefindoResult::Reject,
            cluster: "Cluster A".to_string(),
            branch_grade: None,
        };
        let rules = table.rules_for(&key);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].baki_debet_end, Some(5_000_000.0));
        assert_eq!(rules[0].age_vehicle, AgeVehicleBand::Any);
    }

    #[test]
    fn unknown_age_band_is_rejected_with_file_line() {
        let csv = "\
id,cluster,pefindo_result,tenor_start,tenor_end,bpkb_name_type,age_vehicle,ltv
1,Cluster A,PASS,1,35,0,,80
2,Cluster A,PASS,36,36,0,old,70
";
        let err = LtvRuleTable::from_reader(csv.as_bytes()).expect_err("band is invalid");
        assert!(matches!(
            err,
            TableError::InvalidValue {
                line: 3,
                column: "age_vehicle",
                ..
            }
        ));
    }

    #[test]
    fn vehicle_age_first_matching_row_decides() {
        let csv = "\
id,cluster,bpkb_name_type,pefindo_result,age_min,age_max,tenor_min,tenor_max,af_max,result
VA-1,Cluster C,,,15,23,24,36,,REJECT
VA-2,,,,0,23,1,60,,PASS
";
        let table = VehicleAgeRuleTable::from_reader(csv.as_bytes()).expect("table parses");
        let mut query = VehicleAgeQuery {
            age: 18,
            cluster: "Cluster C".to_string(),
            bpkb_name_type: BpkbNameType::SameName,
            tenor: 36,
            pefindo_result: PefindoResult::Pass,
            af: 50_000_000.0,
        };

        let outcome = table.evaluate(&query);
        assert_eq!(outcome.result, DecisionResult::Reject);
        assert_eq!(outcome.rule_id.as_deref(), Some("VA-1"));

        query.cluster = "Cluster A".to_string();
        let outcome = table.evaluate(&query);
        assert_eq!(outcome.result, DecisionResult::Pass);
        assert_eq!(outcome.rule_id.as_deref(), Some("VA-2"));
    }
}
