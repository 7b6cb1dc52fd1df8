use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for an underwriting request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProspectId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaritalStatus {
    Single,
    Married,
    Divorced,
    Widowed,
}

/// Identity fields used for the prior-loan lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalIdentity {
    pub id_number: String,
    pub legal_name: String,
    pub birth_date: NaiveDate,
    pub mother_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpouseFacts {
    pub identity: PersonalIdentity,
    #[serde(default)]
    pub monthly_income: f64,
    /// Spouse has a record at the credit bureau.
    #[serde(default)]
    pub cb_found: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmploymentInfo {
    pub profession: String,
    pub employment_type: String,
    pub length_of_employment_months: u32,
}

/// Originating branch and the officer's cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchFacts {
    pub branch_id: String,
    pub cluster: String,
    #[serde(default)]
    pub grade: Option<String>,
}

/// Requested financing terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub tenor: u32,
    pub otr: f64,
    pub ntf: f64,
    pub af: f64,
    pub dp_amount: f64,
    pub admin_fee: f64,
    pub installment_amount: f64,
}

/// Ownership type printed on the BPKB relative to the applicant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BpkbNameType {
    DifferentName,
    SameName,
}

impl From<BpkbNameType> for u8 {
    fn from(value: BpkbNameType) -> Self {
        match value {
            BpkbNameType::DifferentName => 0,
            BpkbNameType::SameName => 1,
        }
    }
}

impl TryFrom<u8> for BpkbNameType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BpkbNameType::DifferentName),
            1 => Ok(BpkbNameType::SameName),
            other => Err(format!("BPKB name type must be 0 or 1, found {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleFacts {
    /// Kept as supplied; parsed by the vehicle-age rule.
    pub manufacture_year: String,
    pub bpkb_name_type: BpkbNameType,
    /// Relationship code of the BPKB owner (e.g. `K`, `P`, `KK`).
    #[serde(default)]
    pub bpkb_owner_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PefindoResult {
    Pass,
    Reject,
    NoHit,
}

impl PefindoResult {
    pub const fn label(self) -> &'static str {
        match self {
            PefindoResult::Pass => "PASS",
            PefindoResult::Reject => "REJECT",
            PefindoResult::NoHit => "NO_HIT",
        }
    }
}

/// Credit bureau facts gathered before underwriting starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BureauFacts {
    pub pefindo_result: PefindoResult,
    #[serde(default)]
    pub cb_found: bool,
    /// Outstanding debt ("baki debet") reported by the bureau.
    #[serde(default)]
    pub outstanding_debt: f64,
    #[serde(default)]
    pub installments: f64,
    /// Debt ratio from the bureau, in percent.
    #[serde(default)]
    pub debt_ratio: f64,
    #[serde(default)]
    pub pbk_score: Option<String>,
}

/// Existing contract being topped up by this request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopUpFacts {
    pub existing_installment: f64,
    pub outstanding_principal: f64,
}

/// Immutable input to a single evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicantFacts {
    pub prospect_id: ProspectId,
    pub identity: PersonalIdentity,
    pub marital_status: MaritalStatus,
    #[serde(default)]
    pub spouse: Option<SpouseFacts>,
    pub zip_code: String,
    pub employment: EmploymentInfo,
    pub monthly_income: f64,
    pub branch: BranchFacts,
    pub loan: LoanRequest,
    pub vehicle: VehicleFacts,
    pub bureau: BureauFacts,
    #[serde(default)]
    pub other_lender_installments: f64,
    #[serde(default)]
    pub top_up: Option<TopUpFacts>,
    /// Simulations run every rule but skip audit writes.
    #[serde(default)]
    pub simulation: bool,
}

impl ApplicantFacts {
    /// Spouse facts are only considered for married applicants.
    pub fn spouse_under_review(&self) -> Option<&SpouseFacts> {
        match self.marital_status {
            MaritalStatus::Married => self.spouse.as_ref(),
            _ => None,
        }
    }

    pub fn cb_found(&self) -> bool {
        self.bureau.cb_found || self.spouse_under_review().is_some_and(|spouse| spouse.cb_found)
    }

    pub fn household_income(&self) -> f64 {
        self.monthly_income
            + self
                .spouse_under_review()
                .map(|spouse| spouse.monthly_income)
                .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomerStatus {
    New,
    Ro,
    Ao,
}

impl CustomerStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CustomerStatus::New => "NEW",
            CustomerStatus::Ro => "RO",
            CustomerStatus::Ao => "AO",
        }
    }

    /// RO when a restructure date exists and either nothing is outstanding or the
    /// paid-installment count is absent; AO when installments remain; otherwise NEW.
    pub fn derive(record: &CustomerRecord) -> Self {
        let has_installments = record.installment_amount > 0.0;
        let restructured = record.restructure_date.is_some();

        if restructured
            && (!has_installments || record.number_of_paid_installment.is_none())
        {
            CustomerStatus::Ro
        } else if has_installments {
            CustomerStatus::Ao
        } else {
            CustomerStatus::New
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomerSegment {
    #[default]
    Regular,
    Prime,
    Priority,
}

impl CustomerSegment {
    pub const fn is_fast_track(self) -> bool {
        matches!(self, CustomerSegment::Prime | CustomerSegment::Priority)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BadType {
    #[serde(rename = "W", alias = "WARNING")]
    Warning,
    #[serde(rename = "B", alias = "BLACKLIST")]
    Blacklist,
}

/// Coarse customer tag produced by the blacklist classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomerType {
    Clean,
    Warning,
    Blacklist,
}

/// Raw prior-loan facts as returned by the customer lookup.
///
/// `number_of_paid_installment: None` means the source had no value; it is not the same as
/// `Some(0)`. Dates and contract ages follow the same rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    #[serde(default)]
    pub segment: CustomerSegment,
    #[serde(default)]
    pub installment_amount: f64,
    #[serde(default)]
    pub restructure_date: Option<NaiveDate>,
    #[serde(default)]
    pub number_of_paid_installment: Option<u32>,
    #[serde(default)]
    pub max_overdue_days: u32,
    #[serde(default)]
    pub num_assets_inventoried: u32,
    #[serde(default)]
    pub is_restructure: bool,
    #[serde(default)]
    pub is_similar: bool,
    #[serde(default)]
    pub bad_type: Option<BadType>,
    /// Months since the last contract expired (RO customers).
    #[serde(default)]
    pub months_since_contract_expiry: Option<u32>,
    /// Months since the active contract started (AO customers).
    #[serde(default)]
    pub contract_age_months: Option<u32>,
}

/// Classification computed once per party from a `CustomerRecord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerClassification {
    status: CustomerStatus,
    #[serde(flatten)]
    record: CustomerRecord,
}

impl CustomerClassification {
    pub fn from_record(record: CustomerRecord) -> Self {
        Self {
            status: CustomerStatus::derive(&record),
            record,
        }
    }

    pub fn status(&self) -> CustomerStatus {
        self.status
    }

    pub fn segment(&self) -> CustomerSegment {
        self.record.segment
    }

    pub fn record(&self) -> &CustomerRecord {
        &self.record
    }
}
