use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Binary outcome of a single rule stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionResult {
    Pass,
    Reject,
}

impl DecisionResult {
    pub const fn label(self) -> &'static str {
        match self {
            DecisionResult::Pass => "PASS",
            DecisionResult::Reject => "REJECT",
        }
    }
}

/// Rule stage that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceDecision {
    Blacklist,
    RejectionHistory,
    TenorLimit,
    VehicleAge,
    Scoring,
    Ltv,
    Dsr,
    TotalDsr,
    Pipeline,
}

impl SourceDecision {
    pub const fn label(self) -> &'static str {
        match self {
            SourceDecision::Blacklist => "BLACKLIST",
            SourceDecision::RejectionHistory => "REJECTION_HISTORY",
            SourceDecision::TenorLimit => "TENOR_LIMIT",
            SourceDecision::VehicleAge => "VEHICLE_AGE",
            SourceDecision::Scoring => "SCORING",
            SourceDecision::Ltv => "LTV",
            SourceDecision::Dsr => "DSR",
            SourceDecision::TotalDsr => "TOTAL_DSR",
            SourceDecision::Pipeline => "PIPELINE",
        }
    }
}

macro_rules! decision_codes {
    (
        pass { $($pass:ident => ($pcode:literal, $preason:literal)),* $(,)? }
        reject { $($reject:ident => ($rcode:literal, $rreason:literal)),* $(,)? }
    ) => {
        /// Machine-readable decision code. The result class is fixed per code.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum DecisionCode {
            $($pass,)*
            $($reject,)*
        }

        impl DecisionCode {
            pub const ALL: &'static [DecisionCode] = &[
                $(DecisionCode::$pass,)*
                $(DecisionCode::$reject,)*
            ];

            pub const fn as_str(self) -> &'static str {
                match self {
                    $(DecisionCode::$pass => $pcode,)*
                    $(DecisionCode::$reject => $rcode,)*
                }
            }

            pub const fn reason(self) -> &'static str {
                match self {
                    $(DecisionCode::$pass => $preason,)*
                    $(DecisionCode::$reject => $rreason,)*
                }
            }

            pub const fn result(self) -> DecisionResult {
                match self {
                    $(DecisionCode::$pass => DecisionResult::Pass,)*
                    $(DecisionCode::$reject => DecisionResult::Reject,)*
                }
            }
        }
    };
}

decision_codes! {
    pass {
        NonBlacklist => ("1100", "customer is not blacklisted"),
        BlacklistWarning => ("1101", "customer carries a warning flag"),
        RejectionHistoryClear => ("1200", "rejection history within limits"),
        TenorLimitNotApplicable => ("1300", "tenor below limit rule"),
        TenorClusterAllowed => ("1301", "cluster allowed for tenor 36"),
        VehicleAgePass => ("1400", "vehicle age within policy"),
        ScorePass => ("1500", "scoring result meets threshold"),
        ScoreSegmentFastTrack => ("1501", "prime/priority segment fast-track"),
        ScoreOwnershipFastTrack => ("1502", "BPKB same-name fast-track"),
        ScoreAssOverride => ("1503", "score within ASS segment band"),
        LtvEligible => ("1600", "financed amount within LTV"),
        DsrPass => ("1700", "DSR within threshold"),
        DsrSegmentFastTrack => ("1701", "prime/priority DSR fast-track"),
        TotalDsrPass => ("1800", "total DSR within threshold"),
        TotalDsrSegmentFastTrack => ("1801", "prime/priority total DSR fast-track"),
        Approved => ("1900", "all underwriting stages passed"),
    }
    reject {
        SimilarIdentity => ("2100", "identity similar to an existing customer"),
        BlacklistApplicant => ("2101", "applicant is blacklisted"),
        BlacklistSpouse => ("2102", "spouse is blacklisted"),
        OverdueApplicant => ("2103", "applicant overdue more than 90 days"),
        OverdueSpouse => ("2104", "spouse overdue more than 90 days"),
        AssetInventoriedApplicant => ("2105", "applicant has inventoried assets"),
        AssetInventoriedSpouse => ("2106", "spouse has inventoried assets"),
        RestructuredApplicant => ("2107", "applicant contract restructured"),
        RestructuredSpouse => ("2108", "spouse contract restructured"),
        RejectionHistoryNik => ("2200", "too many prior rejections for ID number"),
        RejectionHistoryDsr => ("2201", "too many prior DSR rejections"),
        TenorExceedsPolicy => ("2300", "tenor exceeds policy"),
        TenorClusterNotAllowed => ("2301", "cluster not allowed for tenor 36"),
        VehicleTooOld => ("2400", "vehicle too old for policy"),
        VehicleAgeClusterRule => ("2401", "vehicle age exceeds cluster rule"),
        ScoreBelowThreshold => ("2500", "scoring result below threshold"),
        LtvNotAvailable => ("2600", "no LTV rule for tenor"),
        LtvExceeded => ("2601", "financed amount exceeds LTV"),
        DsrAboveThreshold => ("2700", "DSR > threshold"),
        TopUpDisbursementTooLow => ("2701", "top-up disbursement below minimum"),
        TotalDsrAboveThreshold => ("2800", "total DSR > threshold"),
    }
}

impl DecisionCode {
    pub const fn is_reject(self) -> bool {
        matches!(self.result(), DecisionResult::Reject)
    }
}

impl fmt::Display for DecisionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<DecisionCode> for String {
    fn from(code: DecisionCode) -> Self {
        code.as_str().to_string()
    }
}

impl TryFrom<String> for DecisionCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DecisionCode::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == value)
            .ok_or_else(|| format!("unknown decision code '{value}'"))
    }
}

/// Outcome of one rule stage. The result always agrees with the code's class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DecisionWire")]
pub struct Decision {
    result: DecisionResult,
    code: DecisionCode,
    reason: String,
    source: SourceDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    info: Option<Value>,
}

#[derive(Deserialize)]
struct DecisionWire {
    result: DecisionResult,
    code: DecisionCode,
    reason: String,
    source: SourceDecision,
    #[serde(default)]
    info: Option<Value>,
}

impl TryFrom<DecisionWire> for Decision {
    type Error = String;

    fn try_from(wire: DecisionWire) -> Result<Self, Self::Error> {
        if wire.result != wire.code.result() {
            return Err(format!(
                "decision code {} is {}, not {}",
                wire.code,
                wire.code.result().label(),
                wire.result.label()
            ));
        }

        Ok(Self {
            result: wire.result,
            code: wire.code,
            reason: wire.reason,
            source: wire.source,
            info: wire.info,
        })
    }
}

impl Decision {
    pub fn new(code: DecisionCode, source: SourceDecision) -> Self {
        Self {
            result: code.result(),
            code,
            reason: code.reason().to_string(),
            source,
            info: None,
        }
    }

    /// Replace the default reason with one that names the observed values.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_info(mut self, info: Value) -> Self {
        self.info = Some(info);
        self
    }

    pub fn result(&self) -> DecisionResult {
        self.result
    }

    pub fn code(&self) -> DecisionCode {
        self.code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn source(&self) -> SourceDecision {
        self.source
    }

    pub fn info(&self) -> Option<&Value> {
        self.info.as_ref()
    }

    pub fn is_pass(&self) -> bool {
        self.result == DecisionResult::Pass
    }

    pub fn is_reject(&self) -> bool {
        self.result == DecisionResult::Reject
    }

    pub fn summary(&self) -> String {
        format!(
            "{} [{}] {}: {}",
            self.result.label(),
            self.code,
            self.source.label(),
            self.reason
        )
    }
}
