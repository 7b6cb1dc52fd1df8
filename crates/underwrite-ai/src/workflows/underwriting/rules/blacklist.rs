use serde::{Deserialize, Serialize};
use serde_json::json;

use super::super::codes::{Decision, DecisionCode, SourceDecision};
use super::super::domain::{BadType, CustomerClassification, CustomerStatus, CustomerType};

/// Overdue days beyond which a prior customer is rejected outright.
pub const MAX_OVERDUE_DAYS: u32 = 90;

/// Result of the blacklist/dupcheck stage for one party.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlacklistOutcome {
    pub decision: Decision,
    pub customer_type: CustomerType,
    pub customer_status: CustomerStatus,
}

/// Party index 0 is the applicant, any other index is the spouse.
pub fn evaluate_blacklist(
    party_index: usize,
    classification: Option<&CustomerClassification>,
) -> BlacklistOutcome {
    let Some(classification) = classification else {
        return BlacklistOutcome {
            decision: Decision::new(DecisionCode::NonBlacklist, SourceDecision::Blacklist),
            customer_type: CustomerType::Clean,
            customer_status: CustomerStatus::New,
        };
    };

    let record = classification.record();
    let status = classification.status();
    let applicant = party_index == 0;
    let by_party = |applicant_code, spouse_code| {
        if applicant {
            applicant_code
        } else {
            spouse_code
        }
    };

    let info = json!({
        "party": if applicant { "applicant" } else { "spouse" },
        "customer_status": status.label(),
        "bad_type": record.bad_type,
        "max_overdue_days": record.max_overdue_days,
        "num_assets_inventoried": record.num_assets_inventoried,
        "is_restructure": record.is_restructure,
        "is_similar": record.is_similar,
    });

    let outcome = |code: DecisionCode, customer_type: CustomerType| BlacklistOutcome {
        decision: Decision::new(code, SourceDecision::Blacklist).with_info(info.clone()),
        customer_type,
        customer_status: status,
    };

    if record.is_similar && applicant {
        return outcome(DecisionCode::SimilarIdentity, CustomerType::Clean);
    }

    if record.bad_type == Some(BadType::Blacklist) {
        return outcome(
            by_party(DecisionCode::BlacklistApplicant, DecisionCode::BlacklistSpouse),
            CustomerType::Blacklist,
        );
    }

    if record.max_overdue_days > MAX_OVERDUE_DAYS {
        return outcome(
            by_party(DecisionCode::OverdueApplicant, DecisionCode::OverdueSpouse),
            CustomerType::Blacklist,
        );
    }

    if record.num_assets_inventoried > 0 {
        return outcome(
            by_party(
                DecisionCode::AssetInventoriedApplicant,
                DecisionCode::AssetInventoriedSpouse,
            ),
            CustomerType::Blacklist,
        );
    }

    if record.is_restructure {
        return outcome(
            by_party(
                DecisionCode::RestructuredApplicant,
                DecisionCode::RestructuredSpouse,
            ),
            CustomerType::Blacklist,
        );
    }

    if record.bad_type == Some(BadType::Warning) {
        return outcome(DecisionCode::BlacklistWarning, CustomerType::Warning);
    }

    outcome(DecisionCode::NonBlacklist, CustomerType::Clean)
}
