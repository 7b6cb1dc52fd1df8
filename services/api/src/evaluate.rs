use crate::cli::RuleTableArgs;
use crate::infra::{InMemoryBackends, RuleTables};
use chrono::{NaiveDate, Utc};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use underwrite_ai::config::EnvPolicyProvider;
use underwrite_ai::error::AppError;
use underwrite_ai::workflows::underwriting::{
    ApplicantFacts, PipelineOutcome, TenorOffer, TenorRequest, UnderwritingService,
};

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// Applicant facts as a JSON document
    #[arg(long)]
    pub(crate) applicant: PathBuf,
    #[command(flatten)]
    pub(crate) tables: RuleTableArgs,
    /// Evaluation date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) as_of: Option<NaiveDate>,
    /// Also evaluate every program tenor for the applicant
    #[arg(long)]
    pub(crate) tenor_offers: bool,
    /// Print the full report as JSON instead of a summary
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct EvaluationReport {
    pub(crate) as_of: NaiveDate,
    pub(crate) outcome: PipelineOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) tenor_offers: Option<Vec<TenorOffer>>,
}

pub(crate) async fn run_evaluation(args: EvaluateArgs) -> Result<(), AppError> {
    let raw = std::fs::read_to_string(&args.applicant)?;
    let applicant: ApplicantFacts = serde_json::from_str(&raw)?;

    let tables = RuleTables::load(
        args.tables.ltv_rules.as_deref(),
        args.tables.vehicle_age_rules.as_deref(),
    )?;
    let service = InMemoryBackends::default().service(tables, Arc::new(EnvPolicyProvider::new()));
    let as_of = args.as_of.unwrap_or_else(|| Utc::now().date_naive());

    let report = evaluate(&service, applicant, as_of, args.tenor_offers).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        render_report(&report);
    }
    Ok(())
}

pub(crate) async fn evaluate(
    service: &UnderwritingService,
    applicant: ApplicantFacts,
    as_of: NaiveDate,
    with_tenor_offers: bool,
) -> Result<EvaluationReport, AppError> {
    let outcome = service.run_decision_pipeline(&applicant, as_of).await?;
    let tenor_offers = if with_tenor_offers {
        let request = TenorRequest::new(applicant);
        Some(service.tenor_offers(&request, as_of).await?)
    } else {
        None
    };

    Ok(EvaluationReport {
        as_of,
        outcome,
        tenor_offers,
    })
}

fn render_report(report: &EvaluationReport) {
    let outcome = &report.outcome;
    println!("Underwriting decision for {}", outcome.prospect_id.0);
    println!("  Evaluated as of {}", report.as_of);
    println!(
        "  Customer: {} / {:?} / {:?}",
        outcome.customer_status.label(),
        outcome.customer_segment,
        outcome.customer_type
    );
    println!(
        "  Final: {} ({}) from {:?}",
        outcome.decision.code(),
        outcome.decision.result().label(),
        outcome.decision.source()
    );
    let reason = outcome.decision.reason();
    if !reason.is_empty() {
        println!("  Reason: {reason}");
    }

    println!("  Stages:");
    for decision in &outcome.trail {
        println!(
            "    {:<28} {:<6} {:?}",
            decision.code().to_string(),
            decision.result().label(),
            decision.source()
        );
    }

    if let Some(offers) = &report.tenor_offers {
        if offers.is_empty() {
            println!("  No tenor qualifies for the requested amount");
        } else {
            println!("  Tenor offers:");
            for offer in offers {
                println!(
                    "    {:>2} months  LTV {:>3}%  max loan {:>15.0}  installment {:>12.0}",
                    offer.tenor, offer.ltv, offer.loan_amount_max, offer.installment_amount
                );
            }
        }
    }
}
