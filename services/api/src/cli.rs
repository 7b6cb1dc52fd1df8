use crate::evaluate::{run_evaluation, EvaluateArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use underwrite_ai::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Underwriting Decision Service",
    about = "Run the vehicle-loan underwriting service or evaluate a single applicant",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run one applicant JSON document through the decision pipeline
    Evaluate(EvaluateArgs),
}

/// CSV rule tables shared by every command.
#[derive(Args, Debug, Default, Clone)]
pub(crate) struct RuleTableArgs {
    /// LTV rule table (CSV); the bundled sample table is used when omitted
    #[arg(long)]
    pub(crate) ltv_rules: Option<PathBuf>,
    /// Vehicle-age rule table (CSV); the bundled sample table is used when omitted
    #[arg(long)]
    pub(crate) vehicle_age_rules: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    #[command(flatten)]
    pub(crate) tables: RuleTableArgs,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Evaluate(args) => run_evaluation(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["underwrite-ai-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn evaluate_accepts_tables_and_date() {
        let cli = Cli::try_parse_from([
            "underwrite-ai-api",
            "evaluate",
            "--applicant",
            "applicant.json",
            "--ltv-rules",
            "ltv.csv",
            "--as-of",
            "2025-06-01",
            "--tenor-offers",
        ])
        .expect("parses");

        match cli.command {
            Some(Command::Evaluate(args)) => {
                assert_eq!(args.applicant, PathBuf::from("applicant.json"));
                assert_eq!(args.tables.ltv_rules, Some(PathBuf::from("ltv.csv")));
                assert!(args.tables.vehicle_age_rules.is_none());
                assert_eq!(
                    args.as_of,
                    Some(chrono::NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date"))
                );
                assert!(args.tenor_offers);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
