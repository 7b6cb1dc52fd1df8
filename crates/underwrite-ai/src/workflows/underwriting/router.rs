use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::collaborators::UnderwritingError;
use super::domain::ApplicantFacts;
use super::pipeline::{PipelineError, PipelineStage, UnderwritingService};
use super::tenor::TenorRequest;

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionRequest {
    pub applicant: ApplicantFacts,
    /// Evaluation date; defaults to today (UTC).
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenorOffersRequest {
    #[serde(flatten)]
    pub request: TenorRequest,
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
struct MaxLoanAmountView {
    prospect_id: String,
    max_loan_amount: Option<f64>,
}

fn evaluation_date(as_of: Option<NaiveDate>) -> NaiveDate {
    as_of.unwrap_or_else(|| Utc::now().date_naive())
}

/// Router exposing the decision pipeline and the tenor evaluator.
pub fn underwriting_router(service: Arc<UnderwritingService>) -> Router {
    Router::new()
        .route("/api/v1/underwriting/decisions", post(decision_handler))
        .route("/api/v1/underwriting/tenor-offers", post(tenor_offers_handler))
        .route(
            "/api/v1/underwriting/max-loan-amount",
            post(max_loan_amount_handler),
        )
        .with_state(service)
}

pub(crate) async fn decision_handler(
    State(service): State<Arc<UnderwritingService>>,
    axum::Json(request): axum::Json<DecisionRequest>,
) -> Response {
    let today = evaluation_date(request.as_of);
    match service.run_decision_pipeline(&request.applicant, today).await {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn tenor_offers_handler(
    State(service): State<Arc<UnderwritingService>>,
    axum::Json(body): axum::Json<TenorOffersRequest>,
) -> Response {
    let today = evaluation_date(body.as_of);
    match service.tenor_offers(&body.request, today).await {
        Ok(offers) => {
            let payload = json!({
                "prospect_id": body.request.applicant.prospect_id.0,
                "offers": offers,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn max_loan_amount_handler(
    State(service): State<Arc<UnderwritingService>>,
    axum::Json(body): axum::Json<TenorOffersRequest>,
) -> Response {
    let today = evaluation_date(body.as_of);
    match service.max_loan_amount(&body.request, today).await {
        Ok(max_loan_amount) => {
            let view = MaxLoanAmountView {
                prospect_id: body.request.applicant.prospect_id.0.clone(),
                max_loan_amount,
            };
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(&error),
    }
}

pub(crate) fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineError::Stage {
            stage: PipelineStage::Persistence,
            ..
        } => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineError::Stage { source, .. } => match source {
            UnderwritingError::BadRequest(_) => StatusCode::BAD_REQUEST,
            UnderwritingError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            UnderwritingError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        },
    }
}

fn error_response(error: &PipelineError) -> Response {
    let payload = json!({
        "error": error.to_string(),
        "stage": error.stage(),
    });
    (status_for(error), axum::Json(payload)).into_response()
}
