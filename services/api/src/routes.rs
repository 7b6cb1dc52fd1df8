use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use underwrite_ai::workflows::underwriting::{underwriting_router, UnderwritingService};

pub(crate) fn with_underwriting_routes(service: Arc<UnderwritingService>) -> axum::Router {
    underwriting_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{InMemoryBackends, RuleTables};
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;
    use underwrite_ai::config::PolicyConfig;

    fn app(ready: bool) -> axum::Router {
        let tables = RuleTables::load(None, None).expect("bundled tables load");
        let service = InMemoryBackends::default().service(tables, Arc::new(PolicyConfig::default()));
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        state.readiness.store(ready, Ordering::Release);

        with_underwriting_routes(Arc::new(service)).layer(Extension(state))
    }

    async fn get(app: axum::Router, uri: &str) -> StatusCode {
        app.oneshot(Request::get(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response")
            .status()
    }

    #[tokio::test]
    async fn health_is_always_ok() {
        assert_eq!(get(app(false), "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_the_flag() {
        assert_eq!(get(app(false), "/ready").await, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(get(app(true), "/ready").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_render_as_plain_text() {
        let response = app(true)
            .oneshot(Request::get("/metrics").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }

    #[tokio::test]
    async fn underwriting_routes_are_mounted() {
        let response = app(true)
            .oneshot(
                Request::post("/api/v1/underwriting/decisions")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{\"applicant\": {}}"))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
