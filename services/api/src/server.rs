use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryBackends, RuleTables};
use crate::routes::with_underwriting_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use underwrite_ai::config::{AppConfig, EnvPolicyProvider};
use underwrite_ai::error::AppError;
use underwrite_ai::telemetry;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let tables = RuleTables::load(
        args.tables.ltv_rules.as_deref(),
        args.tables.vehicle_age_rules.as_deref(),
    )?;
    let backends = InMemoryBackends::default();
    let underwriting = Arc::new(backends.service(tables, Arc::new(EnvPolicyProvider::new())));

    let app = with_underwriting_routes(underwriting)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "underwriting service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
