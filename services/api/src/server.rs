use crate::cli::ServeArgs;
use crate::infra::{build_service, AppState};
use crate::routes::with_service_routes;
use crate::scheduler;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use vetting::config::AppConfig;
use vetting::error::AppError;
use vetting::telemetry;
use vetting::workflows::background_checks::{Clock, SystemClock};

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

    let service = Arc::new(build_service(Arc::new(SystemClock) as Arc<dyn Clock>));
    if config.scheduler.seed_defaults {
        service.seed_defaults()?;
    }

    let app = with_service_routes(Arc::clone(&service))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let sweeps = scheduler::spawn(Arc::clone(&service), &config.scheduler);
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "background check service ready");

    let served = axum::serve(listener, app).await;
    sweeps.abort();
    served?;
    Ok(())
}
