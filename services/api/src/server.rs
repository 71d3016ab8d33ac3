use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_prediction_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use listing_price::config::AppConfig;
use listing_price::error::AppError;
use listing_price::serving::{self, PredictionService};
use listing_price::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    config.model = args.model.apply(config.model);

    telemetry::init(&config.telemetry, config.environment)?;

    // Schema drift between training and serving must stop startup here.
    let context = serving::load(&config.model.model_path, &config.model.meta_path)?;
    let service = Arc::new(PredictionService::new(Arc::new(context)));

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let app = with_prediction_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        model_path = %config.model.model_path.display(),
        "listing price service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
