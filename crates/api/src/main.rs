use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use advisor_core::config::Settings;
use advisor_core::domain::recommendation::{
    AllInvestorsStocks, SingleAction, UserRecommendation, UserStockRecommendations,
};
use advisor_core::error::PipelineError;
use advisor_core::orchestrator::Orchestrator;
use advisor_core::storage::uploads;

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let orchestrator = match Orchestrator::from_settings(&settings) {
        Ok(orchestrator) => Some(Arc::new(orchestrator)),
        Err(e) => {
            let err = anyhow::Error::new(e);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "LLM client unavailable; starting API in degraded mode");
            None
        }
    };

    let state = AppState {
        data_dir: settings.data_dir.clone(),
        orchestrator,
    };

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, data_dir = %settings.data_dir.display(), "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/upload/", post(upload))
        .route("/predict/", post(predict))
        .route("/recommendations/users", post(per_user))
        .route("/recommendations/stocks", post(per_stock))
        .route("/recommendations/all", post(all_investors_stocks))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    data_dir: PathBuf,
    /// `None` when the LLM client could not be configured.
    orchestrator: Option<Arc<Orchestrator>>,
}

impl AppState {
    fn orchestrator(&self) -> Result<&Orchestrator, ApiError> {
        self.orchestrator.as_deref().ok_or_else(|| ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "recommendation service is not configured".to_string(),
        })
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let status = match &e {
            PipelineError::LlmTransport { .. } | PipelineError::LlmResponseFormat { .. } => {
                StatusCode::BAD_GATEWAY
            }
            PipelineError::Ingestion { .. } | PipelineError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = e.to_string();
        let err = anyhow::Error::new(e);
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, %status, "recommendation request failed");
        Self { status, message }
    }
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    info: String,
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let bad_request = |message: String| ApiError {
        status: StatusCode::BAD_REQUEST,
        message,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let raw_name = field.file_name().unwrap_or_default().to_string();
        let name = uploads::sanitize_file_name(&raw_name)
            .ok_or_else(|| bad_request(format!("invalid file name: {raw_name:?}")))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {e}")))?;

        uploads::save_upload(&state.data_dir, &name, &bytes)
            .await
            .map_err(|e| {
                sentry_anyhow::capture_anyhow(&e);
                ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: format!("{e:#}"),
                }
            })?;

        return Ok(Json(UploadResponse {
            info: format!("file '{name}' saved"),
        }));
    }

    Err(bad_request("multipart field 'file' is required".to_string()))
}

async fn predict(State(state): State<AppState>) -> Result<Json<SingleAction>, ApiError> {
    Ok(Json(state.orchestrator()?.compute_single_action().await?))
}

async fn per_user(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserRecommendation>>, ApiError> {
    Ok(Json(state.orchestrator()?.compute_per_user().await?))
}

async fn per_stock(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserStockRecommendations>>, ApiError> {
    Ok(Json(state.orchestrator()?.compute_per_stock().await?))
}

async fn all_investors_stocks(
    State(state): State<AppState>,
) -> Result<Json<AllInvestorsStocks>, ApiError> {
    Ok(Json(state.orchestrator()?.compute_all_investors_stocks().await?))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
