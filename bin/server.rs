// Credit Union Compensation Analysis - JSON API
// Read-only endpoints over the workbook for the visualization frontend

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use cu_comp_analysis::{
    cleaned_records_for, find_institution_by_name, latest_report, list_events, list_institutions, logging,
    setup_workbook, ComparisonMode, Config, InstitutionSummary,
};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

impl AppState {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, Response> {
        self.db.lock().map_err(|_| {
            error!("workbook connection mutex poisoned");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "workbook unavailable")
        })
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::ok(data))).into_response()
}

fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(ApiResponse::<()>::err(message))).into_response()
}

fn internal(context: &str, e: anyhow::Error) -> Response {
    error!(error = %e, "{}", context);
    failure(StatusCode::INTERNAL_SERVER_ERROR, context)
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/institutions - One summary per credit union
async fn get_institutions(State(state): State<AppState>) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    match list_institutions(&conn) {
        Ok(institutions) => {
            let summaries: Vec<InstitutionSummary> = institutions.iter().map(InstitutionSummary::from).collect();
            success(summaries)
        }
        Err(e) => internal("Error listing institutions", e),
    }
}

/// GET /api/institutions/:ein/records - Analysed records of one institution
async fn get_institution_records(State(state): State<AppState>, Path(ein): Path<String>) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    match cleaned_records_for(&conn, &ein) {
        Ok(records) if records.is_empty() => {
            failure(StatusCode::NOT_FOUND, &format!("No analysed records for EIN {}", ein))
        }
        Ok(records) => success(records),
        Err(e) => internal("Error reading records", e),
    }
}

/// GET /api/institutions/by-name/:name - Lookup by (url-encoded) display name
async fn get_institution_by_name(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    // Decode URL-encoded name
    let decoded = urlencoding::decode(&name)
        .map(|n| n.into_owned())
        .unwrap_or(name);

    match find_institution_by_name(&conn, &decoded) {
        Ok(Some(institution)) => success(institution),
        Ok(None) => failure(StatusCode::NOT_FOUND, &format!("Unknown institution '{}'", decoded)),
        Err(e) => internal("Error looking up institution", e),
    }
}

/// GET /api/reports/:mode - Latest flag_split or windowed report
async fn get_report(State(state): State<AppState>, Path(mode): Path<String>) -> Response {
    let Some(mode) = ComparisonMode::parse(&mode) else {
        return failure(StatusCode::BAD_REQUEST, "mode must be flag_split or windowed");
    };

    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    match latest_report(&conn, mode) {
        Ok(Some(report)) => success(report),
        Ok(None) => failure(StatusCode::NOT_FOUND, "No analysis saved yet"),
        Err(e) => internal("Error reading report", e),
    }
}

/// GET /api/events - Recent imports and analysis runs
async fn get_events(State(state): State<AppState>) -> Response {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    match list_events(&conn, 50) {
        Ok(events) => success(events),
        Err(e) => internal("Error reading audit trail", e),
    }
}

fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/institutions", get(get_institutions))
        .route("/institutions/by-name/:name", get(get_institution_by_name))
        .route("/institutions/:ein/records", get(get_institution_records))
        .route("/reports/:mode", get(get_report))
        .route("/events", get(get_events))
        .with_state(state)
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os("CU_COMP_CONFIG").map(std::path::PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    logging::init_from_config(&config.logging);

    println!("🌐 Credit Union Compensation Analysis - JSON API");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db_path = &config.paths.database;
    if !db_path.exists() {
        eprintln!("❌ Workbook not found at {:?}", db_path);
        eprintln!("   Run: cu-comp import --ceo <csv> && cu-comp analyze");
        std::process::exit(1);
    }

    let conn = Connection::open(db_path)?;
    setup_workbook(&conn)?;
    println!("✓ Workbook opened: {:?}", db_path);

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    let app = Router::new()
        .nest("/api", api_routes(state))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = std::env::var("CU_COMP_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(%addr, "server listening");
    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/institutions", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;
    Ok(())
}
