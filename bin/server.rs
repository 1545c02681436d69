// Import Reconciliation - Web Server
// REST API over the duplicate detector and the transaction store

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use import_reconcile::logging::init_logging;
use import_reconcile::{
    detect_fuzzy_duplicates, export_csv_string, Config, CsvParser, DedupOptions, ImportParser,
    ImportSession, ReviewItem, SqliteStore, Transaction, TransactionRecord, TransactionStore,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

const ADDR: &str = "0.0.0.0:3000";

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<SqliteStore>>,
    options: DedupOptions,
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

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    let message = message.into();
    error!("{}", message);
    (status, Json(ApiResponse::<()>::err(message))).into_response()
}

fn lock_store(state: &AppState) -> Result<MutexGuard<'_, SqliteStore>, Response> {
    state
        .store
        .lock()
        .map_err(|_| failure(StatusCode::INTERNAL_SERVER_ERROR, "Transaction store lock poisoned"))
}

/// POST /api/duplicates body
#[derive(Deserialize)]
struct DuplicatesRequest {
    existing: Vec<TransactionRecord>,
    incoming: Vec<TransactionRecord>,
    #[serde(default)]
    options: Option<DedupOptions>,
}

/// POST /api/import/commit body
#[derive(Deserialize)]
struct CommitRequest {
    transactions: Vec<Transaction>,
}

#[derive(Serialize)]
struct CommitResponse {
    inserted: usize,
    skipped: usize,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/transactions - Get all stored transactions
async fn get_transactions(State(state): State<AppState>) -> Response {
    let store = match lock_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    match store.all_transactions() {
        Ok(transactions) => (StatusCode::OK, Json(ApiResponse::ok(transactions))).into_response(),
        Err(e) => failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error getting transactions: {}", e),
        ),
    }
}

/// POST /api/duplicates - Run the detector over two record lists.
/// Options in the body win over the server's configured defaults.
async fn find_duplicates(
    State(state): State<AppState>,
    Json(request): Json<DuplicatesRequest>,
) -> Response {
    let options = request.options.unwrap_or(state.options);
    let flagged: HashMap<String, String> =
        detect_fuzzy_duplicates(&request.existing, &request.incoming, Some(options));

    (StatusCode::OK, Json(ApiResponse::ok(flagged))).into_response()
}

/// POST /api/import/preview - Parse a CSV body and review it against the store
async fn preview_import(State(state): State<AppState>, body: String) -> Response {
    let incoming = match CsvParser::new().parse_str(&body) {
        Ok(incoming) => incoming,
        Err(e) => return failure(StatusCode::BAD_REQUEST, format!("Invalid CSV: {:#}", e)),
    };

    let store = match lock_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    match ImportSession::against_store(&*store, incoming, state.options) {
        Ok(session) => {
            let items: Vec<ReviewItem> = session.into_items();
            (StatusCode::OK, Json(ApiResponse::ok(items))).into_response()
        }
        Err(e) => failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error previewing import: {}", e),
        ),
    }
}

/// POST /api/import/commit - Store the transactions the user approved
async fn commit_import(
    State(state): State<AppState>,
    Json(request): Json<CommitRequest>,
) -> Response {
    let mut store = match lock_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    match store.insert_transactions(&request.transactions) {
        Ok(inserted) => {
            let skipped = request.transactions.len() - inserted;
            info!("Committed import: {} inserted, {} skipped", inserted, skipped);
            (
                StatusCode::OK,
                Json(ApiResponse::ok(CommitResponse { inserted, skipped })),
            )
                .into_response()
        }
        Err(e) => failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error committing import: {}", e),
        ),
    }
}

/// GET /api/export.csv - Download the store as CSV
async fn export_transactions(State(state): State<AppState>) -> Response {
    let store = match lock_store(&state) {
        Ok(store) => store,
        Err(response) => return response,
    };

    let csv = store
        .all_transactions()
        .and_then(|transactions| export_csv_string(&transactions));

    match csv {
        Ok(body) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"transactions.csv\""),
            ],
            body,
        )
            .into_response(),
        Err(e) => failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error exporting transactions: {}", e),
        ),
    }
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/transactions", get(get_transactions))
        .route("/duplicates", post(find_duplicates))
        .route("/import/preview", post(preview_import))
        .route("/import/commit", post(commit_import))
        .route("/export.csv", get(export_transactions))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional config path as the only argument
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    init_logging(config.log_format, "info")?;

    let store = SqliteStore::open(&config.database_path)?;
    info!("Store has {} transactions", store.count()?);

    let state = AppState {
        store: Arc::new(Mutex::new(store)),
        options: config.dedup,
    };

    let listener = tokio::net::TcpListener::bind(ADDR).await?;
    info!("🚀 Server running on http://{}", ADDR);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
