// 🌐 Web API - dashboard, per-person totals, JSON views over the ledger

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::db::{
    get_all_transactions, get_imports, get_person_transactions, get_transaction_stats,
    get_transactions_by_type, ImportRun, Transaction,
};
use crate::error::StorageError;
use crate::record::TransactionCategory;
use crate::stats::{person_summary, ChartData, PersonSummary, TypeStat};

const INDEX_TEMPLATE: &str = include_str!("../web/index.html");

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
}

impl AppState {
    pub fn new(conn: Connection) -> Self {
        AppState {
            db: Arc::new(Mutex::new(conn)),
        }
    }

    fn with_db<T>(&self, f: impl FnOnce(&Connection) -> Result<T, StorageError>) -> Result<T, ApiError> {
        let conn = self
            .db
            .lock()
            .map_err(|_| ApiError::Internal("database lock poisoned".to_string()))?;
        f(&conn).map_err(|e| ApiError::Internal(e.to_string()))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => {
                tracing::error!("Request failed: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        (
            status,
            Json(serde_json::json!({ "success": false, "error": message })),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct StatsResponse {
    total_transactions: i64,
    total_amount: f64,
    by_type: Vec<TypeStat>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK")
}

/// GET /api/transactions - All transactions, newest first
async fn get_transactions(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Transaction>>>, ApiError> {
    let transactions = state.with_db(get_all_transactions)?;
    Ok(ApiResponse::ok(transactions))
}

/// GET /api/stats - Count and total per type
async fn get_stats(State(state): State<AppState>) -> Result<Json<ApiResponse<StatsResponse>>, ApiError> {
    let by_type = state.with_db(get_transaction_stats)?;

    let stats = StatsResponse {
        total_transactions: by_type.iter().map(|s| s.count).sum(),
        total_amount: by_type.iter().map(|s| s.total).sum(),
        by_type,
    };

    Ok(ApiResponse::ok(stats))
}

/// GET /api/types/:category - Transactions of one type
async fn filter_by_type(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<ApiResponse<Vec<Transaction>>>, ApiError> {
    let category: TransactionCategory = category.parse().map_err(ApiError::BadRequest)?;
    let transactions = state.with_db(|conn| get_transactions_by_type(conn, category))?;

    Ok(ApiResponse::ok(transactions))
}

/// GET /api/imports - Import runs, most recent first
async fn list_imports(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<ImportRun>>>, ApiError> {
    let imports = state.with_db(get_imports)?;
    Ok(ApiResponse::ok(imports))
}

/// GET /person/:name - Totals per type for one counterparty
async fn person_transactions(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<PersonSummary>, ApiError> {
    let transactions = state.with_db(|conn| get_person_transactions(conn, &name))?;
    let summary = person_summary(&name, transactions.iter().map(|t| &t.record));

    Ok(Json(summary))
}

/// GET / - Dashboard
async fn dashboard(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let (transactions, stats) = state.with_db(|conn| {
        Ok((get_all_transactions(conn)?, get_transaction_stats(conn)?))
    })?;

    Ok(Html(render_dashboard(&transactions, &stats)))
}

// ============================================================================
// Rendering
// ============================================================================

fn render_dashboard(transactions: &[Transaction], stats: &[TypeStat]) -> String {
    let chart = ChartData::from(stats);

    let type_rows: String = stats
        .iter()
        .map(|s| {
            format!(
                "                <tr><td>{}</td><td>{}</td><td class=\"amount\">{:.2}</td></tr>\n",
                escape_html(s.category.label()),
                s.count,
                s.total
            )
        })
        .collect();

    let transaction_rows: String = transactions
        .iter()
        .map(|tx| {
            let record = &tx.record;
            format!(
                "                <tr class=\"{}\"><td>{}</td><td><a class=\"person\" href=\"/person/{}\">{}</a></td><td>{}</td><td class=\"amount\">{:.2}</td><td>{}</td><td class=\"amount\">{:.2}</td></tr>\n",
                css_class(record.category()),
                escape_html(&record.date),
                urlencoding::encode(record.name()),
                escape_html(record.name()),
                escape_html(record.category().label()),
                record.amount(),
                escape_html(&record.fields.phone_number),
                record.fields.balance_after
            )
        })
        .collect();

    INDEX_TEMPLATE
        .replace("{{total_count}}", &transactions.len().to_string())
        .replace("{{type_rows}}", type_rows.trim_end())
        .replace("{{transaction_rows}}", transaction_rows.trim_end())
        .replace("{{chart_labels}}", &json_array(&chart.labels))
        .replace("{{chart_counts}}", &json_array(&chart.counts))
        .replace("{{chart_totals}}", &json_array(&chart.totals))
}

fn json_array<T: Serialize>(values: &[T]) -> String {
    // Inside a <script> block; "</" must not close it
    serde_json::to_string(values)
        .unwrap_or_else(|_| "[]".to_string())
        .replace("</", "<\\/")
}

fn css_class(category: TransactionCategory) -> String {
    category.label().to_lowercase().replace(' ', "-")
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/transactions", get(get_transactions))
        .route("/stats", get(get_stats))
        .route("/types/:category", get(filter_by_type))
        .route("/imports", get(list_imports))
        .with_state(state.clone());

    Router::new()
        .route("/", get(dashboard))
        .route("/person/:name", get(person_transactions))
        .with_state(state)
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new("web"))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
