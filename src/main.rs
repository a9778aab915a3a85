//! Parcel reception ledger - label intake, recipient matching, daily
//! rotation, and batched arrival notifications.

mod classify;
mod config;
mod directory;
mod intake;
mod ledger;
mod notify;
mod ocr;
mod record;
mod store;

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use directory::RecipientDirectory;
use intake::IntakePipeline;
use ledger::{Ledger, LedgerError, StoreSelector};
use notify::SmtpMailer;
use record::ParcelRecord;

/// Application state shared across handlers. The ledger sits behind a
/// mutex so overlapping requests serialize their read-modify-write cycles.
#[derive(Clone)]
struct AppState {
    ledger: Arc<Mutex<Ledger>>,
    intake: Arc<IntakePipeline>,
    mailer: Option<Arc<SmtpMailer>>,
    config: Arc<Config>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parcel_intake=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    std::fs::create_dir_all(&config.upload_dir)?;
    std::fs::create_dir_all(&config.archive_dir)?;

    // Shared HTTP client; carries the OCR request timeout.
    let client = reqwest::Client::builder()
        .timeout(config.ocr.timeout)
        .build()?;

    let chain = ocr::OcrChain::from_config(&config.ocr, client);
    info!("OCR providers configured: {:?}", chain.provider_names());

    let directory = RecipientDirectory::new(&config.contact_file);
    let ledger = Ledger::new(
        &config.data_file,
        &config.archive_dir,
        &config.marker_file,
        directory,
    );
    ledger.check_day_boundary()?;

    let mailer = match &config.smtp {
        Some(smtp) => Some(Arc::new(SmtpMailer::from_config(smtp)?)),
        None => {
            warn!("SMTP not configured; notifications are disabled");
            None
        }
    };

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        ledger: Arc::new(Mutex::new(ledger)),
        intake: Arc::new(IntakePipeline::new(chain)),
        mailer,
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/intake", post(intake_images))
        .route("/records", get(list_records).post(add_blank_record))
        .route("/records/:serial", post(update_record).delete(delete_record))
        .route("/records/:serial/picked/:status", post(set_pickup_status))
        .route("/notifications", post(send_notifications))
        .route("/archives", get(list_archives))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB of label photos
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

#[derive(serde::Deserialize)]
struct ArchiveQuery {
    archive: Option<String>,
}

impl ArchiveQuery {
    fn selector(&self) -> StoreSelector {
        match self.archive.as_deref() {
            Some(name) if !name.is_empty() => StoreSelector::Archive(name.to_string()),
            _ => StoreSelector::Active,
        }
    }
}

/// Upload one or more label images; each is persisted, extracted,
/// classified, and appended to the ledger.
async fn intake_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<ParcelRecord>>, (StatusCode, String)> {
    let mut stored = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)))?
    {
        if field.name() != Some("images") {
            continue;
        }
        let original = field.file_name().unwrap_or("label").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read upload: {}", e)))?;
        if data.is_empty() {
            continue;
        }

        let filename = sanitize_filename(&original);
        let path = state.config.upload_dir.join(&filename);
        tokio::fs::write(&path, &data).await.map_err(|e| {
            error!("failed to persist upload {}: {}", path.display(), e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to persist upload: {}", e),
            )
        })?;
        info!("Received label image {} ({} bytes)", filename, data.len());

        // Extraction failure is not fatal — a mostly-blank record is
        // appended so the parcel still gets logged.
        let fields = state.intake.process(&path).await;

        let ledger = state.ledger.lock().await;
        let record = ledger.append(&fields).map_err(|e| {
            error!("failed to record parcel: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to record parcel: {}", e),
            )
        })?;
        stored.push(record);
    }

    if stored.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No images uploaded".to_string()));
    }
    Ok(Json(stored))
}

/// List the active ledger or a named archive.
async fn list_records(
    State(state): State<AppState>,
    Query(query): Query<ArchiveQuery>,
) -> Result<Json<Vec<ParcelRecord>>, (StatusCode, String)> {
    let ledger = state.ledger.lock().await;
    ledger
        .records(&query.selector())
        .map(Json)
        .map_err(ledger_status)
}

/// Manual blank-row insert.
async fn add_blank_record(
    State(state): State<AppState>,
) -> Result<Json<ParcelRecord>, (StatusCode, String)> {
    let ledger = state.ledger.lock().await;
    ledger.append_blank().map(Json).map_err(|e| {
        error!("failed to insert blank row: {:#}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

/// Merge caller-supplied column edits into one record.
async fn update_record(
    State(state): State<AppState>,
    Path(serial): Path<u32>,
    Query(query): Query<ArchiveQuery>,
    Json(changes): Json<HashMap<String, String>>,
) -> Result<Json<ParcelRecord>, (StatusCode, String)> {
    let ledger = state.ledger.lock().await;
    ledger
        .update(serial, &changes, &query.selector())
        .map(Json)
        .map_err(ledger_status)
}

/// Delete one record and re-index the survivors.
async fn delete_record(
    State(state): State<AppState>,
    Path(serial): Path<u32>,
    Query(query): Query<ArchiveQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let ledger = state.ledger.lock().await;
    ledger
        .delete(serial, &query.selector())
        .map(|_| Json(serde_json::json!({ "message": format!("Record {} deleted.", serial) })))
        .map_err(ledger_status)
}

/// Set the pickup field verbatim.
async fn set_pickup_status(
    State(state): State<AppState>,
    Path((serial, status)): Path<(u32, String)>,
    Query(query): Query<ArchiveQuery>,
) -> Result<Json<ParcelRecord>, (StatusCode, String)> {
    let ledger = state.ledger.lock().await;
    ledger
        .set_pickup_status(serial, &status, &query.selector())
        .map(Json)
        .map_err(ledger_status)
}

/// Send one batched message per recipient with pending parcels.
async fn send_notifications(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let Some(mailer) = &state.mailer else {
        return Ok(Json(serde_json::json!({
            "message": "Mail transport not configured; nothing sent.",
            "sent": [],
            "failures": [],
        })));
    };

    let ledger = state.ledger.lock().await;
    let mut rows = ledger
        .records(&StoreSelector::Active)
        .map_err(ledger_status)?;

    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let report = notify::send_pending_batch(&mut rows, mailer.as_ref(), &now).await;

    // One persist for the whole batch.
    ledger
        .write_back(&rows, &StoreSelector::Active)
        .map_err(ledger_status)?;

    Ok(Json(serde_json::json!({
        "message": format!("Sent notifications for {} parcel(s).", report.sent.len()),
        "sent": report.sent,
        "failures": report.failures,
    })))
}

/// List archive snapshots, newest first.
async fn list_archives(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, (StatusCode, String)> {
    let ledger = state.ledger.lock().await;
    ledger.archives().map(Json).map_err(|e| {
        error!("failed to list archives: {:#}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

// ============================================================================
// Helper functions
// ============================================================================

fn ledger_status(err: LedgerError) -> (StatusCode, String) {
    match &err {
        LedgerError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        LedgerError::BadSelector(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        LedgerError::Store(e) => {
            error!("store failure: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

/// Keep only a safe subset of the client-supplied filename; the path
/// component and anything exotic are dropped. Falls back to a generated
/// name when nothing survives.
fn sanitize_filename(original: &str) -> String {
    let cleaned: String = std::path::Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        format!("upload-{}.img", uuid::Uuid::new_v4().simple())
    } else {
        cleaned
    }
}
