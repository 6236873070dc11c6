use crate::config::Config;
use axum::{
    Form, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use galleria_core::{
    AssetRecord, BlobStoreBuilder, CatalogDeps, CatalogEngine, DeleteImageOperationOutcome,
    DisabledTaggingOracle, ErrorKind, GalleriaError, GallerySort, OrphanReport,
    SqliteMetadataStore, TaggingOracle, UploadFile, VisionTaggingOracle,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Upper bound for request bodies that carry image bytes (upload batches and updates).
pub const MAX_IMAGE_BYTES: usize = 32 * 1024 * 1024;

pub struct ServerState {
    pub engine: CatalogEngine,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GalleryQuery {
    #[serde(default)]
    sort_by: Option<String>,
    #[serde(default)]
    order: Option<String>,
    #[serde(default)]
    diagnostics: bool,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Deserialize)]
struct RenameForm {
    #[serde(default)]
    new_name: String,
}

#[derive(Debug, Serialize)]
struct GalleryResponse {
    images: Vec<AssetRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    orphans: Option<OrphanReport>,
}

#[derive(Debug, Serialize)]
struct ImagesResponse {
    images: Vec<AssetRecord>,
}

#[derive(Debug, Serialize)]
struct RenameResponse {
    new_key: String,
    new_path: String,
    matched: usize,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    key: String,
    path: String,
    removed_records: usize,
    metadata_orphaned: bool,
}

fn ok<T: Serialize>(status: StatusCode, data: T) -> Response {
    let resp = ApiResponse {
        success: true,
        data: Some(data),
        error: None,
    };
    (status, axum::Json(resp)).into_response()
}

fn failure(status: StatusCode, message: String) -> Response {
    let resp = ApiResponse::<()> {
        success: false,
        data: None,
        error: Some(message),
    };
    (status, axum::Json(resp)).into_response()
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Inconsistent | ErrorKind::Config | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(error: GalleriaError) -> Response {
    let status = status_for(error.kind());
    if status.is_server_error() {
        tracing::error!("Request failed: {}", error);
    }
    failure(status, error.to_string())
}

/// Wire up every adapter named in `config` into a catalog engine.
pub fn build_engine(config: &Config) -> galleria_core::Result<CatalogEngine> {
    let store_cfg = &config.object_store;
    let mut builder = BlobStoreBuilder::new().backend(&store_cfg.backend);
    if let Some(root) = &store_cfg.root {
        builder = builder.root(root.clone());
    }
    if let Some(bucket) = &store_cfg.bucket {
        builder = builder.bucket(bucket);
    }
    if let Some(region) = &store_cfg.region {
        builder = builder.region(region);
    }
    if let Some(account) = &store_cfg.account {
        builder = builder.account(account);
    }
    if let Some(access_key) = &store_cfg.access_key {
        builder = builder.access_key(access_key);
    }
    if let Some(container) = &store_cfg.container {
        builder = builder.container(container);
    }
    if let Some(url) = &store_cfg.public_base_url {
        builder = builder.public_base_url(url);
    }
    let blobs = builder.build()?;

    let metadata = Arc::new(SqliteMetadataStore::new(
        &config.metadata.sqlite_path,
        Duration::from_millis(config.metadata.busy_timeout_ms),
    )?);
    tracing::info!("Metadata store at {}", config.metadata.sqlite_path.display());

    let tagger: Arc<dyn TaggingOracle> = match &config.tagging {
        Some(tagging) => {
            let oracle = VisionTaggingOracle::new(
                &tagging.endpoint,
                tagging.subscription_key.clone(),
                Duration::from_millis(tagging.timeout_ms),
            )?;
            tracing::info!("Tagging via {}", oracle.analyze_url());
            Arc::new(oracle)
        }
        None => {
            tracing::warn!("No tagging endpoint configured; images will be catalogued without tags");
            Arc::new(DisabledTaggingOracle)
        }
    };

    Ok(CatalogEngine::new(CatalogDeps {
        blobs,
        metadata,
        tagger,
        timeouts: config.timeouts.to_timeouts(),
    }))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }

    let mut allowed = Vec::new();
    for origin in allowed_origins {
        match HeaderValue::from_str(origin) {
            Ok(value) => allowed.push(value),
            Err(_) => tracing::error!("Invalid CORS origin {:?}, ignoring", origin),
        }
    }
    cors.allow_origin(AllowOrigin::list(allowed))
}

pub fn router(state: Arc<ServerState>, cors_allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/gallery", get(gallery_handler))
        .route("/search", get(search_handler))
        .route(
            "/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES)),
        )
        .route("/rename/:old_key", post(rename_handler))
        .route("/delete/:key", delete(delete_handler))
        .route(
            "/update/:key",
            put(update_handler).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES)),
        )
        .route("/images/:id/search-count", post(increment_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_allowed_origins))
        .with_state(state)
}

pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let engine = build_engine(&config)?;
    let state = Arc::new(ServerState { engine });
    let app = router(state, &config.server.cors_allowed_origins);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    tracing::info!("Server listening on {}", config.server.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, axum::Json(response))
}

async fn gallery_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<GalleryQuery>,
) -> Response {
    let sort = match GallerySort::parse(query.sort_by.as_deref(), query.order.as_deref()) {
        Ok(sort) => sort,
        Err(error) => return error_response(error),
    };

    match state.engine.list_gallery(sort, query.diagnostics).await {
        Ok(result) => ok(
            StatusCode::OK,
            GalleryResponse {
                images: result.images,
                orphans: result.orphans,
            },
        ),
        Err(error) => error_response(error),
    }
}

async fn search_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<SearchQuery>,
) -> Response {
    match state.engine.search(&query.q).await {
        Ok(images) => ok(StatusCode::OK, ImagesResponse { images }),
        Err(error) => error_response(error),
    }
}

async fn upload_handler(State(state): State<Arc<ServerState>>, mut multipart: Multipart) -> Response {
    let mut files = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(error) => return failure(StatusCode::BAD_REQUEST, error.to_string()),
        };
        if field.name() != Some("image") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        match field.bytes().await {
            Ok(bytes) => files.push(UploadFile::new(filename, bytes)),
            Err(error) => return failure(StatusCode::BAD_REQUEST, error.to_string()),
        }
    }

    match state.engine.upload(files).await {
        Ok(images) => ok(StatusCode::CREATED, ImagesResponse { images }),
        Err(error) => error_response(error),
    }
}

async fn rename_handler(
    State(state): State<Arc<ServerState>>,
    Path(old_key): Path<String>,
    Form(form): Form<RenameForm>,
) -> Response {
    match state.engine.rename(&old_key, &form.new_name).await {
        Ok(result) => ok(
            StatusCode::OK,
            RenameResponse {
                new_key: result.new_key,
                new_path: result.new_path,
                matched: result.matched,
            },
        ),
        Err(error) => error_response(error),
    }
}

async fn delete_handler(State(state): State<Arc<ServerState>>, Path(key): Path<String>) -> Response {
    match state.engine.delete(&key).await {
        Ok(DeleteImageOperationOutcome::Deleted {
            key,
            path,
            removed_records,
            metadata_orphaned,
        }) => ok(
            StatusCode::OK,
            DeleteResponse {
                key,
                path,
                removed_records,
                metadata_orphaned,
            },
        ),
        Ok(DeleteImageOperationOutcome::NotFound) => {
            failure(StatusCode::NOT_FOUND, format!("{} not found", key))
        }
        Err(error) => error_response(error),
    }
}

async fn update_handler(
    State(state): State<Arc<ServerState>>,
    Path(key): Path<String>,
    body: Bytes,
) -> Response {
    match state.engine.update(&key, body).await {
        Ok(record) => ok(StatusCode::OK, record),
        Err(error) => error_response(error),
    }
}

async fn increment_handler(State(state): State<Arc<ServerState>>, Path(id): Path<i64>) -> Response {
    match state.engine.increment_search_count(id).await {
        Ok(record) => ok(StatusCode::OK, record),
        Err(error) => error_response(error),
    }
}
