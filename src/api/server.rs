//! API Server Module
//!
//! This module implements the HTTP endpoints for listing, uploading, opening,
//! printing and deleting batches. Handlers only shape requests and responses;
//! all persistence goes through the `Catalog`.

use super::errors::bad_request;
use crate::{
    BatchRecord, BatchSummary, BlobLocator, GridSettings, NewImage, StoreError,
    catalog::Catalog, config::Config,
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tracing::{debug, info};

/// Images never change once written
const IMAGE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
const THUMBNAIL_CACHE_CONTROL: &str = "public, max-age=31536000";

const DEFAULT_TITLE: &str = "Untitled";
const DEFAULT_OBJECT_POSITION: [f64; 2] = [50.0, 50.0];

/// Shared application state that is accessible across all request handlers
///
/// Holds the `catalog`, which is cheap to clone and shares one repository
/// (and one summary index) between concurrent requests.
#[derive(Clone)]
pub struct AppState {
    catalog: Catalog,
}

/// The main API server struct
///
/// Encapsulates the server configuration and application state.
pub struct Server {
    config: Config,
    state: AppState,
}

impl Server {
    /// Creates a new API server instance
    ///
    /// # Arguments
    /// * `config` - Server configuration (host, port, upload limit)
    /// * `catalog` - Batch operations backing the endpoints
    pub fn new(config: Config, catalog: Catalog) -> Self {
        Self {
            config,
            state: AppState { catalog },
        }
    }

    /// Starts the API server and begins listening for incoming requests
    ///
    /// This method:
    /// 1. Builds the batch router with the configured upload limit
    /// 2. Binds it to the configured host and port
    /// 3. Serves requests until the server shuts down
    ///
    /// # Returns
    /// `Ok(())` when the server shuts down, or an error if binding fails
    pub async fn start(self) -> anyhow::Result<()> {
        // Create the router with every batch endpoint
        let app = router(self.state.catalog, self.config.api.max_upload_bytes);

        // Format the listening address from config
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);
        info!("API server listening on {}", addr);

        // Bind to the TCP address and start serving
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Build the router for all batch endpoints
///
/// # Arguments
/// * `catalog` - Batch operations backing the handlers
/// * `max_upload_bytes` - Request body limit, sized for multipart uploads
pub fn router(catalog: Catalog, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/batches", get(list_batches).post(create_batch))
        .route(
            "/api/batches/:id",
            get(get_batch).patch(update_batch).delete(delete_batch),
        )
        .route("/api/batches/:id/images/:filename", get(get_image))
        .route("/api/batches/:id/thumbnail", get(get_thumbnail))
        .layer(ServiceBuilder::new().layer(DefaultBodyLimit::max(max_upload_bytes)))
        .with_state(AppState { catalog })
}

/// Upload metadata sent in the `config` multipart field
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest {
    title: Option<String>,
    grid: GridSettings,
    #[serde(default)]
    images: Vec<PlacementRequest>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlacementRequest {
    object_position: Option<[f64; 2]>,
    rotation: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CreatedResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    config: BatchRecord,
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PrintedRequest {
    printed: bool,
}

/// `GET /api/batches`: summaries of every batch, newest first
async fn list_batches(
    State(state): State<AppState>,
) -> Result<Json<Vec<BatchSummary>>, StoreError> {
    let mut summaries = state.catalog.list_summaries().await?;
    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(summaries))
}

/// `POST /api/batches`: multipart upload of a new batch
///
/// The body carries one `config` JSON field plus `images` file fields in
/// print order. Placement entries are matched to files by position; files
/// without an entry get a centered focal point and no rotation.
///
/// # Returns
/// `201 Created` with `{"id": ...}`, or `400` for a malformed upload
async fn create_batch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, StoreError> {
    // Collect the config document and the files; unknown fields are skipped
    let mut request: Option<CreateRequest> = None;
    let mut files: Vec<(Option<String>, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("config") => {
                let text = field.text().await.map_err(bad_request)?;
                request = Some(serde_json::from_str(&text).map_err(bad_request)?);
            }
            Some("images") => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_request)?;
                files.push((file_name, bytes.to_vec()));
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    // Pair every file with its placement entry
    let mut request = request.ok_or_else(|| bad_request("missing config"))?;
    let mut placements = std::mem::take(&mut request.images).into_iter();
    let images = files
        .into_iter()
        .map(|(original_name, bytes)| {
            let placement = placements.next().unwrap_or_default();
            NewImage {
                bytes,
                original_name,
                object_position: placement.object_position.unwrap_or(DEFAULT_OBJECT_POSITION),
                rotation: placement.rotation.unwrap_or(0),
            }
        })
        .collect();

    // Validation of grid, positions and rotations happens in the repository
    let title = request
        .title
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let id = state
        .catalog
        .create_batch(&title, request.grid, images)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse { id: id.to_string() }),
    ))
}

/// `GET /api/batches/:id`: open a batch, recording the open
///
/// Responds with the stored record under `config` and one image URL per
/// placement, in print order.
async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BatchResponse>, StoreError> {
    let (config, locators) = state.catalog.get_batch(&id).await?;
    Ok(Json(BatchResponse {
        config,
        images: locators.iter().map(image_url).collect(),
    }))
}

/// `PATCH /api/batches/:id` with `{"printed": bool}`
async fn update_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PrintedRequest>,
) -> Result<StatusCode, StoreError> {
    state.catalog.mark_printed(&id, body.printed).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/batches/:id`: remove the batch and its images
async fn delete_batch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, StoreError> {
    state.catalog.delete_batch(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/batches/:id/images/:filename`: raw image bytes
///
/// Stored images are immutable, so responses may be cached indefinitely.
async fn get_image(
    State(state): State<AppState>,
    Path((id, filename)): Path<(String, String)>,
) -> Result<impl IntoResponse, StoreError> {
    let bytes = state.catalog.get_blob(&id, &filename).await?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type(&filename)),
            (header::CACHE_CONTROL, IMAGE_CACHE_CONTROL),
        ],
        bytes,
    ))
}

/// `GET /api/batches/:id/thumbnail`: the first image, without opening the batch
async fn get_thumbnail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, StoreError> {
    let (filename, bytes) = state.catalog.thumbnail(&id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type(&filename)),
            (header::CACHE_CONTROL, THUMBNAIL_CACHE_CONTROL),
        ],
        bytes,
    ))
}

/// URL under which the image endpoint serves a blob
pub fn image_url(locator: &BlobLocator) -> String {
    format!(
        "/api/batches/{}/images/{}",
        locator.batch_id, locator.filename
    )
}

/// Content type for a stored image, by extension
pub fn content_type(filename: &str) -> &'static str {
    let format = std::path::Path::new(filename)
        .extension()
        .and_then(ImageFormat::from_extension);
    match format {
        Some(
            format @ (ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif | ImageFormat::WebP),
        ) => format.to_mime_type(),
        _ => "image/jpeg",
    }
}
