use std::{path::PathBuf, sync::Arc};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use image::RgbImage;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    analysis::{AnalysisTask, MapAnalyzer},
    error::{GeogenieError, Result},
    image_io,
    messages::{AnalysisResponse, ErrorDetail, PingResponse, VariationsResponse},
};

// defaults for the server
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Name of the multipart field holding the image.
const UPLOAD_FIELD: &str = "file";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Where to dump the last uploaded map, if anywhere.
    pub debug_image_path: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            debug_image_path: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub struct AppState {
    pub analyzer: MapAnalyzer,
    pub debug_image_path: Option<PathBuf>,
    pub map_center: AnalysisTask,
    pub detailed: AnalysisTask,
    pub variations: Vec<AnalysisTask>,
}

impl AppState {
    pub fn new(analyzer: MapAnalyzer, debug_image_path: Option<PathBuf>) -> Self {
        Self {
            analyzer,
            debug_image_path,
            map_center: AnalysisTask::map_center(),
            detailed: AnalysisTask::map_center_detailed(),
            variations: AnalysisTask::variations(),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    MissingFile,
    /// The multipart body could not be read; `status` comes from axum.
    BadUpload { status: StatusCode, detail: String },
    Internal(GeogenieError),
}

impl From<MultipartRejection> for ApiError {
    fn from(e: MultipartRejection) -> Self {
        ApiError::BadUpload {
            status: e.status(),
            detail: e.body_text(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::BadUpload {
            status: e.status(),
            detail: e.body_text(),
        }
    }
}

impl From<GeogenieError> for ApiError {
    fn from(e: GeogenieError) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::MissingFile => (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("missing multipart field `{UPLOAD_FIELD}`"),
            ),
            ApiError::BadUpload { status, detail } => {
                log::warn!("Rejected upload ({status}): {detail}");
                (status, detail)
            }
            ApiError::Internal(e) => {
                log::error!("Error analyzing map: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(ErrorDetail { detail })).into_response()
    }
}

async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Bytes, ApiError> {
    let mut multipart = multipart?;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            return Ok(field.bytes().await?);
        }
    }
    Err(ApiError::MissingFile)
}

/// Decodes the upload off the runtime and optionally keeps a copy on disk.
async fn load_upload(bytes: Bytes, debug_path: Option<PathBuf>) -> Result<RgbImage, ApiError> {
    let image = tokio::task::spawn_blocking(move || -> Result<RgbImage> {
        let image = image_io::decode_rgb(&bytes)?;
        if let Some(path) = debug_path {
            if let Err(e) = image_io::save_debug_image(&image, &path) {
                log::warn!("Could not save debug image to {}: {e}", path.display());
            }
        }
        Ok(image)
    })
    .await
    .map_err(GeogenieError::from)??;
    Ok(image)
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let bytes = read_upload(multipart).await?;
    log::info!("Received image for analysis ({} bytes)", bytes.len());

    let image = load_upload(bytes, None).await?;
    let analysis = state.analyzer.analyze(image, &state.detailed).await?;

    Ok(Json(AnalysisResponse {
        success: true,
        analysis,
    }))
}

async fn analyze_map(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let bytes = read_upload(multipart).await?;
    log::info!("Received map image for analysis ({} bytes)", bytes.len());

    let image = load_upload(bytes, state.debug_image_path.clone()).await?;
    let analysis = state.analyzer.analyze(image, &state.map_center).await?;
    log::info!("Final response: {analysis}");

    Ok(Json(AnalysisResponse {
        success: true,
        analysis,
    }))
}

async fn analyze_map_variations(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<VariationsResponse>, ApiError> {
    let bytes = read_upload(multipart).await?;
    log::info!("Received map image for {} prompts", state.variations.len());

    let image = load_upload(bytes, state.debug_image_path.clone()).await?;
    let analyses = state
        .analyzer
        .analyze_all(&image, &state.variations)
        .await?;

    Ok(Json(VariationsResponse {
        success: true,
        analyses,
    }))
}

async fn ping() -> Json<PingResponse> {
    Json(PingResponse::ok())
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Welcome to Geogenie!" }))
        .route("/ping", get(ping))
        .route("/analyze", post(analyze))
        .route("/analyze-map", post(analyze_map))
        .route("/analyze-map/variations", post(analyze_map_variations))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

/// Binds `config.addr()` and serves until Ctrl+C.
pub async fn serve(config: &ServerConfig, analyzer: MapAnalyzer) -> Result<()> {
    let addr = config.addr();
    log::info!("Serving model {}", analyzer.engine().model_name());
    let state = Arc::new(AppState::new(analyzer, config.debug_image_path.clone()));
    let app = router(state, config.max_upload_bytes);

    log::info!("🚀 Starting the server");
    log::info!("🔥 Listening on: {}", addr);
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutting down");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ModelError, prompt::strip_image_placeholder, testing::ScriptedModel};
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    const BOUNDARY: &str = "geogenie-test-boundary";

    fn app(model: ScriptedModel, debug_image_path: Option<PathBuf>) -> Router {
        app_with_limit(model, debug_image_path, DEFAULT_MAX_UPLOAD_BYTES)
    }

    fn app_with_limit(
        model: ScriptedModel,
        debug_image_path: Option<PathBuf>,
        max_upload_bytes: usize,
    ) -> Router {
        let state = AppState::new(MapAnalyzer::from_model(model), debug_image_path);
        router(Arc::new(state), max_upload_bytes)
    }

    fn png() -> Vec<u8> {
        image_io::encode_png(&RgbImage::new(24, 12)).unwrap()
    }

    fn upload(uri: &str, field: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"map.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn echoed(task: &AnalysisTask, completion: &str) -> String {
        format!("{}{completion}", strip_image_placeholder(task.prompt.text()))
    }

    #[tokio::test]
    async fn ping_reports_running() {
        let response = app(ScriptedModel::echo(), None)
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json(response).await,
            serde_json::json!({ "status": "ok", "message": "API is running" })
        );
    }

    #[tokio::test]
    async fn analyze_map_returns_the_stripped_answer_and_saves_debug_copy() {
        let dir = tempfile::tempdir().unwrap();
        let debug_path = dir.path().join("debug_map.png");
        let reply = echoed(&AnalysisTask::map_center(), " Toronto, Canada. It sits on Lake Ontario.");

        let response = app(ScriptedModel::new(vec![Ok(reply)]), Some(debug_path.clone()))
            .oneshot(upload("/analyze-map", "file", &png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json(response).await,
            serde_json::json!({
                "success": true,
                "analysis": "Toronto, Canada. It sits on Lake Ontario."
            })
        );
        assert_eq!(
            image_io::read_rgb(&debug_path).unwrap().dimensions(),
            (24, 12)
        );
    }

    #[tokio::test]
    async fn analyze_keeps_the_geogenie_tag_and_decodes_greedily() {
        let model = ScriptedModel::new(vec![Ok(echoed(
            &AnalysisTask::map_center_detailed(),
            " Santiago, Chile",
        ))]);
        let seen = model.seen();

        let response = app(model, None)
            .oneshot(upload("/analyze", "file", &png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["analysis"], "GEOGENIE: Santiago, Chile");
        let seen = seen.lock().unwrap();
        assert!(!seen[0].params.do_sample);
        assert_eq!(seen[0].image_size, Some((24, 12)));
    }

    #[tokio::test]
    async fn variations_answer_every_prompt() {
        let tasks = AnalysisTask::variations();
        let script = tasks
            .iter()
            .map(|task| Ok(echoed(task, " Mexico City")))
            .collect();

        let response = app(ScriptedModel::new(script), None)
            .oneshot(upload("/analyze-map/variations", "file", &png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["success"], true);
        let analyses = body["analyses"].as_array().unwrap();
        assert_eq!(analyses.len(), tasks.len());
        assert_eq!(analyses[0]["prompt"], tasks[0].prompt.text());
        assert_eq!(analyses[0]["response"], "Mexico City");
    }

    #[tokio::test]
    async fn undecodable_upload_is_a_server_error() {
        let response = app(ScriptedModel::echo(), None)
            .oneshot(upload("/analyze-map", "file", b"not an image"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = json(response).await["detail"].as_str().unwrap().to_string();
        assert!(detail.starts_with("cannot identify image"), "{detail}");
    }

    #[tokio::test]
    async fn model_failure_is_a_server_error_with_detail() {
        let model = ScriptedModel::new(vec![Err(ModelError::TokenMismatch(
            "Image features and image tokens do not match".into(),
        ))]);

        let response = app(model, None)
            .oneshot(upload("/analyze-map", "file", &png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json(response).await["detail"],
            "Image features and image tokens do not match"
        );
    }

    #[tokio::test]
    async fn missing_file_field_is_unprocessable() {
        let response = app(ScriptedModel::echo(), None)
            .oneshot(upload("/analyze-map", "picture", &png()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json(response).await["detail"], "missing multipart field `file`");
    }

    #[tokio::test]
    async fn cors_is_open_to_any_origin() {
        let request = Request::get("/ping")
            .header("origin", "http://localhost:5500")
            .body(Body::empty())
            .unwrap();

        let response = app(ScriptedModel::echo(), None)
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
    }

    #[tokio::test]
    async fn non_multipart_body_is_a_bad_request_with_detail() {
        let request = Request::post("/analyze-map")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"file":"map.png"}"#))
            .unwrap();

        let response = app(ScriptedModel::echo(), None)
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert!(json(response).await["detail"].is_string());
    }

    #[tokio::test]
    async fn oversized_upload_is_payload_too_large() {
        let model = ScriptedModel::echo();
        let seen = model.seen();

        let response = app_with_limit(model, None, 64)
            .oneshot(upload("/analyze-map", "file", &[0u8; 1000]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(json(response).await["detail"].is_string());
        assert!(seen.lock().unwrap().is_empty());
    }
}
