use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info};

use crate::closet::{ClosetCounts, ClosetStore};
use crate::error::ServiceError;
use crate::model::{classify, preprocess_image, ImageClassifier};
use crate::policy::{self, Limits};
use crate::upload::{release_upload, store_upload, Retention, UploadForm};

const INDEX_HTML: &str = include_str!("../templates/index.html");

pub struct AppState {
    pub classifier: Arc<dyn ImageClassifier>,
    pub closet: Arc<ClosetStore>,
    pub upload_dir: PathBuf,
    pub retention: Retention,
    pub limits: Limits,
}

#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub prediction: String,
    pub confidence: f32,
    pub closet_counts: ClosetCounts,
}

pub fn router(state: Arc<AppState>, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index).post(classify_handler))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(state)
        .route("/health", get(health_check))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn classify_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let outcome = match multipart {
        Ok(multipart) => handle_upload(&state, multipart).await,
        Err(rejection) => {
            debug!("Rejected non-multipart upload: {}", rejection);
            Err(ServiceError::InvalidFormat)
        }
    };

    match outcome {
        Ok(reply) => Json(reply).into_response(),
        Err(err) => {
            error!("Classification request failed: {}", err);
            Json(json!({ "error": err.to_string() })).into_response()
        }
    }
}

async fn handle_upload(
    state: &AppState,
    multipart: Multipart,
) -> Result<ClassifyResponse, ServiceError> {
    let form = UploadForm::from_multipart(multipart).await?;
    let buy = form.wants_to_buy();
    let file = form.file.as_ref().ok_or(ServiceError::InvalidFormat)?;

    let path = store_upload(&state.upload_dir, file).await?;

    let classifier = Arc::clone(&state.classifier);
    let closet = Arc::clone(&state.closet);
    let limits = state.limits;
    let image_path = path.clone();

    let result = tokio::task::spawn_blocking(move || -> Result<ClassifyResponse, ServiceError> {
        let batch = preprocess_image(&image_path)?;
        let classification = classify(&*classifier, &batch)?;

        let (verdict, counts) = closet.update(|counts| {
            let verdict = policy::apply(counts, classification.label, buy, &limits);
            let committed = verdict.committed();
            (verdict, committed)
        })?;

        info!(
            "Predicted {} ({:.3}), verdict {:?}, closet total {}",
            classification.label,
            classification.confidence,
            verdict,
            counts.total()
        );

        Ok(ClassifyResponse {
            message: verdict.message(&limits),
            prediction: classification.label.to_string(),
            confidence: classification.confidence,
            closet_counts: counts,
        })
    })
    .await
    .unwrap_or_else(|e| Err(ServiceError::Inference(e.to_string())));

    release_upload(&path, state.retention).await;
    result
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK" }))
}
