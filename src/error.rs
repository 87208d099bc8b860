use thiserror::Error;

/// Failures on the classify path. Every variant is reported to the client
/// as `{"error": <display>}`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid file format")]
    InvalidFormat,
    #[error("Upload failed: {0}")]
    Upload(String),
    #[error("Could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Closet store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<tensorflow::Status> for ServiceError {
    fn from(status: tensorflow::Status) -> Self {
        ServiceError::Inference(status.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for ServiceError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        ServiceError::Upload(err.to_string())
    }
}
