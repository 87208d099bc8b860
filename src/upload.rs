use std::path::{Path, PathBuf};
use std::str::FromStr;

use axum::extract::Multipart;
use tracing::{debug, warn};

use crate::error::ServiceError;

const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// What happens to a stored upload once its request has been answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Retain,
    Delete,
}

impl FromStr for Retention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(Retention::Retain),
            "delete" => Ok(Retention::Delete),
            other => Err(format!("unknown retention policy '{}'", other)),
        }
    }
}

pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub buy_item: Option<String>,
}

impl UploadForm {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ServiceError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("file") if form.file.is_some() => debug!("Ignoring repeated file field"),
                Some("file") => {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let bytes = field.bytes().await?.to_vec();
                    form.file = Some(UploadedFile { filename, bytes });
                }
                Some("buy_item") => {
                    form.buy_item = Some(field.text().await?);
                }
                other => debug!("Ignoring form field {:?}", other),
            }
        }

        Ok(form)
    }

    /// Only the literal value `yes` commits a purchase.
    pub fn wants_to_buy(&self) -> bool {
        self.buy_item.as_deref() == Some("yes")
    }
}

pub fn allowed_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Reduces a client-supplied name to a single safe path component.
///
/// Path separators become `_`, so `a/b.png` is stored as `a_b.png`.
/// Non-ASCII characters are dropped, not transliterated.
pub fn secure_filename(filename: &str) -> String {
    let cleaned: String = filename
        .split(|c: char| c == '/' || c == '\\' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Writes the upload under `dir`, creating the directory when needed.
pub async fn store_upload(dir: &Path, file: &UploadedFile) -> Result<PathBuf, ServiceError> {
    if !allowed_file(&file.filename) {
        return Err(ServiceError::InvalidFormat);
    }

    let name = secure_filename(&file.filename);
    if name.is_empty() {
        return Err(ServiceError::InvalidFormat);
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ServiceError::Upload(format!("{}: {}", dir.display(), e)))?;

    let path = dir.join(name);
    tokio::fs::write(&path, &file.bytes)
        .await
        .map_err(|e| ServiceError::Upload(format!("{}: {}", path.display(), e)))?;

    debug!("Stored upload at {}", path.display());
    Ok(path)
}

pub async fn release_upload(path: &Path, retention: Retention) {
    if retention == Retention::Delete {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Failed to remove upload {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str) -> UploadedFile {
        UploadedFile {
            filename: name.to_string(),
            bytes: vec![1, 2, 3],
        }
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(allowed_file("shirt.png"));
        assert!(allowed_file("shirt.JPG"));
        assert!(allowed_file("archive.tar.jpeg"));
        assert!(!allowed_file("notes.txt"));
        assert!(!allowed_file("png"));
        assert!(!allowed_file("shirt.png.exe"));
        assert!(!allowed_file(""));
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(secure_filename("../../etc/passwd.png"), "etc_passwd.png");
        assert_eq!(secure_filename("C:\\photos\\my shirt.jpg"), "C_photos_my_shirt.jpg");
        assert_eq!(secure_filename("  summer   dress.png "), "summer_dress.png");
        assert_eq!(secure_filename("..hidden.png"), "hidden.png");
        assert_eq!(secure_filename("naïve dress.png"), "nave_dress.png");
        assert_eq!(secure_filename("/"), "");
    }

    #[test]
    fn only_literal_yes_buys() {
        let mut form = UploadForm::default();
        assert!(!form.wants_to_buy());
        for value in ["no", "YES", "yes ", "true", ""] {
            form.buy_item = Some(value.to_string());
            assert!(!form.wants_to_buy(), "{:?} must not buy", value);
        }
        form.buy_item = Some("yes".to_string());
        assert!(form.wants_to_buy());
    }

    #[test]
    fn retention_parses() {
        assert_eq!("retain".parse::<Retention>(), Ok(Retention::Retain));
        assert_eq!(" Delete".parse::<Retention>(), Ok(Retention::Delete));
        assert!("forever".parse::<Retention>().is_err());
    }

    #[tokio::test]
    async fn store_creates_directory_on_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("static").join("uploads");

        let path = store_upload(&uploads, &upload("red dress.png")).await.unwrap();

        assert_eq!(path, uploads.join("red_dress.png"));
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn rejected_upload_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");

        let err = store_upload(&uploads, &upload("notes.txt")).await.unwrap_err();

        assert!(matches!(err, ServiceError::InvalidFormat));
        assert!(!uploads.exists());
    }

    #[tokio::test]
    async fn delete_retention_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_upload(dir.path(), &upload("a.png")).await.unwrap();

        release_upload(&path, Retention::Retain).await;
        assert!(path.exists());
        release_upload(&path, Retention::Delete).await;
        assert!(!path.exists());
    }
}
