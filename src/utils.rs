use std::{env, fs, path::Path};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use tracing::info;

use crate::category::Category;

type BoxError = Box<dyn std::error::Error>;

async fn download_file(url: &str, path: &Path) -> Result<(), BoxError> {
    info!("Downloading {} from {}", path.display(), url);

    let mut header_map = HeaderMap::new();

    if let Ok(token) = env::var("GITHUB_TOKEN") {
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| "Invalid GITHUB_TOKEN format")?;
        header_map.insert(AUTHORIZATION, auth_value);
    }
    header_map.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));

    let client = reqwest::Client::new();
    let response = client.get(url).headers(header_map).send().await?;

    if !response.status().is_success() {
        return Err(format!("Failed to download {}: {}", url, response.status()).into());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = response.bytes().await?;
    fs::write(path, bytes)?;
    Ok(())
}

/// Fetches a missing model or class list from its configured URL.
pub async fn ensure_files_exist(
    model_path: &Path,
    model_url: Option<&str>,
    class_list_path: &Path,
    class_list_url: Option<&str>,
) -> Result<(), BoxError> {
    info!("Checking model...");
    for (path, url, var) in [
        (model_path, model_url, "MODEL_URL"),
        (class_list_path, class_list_url, "CLASS_LIST_URL"),
    ] {
        if path.exists() {
            continue;
        }
        match url {
            Some(url) => download_file(url, path).await?,
            None if var == "MODEL_URL" => {
                return Err(format!("{} is missing and {} is not set", path.display(), var).into())
            }
            // The class list only double-checks the built-in order.
            None => info!("No class list at {}, using built-in order", path.display()),
        }
    }
    Ok(())
}

/// Checks that a class list file names the categories in the model's order.
pub fn verify_class_list(path: &Path) -> Result<(), BoxError> {
    if !path.exists() {
        return Ok(());
    }

    let listed: Vec<String> = fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    let expected: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();

    if listed != expected {
        return Err(format!(
            "Class list {} is {:?}, model output order is {:?}",
            path.display(),
            listed,
            expected
        )
        .into());
    }
    Ok(())
}
