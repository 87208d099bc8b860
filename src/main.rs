use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod category;
mod closet;
mod config;
mod error;
mod model;
mod policy;
mod routes;
mod upload;
mod utils;

use closet::ClosetStore;
use config::Config;
use model::Model;
use routes::{router, AppState};
use utils::{ensure_files_exist, verify_class_list};

const DEFAULT_LOG_FILTER: &str = "info";

/// `RUST_LOG` when set and valid, otherwise info and above.
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(log_filter())
        .init();

    let config = Config::from_env()?;

    ensure_files_exist(
        &config.model_path,
        config.model_url.as_deref(),
        &config.class_list_path,
        config.class_list_url.as_deref(),
    )
    .await?;
    verify_class_list(&config.class_list_path)?;

    let model = Model::new(
        &config.model_path,
        &config.model_input_op,
        &config.model_output_op,
    )?;
    tracing::info!("Loaded model from {}", config.model_path.display());

    let closet = ClosetStore::new(&config.closet_path);
    match closet.load() {
        Ok(counts) => tracing::info!(
            "Closet at {} holds {} items",
            closet.path().display(),
            counts.total()
        ),
        Err(err) => tracing::warn!("{}; requests will fail until it is seeded", err),
    }

    let state = Arc::new(AppState {
        classifier: Arc::new(model),
        closet: Arc::new(closet),
        upload_dir: config.upload_dir.clone(),
        retention: config.upload_retention,
        limits: config.limits,
    });
    let app = router(state, config.body_limit_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
