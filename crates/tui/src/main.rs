mod app;
mod input;

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    sync::{Arc, Mutex},
};

use postdesk_core::{
    config::{self, AppConfig},
    HttpPostApi, PostApi,
};
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    config::ensure_default_config()?;
    let config = AppConfig::load()?;
    init_logging(&config)?;

    let api: Arc<dyn PostApi> = Arc::new(HttpPostApi::new(&config.api_base_url));
    let initial = match api.fetch_posts().await {
        Ok(page) => {
            info!(total = page.total, base_url = %config.api_base_url, "initial fetch");
            Some(page)
        }
        Err(err) => {
            error!(error = %err, "Failed to fetch posts");
            None
        }
    };

    let mut app = app::PostdeskApp::new(api, config, initial);
    app.run().await
}

/// Everything goes to `<log_dir>/postdesk.log`; the terminal belongs to the UI.
fn init_logging(config: &AppConfig) -> Result<()> {
    fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("failed to create {}", config.log_dir.display()))?;
    let log_path = config.log_dir.join("postdesk.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    Ok(())
}
