//! `quantdash-client` -- headless dashboard client.
//!
//! Starts an analysis job for every ticker given on the command line,
//! follows their progress feeds, and polls for resource updates until
//! interrupted.
//!
//! ```text
//! quantdash-client AAPL MSFT
//! ```
//!
//! Configuration is read from the environment (and `.env`); see
//! [`quantdash_client::config::ClientConfig::from_env`].

use anyhow::Context;
use quantdash_client::app::App;
use quantdash_client::config::ClientConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quantdash=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env().context("Invalid client configuration")?;
    let subjects: Vec<String> = std::env::args().skip(1).collect();

    tracing::info!(
        api_url = %config.api_url,
        ws_url = %config.ws_url,
        state_file = %config.state_file().display(),
        jobs = subjects.len(),
        "Starting quantdash-client",
    );

    let app = App::build(&config)
        .await
        .context("Failed to initialise client services")?;
    let tasks = app.spawn_background(config.poll_interval);

    for subject in &subjects {
        match app.tracker.start_job(subject).await {
            Ok(job) => tracing::info!(job_id = %job.id, ticker = %job.subject_key, "Tracking analysis"),
            Err(e) => tracing::error!(subject = %subject, error = %e, "Failed to start analysis"),
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("Interrupt received, shutting down");

    app.shutdown().await;
    for task in tasks {
        task.await.ok();
    }

    Ok(())
}
