//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the signing REST API and the revalidation scheduler in one process.
//!
//! ## Intended use
//! Development and single-node deployments. The workspace's main `vpr-run` binary does the same
//! with the workspace-level log filter.

use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, Settings};

/// Main entry point for the VPR signing REST API server
///
/// # Environment Variables
/// - `VPR_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `VPR_DATA_DIR`: Existing directory holding records and objects
/// - `VPR_PUBLIC_BASE_URL`: Base of callback and read URLs
/// - `VPR_WEBHOOK_SECRET`: Shared HMAC secret; callbacks are refused without it
/// - `VPR_FILES_SIGNING_KEY`: Key for presigned read links (random per process if unset)
/// - `VPR_READ_URL_TTL_SECS`, `VPR_OCSP_TIMEOUT_SECS`
/// - `VPR_REVALIDATE_INTERVAL_SECS`, `VPR_REVALIDATE_BATCH_SIZE`, `VPR_REVALIDATE_STALE_DAYS`
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - a configuration value is invalid or the data directory is missing,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("vpr_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    let state = settings.open_state()?;

    let scheduler = std::sync::Arc::new(state.service().scheduler(settings.policy.clone()));
    let _scheduler = scheduler.spawn();

    tracing::info!("-- Starting VPR signing REST API on {}", settings.rest_addr);

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&settings.rest_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
