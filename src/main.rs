use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, Settings};

/// Main entry point for the VPR signing service
///
/// Runs the REST API and the certificate revalidation scheduler together:
/// - REST server on port 3000 (configurable via VPR_REST_ADDR)
/// - OCSP revalidation of stale signed documents every 12 hours by default
///
/// # Environment Variables
/// - `VPR_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `VPR_DATA_DIR`: Directory for signing records and objects (default: "signing_data")
/// - `VPR_PUBLIC_BASE_URL`: Base of callback and read URLs
/// - `VPR_WEBHOOK_SECRET`: Shared HMAC secret for signature callbacks
/// - `VPR_REVALIDATE_INTERVAL_SECS`, `VPR_REVALIDATE_BATCH_SIZE`, `VPR_REVALIDATE_STALE_DAYS`
///
/// # Returns
/// * `Ok(())` - If the server stops after a shutdown signal
/// * `Err(anyhow::Error)` - If startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vpr=info".parse()?)
                .add_directive("vpr_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    let state = settings.open_state()?;

    tracing::info!("++ Starting VPR REST on {}", settings.rest_addr);
    tracing::info!(
        interval_secs = settings.policy.interval().as_secs(),
        batch_size = settings.policy.batch_size(),
        "++ Starting certificate revalidation"
    );

    let scheduler = Arc::new(state.service().scheduler(settings.policy.clone()));
    let scheduler_task = scheduler.spawn();

    let listener = tokio::net::TcpListener::bind(&settings.rest_addr).await?;
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
    })
    .await?;

    scheduler_task.abort();
    tracing::info!("-- VPR stopped");

    Ok(())
}
