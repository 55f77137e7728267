/// EcoNeT — bottles-for-WiFi captive portal
///
/// Devices acquire the machine's single insertion slot, earn seconds of
/// network access per deposited bottle, then activate the session to start
/// the clock. A periodic sweeper reclaims abandoned and finished sessions.

use econet_portal::{config::PortalConfig, context::AppContext, error::PortalResult, server, sweeper};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> PortalResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "econet_portal=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    let config = PortalConfig::from_env()?;
    let ctx = Arc::new(AppContext::new(config).await?);

    // Start the expiry sweeper; its handle stops the loop on shutdown.
    let sweeper = sweeper::Sweeper::new(Arc::clone(&ctx)).start();

    server::serve((*ctx).clone(), shutdown_signal()).await?;

    sweeper.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
}

fn print_banner() {
    println!(
        r#"
    ______          _   __    ______
   / ____/________ / | / /__ /_  __/
  / __/ / ___/ __ \  |/ / _ \ / /
 / /___/ /__/ /_/ / /|  /  __// /
/_____/\___/\____/_/ |_/\___//_/

        Bottles-for-WiFi captive portal v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
