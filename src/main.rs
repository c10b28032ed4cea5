//! Resilient payment service.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌────────────────────────────────────────────────────┐
//!                 │              ResilientPaymentService               │
//!   caller ──────▶│  validate → retry → circuit breaker → timeout ─────┼──▶ Stripe API
//!                 │                          │                         │
//!                 │                          └─▶ mock fallback (opt-in) │
//!                 │                                                    │
//!                 │  transaction log ◀── every operation               │
//!                 │  event bus ──▶ subscribers (event logger)          │
//!                 └──────────────▲─────────────────────────────────────┘
//!                                │
//!                 admin API (axum, bearer) ◀── payments-cli
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use resilient_payments::admin::{setup_admin_router, AdminState};
use resilient_payments::config::{load_api_key, load_config, PaymentsConfig};
use resilient_payments::lifecycle::{wait_for_signal, Shutdown};
use resilient_payments::observability::{logging, metrics};
use resilient_payments::payments::events::log_events;
use resilient_payments::{EventBus, ResilientPaymentService, StripeProvider};

#[derive(Parser)]
#[command(name = "resilient-payments")]
#[command(about = "Resilient payment service with circuit breaking, retries and recovery", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply without it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => PaymentsConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resilient-payments starting");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let api_key = load_api_key(&config.provider)?;
    let provider = Arc::new(StripeProvider::new(&config.provider, api_key)?);
    tracing::info!(
        api_base_url = %config.provider.api_base_url,
        fallback = ?config.fallback.mode,
        "Payment provider configured"
    );

    let events = EventBus::default();
    let service = Arc::new(ResilientPaymentService::new(&config, provider, events.clone()));
    let shutdown = Shutdown::new();

    let event_logger = tokio::spawn(log_events(events.subscribe(), shutdown.subscribe()));

    let admin_task = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        let router = setup_admin_router(AdminState::new(Arc::clone(&service), config.admin.api_key.as_str()));
        let stop = shutdown.clone();
        Some(tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { stop.wait().await })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Admin server failed");
            }
        }))
    } else {
        tracing::info!("Admin API disabled");
        None
    };

    wait_for_signal().await;
    tracing::info!("Shutting down");
    shutdown.trigger();

    if let Some(task) = admin_task {
        let _ = task.await;
    }
    let _ = event_logger.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
