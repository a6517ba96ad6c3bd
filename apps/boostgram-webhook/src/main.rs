use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use teloxide::prelude::*;
use tracing::{error, info};

mod handlers;
mod notifier;
mod state;

use boostgram_core::config::Config;
use boostgram_core::dispatch::Dispatcher;
use boostgram_core::fulfillment::{FulfillmentApi, FulfillmentClient};
use boostgram_core::notify::Notifier;
use boostgram_core::poller::StatusPoller;
use boostgram_core::reconcile::Reconciler;
use boostgram_core::steps::StateStore;
use boostgram_core::storage::{LinkMappings, PendingQueue, ProcessedOrders};

use crate::notifier::TelegramNotifier;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("=== Boostgram webhook receiver starting ===");
    if let Err(e) = run().await {
        error!("FATAL: {e:#}");
        std::process::exit(1);
    }
    info!("=== Boostgram webhook receiver stopped ===");
}

async fn run() -> anyhow::Result<()> {
    let config = Arc::new(Config::from_env()?);
    let webhook_secret = config
        .gateway
        .as_ref()
        .and_then(|gw| gw.webhook_secret.clone())
        .context("RAZORPAY_WEBHOOK_SECRET is not set")?;

    std::fs::create_dir_all(&config.data_dir)
        .context("could not create the data directory")?;

    let api: Arc<dyn FulfillmentApi> = Arc::new(FulfillmentClient::new(
        config.fulfillment_url.clone(),
        config.fulfillment_key.clone(),
    )?);

    let bot = Bot::new(config.bot_token.clone());
    let notifier: Arc<dyn Notifier> =
        Arc::new(TelegramNotifier::new(bot, config.admin_ids.clone()));

    let processed = Arc::new(ProcessedOrders::open(
        config.data_file("processed_orders.json"),
    ));
    let queue = Arc::new(PendingQueue::open(
        config.data_file("pending_fulfillment.json"),
    ));
    let links = Arc::new(LinkMappings::open(
        config.data_file("payment_link_to_chat.json"),
        config.data_file("payment_link_to_order.json"),
    ));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    // The pending-queue sweep runs in the bot process only; this process
    // just confirms payments and hands submitted orders to pollers.
    let dispatcher = Arc::new(Dispatcher::new(api.clone(), queue, notifier.clone()));
    let poller = StatusPoller::new(
        api,
        notifier.clone(),
        Arc::new(StateStore::new()),
        config.poll_interval,
        shutdown_tx.clone(),
    );
    let reconciler = Arc::new(Reconciler::new(processed, dispatcher, poller));

    let state = AppState {
        webhook_secret: Arc::new(webhook_secret),
        links,
        reconciler,
        notifier,
    };

    let app = handlers::router(state);
    let listener = tokio::net::TcpListener::bind(config.webhook_bind)
        .await
        .with_context(|| format!("could not bind {}", config.webhook_bind))?;
    info!("webhook receiver listening on {}", config.webhook_bind);

    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(());
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .context("webhook server failed")?;
    Ok(())
}
