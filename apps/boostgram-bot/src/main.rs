use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use teloxide::prelude::*;
use tracing::{error, info};

mod bot;
mod notifier;
mod qr;
mod state;

use boostgram_core::catalog::Catalog;
use boostgram_core::config::Config;
use boostgram_core::dispatch::{run_pending_sweep, Dispatcher};
use boostgram_core::fulfillment::{FulfillmentApi, FulfillmentClient};
use boostgram_core::gateway::PaymentGateway;
use boostgram_core::poller::StatusPoller;
use boostgram_core::reconcile::Reconciler;
use boostgram_core::steps::StateStore;
use boostgram_core::storage::{
    KnownUsers, LinkMappings, MarginStore, PendingQueue, ProcessedOrders, StatsStore,
};

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

    info!("=== Boostgram bot starting ===");
    if let Err(e) = run().await {
        error!("FATAL: {e:#}");
        std::process::exit(1);
    }
    info!("=== Boostgram bot stopped ===");
}

async fn run() -> anyhow::Result<()> {
    let config = Arc::new(Config::from_env()?);
    std::fs::create_dir_all(config.proofs_dir())
        .context("could not create the data directory")?;

    let api: Arc<dyn FulfillmentApi> = Arc::new(FulfillmentClient::new(
        config.fulfillment_url.clone(),
        config.fulfillment_key.clone(),
    )?);

    // The catalog is the backbone of every conversation; refuse to start
    // without it.
    let catalog = Arc::new(
        Catalog::load(api.clone())
            .await
            .context("bot cannot start without the service catalog")?,
    );

    let margin = Arc::new(MarginStore::open(
        config.data_file("profit_margin.json"),
        config.markup_mode,
    ));
    let steps = Arc::new(StateStore::new());
    let processed = Arc::new(ProcessedOrders::open(
        config.data_file("processed_orders.json"),
    ));
    let queue = Arc::new(PendingQueue::open(
        config.data_file("pending_fulfillment.json"),
    ));
    let users = Arc::new(KnownUsers::open(config.data_file("known_users.json")));
    let stats = Arc::new(StatsStore::open(config.data_file("stats.json")));
    let links = Arc::new(LinkMappings::open(
        config.data_file("payment_link_to_chat.json"),
        config.data_file("payment_link_to_order.json"),
    ));

    let gateway = match &config.gateway {
        Some(gw) => Some(Arc::new(PaymentGateway::new(
            gw.key_id.clone(),
            gw.key_secret.clone(),
        )?)),
        None => None,
    };

    let bot = Bot::new(config.bot_token.clone());
    let notifier = Arc::new(TelegramNotifier::new(bot.clone(), config.admin_ids.clone()));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let dispatcher = Arc::new(Dispatcher::new(api.clone(), queue.clone(), notifier.clone()));
    let poller = StatusPoller::new(
        api.clone(),
        notifier.clone(),
        steps.clone(),
        config.poll_interval,
        shutdown_tx.clone(),
    );
    let reconciler = Arc::new(Reconciler::new(
        processed,
        dispatcher.clone(),
        poller.clone(),
    ));

    tokio::spawn(run_pending_sweep(
        dispatcher,
        poller,
        config.sweep_interval,
        shutdown_tx.subscribe(),
    ));

    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(());
            }
        });
    }

    let state = AppState {
        config,
        api,
        catalog,
        steps,
        margin,
        stats,
        users,
        links,
        gateway,
        reconciler,
    };

    bot::run_bot(bot, shutdown_tx.subscribe(), state).await;
    Ok(())
}
