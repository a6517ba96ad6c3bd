use std::sync::Arc;

use boostgram_core::catalog::Catalog;
use boostgram_core::config::Config;
use boostgram_core::fulfillment::FulfillmentApi;
use boostgram_core::gateway::PaymentGateway;
use boostgram_core::reconcile::Reconciler;
use boostgram_core::steps::StateStore;
use boostgram_core::storage::{KnownUsers, LinkMappings, MarginStore, StatsStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub api: Arc<dyn FulfillmentApi>,
    pub catalog: Arc<Catalog>,
    pub steps: Arc<StateStore>,
    pub margin: Arc<MarginStore>,
    pub stats: Arc<StatsStore>,
    pub users: Arc<KnownUsers>,
    pub links: Arc<LinkMappings>,
    pub gateway: Option<Arc<PaymentGateway>>,
    pub reconciler: Arc<Reconciler>,
}
