use std::sync::Arc;

use boostgram_core::notify::Notifier;
use boostgram_core::reconcile::Reconciler;
use boostgram_core::storage::LinkMappings;

#[derive(Clone)]
pub struct AppState {
    pub webhook_secret: Arc<String>,
    pub links: Arc<LinkMappings>,
    pub reconciler: Arc<Reconciler>,
    pub notifier: Arc<dyn Notifier>,
}
