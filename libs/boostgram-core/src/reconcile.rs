use std::sync::Arc;

use tracing::info;

use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::order::Order;
use crate::poller::StatusPoller;
use crate::storage::ProcessedOrders;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    /// Fulfillment accepted the order; a status poller is running.
    Submitted(i64),
    /// Balance was short; queued for the background sweep.
    Deferred,
    /// Remote submission failed; the user needs support.
    Failed(String),
    /// Some other confirmation path got here first.
    AlreadyProcessed,
    /// The rejection was recorded.
    Rejected,
}

/// The rendezvous where both payment confirmation paths (admin approval of a
/// proof screenshot, gateway webhook) converge. The processed-order set is
/// claimed before any remote call, so duplicate clicks and duplicate webhook
/// deliveries are no-ops.
pub struct Reconciler {
    processed: Arc<ProcessedOrders>,
    dispatcher: Arc<Dispatcher>,
    poller: StatusPoller,
}

impl Reconciler {
    pub fn new(
        processed: Arc<ProcessedOrders>,
        dispatcher: Arc<Dispatcher>,
        poller: StatusPoller,
    ) -> Self {
        Self {
            processed,
            dispatcher,
            poller,
        }
    }

    pub async fn confirm(&self, order: &Order) -> ConfirmOutcome {
        if !self.processed.try_begin(&order.order_id).await {
            info!(order_id = %order.order_id, "duplicate confirmation ignored");
            return ConfirmOutcome::AlreadyProcessed;
        }

        match self.dispatcher.dispatch(order).await {
            DispatchOutcome::Dispatched(remote_id) => {
                self.poller.spawn(order.chat_id, remote_id);
                ConfirmOutcome::Submitted(remote_id)
            }
            DispatchOutcome::Deferred => ConfirmOutcome::Deferred,
            DispatchOutcome::Failed(e) => ConfirmOutcome::Failed(e),
        }
    }

    /// Admin rejection is terminal and shares the exactly-once guard, so a
    /// rejected order can never be approved afterwards (or vice versa).
    pub async fn reject(&self, order_id: &str) -> ConfirmOutcome {
        if !self.processed.try_begin(order_id).await {
            info!(order_id, "duplicate rejection ignored");
            return ConfirmOutcome::AlreadyProcessed;
        }
        ConfirmOutcome::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Platform;
    use crate::dispatch::Dispatcher;
    use crate::fulfillment::{FulfillmentApi, RemoteStatus};
    use crate::notify::NullNotifier;
    use crate::steps::StateStore;
    use crate::storage::PendingQueue;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::sync::broadcast;

    struct CountingApi {
        add_calls: AtomicUsize,
        balance: f64,
    }

    #[async_trait]
    impl FulfillmentApi for CountingApi {
        async fn services(&self) -> Result<Vec<Value>> {
            Ok(Vec::new())
        }
        async fn add_order(&self, _s: i64, _l: &str, _q: u32) -> Result<i64> {
            self.add_calls.fetch_add(1, Ordering::SeqCst);
            Ok(4242)
        }
        async fn order_status(&self, _remote_id: i64) -> Result<RemoteStatus> {
            Ok(RemoteStatus::Completed)
        }
        async fn balance(&self) -> Result<f64> {
            Ok(self.balance)
        }
    }

    fn order(id: &str) -> Order {
        Order {
            order_id: id.into(),
            chat_id: 77,
            service_id: 5,
            service_name: "Instagram Likes".into(),
            platform: Platform::Instagram,
            category: "Likes".into(),
            link: "https://instagram.com/p/x".into(),
            quantity: 500,
            amount: 70.0,
            cost: 50.0,
            payment_reference: None,
            remote_fulfillment_id: None,
        }
    }

    fn reconciler(dir: &tempfile::TempDir, api: Arc<CountingApi>) -> Reconciler {
        let queue = Arc::new(PendingQueue::open(dir.path().join("pending.json")));
        let notifier = Arc::new(NullNotifier);
        let dispatcher = Arc::new(Dispatcher::new(api.clone(), queue, notifier.clone()));
        let (shutdown, _) = broadcast::channel(1);
        let poller = StatusPoller::new(
            api,
            notifier,
            Arc::new(StateStore::new()),
            Duration::from_secs(3600),
            shutdown,
        );
        Reconciler::new(
            Arc::new(ProcessedOrders::open(dir.path().join("processed.json"))),
            dispatcher,
            poller,
        )
    }

    #[tokio::test]
    async fn double_approval_submits_exactly_once() {
        let dir = tempdir().unwrap();
        let api = Arc::new(CountingApi {
            add_calls: AtomicUsize::new(0),
            balance: 1000.0,
        });
        let reconciler = reconciler(&dir, api.clone());

        let first = reconciler.confirm(&order("77_1")).await;
        let second = reconciler.confirm(&order("77_1")).await;

        assert_eq!(first, ConfirmOutcome::Submitted(4242));
        assert_eq!(second, ConfirmOutcome::AlreadyProcessed);
        assert_eq!(api.add_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reject_then_approve_is_a_no_op() {
        let dir = tempdir().unwrap();
        let api = Arc::new(CountingApi {
            add_calls: AtomicUsize::new(0),
            balance: 1000.0,
        });
        let reconciler = reconciler(&dir, api.clone());

        assert_eq!(reconciler.reject("77_1").await, ConfirmOutcome::Rejected);
        assert_eq!(
            reconciler.confirm(&order("77_1")).await,
            ConfirmOutcome::AlreadyProcessed
        );
        assert_eq!(api.add_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_balance_confirmation_defers() {
        let dir = tempdir().unwrap();
        let api = Arc::new(CountingApi {
            add_calls: AtomicUsize::new(0),
            balance: 10.0,
        });
        let reconciler = reconciler(&dir, api.clone());

        assert_eq!(
            reconciler.confirm(&order("77_1")).await,
            ConfirmOutcome::Deferred
        );
        assert_eq!(api.add_calls.load(Ordering::SeqCst), 0);
    }
}
