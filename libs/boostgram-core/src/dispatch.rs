use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::fulfillment::FulfillmentApi;
use crate::notify::Notifier;
use crate::order::Order;
use crate::poller::StatusPoller;
use crate::pricing::format_inr;
use crate::storage::PendingQueue;

const BALANCE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Submitted; remote fulfillment id assigned.
    Dispatched(i64),
    /// Balance was short; queued durably for the sweep.
    Deferred,
    /// Remote submission failed; not retried automatically.
    Failed(String),
}

/// Submits paid orders to the fulfillment API, but only when the prepaid
/// account balance covers their wholesale cost. Short-balance orders land in
/// the durable pending queue and are retried by the sweep.
pub struct Dispatcher {
    api: Arc<dyn FulfillmentApi>,
    queue: Arc<PendingQueue>,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(
        api: Arc<dyn FulfillmentApi>,
        queue: Arc<PendingQueue>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            api,
            queue,
            notifier,
        }
    }

    pub async fn dispatch(&self, order: &Order) -> DispatchOutcome {
        let balance = match self.api.balance().await {
            Ok(balance) => balance,
            Err(e) => {
                error!("balance check failed before dispatch: {e}");
                return DispatchOutcome::Failed(format!("balance check failed: {e}"));
            }
        };

        if balance + BALANCE_EPSILON < order.cost {
            warn!(
                order_id = %order.order_id,
                balance,
                cost = order.cost,
                "insufficient balance, deferring order"
            );
            if let Err(e) = self.queue.enqueue(order.clone()).await {
                error!("could not persist pending order {}: {e}", order.order_id);
                return DispatchOutcome::Failed(format!("could not queue order: {e}"));
            }
            self.notifier
                .notify_operator(&format!(
                    "⚠️ <b>Low balance</b>\nOrder <code>{}</code> needs ₹{} but the \
                     account balance is ₹{}. Queued for retry, please top up.",
                    order.order_id,
                    format_inr(order.cost),
                    format_inr(balance),
                ))
                .await;
            return DispatchOutcome::Deferred;
        }

        self.submit(order).await
    }

    async fn submit(&self, order: &Order) -> DispatchOutcome {
        match self
            .api
            .add_order(order.service_id, &order.link, order.quantity)
            .await
        {
            Ok(remote_id) => {
                info!(
                    order_id = %order.order_id,
                    remote_id,
                    "order submitted to fulfillment"
                );
                DispatchOutcome::Dispatched(remote_id)
            }
            Err(e) => {
                error!("fulfillment submission failed for {}: {e}", order.order_id);
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }

    /// One pass over the pending queue: fetch the balance once, then submit
    /// every entry that fits, deducting each submitted cost from the locally
    /// tracked balance so one pass never over-commits. Returns the submitted
    /// orders so the caller can start status polling for them.
    pub async fn sweep_once(&self) -> Vec<(Order, i64)> {
        let entries = self.queue.snapshot().await;
        if entries.is_empty() {
            return Vec::new();
        }

        let mut available = match self.api.balance().await {
            Ok(balance) => balance,
            Err(e) => {
                warn!("sweep skipped, balance check failed: {e}");
                return Vec::new();
            }
        };
        info!(
            pending = entries.len(),
            balance = available,
            "sweeping pending fulfillment queue"
        );

        let mut submitted = Vec::new();
        for entry in entries {
            let order = entry.order;
            if available + BALANCE_EPSILON < order.cost {
                continue;
            }
            match self.submit(&order).await {
                DispatchOutcome::Dispatched(remote_id) => {
                    available -= order.cost;
                    if let Err(e) = self.queue.remove(&order.order_id).await {
                        error!("could not dequeue {}: {e}", order.order_id);
                    }
                    self.notifier
                        .notify_user(
                            order.chat_id,
                            &format!(
                                "✅ <b>Your order is now being processed!</b>\n\
                                 Order ID: <code>{remote_id}</code>\n\
                                 Thank you for your patience."
                            ),
                        )
                        .await;
                    self.notifier
                        .notify_operator(&format!(
                            "✅ Queued order <code>{}</code> submitted (remote id {remote_id}).",
                            order.order_id
                        ))
                        .await;
                    let mut order = order;
                    order.remote_fulfillment_id = Some(remote_id);
                    submitted.push((order, remote_id));
                }
                DispatchOutcome::Failed(e) => {
                    // Submission errors are not auto-retried; drop the entry
                    // and route the user to support.
                    if let Err(e) = self.queue.remove(&order.order_id).await {
                        error!("could not dequeue {}: {e}", order.order_id);
                    }
                    self.notifier
                        .notify_user(
                            order.chat_id,
                            "❌ <b>There was an error placing your order.</b>\n\
                             Please contact support.",
                        )
                        .await;
                    self.notifier
                        .notify_operator(&format!(
                            "❌ Queued order <code>{}</code> failed to submit: {e}",
                            order.order_id
                        ))
                        .await;
                }
                DispatchOutcome::Deferred => unreachable!("submit never defers"),
            }
        }
        submitted
    }
}

/// Background sweep: re-evaluates the pending queue on a fixed interval and
/// starts a status poller for every order it manages to submit.
pub async fn run_pending_sweep(
    dispatcher: Arc<Dispatcher>,
    poller: StatusPoller,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!("pending fulfillment sweep running every {interval:?}");
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("pending sweep stopping");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
        for (order, remote_id) in dispatcher.sweep_once().await {
            poller.spawn(order.chat_id, remote_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Platform;
    use crate::notify::NullNotifier;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct ScriptedApi {
        balances: Mutex<Vec<f64>>,
        add_calls: AtomicUsize,
        fail_adds: bool,
    }

    impl ScriptedApi {
        fn new(balances: Vec<f64>) -> Self {
            Self {
                balances: Mutex::new(balances),
                add_calls: AtomicUsize::new(0),
                fail_adds: false,
            }
        }
    }

    #[async_trait]
    impl crate::fulfillment::FulfillmentApi for ScriptedApi {
        async fn services(&self) -> Result<Vec<Value>> {
            Ok(Vec::new())
        }

        async fn add_order(&self, _service: i64, _link: &str, _quantity: u32) -> Result<i64> {
            let call = self.add_calls.fetch_add(1, Ordering::SeqCst) as i64;
            if self.fail_adds {
                return Err(anyhow!("provider exploded"));
            }
            Ok(9000 + call)
        }

        async fn order_status(&self, _remote_id: i64) -> Result<crate::fulfillment::RemoteStatus> {
            Ok(crate::fulfillment::RemoteStatus::Completed)
        }

        async fn balance(&self) -> Result<f64> {
            let mut balances = self.balances.lock().unwrap();
            if balances.len() > 1 {
                Ok(balances.remove(0))
            } else {
                balances.first().copied().ok_or_else(|| anyhow!("no balance"))
            }
        }
    }

    fn order(id: &str, cost: f64) -> Order {
        Order {
            order_id: id.into(),
            chat_id: 77,
            service_id: 5,
            service_name: "Instagram Likes".into(),
            platform: Platform::Instagram,
            category: "Likes".into(),
            link: "https://instagram.com/p/x".into(),
            quantity: 500,
            amount: cost * 1.4,
            cost,
            payment_reference: None,
            remote_fulfillment_id: None,
        }
    }

    fn dispatcher(api: Arc<ScriptedApi>, dir: &tempfile::TempDir) -> (Dispatcher, Arc<PendingQueue>) {
        let queue = Arc::new(PendingQueue::open(dir.path().join("pending.json")));
        (
            Dispatcher::new(api, queue.clone(), Arc::new(NullNotifier)),
            queue,
        )
    }

    #[tokio::test]
    async fn short_balance_defers_and_queues() {
        let dir = tempdir().unwrap();
        let api = Arc::new(ScriptedApi::new(vec![50.0]));
        let (dispatcher, queue) = dispatcher(api.clone(), &dir);

        let outcome = dispatcher.dispatch(&order("77_1", 70.0)).await;
        assert_eq!(outcome, DispatchOutcome::Deferred);
        assert_eq!(queue.len().await, 1);
        assert_eq!(api.add_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sufficient_balance_submits_immediately() {
        let dir = tempdir().unwrap();
        let api = Arc::new(ScriptedApi::new(vec![100.0]));
        let (dispatcher, queue) = dispatcher(api.clone(), &dir);

        let outcome = dispatcher.dispatch(&order("77_1", 70.0)).await;
        assert_eq!(outcome, DispatchOutcome::Dispatched(9000));
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn sweep_submits_once_balance_recovers() {
        let dir = tempdir().unwrap();
        let api = Arc::new(ScriptedApi::new(vec![50.0, 100.0]));
        let (dispatcher, queue) = dispatcher(api.clone(), &dir);

        assert_eq!(
            dispatcher.dispatch(&order("77_1", 70.0)).await,
            DispatchOutcome::Deferred
        );

        // Balance is now 100: the entry fits, is submitted, and leaves the
        // queue for good.
        let submitted = dispatcher.sweep_once().await;
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].1, 9000);
        assert_eq!(queue.len().await, 0);

        assert!(dispatcher.sweep_once().await.is_empty());
        assert_eq!(api.add_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sweep_deducts_cost_as_it_iterates() {
        let dir = tempdir().unwrap();
        let api = Arc::new(ScriptedApi::new(vec![100.0]));
        let (dispatcher, queue) = dispatcher(api.clone(), &dir);

        queue.enqueue(order("77_1", 70.0)).await.unwrap();
        queue.enqueue(order("77_2", 40.0)).await.unwrap();

        // 100 covers the first entry but not both: 100 - 70 = 30 < 40.
        let submitted = dispatcher.sweep_once().await;
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].0.order_id, "77_1");

        let remaining = queue.snapshot().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].order.order_id, "77_2");
    }

    #[tokio::test]
    async fn failed_submission_leaves_queue_without_retry() {
        let dir = tempdir().unwrap();
        let mut api = ScriptedApi::new(vec![100.0]);
        api.fail_adds = true;
        let api = Arc::new(api);
        let (dispatcher, queue) = dispatcher(api.clone(), &dir);

        queue.enqueue(order("77_1", 70.0)).await.unwrap();
        assert!(dispatcher.sweep_once().await.is_empty());
        assert_eq!(queue.len().await, 0);
        assert_eq!(api.add_calls.load(Ordering::SeqCst), 1);
    }
}
