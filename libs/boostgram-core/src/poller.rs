use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::fulfillment::{FulfillmentApi, RemoteStatus};
use crate::notify::Notifier;
use crate::steps::StateStore;

/// Spawns one polling task per submitted order. Each task queries remote
/// status on a fixed interval until a terminal state, sends exactly one
/// final notification, and resets the user's conversation. All tasks stop
/// on the shared shutdown signal.
#[derive(Clone)]
pub struct StatusPoller {
    api: Arc<dyn FulfillmentApi>,
    notifier: Arc<dyn Notifier>,
    steps: Arc<StateStore>,
    interval: Duration,
    shutdown: broadcast::Sender<()>,
}

impl StatusPoller {
    pub fn new(
        api: Arc<dyn FulfillmentApi>,
        notifier: Arc<dyn Notifier>,
        steps: Arc<StateStore>,
        interval: Duration,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            api,
            notifier,
            steps,
            interval,
            shutdown,
        }
    }

    pub fn spawn(&self, chat_id: i64, remote_id: i64) {
        let poller = self.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            info!(chat_id, remote_id, "status poller started");
            let mut fetch_failure_reported = false;
            loop {
                match poller.api.order_status(remote_id).await {
                    Ok(status) => {
                        fetch_failure_reported = false;
                        if poller.handle_status(chat_id, remote_id, status).await {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(remote_id, "status fetch failed: {e}");
                        if !fetch_failure_reported {
                            fetch_failure_reported = true;
                            poller
                                .notifier
                                .notify_user(
                                    chat_id,
                                    "⚠️ Could not fetch your order status right now. \
                                     Will keep retrying.",
                                )
                                .await;
                        }
                    }
                }

                tokio::select! {
                    _ = shutdown.recv() => {
                        info!(remote_id, "status poller stopping");
                        break;
                    }
                    _ = tokio::time::sleep(poller.interval) => {}
                }
            }
        });
    }

    /// Returns true when the order reached a terminal state.
    async fn handle_status(&self, chat_id: i64, remote_id: i64, status: RemoteStatus) -> bool {
        match status {
            RemoteStatus::Completed => {
                self.notifier
                    .notify_user(
                        chat_id,
                        &format!(
                            "🎉 <b>Your order (ID: {remote_id}) has been successfully \
                             delivered!</b>"
                        ),
                    )
                    .await;
            }
            RemoteStatus::Canceled => {
                self.notifier
                    .notify_user(
                        chat_id,
                        &format!(
                            "❌ <b>Your order (ID: {remote_id}) could not be completed. \
                             Please contact support.</b>"
                        ),
                    )
                    .await;
            }
            RemoteStatus::Partial { remains } => {
                self.notifier
                    .notify_user(
                        chat_id,
                        &format!(
                            "⚠️ <b>Your order (ID: {remote_id}) was partially completed. \
                             Remaining: {remains}</b>"
                        ),
                    )
                    .await;
            }
            RemoteStatus::InProgress(raw) => {
                self.notifier
                    .notify_user(
                        chat_id,
                        &format!(
                            "⏳ <b>Your order (ID: {remote_id}) is still processing. \
                             Status: {raw}</b>"
                        ),
                    )
                    .await;
                return false;
            }
        }
        info!(chat_id, remote_id, "order reached terminal status");
        self.steps.reset(chat_id).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;

    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify_user(&self, _chat_id: i64, text: &str) {
            self.messages.lock().unwrap().push(text.to_string());
        }
        async fn notify_operator(&self, _text: &str) {}
    }

    struct SequenceApi {
        statuses: Mutex<Vec<Result<RemoteStatus>>>,
    }

    #[async_trait]
    impl FulfillmentApi for SequenceApi {
        async fn services(&self) -> Result<Vec<Value>> {
            Ok(Vec::new())
        }
        async fn add_order(&self, _s: i64, _l: &str, _q: u32) -> Result<i64> {
            Ok(1)
        }
        async fn order_status(&self, _remote_id: i64) -> Result<RemoteStatus> {
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.is_empty() {
                Ok(RemoteStatus::Completed)
            } else {
                statuses.remove(0)
            }
        }
        async fn balance(&self) -> Result<f64> {
            Ok(0.0)
        }
    }

    fn poller(
        statuses: Vec<Result<RemoteStatus>>,
    ) -> (StatusPoller, Arc<RecordingNotifier>, Arc<StateStore>) {
        let notifier = Arc::new(RecordingNotifier {
            messages: Mutex::new(Vec::new()),
        });
        let steps = Arc::new(StateStore::new());
        let (shutdown, _) = broadcast::channel(1);
        let poller = StatusPoller::new(
            Arc::new(SequenceApi {
                statuses: Mutex::new(statuses),
            }),
            notifier.clone(),
            steps.clone(),
            Duration::from_millis(5),
            shutdown,
        );
        (poller, notifier, steps)
    }

    #[tokio::test]
    async fn terminal_status_notifies_once_and_resets_state() {
        let (poller, notifier, steps) = poller(vec![
            Ok(RemoteStatus::InProgress("Pending".into())),
            Ok(RemoteStatus::Completed),
        ]);
        steps
            .push(77, |f| f.step = crate::steps::StepKind::Processing)
            .await;

        poller.spawn(77, 9001);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let messages = notifier.messages.lock().unwrap().clone();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("still processing"));
        assert!(messages[1].contains("successfully"));
        assert_eq!(steps.depth(77).await, 1);
    }

    #[tokio::test]
    async fn fetch_failures_notify_only_once() {
        let (poller, notifier, _steps) = poller(vec![
            Err(anyhow!("timeout")),
            Err(anyhow!("timeout")),
            Ok(RemoteStatus::Completed),
        ]);

        poller.spawn(77, 9001);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let messages = notifier.messages.lock().unwrap().clone();
        let retry_notes = messages
            .iter()
            .filter(|m| m.contains("keep retrying"))
            .count();
        assert_eq!(retry_notes, 1);
        assert!(messages.last().unwrap().contains("successfully"));
    }

    #[tokio::test]
    async fn partial_completion_reports_remains() {
        let (poller, notifier, _steps) = poller(vec![Ok(RemoteStatus::Partial {
            remains: "120".into(),
        })]);

        poller.spawn(77, 9001);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let messages = notifier.messages.lock().unwrap().clone();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("Remaining: 120"));
    }
}
