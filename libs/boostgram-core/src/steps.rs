use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::catalog::Platform;

/// Where a conversation currently is. Forward transitions push a new frame,
/// the back button pops one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Platform,
    Category,
    Service,
    Details,
    Link,
    Quantity,
    CustomQuantity,
    Summary,
    PhoneCollection,
    AwaitingProof,
    PaymentPending,
    PendingApproval,
    Processing,
    // Admin-only input steps.
    AwaitingMargin,
    AwaitingBroadcast,
}

/// One snapshot of everything known at a step. A pushed frame starts as a
/// copy of the previous one, so popping restores exactly what was known then.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub step: StepKind,
    pub platform: Option<Platform>,
    pub category: Option<String>,
    pub service_id: Option<i64>,
    pub link: Option<String>,
    pub quantity: Option<u32>,
    pub phone: Option<String>,
    pub order_id: Option<String>,
    pub amount: Option<f64>,
}

impl Frame {
    pub fn root() -> Self {
        Self {
            step: StepKind::Platform,
            platform: None,
            category: None,
            service_id: None,
            link: None,
            quantity: None,
            phone: None,
            order_id: None,
            amount: None,
        }
    }
}

/// Per-chat step stacks. Telegram serializes updates per chat, so the store
/// only needs atomic access to its own map.
#[derive(Default)]
pub struct StateStore {
    inner: RwLock<HashMap<i64, Vec<Frame>>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Top of the stack, lazily initializing a fresh `[root]` stack.
    pub async fn current(&self, chat_id: i64) -> Frame {
        let mut map = self.inner.write().await;
        let stack = map.entry(chat_id).or_insert_with(|| vec![Frame::root()]);
        stack.last().cloned().unwrap_or_else(Frame::root)
    }

    /// Copies the top frame, applies `overlay`, and pushes the result.
    /// Overlays only ever add or replace fields, never clear them.
    pub async fn push(&self, chat_id: i64, overlay: impl FnOnce(&mut Frame)) -> Frame {
        let mut map = self.inner.write().await;
        let stack = map.entry(chat_id).or_insert_with(|| vec![Frame::root()]);
        let mut next = stack.last().cloned().unwrap_or_else(Frame::root);
        overlay(&mut next);
        stack.push(next.clone());
        next
    }

    /// Removes the top frame and returns the restored one. The root frame is
    /// never removable.
    pub async fn pop(&self, chat_id: i64) -> Frame {
        let mut map = self.inner.write().await;
        let stack = map.entry(chat_id).or_insert_with(|| vec![Frame::root()]);
        if stack.len() > 1 {
            stack.pop();
        }
        stack.last().cloned().unwrap_or_else(Frame::root)
    }

    /// Discards the whole stack, used when an order reaches a terminal state.
    pub async fn reset(&self, chat_id: i64) {
        let mut map = self.inner.write().await;
        map.insert(chat_id, vec![Frame::root()]);
    }

    pub async fn depth(&self, chat_id: i64) -> usize {
        let map = self.inner.read().await;
        map.get(&chat_id).map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn current_lazily_initializes_root() {
        let store = StateStore::new();
        let frame = store.current(1).await;
        assert_eq!(frame, Frame::root());
        assert_eq!(store.depth(1).await, 1);
    }

    #[tokio::test]
    async fn push_inherits_previous_fields() {
        let store = StateStore::new();
        store
            .push(1, |f| {
                f.step = StepKind::Category;
                f.platform = Some(Platform::Instagram);
            })
            .await;
        let top = store
            .push(1, |f| {
                f.step = StepKind::Service;
                f.category = Some("Likes".into());
            })
            .await;
        assert_eq!(top.platform, Some(Platform::Instagram));
        assert_eq!(top.category.as_deref(), Some("Likes"));
    }

    #[tokio::test]
    async fn n_pops_restore_the_exact_prior_frame() {
        let store = StateStore::new();
        store
            .push(7, |f| {
                f.step = StepKind::Category;
                f.platform = Some(Platform::YouTube);
            })
            .await;
        let before = store.current(7).await;

        store
            .push(7, |f| {
                f.step = StepKind::Service;
                f.category = Some("Subscribers".into());
            })
            .await;
        store
            .push(7, |f| {
                f.step = StepKind::Link;
                f.service_id = Some(42);
            })
            .await;
        store
            .push(7, |f| {
                f.step = StepKind::Quantity;
                f.link = Some("https://youtube.com/c/x".into());
            })
            .await;

        store.pop(7).await;
        store.pop(7).await;
        let restored = store.pop(7).await;
        assert_eq!(restored, before);
    }

    #[tokio::test]
    async fn root_frame_is_never_removable() {
        let store = StateStore::new();
        store.pop(3).await;
        let frame = store.pop(3).await;
        assert_eq!(frame.step, StepKind::Platform);
        assert_eq!(store.depth(3).await, 1);
    }

    #[tokio::test]
    async fn reset_discards_everything() {
        let store = StateStore::new();
        store
            .push(5, |f| {
                f.step = StepKind::Processing;
                f.order_id = Some("5_1700000000".into());
            })
            .await;
        store.reset(5).await;
        assert_eq!(store.current(5).await, Frame::root());
    }
}
