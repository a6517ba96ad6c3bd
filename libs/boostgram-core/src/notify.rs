use async_trait::async_trait;

/// Outbound notifications, implemented over the chat transport by each
/// binary. Implementations log delivery failures instead of propagating
/// them; a dropped notification must never abort order processing.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Message to one user, HTML formatting.
    async fn notify_user(&self, chat_id: i64, text: &str);

    /// Message to the operator channel (every configured admin).
    async fn notify_operator(&self, text: &str);
}

/// No-op notifier for tests.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify_user(&self, _chat_id: i64, _text: &str) {}
    async fn notify_operator(&self, _text: &str) {}
}
