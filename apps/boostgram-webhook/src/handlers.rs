use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tracing::{info, warn};

use boostgram_core::gateway::{verify_webhook_signature, WebhookEvent};
use boostgram_core::reconcile::ConfirmOutcome;

use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-razorpay-signature";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/webhook/payment", post(payment_webhook))
        .with_state(state)
}

async fn health() -> &'static str {
    "Webhook server is running"
}

/// Receives `payment_link.paid` events. The signature is verified over the
/// raw body before anything else happens; an invalid signature mutates no
/// state and alerts the operator.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    info!("received webhook event");

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_webhook_signature(&state.webhook_secret, &body, signature) {
        warn!("webhook signature verification failed");
        state
            .notifier
            .notify_operator("[Webhook] Invalid signature received!")
            .await;
        return (StatusCode::BAD_REQUEST, "invalid signature");
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("unparsable webhook body: {e}");
            return (StatusCode::BAD_REQUEST, "invalid payload");
        }
    };

    if event.event != WebhookEvent::PAYMENT_LINK_PAID {
        info!("ignoring webhook event '{}'", event.event);
        return (StatusCode::OK, "");
    }
    let Some(payment_link_id) = event.payment_link_id() else {
        warn!("payment_link.paid event without a payment link entity");
        return (StatusCode::OK, "");
    };

    // Mappings live on disk and are re-read here, so confirmations survive
    // restarts and a concurrently-writing bot process.
    let Some((chat_id, order)) = state.links.take(payment_link_id).await else {
        warn!("no order mapped to payment link {payment_link_id}");
        state
            .notifier
            .notify_operator(&format!(
                "[Webhook] No order found for payment link <code>{payment_link_id}</code>."
            ))
            .await;
        return (StatusCode::OK, "");
    };

    info!(
        chat_id,
        order_id = %order.order_id,
        "payment link paid, confirming order"
    );
    match state.reconciler.confirm(&order).await {
        ConfirmOutcome::Submitted(remote_id) => {
            state
                .notifier
                .notify_user(
                    chat_id,
                    &format!(
                        "✅ <b>Payment received!</b> Your order is confirmed and \
                         being processed.\nOrder ID: <code>{remote_id}</code>"
                    ),
                )
                .await;
        }
        ConfirmOutcome::Deferred => {
            state
                .notifier
                .notify_user(
                    chat_id,
                    "✅ <b>Payment received!</b> Your order is queued and will \
                     start processing shortly.",
                )
                .await;
        }
        ConfirmOutcome::Failed(e) => {
            state
                .notifier
                .notify_user(
                    chat_id,
                    "✅ Payment received! But there was an error placing your \
                     order. Please contact support.",
                )
                .await;
            state
                .notifier
                .notify_operator(&format!(
                    "[Webhook] Payment received for {chat_id}, but the order \
                     failed to submit: {e}"
                ))
                .await;
        }
        ConfirmOutcome::AlreadyProcessed => {
            info!(order_id = %order.order_id, "duplicate webhook delivery ignored");
        }
        ConfirmOutcome::Rejected => {}
    }

    (StatusCode::OK, "")
}
