use anyhow::Result;
use boostgram_core::catalog::Platform;
use boostgram_core::order::Order;
use boostgram_core::reconcile::ConfirmOutcome;
use boostgram_core::steps::StepKind;
use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{error, info};

use crate::bot::{flow, keyboards};
use crate::state::AppState;

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    info!("Received callback: {:?}", q.data);
    let callback_id = q.id.clone();
    let from_id = q.from.id.0 as i64;

    let Some(data) = q.data else {
        let _ = bot.answer_callback_query(callback_id).await;
        return Ok(());
    };
    let Some(msg) = q.message else {
        let _ = bot.answer_callback_query(callback_id).await;
        return Ok(());
    };
    let chat = msg.chat().id;
    let message_id = msg.id();

    match data.as_str() {
        "back" => {
            let _ = bot.answer_callback_query(callback_id).await;
            let restored = state.steps.pop(chat.0).await;
            info!(chat_id = chat.0, step = ?restored.step, "back navigation");
            if let Err(e) = flow::render_frame(&bot, &state, chat, message_id, &restored).await {
                error!("back navigation render failed: {e:#}");
            }
        }

        platform if platform.starts_with("platform_") => {
            let _ = bot.answer_callback_query(callback_id).await;
            let Some(platform) = Platform::parse(&platform["platform_".len()..]) else {
                return Ok(());
            };
            let frame = state
                .steps
                .push(chat.0, |f| {
                    f.step = StepKind::Category;
                    f.platform = Some(platform);
                })
                .await;
            let _ = flow::render_frame(&bot, &state, chat, message_id, &frame).await;
        }

        category if category.starts_with("category_") => {
            let _ = bot.answer_callback_query(callback_id).await;
            let category = category["category_".len()..].to_string();
            let frame = state
                .steps
                .push(chat.0, |f| {
                    f.step = StepKind::Service;
                    f.category = Some(category);
                })
                .await;
            let _ = flow::render_frame(&bot, &state, chat, message_id, &frame).await;
        }

        service if service.starts_with("service_") => {
            let Ok(service_id) = service["service_".len()..].parse::<i64>() else {
                let _ = bot.answer_callback_query(callback_id).await;
                return Ok(());
            };
            if state.catalog.find(service_id).await.is_none() {
                let _ = bot
                    .answer_callback_query(callback_id)
                    .text("❌ Error: Service not found. It might be outdated.")
                    .show_alert(true)
                    .await;
                return Ok(());
            }
            let _ = bot.answer_callback_query(callback_id).await;
            let frame = state
                .steps
                .push(chat.0, |f| {
                    f.step = StepKind::Details;
                    f.service_id = Some(service_id);
                })
                .await;
            let _ = flow::render_frame(&bot, &state, chat, message_id, &frame).await;
        }

        "details_next" => {
            let _ = bot.answer_callback_query(callback_id).await;
            let frame = state.steps.push(chat.0, |f| f.step = StepKind::Link).await;
            let _ = flow::render_frame(&bot, &state, chat, message_id, &frame).await;
        }

        quantity if quantity.starts_with("quantity_") => {
            let _ = bot.answer_callback_query(callback_id).await;
            let Ok(quantity) = quantity["quantity_".len()..].parse::<u32>() else {
                return Ok(());
            };
            if let Err(e) =
                flow::process_quantity(&bot, &state, chat, quantity, Some(message_id)).await
            {
                error!("quantity processing failed: {e:#}");
            }
        }

        "custom_quantity" => {
            let _ = bot.answer_callback_query(callback_id).await;
            state
                .steps
                .push(chat.0, |f| f.step = StepKind::CustomQuantity)
                .await;
            let _ = bot
                .send_message(chat, "💡 Please enter the desired quantity (e.g., 1000):")
                .await;
        }

        "confirm_order" => {
            let _ = bot.answer_callback_query(callback_id).await;
            if let Err(e) = handle_confirm_order(&bot, &state, chat).await {
                error!("order confirmation failed: {e:#}");
            }
        }

        approval if approval.starts_with("approve_") || approval.starts_with("reject_") => {
            if !state.config.is_admin(from_id) {
                let _ = bot
                    .answer_callback_query(callback_id)
                    .text("You are not authorized.")
                    .show_alert(true)
                    .await;
                return Ok(());
            }
            match handle_approval(&bot, &state, approval).await {
                Ok(Some(answer)) => {
                    let _ = bot.answer_callback_query(callback_id).text(answer).await;
                }
                Ok(None) => {
                    let _ = bot.answer_callback_query(callback_id).await;
                }
                Err(e) => {
                    error!("approval handling failed: {e:#}");
                    let _ = bot.answer_callback_query(callback_id).await;
                }
            }
        }

        "manageraccess_info" => {
            let _ = bot.answer_callback_query(callback_id).await;
            let _ = bot
                .send_message(chat, flow::manager_access_text())
                .parse_mode(ParseMode::Html)
                .await;
        }

        admin if admin.starts_with("admin_") || admin == "set_margin" => {
            if !state.config.is_admin(from_id) {
                let _ = bot
                    .answer_callback_query(callback_id)
                    .text("You are not authorized.")
                    .show_alert(true)
                    .await;
                return Ok(());
            }
            let _ = bot.answer_callback_query(callback_id).await;
            handle_admin_panel(&bot, &state, chat, message_id, admin).await;
        }

        _ => {
            let _ = bot.answer_callback_query(callback_id).await;
        }
    }

    Ok(())
}

/// Summary confirmed: mint the order id and branch into the configured
/// payment path.
async fn handle_confirm_order(bot: &Bot, state: &AppState, chat: ChatId) -> Result<()> {
    let frame = state.steps.current(chat.0).await;
    if frame.step != StepKind::Summary
        || frame.service_id.is_none()
        || frame.link.is_none()
        || frame.quantity.is_none()
        || frame.amount.is_none()
    {
        return flow::report_incomplete(bot, state, chat).await;
    }

    let order_id = Order::mint_id(chat.0, Utc::now());
    info!(chat_id = chat.0, %order_id, "order confirmed");

    match state.config.payment_mode {
        boostgram_core::config::PaymentMode::UpiQr => {
            let frame = state
                .steps
                .push(chat.0, |f| {
                    f.step = StepKind::AwaitingProof;
                    f.order_id = Some(order_id);
                })
                .await;
            bot.send_message(
                chat,
                "🎉 <b>Thank you for your order!</b>\n\
                 You're one step away. Complete the payment below to get started. 🚀",
            )
            .parse_mode(ParseMode::Html)
            .await?;
            flow::send_payment_instructions(bot, state, chat, &frame).await
        }
        boostgram_core::config::PaymentMode::PaymentLink => {
            state
                .steps
                .push(chat.0, |f| {
                    f.step = StepKind::PhoneCollection;
                    f.order_id = Some(order_id);
                })
                .await;
            bot.send_message(
                chat,
                "📱 Please send the mobile number for payment (10 digits). \
                 A payment link will be sent to it via SMS:",
            )
            .reply_markup(keyboards::payment_keyboard())
            .await?;
            Ok(())
        }
    }
}

/// Admin approve/reject. Both are exactly-once: the reconciler claims the
/// order id before anything touches the fulfillment API. Returns the text
/// to answer the callback query with.
async fn handle_approval(
    bot: &Bot,
    state: &AppState,
    data: &str,
) -> Result<Option<&'static str>> {
    let mut parts = data.splitn(3, '_');
    let action = parts.next().unwrap_or_default();
    let (Some(user_raw), Some(order_id)) = (parts.next(), parts.next()) else {
        return Ok(None);
    };
    let Ok(user_id) = user_raw.parse::<i64>() else {
        return Ok(None);
    };
    let user_chat = ChatId(user_id);

    if action == "reject" {
        return match state.reconciler.reject(order_id).await {
            ConfirmOutcome::Rejected => {
                let _ = bot
                    .send_message(
                        user_chat,
                        "❌ <b>Your payment was not approved.</b>\n\
                         Please try again or contact support if you believe this \
                         is a mistake.",
                    )
                    .parse_mode(ParseMode::Html)
                    .await;
                state.steps.reset(user_id).await;
                Ok(Some("Order rejected."))
            }
            _ => Ok(Some("Order already processed.")),
        };
    }

    let frame = state.steps.current(user_id).await;
    if frame.step != StepKind::PendingApproval || frame.order_id.as_deref() != Some(order_id) {
        return Ok(Some("Order not found or already processed."));
    }

    let (Some(service_id), Some(link), Some(quantity)) =
        (frame.service_id, frame.link.clone(), frame.quantity)
    else {
        return Ok(Some("Order data is incomplete."));
    };
    let Some(service) = state.catalog.find(service_id).await else {
        let _ = bot
            .send_message(
                user_chat,
                "❌ <b>There was a configuration error with this service. \
                 Please contact support.</b>",
            )
            .parse_mode(ParseMode::Html)
            .await;
        return Ok(Some("Approval failed: service is gone."));
    };

    let margin = state.margin.margin().await;
    let mut order = Order::build(
        order_id.to_string(),
        user_id,
        &service,
        link,
        quantity,
        margin,
    );
    if let Some(amount) = frame.amount {
        order.amount = amount;
    }
    order.payment_reference = Some(
        state
            .config
            .proofs_dir()
            .join(format!("payment_{user_id}_{order_id}.jpg"))
            .display()
            .to_string(),
    );

    let answer = match state.reconciler.confirm(&order).await {
        ConfirmOutcome::Submitted(remote_id) => {
            let _ = bot
                .send_message(
                    user_chat,
                    format!(
                        "✅ <b>Your payment has been approved!</b>\n\
                         Your order is now being processed.\n\
                         Order ID: <code>{remote_id}</code>\n\
                         Thank you for your trust!"
                    ),
                )
                .parse_mode(ParseMode::Html)
                .await;
            state
                .steps
                .push(user_id, |f| f.step = StepKind::Processing)
                .await;
            "Order approved!"
        }
        ConfirmOutcome::Deferred => {
            let _ = bot
                .send_message(
                    user_chat,
                    "✅ <b>Your payment has been approved!</b>\n\
                     Your order is queued and will start processing shortly.",
                )
                .parse_mode(ParseMode::Html)
                .await;
            state
                .steps
                .push(user_id, |f| f.step = StepKind::Processing)
                .await;
            "Order approved (queued)."
        }
        ConfirmOutcome::Failed(e) => {
            error!("fulfillment submission failed on approval: {e}");
            let _ = bot
                .send_message(
                    user_chat,
                    "❌ <b>There was an error placing your order. Please \
                     contact support.</b>",
                )
                .parse_mode(ParseMode::Html)
                .await;
            state.steps.reset(user_id).await;
            "Approval failed, see logs."
        }
        ConfirmOutcome::AlreadyProcessed => "Order already processed.",
        ConfirmOutcome::Rejected => return Ok(None),
    };
    Ok(Some(answer))
}

async fn handle_admin_panel(
    bot: &Bot,
    state: &AppState,
    chat: ChatId,
    message_id: teloxide::types::MessageId,
    action: &str,
) {
    match action {
        "admin_total_orders" => {
            let total = state.stats.total_orders().await;
            let _ = bot
                .edit_message_text(chat, message_id, format!("📊 Total Orders Processed: {total}"))
                .reply_markup(keyboards::admin_keyboard())
                .await;
        }
        "admin_status" => {
            let margin = state.margin.margin().await;
            let mode = match state.config.payment_mode {
                boostgram_core::config::PaymentMode::UpiQr => "UPI QR",
                boostgram_core::config::PaymentMode::PaymentLink => "Payment link",
            };
            let _ = bot
                .edit_message_text(
                    chat,
                    message_id,
                    format!(
                        "Bot Status:\n- Running smoothly\n- Profit Margin: {:.0}%\n- Payment mode: {mode}",
                        margin.percent()
                    ),
                )
                .reply_markup(keyboards::admin_keyboard())
                .await;
        }
        "admin_balance" => {
            let text = match state.api.balance().await {
                Ok(balance) => format!(
                    "💳 Fulfillment account balance: ₹{}",
                    boostgram_core::pricing::format_inr(balance)
                ),
                Err(e) => {
                    error!("balance inspection failed: {e:#}");
                    "⚠️ Could not fetch the balance right now.".to_string()
                }
            };
            let _ = bot
                .edit_message_text(chat, message_id, text)
                .reply_markup(keyboards::admin_keyboard())
                .await;
        }
        "admin_broadcast" => {
            state
                .steps
                .push(chat.0, |f| f.step = StepKind::AwaitingBroadcast)
                .await;
            let _ = bot
                .edit_message_text(
                    chat,
                    message_id,
                    "📣 Send the message to broadcast to all known users:",
                )
                .await;
        }
        "set_margin" => {
            state
                .steps
                .push(chat.0, |f| f.step = StepKind::AwaitingMargin)
                .await;
            let margin = state.margin.margin().await;
            let _ = bot
                .edit_message_text(
                    chat,
                    message_id,
                    format!(
                        "Please enter the new profit margin <b>percentage</b>.\n\n\
                         For example, for a 40% margin, enter 40.\n\
                         The current margin is {:.0}%.",
                        margin.percent()
                    ),
                )
                .parse_mode(ParseMode::Html)
                .await;
        }
        _ => {}
    }
}
