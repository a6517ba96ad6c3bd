use anyhow::{anyhow, Context, Result};
use boostgram_core::order::Order;
use boostgram_core::pricing;
use boostgram_core::steps::{Frame, StepKind};
use boostgram_core::validate::{validate_link, validate_phone};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use tracing::{error, info, warn};

use crate::bot::{flow, keyboards};
use crate::state::AppState;

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    let chat = msg.chat.id;
    let chat_id = chat.0;

    if let Some(text) = msg.text() {
        if text.starts_with("/start") {
            info!(chat_id, "user started the bot");
            state.users.add(chat_id).await;
            state.steps.reset(chat_id).await;

            if state.config.is_admin(chat_id) {
                let _ = bot
                    .send_message(chat, "👋 Welcome, Admin! Here is your control panel.")
                    .reply_markup(keyboards::admin_keyboard())
                    .await;
            } else {
                let platforms = state.catalog.platforms().await;
                let _ = bot
                    .send_message(chat, flow::WELCOME_TEXT)
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboards::platform_keyboard(&platforms))
                    .await;
            }
            return Ok(());
        }

        if text.trim() == "/manageraccess" {
            let _ = bot
                .send_message(chat, flow::manager_access_text())
                .parse_mode(ParseMode::Html)
                .await;
            return Ok(());
        }
    }

    let frame = state.steps.current(chat_id).await;

    if msg.photo().is_some() {
        if frame.step == StepKind::AwaitingProof {
            if let Err(e) = handle_payment_proof(&bot, &msg, &state, &frame).await {
                error!(chat_id, "payment proof handling failed: {e:#}");
                let _ = bot
                    .send_message(
                        chat,
                        "❌ Could not process your screenshot. Please send it again.",
                    )
                    .await;
            }
        }
        return Ok(());
    }

    let Some(text) = msg.text().map(str::to_owned) else {
        return Ok(());
    };

    let result = match frame.step {
        StepKind::Link => handle_link_input(&bot, &state, chat, &text).await,
        StepKind::CustomQuantity => handle_custom_quantity(&bot, &state, chat, &text).await,
        StepKind::PhoneCollection => handle_phone_input(&bot, &state, chat, &text).await,
        StepKind::AwaitingProof => {
            let _ = bot
                .send_message(
                    chat,
                    "📸 Please upload your payment screenshot to complete your order.",
                )
                .reply_markup(keyboards::payment_keyboard())
                .await;
            Ok(())
        }
        StepKind::AwaitingMargin if state.config.is_admin(chat_id) => {
            handle_margin_input(&bot, &state, chat, &text).await
        }
        StepKind::AwaitingBroadcast if state.config.is_admin(chat_id) => {
            handle_broadcast_input(&bot, &state, chat, &text).await
        }
        _ => Ok(()),
    };

    if let Err(e) = result {
        error!(chat_id, "message handling failed: {e:#}");
    }
    Ok(())
}

async fn handle_link_input(bot: &Bot, state: &AppState, chat: ChatId, text: &str) -> Result<()> {
    let link = match validate_link(text) {
        Ok(link) => link,
        Err(e) => {
            bot.send_message(chat, format!("❌ {e}. Please send a valid link."))
                .await?;
            return Ok(());
        }
    };

    let frame = state.steps.current(chat.0).await;
    let Some(service_id) = frame.service_id else {
        return flow::report_incomplete(bot, state, chat).await;
    };
    let Some(service) = state.catalog.find(service_id).await else {
        return flow::report_incomplete(bot, state, chat).await;
    };

    if service.is_fixed_duration() {
        // Watch-time products run for a fixed duration; quantity is implicit.
        let quantity = boostgram_core::catalog::Service::FIXED_DURATION_QUANTITY;
        let margin = state.margin.margin().await;
        let amount = pricing::quote(service.base_price_per_1000, quantity, margin);
        let frame = state
            .steps
            .push(chat.0, |f| {
                f.step = StepKind::Summary;
                f.link = Some(link);
                f.quantity = Some(quantity);
                f.amount = Some(amount);
            })
            .await;
        return flow::show_summary(bot, state, chat, &frame, None).await;
    }

    state
        .steps
        .push(chat.0, |f| {
            f.step = StepKind::Quantity;
            f.link = Some(link);
        })
        .await;
    bot.send_message(chat, "✅ Link received! Now, how much engagement would you like?")
        .reply_markup(keyboards::quantity_keyboard())
        .await?;
    Ok(())
}

async fn handle_custom_quantity(
    bot: &Bot,
    state: &AppState,
    chat: ChatId,
    text: &str,
) -> Result<()> {
    let quantity: u32 = match text.trim().parse() {
        Ok(q) if q > 0 => q,
        _ => {
            bot.send_message(
                chat,
                "❌ Invalid input. Please enter a valid whole number (e.g., 150).",
            )
            .await?;
            return Ok(());
        }
    };

    // The custom-quantity prompt step is fulfilled; drop it before advancing
    // so "back" from the summary returns to the quantity keyboard.
    state.steps.pop(chat.0).await;
    flow::process_quantity(bot, state, chat, quantity, None).await
}

async fn handle_phone_input(bot: &Bot, state: &AppState, chat: ChatId, text: &str) -> Result<()> {
    let phone = match validate_phone(text) {
        Ok(phone) => phone,
        Err(e) => {
            bot.send_message(chat, format!("❌ {e}. Please try again."))
                .await?;
            return Ok(());
        }
    };

    let frame = state.steps.current(chat.0).await;
    let (Some(service_id), Some(link), Some(quantity), Some(amount), Some(order_id)) = (
        frame.service_id,
        frame.link.clone(),
        frame.quantity,
        frame.amount,
        frame.order_id.clone(),
    ) else {
        return flow::report_incomplete(bot, state, chat).await;
    };
    let Some(service) = state.catalog.find(service_id).await else {
        return flow::report_incomplete(bot, state, chat).await;
    };
    let Some(gateway) = state.gateway.as_ref() else {
        return Err(anyhow!("payment_link mode without a gateway client"));
    };

    let margin = state.margin.margin().await;
    let mut order = Order::build(order_id.clone(), chat.0, &service, link, quantity, margin);
    // Honor the amount quoted on the summary, even if the margin moved since.
    order.amount = amount;

    let description = format!("{} x{}", service.name, quantity);
    let payment_link = match gateway
        .create_payment_link(amount, &order_id, &phone, &description)
        .await
    {
        Ok(link) => link,
        Err(e) => {
            error!("payment link creation failed for {order_id}: {e:#}");
            bot.send_message(
                chat,
                "❌ Could not create your payment link. Please send your number \
                 again, or contact support.",
            )
            .await?;
            return Ok(());
        }
    };

    order.payment_reference = Some(payment_link.id.clone());
    state
        .links
        .insert(&payment_link.id, chat.0, &order)
        .await
        .context("persisting payment link mappings")?;

    state
        .steps
        .push(chat.0, |f| {
            f.step = StepKind::PaymentPending;
            f.phone = Some(phone.clone());
        })
        .await;

    bot.send_message(
        chat,
        format!(
            "💳 <b>Payment link sent via SMS to {phone}.</b>\n\
             You can also pay directly here: {}\n\n\
             Your order will be processed automatically once the payment is \
             confirmed.",
            payment_link.short_url
        ),
    )
    .parse_mode(ParseMode::Html)
    .reply_markup(keyboards::payment_keyboard())
    .await?;
    Ok(())
}

async fn handle_payment_proof(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    frame: &Frame,
) -> Result<()> {
    let chat = msg.chat.id;
    let (Some(service_id), Some(link), Some(quantity), Some(amount), Some(order_id)) = (
        frame.service_id,
        frame.link.clone(),
        frame.quantity,
        frame.amount,
        frame.order_id.clone(),
    ) else {
        return flow::report_incomplete(bot, state, chat).await;
    };
    let Some(service) = state.catalog.find(service_id).await else {
        return flow::report_incomplete(bot, state, chat).await;
    };

    let photo = msg
        .photo()
        .and_then(|sizes| sizes.last())
        .ok_or_else(|| anyhow!("photo update without sizes"))?;

    let file = bot.get_file(photo.file.id.clone()).await?;
    let proof_path = state
        .config
        .proofs_dir()
        .join(format!("payment_{}_{}.jpg", chat.0, order_id));
    let mut dst = tokio::fs::File::create(&proof_path)
        .await
        .context("creating proof file")?;
    bot.download_file(&file.path, &mut dst)
        .await
        .context("downloading proof image")?;

    bot.send_message(
        chat,
        "✅ Payment screenshot received! Your order is now pending admin \
         verification.",
    )
    .await?;

    let cost = pricing::wholesale_cost(service.base_price_per_1000, quantity);
    let total_orders = state.stats.record_order().await;
    let caption = format!(
        "New Order Pending Approval\n\
         🟢 User ID: {}\n\
         🟢 Platform: {}\n\
         🟢 Category: {}\n\
         🟢 Service: {}\n\
         🟢 Link: {}\n\
         🟢 Quantity: {}\n\
         💰 Amount (User): ₹{}\n\
         💵 Cost (Actual): ₹{}\n\
         📈 Profit: ₹{}\n\n\
         📊 Total Orders Processed: {}\n\n\
         Please review the payment proof and approve or reject the order.",
        chat.0,
        service.platform,
        service.category,
        service.name,
        link,
        quantity,
        pricing::format_inr(amount),
        pricing::format_inr(cost),
        pricing::format_inr(amount - cost),
        total_orders,
    );

    for admin in &state.config.admin_ids {
        if let Err(e) = bot
            .send_photo(ChatId(*admin), InputFile::file(proof_path.clone()))
            .caption(caption.clone())
            .reply_markup(keyboards::approval_keyboard(chat.0, &order_id))
            .await
        {
            error!(admin, "failed to send order notification: {e}");
        }
    }

    state
        .steps
        .push(chat.0, |f| f.step = StepKind::PendingApproval)
        .await;
    Ok(())
}

async fn handle_margin_input(bot: &Bot, state: &AppState, chat: ChatId, text: &str) -> Result<()> {
    let percent: f64 = match text.trim().parse() {
        Ok(p) if p >= 0.0 => p,
        _ => {
            bot.send_message(chat, "❌ Invalid input. Please enter a number (e.g., 40).")
                .await?;
            return Ok(());
        }
    };

    state
        .margin
        .set_percent(percent)
        .await
        .context("persisting new margin")?;

    // Re-price the catalog against the new margin.
    if let Err(e) = state.catalog.reload().await {
        warn!("catalog reload after margin change failed: {e:#}");
        bot.send_message(
            chat,
            "⚠️ Margin saved, but the catalog could not be refreshed. \
             Prices will update on the next reload.",
        )
        .await?;
    }

    bot.send_message(
        chat,
        format!("✅ Profit margin has been updated to {percent}%."),
    )
    .await?;

    state.steps.reset(chat.0).await;
    bot.send_message(chat, "Returning to the admin panel.")
        .reply_markup(keyboards::admin_keyboard())
        .await?;
    Ok(())
}

async fn handle_broadcast_input(
    bot: &Bot,
    state: &AppState,
    chat: ChatId,
    text: &str,
) -> Result<()> {
    let audience = state.users.all().await;
    let total = audience.len();
    let mut delivered = 0usize;

    for user in audience {
        match bot
            .send_message(ChatId(user), text)
            .parse_mode(ParseMode::Html)
            .await
        {
            Ok(_) => delivered += 1,
            Err(e) => warn!(user, "broadcast delivery failed: {e}"),
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    bot.send_message(
        chat,
        format!("📣 Broadcast delivered to {delivered} of {total} users."),
    )
    .await?;

    state.steps.reset(chat.0).await;
    bot.send_message(chat, "Returning to the admin panel.")
        .reply_markup(keyboards::admin_keyboard())
        .await?;
    Ok(())
}
