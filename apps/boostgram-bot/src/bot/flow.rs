use anyhow::Result;
use boostgram_core::catalog::{Platform, Service};
use boostgram_core::error::CoreError;
use boostgram_core::pricing::{self, Margin};
use boostgram_core::steps::{Frame, StepKind};
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, ParseMode};
use tracing::warn;

use crate::qr;
use crate::state::AppState;

use super::keyboards;

pub const WELCOME_TEXT: &str = "👋 <b>Welcome to Boostgram!</b>\n\
    <b>Grow your social media with real engagement.</b>\n\n\
    🟢 <b>How does it work?</b>\n\
    1️⃣ Pick a platform\n\
    2️⃣ Choose a service\n\
    3️⃣ Paste your content link\n\
    4️⃣ Select quantity & see the price\n\
    5️⃣ Pay securely\n\
    6️⃣ Your order is processed automatically\n\n\
    ℹ️ For YouTube Watch Time you may need to provide <b>Manager Access</b>. \
    Type /manageraccess to learn more.\n\n\
    Ready to grow? Tap below to get started! 👇";

pub fn manager_access_text() -> String {
    "<b>What \"Manager Access\" means:</b>\n\n\
     Watch-time services upload one video to your channel and run the watch \
     time on it, which requires temporary manager rights.\n\n\
     1️⃣ Open <b>YouTube Studio</b> → <b>Settings</b>\n\
     2️⃣ Go to <b>Channel → Advanced settings</b>\n\
     3️⃣ Under <b>Channel managers</b>, tap <b>Add or remove managers</b>\n\
     4️⃣ Add the manager email shown in the service details\n\
     5️⃣ Grant <b>Manager</b> permissions (not just Editor)\n\n\
     ✅ Keep the access and the uploaded video in place while the order runs.\n\
     ✅ You can make the video public or remove it one day after completion."
        .to_string()
}

/// Per-service wording for the link prompt, following what each platform
/// actually needs (profile vs post vs channel link).
pub fn link_prompt(service: &Service) -> String {
    let name = service.name.to_lowercase();
    let target = match service.platform {
        Platform::YouTube if name.contains("subscribe") => "YouTube <b>channel link</b>",
        Platform::YouTube => "YouTube <b>video link</b>",
        Platform::Instagram if name.contains("follower") => "Instagram <b>profile link</b>",
        Platform::Instagram => "Instagram <b>post or story link</b>",
        Platform::Telegram if name.contains("member") => "<b>channel or group link</b>",
        Platform::Telegram => "<b>post link</b>",
        Platform::Twitter => "<b>tweet link</b>",
        Platform::Facebook if name.contains("follower") => "<b>page or profile link</b>",
        Platform::Facebook => "<b>post or video link</b>",
        Platform::TikTok if name.contains("follower") => "TikTok <b>profile link</b>",
        Platform::TikTok => "TikTok <b>video link</b>",
    };
    format!("🔗 Great! You chose <b>{}</b>. Please send your {target}.", service.name)
}

pub fn service_details_text(service: &Service, margin: Margin) -> String {
    let rate = pricing::rate_per_1000(service.base_price_per_1000, margin);

    let mut example_prices = String::new();
    if service.min_quantity > 0 {
        let quantities: Vec<u32> = [1u32, 2, 5, 10]
            .iter()
            .map(|m| service.min_quantity * m)
            .filter(|q| *q <= service.max_quantity)
            .take(4)
            .collect();
        let quantities = if quantities.is_empty() {
            vec![service.min_quantity]
        } else {
            quantities
        };
        for q in quantities {
            let price = pricing::quote(service.base_price_per_1000, q, margin);
            example_prices.push_str(&format!(
                "• {q} {}: <b>₹{}</b>\n",
                service.unit_label(),
                pricing::format_inr(price)
            ));
        }
    }

    let mut text = format!(
        "<b>🔍 Service Details: {}</b>\n\n\
         <b>💰 Price per 1000:</b> ₹{}\n\n\
         <b>📊 Example Prices:</b>\n{}\n\
         <b>Minimum Order:</b> {}\n\
         <b>Maximum Order:</b> {}\n\n\
         <b>Refill Available:</b> {}\n\
         <b>Order Cancel:</b> {}\n\n",
        service.name,
        pricing::format_inr(rate),
        if example_prices.is_empty() {
            "N/A\n".to_string()
        } else {
            example_prices
        },
        service.min_quantity,
        service.max_quantity,
        if service.supports_refill { "✅ Yes" } else { "❌ No" },
        if service.supports_cancel { "✅ Yes" } else { "❌ No" },
    );

    if service.platform == Platform::Instagram {
        text.push_str(
            "⚠️ <b>Important:</b> private accounts are not accepted. Your \
             account must be public to receive the service.\n\n",
        );
    }
    text.push_str("Tap 'Next' to provide the link for your order.");
    text
}

fn summary_text(frame: &Frame, service: &Service) -> String {
    format!(
        "<b>📝 Order Summary</b>\n\n\
         🟢 Platform: {}\n\
         🟢 Category: {}\n\
         🟢 Service: {}\n\
         🟢 Link: {}\n\
         🟢 Quantity: {}\n\
         💰 <b>Total Amount: ₹{}</b>",
        service.platform,
        service.category,
        service.name,
        frame.link.as_deref().unwrap_or("-"),
        frame.quantity.unwrap_or_default(),
        pricing::format_inr(frame.amount.unwrap_or_default()),
    )
}

/// Tells the user their in-flight order lost its prerequisites (usually a
/// catalog reload dropped the service) and restarts the conversation.
pub async fn report_incomplete(bot: &Bot, state: &AppState, chat: ChatId) -> Result<()> {
    state.steps.reset(chat.0).await;
    bot.send_message(
        chat,
        "⚠️ Your order is no longer valid (the service may have been updated). \
         Please start over with /start.",
    )
    .await?;
    Ok(())
}

/// Validates a quantity and, when accepted, advances to the order summary.
/// Rejections re-prompt the quantity step without touching the stack.
pub async fn process_quantity(
    bot: &Bot,
    state: &AppState,
    chat: ChatId,
    quantity: u32,
    edit: Option<MessageId>,
) -> Result<()> {
    let frame = state.steps.current(chat.0).await;
    let Some(service_id) = frame.service_id else {
        return report_incomplete(bot, state, chat).await;
    };
    let Some(service) = state.catalog.find(service_id).await else {
        return report_incomplete(bot, state, chat).await;
    };

    let margin = state.margin.margin().await;
    let amount = match pricing::validate_quantity(
        service.min_quantity,
        service.max_quantity,
        service.base_price_per_1000,
        quantity,
        margin,
    ) {
        Ok(amount) => amount,
        Err(e @ CoreError::QuantityOutOfRange { .. })
        | Err(e @ CoreError::AmountBelowMinimum { .. }) => {
            bot.send_message(chat, format!("❌ {e}. Please choose a quantity:"))
                .reply_markup(keyboards::quantity_keyboard())
                .await?;
            return Ok(());
        }
        Err(e) => {
            warn!("unexpected quantity validation error: {e}");
            return report_incomplete(bot, state, chat).await;
        }
    };

    let frame = state
        .steps
        .push(chat.0, |f| {
            f.step = StepKind::Summary;
            f.quantity = Some(quantity);
            f.amount = Some(amount);
        })
        .await;

    show_summary(bot, state, chat, &frame, edit).await
}

pub async fn show_summary(
    bot: &Bot,
    state: &AppState,
    chat: ChatId,
    frame: &Frame,
    edit: Option<MessageId>,
) -> Result<()> {
    let Some(service) = resolve_service(state, frame).await else {
        return report_incomplete(bot, state, chat).await;
    };
    let text = summary_text(frame, &service);
    match edit {
        Some(message_id) => {
            bot.edit_message_text(chat, message_id, text)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::summary_keyboard())
                .await?;
        }
        None => {
            bot.send_message(chat, text)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::summary_keyboard())
                .await?;
        }
    }
    Ok(())
}

/// QR payment path: renders the UPI QR for the quoted amount and asks for a
/// screenshot once paid.
pub async fn send_payment_instructions(
    bot: &Bot,
    state: &AppState,
    chat: ChatId,
    frame: &Frame,
) -> Result<()> {
    let (Some(amount), Some(order_id)) = (frame.amount, frame.order_id.as_deref()) else {
        return report_incomplete(bot, state, chat).await;
    };

    let png = qr::upi_qr_png(&state.config.upi_id, "Boostgram", amount, order_id)?;
    let caption = format!(
        "🟢 <b>Payment Instructions</b>\n\
         ✅ Amount: <b>₹{}</b>\n\
         ✅ UPI ID: <b>{}</b>\n\n\
         ⏳ <b>Please pay within 10 minutes, or your order may expire.</b>\n\n\
         📸 <b>After payment, send a screenshot here to complete your order.</b>",
        pricing::format_inr(amount),
        state.config.upi_id,
    );

    bot.send_photo(chat, InputFile::memory(png).file_name("upi_qr.png"))
        .caption(caption)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::payment_keyboard())
        .await?;
    Ok(())
}

async fn resolve_service(state: &AppState, frame: &Frame) -> Option<Service> {
    let service_id = frame.service_id?;
    state.catalog.find(service_id).await
}

/// Re-renders the prompt for whatever step a frame is at. This is what makes
/// the back button work identically at any depth.
pub async fn render_frame(
    bot: &Bot,
    state: &AppState,
    chat: ChatId,
    message_id: MessageId,
    frame: &Frame,
) -> Result<()> {
    match frame.step {
        StepKind::Platform => {
            let platforms = state.catalog.platforms().await;
            bot.edit_message_text(chat, message_id, WELCOME_TEXT)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::platform_keyboard(&platforms))
                .await?;
        }
        StepKind::Category => {
            let Some(platform) = frame.platform else {
                return report_incomplete(bot, state, chat).await;
            };
            let categories = state.catalog.categories(platform).await;
            bot.edit_message_text(
                chat,
                message_id,
                format!("You selected <b>{platform}</b>. Now choose a category:"),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::category_keyboard(&categories))
            .await?;
        }
        StepKind::Service => {
            let (Some(platform), Some(category)) = (frame.platform, frame.category.as_deref())
            else {
                return report_incomplete(bot, state, chat).await;
            };
            let services = state.catalog.services_in(platform, category).await;
            let margin = state.margin.margin().await;
            bot.edit_message_text(
                chat,
                message_id,
                format!("You selected <b>{category}</b>. Now choose a service:"),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::service_keyboard(&services, margin))
            .await?;
        }
        StepKind::Details => {
            let Some(service) = resolve_service(state, frame).await else {
                return report_incomplete(bot, state, chat).await;
            };
            let margin = state.margin.margin().await;
            bot.edit_message_text(chat, message_id, service_details_text(&service, margin))
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::details_keyboard(service.is_fixed_duration()))
                .await?;
        }
        StepKind::Link => {
            let Some(service) = resolve_service(state, frame).await else {
                return report_incomplete(bot, state, chat).await;
            };
            bot.edit_message_text(chat, message_id, link_prompt(&service))
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::link_keyboard())
                .await?;
        }
        StepKind::Quantity | StepKind::CustomQuantity => {
            bot.edit_message_text(
                chat,
                message_id,
                "✅ Link received! Now, how much engagement would you like?",
            )
            .reply_markup(keyboards::quantity_keyboard())
            .await?;
        }
        StepKind::Summary => {
            show_summary(bot, state, chat, frame, Some(message_id)).await?;
        }
        StepKind::AwaitingProof => {
            // A text message cannot be edited into a photo; replace it.
            let _ = bot.delete_message(chat, message_id).await;
            send_payment_instructions(bot, state, chat, frame).await?;
        }
        StepKind::PhoneCollection => {
            bot.edit_message_text(
                chat,
                message_id,
                "📱 Please send the mobile number for payment (10 digits):",
            )
            .reply_markup(keyboards::payment_keyboard())
            .await?;
        }
        StepKind::PaymentPending => {
            bot.edit_message_text(
                chat,
                message_id,
                "💳 A payment link has been sent to your phone via SMS. \
                 Your order continues automatically once it is paid.",
            )
            .reply_markup(keyboards::payment_keyboard())
            .await?;
        }
        _ => {
            bot.edit_message_text(
                chat,
                message_id,
                "An error occurred. Please start over with /start.",
            )
            .await?;
        }
    }
    Ok(())
}
