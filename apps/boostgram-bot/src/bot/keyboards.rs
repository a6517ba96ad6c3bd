use boostgram_core::catalog::{Platform, Service};
use boostgram_core::pricing::{self, Margin};
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

fn back_row() -> Vec<InlineKeyboardButton> {
    vec![InlineKeyboardButton::callback("⬅️ Back", "back")]
}

pub fn platform_keyboard(platforms: &[Platform]) -> InlineKeyboardMarkup {
    let mut grid = Vec::new();
    let mut row = Vec::new();
    for platform in platforms {
        row.push(InlineKeyboardButton::callback(
            format!("{} {}", platform.emoji(), platform),
            format!("platform_{platform}"),
        ));
        if row.len() == 2 {
            grid.push(std::mem::take(&mut row));
        }
    }
    if !row.is_empty() {
        grid.push(row);
    }
    InlineKeyboardMarkup::new(grid)
}

pub fn category_keyboard(categories: &[String]) -> InlineKeyboardMarkup {
    let mut grid = Vec::new();
    let mut row = Vec::new();
    for category in categories {
        row.push(InlineKeyboardButton::callback(
            category.clone(),
            format!("category_{category}"),
        ));
        if row.len() == 2 {
            grid.push(std::mem::take(&mut row));
        }
    }
    if !row.is_empty() {
        grid.push(row);
    }
    grid.push(back_row());
    InlineKeyboardMarkup::new(grid)
}

pub fn service_keyboard(services: &[Service], margin: Margin) -> InlineKeyboardMarkup {
    let mut grid: Vec<Vec<InlineKeyboardButton>> = services
        .iter()
        .map(|service| {
            let rate = pricing::rate_per_1000(service.base_price_per_1000, margin);
            vec![InlineKeyboardButton::callback(
                format!("{} (₹{}/1k)", service.name, pricing::format_inr(rate)),
                format!("service_{}", service.id),
            )]
        })
        .collect();
    grid.push(back_row());
    InlineKeyboardMarkup::new(grid)
}

pub fn details_keyboard(show_manager_access: bool) -> InlineKeyboardMarkup {
    let mut grid = vec![vec![
        InlineKeyboardButton::callback("⬅️ Back", "back"),
        InlineKeyboardButton::callback("➡️ Next", "details_next"),
    ]];
    if show_manager_access {
        grid.push(vec![InlineKeyboardButton::callback(
            "ℹ️ What is Manager Access?",
            "manageraccess_info",
        )]);
    }
    InlineKeyboardMarkup::new(grid)
}

pub fn link_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![back_row()])
}

pub fn quantity_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("100", "quantity_100"),
            InlineKeyboardButton::callback("500", "quantity_500"),
        ],
        vec![
            InlineKeyboardButton::callback("1000", "quantity_1000"),
            InlineKeyboardButton::callback("5000", "quantity_5000"),
        ],
        vec![InlineKeyboardButton::callback(
            "Custom Quantity",
            "custom_quantity",
        )],
        back_row(),
    ])
}

pub fn summary_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "✅ Confirm Order",
            "confirm_order",
        )],
        back_row(),
    ])
}

pub fn payment_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![back_row()])
}

pub fn admin_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("📊 Total Orders", "admin_total_orders"),
            InlineKeyboardButton::callback("🔄 Bot Status", "admin_status"),
        ],
        vec![
            InlineKeyboardButton::callback("💳 Check Balance", "admin_balance"),
            InlineKeyboardButton::callback("📣 Broadcast", "admin_broadcast"),
        ],
        vec![InlineKeyboardButton::callback(
            "💰 Set Profit Margin",
            "set_margin",
        )],
    ])
}

pub fn approval_keyboard(chat_id: i64, order_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✅ Approve", format!("approve_{chat_id}_{order_id}")),
        InlineKeyboardButton::callback("❌ Reject", format!("reject_{chat_id}_{order_id}")),
    ]])
}
