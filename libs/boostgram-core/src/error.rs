use thiserror::Error;

/// User-input failures the handlers translate into re-prompts. Each message
/// is shown to the user as-is, so it names the rule, not the internals.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("link must be an absolute http:// or https:// URL")]
    InvalidLink,

    #[error("quantity must be between {min} and {max}")]
    QuantityOutOfRange { min: u32, max: u32 },

    #[error("quoted amount ₹{amount:.2} is below the minimum payable ₹{floor:.2}")]
    AmountBelowMinimum { amount: f64, floor: f64 },

    #[error("phone number must be a 10-digit mobile number starting with 6-9")]
    InvalidPhone,
}
