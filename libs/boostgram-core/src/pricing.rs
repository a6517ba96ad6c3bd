use crate::error::CoreError;

/// Smallest amount the payment rails accept.
pub const MIN_PAYABLE_INR: f64 = 1.0;

pub const DEFAULT_MARGIN_FACTOR: f64 = 1.4;

/// How the persisted margin number is interpreted. Both conventions exist in
/// deployed configurations, so the mode is fixed per deployment and the
/// stored value travels with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupMode {
    /// Stored value is a multiplicative factor, e.g. 1.4 for a 40% margin.
    Factor,
    /// Stored value is a percentage added on top of base, e.g. 40.0.
    AddedPercent,
}

impl MarkupMode {
    pub fn default_value(&self) -> f64 {
        match self {
            MarkupMode::Factor => DEFAULT_MARGIN_FACTOR,
            MarkupMode::AddedPercent => (DEFAULT_MARGIN_FACTOR - 1.0) * 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margin {
    pub mode: MarkupMode,
    pub value: f64,
}

impl Margin {
    pub fn new(mode: MarkupMode, value: f64) -> Self {
        Self { mode, value }
    }

    pub fn default_for(mode: MarkupMode) -> Self {
        Self::new(mode, mode.default_value())
    }

    /// Admin input is always a percentage; the stored value depends on mode.
    pub fn from_percent(mode: MarkupMode, percent: f64) -> Self {
        let value = match mode {
            MarkupMode::Factor => 1.0 + percent / 100.0,
            MarkupMode::AddedPercent => percent,
        };
        Self::new(mode, value)
    }

    pub fn factor(&self) -> f64 {
        match self.mode {
            MarkupMode::Factor => self.value,
            MarkupMode::AddedPercent => 1.0 + self.value / 100.0,
        }
    }

    pub fn percent(&self) -> f64 {
        (self.factor() - 1.0) * 100.0
    }
}

/// User-facing total for `quantity` units at `base_per_1000`. Stays a raw
/// f64; rounding to two decimals happens only when rendering a message.
pub fn quote(base_per_1000: f64, quantity: u32, margin: Margin) -> f64 {
    (base_per_1000 / 1000.0) * quantity as f64 * margin.factor()
}

/// What the order actually costs against the fulfillment account balance.
pub fn wholesale_cost(base_per_1000: f64, quantity: u32) -> f64 {
    (base_per_1000 / 1000.0) * quantity as f64
}

/// Marked-up price per 1000 units, for service listings.
pub fn rate_per_1000(base_per_1000: f64, margin: Margin) -> f64 {
    base_per_1000 * margin.factor()
}

/// Validates a requested quantity against the service bounds and the payment
/// floor, returning the quoted amount on success. Rejection never clamps.
pub fn validate_quantity(
    min: u32,
    max: u32,
    base_per_1000: f64,
    quantity: u32,
    margin: Margin,
) -> Result<f64, CoreError> {
    if quantity < min || quantity > max {
        return Err(CoreError::QuantityOutOfRange { min, max });
    }
    let amount = quote(base_per_1000, quantity, margin);
    if amount < MIN_PAYABLE_INR {
        return Err(CoreError::AmountBelowMinimum {
            amount,
            floor: MIN_PAYABLE_INR,
        });
    }
    Ok(amount)
}

pub fn format_inr(amount: f64) -> String {
    format!("{amount:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factor(value: f64) -> Margin {
        Margin::new(MarkupMode::Factor, value)
    }

    #[test]
    fn quote_matches_reference_scenario() {
        // base 100/1k, 40% margin, qty 500 -> 70.00
        let amount = quote(100.0, 500, factor(1.4));
        assert_eq!(format_inr(amount), "70.00");
    }

    #[test]
    fn both_markup_modes_agree_on_forty_percent() {
        let multiplicative = quote(100.0, 500, Margin::new(MarkupMode::Factor, 1.4));
        let additive = quote(100.0, 500, Margin::new(MarkupMode::AddedPercent, 40.0));
        assert!((multiplicative - additive).abs() < 1e-9);
    }

    #[test]
    fn quote_is_monotone_in_quantity() {
        let margin = factor(1.25);
        let mut last = quote(90.0, 0, margin);
        assert_eq!(last, 0.0);
        for qty in [1, 10, 100, 1000, 50_000] {
            let amount = quote(90.0, qty, margin);
            assert!(amount >= last);
            last = amount;
        }
    }

    #[test]
    fn quantity_bounds_are_a_closed_interval() {
        let margin = factor(1.4);
        assert!(validate_quantity(100, 10_000, 100.0, 100, margin).is_ok());
        assert!(validate_quantity(100, 10_000, 100.0, 10_000, margin).is_ok());
        assert!(matches!(
            validate_quantity(100, 10_000, 100.0, 99, margin),
            Err(CoreError::QuantityOutOfRange { min: 100, max: 10_000 })
        ));
        assert!(matches!(
            validate_quantity(100, 10_000, 100.0, 10_001, margin),
            Err(CoreError::QuantityOutOfRange { .. })
        ));
    }

    #[test]
    fn sub_rupee_quotes_are_rejected_not_clamped() {
        // 10 units at 1.0/1k with no margin quotes 0.01
        let err = validate_quantity(1, 1000, 1.0, 10, factor(1.0)).unwrap_err();
        assert!(matches!(err, CoreError::AmountBelowMinimum { .. }));
    }

    #[test]
    fn percent_round_trips_through_both_modes() {
        let a = Margin::from_percent(MarkupMode::Factor, 40.0);
        let b = Margin::from_percent(MarkupMode::AddedPercent, 40.0);
        assert!((a.percent() - 40.0).abs() < 1e-9);
        assert!((b.percent() - 40.0).abs() < 1e-9);
        assert!((a.factor() - b.factor()).abs() < 1e-9);
    }
}
