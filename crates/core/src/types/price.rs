//! Display prices for checkout items.
//!
//! Prices come from Stripe in the currency's minor unit (pence, cents) with a
//! lowercase ISO 4217 code. The portal only needs to render them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the smallest currency unit (e.g., pence for GBP).
    pub amount_minor: i64,
    /// ISO 4217 currency code, as reported by the processor.
    pub currency: String,
    /// Whether the price is charged every billing period.
    pub recurring: bool,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub fn new(amount_minor: i64, currency: impl Into<String>, recurring: bool) -> Self {
        Self {
            amount_minor,
            currency: currency.into(),
            recurring,
        }
    }

    /// Price shown when the processor can't be reached.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(0, "gbp", false)
    }

    /// Amount in the currency's standard unit (e.g., pounds, not pence).
    #[must_use]
    pub fn amount(&self) -> Decimal {
        Decimal::new(self.amount_minor, 2)
    }

    /// Symbol for the currency, falling back to the upper-cased code.
    #[must_use]
    pub fn currency_symbol(&self) -> String {
        match self.currency.to_ascii_lowercase().as_str() {
            "gbp" => "£".to_owned(),
            "usd" => "$".to_owned(),
            "eur" => "€".to_owned(),
            _ => self.currency.to_ascii_uppercase(),
        }
    }

    /// Format the amount for display (e.g., `4.99` or `4.99 per month`).
    #[must_use]
    pub fn display(&self) -> String {
        let amount = format!("{:.2}", self.amount());
        if self.recurring {
            format!("{amount} per month")
        } else {
            amount
        }
    }
}
