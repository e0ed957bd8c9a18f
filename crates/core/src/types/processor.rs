//! Payment processors that can report purchases.

use serde::{Deserialize, Serialize};

/// The service a purchase or transaction came from.
///
/// Serialized names are part of the outbound notification payload and the
/// `transactions.payment_processor` column, so they must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentProcessor {
    Stripe,
    PayPal,
    UpgradeChat,
}

impl PaymentProcessor {
    /// Name as stored in the database and sent to downstream webhooks.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "Stripe",
            Self::PayPal => "PayPal",
            Self::UpgradeChat => "UpgradeChat",
        }
    }
}

impl std::fmt::Display for PaymentProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_names_match_display() {
        for processor in [
            PaymentProcessor::Stripe,
            PaymentProcessor::PayPal,
            PaymentProcessor::UpgradeChat,
        ] {
            let json = serde_json::to_string(&processor).unwrap();
            assert_eq!(json, format!("\"{processor}\""));
        }
    }
}
