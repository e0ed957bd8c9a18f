//! Instant Payment Notification parsing.
//!
//! See: <https://developer.paypal.com/api/nvp-soap/ipn/IPNandPDTVariables/>

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::stripe::Metadata;

/// Receiver addresses on PayPal's sandbox all use this domain.
const SANDBOX_EMAIL_SUFFIX: &str = "@business.example.com";

/// `payment_status` values that take money back from us.
const REFUND_STATUSES: &[&str] = &["Denied", "Refunded", "Reversed"];

/// Where to post an IPN back for verification.
#[must_use]
pub const fn ipn_verify_url(sandbox: bool) -> &'static str {
    if sandbox {
        "https://ipnpb.sandbox.paypal.com/cgi-bin/webscr"
    } else {
        "https://ipnpb.paypal.com/cgi-bin/webscr"
    }
}

/// What an IPN is telling us about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpnEvent {
    /// A one-off payment, or a refund/reversal of one.
    ChargeCaptured,
    /// A subscription was set up, or a recurring payment went through.
    SubscriptionCreated,
    /// A subscription was cancelled or suspended.
    SubscriptionCancelled,
    Unhandled,
}

impl IpnEvent {
    /// Classify a `txn_type`. Refunds and reversals arrive without one.
    #[must_use]
    pub fn from_txn_type(txn_type: Option<&str>) -> Self {
        match txn_type {
            None | Some("cart" | "express_checkout" | "web_accept") => Self::ChargeCaptured,
            Some("recurring_payment_profile_created" | "recurring_payment") => {
                Self::SubscriptionCreated
            }
            Some(
                "recurring_payment_profile_cancel"
                | "recurring_payment_suspended"
                | "recurring_payment_suspended_due_to_max_failed_payment",
            ) => Self::SubscriptionCancelled,
            Some(_) => Self::Unhandled,
        }
    }
}

/// A product named in an IPN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpnProduct {
    pub name: String,
    pub quantity: i32,
}

/// A parsed IPN.
#[derive(Debug, Clone, Default)]
pub struct IpnMessage {
    fields: HashMap<String, String>,
}

impl IpnMessage {
    /// Parse an urlencoded IPN body. The first value of a repeated key wins.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        let mut fields = HashMap::new();
        for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
            fields
                .entry(key.trim().to_owned())
                .or_insert_with(|| value.trim().to_owned());
        }
        Self { fields }
    }

    /// A field's value, treating empty strings as absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Whether the IPN was sent for a sandbox merchant.
    #[must_use]
    pub fn is_sandbox(&self) -> bool {
        self.get("receiver_email").is_some_and(|email| {
            email
                .to_ascii_lowercase()
                .ends_with(SANDBOX_EMAIL_SUFFIX)
        })
    }

    #[must_use]
    pub fn event(&self) -> IpnEvent {
        IpnEvent::from_txn_type(self.get("txn_type"))
    }

    /// Whether the payment was refunded, reversed, or denied.
    #[must_use]
    pub fn is_refund(&self) -> bool {
        self.get("payment_status")
            .is_some_and(|status| REFUND_STATUSES.contains(&status))
    }

    /// Products in the IPN: `item_name`, `product_name`, then numbered
    /// cart items `item_name1`, `item_name2`, ...
    #[must_use]
    pub fn products(&self) -> Vec<IpnProduct> {
        let mut products = Vec::new();
        if let Some(name) = self.get("item_name") {
            products.push(IpnProduct {
                name: name.to_owned(),
                quantity: self.quantity("quantity"),
            });
        }
        if let Some(name) = self.get("product_name") {
            products.push(IpnProduct {
                name: name.to_owned(),
                quantity: 1,
            });
        }
        for n in 1_u32.. {
            let Some(name) = self.get(&format!("item_name{n}")) else {
                break;
            };
            products.push(IpnProduct {
                name: name.to_owned(),
                quantity: self.quantity(&format!("quantity{n}")),
            });
        }
        products
    }

    fn quantity(&self, key: &str) -> i32 {
        self.get(key)
            .and_then(|q| q.parse::<i32>().ok())
            .filter(|q| *q > 0)
            .unwrap_or(1)
    }

    /// Metadata we attached to the checkout via `custom_id` and `custom`.
    #[must_use]
    pub fn custom_metadata(&self) -> Metadata {
        custom_metadata(&[self.get("custom_id"), self.get("custom")])
    }

    /// When the payment happened, if PayPal said.
    #[must_use]
    pub fn payment_date(&self) -> Option<DateTime<Utc>> {
        self.get("payment_date").and_then(parse_payment_date)
    }
}

/// Merge JSON objects from PayPal's custom fields, later ones winning.
///
/// Values that aren't JSON objects are ignored.
#[must_use]
pub fn custom_metadata(values: &[Option<&str>]) -> Metadata {
    let mut metadata = Metadata::new();
    for value in values.iter().flatten() {
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(value) {
            metadata.extend(map);
        }
    }
    metadata
}

/// Parse an IPN date like `08:25:16 Jan 30, 2009 PST`.
///
/// PayPal reports Pacific time; unknown zone names are read as UTC.
#[must_use]
pub fn parse_payment_date(value: &str) -> Option<DateTime<Utc>> {
    let (datetime, zone) = value.trim().rsplit_once(' ')?;
    let offset_hours = match zone {
        "PST" => -8,
        "PDT" => -7,
        _ => 0,
    };
    let naive = NaiveDateTime::parse_from_str(datetime, "%H:%M:%S %b %d, %Y").ok()?;
    let offset = FixedOffset::east_opt(offset_hours * 3600)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a decimal amount like `12.34` into minor units (`1234`).
#[must_use]
pub fn parse_amount_minor(value: &str) -> Option<i64> {
    let amount = Decimal::from_str(value.trim()).ok()?;
    amount
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round()
        .to_i64()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_keeps_first_value() {
        let ipn = IpnMessage::parse("txn_id=+ABC123+&txn_id=second&item_name=MarriageBot%20Gold&empty=");
        assert_eq!(ipn.get("txn_id"), Some("ABC123"));
        assert_eq!(ipn.get("item_name"), Some("MarriageBot Gold"));
        assert_eq!(ipn.get("empty"), None);
        assert_eq!(ipn.get("missing"), None);
    }

    #[test]
    fn test_is_sandbox() {
        assert!(IpnMessage::parse("receiver_email=seller%40Business.Example.com").is_sandbox());
        assert!(!IpnMessage::parse("receiver_email=payments%40voxelfox.co.uk").is_sandbox());
        assert!(!IpnMessage::parse("txn_type=cart").is_sandbox());
    }

    #[test]
    fn test_event_classification() {
        assert_eq!(IpnEvent::from_txn_type(None), IpnEvent::ChargeCaptured);
        assert_eq!(IpnEvent::from_txn_type(Some("web_accept")), IpnEvent::ChargeCaptured);
        assert_eq!(IpnEvent::from_txn_type(Some("cart")), IpnEvent::ChargeCaptured);
        assert_eq!(
            IpnEvent::from_txn_type(Some("recurring_payment")),
            IpnEvent::SubscriptionCreated
        );
        assert_eq!(
            IpnEvent::from_txn_type(Some("recurring_payment_profile_created")),
            IpnEvent::SubscriptionCreated
        );
        assert_eq!(
            IpnEvent::from_txn_type(Some("recurring_payment_suspended_due_to_max_failed_payment")),
            IpnEvent::SubscriptionCancelled
        );
        assert_eq!(
            IpnEvent::from_txn_type(Some("recurring_payment_profile_cancel")),
            IpnEvent::SubscriptionCancelled
        );
        assert_eq!(IpnEvent::from_txn_type(Some("new_case")), IpnEvent::Unhandled);
    }

    #[test]
    fn test_refund_statuses() {
        assert!(IpnMessage::parse("payment_status=Refunded").is_refund());
        assert!(IpnMessage::parse("payment_status=Reversed").is_refund());
        assert!(IpnMessage::parse("payment_status=Denied").is_refund());
        assert!(!IpnMessage::parse("payment_status=Completed").is_refund());
        assert!(!IpnMessage::parse("").is_refund());
    }

    #[test]
    fn test_products() {
        let ipn = IpnMessage::parse(
            "item_name=Gold&quantity=2&product_name=Plan&item_name1=Cart%20A&quantity1=3&item_name2=Cart%20B&item_name4=Skipped",
        );
        assert_eq!(
            ipn.products(),
            vec![
                IpnProduct { name: "Gold".into(), quantity: 2 },
                IpnProduct { name: "Plan".into(), quantity: 1 },
                IpnProduct { name: "Cart A".into(), quantity: 3 },
                IpnProduct { name: "Cart B".into(), quantity: 1 },
            ]
        );
    }

    #[test]
    fn test_products_bad_quantity_defaults_to_one() {
        let ipn = IpnMessage::parse("item_name=Gold&quantity=lots");
        assert_eq!(ipn.products()[0].quantity, 1);
        let ipn = IpnMessage::parse("item_name=Gold&quantity=0");
        assert_eq!(ipn.products()[0].quantity, 1);
    }

    #[test]
    fn test_custom_metadata_merges() {
        let metadata = custom_metadata(&[
            Some(r#"{"discord_user_id": "1", "guild": "a"}"#),
            None,
            Some(r#"{"guild": "b"}"#),
            Some("not json"),
            Some(r#"["array"]"#),
        ]);
        assert_eq!(metadata["discord_user_id"], "1");
        assert_eq!(metadata["guild"], "b");
        assert_eq!(metadata.len(), 2);
    }

    #[test]
    fn test_ipn_custom_metadata() {
        let ipn = IpnMessage::parse("custom=%7B%22discord_user_id%22%3A%20%22141231597155385344%22%7D");
        assert_eq!(ipn.custom_metadata()["discord_user_id"], "141231597155385344");
    }

    #[test]
    fn test_parse_payment_date() {
        let expected = Utc.with_ymd_and_hms(2009, 1, 30, 16, 25, 16).unwrap();
        assert_eq!(parse_payment_date("08:25:16 Jan 30, 2009 PST"), Some(expected));

        let expected = Utc.with_ymd_and_hms(2023, 7, 4, 19, 0, 0).unwrap();
        assert_eq!(parse_payment_date("12:00:00 Jul 04, 2023 PDT"), Some(expected));

        let expected = Utc.with_ymd_and_hms(2023, 7, 4, 12, 0, 0).unwrap();
        assert_eq!(parse_payment_date("12:00:00 Jul 04, 2023 GMT"), Some(expected));

        assert_eq!(parse_payment_date("yesterday"), None);
    }

    #[test]
    fn test_parse_amount_minor() {
        assert_eq!(parse_amount_minor("12.34"), Some(1234));
        assert_eq!(parse_amount_minor("5"), Some(500));
        assert_eq!(parse_amount_minor("-4.99"), Some(-499));
        assert_eq!(parse_amount_minor(" 0.30 "), Some(30));
        assert_eq!(parse_amount_minor("free"), None);
    }

    #[test]
    fn test_ipn_verify_url() {
        assert!(ipn_verify_url(true).contains("sandbox"));
        assert!(!ipn_verify_url(false).contains("sandbox"));
    }
}
