//! Mapping from Upgrade.Chat product names to checkout item names.

use std::collections::HashMap;

/// MarriageBot's subscription tiers, used when no map is configured.
pub const DEFAULT_PRODUCT_MAP: &str = "MarriageBot Subscription Tier 1=MarriageBot Tier 1;\
    MarriageBot Subscription Tier 2=MarriageBot Tier 2;\
    MarriageBot Subscription Tier 3=MarriageBot Tier 3";

/// Upgrade.Chat product name to checkout item name.
///
/// Parsed from `Upgrade.Chat name=Checkout name` pairs separated by `;`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductMap {
    names: HashMap<String, String>,
}

impl ProductMap {
    /// Parse a product map.
    ///
    /// Blank entries are skipped, so a trailing `;` is fine.
    ///
    /// # Errors
    ///
    /// Returns a description of the first malformed entry.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut names = HashMap::new();
        for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((from, to)) = entry.split_once('=') else {
                return Err(format!("entry '{entry}' is not in 'from=to' form"));
            };
            let (from, to) = (from.trim(), to.trim());
            if from.is_empty() || to.is_empty() {
                return Err(format!("entry '{entry}' has an empty product name"));
            }
            names.insert(from.to_owned(), to.to_owned());
        }
        Ok(Self { names })
    }

    /// The checkout item name for an Upgrade.Chat product.
    #[must_use]
    pub fn get(&self, upgradechat_name: &str) -> Option<&str> {
        self.names.get(upgradechat_name).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let map = ProductMap::parse(
            "MarriageBot Subscription Tier 1=MarriageBot Tier 1; MarriageBot Subscription Tier 2 = MarriageBot Tier 2;",
        )
        .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("MarriageBot Subscription Tier 1"), Some("MarriageBot Tier 1"));
        assert_eq!(map.get("MarriageBot Subscription Tier 2"), Some("MarriageBot Tier 2"));
        assert_eq!(map.get("MarriageBot Subscription Tier 3"), None);
    }

    #[test]
    fn test_default_map_parses() {
        let map = ProductMap::parse(DEFAULT_PRODUCT_MAP).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("MarriageBot Subscription Tier 3"), Some("MarriageBot Tier 3"));
    }

    #[test]
    fn test_parse_empty() {
        assert!(ProductMap::parse("").unwrap().is_empty());
        assert!(ProductMap::parse(" ; ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed() {
        assert!(ProductMap::parse("no separator").is_err());
        assert!(ProductMap::parse("=Tier 1").is_err());
        assert!(ProductMap::parse("Tier 1=").is_err());
    }
}
