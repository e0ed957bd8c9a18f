//! Website configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `WEBSITE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `WEBSITE_BASE_URL` - Public URL for the website
//! - `STRIPE_API_KEY` - Stripe secret API key
//! - `STRIPE_WEBHOOK_SIGNING_SECRET` - Signing secret for connected-account events
//! - `STRIPE_ACCOUNT_WEBHOOK_SIGNING_SECRET` - Signing secret for our own account's events
//! - `PAYPAL_CLIENT_ID` - PayPal REST client ID
//! - `PAYPAL_CLIENT_SECRET` - PayPal REST client secret
//!
//! ## Optional
//! - `WEBSITE_HOST` - Bind address (default: 127.0.0.1)
//! - `WEBSITE_PORT` - Listen port (default: 8080)
//! - `STRIPE_WEBHOOK_TOLERANCE_SECS` - Max webhook age in seconds, 0 disables (default: 300)
//! - `PAYPAL_SANDBOX` - Use the PayPal sandbox REST API (default: false)
//! - `UPGRADECHAT_CLIENT_ID` / `UPGRADECHAT_CLIENT_SECRET` - Enable the Upgrade.Chat webhook
//! - `UPGRADECHAT_PRODUCT_MAP` - `Upgrade.Chat name=checkout item name` pairs separated by `;`
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` / `SENTRY_TRACES_SAMPLE_RATE` - Sentry sampling (default: 1.0 / 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;

use crate::upgradechat::{DEFAULT_PRODUCT_MAP, ProductMap};

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Website application configuration.
#[derive(Debug, Clone)]
pub struct WebsiteConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the website
    pub base_url: String,
    /// Stripe API and webhook configuration
    pub stripe: StripeConfig,
    /// PayPal REST API configuration
    pub paypal: PayPalConfig,
    /// Upgrade.Chat configuration, if the integration is enabled
    pub upgradechat: Option<UpgradeChatConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced in Sentry
    pub sentry_traces_sample_rate: f32,
}

/// Stripe configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key, used as the basic auth username
    pub api_key: SecretString,
    /// Signing secret for events from connected accounts
    pub webhook_signing_secret: SecretString,
    /// Signing secret for events from the platform account itself
    pub account_webhook_signing_secret: SecretString,
    /// Reject signed webhooks older than this many seconds (0 disables)
    pub webhook_tolerance_secs: u64,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_key", &"[REDACTED]")
            .field("webhook_signing_secret", &"[REDACTED]")
            .field("account_webhook_signing_secret", &"[REDACTED]")
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .finish()
    }
}

/// PayPal configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct PayPalConfig {
    /// REST client ID
    pub client_id: String,
    /// REST client secret
    pub client_secret: SecretString,
    /// Whether the REST API calls go to the sandbox
    pub sandbox: bool,
}

impl PayPalConfig {
    /// Base URL of the PayPal REST API.
    #[must_use]
    pub const fn api_base(&self) -> &'static str {
        if self.sandbox {
            "https://api-m.sandbox.paypal.com"
        } else {
            "https://api-m.paypal.com"
        }
    }
}

impl std::fmt::Debug for PayPalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayPalConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("sandbox", &self.sandbox)
            .finish()
    }
}

/// Upgrade.Chat configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct UpgradeChatConfig {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: SecretString,
    /// Maps Upgrade.Chat product names to checkout item names
    pub product_map: ProductMap,
}

impl std::fmt::Debug for UpgradeChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradeChatConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("product_map", &self.product_map)
            .finish()
    }
}

impl WebsiteConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("WEBSITE_DATABASE_URL")?;
        let host = get_env_or_default("WEBSITE_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("WEBSITE_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("WEBSITE_PORT", "8080")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("WEBSITE_PORT".to_string(), e.to_string()))?;
        let base_url = get_required_env("WEBSITE_BASE_URL")?;

        let stripe = StripeConfig::from_env()?;
        let paypal = PayPalConfig::from_env()?;
        let upgradechat = UpgradeChatConfig::from_env()?;

        let sentry_sample_rate = parse_rate("SENTRY_SAMPLE_RATE", "1.0")?;
        let sentry_traces_sample_rate = parse_rate("SENTRY_TRACES_SAMPLE_RATE", "0.0")?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            stripe,
            paypal,
            upgradechat,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl StripeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let webhook_tolerance_secs = get_env_or_default("STRIPE_WEBHOOK_TOLERANCE_SECS", "300")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STRIPE_WEBHOOK_TOLERANCE_SECS".to_string(), e.to_string())
            })?;

        Ok(Self {
            api_key: get_validated_secret("STRIPE_API_KEY")?,
            webhook_signing_secret: get_validated_secret("STRIPE_WEBHOOK_SIGNING_SECRET")?,
            account_webhook_signing_secret: get_validated_secret(
                "STRIPE_ACCOUNT_WEBHOOK_SIGNING_SECRET",
            )?,
            webhook_tolerance_secs,
        })
    }
}

impl PayPalConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            client_id: get_required_env("PAYPAL_CLIENT_ID")?,
            client_secret: get_validated_secret("PAYPAL_CLIENT_SECRET")?,
            sandbox: parse_bool("PAYPAL_SANDBOX")?,
        })
    }
}

impl UpgradeChatConfig {
    /// Returns `None` unless both client credentials are set.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let (Some(client_id), Some(_)) = (
            get_optional_env("UPGRADECHAT_CLIENT_ID"),
            get_optional_env("UPGRADECHAT_CLIENT_SECRET"),
        ) else {
            return Ok(None);
        };

        let product_map =
            parse_product_map(get_optional_env("UPGRADECHAT_PRODUCT_MAP").as_deref())?;

        Ok(Some(Self {
            client_id,
            client_secret: get_validated_secret("UPGRADECHAT_CLIENT_SECRET")?,
            product_map,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Parse `UPGRADECHAT_PRODUCT_MAP`, falling back to the MarriageBot tiers.
///
/// A map that parses to nothing would silently ignore every order, so that
/// is an error.
fn parse_product_map(raw: Option<&str>) -> Result<ProductMap, ConfigError> {
    let invalid = |reason: String| {
        ConfigError::InvalidEnvVar("UPGRADECHAT_PRODUCT_MAP".to_string(), reason)
    };
    let map = ProductMap::parse(raw.unwrap_or(DEFAULT_PRODUCT_MAP)).map_err(invalid)?;
    if map.is_empty() {
        return Err(invalid("no products are mapped".to_string()));
    }
    Ok(map)
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a boolean flag; unset means `false`.
fn parse_bool(key: &str) -> Result<bool, ConfigError> {
    match get_optional_env(key) {
        None => Ok(false),
        Some(value) => parse_bool_value(&value)
            .ok_or_else(|| ConfigError::InvalidEnvVar(key.to_string(), format!("not a boolean: {value}"))),
    }
}

fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a sampling rate between 0.0 and 1.0.
fn parse_rate(key: &str, default: &str) -> Result<f32, ConfigError> {
    let rate = get_env_or_default(key, default)
        .parse::<f32>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !(0.0..=1.0).contains(&rate) {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("must be between 0.0 and 1.0 (got {rate})"),
        ));
    }
    Ok(rate)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Real API keys and signing secrets are random
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the value issued by the provider."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

/// Configuration with dummy credentials, for router and service tests.
#[cfg(test)]
pub(crate) fn test_config() -> WebsiteConfig {
    WebsiteConfig {
        database_url: SecretString::from("postgres://localhost/voxelfox_test"),
        host: IpAddr::from([127, 0, 0, 1]),
        port: 8080,
        base_url: "http://localhost:8080".to_string(),
        stripe: StripeConfig {
            api_key: SecretString::from("sk_test_4eC39HqLyjWDarjtT1zdp7dc"),
            webhook_signing_secret: SecretString::from("whsec_connect_test_secret"),
            account_webhook_signing_secret: SecretString::from("whsec_account_test_secret"),
            webhook_tolerance_secs: 300,
        },
        paypal: PayPalConfig {
            client_id: "paypal-client".to_string(),
            client_secret: SecretString::from("paypal-client-secret"),
            sandbox: true,
        },
        upgradechat: None,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-stripe-key", "STRIPE_API_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaa", "STRIPE_API_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_stripe_style_keys() {
        assert!(validate_secret_strength("sk_live_51HxQ2aKz8Vb3Tn9PqR4mW7", "STRIPE_API_KEY").is_ok());
        assert!(
            validate_secret_strength("whsec_Jd83kLq0Zp2Mx7Vb4Ny6Tc1R", "STRIPE_WEBHOOK_SIGNING_SECRET").is_ok()
        );
    }

    #[test]
    fn test_parse_bool_value() {
        assert_eq!(parse_bool_value("true"), Some(true));
        assert_eq!(parse_bool_value(" 1 "), Some(true));
        assert_eq!(parse_bool_value("OFF"), Some(false));
        assert_eq!(parse_bool_value("maybe"), None);
    }

    #[test]
    fn test_paypal_api_base() {
        let mut config = test_config().paypal;
        assert_eq!(config.api_base(), "https://api-m.sandbox.paypal.com");
        config.sandbox = false;
        assert_eq!(config.api_base(), "https://api-m.paypal.com");
    }

    #[test]
    fn test_product_map_defaults_to_marriagebot_tiers() {
        let map = parse_product_map(None).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(
            map.get("MarriageBot Subscription Tier 1"),
            Some("MarriageBot Tier 1")
        );
    }

    #[test]
    fn test_product_map_from_env_value() {
        let map = parse_product_map(Some("Gold=MarriageBot Gold")).unwrap();
        assert_eq!(map.get("Gold"), Some("MarriageBot Gold"));
        assert_eq!(map.get("MarriageBot Subscription Tier 1"), None);
    }

    #[test]
    fn test_product_map_rejects_empty_and_malformed() {
        assert!(matches!(
            parse_product_map(Some(" ; ")),
            Err(ConfigError::InvalidEnvVar(..))
        ));
        assert!(matches!(
            parse_product_map(Some("no separator")),
            Err(ConfigError::InvalidEnvVar(..))
        ));
    }

    #[test]
    fn test_socket_addr() {
        let config = test_config();
        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_stripe_config_debug_redacts_secrets() {
        let debug_output = format!("{:?}", test_config().stripe);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("sk_test_4eC39HqLyjWDarjtT1zdp7dc"));
        assert!(!debug_output.contains("whsec_"));
    }

    #[test]
    fn test_paypal_config_debug_redacts_secrets() {
        let debug_output = format!("{:?}", test_config().paypal);
        assert!(debug_output.contains("paypal-client"));
        assert!(!debug_output.contains("paypal-client-secret"));
    }
}
