use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub orders: OrdersConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    pub redsys: RedsysConfig,
    pub sepa: SepaConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OrdersConfig {
    /// Day of month bank orders are collected on. 0 keeps the creation day.
    #[serde(default)]
    pub payment_day: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    pub max_returned_orders: u32,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self { max_returned_orders: 2 }
    }
}

/// Card gateway integration contract. Field values are sent verbatim as
/// `DS_MERCHANT_*` parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct RedsysConfig {
    /// Direct-payment (server to server) endpoint.
    pub post_url: String,
    /// Browser redirect endpoint for the first, tokenizing payment.
    pub form_url: String,
    pub merchant_code: String,
    pub merchant_name: String,
    pub terminal: String,
    pub currency: String,
    pub transaction_type: String,
    pub payment_methods: String,
    /// Placeholder asking the gateway to tokenize the card.
    pub identifier: String,
    /// Base64 shared secret.
    pub secret_key: String,
    pub callback_url: String,
    pub ok_url: String,
    pub ko_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl RedsysConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SepaConfig {
    pub creditor_identifier: String,
    pub creditor_name: String,
    pub export_dir: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotificationConfig {
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

/// Thresholds the billing engine runs with, injected into services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPolicy {
    pub max_returned_orders: u32,
    pub payment_day: Option<u32>,
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Self {
            max_returned_orders: 2,
            payment_day: None,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.max_connections", 10)?
            .set_default("orders.payment_day", 0)?
            .set_default("billing.max_returned_orders", 2)?
            .set_default("redsys.identifier", "REQUIRED")?
            .set_default("redsys.currency", "978")?
            .set_default("redsys.transaction_type", "0")?
            .set_default("redsys.payment_methods", "C")?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with COLECTA__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("COLECTA").separator("__"))

            .build()?;

        config.try_deserialize()
    }

    pub fn billing_policy(&self) -> BillingPolicy {
        BillingPolicy {
            max_returned_orders: self.billing.max_returned_orders,
            payment_day: match self.orders.payment_day {
                0 => None,
                day => Some(day),
            },
        }
    }
}
