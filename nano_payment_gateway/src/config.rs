use std::{env, time::Duration};

use log::*;
use nano_payment_engine::{payment::DEFAULT_POLL_INTERVAL, PaymentConfig};
use npg_common::{helpers::parse_boolean_flag, Secret};

use crate::errors::GatewayError;

pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:7076";
const DEFAULT_PAYMENT_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_EVENT_BUFFER: usize = 32;

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// The node's JSON-RPC endpoint. The node must have the RPC wallet actions enabled (`enable_control`).
    pub rpc_url: String,
    /// The node's WebSocket endpoint, e.g. `ws://127.0.0.1:7078`.
    pub ws_url: Option<String>,
    /// If false, payments are detected by polling only, even if `ws_url` is set.
    pub use_websocket: bool,
    pub poll_interval: Duration,
    pub payment_timeout: Duration,
    /// Where successful payments are forwarded to, unless overridden on the command line.
    pub destination: Option<String>,
    /// Seed of the wallet that receives payments. A fresh seed is generated for every payment when absent.
    pub seed: Option<Secret<String>>,
    pub account_index: u32,
    /// Buffer size of the outcome event channels
    pub event_buffer: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            ws_url: None,
            use_websocket: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            payment_timeout: DEFAULT_PAYMENT_TIMEOUT,
            destination: None,
            seed: None,
            account_index: 0,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl GatewayConfig {
    pub fn from_env_or_default() -> Self {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Builds the configuration from a variable lookup. Invalid values are logged and replaced by their defaults.
    pub fn from_vars<F>(var: F) -> Self
    where F: Fn(&str) -> Option<String> {
        let defaults = Self::default();
        let non_empty = |name: &str| var(name).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let rpc_url = non_empty("NPG_RPC_URL").unwrap_or_else(|| {
            info!("🪛️ NPG_RPC_URL is not set. Using the default, {DEFAULT_RPC_URL}.");
            defaults.rpc_url.clone()
        });
        let ws_url = non_empty("NPG_WS_URL");
        let use_websocket = parse_boolean_flag(var("NPG_USE_WEBSOCKET"), ws_url.is_some());
        if use_websocket && ws_url.is_none() {
            warn!("🪛️ NPG_USE_WEBSOCKET is set, but NPG_WS_URL is not. Payments will be detected by polling only.");
        }
        let use_websocket = use_websocket && ws_url.is_some();
        let poll_interval = parse_seconds(&var, "NPG_POLL_INTERVAL", defaults.poll_interval);
        let payment_timeout = parse_seconds(&var, "NPG_PAYMENT_TIMEOUT", defaults.payment_timeout);
        let destination = non_empty("NPG_DESTINATION");
        let seed = non_empty("NPG_SEED").map(Secret::new);
        let account_index = parse_number(&var, "NPG_ACCOUNT_INDEX", defaults.account_index);
        let event_buffer = parse_number(&var, "NPG_EVENT_BUFFER", defaults.event_buffer);
        Self {
            rpc_url,
            ws_url,
            use_websocket,
            poll_interval,
            payment_timeout,
            destination,
            seed,
            account_index,
            event_buffer,
        }
    }

    /// The WebSocket URL to use, if push notifications are enabled.
    pub fn websocket_url(&self) -> Option<&str> {
        self.ws_url.as_deref().filter(|_| self.use_websocket)
    }

    /// Combines the configuration with a destination override into a payment request.
    pub fn payment_config(&self, destination: Option<String>) -> Result<PaymentConfig, GatewayError> {
        let destination = destination.or_else(|| self.destination.clone()).ok_or_else(|| {
            GatewayError::ConfigurationError(
                "No destination address. Set NPG_DESTINATION or pass --destination.".to_string(),
            )
        })?;
        let mut config = PaymentConfig::new(destination, self.payment_timeout).with_account_index(self.account_index);
        if let Some(seed) = &self.seed {
            config = config.with_seed(seed.clone());
        }
        Ok(config)
    }
}

fn parse_seconds<F>(var: &F, name: &str, default: Duration) -> Duration
where F: Fn(&str) -> Option<String> {
    match var(name) {
        Some(s) => match s.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                error!(
                    "🪛️ {s} is not a valid number of seconds for {name}. Using the default, {}s, instead.",
                    default.as_secs()
                );
                default
            },
        },
        None => default,
    }
}

fn parse_number<F, T>(var: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display,
{
    match var(name) {
        Some(s) => s.trim().parse::<T>().unwrap_or_else(|_| {
            error!("🪛️ {s} is not a valid value for {name}. Using the default, {default}, instead.");
            default
        }),
        None => default,
    }
}
