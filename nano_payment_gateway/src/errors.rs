use nano_payment_engine::{PaymentError, WalletError};
use npg_common::RawConversionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid gateway configuration. {0}")]
    ConfigurationError(String),
    #[error("Invalid amount. {0}")]
    InvalidAmount(#[from] RawConversionError),
    #[error("Payment error. {0}")]
    Payment(#[from] PaymentError),
    #[error("Wallet error. {0}")]
    Wallet(#[from] WalletError),
    #[error("The payment watcher stopped unexpectedly. {0}")]
    WatcherFailed(String),
}
