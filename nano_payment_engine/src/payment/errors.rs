use npg_common::Raw;
use thiserror::Error;

use crate::{address::AddressError, traits::WalletError, NanoAddress};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("Destination must be a valid Nano address. {0}")]
    InvalidAddress(#[from] AddressError),
    #[error("The requested amount must be greater than zero")]
    InvalidAmount,
    #[error("The payment watcher has already been started")]
    AlreadyStarted,
    #[error("Wallet {address} cannot be used for a new payment. It holds {balance} and has {pending} pending")]
    WalletNotFresh { address: NanoAddress, balance: Raw, pending: Raw },
    #[error("Wallet error. {0}")]
    WalletError(#[from] WalletError),
}
