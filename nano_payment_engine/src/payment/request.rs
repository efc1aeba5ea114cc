use std::time::Duration;

use npg_common::Raw;
use serde::{Deserialize, Serialize};

use crate::{address::NanoAddress, payment::PaymentError};

/// What a payment watcher is waiting for. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    requested_amount: Raw,
    timeout: Duration,
    destination: NanoAddress,
    watch_address: NanoAddress,
}

impl PaymentRequest {
    /// Creates a new payment request.
    ///
    /// Fails with [`PaymentError::InvalidAddress`] if `destination` is not a valid Nano address, and with
    /// [`PaymentError::InvalidAmount`] if `requested_amount` is zero.
    pub fn new(
        requested_amount: Raw,
        timeout: Duration,
        destination: &str,
        watch_address: NanoAddress,
    ) -> Result<Self, PaymentError> {
        let destination = destination.trim().parse::<NanoAddress>()?;
        if requested_amount.is_zero() {
            return Err(PaymentError::InvalidAmount);
        }
        Ok(Self { requested_amount, timeout, destination, watch_address })
    }

    pub fn requested_amount(&self) -> Raw {
        self.requested_amount
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn destination(&self) -> &NanoAddress {
        &self.destination
    }

    pub fn watch_address(&self) -> &NanoAddress {
        &self.watch_address
    }
}
