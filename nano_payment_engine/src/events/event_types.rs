use chrono::{DateTime, Utc};
use npg_common::Raw;
use serde::{Deserialize, Serialize};

use crate::address::NanoAddress;

/// Published once the requested amount has been forwarded to the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSucceededEvent {
    pub watch_address: NanoAddress,
    pub destination: NanoAddress,
    /// The amount forwarded to the destination (always exactly the requested amount)
    pub amount: Raw,
    /// The total received at the watch address
    pub received: Raw,
    pub block_hash: String,
    pub timestamp: DateTime<Utc>,
}

/// Published when a payment request expires (or is aborted) before the requested amount arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTimedOutEvent {
    pub watch_address: NanoAddress,
    /// Whatever was received before the deadline. It is returned to `refund_address`.
    pub received: Raw,
    pub refund_address: NanoAddress,
    pub timestamp: DateTime<Utc>,
}

/// Published when change (or a refund after a timeout) could not be returned. The funds are still sitting at the
/// watch address and need to be swept manually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReturnFailedEvent {
    pub watch_address: NanoAddress,
    pub recipient: NanoAddress,
    pub amount: Raw,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}
