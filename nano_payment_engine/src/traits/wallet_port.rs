use std::sync::Arc;

use async_trait::async_trait;
use npg_common::{Raw, Secret};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::address::NanoAddress;

/// Value sent to an account that has not yet been pulled into its spendable balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInflow {
    pub source: NanoAddress,
    pub amount: Raw,
}

impl PendingInflow {
    pub fn new(source: NanoAddress, amount: Raw) -> Self {
        Self { source, amount }
    }
}

/// A transfer into `account` that the ledger has confirmed, as delivered by a [`ConfirmationFeed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedTransfer {
    /// The receiving account
    pub account: NanoAddress,
    pub source: NanoAddress,
    pub amount: Raw,
    pub block_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendAmount {
    Exact(Raw),
    /// The entire spendable balance of the account at send time
    All,
}

/// An outgoing transfer.
///
/// Wallets that support it must use `idempotency_key` to guarantee that repeating the same transfer (for example,
/// after a timeout where the outcome of the first attempt is unknown) does not move funds a second time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub destination: NanoAddress,
    pub amount: SendAmount,
    pub idempotency_key: Option<String>,
}

impl Transfer {
    pub fn new(destination: NanoAddress, amount: SendAmount) -> Self {
        Self { destination, amount, idempotency_key: None }
    }

    pub fn with_idempotency_key<S: Into<String>>(mut self, key: S) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub block_hash: String,
    /// The amount that actually left the account. For [`SendAmount::All`], this is the balance at send time.
    pub amount: Raw,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("Could not reach the wallet backend. {0}")]
    Transport(String),
    #[error("The wallet backend rejected the request. {0}")]
    Rpc(String),
    #[error("Insufficient balance. Requested {requested}, but only {available} is available")]
    InsufficientBalance { requested: Raw, available: Raw },
    #[error("The wallet backend returned an unexpected response. {0}")]
    InvalidResponse(String),
}

/// The wallet capabilities a [`crate::PaymentWatcher`] needs from a single, dedicated account.
///
/// Every call may fail transiently. Implementations must not cache ledger state between calls.
#[async_trait]
pub trait WalletPort: Send + Sync + 'static {
    /// The account this wallet controls, i.e. the watch address.
    fn address(&self) -> &NanoAddress;

    /// The spendable balance of the account.
    async fn balance(&self) -> Result<Raw, WalletError>;

    /// Inbound transfers to the account that have not been received into its balance yet.
    async fn pending_inflows(&self) -> Result<Vec<PendingInflow>, WalletError>;

    /// Pulls every pending inflow into the spendable balance. Succeeds without effect when nothing is pending.
    async fn consolidate(&self) -> Result<(), WalletError>;

    /// Sends funds from the spendable balance. Fails with [`WalletError::InsufficientBalance`] if the amount exceeds
    /// the balance at send time.
    async fn send(&self, transfer: Transfer) -> Result<SendReceipt, WalletError>;

    /// Wallets that can push confirmation notifications expose them here. Push notifications only ever supplement
    /// polling, so returning `None` is always correct.
    fn confirmation_feed(&self) -> Option<Arc<dyn ConfirmationFeed>> {
        None
    }
}

/// An optional, low-latency feed of confirmed transfers into watched accounts.
///
/// Notifications may be dropped or duplicated.
#[async_trait]
pub trait ConfirmationFeed: Send + Sync {
    /// Starts routing confirmations for `address` to the returned channel. Subscribing again replaces the previous
    /// channel.
    async fn subscribe(&self, address: &NanoAddress) -> Result<mpsc::Receiver<ConfirmedTransfer>, WalletError>;

    /// Stops routing confirmations for `address`. The channel handed out by `subscribe` is closed.
    async fn unsubscribe(&self, address: &NanoAddress) -> Result<(), WalletError>;
}

/// Provisions the dedicated wallets that payment requests watch.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    type Wallet: WalletPort;

    /// Generates fresh seed material for a new wallet. The default implementation draws 32 bytes from the operating
    /// system's CSPRNG and hex-encodes them.
    fn generate_seed(&self) -> Secret<String> {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Secret::new(seed.iter().map(|b| format!("{b:02X}")).collect())
    }

    /// Opens (or derives) the account at `index` of the wallet described by `seed`.
    async fn open_wallet(&self, seed: &Secret<String>, index: u32) -> Result<Self::Wallet, WalletError>;
}
