use std::{fmt::Debug, time::Duration};

use log::*;
use npg_common::{Raw, Secret};

use crate::{
    address::NanoAddress,
    payment::{PaymentError, PaymentWatcher, WatcherConfig},
    traits::{WalletPort, WalletProvider},
};

/// Describes a payment request to [`PaymentGateway::create`].
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// The seed of the wallet to watch. When absent, the wallet provider generates fresh seed material.
    pub seed: Option<Secret<String>>,
    /// The account index within the seed's wallet. Defaults to zero.
    pub account_index: Option<u32>,
    pub timeout: Duration,
    pub destination: String,
}

impl PaymentConfig {
    pub fn new<S: Into<String>>(destination: S, timeout: Duration) -> Self {
        Self { seed: None, account_index: None, timeout, destination: destination.into() }
    }

    pub fn with_seed(mut self, seed: Secret<String>) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_account_index(mut self, index: u32) -> Self {
        self.account_index = Some(index);
        self
    }
}

/// Creates payment watchers, each on a freshly provisioned wallet.
pub struct PaymentGateway<P> {
    provider: P,
    config: WatcherConfig,
}

impl<P> Debug for PaymentGateway<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentGateway (poll interval {:?})", self.config.poll_interval)
    }
}

impl<P> PaymentGateway<P> {
    pub fn new(provider: P, config: WatcherConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P> PaymentGateway<P>
where P: WalletProvider
{
    /// Provisions a wallet for a new payment request of `amount` and returns an unstarted watcher for it.
    ///
    /// The destination address and amount are validated before any wallet is provisioned. Wallets that already hold
    /// a balance, or have anything pending, are refused with [`PaymentError::WalletNotFresh`], since any value they
    /// hold would be mistaken for the payment.
    pub async fn create(
        &self,
        request: &PaymentConfig,
        amount: Raw,
    ) -> Result<PaymentWatcher<P::Wallet>, PaymentError> {
        request.destination.trim().parse::<NanoAddress>()?;
        if amount.is_zero() {
            return Err(PaymentError::InvalidAmount);
        }
        let seed = match &request.seed {
            Some(seed) => seed.clone(),
            None => {
                debug!("🏭️ No seed supplied. Generating a fresh one.");
                self.provider.generate_seed()
            },
        };
        let index = request.account_index.unwrap_or(0);
        let wallet = self.provider.open_wallet(&seed, index).await?;
        ensure_fresh(&wallet).await?;
        let watcher = PaymentWatcher::new(amount, request.timeout, wallet, &request.destination, self.config.clone())?;
        info!("🏭️ Created a payment request for {amount} at {}", watcher.watch_address());
        Ok(watcher)
    }
}

async fn ensure_fresh<W: WalletPort>(wallet: &W) -> Result<(), PaymentError> {
    let balance = wallet.balance().await?;
    let pending = wallet.pending_inflows().await?.iter().map(|i| i.amount).sum::<Raw>();
    if balance.is_zero() && pending.is_zero() {
        Ok(())
    } else {
        warn!("🏭️ Refusing to use {} for a new payment. It holds {balance} with {pending} pending.", wallet.address());
        Err(PaymentError::WalletNotFresh { address: wallet.address().clone(), balance, pending })
    }
}
