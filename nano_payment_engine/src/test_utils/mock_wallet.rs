use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use log::*;
use npg_common::{Raw, Secret};
use tokio::sync::mpsc;

use crate::{
    test_utils::derive_test_address,
    traits::{
        ConfirmationFeed,
        ConfirmedTransfer,
        PendingInflow,
        SendAmount,
        SendReceipt,
        Transfer,
        WalletError,
        WalletPort,
        WalletProvider,
    },
    NanoAddress,
};

/// A send that actually moved funds out of a [`MockWallet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSend {
    pub destination: NanoAddress,
    pub amount: Raw,
}

#[derive(Default)]
struct MockLedger {
    // Most recent first
    pending: Vec<PendingInflow>,
    balance: Raw,
    sends: Vec<RecordedSend>,
    receipts: HashMap<String, SendReceipt>,
    consolidations: usize,
    queries: usize,
    failing_queries: usize,
    failing_consolidations: usize,
    failing_sends: usize,
    lost_send_replies: usize,
    failing_destinations: Vec<NanoAddress>,
    query_delay: Option<Duration>,
    block_counter: u64,
}

/// An in-memory single-account wallet.
///
/// Clones share the same ledger, so a test can keep a handle while the watcher owns another. Sends with an
/// idempotency key that was already used return the original receipt without moving funds again, like the node's
/// `id` field does.
#[derive(Clone)]
pub struct MockWallet {
    address: NanoAddress,
    ledger: Arc<Mutex<MockLedger>>,
    feed: Option<Arc<MockFeed>>,
}

impl MockWallet {
    pub fn new(address: NanoAddress) -> Self {
        Self { address, ledger: Arc::new(Mutex::new(MockLedger::default())), feed: None }
    }

    pub fn with_feed(mut self, feed: Arc<MockFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    fn ledger(&self) -> MutexGuard<'_, MockLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulates an inbound transfer from `source` that has not been received yet.
    pub fn receive(&self, source: NanoAddress, amount: Raw) {
        self.ledger().pending.insert(0, PendingInflow::new(source, amount));
    }

    pub fn set_balance(&self, balance: Raw) {
        self.ledger().balance = balance;
    }

    pub fn spendable_balance(&self) -> Raw {
        self.ledger().balance
    }

    pub fn pending_total(&self) -> Raw {
        self.ledger().pending.iter().map(|i| i.amount).sum()
    }

    pub fn sends(&self) -> Vec<RecordedSend> {
        self.ledger().sends.clone()
    }

    pub fn sends_to(&self, destination: &NanoAddress) -> Vec<Raw> {
        self.ledger().sends.iter().filter(|s| &s.destination == destination).map(|s| s.amount).collect()
    }

    pub fn consolidations(&self) -> usize {
        self.ledger().consolidations
    }

    pub fn queries(&self) -> usize {
        self.ledger().queries
    }

    /// The next `n` pending queries fail with a transport error.
    pub fn fail_queries(&self, n: usize) {
        self.ledger().failing_queries = n;
    }

    pub fn fail_consolidations(&self, n: usize) {
        self.ledger().failing_consolidations = n;
    }

    pub fn fail_sends(&self, n: usize) {
        self.ledger().failing_sends = n;
    }

    /// The next `n` sends move funds, but report an error to the caller, as if the node's reply had been lost.
    pub fn lose_send_replies(&self, n: usize) {
        self.ledger().lost_send_replies = n;
    }

    /// Every send to `destination` fails.
    pub fn fail_sends_to(&self, destination: NanoAddress) {
        self.ledger().failing_destinations.push(destination);
    }

    /// Makes pending queries take `delay` (on the runtime clock) before answering.
    pub fn delay_queries(&self, delay: Duration) {
        self.ledger().query_delay = Some(delay);
    }
}

#[async_trait]
impl WalletPort for MockWallet {
    fn address(&self) -> &NanoAddress {
        &self.address
    }

    async fn balance(&self) -> Result<Raw, WalletError> {
        Ok(self.ledger().balance)
    }

    async fn pending_inflows(&self) -> Result<Vec<PendingInflow>, WalletError> {
        let delay = self.ledger().query_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut ledger = self.ledger();
        ledger.queries += 1;
        if ledger.failing_queries > 0 {
            ledger.failing_queries -= 1;
            return Err(WalletError::Transport("mock node is unreachable".into()));
        }
        Ok(ledger.pending.clone())
    }

    async fn consolidate(&self) -> Result<(), WalletError> {
        let mut ledger = self.ledger();
        if ledger.failing_consolidations > 0 {
            ledger.failing_consolidations -= 1;
            return Err(WalletError::Rpc("mock receive failed".into()));
        }
        let received = ledger.pending.drain(..).map(|i| i.amount).sum::<Raw>();
        ledger.balance += received;
        ledger.consolidations += 1;
        trace!("🧪️ Mock wallet {} consolidated {received}", self.address);
        Ok(())
    }

    async fn send(&self, transfer: Transfer) -> Result<SendReceipt, WalletError> {
        let mut ledger = self.ledger();
        if let Some(receipt) = transfer.idempotency_key.as_ref().and_then(|k| ledger.receipts.get(k)) {
            return Ok(receipt.clone());
        }
        if ledger.failing_sends > 0 {
            ledger.failing_sends -= 1;
            return Err(WalletError::Transport("mock send timed out".into()));
        }
        if ledger.failing_destinations.contains(&transfer.destination) {
            return Err(WalletError::Rpc(format!("mock node refuses to send to {}", transfer.destination)));
        }
        let available = ledger.balance;
        let amount = match transfer.amount {
            SendAmount::Exact(amount) if amount > available => {
                return Err(WalletError::InsufficientBalance { requested: amount, available });
            },
            SendAmount::Exact(amount) => amount,
            SendAmount::All => available,
        };
        ledger.balance -= amount;
        ledger.block_counter += 1;
        let receipt = SendReceipt { block_hash: format!("MOCKBLOCK{:06}", ledger.block_counter), amount };
        ledger.sends.push(RecordedSend { destination: transfer.destination.clone(), amount });
        if let Some(key) = transfer.idempotency_key {
            ledger.receipts.insert(key, receipt.clone());
        }
        if ledger.lost_send_replies > 0 {
            ledger.lost_send_replies -= 1;
            return Err(WalletError::Transport("mock node did not reply to the send".into()));
        }
        trace!("🧪️ Mock wallet {} sent {amount} to {}", self.address, transfer.destination);
        Ok(receipt)
    }

    fn confirmation_feed(&self) -> Option<Arc<dyn ConfirmationFeed>> {
        self.feed.clone().map(|feed| feed as Arc<dyn ConfirmationFeed>)
    }
}

/// An in-memory confirmation feed. Tests push notifications with [`MockFeed::notify`].
#[derive(Default)]
pub struct MockFeed {
    subscribers: Mutex<HashMap<NanoAddress, mpsc::Sender<ConfirmedTransfer>>>,
}

impl MockFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<NanoAddress, mpsc::Sender<ConfirmedTransfer>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_subscribed(&self, address: &NanoAddress) -> bool {
        self.subscribers().contains_key(address)
    }

    /// Delivers a confirmation to whoever is subscribed to `transfer.account`. Returns false if nobody is.
    pub async fn notify(&self, transfer: ConfirmedTransfer) -> bool {
        let sender = self.subscribers().get(&transfer.account).cloned();
        match sender {
            Some(sender) => sender.send(transfer).await.is_ok(),
            None => false,
        }
    }

    /// Convenience for a confirmation of `amount` from `source` into `account`.
    pub async fn confirm(&self, account: &NanoAddress, source: &NanoAddress, amount: Raw) -> bool {
        let transfer = ConfirmedTransfer {
            account: account.clone(),
            source: source.clone(),
            amount,
            block_hash: "MOCKCONFIRMATION".into(),
        };
        self.notify(transfer).await
    }
}

#[async_trait]
impl ConfirmationFeed for MockFeed {
    async fn subscribe(&self, address: &NanoAddress) -> Result<mpsc::Receiver<ConfirmedTransfer>, WalletError> {
        let (sender, receiver) = mpsc::channel(16);
        self.subscribers().insert(address.clone(), sender);
        Ok(receiver)
    }

    async fn unsubscribe(&self, address: &NanoAddress) -> Result<(), WalletError> {
        self.subscribers().remove(address);
        Ok(())
    }
}

/// Opens [`MockWallet`]s whose address is derived from the seed and index. Every wallet handed out is remembered so
/// that tests can fund it, and opening the same account again returns the same ledger.
#[derive(Default)]
pub struct MockWalletProvider {
    opened: Mutex<Vec<MockWallet>>,
    initial_balance: Raw,
    feed: Option<Arc<MockFeed>>,
}

impl MockWalletProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wallets are opened already holding `balance`, i.e. they are not fresh.
    pub fn with_initial_balance(mut self, balance: Raw) -> Self {
        self.initial_balance = balance;
        self
    }

    pub fn with_feed(mut self, feed: Arc<MockFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn opened_wallets(&self) -> Vec<MockWallet> {
        self.opened.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl WalletProvider for MockWalletProvider {
    type Wallet = MockWallet;

    async fn open_wallet(&self, seed: &Secret<String>, index: u32) -> Result<Self::Wallet, WalletError> {
        let address = derive_test_address(seed.reveal(), index);
        // Same seed and index, same account
        let existing = self
            .opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|w| w.address == address)
            .cloned();
        if let Some(wallet) = existing {
            return Ok(wallet);
        }
        let mut wallet = MockWallet::new(address);
        if let Some(feed) = &self.feed {
            wallet = wallet.with_feed(Arc::clone(feed));
        }
        wallet.set_balance(self.initial_balance);
        self.opened.lock().unwrap_or_else(PoisonError::into_inner).push(wallet.clone());
        Ok(wallet)
    }
}
