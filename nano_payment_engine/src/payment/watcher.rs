use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    time::Duration,
};

use chrono::Utc;
use log::*;
use npg_common::Raw;
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use crate::{
    address::NanoAddress,
    events::{ChangeReturnFailedEvent, EventProducers, PaymentSucceededEvent, PaymentTimedOutEvent},
    payment::{ChangeReturnFailure, PaymentError, PaymentPhase, PaymentRequest, PaymentState},
    traits::{ConfirmedTransfer, SendAmount, Transfer, WalletError, WalletPort},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(7);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct WatcherConfig {
    /// How often pending inflows are polled. Push notifications, when the wallet offers them, trigger additional
    /// inspections in between.
    pub poll_interval: Duration,
    pub producers: EventProducers,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { poll_interval: DEFAULT_POLL_INTERVAL, producers: EventProducers::default() }
    }
}

impl WatcherConfig {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval, ..Default::default() }
    }

    pub fn with_producers(mut self, producers: EventProducers) -> Self {
        self.producers = producers;
        self
    }
}

/// What a single call to [`PaymentWatcher::inspect`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectionOutcome {
    /// The watcher has not been started yet.
    NotStarted,
    /// Another inspection was in flight, so this one did nothing.
    Skipped,
    /// The pending query failed. Nothing changed; the next inspection tries again.
    QueryFailed,
    /// Not enough has been received yet.
    Waiting,
    /// Consolidation or the primary send failed. The watcher is back in `Waiting` and will retry.
    Retrying,
    /// This inspection forwarded the payment.
    Succeeded,
    /// This inspection expired the request.
    TimedOut,
    /// The request had already reached a terminal phase.
    Finished,
}

impl InspectionOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::TimedOut | Self::Finished)
    }
}

pub type OutcomeCallback<W> = Box<dyn FnOnce(PaymentWatcher<W>) + Send>;

struct OutcomeCallbacks<W: WalletPort> {
    on_success: OutcomeCallback<W>,
    on_timeout: OutcomeCallback<W>,
}

enum Trigger {
    Timer,
    Confirmation(Option<ConfirmedTransfer>),
    Wake,
}

/// Watches one dedicated address for one expected payment.
///
/// Once [started](Self::start), the watcher inspects the pending inflows of its wallet every poll interval, and
/// whenever the wallet's [confirmation feed](crate::traits::ConfirmationFeed) reports a transfer into the watch
/// address. Each inspection ends in one of three ways:
///
/// * The timeout has elapsed (checked first, so a payment that completes in the same inspection in which the
///   request expires still times out). Anything received is consolidated and refunded to the last sender, and the
///   request is `TimedOut`.
/// * At least the requested amount has arrived. Everything pending is consolidated, exactly the requested amount is
///   forwarded to the destination and the request is `Succeeded`. Any excess is then returned to the last sender.
/// * Otherwise, nothing happens.
///
/// Only one inspection runs at a time; a trigger that arrives while one is in flight is skipped. The outcome
/// callbacks run exactly once between them, on the watcher's task, before any change is returned. If consolidation
/// or the primary send fails, the request stays in `Waiting` and the settlement is retried on a later inspection.
/// Once the primary send has been attempted, retries always re-issue that same send, even after the deadline or an
/// abort, and the request can no longer time out.
///
/// Cloning a watcher is cheap; all clones refer to the same request.
pub struct PaymentWatcher<W: WalletPort> {
    inner: Arc<WatcherInner<W>>,
}

struct WatcherInner<W: WalletPort> {
    request: PaymentRequest,
    wallet: W,
    config: WatcherConfig,
    state: Mutex<PaymentState>,
    callbacks: Mutex<Option<OutcomeCallbacks<W>>>,
    // Held for the duration of an inspection. Never waited on: a busy permit means "skip".
    inspection: tokio::sync::Mutex<()>,
    subscribed: AtomicBool,
    aborted: AtomicBool,
    wake: Notify,
}

impl<W: WalletPort> WatcherInner<W> {
    fn state(&self) -> MutexGuard<'_, PaymentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn callbacks(&self) -> MutexGuard<'_, Option<OutcomeCallbacks<W>>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: WalletPort> Clone for PaymentWatcher<W> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<W: WalletPort> Debug for PaymentWatcher<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentWatcher({} of {} at {})", self.phase(), self.requested_amount(), self.watch_address())
    }
}

impl<W: WalletPort> PaymentWatcher<W> {
    /// Creates an unstarted watcher for `requested_amount`, to be forwarded to `destination`, using `wallet`'s
    /// account as the watch address.
    ///
    /// The wallet must be dedicated to this request and must start with nothing received. Fails with
    /// [`PaymentError::InvalidAddress`] if `destination` is not a valid address, and with
    /// [`PaymentError::InvalidAmount`] if `requested_amount` is zero. The wallet is not touched in either case.
    pub fn new(
        requested_amount: Raw,
        timeout: Duration,
        wallet: W,
        destination: &str,
        config: WatcherConfig,
    ) -> Result<Self, PaymentError> {
        let request = PaymentRequest::new(requested_amount, timeout, destination, wallet.address().clone())?;
        let state = PaymentState::new(request.destination().clone());
        let inner = WatcherInner {
            request,
            wallet,
            config,
            state: Mutex::new(state),
            callbacks: Mutex::new(None),
            inspection: tokio::sync::Mutex::new(()),
            subscribed: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            wake: Notify::new(),
        };
        Ok(Self { inner: Arc::new(inner) })
    }

    pub fn request(&self) -> &PaymentRequest {
        &self.inner.request
    }

    pub fn requested_amount(&self) -> Raw {
        self.inner.request.requested_amount()
    }

    pub fn timeout(&self) -> Duration {
        self.inner.request.timeout()
    }

    pub fn destination(&self) -> &NanoAddress {
        self.inner.request.destination()
    }

    pub fn watch_address(&self) -> &NanoAddress {
        self.inner.request.watch_address()
    }

    pub fn wallet(&self) -> &W {
        &self.inner.wallet
    }

    pub fn current_receivable(&self) -> Raw {
        self.inner.state().current_receivable
    }

    pub fn last_sender(&self) -> NanoAddress {
        self.inner.state().last_sender.clone()
    }

    pub fn phase(&self) -> PaymentPhase {
        self.inner.state().phase
    }

    pub fn change_return_failure(&self) -> Option<ChangeReturnFailure> {
        self.inner.state().change_return_failure.clone()
    }

    /// A snapshot of the mutable state of the request.
    pub fn state(&self) -> PaymentState {
        self.inner.state().clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Starts watching. Returns immediately; the watching happens on a spawned task, whose handle is returned. The
    /// task ends when the request reaches a terminal phase.
    ///
    /// Exactly one of `on_success` and `on_timeout` will eventually be called, with the watcher as argument.
    ///
    /// A watcher can only be started once. Must be called from within a Tokio runtime.
    pub fn start<S, T>(&self, on_success: S, on_timeout: T) -> Result<JoinHandle<()>, PaymentError>
    where
        S: FnOnce(PaymentWatcher<W>) + Send + 'static,
        T: FnOnce(PaymentWatcher<W>) + Send + 'static,
    {
        let started = {
            let mut state = self.inner.state();
            if state.is_started() {
                return Err(PaymentError::AlreadyStarted);
            }
            *self.inner.callbacks() =
                Some(OutcomeCallbacks { on_success: Box::new(on_success), on_timeout: Box::new(on_timeout) });
            state.mark_started()
        };
        info!(
            "👀️ Watching {} for {} (to be forwarded to {}). Timeout in {}s.",
            self.watch_address(),
            self.requested_amount(),
            self.destination(),
            self.timeout().as_secs()
        );
        let watcher = self.clone();
        Ok(tokio::spawn(async move { watcher.run(started).await }))
    }

    /// Gives up on the payment: the next inspection, which is triggered immediately if the watcher is running,
    /// takes the timeout path regardless of how much time is left. A payment whose forward has already been
    /// attempted is not refunded; its forward is retried instead.
    pub fn abort(&self) {
        if !self.inner.aborted.swap(true, Ordering::SeqCst) {
            info!("👀️ Payment request at {} was aborted", self.watch_address());
        }
        self.inner.wake.notify_one();
    }

    async fn run(self, started: Instant) {
        let period = self.inner.config.poll_interval.max(MIN_POLL_INTERVAL);
        let mut timer = tokio::time::interval_at(started + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut confirmations = self.subscribe_to_confirmations().await;
        loop {
            let trigger = tokio::select! {
                _ = timer.tick() => Trigger::Timer,
                transfer = next_confirmation(&mut confirmations) => Trigger::Confirmation(transfer),
                _ = self.inner.wake.notified() => Trigger::Wake,
            };
            match trigger {
                Trigger::Timer => trace!("👀️ Scheduled inspection of {}", self.watch_address()),
                Trigger::Wake => trace!("👀️ Woken up to inspect {}", self.watch_address()),
                Trigger::Confirmation(None) => {
                    warn!("👀️ The confirmation feed for {} closed. Relying on polling only.", self.watch_address());
                    confirmations = None;
                    continue;
                },
                Trigger::Confirmation(Some(transfer)) if &transfer.account != self.watch_address() => {
                    trace!("👀️ Ignoring a confirmation for {}", transfer.account);
                    continue;
                },
                Trigger::Confirmation(Some(transfer)) => debug!(
                    "👀️ Confirmation of {} from {} into {} [{}]",
                    transfer.amount,
                    transfer.source,
                    transfer.account,
                    transfer.block_hash
                ),
            }
            if self.inspect().await.is_terminal() {
                break;
            }
        }
        drop(confirmations);
        self.release_subscription().await;
        debug!("👀️ Stopped watching {}. Final phase: {}", self.watch_address(), self.phase());
    }

    /// Runs one inspection cycle: queries the pending inflows and, depending on the elapsed time and the amount
    /// received, times the request out, settles it, or leaves it waiting.
    ///
    /// Inspections are normally triggered by the watcher's own timer and confirmation feed, but can be triggered
    /// externally as well. Concurrent calls are safe: while one inspection is in flight, others return
    /// [`InspectionOutcome::Skipped`] immediately.
    pub async fn inspect(&self) -> InspectionOutcome {
        let Ok(_permit) = self.inner.inspection.try_lock() else {
            trace!("👀️ An inspection of {} is already in flight. Skipping.", self.watch_address());
            return InspectionOutcome::Skipped;
        };
        let started = {
            let state = self.inner.state();
            if state.phase.is_terminal() {
                return InspectionOutcome::Finished;
            }
            match state.start_instant() {
                Some(instant) => instant,
                None => return InspectionOutcome::NotStarted,
            }
        };
        let inflows = match self.inner.wallet.pending_inflows().await {
            Ok(inflows) => inflows,
            Err(e) => {
                warn!(
                    "👀️ Could not query pending inflows for {}. Will try again on the next inspection. {e}",
                    self.watch_address()
                );
                return InspectionOutcome::QueryFailed;
            },
        };
        let (pending, receivable, forward_attempted) = {
            let mut state = self.inner.state();
            let pending = state.record_inflows(&inflows);
            (pending, state.current_receivable, state.forward_attempted)
        };
        trace!("👀️ {} has {receivable} receivable ({pending} pending)", self.watch_address());

        if forward_attempted {
            debug!("💸️ Retrying the forward from {} to {}", self.watch_address(), self.destination());
            return self.settle_payment(pending, receivable).await;
        }

        if self.is_aborted() || started.elapsed() >= self.timeout() {
            return self.settle_timeout(pending, receivable).await;
        }
        if receivable < self.requested_amount() {
            debug!(
                "👀️ {} has received {receivable} of the {} requested so far",
                self.watch_address(),
                self.requested_amount()
            );
            return InspectionOutcome::Waiting;
        }
        self.settle_payment(pending, receivable).await
    }

    async fn settle_timeout(&self, pending: Raw, receivable: Raw) -> InspectionOutcome {
        self.set_phase(PaymentPhase::Settling);
        info!("👀️ Payment request at {} expired with {receivable} received", self.watch_address());
        if !pending.is_zero() {
            if let Err(e) = self.consolidate(pending).await {
                error!(
                    "💸️ Could not consolidate {pending} at {} after the request expired. Will retry. {e}",
                    self.watch_address()
                );
                self.set_phase(PaymentPhase::Waiting);
                return InspectionOutcome::Retrying;
            }
        }
        self.release_subscription().await;
        let refund_address = self.finish(PaymentPhase::TimedOut);
        let callbacks = self.inner.callbacks().take();
        if let Some(callbacks) = callbacks {
            (callbacks.on_timeout)(self.clone());
        }
        let event = PaymentTimedOutEvent {
            watch_address: self.watch_address().clone(),
            received: receivable,
            refund_address: refund_address.clone(),
            timestamp: Utc::now(),
        };
        self.inner.config.producers.publish_payment_timed_out(event).await;
        if !receivable.is_zero() {
            self.return_change(refund_address, receivable).await;
        }
        InspectionOutcome::TimedOut
    }

    async fn settle_payment(&self, pending: Raw, receivable: Raw) -> InspectionOutcome {
        self.set_phase(PaymentPhase::Settling);
        let requested = self.requested_amount();
        debug!(
            "💸️ {receivable} received at {}. Forwarding {requested} to {}",
            self.watch_address(),
            self.destination()
        );
        if !pending.is_zero() {
            if let Err(e) = self.consolidate(pending).await {
                error!("💸️ Could not consolidate {pending} at {}. Will retry. {e}", self.watch_address());
                self.set_phase(PaymentPhase::Waiting);
                return InspectionOutcome::Retrying;
            }
        }
        let transfer = Transfer::new(self.destination().clone(), SendAmount::Exact(requested))
            .with_idempotency_key(format!("{}:forward", self.watch_address()));
        self.inner.state().forward_attempted = true;
        let receipt = match self.inner.wallet.send(transfer).await {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(
                    "💸️ Could not forward {requested} from {} to {}. Will retry. {e}",
                    self.watch_address(),
                    self.destination()
                );
                self.set_phase(PaymentPhase::Waiting);
                return InspectionOutcome::Retrying;
            },
        };
        info!("💸️ Forwarded {requested} to {} [{}]", self.destination(), receipt.block_hash);
        self.release_subscription().await;
        self.inner.state().forwarded = Some(receipt.clone());
        let refund_address = self.finish(PaymentPhase::Succeeded);
        let callbacks = self.inner.callbacks().take();
        if let Some(callbacks) = callbacks {
            (callbacks.on_success)(self.clone());
        }
        let event = PaymentSucceededEvent {
            watch_address: self.watch_address().clone(),
            destination: self.destination().clone(),
            amount: requested,
            received: receivable,
            block_hash: receipt.block_hash,
            timestamp: Utc::now(),
        };
        self.inner.config.producers.publish_payment_succeeded(event).await;
        let change = receivable.saturating_sub(requested);
        if !change.is_zero() {
            self.return_change(refund_address, change).await;
        }
        InspectionOutcome::Succeeded
    }

    async fn consolidate(&self, pending: Raw) -> Result<(), WalletError> {
        self.inner.wallet.consolidate().await?;
        self.inner.state().consolidated += pending;
        debug!("💸️ Consolidated {pending} at {}", self.watch_address());
        Ok(())
    }

    /// Sends whatever is left at the watch address back to `recipient`. Best effort: failures are recorded and
    /// published, but never change the outcome of the request.
    async fn return_change(&self, recipient: NanoAddress, amount: Raw) {
        let transfer = Transfer::new(recipient.clone(), SendAmount::All)
            .with_idempotency_key(format!("{}:change", self.watch_address()));
        match self.inner.wallet.send(transfer).await {
            Ok(receipt) => {
                info!("💸️ Returned {} to {recipient} [{}]", receipt.amount, receipt.block_hash);
                self.inner.state().change_returned = Some(receipt);
            },
            Err(e) => {
                error!(
                    "💸️ Could not return {amount} to {recipient}. The funds remain at {} and must be swept manually. \
                     {e}",
                    self.watch_address()
                );
                let reason = e.to_string();
                self.inner.state().change_return_failure =
                    Some(ChangeReturnFailure { recipient: recipient.clone(), amount, reason: reason.clone() });
                let event = ChangeReturnFailedEvent {
                    watch_address: self.watch_address().clone(),
                    recipient,
                    amount,
                    reason,
                    timestamp: Utc::now(),
                };
                self.inner.config.producers.publish_change_return_failed(event).await;
            },
        }
    }

    fn set_phase(&self, phase: PaymentPhase) {
        self.inner.state().phase = phase;
    }

    /// Enters the terminal `phase`, wakes the watch loop so that it stops, and returns the change-return address as
    /// of this moment.
    fn finish(&self, phase: PaymentPhase) -> NanoAddress {
        let refund_address = {
            let mut state = self.inner.state();
            state.phase = phase;
            state.completed_at = Some(Utc::now());
            state.last_sender.clone()
        };
        self.inner.wake.notify_one();
        refund_address
    }

    async fn subscribe_to_confirmations(&self) -> Option<mpsc::Receiver<ConfirmedTransfer>> {
        let feed = self.inner.wallet.confirmation_feed()?;
        match feed.subscribe(self.watch_address()).await {
            Ok(receiver) => {
                self.inner.subscribed.store(true, Ordering::SeqCst);
                debug!("👀️ Subscribed to confirmations for {}", self.watch_address());
                Some(receiver)
            },
            Err(e) => {
                warn!(
                    "👀️ Could not subscribe to confirmations for {}. Relying on polling only. {e}",
                    self.watch_address()
                );
                None
            },
        }
    }

    async fn release_subscription(&self) {
        if !self.inner.subscribed.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(feed) = self.inner.wallet.confirmation_feed() {
            match feed.unsubscribe(self.watch_address()).await {
                Ok(()) => debug!("👀️ Unsubscribed from confirmations for {}", self.watch_address()),
                Err(e) => warn!("👀️ Could not unsubscribe from confirmations for {}. {e}", self.watch_address()),
            }
        }
    }
}

async fn next_confirmation(feed: &mut Option<mpsc::Receiver<ConfirmedTransfer>>) -> Option<ConfirmedTransfer> {
    match feed {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}
