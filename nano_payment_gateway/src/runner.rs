use std::future::Future;

use log::*;
use nano_payment_engine::{
    payment::ChangeReturnFailure,
    traits::SendReceipt,
    NanoAddress,
    PaymentPhase,
    PaymentWatcher,
    Raw,
    WalletPort,
};
use tokio::sync::mpsc;

use crate::errors::GatewayError;

/// How a payment request ended, as reported to the operator.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub phase: PaymentPhase,
    pub watch_address: NanoAddress,
    pub requested: Raw,
    pub received: Raw,
    pub forwarded: Option<SendReceipt>,
    pub change_returned: Option<SendReceipt>,
    pub change_return_failure: Option<ChangeReturnFailure>,
    pub aborted: bool,
}

impl PaymentOutcome {
    fn from_watcher<W: WalletPort>(watcher: &PaymentWatcher<W>) -> Self {
        let state = watcher.state();
        Self {
            phase: state.phase,
            watch_address: watcher.watch_address().clone(),
            requested: watcher.requested_amount(),
            received: state.current_receivable,
            forwarded: state.forwarded,
            change_returned: state.change_returned,
            change_return_failure: state.change_return_failure,
            aborted: watcher.is_aborted(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.phase == PaymentPhase::Succeeded
    }
}

/// Starts `watcher` and waits until the payment has settled, including any change return.
///
/// If `shutdown` completes first, the payment is aborted, which refunds whatever was received, and the abort is
/// awaited just the same.
pub async fn run_to_completion<W, F>(watcher: PaymentWatcher<W>, shutdown: F) -> Result<PaymentOutcome, GatewayError>
where
    W: WalletPort,
    F: Future<Output = ()>,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<PaymentPhase>();
    let on_timeout_tx = tx.clone();
    let mut handle = watcher.start(
        move |w| {
            info!("🚀️ Payment at {} succeeded", w.watch_address());
            let _ = tx.send(PaymentPhase::Succeeded);
        },
        move |w| {
            info!("🚀️ Payment at {} timed out", w.watch_address());
            let _ = on_timeout_tx.send(PaymentPhase::TimedOut);
        },
    )?;
    tokio::select! {
        result = &mut handle => result.map_err(|e| GatewayError::WatcherFailed(e.to_string()))?,
        _ = shutdown => {
            warn!("🚀️ Shutting down. Aborting the payment at {}", watcher.watch_address());
            watcher.abort();
            handle.await.map_err(|e| GatewayError::WatcherFailed(e.to_string()))?;
        },
    }
    let phase = rx.recv().await.ok_or_else(|| GatewayError::WatcherFailed("No outcome callback was called".into()))?;
    let outcome = PaymentOutcome::from_watcher(&watcher);
    debug!("🚀️ Payment at {} finished as {phase}", outcome.watch_address);
    Ok(outcome)
}
