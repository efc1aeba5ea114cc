mod mocks;

mod gateway;

use std::time::Duration;

use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    payment::{PaymentWatcher, WatcherConfig},
    test_utils::{test_address, MockWallet},
    NanoAddress,
    Raw,
    WalletPort,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Callback {
    Success,
    Timeout,
}

fn destination() -> NanoAddress {
    test_address(0xDE)
}

fn payer() -> NanoAddress {
    test_address(0xA1)
}

fn raw(n: u128) -> Raw {
    Raw::from(n)
}

fn new_watcher(amount: u128, timeout_secs: u64, poll_secs: u64, wallet: MockWallet) -> PaymentWatcher<MockWallet> {
    let config = WatcherConfig::new(Duration::from_secs(poll_secs));
    PaymentWatcher::new(raw(amount), Duration::from_secs(timeout_secs), wallet, &destination().to_string(), config)
        .expect("valid payment request")
}

/// Starts the watcher with callbacks that report which of them ran.
fn start_recording<W: WalletPort>(watcher: &PaymentWatcher<W>) -> (JoinHandle<()>, mpsc::UnboundedReceiver<Callback>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let tx2 = tx.clone();
    let handle = watcher
        .start(
            move |_| {
                let _ = tx.send(Callback::Success);
            },
            move |_| {
                let _ = tx2.send(Callback::Timeout);
            },
        )
        .expect("watcher starts");
    (handle, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Callback>) -> Vec<Callback> {
    let mut calls = Vec::new();
    while let Ok(call) = rx.try_recv() {
        calls.push(call);
    }
    calls
}
