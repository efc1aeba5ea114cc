use std::time::Duration;

use super::{destination, payer, raw};
use crate::{
    payment::{PaymentPhase, WatcherConfig},
    test_utils::{derive_test_address, init_logging, MockWalletProvider},
    PaymentConfig,
    PaymentError,
    PaymentGateway,
    Secret,
    WalletPort,
    WalletProvider,
};

fn gateway(provider: MockWalletProvider) -> PaymentGateway<MockWalletProvider> {
    PaymentGateway::new(provider, WatcherConfig::new(Duration::from_secs(7)))
}

fn request() -> PaymentConfig {
    PaymentConfig::new(destination().to_string(), Duration::from_secs(600))
}

#[tokio::test]
async fn invalid_destination_provisions_nothing() {
    init_logging();
    let gateway = gateway(MockWalletProvider::new());
    let config = PaymentConfig::new("nano_1234", Duration::from_secs(600));
    let err = gateway.create(&config, raw(5)).await.expect_err("destination is invalid");
    assert!(matches!(err, PaymentError::InvalidAddress(_)));
    assert!(gateway.provider().opened_wallets().is_empty());
}

#[tokio::test]
async fn zero_amount_provisions_nothing() {
    init_logging();
    let gateway = gateway(MockWalletProvider::new());
    let err = gateway.create(&request(), raw(0)).await.expect_err("amount is zero");
    assert_eq!(err, PaymentError::InvalidAmount);
    assert!(gateway.provider().opened_wallets().is_empty());
}

#[tokio::test]
async fn destination_is_trimmed() {
    init_logging();
    let gateway = gateway(MockWalletProvider::new());
    let config = PaymentConfig::new(format!("  {}\n", destination()), Duration::from_secs(600));
    let watcher = gateway.create(&config, raw(5)).await.expect("payment request");
    assert_eq!(watcher.destination(), &destination());
}

#[tokio::test]
async fn used_wallets_are_refused() {
    init_logging();
    let gateway = gateway(MockWalletProvider::new().with_initial_balance(raw(1)));
    let err = gateway.create(&request(), raw(5)).await.expect_err("wallet is not fresh");
    assert!(matches!(err, PaymentError::WalletNotFresh { balance, .. } if balance == raw(1)));
}

#[tokio::test]
async fn wallets_with_pending_inflows_are_refused() {
    init_logging();
    let provider = MockWalletProvider::new();
    let seed = Secret::new("C0FFEE".to_string());
    // Someone already paid into the account this seed derives
    let prepaid = provider.open_wallet(&seed, 0).await.expect("wallet");
    prepaid.receive(payer(), raw(3));
    let gateway = gateway(provider);
    let err = gateway.create(&request().with_seed(seed), raw(5)).await.expect_err("wallet is not fresh");
    match err {
        PaymentError::WalletNotFresh { address, pending, .. } => {
            assert_eq!(&address, prepaid.address());
            assert_eq!(pending, raw(3));
        },
        e => panic!("unexpected error {e}"),
    }
}

#[tokio::test]
async fn supplied_seed_and_index_are_used() {
    init_logging();
    let gateway = gateway(MockWalletProvider::new());
    let config = request().with_seed(Secret::new("5EED".to_string())).with_account_index(3);
    let watcher = gateway.create(&config, raw(5)).await.expect("payment request");
    assert_eq!(watcher.watch_address(), &derive_test_address("5EED", 3));
    assert_eq!(watcher.phase(), PaymentPhase::Waiting);
    assert_eq!(watcher.requested_amount(), raw(5));
    assert_eq!(watcher.timeout(), Duration::from_secs(600));
}

#[tokio::test]
async fn every_request_gets_a_fresh_wallet() {
    init_logging();
    let gateway = gateway(MockWalletProvider::new());
    let a = gateway.create(&request(), raw(5)).await.expect("payment request");
    let b = gateway.create(&request(), raw(5)).await.expect("payment request");
    assert_ne!(a.watch_address(), b.watch_address());
    assert_eq!(gateway.provider().opened_wallets().len(), 2);
}

#[test]
fn generated_seeds_are_random_hex() {
    let provider = MockWalletProvider::new();
    let a = provider.generate_seed();
    let b = provider.generate_seed();
    assert_ne!(a, b);
    assert_eq!(a.reveal().len(), 64);
    assert!(a.reveal().chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(format!("{a:?}"), "Secret(****)");
}
