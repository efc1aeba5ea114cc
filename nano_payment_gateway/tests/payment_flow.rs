use std::time::Duration;

use nano_payment_engine::{
    test_utils::{init_logging, test_address, MockWallet, MockWalletProvider, RecordedSend},
    PaymentPhase,
    PaymentWatcher,
    Raw,
    WatcherConfig,
};
use nano_payment_gateway::{
    app::{pay, payment_request},
    cli::PayParams,
    config::GatewayConfig,
    errors::GatewayError,
    runner::run_to_completion,
};
use npg_common::RAW_PER_NANO;
use tokio::time::sleep;

fn destination() -> String {
    test_address(0xDE).to_string()
}

fn watcher(wallet: MockWallet, amount: u128) -> PaymentWatcher<MockWallet> {
    let config = WatcherConfig::new(Duration::from_secs(7));
    PaymentWatcher::new(Raw::from(amount), Duration::from_secs(60), wallet, &destination(), config)
        .expect("valid payment request")
}

fn params(amount: &str) -> PayParams {
    PayParams { amount: amount.to_string(), destination: None, timeout: None, seed: None, index: None }
}

fn config() -> GatewayConfig {
    GatewayConfig { destination: Some(destination()), ..GatewayConfig::default() }
}

#[tokio::test(start_paused = true)]
async fn overpayment_settles_completely() {
    init_logging();
    let wallet = MockWallet::new(test_address(0x01));
    let payer = test_address(0x02);
    wallet.receive(payer.clone(), Raw::from(12));
    let outcome = run_to_completion(watcher(wallet.clone(), 10), std::future::pending()).await.expect("outcome");
    assert!(outcome.is_success());
    assert!(!outcome.aborted);
    assert_eq!(outcome.received, Raw::from(12));
    assert_eq!(outcome.forwarded.map(|r| r.amount), Some(Raw::from(10)));
    // The change return has completed by the time the outcome is reported
    assert_eq!(outcome.change_returned.map(|r| r.amount), Some(Raw::from(2)));
    assert_eq!(wallet.sends().last(), Some(&RecordedSend { destination: payer, amount: Raw::from(2) }));
}

#[tokio::test(start_paused = true)]
async fn shutdown_aborts_and_refunds() {
    init_logging();
    let wallet = MockWallet::new(test_address(0x03));
    let payer = test_address(0x04);
    wallet.receive(payer.clone(), Raw::from(4));
    let outcome = run_to_completion(watcher(wallet.clone(), 10), sleep(Duration::from_secs(3))).await.expect("outcome");
    assert_eq!(outcome.phase, PaymentPhase::TimedOut);
    assert!(outcome.aborted);
    assert!(outcome.forwarded.is_none());
    assert_eq!(wallet.sends(), vec![RecordedSend { destination: payer, amount: Raw::from(4) }]);
}

#[tokio::test(start_paused = true)]
async fn unpaid_request_times_out() {
    init_logging();
    let mut params = params("1.5");
    params.timeout = Some(30);
    let outcome =
        pay(MockWalletProvider::new(), &config(), &params, std::future::pending()).await.expect("payment outcome");
    assert_eq!(outcome.phase, PaymentPhase::TimedOut);
    assert_eq!(outcome.requested, Raw::from(3 * RAW_PER_NANO / 2));
    assert_eq!(outcome.received, Raw::from(0));
    assert!(!outcome.aborted);
}

#[tokio::test]
async fn invalid_requests_are_refused() {
    init_logging();
    let err = pay(MockWalletProvider::new(), &config(), &params("lots"), std::future::pending())
        .await
        .expect_err("amount is invalid");
    assert!(matches!(err, GatewayError::InvalidAmount(_)));

    let no_destination = GatewayConfig::default();
    let err = pay(MockWalletProvider::new(), &no_destination, &params("1"), std::future::pending())
        .await
        .expect_err("no destination");
    assert!(matches!(err, GatewayError::ConfigurationError(_)));

    let mut bad_destination = params("1");
    bad_destination.destination = Some("nano_nope".to_string());
    let err = pay(MockWalletProvider::new(), &config(), &bad_destination, std::future::pending())
        .await
        .expect_err("destination is invalid");
    assert!(matches!(err, GatewayError::Payment(_)));
}

#[test]
fn command_line_overrides_configuration() {
    let config = GatewayConfig { account_index: 1, ..config() };
    let params = PayParams {
        amount: "0.000001".to_string(),
        destination: Some(test_address(0xEE).to_string()),
        timeout: Some(45),
        seed: Some("FEED".to_string()),
        index: Some(7),
    };
    let (request, amount) = payment_request(&config, &params).expect("valid request");
    assert_eq!(amount, Raw::from(RAW_PER_NANO / 1_000_000));
    assert_eq!(request.destination, test_address(0xEE).to_string());
    assert_eq!(request.timeout, Duration::from_secs(45));
    assert_eq!(request.account_index, Some(7));
    assert_eq!(request.seed.as_ref().map(|s| s.reveal().as_str()), Some("FEED"));
}
