use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;

use crate::{
    traits::{ConfirmationFeed, PendingInflow, SendReceipt, Transfer, WalletError, WalletPort},
    NanoAddress,
    Raw,
};

mock! {
    pub NodeWallet {}
    #[async_trait]
    impl WalletPort for NodeWallet {
        fn address(&self) -> &NanoAddress;
        async fn balance(&self) -> Result<Raw, WalletError>;
        async fn pending_inflows(&self) -> Result<Vec<PendingInflow>, WalletError>;
        async fn consolidate(&self) -> Result<(), WalletError>;
        async fn send(&self, transfer: Transfer) -> Result<SendReceipt, WalletError>;
        fn confirmation_feed(&self) -> Option<Arc<dyn ConfirmationFeed>>;
    }
}

mod wallet_contract {
    use std::time::Duration;

    use super::MockNodeWallet;
    use crate::{
        payment::{InspectionOutcome, PaymentError, PaymentPhase, PaymentWatcher, WatcherConfig},
        test_utils::{init_logging, test_address},
        traits::{PendingInflow, SendAmount, SendReceipt, WalletError},
        Raw,
    };

    fn node_wallet() -> MockNodeWallet {
        let mut wallet = MockNodeWallet::new();
        wallet.expect_address().return_const(test_address(0x11));
        wallet.expect_confirmation_feed().returning(|| None);
        wallet
    }

    #[tokio::test]
    async fn invalid_destination_never_touches_the_wallet() {
        init_logging();
        let mut wallet = node_wallet();
        wallet.expect_balance().never();
        wallet.expect_pending_inflows().never();
        wallet.expect_consolidate().never();
        wallet.expect_send().never();
        let err = PaymentWatcher::new(
            Raw::from(5),
            Duration::from_secs(60),
            wallet,
            "nano_not_an_address",
            WatcherConfig::default(),
        )
        .expect_err("destination is invalid");
        assert!(matches!(err, PaymentError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        init_logging();
        let wallet = node_wallet();
        let destination = test_address(0x12).to_string();
        let config = WatcherConfig::default();
        let err = PaymentWatcher::new(Raw::from(0), Duration::from_secs(60), wallet, &destination, config)
            .expect_err("amount is zero");
        assert_eq!(err, PaymentError::InvalidAmount);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_node_never_settles() {
        init_logging();
        let mut wallet = node_wallet();
        wallet.expect_pending_inflows().returning(|| Err(WalletError::Transport("connection refused".into())));
        wallet.expect_consolidate().never();
        wallet.expect_send().never();
        let destination = test_address(0x12).to_string();
        let config = WatcherConfig::new(Duration::from_secs(3600));
        let watcher = PaymentWatcher::new(Raw::from(5), Duration::from_secs(600), wallet, &destination, config)
            .expect("valid payment request");
        let _handle = watcher.start(|_| {}, |_| {}).expect("watcher starts");
        for _ in 0..3 {
            assert_eq!(watcher.inspect().await, InspectionOutcome::QueryFailed);
        }
        assert_eq!(watcher.phase(), PaymentPhase::Waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn sends_carry_idempotency_keys() {
        init_logging();
        let watch = test_address(0x11);
        let payer = test_address(0x13);
        let destination = test_address(0x12);
        let mut wallet = node_wallet();
        let source = payer.clone();
        wallet
            .expect_pending_inflows()
            .returning(move || Ok(vec![PendingInflow::new(source.clone(), Raw::from(9))]));
        wallet.expect_consolidate().times(1).returning(|| Ok(()));
        let forward_key = format!("{watch}:forward");
        let to = destination.clone();
        wallet
            .expect_send()
            .withf(move |t| {
                t.destination == to &&
                    t.amount == SendAmount::Exact(Raw::from(5)) &&
                    t.idempotency_key.as_deref() == Some(forward_key.as_str())
            })
            .times(1)
            .returning(|_| Ok(SendReceipt { block_hash: "FORWARD".into(), amount: Raw::from(5) }));
        let change_key = format!("{watch}:change");
        let refund_to = payer.clone();
        wallet
            .expect_send()
            .withf(move |t| {
                t.destination == refund_to &&
                    t.amount == SendAmount::All &&
                    t.idempotency_key.as_deref() == Some(change_key.as_str())
            })
            .times(1)
            .returning(|_| Ok(SendReceipt { block_hash: "CHANGE".into(), amount: Raw::from(4) }));

        let config = WatcherConfig::new(Duration::from_secs(3600));
        let watcher =
            PaymentWatcher::new(Raw::from(5), Duration::from_secs(600), wallet, &destination.to_string(), config)
                .expect("valid payment request");
        let _handle = watcher.start(|_| {}, |_| {}).expect("watcher starts");
        assert_eq!(watcher.inspect().await, InspectionOutcome::Succeeded);
        let state = watcher.state();
        assert_eq!(state.forwarded.map(|r| r.block_hash), Some("FORWARD".to_string()));
        assert_eq!(state.change_returned.map(|r| r.amount), Some(Raw::from(4)));
    }
}
