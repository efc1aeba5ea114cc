use std::{future::Future, time::Duration};

use log::*;
use nano_payment_engine::{
    events::{EventHandlers, EventHooks},
    PaymentConfig,
    PaymentGateway,
    Raw,
    Secret,
    WalletProvider,
    WatcherConfig,
};

use crate::{
    cli::PayParams,
    config::GatewayConfig,
    errors::GatewayError,
    rpc_wallet::{NodeRpc, RpcWalletProvider},
    runner::{run_to_completion, PaymentOutcome},
    ws_feed::WebSocketFeed,
};

/// Hooks that leave an audit trail of every payment outcome in the log.
pub fn audit_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_payment_succeeded(|ev| {
            Box::pin(async move {
                info!(
                    "📬️ {} forwarded {} to {} ({} received) [{}]",
                    ev.watch_address, ev.amount, ev.destination, ev.received, ev.block_hash
                );
            })
        })
        .on_payment_timed_out(|ev| {
            Box::pin(async move {
                info!(
                    "📬️ {} timed out with {} received. Refunding {}",
                    ev.watch_address, ev.received, ev.refund_address
                );
            })
        })
        .on_change_return_failed(|ev| {
            Box::pin(async move {
                error!(
                    "📬️ MANUAL ACTION NEEDED. {} owed to {} is stuck at {}. {}",
                    ev.amount, ev.recipient, ev.watch_address, ev.reason
                );
            })
        });
    hooks
}

/// Builds the wallet provider for the configured node, connecting to its WebSocket if push notifications are
/// enabled. A WebSocket that cannot be reached is not fatal.
pub async fn wallet_provider(config: &GatewayConfig) -> RpcWalletProvider {
    let provider = RpcWalletProvider::new(NodeRpc::new(config.rpc_url.clone()));
    let Some(url) = config.websocket_url() else {
        info!("🚀️ Push notifications are disabled. Polling for payments every {:?}", config.poll_interval);
        return provider;
    };
    match WebSocketFeed::connect(url).await {
        Ok(feed) => provider.with_feed(feed),
        Err(e) => {
            warn!("🚀️ {e} Payments will be detected by polling only.");
            provider
        },
    }
}

/// Applies the command-line overrides to the configuration.
pub fn payment_request(config: &GatewayConfig, params: &PayParams) -> Result<(PaymentConfig, Raw), GatewayError> {
    let amount = Raw::from_nano_str(&params.amount)?;
    let mut request = config.payment_config(params.destination.clone())?;
    if let Some(timeout) = params.timeout {
        request.timeout = Duration::from_secs(timeout);
    }
    if let Some(seed) = &params.seed {
        request = request.with_seed(Secret::new(seed.clone()));
    }
    if let Some(index) = params.index {
        request = request.with_account_index(index);
    }
    Ok((request, amount))
}

/// Creates one payment request, prints where to pay, and waits until it has settled or `shutdown` completes.
pub async fn pay<P, F>(
    provider: P,
    config: &GatewayConfig,
    params: &PayParams,
    shutdown: F,
) -> Result<PaymentOutcome, GatewayError>
where
    P: WalletProvider,
    F: Future<Output = ()>,
{
    let (request, amount) = payment_request(config, params)?;
    let handlers = EventHandlers::new(config.event_buffer, audit_hooks());
    let watcher_config = WatcherConfig::new(config.poll_interval).with_producers(handlers.producers());
    let hook_tasks = handlers.start_handlers();
    let gateway = PaymentGateway::new(provider, watcher_config);
    let watcher = gateway.create(&request, amount).await?;
    println!("Send {amount} to {}", watcher.watch_address());
    println!("Waiting up to {}s for the payment...", watcher.timeout().as_secs());
    let outcome = run_to_completion(watcher, shutdown).await;
    // Dropping the gateway drops the last event producers, which lets the hook tasks drain and finish
    drop(gateway);
    for task in hook_tasks {
        if let Err(e) = task.await {
            warn!("📬️ An event hook task failed. {e}");
        }
    }
    outcome
}
