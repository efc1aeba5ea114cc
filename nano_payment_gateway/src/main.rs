use clap::Parser;
use dotenvy::dotenv;
use log::*;
use nano_payment_engine::WalletProvider;
use nano_payment_gateway::{
    app::{pay, wallet_provider},
    cli::{display_envs, Arguments, Command},
    config::GatewayConfig,
    rpc_wallet::{NodeRpc, RpcWalletProvider},
    runner::PaymentOutcome,
};

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let args = Arguments::parse();
    let config = GatewayConfig::from_env_or_default();
    match args.command {
        Command::Envs => display_envs(),
        Command::Seed => {
            let provider = RpcWalletProvider::new(NodeRpc::new(config.rpc_url.clone()));
            println!("{}", provider.generate_seed().reveal());
        },
        Command::Pay(params) => {
            info!("🚀️ Starting the Nano payment gateway against {}", config.rpc_url);
            let provider = wallet_provider(&config).await;
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("🚀️ Could not listen for Ctrl-C. {e}");
                    std::future::pending::<()>().await;
                }
            };
            match pay(provider, &config, &params, shutdown).await {
                Ok(outcome) => {
                    print_outcome(&outcome);
                    if !outcome.is_success() {
                        std::process::exit(2);
                    }
                },
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(1);
                },
            }
        },
    }
}

fn print_outcome(outcome: &PaymentOutcome) {
    let status = if outcome.aborted { format!("{} (aborted)", outcome.phase) } else { outcome.phase.to_string() };
    println!("Payment at {}: {status}", outcome.watch_address);
    println!("  Requested: {}", outcome.requested);
    println!("  Received:  {}", outcome.received);
    if let Some(receipt) = &outcome.forwarded {
        println!("  Forwarded: {} [{}]", receipt.amount, receipt.block_hash);
    }
    if let Some(receipt) = &outcome.change_returned {
        println!("  Returned:  {} [{}]", receipt.amount, receipt.block_hash);
    }
    if let Some(failure) = &outcome.change_return_failure {
        println!("  Could not return {} to {}: {}", failure.amount, failure.recipient, failure.reason);
    }
}
