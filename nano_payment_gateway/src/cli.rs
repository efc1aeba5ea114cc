use std::{env, env::VarError};

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Accept a single Nano payment and forward it to a destination address")]
pub struct Arguments {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Wait for a payment on a fresh address, forward it, and return any change
    #[clap(name = "pay")]
    Pay(PayParams),
    /// Print fresh random seed material
    #[clap(name = "seed")]
    Seed,
    /// Print the current (non-secret) configuration environment
    #[clap(name = "envs")]
    Envs,
}

#[derive(Debug, Args)]
pub struct PayParams {
    /// The amount requested, in Nano (XNO), e.g. 0.25
    #[arg(short = 'a', long = "amount")]
    pub amount: String,
    /// The address that receives the payment. Overrides NPG_DESTINATION
    #[arg(short = 'd', long = "destination")]
    pub destination: Option<String>,
    /// Seconds to wait for the payment. Overrides NPG_PAYMENT_TIMEOUT
    #[arg(short = 't', long = "timeout")]
    pub timeout: Option<u64>,
    /// Seed of the receiving wallet. Overrides NPG_SEED. A fresh seed is generated if neither is given
    #[arg(short = 's', long = "seed")]
    pub seed: Option<String>,
    /// Account index within the receiving wallet. Overrides NPG_ACCOUNT_INDEX
    #[arg(short = 'i', long = "index")]
    pub index: Option<u32>,
}

pub fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 9] = [
        "RUST_LOG",
        "NPG_RPC_URL",
        "NPG_WS_URL",
        "NPG_USE_WEBSOCKET",
        "NPG_POLL_INTERVAL",
        "NPG_PAYMENT_TIMEOUT",
        "NPG_DESTINATION",
        "NPG_ACCOUNT_INDEX",
        "NPG_EVENT_BUFFER",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
