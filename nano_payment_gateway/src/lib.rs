//! Nano Payment Gateway
//!
//! Connects the [`nano_payment_engine`] to a Nano node:
//! * [`rpc_wallet`] implements the engine's wallet contracts over the node's JSON-RPC interface, using wallets that
//!   live inside the node.
//! * [`ws_feed`] provides push notifications of confirmed transfers from the node's WebSocket interface.
//! * [`config`] and [`cli`] configure the gateway from `NPG_*` environment variables and command-line flags.
//! * [`runner`] and [`app`] drive a single payment from creation to settlement.
pub mod app;
pub mod cli;
pub mod config;
pub mod errors;
pub mod rpc_wallet;
pub mod runner;
pub mod ws_feed;
