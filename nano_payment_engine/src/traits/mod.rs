//! # Wallet collaborator contracts
//!
//! The payment engine never talks to a node, signs a block or derives a key itself. Everything it needs from the
//! ledger is expressed by the traits in this module, and backends (a node RPC wallet, an in-memory test wallet)
//! implement them.
//!
//! * [`WalletPort`] is the account-level capability a single payment watcher depends on: pending inflows,
//!   consolidation and sends.
//! * [`ConfirmationFeed`] is an optional sub-capability of a wallet that pushes confirmed transfers, so that
//!   payments can settle without waiting for the next poll.
//! * [`WalletProvider`] provisions a fresh wallet for each payment request.
mod wallet_port;

pub use wallet_port::{
    ConfirmationFeed,
    ConfirmedTransfer,
    PendingInflow,
    SendAmount,
    SendReceipt,
    Transfer,
    WalletError,
    WalletPort,
    WalletProvider,
};
