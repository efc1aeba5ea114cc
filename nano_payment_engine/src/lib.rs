//! Nano Payment Engine
//!
//! The engine watches a dedicated Nano address for one expected payment, forwards exactly the requested amount to a
//! destination once it has arrived, and returns any overpayment to its sender. If the payment does not arrive in
//! time, whatever was received is refunded instead.
//!
//! The library is divided into these sections:
//! 1. The wallet contracts ([`mod@traits`]). The engine never speaks to a node directly. Backends implement
//!    [`WalletPort`] (and optionally [`ConfirmationFeed`]) for a single account, and [`WalletProvider`] to provision
//!    one such account per payment.
//! 2. Payment requests and the [`PaymentWatcher`] state machine ([`mod@payment`]), along with the
//!    [`PaymentGateway`] factory that pairs each request with a fresh wallet.
//! 3. Nano address validation ([`NanoAddress`]).
//!
//! The engine also publishes outcome events (payment succeeded, timed out, change return failed) that can be hooked
//! into with the same stateless pub-sub mechanism in [`mod@events`].
mod address;
mod gateway;

pub mod events;
pub mod payment;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(test)]
mod tests;

pub use address::{AddressError, NanoAddress};
pub use gateway::{PaymentConfig, PaymentGateway};
pub use npg_common::{Raw, Secret};
pub use payment::{
    InspectionOutcome,
    PaymentError,
    PaymentPhase,
    PaymentRequest,
    PaymentState,
    PaymentWatcher,
    WatcherConfig,
};
pub use traits::{ConfirmationFeed, WalletError, WalletPort, WalletProvider};
