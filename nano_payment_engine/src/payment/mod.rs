//! # Payment requests
//!
//! A payment request is a one-shot expectation: "`requested_amount` should arrive at `watch_address` within
//! `timeout`, and then be forwarded to `destination`". The immutable half is a [`PaymentRequest`]; the mutable half
//! is a [`PaymentState`], owned by the [`PaymentWatcher`] that drives the request from `Waiting` to one of the two
//! terminal phases, `Succeeded` or `TimedOut`.
mod errors;
mod request;
mod state;
mod watcher;

pub use errors::PaymentError;
pub use request::PaymentRequest;
pub use state::{ChangeReturnFailure, PaymentPhase, PaymentState};
pub use watcher::{InspectionOutcome, OutcomeCallback, PaymentWatcher, WatcherConfig, DEFAULT_POLL_INTERVAL};
