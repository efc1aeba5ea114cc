use std::fmt::Display;

use chrono::{DateTime, Utc};
use npg_common::Raw;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{
    address::NanoAddress,
    traits::{PendingInflow, SendReceipt},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentPhase {
    /// Watching for inflows. This is also where a failed settlement attempt returns to.
    Waiting,
    /// A settlement (forwarding or refunding) is in flight.
    Settling,
    Succeeded,
    TimedOut,
}

impl PaymentPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::TimedOut)
    }
}

impl Display for PaymentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Waiting => "Waiting",
            Self::Settling => "Settling",
            Self::Succeeded => "Succeeded",
            Self::TimedOut => "TimedOut",
        };
        f.write_str(s)
    }
}

/// Change (or a timeout refund) that could not be sent back. The funds are still at the watch address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReturnFailure {
    pub recipient: NanoAddress,
    pub amount: Raw,
    pub reason: String,
}

/// The mutable half of a payment request. Owned by a single watcher.
#[derive(Debug, Clone)]
pub struct PaymentState {
    /// Everything received at the watch address as of the last inspection: pending inflows plus whatever an earlier
    /// settlement attempt already consolidated.
    pub current_receivable: Raw,
    /// The source of the most recent inflow. Change is returned here. Before any inflow is seen, this is the
    /// destination address.
    pub last_sender: NanoAddress,
    /// Value already pulled into the spendable balance by a settlement attempt that then failed.
    pub consolidated: Raw,
    /// Set once the primary transfer has been sent to the wallet. From then on the request can only end by
    /// forwarding, since the first attempt may have landed even if it reported an error.
    pub forward_attempted: bool,
    pub phase: PaymentPhase,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// The primary transfer to the destination
    pub forwarded: Option<SendReceipt>,
    pub change_returned: Option<SendReceipt>,
    pub change_return_failure: Option<ChangeReturnFailure>,
    start_instant: Option<Instant>,
}

impl PaymentState {
    pub fn new(destination: NanoAddress) -> Self {
        Self {
            current_receivable: Raw::default(),
            last_sender: destination,
            consolidated: Raw::default(),
            forward_attempted: false,
            phase: PaymentPhase::Waiting,
            started_at: None,
            completed_at: None,
            forwarded: None,
            change_returned: None,
            change_return_failure: None,
            start_instant: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.start_instant.is_some()
    }

    pub(crate) fn start_instant(&self) -> Option<Instant> {
        self.start_instant
    }

    pub(crate) fn mark_started(&mut self) -> Instant {
        let now = Instant::now();
        self.start_instant = Some(now);
        self.started_at = Some(Utc::now());
        now
    }

    /// Updates the receivable and last sender from a fresh pending query and returns the total still pending.
    ///
    /// When nothing is pending, the last known sender is kept.
    pub(crate) fn record_inflows(&mut self, inflows: &[PendingInflow]) -> Raw {
        let pending = inflows.iter().map(|i| i.amount).sum::<Raw>();
        self.current_receivable = self.consolidated + pending;
        if let Some(first) = inflows.first() {
            self.last_sender = first.source.clone();
        }
        pending
    }
}
