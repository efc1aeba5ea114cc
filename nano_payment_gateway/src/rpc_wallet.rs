//! A [`WalletPort`] backed by a wallet that lives inside a Nano node, driven over the node's JSON-RPC interface.
//!
//! Keys never leave the node: the seed is handed to `wallet_create`, accounts are derived with `account_create`, and
//! blocks are built, signed and published by the node's `receive` and `send` actions. The node must run with
//! `enable_control` for these actions to be available.
use std::sync::Arc;

use async_trait::async_trait;
use log::*;
use nano_payment_engine::{
    traits::{ConfirmationFeed, PendingInflow, SendAmount, SendReceipt, Transfer},
    NanoAddress,
    WalletError,
    WalletPort,
    WalletProvider,
};
use npg_common::{Raw, Secret};
use serde_json::{json, Value};

/// The most receivable blocks asked for in one query
const RECEIVABLE_COUNT: &str = "1000";

/// Thin JSON-RPC client for a Nano node.
#[derive(Clone, Debug)]
pub struct NodeRpc {
    client: reqwest::Client,
    url: String,
}

impl NodeRpc {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self { client: reqwest::Client::new(), url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts `request` to the node and returns the response body. Responses that carry an `error` field are turned
    /// into [`WalletError::Rpc`].
    pub async fn call(&self, request: Value) -> Result<Value, WalletError> {
        let action = request["action"].as_str().unwrap_or("unknown").to_string();
        trace!("🔌️ RPC {action}");
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| WalletError::Transport(format!("{action}: {e}")))?;
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| WalletError::InvalidResponse(format!("{action}: {e}")))?;
        check_rpc_error(&action, body)
    }
}

pub fn check_rpc_error(action: &str, body: Value) -> Result<Value, WalletError> {
    match body.get("error") {
        Some(error) => {
            let message = error.as_str().map(String::from).unwrap_or_else(|| error.to_string());
            debug!("🔌️ The node rejected {action}: {message}");
            Err(WalletError::Rpc(format!("{action}: {message}")))
        },
        None => Ok(body),
    }
}

/// A receivable block, as listed by the `receivable` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivableBlock {
    pub hash: String,
    pub inflow: PendingInflow,
}

/// Parses the response to `receivable` with `source` enabled. The node answers `"blocks": ""` when there is nothing
/// receivable. Block order is preserved.
pub fn parse_receivable(body: &Value) -> Result<Vec<ReceivableBlock>, WalletError> {
    let blocks = match body.get("blocks") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::String(s)) if s.is_empty() => return Ok(Vec::new()),
        Some(Value::Object(blocks)) => blocks,
        Some(other) => return Err(WalletError::InvalidResponse(format!("Unexpected receivable blocks: {other}"))),
    };
    blocks
        .iter()
        .map(|(hash, entry)| {
            let amount = entry["amount"]
                .as_str()
                .ok_or_else(|| WalletError::InvalidResponse(format!("Block {hash} has no amount")))
                .and_then(|s| Raw::from_raw_str(s).map_err(|e| WalletError::InvalidResponse(e.to_string())))?;
            let source = entry["source"]
                .as_str()
                .ok_or_else(|| WalletError::InvalidResponse(format!("Block {hash} has no source")))
                .and_then(|s| s.parse::<NanoAddress>().map_err(|e| WalletError::InvalidResponse(e.to_string())))?;
            Ok(ReceivableBlock { hash: hash.clone(), inflow: PendingInflow::new(source, amount) })
        })
        .collect()
}

pub fn parse_balance(body: &Value) -> Result<Raw, WalletError> {
    let balance = body["balance"]
        .as_str()
        .ok_or_else(|| WalletError::InvalidResponse("account_balance response has no balance".into()))?;
    Raw::from_raw_str(balance).map_err(|e| WalletError::InvalidResponse(e.to_string()))
}

fn string_field(body: &Value, field: &str, action: &str) -> Result<String, WalletError> {
    body[field]
        .as_str()
        .map(String::from)
        .ok_or_else(|| WalletError::InvalidResponse(format!("{action} response has no {field}")))
}

/// One account of a node-managed wallet.
pub struct RpcWallet {
    rpc: NodeRpc,
    wallet_id: String,
    address: NanoAddress,
    feed: Option<Arc<dyn ConfirmationFeed>>,
}

impl RpcWallet {
    pub fn new(rpc: NodeRpc, wallet_id: String, address: NanoAddress) -> Self {
        Self { rpc, wallet_id, address, feed: None }
    }

    pub fn with_feed(mut self, feed: Arc<dyn ConfirmationFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    async fn receivable_blocks(&self) -> Result<Vec<ReceivableBlock>, WalletError> {
        let body = self
            .rpc
            .call(json!({
                "action": "receivable",
                "account": self.address.to_string(),
                "count": RECEIVABLE_COUNT,
                "source": "true",
            }))
            .await?;
        parse_receivable(&body)
    }
}

#[async_trait]
impl WalletPort for RpcWallet {
    fn address(&self) -> &NanoAddress {
        &self.address
    }

    async fn balance(&self) -> Result<Raw, WalletError> {
        let body = self.rpc.call(json!({ "action": "account_balance", "account": self.address.to_string() })).await?;
        parse_balance(&body)
    }

    async fn pending_inflows(&self) -> Result<Vec<PendingInflow>, WalletError> {
        Ok(self.receivable_blocks().await?.into_iter().map(|b| b.inflow).collect())
    }

    async fn consolidate(&self) -> Result<(), WalletError> {
        for block in self.receivable_blocks().await? {
            let body = self
                .rpc
                .call(json!({
                    "action": "receive",
                    "wallet": self.wallet_id,
                    "account": self.address.to_string(),
                    "block": block.hash,
                }))
                .await?;
            let received = string_field(&body, "block", "receive")?;
            let PendingInflow { source, amount } = block.inflow;
            debug!("🔌️ Received {amount} from {source} into {} [{received}]", self.address);
        }
        Ok(())
    }

    async fn send(&self, transfer: Transfer) -> Result<SendReceipt, WalletError> {
        // Exact amounts are not checked against the balance here. A repeated send with the same id must reach the
        // node, which answers with the original block even though the balance has since dropped.
        let amount = match transfer.amount {
            SendAmount::Exact(amount) => amount,
            SendAmount::All => {
                let available = self.balance().await?;
                if available.is_zero() {
                    return Err(WalletError::InsufficientBalance { requested: available, available });
                }
                available
            },
        };
        let mut request = json!({
            "action": "send",
            "wallet": self.wallet_id,
            "source": self.address.to_string(),
            "destination": transfer.destination.to_string(),
            "amount": amount,
        });
        if let Some(key) = &transfer.idempotency_key {
            request["id"] = json!(key);
        }
        let body = self.rpc.call(request).await?;
        let block_hash = string_field(&body, "block", "send")?;
        debug!("🔌️ Sent {amount} from {} to {} [{block_hash}]", self.address, transfer.destination);
        Ok(SendReceipt { block_hash, amount })
    }

    fn confirmation_feed(&self) -> Option<Arc<dyn ConfirmationFeed>> {
        self.feed.clone()
    }
}

/// Opens [`RpcWallet`]s on a node, optionally wiring every wallet to a shared confirmation feed.
pub struct RpcWalletProvider {
    rpc: NodeRpc,
    feed: Option<Arc<dyn ConfirmationFeed>>,
}

impl RpcWalletProvider {
    pub fn new(rpc: NodeRpc) -> Self {
        Self { rpc, feed: None }
    }

    pub fn with_feed(mut self, feed: Arc<dyn ConfirmationFeed>) -> Self {
        self.feed = Some(feed);
        self
    }
}

#[async_trait]
impl WalletProvider for RpcWalletProvider {
    type Wallet = RpcWallet;

    async fn open_wallet(&self, seed: &Secret<String>, index: u32) -> Result<Self::Wallet, WalletError> {
        let body = self.rpc.call(json!({ "action": "wallet_create", "seed": seed.reveal() })).await?;
        let wallet_id = string_field(&body, "wallet", "wallet_create")?;
        let body = self
            .rpc
            .call(json!({ "action": "account_create", "wallet": wallet_id, "index": index.to_string() }))
            .await?;
        let address = string_field(&body, "account", "account_create")?
            .parse::<NanoAddress>()
            .map_err(|e| WalletError::InvalidResponse(e.to_string()))?;
        info!("🔌️ Opened account {index} of node wallet {wallet_id}: {address}");
        let mut wallet = RpcWallet::new(self.rpc.clone(), wallet_id, address);
        if let Some(feed) = &self.feed {
            wallet = wallet.with_feed(Arc::clone(feed));
        }
        Ok(wallet)
    }
}
