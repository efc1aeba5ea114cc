//! Confirmation feed over the Nano node WebSocket interface.
//!
//! A single connection serves every watcher. Accounts are added to (and removed from) the node's `confirmation`
//! subscription as watchers come and go, and confirmed `send` blocks are routed to the watcher of the receiving
//! account. Notifications are best effort: if a watcher's channel is full, or the connection drops, they are lost
//! and the watcher falls back on polling.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::*;
use nano_payment_engine::{
    traits::{ConfirmationFeed, ConfirmedTransfer},
    NanoAddress,
    WalletError,
};
use npg_common::Raw;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const ROUTE_BUFFER: usize = 16;

type Routes = Arc<Mutex<HashMap<NanoAddress, mpsc::Sender<ConfirmedTransfer>>>>;

#[derive(Deserialize)]
struct WsMessage {
    topic: Option<String>,
    message: Option<ConfirmationMessage>,
}

#[derive(Deserialize)]
struct ConfirmationMessage {
    /// The account that published the block, i.e. the sender
    account: String,
    amount: String,
    hash: String,
    block: ConfirmedBlock,
}

#[derive(Deserialize)]
struct ConfirmedBlock {
    subtype: Option<String>,
    link_as_account: Option<String>,
}

/// Extracts the transfer from a `confirmation` topic message. Anything that is not a confirmed `send` block, or that
/// cannot be parsed, yields `None`.
pub fn parse_confirmation(text: &str) -> Option<ConfirmedTransfer> {
    let msg = serde_json::from_str::<WsMessage>(text).ok()?;
    if msg.topic.as_deref() != Some("confirmation") {
        return None;
    }
    let confirmation = msg.message?;
    if confirmation.block.subtype.as_deref() != Some("send") {
        return None;
    }
    let account = confirmation.block.link_as_account?.parse::<NanoAddress>().ok()?;
    let source = confirmation.account.parse::<NanoAddress>().ok()?;
    let amount = Raw::from_raw_str(&confirmation.amount).ok()?;
    Some(ConfirmedTransfer { account, source, amount, block_hash: confirmation.hash })
}

/// A shared connection to the node's WebSocket server.
pub struct WebSocketFeed {
    url: String,
    outgoing: mpsc::Sender<String>,
    routes: Routes,
    subscribed: AtomicBool,
}

impl WebSocketFeed {
    /// Connects to `url` and starts the reader and writer tasks.
    pub async fn connect(url: &str) -> Result<Arc<Self>, WalletError> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| WalletError::Transport(format!("Could not connect to {url}. {e}")))?;
        info!("🔌️ Connected to the node WebSocket at {url}");
        let (mut write, mut read) = socket.split();
        let (outgoing, mut out_rx) = mpsc::channel::<String>(32);
        let routes: Routes = Arc::default();

        let writer_url = url.to_string();
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if let Err(e) = write.send(Message::Text(msg)).await {
                    warn!("🔌️ Could not write to the node WebSocket at {writer_url}. {e}");
                    break;
                }
            }
            debug!("🔌️ WebSocket writer for {writer_url} stopped");
        });

        let reader_routes = Arc::clone(&routes);
        let reader_url = url.to_string();
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => route_confirmation(&reader_routes, &text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {},
                    Err(e) => {
                        warn!("🔌️ Error reading from the node WebSocket at {reader_url}. {e}");
                        break;
                    },
                }
            }
            warn!("🔌️ The node WebSocket at {reader_url} closed. Watchers will rely on polling.");
            // Closing every channel tells the watchers that the feed is gone
            lock(&reader_routes).clear();
        });

        Ok(Arc::new(Self { url: url.to_string(), outgoing, routes, subscribed: AtomicBool::new(false) }))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send_command(&self, command: serde_json::Value) -> Result<(), WalletError> {
        self.outgoing
            .send(command.to_string())
            .await
            .map_err(|_| WalletError::Transport(format!("The WebSocket connection to {} is closed", self.url)))
    }
}

fn lock(routes: &Routes) -> MutexGuard<'_, HashMap<NanoAddress, mpsc::Sender<ConfirmedTransfer>>> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

fn route_confirmation(routes: &Routes, text: &str) {
    let Some(transfer) = parse_confirmation(text) else {
        trace!("🔌️ Ignoring WebSocket message: {text}");
        return;
    };
    let sender = lock(routes).get(&transfer.account).cloned();
    match sender {
        Some(sender) => {
            if let Err(e) = sender.try_send(transfer) {
                debug!("🔌️ Dropped a confirmation notification. {e}");
            }
        },
        None => trace!("🔌️ Confirmation for unwatched account {}", transfer.account),
    }
}

#[async_trait]
impl ConfirmationFeed for WebSocketFeed {
    async fn subscribe(&self, address: &NanoAddress) -> Result<mpsc::Receiver<ConfirmedTransfer>, WalletError> {
        let already_subscribed = self.subscribed.swap(true, Ordering::SeqCst);
        let command = if already_subscribed {
            json!({ "action": "update", "topic": "confirmation", "options": { "accounts_add": [address.to_string()] } })
        } else {
            json!({ "action": "subscribe", "topic": "confirmation", "options": { "accounts": [address.to_string()] } })
        };
        let (sender, receiver) = mpsc::channel(ROUTE_BUFFER);
        lock(&self.routes).insert(address.clone(), sender);
        if let Err(e) = self.send_command(command).await {
            lock(&self.routes).remove(address);
            if !already_subscribed {
                // The node never saw the subscription, so the next account has to open it again
                self.subscribed.store(false, Ordering::SeqCst);
            }
            return Err(e);
        }
        debug!("🔌️ Subscribed to confirmations for {address}");
        Ok(receiver)
    }

    async fn unsubscribe(&self, address: &NanoAddress) -> Result<(), WalletError> {
        lock(&self.routes).remove(address);
        let command = json!({
            "action": "update",
            "topic": "confirmation",
            "options": { "accounts_del": [address.to_string()] }
        });
        self.send_command(command).await
    }
}

#[cfg(test)]
mod test {
    use std::sync::{atomic::AtomicBool, Arc};

    use nano_payment_engine::{test_utils::test_address, traits::ConfirmationFeed};
    use npg_common::Raw;
    use serde_json::Value;
    use tokio::sync::mpsc;

    use super::{lock, parse_confirmation, WebSocketFeed};

    fn detached_feed(outgoing: mpsc::Sender<String>) -> WebSocketFeed {
        WebSocketFeed {
            url: "ws://127.0.0.1:7078".to_string(),
            outgoing,
            routes: Arc::default(),
            subscribed: AtomicBool::new(false),
        }
    }

    fn action(command: &str) -> (String, Value) {
        let command = serde_json::from_str::<Value>(command).expect("valid command");
        (command["action"].as_str().unwrap_or_default().to_string(), command["options"].clone())
    }

    fn confirmation(subtype: &str) -> String {
        let sender = test_address(0x5E);
        let receiver = test_address(0x7C);
        format!(
            r#"{{
                "topic": "confirmation",
                "time": "1700000000000",
                "message": {{
                    "account": "{sender}",
                    "amount": "1000000000000000000000000",
                    "hash": "82D41BFF16A9F8A6D5D7E5A3B2C1D0E9F8A7B6C5D4E3F2A1B0C9D8E7F6A5B4C3",
                    "confirmation_type": "active_quorum",
                    "block": {{
                        "type": "state",
                        "account": "{sender}",
                        "balance": "0",
                        "link_as_account": "{receiver}",
                        "subtype": "{subtype}"
                    }}
                }}
            }}"#
        )
    }

    #[test]
    fn send_confirmation() {
        let transfer = parse_confirmation(&confirmation("send")).expect("a send confirmation");
        assert_eq!(transfer.account, test_address(0x7C));
        assert_eq!(transfer.source, test_address(0x5E));
        assert_eq!(transfer.amount, Raw::from(1_000_000_000_000_000_000_000_000));
        assert!(transfer.block_hash.starts_with("82D41BFF"));
    }

    #[test]
    fn other_messages_are_ignored() {
        assert!(parse_confirmation(&confirmation("receive")).is_none());
        assert!(parse_confirmation(r#"{"ack": "subscribe", "time": "1700000000000"}"#).is_none());
        assert!(parse_confirmation(r#"{"topic": "vote", "message": {}}"#).is_none());
        assert!(parse_confirmation("not json").is_none());
        let bad_receiver = confirmation("send").replace(&test_address(0x7C).to_string(), "nano_bogus");
        assert!(parse_confirmation(&bad_receiver).is_none());
    }

    #[tokio::test]
    async fn first_account_subscribes_and_later_ones_are_added() {
        let (outgoing, mut commands) = mpsc::channel(8);
        let feed = detached_feed(outgoing);
        let first = test_address(0x01);
        let second = test_address(0x02);
        feed.subscribe(&first).await.expect("subscribed");
        feed.subscribe(&second).await.expect("subscribed");
        feed.unsubscribe(&first).await.expect("unsubscribed");

        let (name, options) = action(&commands.recv().await.expect("subscribe command"));
        assert_eq!(name, "subscribe");
        assert_eq!(options["accounts"][0], first.to_string());
        let (name, options) = action(&commands.recv().await.expect("update command"));
        assert_eq!(name, "update");
        assert_eq!(options["accounts_add"][0], second.to_string());
        let (name, options) = action(&commands.recv().await.expect("update command"));
        assert_eq!(name, "update");
        assert_eq!(options["accounts_del"][0], first.to_string());
        assert!(!lock(&feed.routes).contains_key(&first));
        assert!(lock(&feed.routes).contains_key(&second));
    }

    #[tokio::test]
    async fn failed_subscription_is_opened_again_by_the_next_account() {
        let (closed, dropped) = mpsc::channel(8);
        drop(dropped);
        let mut feed = detached_feed(closed);
        let first = test_address(0x01);
        assert!(feed.subscribe(&first).await.is_err());
        assert!(lock(&feed.routes).is_empty());

        let (outgoing, mut commands) = mpsc::channel(8);
        feed.outgoing = outgoing;
        let second = test_address(0x02);
        feed.subscribe(&second).await.expect("subscribed");
        let (name, options) = action(&commands.recv().await.expect("subscribe command"));
        assert_eq!(name, "subscribe");
        assert_eq!(options["accounts"][0], second.to_string());
    }
}
