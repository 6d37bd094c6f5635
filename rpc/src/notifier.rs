//! The WebSocket notifier (C8): fans chain and mempool notifications out to
//! subscribed clients with per-client backpressure (spec §4.8). Grounded on
//! the hub's single-writer shape (`p2p::hub::Hub`): one thread owns every
//! subscription map and mutates them only from its own event loop, receiving
//! both notifications and control requests (subscribe/unsubscribe/filter
//! load) over the same mailbox. Spec §4.8 describes a queue task and a
//! handler task; the mailbox's own (unbounded) buffering plays the queue
//! task's role, so one thread does both jobs, matching how the hub already
//! collapses accept/dial bookkeeping into its own loop.
use std::collections::{HashMap, HashSet};

use crossbeam_channel as chan;
use glyphchain_common::block::Height;
use glyphchain_wire::{Block, OutPoint, Script, Transaction, Txid};

pub type ClientId = u64;

#[derive(Debug, thiserror::Error)]
#[error("client quit")]
pub struct ClientQuit;

/// The "new-style" per-client transaction filter (spec §3 "Transaction
/// filter"). Fast-path sets by script shape, plus a string fallback and the
/// outpoints discovered as unspent so a later spend can be recognized.
#[derive(Debug, Default, Clone)]
pub struct TxFilter {
    pub pubkey_hash: HashSet<[u8; 20]>,
    pub script_hash: HashSet<[u8; 20]>,
    pub compressed_pubkey: HashSet<[u8; 33]>,
    pub uncompressed_pubkey: HashSet<[u8; 65]>,
    pub addresses: HashSet<String>,
    pub unspent: HashSet<OutPoint>,
}

impl TxFilter {
    /// `true` if `script` pays to something this filter watches. Matching
    /// outputs have their outpoint folded into `unspent` by the caller so a
    /// later spend is detected (spec §3 "Transaction filter").
    pub fn matches_script(&self, script: &Script) -> bool {
        if let Some(hash) = p2pkh_hash(script) {
            if self.pubkey_hash.contains(&hash) {
                return true;
            }
        }
        if let Some(hash) = p2sh_hash(script) {
            if self.script_hash.contains(&hash) {
                return true;
            }
        }
        false
    }

    pub fn consumes(&self, outpoint: &OutPoint) -> bool {
        self.unspent.contains(outpoint)
    }
}

fn p2pkh_hash(script: &Script) -> Option<[u8; 20]> {
    let bytes = script.as_bytes();
    if bytes.len() == 25 && bytes[0] == 0x76 && bytes[1] == 0xa9 && bytes[2] == 0x14 && bytes[23] == 0x88 && bytes[24] == 0xac {
        Some(bytes[3..23].try_into().unwrap())
    } else {
        None
    }
}

fn p2sh_hash(script: &Script) -> Option<[u8; 20]> {
    let bytes = script.as_bytes();
    if bytes.len() == 23 && bytes[0] == 0xa9 && bytes[1] == 0x14 && bytes[22] == 0x87 {
        Some(bytes[2..22].try_into().unwrap())
    } else {
        None
    }
}

/// Messages this node emits when the chain or mempool changes (spec §4.8
/// "Notification types").
pub enum Notification {
    BlockConnected(Block),
    BlockDisconnected(Block),
    TxAcceptedByMempool { is_new: bool, tx: Transaction },
}

pub enum ClientMessage {
    BlockConnected { header_hex: String, filtered_txs: Vec<String> },
    BlockDisconnected { header_hex: String },
    TxAccepted { txid: Txid, total_out: u64 },
    TxAcceptedVerbose { tx: Transaction },
    RecvTx { txid: Txid },
    RedeemingTx { txid: Txid },
    RelevantTxAccepted { tx: Transaction },
    Session { session_id: u64 },
    RescanProgress { scanned_through: Height, target: Height },
    RescanFinished { last_height: Height },
}

impl ClientMessage {
    /// Renders the outbound websocket text frame for this notification
    /// (spec §4.8's notification type names).
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            ClientMessage::BlockConnected { header_hex, filtered_txs } => {
                json!({"method": "filteredblockconnected", "params": [header_hex, filtered_txs]})
            }
            ClientMessage::BlockDisconnected { header_hex } => {
                json!({"method": "blockdisconnected", "params": [header_hex]})
            }
            ClientMessage::TxAccepted { txid, total_out } => {
                json!({"method": "txaccepted", "params": [txid.to_string(), total_out]})
            }
            ClientMessage::TxAcceptedVerbose { tx } => {
                json!({"method": "txacceptedverbose", "params": [hex_encode(&glyphchain_wire::encode::serialize(tx))]})
            }
            ClientMessage::RecvTx { txid } => json!({"method": "recvtx", "params": [txid.to_string()]}),
            ClientMessage::RedeemingTx { txid } => json!({"method": "redeemingtx", "params": [txid.to_string()]}),
            ClientMessage::RelevantTxAccepted { tx } => {
                json!({"method": "relevanttxaccepted", "params": [hex_encode(&glyphchain_wire::encode::serialize(tx))]})
            }
            ClientMessage::Session { session_id } => json!({"method": "session", "params": [session_id.to_string()]}),
            ClientMessage::RescanProgress { scanned_through, target } => {
                json!({"method": "rescanprogress", "params": [scanned_through, target]})
            }
            ClientMessage::RescanFinished { last_height } => json!({"method": "rescanfinished", "params": [last_height]}),
        }
    }
}

struct Client {
    authenticated: bool,
    admin: bool,
    session_id: u64,
    wants_blocks: bool,
    wants_mempool_tx: bool,
    verbose_mempool_tx: bool,
    address_watch: HashSet<String>,
    outpoint_watch: HashSet<OutPoint>,
    filter: Option<TxFilter>,
    send: chan::Sender<ClientMessage>,
}

pub enum ControlMessage {
    Register { id: ClientId, admin: bool, send: chan::Sender<ClientMessage>, reply: chan::Sender<()> },
    Unregister(ClientId),
    LoadTxFilter(ClientId, TxFilter),
    NotifyBlocks(ClientId),
    StopNotifyBlocks(ClientId),
    NotifyNewTransactions(ClientId, bool),
    StopNotifyNewTransactions(ClientId),
    NotifyReceived(ClientId, Vec<String>),
    StopNotifyReceived(ClientId),
    NotifySpent(ClientId, Vec<OutPoint>),
    StopNotifySpent(ClientId),
    /// Websocket `session`: echoes the random session id assigned at
    /// `Register` back to the client over its own send queue (spec §3
    /// "session id (random u64)").
    Session(ClientId),
    Notify(Notification),
    Shutdown,
}

pub struct Notifier {
    clients: HashMap<ClientId, Client>,
}

impl Default for Notifier {
    fn default() -> Self {
        Notifier { clients: HashMap::new() }
    }
}

impl Notifier {
    pub fn spawn(mut self) -> (chan::Sender<ControlMessage>, std::thread::JoinHandle<()>) {
        let (tx, rx) = chan::unbounded();
        let join = std::thread::spawn(move || self.run(rx));
        (tx, join)
    }

    fn run(&mut self, rx: chan::Receiver<ControlMessage>) {
        for msg in rx.iter() {
            match msg {
                ControlMessage::Register { id, admin, send, reply } => {
                    self.clients.insert(
                        id,
                        Client {
                            authenticated: true,
                            admin,
                            session_id: fastrand::u64(..),
                            wants_blocks: false,
                            wants_mempool_tx: false,
                            verbose_mempool_tx: false,
                            address_watch: HashSet::new(),
                            outpoint_watch: HashSet::new(),
                            filter: None,
                            send,
                        },
                    );
                    let _ = reply.send(());
                }
                ControlMessage::Unregister(id) => {
                    self.clients.remove(&id);
                }
                ControlMessage::LoadTxFilter(id, filter) => {
                    if let Some(client) = self.clients.get_mut(&id) {
                        client.filter = Some(filter);
                    }
                }
                ControlMessage::NotifyBlocks(id) => self.set_flag(id, |c| c.wants_blocks = true),
                ControlMessage::StopNotifyBlocks(id) => self.set_flag(id, |c| c.wants_blocks = false),
                ControlMessage::NotifyNewTransactions(id, verbose) => self.set_flag(id, |c| {
                    c.wants_mempool_tx = true;
                    c.verbose_mempool_tx = verbose;
                }),
                ControlMessage::StopNotifyNewTransactions(id) => self.set_flag(id, |c| c.wants_mempool_tx = false),
                ControlMessage::NotifyReceived(id, addrs) => self.set_flag(id, |c| c.address_watch.extend(addrs.clone())),
                ControlMessage::StopNotifyReceived(id) => self.set_flag(id, |c| c.address_watch.clear()),
                ControlMessage::NotifySpent(id, outpoints) => self.set_flag(id, |c| c.outpoint_watch.extend(outpoints.clone())),
                ControlMessage::StopNotifySpent(id) => self.set_flag(id, |c| c.outpoint_watch.clear()),
                ControlMessage::Session(id) => {
                    if let Some(client) = self.clients.get(&id) {
                        let _ = client.send.try_send(ClientMessage::Session { session_id: client.session_id });
                    }
                }
                ControlMessage::Notify(notification) => self.dispatch(notification),
                ControlMessage::Shutdown => return,
            }
        }
    }

    fn set_flag(&mut self, id: ClientId, f: impl FnOnce(&mut Client)) {
        if let Some(client) = self.clients.get_mut(&id) {
            f(client);
        }
    }

    fn dispatch(&mut self, notification: Notification) {
        match notification {
            Notification::BlockConnected(block) => self.dispatch_block(block, true),
            Notification::BlockDisconnected(block) => self.dispatch_block(block, false),
            Notification::TxAcceptedByMempool { is_new, tx } => self.dispatch_mempool_tx(is_new, tx),
        }
    }

    fn dispatch_block(&mut self, block: Block, connected: bool) {
        let header_hex = hex_encode(&glyphchain_wire::encode::serialize(&block.header));
        for (_, client) in self.clients.iter_mut() {
            for tx in &block.txdata {
                fan_out_watches(client, tx);
            }
            if !client.wants_blocks {
                continue;
            }
            if connected {
                let filtered_txs = match &client.filter {
                    Some(filter) => block
                        .txdata
                        .iter()
                        .filter(|tx| tx_matches(filter, tx))
                        .map(|tx| hex_encode(&glyphchain_wire::encode::serialize(tx)))
                        .collect(),
                    None => Vec::new(),
                };
                let _ = client.send.try_send(ClientMessage::BlockConnected { header_hex: header_hex.clone(), filtered_txs });
            } else {
                let _ = client.send.try_send(ClientMessage::BlockDisconnected { header_hex: header_hex.clone() });
            }
        }
    }

    fn dispatch_mempool_tx(&mut self, is_new: bool, tx: Transaction) {
        let txid = tx.txid();
        let total_out: u64 = tx.output.iter().map(|o| o.value).sum();
        for (_, client) in self.clients.iter_mut() {
            if is_new && client.wants_mempool_tx {
                if client.verbose_mempool_tx {
                    let _ = client.send.try_send(ClientMessage::TxAcceptedVerbose { tx: tx.clone() });
                } else {
                    let _ = client.send.try_send(ClientMessage::TxAccepted { txid, total_out });
                }
            }
            fan_out_watches(client, &tx);
            if let Some(filter) = &client.filter {
                if tx_matches(filter, &tx) {
                    let _ = client.send.try_send(ClientMessage::RelevantTxAccepted { tx: tx.clone() });
                }
            }
        }
    }
}

fn tx_matches(filter: &TxFilter, tx: &Transaction) -> bool {
    tx.input.iter().any(|input| filter.consumes(&input.previous_output))
        || tx.output.iter().any(|output| filter.matches_script(&output.script_pubkey))
}

/// Per-tx fan-out to address/outpoint watchers (spec §4.8 "invoke per-tx
/// fan-out"): spent inputs notify `redeemingtx`, matching outputs notify
/// `recvtx` and are folded into the filter's unspent set.
fn fan_out_watches(client: &mut Client, tx: &Transaction) {
    for input in &tx.input {
        if client.outpoint_watch.contains(&input.previous_output) {
            let _ = client.send.try_send(ClientMessage::RedeemingTx { txid: tx.txid() });
        }
    }
    if let Some(filter) = client.filter.as_mut() {
        for (vout, output) in tx.output.iter().enumerate() {
            if filter.matches_script(&output.script_pubkey) {
                filter.unspent.insert(OutPoint { txid: tx.txid(), vout: vout as u32 });
                let _ = client.send.try_send(ClientMessage::RecvTx { txid: tx.txid() });
            }
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glyphchain_wire::TxOut;

    #[test]
    fn p2pkh_script_is_recognized() {
        let mut bytes = vec![0x76, 0xa9, 0x14];
        bytes.extend_from_slice(&[7u8; 20]);
        bytes.push(0x88);
        bytes.push(0xac);
        let script = Script(bytes);
        assert_eq!(p2pkh_hash(&script), Some([7u8; 20]));
    }

    #[test]
    fn filter_matches_configured_pubkey_hash() {
        let mut filter = TxFilter::default();
        filter.pubkey_hash.insert([1u8; 20]);
        let mut bytes = vec![0x76, 0xa9, 0x14];
        bytes.extend_from_slice(&[1u8; 20]);
        bytes.push(0x88);
        bytes.push(0xac);
        let out = TxOut { value: 1000, script_pubkey: Script(bytes) };
        assert!(filter.matches_script(&out.script_pubkey));
    }
}
