//! The HTTP/WebSocket front door (C7 dispatcher, spec §4.7). Grounded on the
//! teacher's single-thread-per-connection server shape (each peer in
//! `p2p::connmgr` gets its own accept/read/write threads); here each HTTP
//! request and each websocket connection gets its own thread off a shared
//! `tiny_http::Server`, with `max_clients`/`max_notifier_clients` as the only
//! backpressure (spec §7 "resource exhausted ... drop the newcomer with a
//! specific response").
use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel as chan;
use glyphchain_common::block::Height;
use glyphchain_common::chain::Chain;
use glyphchain_common::generator::{CPUMiner, Generator};
use glyphchain_common::mempool::TxMemPool;
use glyphchain_common::peer::Store;
use glyphchain_common::syncmgr::SyncMgr;
use glyphchain_wire::{OutPoint, Txid};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tiny_http::{Header, Method, Response, Server, StatusCode};

use crate::auth::{AuthConfig, Role};
use crate::error::{RpcError, RpcErrorBody};
use crate::methods::{parse_block_hash, parse_txid, Context};
use crate::notifier::{ClientId, ClientMessage, ClientQuit, ControlMessage, TxFilter};
use crate::registry::{MethodClass, Registry};
use crate::rescan::{self, AbortReason, ProgressSink, RescanKeys, RescanOutcome};
use crate::Config;

#[derive(Deserialize)]
struct RpcRequest {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcErrorBody>,
}

pub struct Dispatcher<C, M, S, G, Mi, St> {
    config: Config,
    auth: AuthConfig,
    registry: Registry,
    context: Arc<Context<C, M, S, G, Mi, St>>,
    notifier: chan::Sender<ControlMessage>,
    http_clients: Arc<AtomicUsize>,
    ws_clients: Arc<AtomicUsize>,
    next_client_id: Arc<AtomicUsize>,
}

impl<C, M, S, G, Mi, St> Dispatcher<C, M, S, G, Mi, St>
where
    C: Chain + 'static,
    M: TxMemPool + 'static,
    S: SyncMgr + 'static,
    G: Generator + 'static,
    Mi: CPUMiner + 'static,
    St: Store + 'static,
{
    pub fn new(config: Config, registry: Registry, context: Arc<Context<C, M, S, G, Mi, St>>, notifier: chan::Sender<ControlMessage>) -> Self {
        let auth = config.auth.build();
        Dispatcher {
            config,
            auth,
            registry,
            context,
            notifier,
            http_clients: Arc::new(AtomicUsize::new(0)),
            ws_clients: Arc::new(AtomicUsize::new(0)),
            next_client_id: Arc::new(AtomicUsize::new(1)),
        }
    }

    /// Binds and serves forever, spawning a thread per accepted connection
    /// (spec §4.7: "One HTTP endpoint `/` ... one WebSocket endpoint `/ws`").
    pub fn serve(self: Arc<Self>) -> std::io::Result<()> {
        let server = Server::http(self.config.listen).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        for request in server.incoming_requests() {
            let this = self.clone();
            std::thread::spawn(move || this.handle(request));
        }
        Ok(())
    }

    fn handle(&self, mut request: tiny_http::Request) {
        if request.url() == "/ws" {
            self.handle_websocket_upgrade(request);
            return;
        }

        if self.http_clients.fetch_add(1, Ordering::SeqCst) >= self.config.max_clients {
            self.http_clients.fetch_sub(1, Ordering::SeqCst);
            let _ = request.respond(Response::empty(StatusCode(503)));
            return;
        }
        let _guard = scopeguard(&self.http_clients);

        let role = match self.authenticate(&request) {
            Some(role) => role,
            None => {
                let header = Header::from_bytes(&b"WWW-Authenticate"[..], &b"Basic realm=\"rpc\""[..]).unwrap();
                let _ = request.respond(Response::empty(StatusCode(401)).with_header(header));
                return;
            }
        };

        if *request.method() != Method::Post {
            let _ = request.respond(Response::empty(StatusCode(405)));
            return;
        }

        let mut body = String::new();
        if request.as_reader().read_to_string(&mut body).is_err() {
            let _ = request.respond(json_response(Value::Null, None, Some(&RpcError::Parse("failed to read body".into()))));
            return;
        }

        let parsed: Result<RpcRequest, _> = serde_json::from_str(&body);
        let Ok(req) = parsed else {
            let _ = request.respond(json_response(Value::Null, None, Some(&RpcError::Parse("invalid JSON-RPC request".into()))));
            return;
        };

        // JSON-RPC 2.0 notifications (no `id`) get no response.
        let is_notification = req.jsonrpc.as_deref() == Some("2.0") && matches!(req.id, Value::Null);

        let result = self.dispatch_one(&req.method, &req.params, role);
        if is_notification {
            let _ = request.respond(Response::empty(StatusCode(204)));
            return;
        }
        let response = match result {
            Ok(value) => json_response(req.id, Some(value), None),
            Err(err) => json_response(req.id, None, Some(&err)),
        };
        let _ = request.respond(response);
    }

    fn dispatch_one(&self, method: &str, params: &Value, role: Role) -> Result<Value, RpcError> {
        match self.registry.classify(method) {
            MethodClass::Unimplemented => return Err(RpcError::Unimplemented),
            MethodClass::WalletRequired => return Err(RpcError::WalletRequired),
            MethodClass::Implemented => {}
        }
        if !self.registry.allowed_for(method, role) {
            return Err(RpcError::Unauthorized);
        }
        let params: Vec<Value> = match params {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        };

        if method == "getblocktemplate" || method == "getwork" {
            return self.dispatch_with_long_poll(method, &params);
        }
        self.context.dispatch(method, &params)
    }

    /// `getblocktemplate`/`getwork` long-poll: if the request carries a
    /// `longpollid` matching the current template, block until it's
    /// invalidated or the configured timeout elapses before replying (spec
    /// §4.9 "Long-poll").
    fn dispatch_with_long_poll(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        let long_poll_id = params.first().and_then(|v| v.get("longpollid")).and_then(Value::as_str).map(str::to_string);
        if let Some(id) = long_poll_id {
            if let Some(rx) = self.context.workstate.register_long_poll(&id) {
                let _ = rx.recv_timeout(self.config.long_poll_timeout);
            }
        }
        self.context.dispatch(method, params)
    }

    fn authenticate(&self, request: &tiny_http::Request) -> Option<Role> {
        use base64::Engine;
        let header = request.headers().iter().find(|h| h.field.equiv("Authorization"))?;
        let value = header.value.as_str();
        let encoded = value.strip_prefix("Basic ")?;
        let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        self.auth.authenticate(&decoded)
    }

    fn handle_websocket_upgrade(&self, request: tiny_http::Request) {
        if self.ws_clients.fetch_add(1, Ordering::SeqCst) >= self.config.max_notifier_clients {
            self.ws_clients.fetch_sub(1, Ordering::SeqCst);
            let _ = request.respond(Response::empty(StatusCode(503)));
            return;
        }
        let role = self.authenticate(&request);
        let Some(role) = role else {
            self.ws_clients.fetch_sub(1, Ordering::SeqCst);
            let _ = request.respond(Response::empty(StatusCode(401)));
            return;
        };

        let response = Response::empty(StatusCode(101));
        let stream = request.upgrade("websocket", response);

        let notifier = self.notifier.clone();
        let ws_clients = self.ws_clients.clone();
        let queue_depth = self.config.notifier_queue_depth;
        let id = self.next_client_id.fetch_add(1, Ordering::SeqCst) as ClientId;
        let context = self.context.clone();
        std::thread::spawn(move || {
            run_websocket_client(id, role == Role::Admin, stream, notifier, queue_depth, context);
            ws_clients.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

/// Forwards to `tiny_http`'s boxed upgrade stream so it concretely
/// implements `Read`/`Write` (the trait object only guarantees those via its
/// own supertrait bounds, not as a bound other generic code can rely on).
struct Upgraded(Box<dyn tiny_http::ReadWrite + Send>);

impl Read for Upgraded {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for Upgraded {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

/// Services one upgraded connection for its lifetime. Reads and writes
/// interleave on a single thread rather than splitting into dedicated
/// reader/writer halves: `tiny_http`'s upgraded stream is a boxed trait
/// object with no portable way to clone or split it, so pending outbound
/// notifications are drained opportunistically each time an inbound frame
/// wakes the loop, mirroring the notifier's own single-loop collapse.
fn run_websocket_client<C, M, S, G, Mi, St>(
    id: ClientId,
    admin: bool,
    stream: Box<dyn tiny_http::ReadWrite + Send>,
    notifier: chan::Sender<ControlMessage>,
    queue_depth: usize,
    context: Arc<Context<C, M, S, G, Mi, St>>,
) where
    C: Chain + 'static,
    M: TxMemPool + 'static,
    S: SyncMgr + 'static,
    G: Generator + 'static,
    Mi: CPUMiner + 'static,
    St: Store + 'static,
{
    let Ok(mut socket) = tungstenite::accept(Upgraded(stream)) else { return };
    let (send, recv) = chan::bounded::<ClientMessage>(queue_depth);
    let (reply_tx, reply_rx) = chan::bounded(1);
    if notifier.send(ControlMessage::Register { id, admin, send: send.clone(), reply: reply_tx }).is_err() {
        return;
    }
    let _ = reply_rx.recv();

    loop {
        while let Ok(msg) = recv.try_recv() {
            if socket.write_message(tungstenite::Message::Text(msg.to_json().to_string())).is_err() {
                let _ = notifier.send(ControlMessage::Unregister(id));
                return;
            }
        }

        match socket.read_message() {
            Ok(tungstenite::Message::Text(text)) => {
                if let Ok(request) = serde_json::from_str::<Value>(&text) {
                    handle_websocket_request(id, &request, &notifier, &context, &send);
                }
            }
            Ok(tungstenite::Message::Close(_)) => break,
            Ok(_) => {}
            Err(_) => break,
        }
    }
    let _ = notifier.send(ControlMessage::Unregister(id));
}

/// Translates the websocket control methods (spec §6 "WebSocket methods")
/// into [`ControlMessage`]s for the notifier, except `rescan`/`rescanblocks`
/// which run long enough that they get their own thread off this client's
/// own send queue rather than blocking the notifier's single loop.
fn handle_websocket_request<C, M, S, G, Mi, St>(
    id: ClientId,
    request: &Value,
    notifier: &chan::Sender<ControlMessage>,
    context: &Arc<Context<C, M, S, G, Mi, St>>,
    send: &chan::Sender<ClientMessage>,
) where
    C: Chain + 'static,
    M: TxMemPool + 'static,
    S: SyncMgr + 'static,
    G: Generator + 'static,
    Mi: CPUMiner + 'static,
    St: Store + 'static,
{
    let Some(method) = request.get("method").and_then(Value::as_str) else { return };
    let params = request.get("params").and_then(Value::as_array).cloned().unwrap_or_default();
    let msg = match method {
        "notifyblocks" => Some(ControlMessage::NotifyBlocks(id)),
        "stopnotifyblocks" => Some(ControlMessage::StopNotifyBlocks(id)),
        "notifynewtransactions" => {
            let verbose = params.first().and_then(Value::as_bool).unwrap_or(false);
            Some(ControlMessage::NotifyNewTransactions(id, verbose))
        }
        "stopnotifynewtransactions" => Some(ControlMessage::StopNotifyNewTransactions(id)),
        "notifyreceived" => Some(ControlMessage::NotifyReceived(id, string_array(&params))),
        "stopnotifyreceived" => Some(ControlMessage::StopNotifyReceived(id)),
        "notifyspent" => Some(ControlMessage::NotifySpent(id, outpoint_array(&params))),
        "stopnotifyspent" => Some(ControlMessage::StopNotifySpent(id)),
        "session" => Some(ControlMessage::Session(id)),
        "loadtxfilter" => Some(ControlMessage::LoadTxFilter(id, parse_tx_filter(&params))),
        "rescan" | "rescanblocks" => {
            spawn_rescan(&params, context.clone(), send.clone());
            None
        }
        _ => None,
    };
    if let Some(msg) = msg {
        let _ = notifier.send(msg);
    }
}

fn string_array(params: &[Value]) -> Vec<String> {
    string_array_at(params, 0)
}

fn outpoint_array(params: &[Value]) -> Vec<OutPoint> {
    outpoint_array_at(params, 0)
}

fn string_array_at(params: &[Value], idx: usize) -> Vec<String> {
    params.get(idx).and_then(Value::as_array).map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()).unwrap_or_default()
}

fn outpoint_array_at(params: &[Value], idx: usize) -> Vec<OutPoint> {
    params.get(idx).and_then(Value::as_array).map(|items| items.iter().filter_map(parse_outpoint).collect()).unwrap_or_default()
}

fn parse_outpoint(v: &Value) -> Option<OutPoint> {
    let txid = v.get("txid").and_then(Value::as_str).and_then(|s| parse_txid(s).ok())?;
    let vout = v.get("vout").and_then(Value::as_u64)? as u32;
    Some(OutPoint { txid, vout })
}

/// Builds the filter `loadtxfilter` installs from its `addresses` and
/// `outpoints` parameters (spec §3 "Mutated by `loadtxfilter`"). Address
/// strings fall into the filter's string-fallback set; this crate's other
/// address-list methods (`notifyreceived`) take the same shortcut rather
/// than decoding addresses into the fast-path script-hash sets.
fn parse_tx_filter(params: &[Value]) -> TxFilter {
    let mut filter = TxFilter::default();
    filter.addresses.extend(string_array_at(params, 1));
    for outpoint in outpoint_array_at(params, 2) {
        filter.unspent.insert(outpoint);
    }
    filter
}

/// Parses and runs a `rescan`/`rescanblocks` request off its own thread:
/// `[start_hash, end_hash_or_null, addresses, outpoints]` (spec §4.10). A
/// start hash the chain doesn't recognize is silently dropped, matching how
/// the rest of this dispatcher never replies to a malformed websocket
/// control frame.
fn spawn_rescan<C, M, S, G, Mi, St>(params: &[Value], context: Arc<Context<C, M, S, G, Mi, St>>, send: chan::Sender<ClientMessage>)
where
    C: Chain + 'static,
    M: TxMemPool + 'static,
    S: SyncMgr + 'static,
    G: Generator + 'static,
    Mi: CPUMiner + 'static,
    St: Store + 'static,
{
    let Some(start_hex) = params.first().and_then(Value::as_str) else { return };
    let Ok(start_hash) = parse_block_hash(start_hex) else { return };
    let Some(start_height) = context.chain.block_height_by_hash(&start_hash) else { return };
    let end_height = match params.get(1).and_then(Value::as_str) {
        Some(end_hex) => match parse_block_hash(end_hex).ok().and_then(|h| context.chain.block_height_by_hash(&h)) {
            Some(h) => Some(h),
            None => return,
        },
        None => None,
    };
    let addresses = string_array_at(params, 2);
    let outpoints = outpoint_array_at(params, 3);
    let keys = RescanKeys::new(TxFilter { addresses: addresses.into_iter().collect(), ..TxFilter::default() }, outpoints.into_iter().collect());

    std::thread::spawn(move || {
        let sink = WebsocketRescanSink { send };
        match rescan::run(&context.chain, start_height, end_height, keys, &sink) {
            RescanOutcome::Finished { .. } => {}
            RescanOutcome::Aborted(AbortReason::ClientQuit) => log::debug!("rescan stopped early: client disconnected"),
            RescanOutcome::Aborted(AbortReason::Reorg) => log::warn!("rescan aborted: reorg invalidated the scanned range"),
        }
    });
}

/// Forwards a running rescan's progress and matches onto the client's own
/// send queue, reporting [`ClientQuit`] back to `rescan::run` the moment
/// that queue is gone so a disconnected client's scan stops promptly
/// instead of running to completion for nobody (spec §4.8 backpressure
/// contract).
struct WebsocketRescanSink {
    send: chan::Sender<ClientMessage>,
}

impl ProgressSink for WebsocketRescanSink {
    fn progress(&self, scanned_through: Height, target: Height) -> Result<(), ClientQuit> {
        self.send.try_send(ClientMessage::RescanProgress { scanned_through, target }).map_err(|_| ClientQuit)
    }

    fn redeeming(&self, txid: Txid) -> Result<(), ClientQuit> {
        self.send.try_send(ClientMessage::RedeemingTx { txid }).map_err(|_| ClientQuit)
    }

    fn received(&self, txid: Txid) -> Result<(), ClientQuit> {
        self.send.try_send(ClientMessage::RecvTx { txid }).map_err(|_| ClientQuit)
    }

    fn finished(&self, last_height: Height) {
        let _ = self.send.try_send(ClientMessage::RescanFinished { last_height });
    }
}

fn json_response(id: Value, result: Option<Value>, error: Option<&RpcError>) -> Response<std::io::Cursor<Vec<u8>>> {
    let body = RpcResponse { jsonrpc: "2.0", id, result, error: error.map(RpcErrorBody::from) };
    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
    Response::from_data(bytes).with_header(header)
}

/// RAII guard decrementing the shared client counter on every return path out
/// of `handle`, including the early-return branches above it.
fn scopeguard(counter: &Arc<AtomicUsize>) -> impl Drop + '_ {
    struct Guard<'a>(&'a Arc<AtomicUsize>);
    impl Drop for Guard<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }
    Guard(counter)
}
