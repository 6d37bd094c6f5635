//! JSON-RPC/WebSocket dispatcher (C7), notifier (C8), GBT/getwork work-state
//! (C9) and rescan engine (C10). Everything a client talks to sits here; the
//! `Chain`/`TxMemPool`/`SyncMgr`/`Generator` engines it calls into are
//! defined in `glyphchain-common` and supplied by the daemon crate.
pub mod auth;
pub mod dispatcher;
pub mod error;
pub mod methods;
pub mod notifier;
pub mod registry;
pub mod rescan;
mod sha256;
pub mod workstate;

pub use auth::{AuthConfig, Credentials, Role};
pub use dispatcher::Dispatcher;
pub use error::{RpcError, RpcErrorBody, RpcErrorCode};
pub use notifier::{ClientId, Notification, Notifier, TxFilter};
pub use registry::{MethodClass, Registry};
pub use workstate::{CoinbaseMode, RejectReason, WorkState};

use std::net::SocketAddr;

/// Everything needed to stand up the RPC surface, mirroring the
/// `p2p::Config`/`ConnectionManagerConfig` split: fixed tunables here,
/// runtime-mutable state (active mining addresses) lives on `node::RuntimeState`
/// per spec §9.
#[derive(Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub auth: AuthConfigSource,
    /// Maximum concurrent HTTP clients before new connections are refused
    /// (spec §4.7 "client limit").
    pub max_clients: usize,
    /// Maximum websocket clients the notifier will register (spec §4.8).
    pub max_notifier_clients: usize,
    /// Per-client bounded send-queue depth before a slow websocket client is
    /// disconnected (spec §4.8 "bounded send queue, default 50").
    pub notifier_queue_depth: usize,
    /// How long a `getblocktemplate`/`getwork` long-poll request blocks
    /// before returning the unchanged template (spec §4.9).
    pub long_poll_timeout: std::time::Duration,
    pub coinbase: CoinbaseMode,
}

/// Credential source kept distinct from [`AuthConfig`] so a config loaded
/// with no `limited` pair configured is expressible without an `Option`
/// nested two levels deep.
#[derive(Clone)]
pub struct AuthConfigSource {
    pub admin: Credentials,
    pub limited: Option<Credentials>,
}

impl AuthConfigSource {
    pub fn build(&self) -> AuthConfig {
        AuthConfig { admin: self.admin.clone(), limited: self.limited.clone() }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: "127.0.0.1:8332".parse().unwrap(),
            auth: AuthConfigSource {
                admin: Credentials { username: "admin".into(), password: String::new() },
                limited: None,
            },
            max_clients: 128,
            max_notifier_clients: 128,
            notifier_queue_depth: 50,
            long_poll_timeout: std::time::Duration::from_secs(60),
            coinbase: CoinbaseMode::Value(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_listens_on_loopback() {
        let config = Config::default();
        assert!(config.listen.ip().is_loopback());
        assert_eq!(config.notifier_queue_depth, 50);
    }
}
