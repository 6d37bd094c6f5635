//! The method registry (spec §4.7): three disjoint maps partitioning every
//! known method name into implemented, wallet-required, and unimplemented,
//! plus the limited-user ACL. Grounded on the teacher's `p2p::Command`
//! dispatch shape generalized from a channel enum to a string-keyed table.
use std::collections::HashSet;

use crate::auth::Role;

/// Methods this node implements natively (spec §6's "implemented set").
pub const IMPLEMENTED: &[&str] = &[
    "addnode",
    "createrawtransaction",
    "decoderawtransaction",
    "decodescript",
    "estimatefee",
    "generate",
    "getaddednodeinfo",
    "getbestblock",
    "getbestblockhash",
    "getblock",
    "getblockchaininfo",
    "getblockcount",
    "getblockhash",
    "getblockheader",
    "getblocktemplate",
    "getcfilter",
    "getcfilterheader",
    "getconnectioncount",
    "getcurrentnet",
    "getdifficulty",
    "getgenerate",
    "gethashespersec",
    "getheaders",
    "getinfo",
    "getmempoolinfo",
    "getmininginfo",
    "getnettotals",
    "getnetworkhashps",
    "getpeerinfo",
    "getrawmempool",
    "getrawtransaction",
    "gettxout",
    "getwork",
    "help",
    "node",
    "ping",
    "searchrawtransactions",
    "sendrawtransaction",
    "setgenerate",
    "stop",
    "submitblock",
    "uptime",
    "validateaddress",
    "verifychain",
    "verifymessage",
    "version",
];

/// Methods this node steers to an external wallet process rather than
/// implementing (this node holds no private keys).
pub const WALLET_REQUIRED: &[&str] = &[
    "sendtoaddress",
    "sendmany",
    "getnewaddress",
    "getbalance",
    "listunspent",
    "listaccounts",
    "listtransactions",
    "walletpassphrase",
    "walletlock",
    "importprivkey",
    "dumpprivkey",
    "signrawtransaction",
];

/// Methods a `limited` (non-admin) credential may invoke: read-only queries
/// plus `help`/`version` (spec §4.7).
pub const LIMITED_ACL: &[&str] = &[
    "decoderawtransaction",
    "decodescript",
    "estimatefee",
    "getaddednodeinfo",
    "getbestblock",
    "getbestblockhash",
    "getblock",
    "getblockchaininfo",
    "getblockcount",
    "getblockhash",
    "getblockheader",
    "getconnectioncount",
    "getcurrentnet",
    "getdifficulty",
    "getheaders",
    "getinfo",
    "getmempoolinfo",
    "getmininginfo",
    "getnettotals",
    "getnetworkhashps",
    "getpeerinfo",
    "getrawmempool",
    "getrawtransaction",
    "gettxout",
    "help",
    "ping",
    "searchrawtransactions",
    "uptime",
    "validateaddress",
    "version",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodClass {
    Implemented,
    WalletRequired,
    Unimplemented,
}

pub struct Registry {
    implemented: HashSet<&'static str>,
    wallet_required: HashSet<&'static str>,
    limited_acl: HashSet<&'static str>,
}

impl Default for Registry {
    fn default() -> Self {
        Registry {
            implemented: IMPLEMENTED.iter().copied().collect(),
            wallet_required: WALLET_REQUIRED.iter().copied().collect(),
            limited_acl: LIMITED_ACL.iter().copied().collect(),
        }
    }
}

impl Registry {
    pub fn classify(&self, method: &str) -> MethodClass {
        if self.implemented.contains(method) {
            MethodClass::Implemented
        } else if self.wallet_required.contains(method) {
            MethodClass::WalletRequired
        } else {
            MethodClass::Unimplemented
        }
    }

    /// `None` role (unauthenticated) is never reachable here; callers must
    /// authenticate before classifying ACL access.
    pub fn allowed_for(&self, method: &str, role: Role) -> bool {
        match role {
            Role::Admin => true,
            Role::Limited => self.limited_acl.contains(method),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_is_implemented_but_not_limited() {
        let registry = Registry::default();
        assert_eq!(registry.classify("stop"), MethodClass::Implemented);
        assert!(!registry.allowed_for("stop", Role::Limited));
        assert!(registry.allowed_for("stop", Role::Admin));
    }

    #[test]
    fn help_is_available_to_limited_users() {
        let registry = Registry::default();
        assert!(registry.allowed_for("help", Role::Limited));
    }

    #[test]
    fn wallet_methods_are_routed_separately_from_implemented() {
        let registry = Registry::default();
        assert_eq!(registry.classify("sendtoaddress"), MethodClass::WalletRequired);
        assert_eq!(registry.classify("totally-unknown-method"), MethodClass::Unimplemented);
    }
}
