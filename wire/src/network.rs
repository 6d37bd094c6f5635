use std::fmt;
use std::str::FromStr;

/// The network we're connected to. Magic bytes and default listen ports are
/// wire-level facts; higher-level facts (seeds, checkpoints, genesis block)
/// live in the `common` crate, which wraps this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
    Signet,
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

impl Network {
    pub fn magic(&self) -> u32 {
        match self {
            Network::Mainnet => 0xD9B4_BEF9,
            Network::Testnet => 0x0709_110B,
            Network::Regtest => 0xDAB5_BFFA,
            Network::Signet => 0x40CF_030A,
        }
    }

    pub fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            0xD9B4_BEF9 => Some(Network::Mainnet),
            0x0709_110B => Some(Network::Testnet),
            0xDAB5_BFFA => Some(Network::Regtest),
            0x40CF_030A => Some(Network::Signet),
            _ => None,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Network::Mainnet => 8333,
            Network::Testnet => 18333,
            Network::Regtest => 18444,
            Network::Signet => 38333,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
            Network::Signet => "signet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            "signet" => Ok(Network::Signet),
            _ => Err(format!("invalid network: {:?}", s)),
        }
    }
}
