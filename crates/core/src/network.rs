use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainInfo {
    pub id: u64,
    pub name: &'static str,
    pub native_symbol: &'static str,
    pub rpc_url: &'static str,
    pub explorer_url: Option<&'static str>,
}

pub const LOCALHOST: ChainInfo = ChainInfo {
    id: 1337,
    name: "Localhost",
    native_symbol: "ETH",
    rpc_url: "http://127.0.0.1:8545",
    explorer_url: None,
};

pub const MONAD_TESTNET: ChainInfo = ChainInfo {
    id: 10143,
    name: "Monad Testnet",
    native_symbol: "MON",
    rpc_url: "https://testnet-rpc.monad.xyz",
    explorer_url: Some("https://testnet.monadexplorer.com"),
};

pub fn chain_by_id(id: u64) -> Option<&'static ChainInfo> {
    [&LOCALHOST, &MONAD_TESTNET].into_iter().find(|c| c.id == id)
}

/// Deployment mode, selecting which chain the payment page expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    Production,
    #[default]
    Development,
}

impl NetworkMode {
    /// Chain the switch action asks the wallet to move to.
    pub fn target_chain(&self) -> &'static ChainInfo {
        match self {
            NetworkMode::Production => &MONAD_TESTNET,
            NetworkMode::Development => &LOCALHOST,
        }
    }

    /// Development also accepts the public testnet so it can be used without
    /// reconfiguring the deployment.
    pub fn accepted_chain_ids(&self) -> &'static [u64] {
        match self {
            NetworkMode::Production => &[MONAD_TESTNET.id],
            NetworkMode::Development => &[LOCALHOST.id, MONAD_TESTNET.id],
        }
    }

    pub fn accepts(&self, chain_id: u64) -> bool {
        self.accepted_chain_ids().contains(&chain_id)
    }
}

impl FromStr for NetworkMode {
    type Err = std::convert::Infallible;

    /// Anything other than `production` selects development.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("production") {
            Ok(NetworkMode::Production)
        } else {
            Ok(NetworkMode::Development)
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkMode::Production => f.write_str("production"),
            NetworkMode::Development => f.write_str("development"),
        }
    }
}
