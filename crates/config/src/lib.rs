use anyhow::{Context, Result};
use paylink_core::{Address, NetworkMode, UnknownTokenPolicy};
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "paylink";
const KEYCHAIN_SERVICE: &str = "paylink.credentials";

/// Keychain entry holding the JSON-RPC API key.
pub const RPC_API_KEY_SECRET: &str = "rpc_api_key";

pub const ENV_NETWORK_MODE: &str = "PAYLINK_NETWORK_MODE";
pub const ENV_RECEIVER_ADDRESS: &str = "PAYLINK_RECEIVER_ADDRESS";
pub const ENV_RPC_API_KEY: &str = "PAYLINK_RPC_API_KEY";

/// Address the receiver contract gets on a fresh local node.
pub const DEFAULT_RECEIVER_ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub mode: NetworkMode,
    #[serde(default = "default_receiver_address")]
    pub receiver_address: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mode: NetworkMode::default(),
            receiver_address: default_receiver_address(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_wallet_kind")]
    pub kind: String, // "mock" | "jsonrpc"
    pub rpc_url: Option<String>,
    /// Account to send from; the node's first account when unset.
    pub account: Option<String>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            kind: default_wallet_kind(),
            rpc_url: None,
            account: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Public base URL links are built on.
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
    pub audit_log: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            audit_log: Some("paylink_audit.jsonl".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentsConfig {
    #[serde(default)]
    pub unknown_token: UnknownTokenPolicy,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    /// Idle payment sessions older than this are dropped from memory.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            unknown_token: UnknownTokenPolicy::default(),
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

fn default_receiver_address() -> String {
    DEFAULT_RECEIVER_ADDRESS.to_string()
}

fn default_wallet_kind() -> String {
    "mock".to_string()
}

fn default_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_store_path() -> String {
    ".paylink_store".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_max_polls() -> u32 {
    90
}

fn default_session_ttl_secs() -> u64 {
    1_800
}

impl AppConfig {
    pub fn receiver(&self) -> Result<Address> {
        self.network
            .receiver_address
            .parse()
            .with_context(|| format!("Invalid receiver address {}", self.network.receiver_address))
    }

    /// Apply deployment overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup(ENV_NETWORK_MODE) {
            // parsing is infallible: anything but "production" is development
            self.network.mode = mode.parse().unwrap_or_default();
        }
        if let Some(addr) = lookup(ENV_RECEIVER_ADDRESS) {
            self.network.receiver_address = addr;
        }
    }
}

pub fn load() -> Result<AppConfig> {
    let cfg: AppConfig = confy::load(APP_NAME, None).context("Failed to load app config")?;
    Ok(cfg)
}

/// Stored config with environment overrides applied.
pub fn load_effective() -> Result<AppConfig> {
    let mut cfg = load()?;
    cfg.apply_overrides(|key| std::env::var(key).ok());
    tracing::debug!(mode=%cfg.network.mode, wallet=%cfg.wallet.kind, "Configuration loaded");
    Ok(cfg)
}

pub fn store(cfg: &AppConfig) -> Result<()> {
    confy::store(APP_NAME, None, cfg).context("Failed to store app config")?;
    Ok(())
}

/// Store a secret in the OS keychain
pub fn store_secret(key: &str, value: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, key)?;
    entry.set_password(value)?;
    Ok(())
}

/// Retrieve a secret from the OS keychain
pub fn get_secret(key: &str) -> Result<String> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, key)?;
    let password = entry.get_password()?;
    Ok(password)
}

/// Delete a secret from the OS keychain. A secret that was never stored is
/// already deleted.
pub fn delete_secret(key: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, key)?;
    match entry.delete_password() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// RPC API key from the environment, then the keychain.
pub fn rpc_api_key() -> Option<String> {
    std::env::var(ENV_RPC_API_KEY)
        .ok()
        .or_else(|| get_secret(RPC_API_KEY_SECRET).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_gets_defaults() {
        let cfg: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.network.mode, NetworkMode::Development);
        assert_eq!(cfg.wallet.kind, "mock");
        assert_eq!(cfg.server.origin, "http://localhost:3000");
        assert_eq!(cfg.payments.max_polls, 90);
        assert_eq!(cfg.payments.session_ttl_secs, 1_800);
        assert_eq!(cfg.payments.unknown_token, UnknownTokenPolicy::AssumeDefaultDecimals);
        assert_eq!(
            cfg.receiver().unwrap().to_string(),
            "0x5fbdb2315678afecb367f032d93f642f64180aa3"
        );
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{"network":{"mode":"production"},"payments":{"unknown_token":"reject"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.network.mode, NetworkMode::Production);
        assert_eq!(cfg.network.receiver_address, DEFAULT_RECEIVER_ADDRESS);
        assert_eq!(cfg.payments.unknown_token, UnknownTokenPolicy::Reject);
        assert_eq!(cfg.payments.poll_interval_ms, 2_000);
    }

    #[test]
    fn overrides_win_over_stored_values() {
        let env: HashMap<&str, &str> = [
            (ENV_NETWORK_MODE, "Production"),
            (ENV_RECEIVER_ADDRESS, "0x1111111111111111111111111111111111111111"),
        ]
        .into();
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.network.mode, NetworkMode::Production);
        assert_eq!(cfg.receiver().unwrap(), Address([0x11; 20]));

        let mut cfg = AppConfig::default();
        cfg.network.mode = NetworkMode::Production;
        cfg.apply_overrides(|k| (k == ENV_NETWORK_MODE).then(|| "localhost".to_string()));
        assert_eq!(cfg.network.mode, NetworkMode::Development);
    }

    #[test]
    fn bad_receiver_is_reported() {
        let mut cfg = AppConfig::default();
        cfg.network.receiver_address = "nope".into();
        assert!(cfg.receiver().is_err());
    }
}
