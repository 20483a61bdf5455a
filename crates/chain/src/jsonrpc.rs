use super::{ReceiptStatus, TxHash, TxRequest, WalletProvider};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use paylink_core::Address;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Wallet backed by an Ethereum JSON-RPC endpoint whose node holds unlocked
/// accounts (a local development node, or a signing proxy).
pub struct JsonRpcWallet {
    pub rpc_url: String,
    auth: RpcAuth,
    http_client: reqwest::Client,
    account: RwLock<Option<Address>>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub enum RpcAuth {
    None,
    ApiKey { key: String },
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    status: Option<String>,
    block_number: Option<String>,
}

fn parse_quantity(text: &str) -> Result<u128> {
    let body = text
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("quantity {text:?} is not 0x-prefixed"))?;
    if body.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(body, 16).with_context(|| format!("bad quantity {text:?}"))
}

fn tx_params(tx: &TxRequest) -> Value {
    let mut obj = json!({
        "from": tx.from.to_string(),
        "to": tx.to.to_string(),
        "value": format!("{:#x}", tx.value),
    });
    if !tx.data.is_empty() {
        obj["data"] = Value::String(format!("0x{}", hex::encode(&tx.data)));
    }
    obj
}

impl JsonRpcWallet {
    pub fn new(rpc_url: String, auth: RpcAuth, account: Option<Address>) -> Arc<Self> {
        Arc::new(Self {
            rpc_url,
            auth,
            http_client: reqwest::Client::new(),
            account: RwLock::new(account),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let mut builder = self.http_client.post(&self.rpc_url).json(&request);
        if let RpcAuth::ApiKey { key } = &self.auth {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let resp = builder
            .send()
            .await
            .with_context(|| format!("Failed to call {method} on {}", self.rpc_url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("JSON-RPC {} failed: {} - {}", method, status, body);
        }

        let body: RpcResponse = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse {method} response"))?;

        if let Some(err) = body.error {
            bail!("{} (code {})", err.message, err.code);
        }
        serde_json::from_value(body.result)
            .with_context(|| format!("Unexpected {method} result shape"))
    }

    async fn sender(&self) -> Result<Address> {
        self.account
            .read()
            .await
            .ok_or_else(|| anyhow!("wallet is not connected"))
    }
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
    async fn connect(&self) -> Result<Address> {
        if let Some(account) = *self.account.read().await {
            return Ok(account);
        }

        let accounts: Vec<Address> = match self.call("eth_requestAccounts", json!([])).await {
            Ok(accounts) => accounts,
            Err(err) => {
                tracing::debug!(error = %err, "eth_requestAccounts unavailable, using eth_accounts");
                self.call("eth_accounts", json!([])).await?
            }
        };
        let account = accounts
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("node exposes no accounts"))?;

        *self.account.write().await = Some(account);
        tracing::info!(account = %account, rpc_url = %self.rpc_url, "Wallet connected");
        Ok(account)
    }

    async fn chain_id(&self) -> Result<u64> {
        let hex: String = self.call("eth_chainId", json!([])).await?;
        let id = parse_quantity(&hex)?;
        u64::try_from(id).context("chain id out of range")
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<()> {
        let _: Value = self
            .call(
                "wallet_switchEthereumChain",
                json!([{ "chainId": format!("{:#x}", chain_id) }]),
            )
            .await?;
        Ok(())
    }

    async fn send_transaction(&self, tx: &TxRequest) -> Result<TxHash> {
        let from = self.sender().await?;
        if from != tx.from {
            bail!("transaction sender {} is not the connected account {}", tx.from, from);
        }
        let hash: TxHash = self
            .call("eth_sendTransaction", json!([tx_params(tx)]))
            .await?;
        tracing::info!(tx_hash = %hash, to = %tx.to, "Transaction broadcast");
        Ok(hash)
    }

    async fn receipt(&self, tx_hash: &TxHash) -> Result<ReceiptStatus> {
        let raw: Option<RawReceipt> = self
            .call("eth_getTransactionReceipt", json!([tx_hash.to_string()]))
            .await?;

        let Some(raw) = raw else {
            return Ok(ReceiptStatus::Pending);
        };
        let Some(block) = raw.block_number.as_deref() else {
            return Ok(ReceiptStatus::Pending);
        };

        match raw.status.as_deref() {
            Some("0x1") => Ok(ReceiptStatus::Confirmed {
                block_number: u64::try_from(parse_quantity(block)?)
                    .context("block number out of range")?,
            }),
            _ => Ok(ReceiptStatus::Reverted { reason: None }),
        }
    }
}
