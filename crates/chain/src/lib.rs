use anyhow::Result;
use async_trait::async_trait;
use paylink_core::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

impl FromStr for TxHash {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let body = s
            .strip_prefix("0x")
            .ok_or_else(|| anyhow::anyhow!("transaction hash must start with 0x"))?;
        let mut out = [0u8; 32];
        hex::decode_to_slice(body, &mut out)?;
        Ok(TxHash(out))
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A transaction as handed to the wallet for signing and broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
}

impl TxRequest {
    pub fn native_transfer(from: Address, to: Address, value: u128) -> Self {
        Self {
            from,
            to,
            value,
            data: Vec::new(),
        }
    }

    pub fn call(from: Address, to: Address, data: Vec<u8>) -> Self {
        Self {
            from,
            to,
            value: 0,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Pending,
    Confirmed { block_number: u64 },
    Reverted { reason: Option<String> },
}

/// The wallet the payer connects: account access, chain selection, signing and
/// broadcast, and receipt lookup.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn connect(&self) -> Result<Address>;
    async fn chain_id(&self) -> Result<u64>;
    async fn switch_chain(&self, chain_id: u64) -> Result<()>;
    async fn send_transaction(&self, tx: &TxRequest) -> Result<TxHash>;
    async fn receipt(&self, tx_hash: &TxHash) -> Result<ReceiptStatus>;
}

pub mod abi;
pub mod jsonrpc;
pub mod mock;
pub mod receiver;
