use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use paylink_core::models::storage_key;
use paylink_core::{PaymentDescriptor, PaymentStatus};
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;

/// One generated link as the merchant sees it in their history. Outlives the
/// cached descriptor, which is dropped once the payment confirms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkRecord {
    pub id: String,
    pub amount: String,
    pub token_symbol: String,
    pub merchant: String,
    pub link: String,
    pub status: PaymentStatus,
    pub tx_hash: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LinkRecord {
    fn new(descriptor: &PaymentDescriptor) -> Self {
        let now = Utc::now();
        Self {
            id: descriptor.id.clone(),
            amount: descriptor.amount.clone(),
            token_symbol: descriptor.token_symbol.clone(),
            merchant: descriptor.merchant_address.to_string(),
            link: descriptor.link.clone(),
            status: PaymentStatus::Idle,
            tx_hash: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

pub trait DescriptorRepository: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<PaymentDescriptor>>;
    fn put(&self, descriptor: &PaymentDescriptor) -> Result<()>;
    fn remove(&self, id: &str) -> Result<()>;

    /// Record a status change in the history, creating the entry if the link
    /// was generated elsewhere.
    fn mark_status(
        &self,
        descriptor: &PaymentDescriptor,
        status: PaymentStatus,
        tx_hash: Option<String>,
        error: Option<String>,
    ) -> Result<()>;

    /// Newest first.
    fn history(&self) -> Result<Vec<LinkRecord>>;
}

#[derive(Clone)]
pub struct SledRepository {
    db: Db,
}

impl SledRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .with_context(|| format!("Failed to open payment store at {}", path.display()))?;
        Ok(Self { db })
    }

    /// In-memory database removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .context("Failed to open temporary payment store")?;
        Ok(Self { db })
    }

    fn descriptors_tree(&self) -> Result<sled::Tree> {
        Ok(self.db.open_tree("descriptors")?)
    }

    fn history_tree(&self) -> Result<sled::Tree> {
        Ok(self.db.open_tree("history")?)
    }
}

impl DescriptorRepository for SledRepository {
    fn get(&self, id: &str) -> Result<Option<PaymentDescriptor>> {
        let tree = self.descriptors_tree()?;
        let Some(bytes) = tree.get(storage_key(id).as_bytes())? else {
            return Ok(None);
        };
        let descriptor = serde_json::from_slice(&bytes)
            .with_context(|| format!("Stored descriptor {id} is not readable"))?;
        Ok(Some(descriptor))
    }

    fn put(&self, descriptor: &PaymentDescriptor) -> Result<()> {
        let tree = self.descriptors_tree()?;
        tree.insert(
            descriptor.storage_key().as_bytes(),
            serde_json::to_vec(descriptor)?,
        )?;

        let history = self.history_tree()?;
        if !history.contains_key(descriptor.id.as_bytes())? {
            let rec = LinkRecord::new(descriptor);
            history.insert(descriptor.id.as_bytes(), serde_json::to_vec(&rec)?)?;
        }
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        self.descriptors_tree()?.remove(storage_key(id).as_bytes())?;
        Ok(())
    }

    fn mark_status(
        &self,
        descriptor: &PaymentDescriptor,
        status: PaymentStatus,
        tx_hash: Option<String>,
        error: Option<String>,
    ) -> Result<()> {
        let history = self.history_tree()?;
        let key = descriptor.id.as_bytes();
        let mut rec = match history.get(key)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => LinkRecord::new(descriptor),
        };
        rec.status = status;
        rec.updated_at = Utc::now();
        if tx_hash.is_some() {
            rec.tx_hash = tx_hash;
        }
        rec.last_error = error;
        history.insert(key, serde_json::to_vec(&rec)?)?;
        Ok(())
    }

    fn history(&self) -> Result<Vec<LinkRecord>> {
        let history = self.history_tree()?;
        let mut out = Vec::new();
        for item in history.iter() {
            let (_k, v) = item?;
            let rec: LinkRecord = serde_json::from_slice(&v)?;
            out.push(rec);
        }
        out.sort_by_key(|r| r.created_at);
        out.reverse();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paylink_core::Address;

    fn descriptor(id: &str) -> PaymentDescriptor {
        PaymentDescriptor {
            id: id.to_string(),
            amount: "1.5".into(),
            token: Address::ZERO,
            token_symbol: "ETH".into(),
            merchant_address: "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".parse().unwrap(),
            link: format!("http://localhost:3000/pay/{id}"),
        }
    }

    #[test]
    fn stored_json_round_trips_exactly() {
        let repo = SledRepository::temporary().unwrap();
        let d = descriptor("a1");
        repo.put(&d).unwrap();
        assert_eq!(repo.get("a1").unwrap(), Some(d));
        assert_eq!(repo.get("missing").unwrap(), None);
    }

    #[test]
    fn descriptor_is_keyed_like_local_storage() {
        let repo = SledRepository::temporary().unwrap();
        repo.put(&descriptor("k")).unwrap();
        let tree = repo.descriptors_tree().unwrap();
        let raw = tree.get("payment_k").unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["tokenSymbol"], "ETH");
        assert_eq!(json["merchantAddress"], "0x70997970c51812dc3a010c7d01b50e0d17dc79c8");
    }

    #[test]
    fn unreadable_entry_is_an_error_not_a_panic() {
        let repo = SledRepository::temporary().unwrap();
        repo.descriptors_tree()
            .unwrap()
            .insert("payment_bad", b"{not json".to_vec())
            .unwrap();
        assert!(repo.get("bad").is_err());
        assert!(repo.get("other").unwrap().is_none());
    }

    #[test]
    fn history_survives_removal_and_tracks_status() {
        let repo = SledRepository::temporary().unwrap();
        let d = descriptor("h1");
        repo.put(&d).unwrap();
        repo.mark_status(&d, PaymentStatus::Pending, Some("0xabc".into()), None)
            .unwrap();
        repo.mark_status(&d, PaymentStatus::Success, None, None).unwrap();
        repo.remove("h1").unwrap();

        assert_eq!(repo.get("h1").unwrap(), None);
        let rec = repo.history().unwrap().remove(0);
        assert_eq!(rec.status, PaymentStatus::Success);
        assert_eq!(rec.tx_hash.as_deref(), Some("0xabc"));
    }

    #[test]
    fn history_is_newest_first() {
        let repo = SledRepository::temporary().unwrap();
        repo.put(&descriptor("first")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        repo.put(&descriptor("second")).unwrap();
        let ids: Vec<String> = repo.history().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["second", "first"]);
    }
}
