use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must be 40 hex characters, got {0}")]
    BadLength(usize),
    #[error("address is not valid hex")]
    BadHex,
}

/// 20-byte account or contract address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Sentinel used for the chain's native currency.
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// `0x1234...abcd` form used in the UI.
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let body = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or(AddressError::MissingPrefix)?;
        if body.len() != 40 {
            return Err(AddressError::BadLength(body.len()));
        }
        let mut out = [0u8; 20];
        hex::decode_to_slice(body, &mut out).map_err(|_| AddressError::BadHex)?;
        Ok(Address(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A single payment request as shared between merchant and payer.
///
/// Field names follow the `payment_<id>` storage format, so the JSON written by
/// the link builder is readable by any client that knows that format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDescriptor {
    pub id: String,
    /// Decimal text as entered by the merchant, not yet scaled.
    pub amount: String,
    pub token: Address,
    pub token_symbol: String,
    pub merchant_address: Address,
    pub link: String,
}

impl PaymentDescriptor {
    pub fn storage_key(&self) -> String {
        storage_key(&self.id)
    }
}

pub fn storage_key(id: &str) -> String {
    format!("payment_{id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Idle,
    Pending,
    Success,
    Error,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Idle => "idle",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Error => "error",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MERCHANT: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

    #[test]
    fn address_parses_mixed_case_and_prints_lowercase() {
        let addr: Address = MERCHANT.parse().unwrap();
        assert_eq!(addr.to_string(), MERCHANT.to_lowercase());
        assert_eq!(addr.short(), "0x7099...79c8");
    }

    #[test]
    fn address_rejects_malformed_input() {
        assert_eq!(
            "70997970c51812dc3a010c7d01b50e0d17dc79c8".parse::<Address>(),
            Err(AddressError::MissingPrefix)
        );
        assert_eq!("0x1234".parse::<Address>(), Err(AddressError::BadLength(4)));
        assert_eq!(
            "0xzz997970c51812dc3a010c7d01b50e0d17dc79c8".parse::<Address>(),
            Err(AddressError::BadHex)
        );
    }

    #[test]
    fn descriptor_json_uses_storage_field_names() {
        let d = PaymentDescriptor {
            id: "abc".into(),
            amount: "1.5".into(),
            token: Address::ZERO,
            token_symbol: "ETH".into(),
            merchant_address: MERCHANT.parse().unwrap(),
            link: "http://localhost:3000/pay/abc".into(),
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["tokenSymbol"], "ETH");
        assert_eq!(json["merchantAddress"], MERCHANT.to_lowercase());
        assert_eq!(json["token"], "0x0000000000000000000000000000000000000000");
        assert_eq!(d.storage_key(), "payment_abc");

        let back: PaymentDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, d);
    }
}
