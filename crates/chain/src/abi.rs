//! Solidity ABI encoding for the handful of calls and the one event the payment
//! flow touches.
//!
//! Every static argument occupies one 32-byte word: addresses are left-padded
//! with 12 zero bytes, integers are big-endian and left-padded. Amounts are
//! carried as `u128`, so decoding rejects words whose upper 16 bytes are set.

use paylink_core::Address;
use sha3::{Digest, Keccak256};

pub const APPROVE_SIGNATURE: &str = "approve(address,uint256)";
pub const PAY_SIGNATURE: &str = "pay(address,address,uint256)";
pub const PAYMENT_RECEIVED_SIGNATURE: &str = "PaymentReceived(address,address,address,uint256)";

pub type Word = [u8; 32];

pub fn keccak256(data: &[u8]) -> Word {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn encode_address(address: &Address) -> Word {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

pub fn encode_uint(value: u128) -> Word {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn decode_address(word: &[u8]) -> Option<Address> {
    if word.len() != 32 || word[..12].iter().any(|b| *b != 0) {
        return None;
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&word[12..]);
    Some(Address(out))
}

pub fn decode_uint(word: &[u8]) -> Option<u128> {
    if word.len() != 32 || word[..16].iter().any(|b| *b != 0) {
        return None;
    }
    let mut out = [0u8; 16];
    out.copy_from_slice(&word[16..]);
    Some(u128::from_be_bytes(out))
}

fn encode_call(signature: &str, words: &[Word]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32 * words.len());
    data.extend_from_slice(&selector(signature));
    for word in words {
        data.extend_from_slice(word);
    }
    data
}

/// `approve(spender, amount)` on an ERC-20 token.
pub fn encode_approve(spender: &Address, amount: u128) -> Vec<u8> {
    encode_call(
        APPROVE_SIGNATURE,
        &[encode_address(spender), encode_uint(amount)],
    )
}

/// `pay(merchant, token, amount)` on the receiver contract.
pub fn encode_pay(merchant: &Address, token: &Address, amount: u128) -> Vec<u8> {
    encode_call(
        PAY_SIGNATURE,
        &[
            encode_address(merchant),
            encode_address(token),
            encode_uint(amount),
        ],
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Approve {
        spender: Address,
        amount: u128,
    },
    Pay {
        merchant: Address,
        token: Address,
        amount: u128,
    },
}

pub fn decode_call(data: &[u8]) -> Option<Call> {
    if data.len() < 4 {
        return None;
    }
    let (sel, args) = data.split_at(4);
    let words: Vec<&[u8]> = args.chunks(32).collect();
    if args.len() % 32 != 0 {
        return None;
    }

    if sel == selector(APPROVE_SIGNATURE) && words.len() == 2 {
        return Some(Call::Approve {
            spender: decode_address(words[0])?,
            amount: decode_uint(words[1])?,
        });
    }
    if sel == selector(PAY_SIGNATURE) && words.len() == 3 {
        return Some(Call::Pay {
            merchant: decode_address(words[0])?,
            token: decode_address(words[1])?,
            amount: decode_uint(words[2])?,
        });
    }
    None
}

/// `PaymentReceived(address indexed merchant, address indexed payer, address token, uint256 amount)`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PaymentReceived {
    pub merchant: Address,
    pub payer: Address,
    pub token: Address,
    pub amount: u128,
}

impl PaymentReceived {
    pub fn topic0() -> Word {
        keccak256(PAYMENT_RECEIVED_SIGNATURE.as_bytes())
    }

    pub fn topics(&self) -> Vec<Word> {
        vec![
            Self::topic0(),
            encode_address(&self.merchant),
            encode_address(&self.payer),
        ]
    }

    pub fn data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(64);
        data.extend_from_slice(&encode_address(&self.token));
        data.extend_from_slice(&encode_uint(self.amount));
        data
    }

    pub fn decode_log(topics: &[Word], data: &[u8]) -> Option<Self> {
        if topics.len() != 3 || topics[0] != Self::topic0() || data.len() != 64 {
            return None;
        }
        Some(Self {
            merchant: decode_address(&topics[1])?,
            payer: decode_address(&topics[2])?,
            token: decode_address(&data[..32])?,
            amount: decode_uint(&data[32..])?,
        })
    }
}
