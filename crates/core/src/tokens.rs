use crate::models::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenRecord {
    pub address: Address,
    pub symbol: &'static str,
    pub name: &'static str,
    pub decimals: u8,
}

impl TokenRecord {
    pub fn is_native(&self) -> bool {
        self.address.is_zero()
    }
}

/// Result of looking a token up in the fixed table. There is no silent default;
/// callers decide what an unknown token means for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLookup {
    Found(&'static TokenRecord),
    Unknown,
}

impl TokenLookup {
    pub fn found(self) -> Option<&'static TokenRecord> {
        match self {
            TokenLookup::Found(rec) => Some(rec),
            TokenLookup::Unknown => None,
        }
    }
}

/// Precision assumed for tokens missing from the table when the caller opts in.
pub const FALLBACK_DECIMALS: u8 = 18;

/// What the payment page does with a token it cannot find in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownTokenPolicy {
    /// Scale with [`FALLBACK_DECIMALS`] and log a warning.
    #[default]
    AssumeDefaultDecimals,
    Reject,
}

const fn hex_nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => panic!("invalid hex digit in token address"),
    }
}

const fn addr(s: &str) -> Address {
    let b = s.as_bytes();
    assert!(b.len() == 42 && b[0] == b'0' && b[1] == b'x');
    let mut out = [0u8; 20];
    let mut i = 0;
    while i < 20 {
        out[i] = (hex_nibble(b[2 + 2 * i]) << 4) | hex_nibble(b[3 + 2 * i]);
        i += 1;
    }
    Address(out)
}

pub const ETH: TokenRecord = TokenRecord {
    address: Address::ZERO,
    symbol: "ETH",
    name: "Ethereum",
    decimals: 18,
};

pub const MON: TokenRecord = TokenRecord {
    address: Address::ZERO,
    symbol: "MON",
    name: "Monad",
    decimals: 18,
};

// Monad testnet deployments
pub const USDC: TokenRecord = TokenRecord {
    address: addr("0xf817257fed379853cDe0fa4F97AB987181B1E5Ea"),
    symbol: "USDC",
    name: "USD Coin",
    decimals: 6,
};

pub const USDT: TokenRecord = TokenRecord {
    address: addr("0x88b8E2161DEDC77EF4ab7585569D2415a1C1055D"),
    symbol: "USDT",
    name: "Tether",
    decimals: 6,
};

pub const WETH: TokenRecord = TokenRecord {
    address: addr("0xB5a30b0FDc5EA94A52fDc42e3E9760Cb8449Fb37"),
    symbol: "WETH",
    name: "Wrapped Ethereum",
    decimals: 18,
};

pub static COMMON_TOKENS: [TokenRecord; 5] = [ETH, MON, USDC, USDT, WETH];

/// Exact symbol match, as used by the link builder's token selector.
pub fn lookup_symbol(symbol: &str) -> TokenLookup {
    COMMON_TOKENS
        .iter()
        .find(|t| t.symbol == symbol)
        .map_or(TokenLookup::Unknown, TokenLookup::Found)
}

/// Match on symbol, then on token address. Addresses compare as bytes, so the
/// textual case of the descriptor's token field is irrelevant.
pub fn lookup_for_payment(symbol: &str, token: &Address) -> TokenLookup {
    match lookup_symbol(symbol) {
        TokenLookup::Found(t) => TokenLookup::Found(t),
        TokenLookup::Unknown => COMMON_TOKENS
            .iter()
            .find(|t| t.address == *token)
            .map_or(TokenLookup::Unknown, TokenLookup::Found),
    }
}

pub fn is_native_symbol(symbol: &str) -> bool {
    matches!(lookup_symbol(symbol), TokenLookup::Found(t) if t.is_native())
}
