use crate::models::{Address, PaymentDescriptor};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

pub const PARAM_MERCHANT: &str = "merchant";
pub const PARAM_AMOUNT: &str = "amount";
pub const PARAM_TOKEN: &str = "token";
pub const PARAM_TOKEN_SYMBOL: &str = "tokenSymbol";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount {0:?} is not a non-negative decimal number")]
    NotDecimal(String),
    #[error("amount {amount:?} has more than {decimals} fractional digits")]
    TooPrecise { amount: String, decimals: u8 },
    #[error("amount {0:?} is too large")]
    Overflow(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkFormatError {
    #[error("origin {0} cannot carry a path")]
    BadOrigin(String),
}

pub fn compute_sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    let bytes = hasher.finalize();
    hex::encode(bytes)
}

/// Fingerprint of a descriptor's canonical JSON, recorded in the audit log.
pub fn descriptor_fingerprint(descriptor: &PaymentDescriptor) -> String {
    let json = serde_json::to_string(descriptor).unwrap_or_default();
    compute_sha256_hex(&json)
}

fn split_decimal(text: &str) -> Result<(&str, &str), AmountError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AmountError::Empty);
    }
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, f),
        None => (text, ""),
    };
    let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty())
        || !digits_only(int_part)
        || !digits_only(frac_part)
    {
        return Err(AmountError::NotDecimal(text.to_string()));
    }
    Ok((int_part, frac_part))
}

/// Check that `text` is a plain non-negative decimal (`12`, `0.5`, `.5`, `5.`).
pub fn check_decimal(text: &str) -> Result<(), AmountError> {
    split_decimal(text).map(|_| ())
}

pub fn is_decimal(text: &str) -> bool {
    check_decimal(text).is_ok()
}

/// Scale decimal text to the token's smallest unit.
pub fn parse_units(text: &str, decimals: u8) -> Result<u128, AmountError> {
    let (int_part, frac_part) = split_decimal(text)?;
    let frac_trimmed = frac_part.trim_end_matches('0');
    if frac_trimmed.len() > decimals as usize {
        return Err(AmountError::TooPrecise {
            amount: text.trim().to_string(),
            decimals,
        });
    }
    let overflow = || AmountError::Overflow(text.trim().to_string());

    let scale = 10u128.checked_pow(decimals as u32).ok_or_else(overflow)?;
    let int_value = int_part
        .bytes()
        .try_fold(0u128, |acc, b| {
            acc.checked_mul(10)?.checked_add((b - b'0') as u128)
        })
        .ok_or_else(overflow)?;

    let mut frac_value = 0u128;
    for i in 0..decimals as usize {
        let digit = frac_trimmed.as_bytes().get(i).map_or(0, |b| b - b'0');
        frac_value = frac_value * 10 + digit as u128;
    }

    int_value
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(overflow)
}

/// Inverse of [`parse_units`], without trailing fractional zeros.
pub fn format_units(value: u128, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let digits = format!("{:0>width$}", value, width = decimals as usize + 1);
    let (int_part, frac_part) = digits.split_at(digits.len() - decimals as usize);
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_part}")
    }
}

/// Fields carried in a payment link's query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkParams {
    pub merchant: Address,
    pub amount: String,
    pub token: Address,
    pub token_symbol: String,
}

/// `<origin>/pay/<id>?merchant=..&amount=..&token=..&tokenSymbol=..`
pub fn encode_link(origin: &Url, id: &str, params: &LinkParams) -> Result<Url, LinkFormatError> {
    let mut url = origin.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| LinkFormatError::BadOrigin(origin.to_string()))?
        .pop_if_empty()
        .extend(["pay", id]);
    url.query_pairs_mut()
        .append_pair(PARAM_MERCHANT, &params.merchant.to_string())
        .append_pair(PARAM_AMOUNT, &params.amount)
        .append_pair(PARAM_TOKEN, &params.token.to_string())
        .append_pair(PARAM_TOKEN_SYMBOL, &params.token_symbol);
    Ok(url)
}

/// The `<id>` segment following `pay` in a link's path.
pub fn payment_id_from_url(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [.., "pay", id] => Some((*id).to_string()),
        _ => None,
    }
}

/// All four parameters must be present and well formed; anything less is no
/// descriptor at all. Only the first occurrence of a parameter counts.
pub fn decode_link_params(url: &Url) -> Option<LinkParams> {
    let mut merchant: Option<String> = None;
    let mut amount: Option<String> = None;
    let mut token: Option<String> = None;
    let mut token_symbol: Option<String> = None;
    for (key, value) in url.query_pairs() {
        let slot = match key.as_ref() {
            PARAM_MERCHANT => &mut merchant,
            PARAM_AMOUNT => &mut amount,
            PARAM_TOKEN => &mut token,
            PARAM_TOKEN_SYMBOL => &mut token_symbol,
            _ => continue,
        };
        // a repeated parameter keeps its first value
        slot.get_or_insert_with(|| value.into_owned());
    }

    let amount = amount.filter(|a| is_decimal(a))?;
    let token_symbol = token_symbol.filter(|s| !s.trim().is_empty())?;
    Some(LinkParams {
        merchant: merchant?.parse().ok()?,
        amount: amount.trim().to_string(),
        token: token?.parse().ok()?,
        token_symbol,
    })
}

/// Rebuild a descriptor for `id` purely from the link's query string.
pub fn descriptor_from_url(id: &str, url: &Url) -> Option<PaymentDescriptor> {
    let params = decode_link_params(url)?;
    Some(PaymentDescriptor {
        id: id.to_string(),
        amount: params.amount,
        token: params.token,
        token_symbol: params.token_symbol,
        merchant_address: params.merchant,
        link: url.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> LinkParams {
        LinkParams {
            merchant: "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".parse().unwrap(),
            amount: "12.5".into(),
            token: "0xf817257fed379853cde0fa4f97ab987181b1e5ea".parse().unwrap(),
            token_symbol: "USDC".into(),
        }
    }

    #[test]
    fn parse_units_scales_by_decimals() {
        assert_eq!(parse_units("1", 18), Ok(1_000_000_000_000_000_000));
        assert_eq!(parse_units("5", 6), Ok(5_000_000));
        assert_eq!(parse_units("0.5", 6), Ok(500_000));
        assert_eq!(parse_units(".25", 2), Ok(25));
        assert_eq!(parse_units("3.", 2), Ok(300));
        assert_eq!(parse_units("1.500000", 2), Ok(150));
        assert_eq!(parse_units("0", 18), Ok(0));
    }

    #[test]
    fn parse_units_rejects_bad_text() {
        assert_eq!(parse_units("", 6), Err(AmountError::Empty));
        assert!(matches!(parse_units("-1", 6), Err(AmountError::NotDecimal(_))));
        assert!(matches!(parse_units("1e3", 6), Err(AmountError::NotDecimal(_))));
        assert!(matches!(parse_units("1.2.3", 6), Err(AmountError::NotDecimal(_))));
        assert!(matches!(parse_units(".", 6), Err(AmountError::NotDecimal(_))));
        assert!(matches!(
            parse_units("0.0000001", 6),
            Err(AmountError::TooPrecise { decimals: 6, .. })
        ));
        assert!(matches!(
            parse_units("1000000000000000000000000", 18),
            Err(AmountError::Overflow(_))
        ));
    }

    #[test]
    fn format_units_trims_zeros() {
        assert_eq!(format_units(1_000_000_000_000_000_000, 18), "1");
        assert_eq!(format_units(5_000_000, 6), "5");
        assert_eq!(format_units(1_500_000, 6), "1.5");
        assert_eq!(format_units(1, 6), "0.000001");
        assert_eq!(format_units(42, 0), "42");
    }

    #[test]
    fn link_round_trips_through_query() {
        let origin = Url::parse("https://pay.example.com").unwrap();
        let url = encode_link(&origin, "abc-123", &params()).unwrap();
        assert_eq!(url.path(), "/pay/abc-123");
        assert_eq!(payment_id_from_url(&url).as_deref(), Some("abc-123"));
        assert_eq!(decode_link_params(&url), Some(params()));

        let d = descriptor_from_url("abc-123", &url).unwrap();
        assert_eq!(d.amount, "12.5");
        assert_eq!(d.link, url.to_string());
    }

    #[test]
    fn link_keeps_origin_path_prefix() {
        let origin = Url::parse("https://example.com/shop/").unwrap();
        let url = encode_link(&origin, "x", &params()).unwrap();
        assert_eq!(url.path(), "/shop/pay/x");
    }

    #[test]
    fn incomplete_query_yields_nothing() {
        let url = Url::parse(
            "http://localhost:3000/pay/x?merchant=0x70997970c51812dc3a010c7d01b50e0d17dc79c8&amount=1&token=0x0000000000000000000000000000000000000000",
        )
        .unwrap();
        assert_eq!(decode_link_params(&url), None);

        let bad_amount = Url::parse(
            "http://localhost:3000/pay/x?merchant=0x70997970c51812dc3a010c7d01b50e0d17dc79c8&amount=abc&token=0x0000000000000000000000000000000000000000&tokenSymbol=ETH",
        )
        .unwrap();
        assert_eq!(descriptor_from_url("x", &bad_amount), None);
    }

    #[test]
    fn repeated_parameter_keeps_first_value() {
        let url = Url::parse(
            "http://localhost:3000/pay/x?merchant=0x70997970c51812dc3a010c7d01b50e0d17dc79c8&amount=1&token=0x0000000000000000000000000000000000000000&tokenSymbol=ETH&amount=1000&tokenSymbol=WETH",
        )
        .unwrap();
        let params = decode_link_params(&url).unwrap();
        assert_eq!(params.amount, "1");
        assert_eq!(params.token_symbol, "ETH");
    }

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            compute_sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
