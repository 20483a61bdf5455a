use crate::audit::{AuditEvent, AuditLog};
use crate::store::DescriptorRepository;
use paylink_core::parsing::{
    descriptor_fingerprint, encode_link, parse_units, AmountError, LinkFormatError, LinkParams,
};
use paylink_core::tokens::{lookup_symbol, TokenLookup, COMMON_TOKENS};
use paylink_core::{Address, NetworkMode, PaymentDescriptor, TokenRecord};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),
    #[error(transparent)]
    BadOrigin(#[from] LinkFormatError),
    #[error("connect a wallet to receive payments")]
    MerchantMissing,
}

/// Merchant side: turns form input into a shareable descriptor.
pub struct LinkBuilder {
    origin: Url,
    mode: NetworkMode,
    repo: Arc<dyn DescriptorRepository>,
    audit: AuditLog,
}

impl LinkBuilder {
    pub fn new(
        origin: Url,
        mode: NetworkMode,
        repo: Arc<dyn DescriptorRepository>,
        audit: AuditLog,
    ) -> Self {
        Self {
            origin,
            mode,
            repo,
            audit,
        }
    }

    /// The native record for the chain links are generated for.
    fn native_record(&self) -> &'static TokenRecord {
        let symbol = self.mode.target_chain().native_symbol;
        match lookup_symbol(symbol) {
            TokenLookup::Found(rec) => rec,
            TokenLookup::Unknown => &COMMON_TOKENS[0],
        }
    }

    pub fn resolve_token(&self, selected_token: &str) -> &'static TokenRecord {
        match lookup_symbol(selected_token) {
            TokenLookup::Found(rec) => rec,
            TokenLookup::Unknown => {
                let native = self.native_record();
                tracing::warn!(
                    selected = %selected_token,
                    fallback = %native.symbol,
                    "Unknown token selected, using native currency"
                );
                native
            }
        }
    }

    pub fn generate_link(
        &self,
        amount: &str,
        selected_token: &str,
        merchant: Address,
    ) -> Result<PaymentDescriptor, LinkError> {
        if merchant.is_zero() {
            return Err(LinkError::MerchantMissing);
        }
        let token = self.resolve_token(selected_token);
        let amount = amount.trim();
        parse_units(amount, token.decimals)?;

        let id = uuid::Uuid::new_v4().to_string();
        let params = LinkParams {
            merchant,
            amount: amount.to_string(),
            token: token.address,
            token_symbol: token.symbol.to_string(),
        };
        let link = encode_link(&self.origin, &id, &params)?;

        let descriptor = PaymentDescriptor {
            id,
            amount: params.amount,
            token: params.token,
            token_symbol: params.token_symbol,
            merchant_address: merchant,
            link: link.to_string(),
        };

        // The link carries everything; the cached copy is a convenience.
        if let Err(err) = self.repo.put(&descriptor) {
            tracing::warn!(payment_id=%descriptor.id, error=%err, "Failed to cache descriptor");
        }

        self.audit.record(
            AuditEvent::new("link_generated", &descriptor.id, "idle")
                .with_hash(descriptor_fingerprint(&descriptor))
                .with_merchant(merchant.to_string()),
        );
        tracing::info!(
            payment_id = %descriptor.id,
            amount = %descriptor.amount,
            token = %descriptor.token_symbol,
            "Payment link generated"
        );
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SledRepository;

    fn builder(mode: NetworkMode) -> LinkBuilder {
        LinkBuilder::new(
            Url::parse("http://localhost:3000").unwrap(),
            mode,
            Arc::new(SledRepository::temporary().unwrap()),
            AuditLog::disabled(),
        )
    }

    fn merchant() -> Address {
        "0x70997970c51812dc3a010c7d01b50e0d17dc79c8".parse().unwrap()
    }

    #[test]
    fn unknown_symbol_falls_back_to_target_native() {
        assert_eq!(builder(NetworkMode::Development).resolve_token("DAI").symbol, "ETH");
        assert_eq!(builder(NetworkMode::Production).resolve_token("DAI").symbol, "MON");
        assert_eq!(builder(NetworkMode::Production).resolve_token("USDT").symbol, "USDT");
    }

    #[test]
    fn rejects_amounts_the_token_cannot_hold() {
        let b = builder(NetworkMode::Development);
        assert!(matches!(
            b.generate_link("0.0000001", "USDC", merchant()),
            Err(LinkError::InvalidAmount(AmountError::TooPrecise { .. }))
        ));
        assert!(matches!(
            b.generate_link("ten", "ETH", merchant()),
            Err(LinkError::InvalidAmount(_))
        ));
        assert!(matches!(
            b.generate_link("1", "ETH", Address::ZERO),
            Err(LinkError::MerchantMissing)
        ));
    }

    #[test]
    fn trims_amount_and_caches_descriptor() {
        let b = builder(NetworkMode::Development);
        let d = b.generate_link(" 2.5 ", "USDC", merchant()).unwrap();
        assert_eq!(d.amount, "2.5");
        assert!(d.link.starts_with(&format!("http://localhost:3000/pay/{}?", d.id)));
        assert_eq!(b.repo.get(&d.id).unwrap(), Some(d));
    }
}
