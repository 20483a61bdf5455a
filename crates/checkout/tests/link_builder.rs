mod common;

use checkout::store::DescriptorRepository;
use checkout::Checkout;
use common::*;
use paylink_core::parsing::{descriptor_from_url, payment_id_from_url};
use paylink_core::tokens::{MON, USDC};
use paylink_core::{Address, PaymentDescriptor};
use std::collections::HashSet;
use url::Url;

#[test]
fn identical_inputs_get_distinct_ids() {
    let h = harness();
    let checkout = Checkout::new(h.ctx.clone());
    let ids: HashSet<String> = (0..20)
        .map(|_| checkout.generate_link("10", "USDC", merchant()).unwrap().id)
        .collect();
    assert_eq!(ids.len(), 20);
}

#[test]
fn link_decodes_back_to_the_descriptor() {
    let h = harness();
    let checkout = Checkout::new(h.ctx.clone());
    for (amount, token) in [("1", "ETH"), ("0.25", "USDC"), ("1000.000001", "USDT"), ("3", "WETH")] {
        let d = checkout.generate_link(amount, token, merchant()).unwrap();
        let url = Url::parse(&d.link).unwrap();
        assert_eq!(payment_id_from_url(&url).as_deref(), Some(d.id.as_str()));
        assert_eq!(descriptor_from_url(&d.id, &url), Some(d.clone()));
    }
}

#[test]
fn unknown_selection_uses_native_record() {
    let h = harness();
    let checkout = Checkout::new(h.ctx.clone());
    let d = checkout.generate_link("1", "DOGE", merchant()).unwrap();
    assert_eq!(d.token_symbol, "ETH");
    assert_eq!(d.token, Address::ZERO);

    let prod = harness_with(
        chain::mock::MockWallet::funded_devnet(receiver()),
        settings(paylink_core::NetworkMode::Production),
        checkout::audit::AuditLog::disabled(),
    );
    let d = Checkout::new(prod.ctx.clone())
        .generate_link("1", "DOGE", merchant())
        .unwrap();
    assert_eq!(d.token_symbol, MON.symbol);
}

#[test]
fn stored_copy_matches_returned_descriptor() {
    let h = harness();
    let checkout = Checkout::new(h.ctx.clone());
    let d = checkout.generate_link("7.5", "USDC", merchant()).unwrap();
    assert_eq!(d.token, USDC.address);

    let stored: PaymentDescriptor = h.repo.get(&d.id).unwrap().unwrap();
    assert_eq!(stored, d);
    let json = serde_json::to_string(&stored).unwrap();
    let back: PaymentDescriptor = serde_json::from_str(&json).unwrap();
    assert_eq!(back, d);
}

#[test]
fn origin_path_prefix_is_kept() {
    let h = harness();
    let mut settings = h.ctx.settings.clone();
    settings.origin = Url::parse("https://shop.example/checkout/").unwrap();
    let ctx = checkout::CheckoutContext { settings, ..h.ctx.clone() };
    let d = Checkout::new(ctx).generate_link("1", "ETH", merchant()).unwrap();
    let url = Url::parse(&d.link).unwrap();
    assert_eq!(url.path(), format!("/checkout/pay/{}", d.id));
    assert!(d.link.contains(&format!("merchant={MERCHANT}")));
}
