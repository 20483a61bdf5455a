#![allow(dead_code)]

use chain::mock::{MockWallet, DEV_ACCOUNT};
use checkout::audit::AuditLog;
use checkout::store::{DescriptorRepository, SledRepository};
use checkout::{CheckoutContext, CheckoutSettings};
use paylink_core::{Address, NetworkMode, UnknownTokenPolicy};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const MERCHANT: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";
pub const RECEIVER: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

pub fn merchant() -> Address {
    MERCHANT.parse().unwrap()
}

pub fn receiver() -> Address {
    RECEIVER.parse().unwrap()
}

pub fn payer() -> Address {
    DEV_ACCOUNT
}

pub fn settings(mode: NetworkMode) -> CheckoutSettings {
    CheckoutSettings {
        origin: Url::parse("http://localhost:3000").unwrap(),
        mode,
        receiver: receiver(),
        unknown_token: UnknownTokenPolicy::AssumeDefaultDecimals,
        poll_interval: Duration::from_millis(1),
        max_polls: 5,
        session_ttl: Duration::from_secs(60),
    }
}

pub struct Harness {
    pub wallet: Arc<MockWallet>,
    pub repo: Arc<SledRepository>,
    pub ctx: CheckoutContext,
}

pub fn harness_with(wallet: Arc<MockWallet>, settings: CheckoutSettings, audit: AuditLog) -> Harness {
    let repo = Arc::new(SledRepository::temporary().unwrap());
    let ctx = CheckoutContext {
        wallet: wallet.clone(),
        repo: repo.clone() as Arc<dyn DescriptorRepository>,
        audit,
        settings,
    };
    Harness { wallet, repo, ctx }
}

pub fn harness() -> Harness {
    harness_with(
        MockWallet::funded_devnet(receiver()),
        settings(NetworkMode::Development),
        AuditLog::disabled(),
    )
}

pub fn link_url(query: &str) -> Url {
    Url::parse(&format!("http://localhost:3000/pay/p-1?{query}")).unwrap()
}
