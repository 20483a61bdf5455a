mod commands;
mod routes;

use chain::jsonrpc::{JsonRpcWallet, RpcAuth};
use chain::mock::MockWallet;
use chain::WalletProvider;
use checkout::audit::AuditLog;
use checkout::store::SledRepository;
use checkout::{CheckoutContext, CheckoutSettings};
use config::AppConfig;
use paylink_core::Address;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn create_wallet_provider(cfg: &AppConfig, receiver: Address) -> anyhow::Result<Arc<dyn WalletProvider>> {
    match cfg.wallet.kind.as_str() {
        "jsonrpc" => {
            let rpc_url = cfg
                .wallet
                .rpc_url
                .clone()
                .unwrap_or_else(|| cfg.network.mode.target_chain().rpc_url.to_string());
            let account = cfg
                .wallet
                .account
                .as_deref()
                .map(str::parse::<Address>)
                .transpose()
                .map_err(|e| anyhow::anyhow!("wallet account: {e}"))?;

            let auth = match config::rpc_api_key() {
                Some(key) => {
                    tracing::info!("Using JSON-RPC wallet with API key auth");
                    RpcAuth::ApiKey { key }
                }
                None => RpcAuth::None,
            };
            tracing::info!(rpc_url=%rpc_url, "Using JSON-RPC wallet");
            Ok(JsonRpcWallet::new(rpc_url, auth, account))
        }
        _ => {
            tracing::info!("Using mock wallet on a local devnet");
            Ok(MockWallet::funded_devnet(receiver))
        }
    }
}

fn create_context(cfg: &AppConfig) -> anyhow::Result<CheckoutContext> {
    let receiver = cfg.receiver()?;
    let origin = Url::parse(&cfg.server.origin)
        .map_err(|e| anyhow::anyhow!("invalid origin {}: {e}", cfg.server.origin))?;
    let audit = match &cfg.storage.audit_log {
        Some(path) => AuditLog::new(path),
        None => AuditLog::disabled(),
    };

    Ok(CheckoutContext {
        wallet: create_wallet_provider(cfg, receiver)?,
        repo: Arc::new(SledRepository::open(&cfg.storage.path)?),
        audit,
        settings: CheckoutSettings {
            origin,
            mode: cfg.network.mode,
            receiver,
            unknown_token: cfg.payments.unknown_token,
            poll_interval: Duration::from_millis(cfg.payments.poll_interval_ms),
            max_polls: cfg.payments.max_polls,
            session_ttl: Duration::from_secs(cfg.payments.session_ttl_secs),
        },
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cfg = config::load_effective().unwrap_or_else(|e| {
        tracing::warn!(error=%e, "Using default configuration");
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(|key| std::env::var(key).ok());
        cfg
    });
    checkout::init(create_context(&cfg)?)?;
    tracing::info!(
        mode = %cfg.network.mode,
        chain = %cfg.network.mode.target_chain().name,
        origin = %cfg.server.origin,
        "Checkout ready"
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = routes::router().layer(cors);

    let listener = tokio::net::TcpListener::bind(cfg.server.listen_addr.as_str()).await?;
    tracing::info!(listen=%cfg.server.listen_addr, "Paylink listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
