use checkout::session::{PageState, PaymentSession};
use paylink_core::network::ChainInfo;
use paylink_core::qr::{render_svg, render_svg_data_uri, MIN_QR_DIMENSION};
use paylink_core::tokens::{TokenRecord, COMMON_TOKENS};
use paylink_core::{Address, NetworkMode, PaymentDescriptor, PaymentStatus, UnknownTokenPolicy};
use serde::{Deserialize, Serialize};
use url::Url;

pub fn tokens() -> Vec<TokenRecord> {
    COMMON_TOKENS.to_vec()
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkInfo {
    pub mode: NetworkMode,
    pub accepted_chain_ids: Vec<u64>,
    pub target: ChainInfo,
}

pub fn network() -> Result<NetworkInfo, String> {
    let checkout = checkout::instance().map_err(|e| e.to_string())?;
    let mode = checkout.settings().mode;
    Ok(NetworkInfo {
        mode,
        accepted_chain_ids: mode.accepted_chain_ids().to_vec(),
        target: *mode.target_chain(),
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateLinkRequest {
    pub amount: String,
    pub token: String,
    pub merchant_address: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedLink {
    pub descriptor: PaymentDescriptor,
    pub display: String,
    pub qr_code: String,
}

pub async fn generate_link(req: GenerateLinkRequest) -> Result<GeneratedLink, String> {
    let checkout = checkout::instance().map_err(|e| e.to_string())?;
    let merchant: Address = req.merchant_address.parse().map_err(|e| format!("{e}"))?;

    let descriptor = checkout
        .generate_link(&req.amount, &req.token, merchant)
        .map_err(|e| {
            tracing::error!(error=%e, "link generation failed");
            e.to_string()
        })?;
    let qr_code =
        render_svg_data_uri(&descriptor.link, MIN_QR_DIMENSION).map_err(|e| e.to_string())?;

    Ok(GeneratedLink {
        display: format!(
            "{} {} to {}",
            descriptor.amount,
            descriptor.token_symbol,
            descriptor.merchant_address.short()
        ),
        descriptor,
        qr_code,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkStatus {
    pub id: String,
    pub amount: String,
    pub token_symbol: String,
    pub merchant: String,
    pub link: String,
    pub status: PaymentStatus,
    pub tx_hash: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub async fn list_links() -> Result<Vec<LinkStatus>, String> {
    let checkout = checkout::instance().map_err(|e| e.to_string())?;
    let records = checkout.history().map_err(|e| e.to_string())?;
    Ok(records
        .into_iter()
        .map(|r| LinkStatus {
            id: r.id,
            amount: r.amount,
            token_symbol: r.token_symbol,
            merchant: r.merchant,
            link: r.link,
            status: r.status,
            tx_hash: r.tx_hash,
            last_error: r.last_error,
            created_at: r.created_at.to_rfc3339(),
            updated_at: r.updated_at.to_rfc3339(),
        })
        .collect())
}

pub async fn link_qr(id: &str) -> Result<String, String> {
    let checkout = checkout::instance().map_err(|e| e.to_string())?;
    let record = checkout
        .link_record(id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("no payment link {id}"))?;
    render_svg(&record.link, MIN_QR_DIMENSION).map_err(|e| e.to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentView {
    pub state: PageState,
    pub status: PaymentStatus,
    pub can_submit: bool,
}

async fn view(id: &str) -> Result<PaymentView, String> {
    let checkout = checkout::instance().map_err(|e| e.to_string())?;
    let session = checkout
        .session(id)
        .await
        .ok_or_else(|| "Payment not found".to_string())?;
    let view = render(&*session.lock().await);
    Ok(view)
}

fn render(session: &PaymentSession) -> PaymentView {
    let state = session.state();
    PaymentView {
        can_submit: state.can_submit(),
        status: session.status(),
        state,
    }
}

/// Rebuild the address the payer opened, so the link parameters can be read.
fn page_url(origin: &Url, id: &str, query: Option<&str>) -> Option<Url> {
    let mut url = origin.clone();
    url.path_segments_mut().ok()?.pop_if_empty().extend(["pay", id]);
    url.set_query(query);
    Some(url)
}

pub async fn open_payment(id: &str, query: Option<&str>) -> Result<PaymentView, String> {
    let checkout = checkout::instance().map_err(|e| e.to_string())?;
    let url = page_url(&checkout.settings().origin, id, query);
    let session = checkout.open_session(id, url.as_ref()).await;
    let view = render(&*session.lock().await);
    Ok(view)
}

pub async fn connect_wallet(id: &str) -> Result<PaymentView, String> {
    let checkout = checkout::instance().map_err(|e| e.to_string())?;
    let session = checkout.open_session(id, None).await;
    let mut session = session.lock().await;
    session.connect_wallet().await.map_err(|e| e.to_string())?;
    Ok(render(&session))
}

pub async fn disconnect_wallet(id: &str) -> Result<PaymentView, String> {
    let checkout = checkout::instance().map_err(|e| e.to_string())?;
    if let Some(session) = checkout.session(id).await {
        session.lock().await.disconnect_wallet();
    }
    view(id).await
}

pub async fn switch_network(id: &str) -> Result<PaymentView, String> {
    let checkout = checkout::instance().map_err(|e| e.to_string())?;
    let session = checkout.open_session(id, None).await;
    let mut session = session.lock().await;
    session.switch_network().await.map_err(|e| e.to_string())?;
    Ok(render(&session))
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub tx_hash: String,
    pub view: PaymentView,
}

pub async fn submit(id: &str) -> Result<SubmitResponse, String> {
    let checkout = checkout::instance().map_err(|e| e.to_string())?;
    let tx_hash = checkout.submit(id).await.map_err(|e| e.to_string())?;
    tracing::info!(payment_id=%id, tx_hash=%tx_hash, "payment submitted");
    Ok(SubmitResponse {
        tx_hash: tx_hash.to_string(),
        view: view(id).await?,
    })
}

pub async fn payment_status(id: &str) -> Result<PaymentView, String> {
    view(id).await
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub network_mode: NetworkMode,
    pub receiver_address: String,
    pub wallet_kind: String,
    pub rpc_url: Option<String>,
    pub origin: String,
    pub unknown_token: UnknownTokenPolicy,
    /// Write-only; stored in the OS keychain, never returned.
    #[serde(default, skip_serializing)]
    pub rpc_api_key: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum KeyUpdate<'a> {
    Unchanged,
    Set(&'a str),
    Clear,
}

/// Omitted keeps the stored key; a blank key removes it.
fn api_key_update(key: Option<&str>) -> KeyUpdate<'_> {
    match key.map(str::trim) {
        None => KeyUpdate::Unchanged,
        Some("") => KeyUpdate::Clear,
        Some(key) => KeyUpdate::Set(key),
    }
}

pub async fn get_settings() -> Result<Settings, String> {
    let cfg = config::load().map_err(|e| e.to_string())?;
    Ok(Settings {
        network_mode: cfg.network.mode,
        receiver_address: cfg.network.receiver_address,
        wallet_kind: cfg.wallet.kind,
        rpc_url: cfg.wallet.rpc_url,
        origin: cfg.server.origin,
        unknown_token: cfg.payments.unknown_token,
        rpc_api_key: None,
    })
}

/// Changes take effect on the next start.
pub async fn update_settings(settings: Settings) -> Result<(), String> {
    settings
        .receiver_address
        .parse::<Address>()
        .map_err(|e| format!("receiver address: {e}"))?;
    Url::parse(&settings.origin).map_err(|e| format!("origin: {e}"))?;

    let mut cfg = config::load().unwrap_or_default();
    cfg.network.mode = settings.network_mode;
    cfg.network.receiver_address = settings.receiver_address;
    cfg.wallet.kind = settings.wallet_kind;
    cfg.wallet.rpc_url = settings.rpc_url;
    cfg.server.origin = settings.origin;
    cfg.payments.unknown_token = settings.unknown_token;
    config::store(&cfg).map_err(|e| e.to_string())?;

    match api_key_update(settings.rpc_api_key.as_deref()) {
        KeyUpdate::Unchanged => {}
        KeyUpdate::Set(key) => {
            config::store_secret(config::RPC_API_KEY_SECRET, key).map_err(|e| e.to_string())?
        }
        KeyUpdate::Clear => {
            config::delete_secret(config::RPC_API_KEY_SECRET).map_err(|e| e.to_string())?;
            tracing::info!("rpc api key cleared");
        }
    }
    tracing::info!("settings updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_url_keeps_query_and_prefix() {
        let origin = Url::parse("https://shop.example/checkout").unwrap();
        let url = page_url(&origin, "abc", Some("amount=1&tokenSymbol=ETH")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://shop.example/checkout/pay/abc?amount=1&tokenSymbol=ETH"
        );
        let bare = page_url(&origin, "abc", None).unwrap();
        assert_eq!(bare.query(), None);
    }

    #[test]
    fn api_key_is_never_serialised() {
        let settings = Settings {
            network_mode: NetworkMode::Development,
            receiver_address: config::DEFAULT_RECEIVER_ADDRESS.into(),
            wallet_kind: "mock".into(),
            rpc_url: None,
            origin: "http://localhost:3000".into(),
            unknown_token: UnknownTokenPolicy::Reject,
            rpc_api_key: Some("secret".into()),
        };
        let json = serde_json::to_value(&settings).unwrap();
        assert!(json.get("rpc_api_key").is_none());
        assert_eq!(json["unknown_token"], "reject");
    }

    #[test]
    fn blank_api_key_clears_the_stored_one() {
        assert_eq!(api_key_update(None), KeyUpdate::Unchanged);
        assert_eq!(api_key_update(Some("")), KeyUpdate::Clear);
        assert_eq!(api_key_update(Some("  ")), KeyUpdate::Clear);
        assert_eq!(api_key_update(Some(" k-1 ")), KeyUpdate::Set("k-1"));
    }
}
