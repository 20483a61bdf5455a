pub mod audit;
pub mod builder;
pub mod session;
pub mod store;

use anyhow::{anyhow, Result};
use audit::AuditLog;
use builder::{LinkBuilder, LinkError};
use chain::{TxHash, WalletProvider};
use once_cell::sync::OnceCell;
use paylink_core::{Address, NetworkMode, PaymentDescriptor, UnknownTokenPolicy};
use session::{PageState, PaymentError, PaymentSession};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use store::{DescriptorRepository, LinkRecord};
use tokio::sync::Mutex;
use url::Url;

static GLOBAL_CHECKOUT: OnceCell<Arc<Checkout>> = OnceCell::new();

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Base URL payment links are built on.
    pub origin: Url,
    pub mode: NetworkMode,
    /// Receiver contract token payments go through.
    pub receiver: Address,
    pub unknown_token: UnknownTokenPolicy,
    pub poll_interval: Duration,
    pub max_polls: u32,
    /// How long a session may sit untouched before it is dropped.
    pub session_ttl: Duration,
}

/// Everything a session needs from the outside world.
#[derive(Clone)]
pub struct CheckoutContext {
    pub wallet: Arc<dyn WalletProvider + 'static>,
    pub repo: Arc<dyn DescriptorRepository + 'static>,
    pub audit: AuditLog,
    pub settings: CheckoutSettings,
}

pub type SharedSession = Arc<Mutex<PaymentSession>>;

struct SessionEntry {
    session: SharedSession,
    last_seen: Instant,
}

pub struct Checkout {
    ctx: CheckoutContext,
    builder: LinkBuilder,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl Checkout {
    pub fn new(ctx: CheckoutContext) -> Self {
        let builder = LinkBuilder::new(
            ctx.settings.origin.clone(),
            ctx.settings.mode,
            Arc::clone(&ctx.repo),
            ctx.audit.clone(),
        );
        Self {
            ctx,
            builder,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &CheckoutSettings {
        &self.ctx.settings
    }

    pub fn generate_link(
        &self,
        amount: &str,
        selected_token: &str,
        merchant: Address,
    ) -> Result<PaymentDescriptor, LinkError> {
        self.builder.generate_link(amount, selected_token, merchant)
    }

    /// Open the session for `id`, or return the live one. Only sessions that
    /// resolved a descriptor are kept; anything else is handed back unregistered.
    pub async fn open_session(&self, id: &str, url: Option<&Url>) -> SharedSession {
        let mut sessions = self.sessions.lock().await;
        evict_idle(&mut sessions, self.ctx.settings.session_ttl);
        if let Some(entry) = sessions.get_mut(id) {
            entry.last_seen = Instant::now();
            return Arc::clone(&entry.session);
        }

        let session = PaymentSession::open(id, url, self.ctx.clone());
        let resolved = session.descriptor().is_some();
        let session = Arc::new(Mutex::new(session));
        if resolved {
            sessions.insert(
                id.to_string(),
                SessionEntry {
                    session: Arc::clone(&session),
                    last_seen: Instant::now(),
                },
            );
        }
        session
    }

    pub async fn session(&self, id: &str) -> Option<SharedSession> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.get_mut(id)?;
        entry.last_seen = Instant::now();
        Some(Arc::clone(&entry.session))
    }

    /// Run the payment and hand confirmation tracking to a background task.
    /// The session is only locked around the checks and the bookkeeping, so
    /// its state stays readable while the wallet works.
    pub async fn submit(&self, id: &str) -> Result<TxHash, PaymentError> {
        let session = self.session(id).await.ok_or(PaymentError::NotFound)?;
        let payment = session.lock().await.begin_payment().await?;
        // Detached so a dropped caller cannot strand the session in `Submitting`.
        let paying = Arc::clone(&session);
        let tx_hash = tokio::spawn(async move {
            let result = payment.dispatch().await;
            paying.lock().await.finish_payment(payment, result)
        })
        .await
        .map_err(|e| PaymentError::Submission(e.to_string()))??;
        self.watch(id.to_string(), session);
        Ok(tx_hash)
    }

    fn watch(&self, id: String, session: SharedSession) {
        let interval = self.ctx.settings.poll_interval;
        let max_polls = self.ctx.settings.max_polls;

        tokio::spawn(async move {
            for attempt in 0..max_polls {
                tokio::time::sleep(interval).await;
                // Lock per poll so status reads are not blocked for the whole wait.
                let mut guard = session.lock().await;
                match guard.poll_confirmation().await {
                    Ok(PageState::Confirming { .. }) => {}
                    Ok(_) => return,
                    Err(e) => {
                        tracing::warn!(payment_id=%id, attempt, error=%e, "Receipt lookup failed");
                    }
                }
            }
            tracing::error!(payment_id=%id, max_polls, "Gave up waiting for confirmation");
        });
    }

    pub fn history(&self) -> Result<Vec<LinkRecord>> {
        self.ctx.repo.history()
    }

    pub fn link_record(&self, id: &str) -> Result<Option<LinkRecord>> {
        Ok(self.history()?.into_iter().find(|r| r.id == id))
    }
}

/// Drop sessions idle for longer than `ttl`. A payment still on its way to
/// the chain is kept regardless.
fn evict_idle(sessions: &mut HashMap<String, SessionEntry>, ttl: Duration) {
    sessions.retain(|id, entry| {
        if entry.last_seen.elapsed() < ttl {
            return true;
        }
        match entry.session.try_lock() {
            Ok(session) if !session.in_flight() => {
                tracing::debug!(payment_id=%id, "Evicting idle session");
                false
            }
            _ => true,
        }
    });
}

pub fn init(ctx: CheckoutContext) -> Result<()> {
    let checkout = Arc::new(Checkout::new(ctx));
    GLOBAL_CHECKOUT
        .set(checkout)
        .map_err(|_| anyhow!("checkout already initialized"))?;
    Ok(())
}

pub fn instance() -> Result<Arc<Checkout>> {
    GLOBAL_CHECKOUT
        .get()
        .cloned()
        .ok_or_else(|| anyhow!("checkout not initialized"))
}
