//! Payer side of a payment link.
//!
//! A session owns the latest values observed from the wallet (account, chain)
//! and the progress of the current payment attempt. The page state is derived
//! from those on demand, never stored, so a wallet prompt that is abandoned
//! midway cannot leave the page in a mixed state.

use crate::audit::AuditEvent;
use crate::CheckoutContext;
use chain::abi::{encode_approve, encode_pay};
use chain::{ReceiptStatus, TxHash, TxRequest, WalletProvider};
use paylink_core::parsing::{descriptor_fingerprint, descriptor_from_url, parse_units};
use paylink_core::tokens::{lookup_for_payment, TokenLookup, FALLBACK_DECIMALS};
use paylink_core::validation::validate;
use paylink_core::{Address, PaymentDescriptor, PaymentStatus, UnknownTokenPolicy};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use url::Url;

const GENERIC_FAILURE: &str = "Transaction failed. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PaymentError {
    #[error("Payment not found")]
    NotFound,
    #[error("Please connect your wallet first.")]
    WalletNotConnected,
    #[error("Failed to connect wallet: {0}")]
    WalletConnection(String),
    #[error("Please switch to the correct network first.")]
    WrongNetwork { expected: u64, actual: Option<u64> },
    #[error("Failed to switch network. Please switch manually.")]
    NetworkSwitch(String),
    #[error("Approval failed or was rejected.")]
    Approval(String),
    #[error("{0}")]
    Submission(String),
    #[error("Transaction reverted: {0}")]
    Reverted(String),
    #[error("Could not confirm transaction: {0}")]
    Confirmation(String),
    #[error("Unknown token {0}; its decimals cannot be determined")]
    UnknownToken(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("A payment is already in progress")]
    InFlight,
    #[error("This payment has already been completed")]
    AlreadyPaid,
}

impl PaymentError {
    fn submission(err: anyhow::Error) -> Self {
        let msg = err.to_string();
        if msg.trim().is_empty() {
            PaymentError::Submission(GENERIC_FAILURE.to_string())
        } else {
            PaymentError::Submission(msg)
        }
    }

    fn audit_event_type(&self) -> &'static str {
        match self {
            PaymentError::Approval(_) => "approval_failed",
            _ => "payment_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Submitting,
    Confirming { tx_hash: TxHash },
    Succeeded { tx_hash: TxHash },
    Failed { error: PaymentError },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PageState {
    NoDescriptor,
    AwaitingWallet {
        descriptor: PaymentDescriptor,
        notice: Option<String>,
    },
    AwaitingNetwork {
        descriptor: PaymentDescriptor,
        account: Address,
        chain_id: Option<u64>,
        expected: u64,
        notice: Option<String>,
    },
    Ready {
        descriptor: PaymentDescriptor,
        account: Address,
    },
    Submitting {
        descriptor: PaymentDescriptor,
    },
    Confirming {
        descriptor: PaymentDescriptor,
        tx_hash: TxHash,
    },
    Succeeded {
        descriptor: PaymentDescriptor,
        tx_hash: TxHash,
    },
    Failed {
        descriptor: PaymentDescriptor,
        error: PaymentError,
    },
}

impl PageState {
    /// Whether the submit action is enabled. `Failed` is retryable.
    pub fn can_submit(&self) -> bool {
        matches!(self, PageState::Ready { .. } | PageState::Failed { .. })
    }
}

pub struct PaymentSession {
    id: String,
    descriptor: Option<PaymentDescriptor>,
    account: Option<Address>,
    chain_id: Option<u64>,
    notice: Option<String>,
    phase: Phase,
    ctx: CheckoutContext,
}

impl PaymentSession {
    pub fn open(id: &str, url: Option<&Url>, ctx: CheckoutContext) -> Self {
        let mut session = Self {
            id: id.to_string(),
            descriptor: None,
            account: None,
            chain_id: None,
            notice: None,
            phase: Phase::Idle,
            ctx,
        };
        session.load(url);
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn descriptor(&self) -> Option<&PaymentDescriptor> {
        self.descriptor.as_ref()
    }

    /// Resolve the descriptor: the repository first, then the page URL.
    /// Leaves the session without a descriptor if neither yields a valid one.
    pub fn load(&mut self, url: Option<&Url>) {
        self.descriptor = self.from_repository().or_else(|| {
            let url = url?;
            let descriptor = descriptor_from_url(&self.id, url)?;
            match validate(&descriptor) {
                Ok(()) => Some(descriptor),
                Err(errs) => {
                    tracing::warn!(payment_id=%self.id, errors=?errs, "Link parameters rejected");
                    None
                }
            }
        });

        match &self.descriptor {
            Some(d) => tracing::debug!(payment_id=%self.id, token=%d.token_symbol, "Descriptor resolved"),
            None => tracing::info!(payment_id=%self.id, "No payment descriptor available"),
        }
    }

    fn from_repository(&self) -> Option<PaymentDescriptor> {
        let descriptor = match self.ctx.repo.get(&self.id) {
            Ok(Some(d)) => d,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(payment_id=%self.id, error=%err, "Stored descriptor unreadable, falling back to link");
                return None;
            }
        };
        if descriptor.id != self.id {
            tracing::warn!(payment_id=%self.id, stored_id=%descriptor.id, "Stored descriptor has a different id");
            return None;
        }
        match validate(&descriptor) {
            Ok(()) => Some(descriptor),
            Err(errs) => {
                tracing::warn!(payment_id=%self.id, errors=?errs, "Stored descriptor rejected");
                None
            }
        }
    }

    pub fn state(&self) -> PageState {
        let Some(descriptor) = self.descriptor.clone() else {
            return PageState::NoDescriptor;
        };
        match &self.phase {
            Phase::Succeeded { tx_hash } => {
                return PageState::Succeeded {
                    descriptor,
                    tx_hash: *tx_hash,
                }
            }
            Phase::Confirming { tx_hash } => {
                return PageState::Confirming {
                    descriptor,
                    tx_hash: *tx_hash,
                }
            }
            Phase::Submitting => return PageState::Submitting { descriptor },
            Phase::Idle | Phase::Failed { .. } => {}
        }

        let Some(account) = self.account else {
            return PageState::AwaitingWallet {
                descriptor,
                notice: self.notice.clone(),
            };
        };
        let mode = self.ctx.settings.mode;
        if !self.chain_id.is_some_and(|id| mode.accepts(id)) {
            return PageState::AwaitingNetwork {
                descriptor,
                account,
                chain_id: self.chain_id,
                expected: mode.target_chain().id,
                notice: self.notice.clone(),
            };
        }
        match &self.phase {
            Phase::Failed { error } => PageState::Failed {
                descriptor,
                error: error.clone(),
            },
            _ => PageState::Ready {
                descriptor,
                account,
            },
        }
    }

    pub fn status(&self) -> PaymentStatus {
        match self.phase {
            Phase::Idle => PaymentStatus::Idle,
            Phase::Submitting | Phase::Confirming { .. } => PaymentStatus::Pending,
            Phase::Succeeded { .. } => PaymentStatus::Success,
            Phase::Failed { .. } => PaymentStatus::Error,
        }
    }

    pub async fn connect_wallet(&mut self) -> Result<Address, PaymentError> {
        match self.ctx.wallet.connect().await {
            Ok(account) => {
                tracing::info!(payment_id=%self.id, account=%account.short(), "Wallet connected");
                self.account = Some(account);
                self.notice = None;
                self.refresh_chain().await;
                Ok(account)
            }
            Err(err) => {
                tracing::warn!(payment_id=%self.id, error=%err, "Wallet connection failed");
                let err = PaymentError::WalletConnection(err.to_string());
                self.notice = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn disconnect_wallet(&mut self) {
        self.account = None;
        self.chain_id = None;
        self.notice = None;
    }

    /// Record a chain reported by the wallet, e.g. from a chain-changed callback.
    pub fn observe_chain(&mut self, chain_id: Option<u64>) {
        if self.chain_id != chain_id {
            tracing::debug!(payment_id=%self.id, chain_id=?chain_id, "Chain changed");
        }
        self.chain_id = chain_id;
    }

    pub async fn refresh_chain(&mut self) -> Option<u64> {
        let chain_id = match self.ctx.wallet.chain_id().await {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!(payment_id=%self.id, error=%err, "Failed to read chain id");
                None
            }
        };
        self.observe_chain(chain_id);
        chain_id
    }

    /// Ask the wallet to move to the deployment's target chain. Failures are
    /// reported as a notice and can be retried.
    pub async fn switch_network(&mut self) -> Result<(), PaymentError> {
        if self.account.is_none() {
            return Err(PaymentError::WalletNotConnected);
        }
        let target = self.ctx.settings.mode.target_chain();
        match self.ctx.wallet.switch_chain(target.id).await {
            Ok(()) => {
                tracing::info!(payment_id=%self.id, chain=%target.name, "Network switched");
                self.notice = None;
                self.refresh_chain().await;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(payment_id=%self.id, chain_id=target.id, error=%err, "Network switch failed");
                let err = PaymentError::NetworkSwitch(err.to_string());
                self.notice = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Decimals for the descriptor's token and whether it is the native coin.
    fn resolve_precision(
        &self,
        descriptor: &PaymentDescriptor,
    ) -> Result<(u8, bool), PaymentError> {
        match lookup_for_payment(&descriptor.token_symbol, &descriptor.token) {
            TokenLookup::Found(rec) => Ok((rec.decimals, rec.is_native())),
            TokenLookup::Unknown => match self.ctx.settings.unknown_token {
                UnknownTokenPolicy::AssumeDefaultDecimals => {
                    tracing::warn!(
                        payment_id = %self.id,
                        token = %descriptor.token,
                        symbol = %descriptor.token_symbol,
                        decimals = FALLBACK_DECIMALS,
                        "Token not in table, assuming default decimals"
                    );
                    Ok((FALLBACK_DECIMALS, false))
                }
                UnknownTokenPolicy::Reject => {
                    Err(PaymentError::UnknownToken(descriptor.token_symbol.clone()))
                }
            },
        }
    }

    /// A transaction has been handed to the wallet and not yet settled.
    pub fn in_flight(&self) -> bool {
        matches!(self.phase, Phase::Submitting | Phase::Confirming { .. })
    }

    /// Submit the payment: a single transfer for the native coin, or an
    /// approval followed by the receiver's `pay` call for a token.
    pub async fn pay(&mut self) -> Result<TxHash, PaymentError> {
        let payment = self.begin_payment().await?;
        let result = payment.dispatch().await;
        self.finish_payment(payment, result)
    }

    /// Run every pre-flight check and move to `Submitting`. The returned
    /// payment owns what the wallet calls need, so they can run without
    /// holding the session.
    pub async fn begin_payment(&mut self) -> Result<PreparedPayment, PaymentError> {
        let descriptor = self.descriptor.clone().ok_or(PaymentError::NotFound)?;
        match self.phase {
            Phase::Submitting | Phase::Confirming { .. } => return Err(PaymentError::InFlight),
            Phase::Succeeded { .. } => return Err(PaymentError::AlreadyPaid),
            Phase::Idle | Phase::Failed { .. } => {}
        }
        let account = self.account.ok_or(PaymentError::WalletNotConnected)?;

        let mode = self.ctx.settings.mode;
        let chain_id = self.refresh_chain().await;
        if !chain_id.is_some_and(|id| mode.accepts(id)) {
            let err = PaymentError::WrongNetwork {
                expected: mode.target_chain().id,
                actual: chain_id,
            };
            self.notice = Some(err.to_string());
            return Err(err);
        }

        let scaled = self.resolve_precision(&descriptor).and_then(|(decimals, native)| {
            parse_units(&descriptor.amount, decimals)
                .map(|amount| (amount, native))
                .map_err(|e| PaymentError::InvalidAmount(e.to_string()))
        });
        let (amount, native) = match scaled {
            Ok(v) => v,
            Err(err) => return Err(self.fail(&descriptor, err)),
        };

        self.phase = Phase::Submitting;
        self.notice = None;
        tracing::info!(
            payment_id = %self.id,
            amount = %amount,
            token = %descriptor.token_symbol,
            native,
            "Submitting payment"
        );

        Ok(PreparedPayment {
            id: self.id.clone(),
            wallet: Arc::clone(&self.ctx.wallet),
            receiver: self.ctx.settings.receiver,
            poll_interval: self.ctx.settings.poll_interval,
            max_polls: self.ctx.settings.max_polls,
            account,
            descriptor,
            amount,
            native,
        })
    }

    /// Record the outcome of a dispatched payment.
    pub fn finish_payment(
        &mut self,
        payment: PreparedPayment,
        result: Result<TxHash, PaymentError>,
    ) -> Result<TxHash, PaymentError> {
        let descriptor = payment.descriptor;
        match result {
            Ok(tx_hash) => {
                self.phase = Phase::Confirming { tx_hash };
                if let Err(err) = self.ctx.repo.mark_status(
                    &descriptor,
                    PaymentStatus::Pending,
                    Some(tx_hash.to_string()),
                    None,
                ) {
                    tracing::warn!(payment_id=%self.id, error=%err, "Failed to update history");
                }
                self.ctx.audit.record(
                    AuditEvent::new("payment_submitted", &self.id, PaymentStatus::Pending.as_str())
                        .with_hash(descriptor_fingerprint(&descriptor))
                        .with_tx_hash(tx_hash.to_string())
                        .with_merchant(descriptor.merchant_address.to_string())
                        .with_payer(payment.account.to_string()),
                );
                tracing::info!(payment_id=%self.id, tx_hash=%tx_hash, "Payment broadcast");
                Ok(tx_hash)
            }
            Err(err) => Err(self.fail(&descriptor, err)),
        }
    }

    fn fail(&mut self, descriptor: &PaymentDescriptor, err: PaymentError) -> PaymentError {
        tracing::warn!(payment_id=%self.id, error=?err, "Payment failed");
        self.phase = Phase::Failed { error: err.clone() };
        if let Err(e) = self.ctx.repo.mark_status(
            descriptor,
            PaymentStatus::Error,
            None,
            Some(err.to_string()),
        ) {
            tracing::warn!(payment_id=%self.id, error=%e, "Failed to update history");
        }
        let mut event = AuditEvent::new(err.audit_event_type(), &self.id, PaymentStatus::Error.as_str())
            .with_hash(descriptor_fingerprint(descriptor))
            .with_error(err.to_string());
        if let Some(account) = self.account {
            event = event.with_payer(account.to_string());
        }
        self.ctx.audit.record(event);
        err
    }

    /// Check the broadcast transaction once. Provider errors leave the session
    /// confirming so the caller can poll again.
    pub async fn poll_confirmation(&mut self) -> Result<PageState, PaymentError> {
        let Phase::Confirming { tx_hash } = self.phase else {
            return Ok(self.state());
        };
        let receipt = self
            .ctx
            .wallet
            .receipt(&tx_hash)
            .await
            .map_err(|e| PaymentError::Confirmation(e.to_string()))?;

        match receipt {
            ReceiptStatus::Pending => {}
            ReceiptStatus::Confirmed { block_number } => self.confirm(tx_hash, block_number),
            ReceiptStatus::Reverted { reason } => {
                if let Some(descriptor) = self.descriptor.clone() {
                    let reason = reason.unwrap_or_else(|| "execution reverted".to_string());
                    self.fail(&descriptor, PaymentError::Reverted(reason));
                }
            }
        }
        Ok(self.state())
    }

    fn confirm(&mut self, tx_hash: TxHash, block_number: u64) {
        self.phase = Phase::Succeeded { tx_hash };
        let Some(descriptor) = self.descriptor.clone() else {
            return;
        };

        if let Err(err) = self.ctx.repo.remove(&self.id) {
            tracing::warn!(payment_id=%self.id, error=%err, "Failed to drop cached descriptor");
        }
        if let Err(err) = self.ctx.repo.mark_status(
            &descriptor,
            PaymentStatus::Success,
            Some(tx_hash.to_string()),
            None,
        ) {
            tracing::warn!(payment_id=%self.id, error=%err, "Failed to update history");
        }

        let mut event = AuditEvent::new("payment_confirmed", &self.id, PaymentStatus::Success.as_str())
            .with_hash(descriptor_fingerprint(&descriptor))
            .with_tx_hash(tx_hash.to_string())
            .with_merchant(descriptor.merchant_address.to_string());
        if let Some(account) = self.account {
            event = event.with_payer(account.to_string());
        }
        self.ctx.audit.record(event);
        tracing::info!(payment_id=%self.id, tx_hash=%tx_hash, block_number, "Payment confirmed");
    }

    /// Poll until the transaction leaves `Confirming` or the attempt limit is
    /// reached. Transient provider errors count as an attempt.
    pub async fn wait_for_confirmation(&mut self) -> PageState {
        let interval = self.ctx.settings.poll_interval;
        for attempt in 0..self.ctx.settings.max_polls {
            match self.poll_confirmation().await {
                Ok(PageState::Confirming { .. }) => {}
                Ok(state) => return state,
                Err(err) => {
                    tracing::warn!(payment_id=%self.id, attempt, error=%err, "Receipt lookup failed");
                }
            }
            sleep(interval).await;
        }
        self.state()
    }
}

/// A payment that passed its checks and is waiting to be sent.
pub struct PreparedPayment {
    id: String,
    wallet: Arc<dyn WalletProvider + 'static>,
    receiver: Address,
    poll_interval: Duration,
    max_polls: u32,
    account: Address,
    descriptor: PaymentDescriptor,
    amount: u128,
    native: bool,
}

impl PreparedPayment {
    /// Hand the transaction(s) to the wallet.
    pub async fn dispatch(&self) -> Result<TxHash, PaymentError> {
        if self.native {
            let tx = TxRequest::native_transfer(
                self.account,
                self.descriptor.merchant_address,
                self.amount,
            );
            return self
                .wallet
                .send_transaction(&tx)
                .await
                .map_err(PaymentError::submission);
        }
        self.approve_then_pay().await
    }

    async fn approve_then_pay(&self) -> Result<TxHash, PaymentError> {
        let wallet = self.wallet.as_ref();
        let receiver = self.receiver;

        let approve = TxRequest::call(
            self.account,
            self.descriptor.token,
            encode_approve(&receiver, self.amount),
        );
        let approve_hash = wallet
            .send_transaction(&approve)
            .await
            .map_err(|e| PaymentError::Approval(e.to_string()))?;
        tracing::debug!(payment_id=%self.id, tx_hash=%approve_hash, "Approval sent");

        // The pay call is only sent once the allowance is on chain.
        match await_receipt(wallet, &approve_hash, self.poll_interval, self.max_polls).await {
            Ok(ReceiptStatus::Confirmed { .. }) => {}
            Ok(ReceiptStatus::Reverted { reason }) => {
                return Err(PaymentError::Approval(
                    reason.unwrap_or_else(|| "approval reverted".to_string()),
                ))
            }
            Ok(ReceiptStatus::Pending) => {
                return Err(PaymentError::Approval(
                    "approval was not confirmed in time".to_string(),
                ))
            }
            Err(err) => return Err(PaymentError::Approval(err.to_string())),
        }

        let pay = TxRequest::call(
            self.account,
            receiver,
            encode_pay(&self.descriptor.merchant_address, &self.descriptor.token, self.amount),
        );
        wallet
            .send_transaction(&pay)
            .await
            .map_err(PaymentError::submission)
    }
}

/// Poll a receipt until it leaves `Pending` or `max_polls` lookups have been made.
pub async fn await_receipt(
    wallet: &dyn WalletProvider,
    tx_hash: &TxHash,
    interval: Duration,
    max_polls: u32,
) -> anyhow::Result<ReceiptStatus> {
    for attempt in 0..max_polls {
        let status = wallet.receipt(tx_hash).await?;
        if status != ReceiptStatus::Pending {
            return Ok(status);
        }
        if attempt + 1 < max_polls {
            sleep(interval).await;
        }
    }
    Ok(ReceiptStatus::Pending)
}
