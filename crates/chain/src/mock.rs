use super::{ReceiptStatus, TxHash, TxRequest, WalletProvider};
use crate::abi::{decode_call, Call, PaymentReceived};
use crate::receiver::{Ledger, ReceiverContract, Revert};
use anyhow::{bail, Result};
use async_trait::async_trait;
use paylink_core::network::{LOCALHOST, MONAD_TESTNET};
use paylink_core::Address;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const USER_REJECTED: &str = "User rejected the request.";

/// First default account of a local development node.
pub const DEV_ACCOUNT: Address = Address([
    0xf3, 0x9f, 0xd6, 0xe5, 0x1a, 0xad, 0x88, 0xf6, 0xf4, 0xce, 0x6a, 0xb8, 0x82, 0x72, 0x79, 0xcf,
    0xff, 0xb9, 0x22, 0x66,
]);

/// Knobs for simulating wallet prompts and slow blocks.
#[derive(Debug, Clone)]
pub struct MockBehaviour {
    pub reject_connect: bool,
    pub reject_switch: bool,
    pub reject_approvals: bool,
    pub reject_payments: bool,
    /// Receipt polls answered with `Pending` before the receipt shows up.
    pub pending_polls: u32,
    pub supported_chains: Vec<u64>,
}

impl Default for MockBehaviour {
    fn default() -> Self {
        Self {
            reject_connect: false,
            reject_switch: false,
            reject_approvals: false,
            reject_payments: false,
            pending_polls: 0,
            supported_chains: vec![LOCALHOST.id, MONAD_TESTNET.id],
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Erc20 {
    balances: HashMap<Address, u128>,
    // (owner, spender)
    allowances: HashMap<(Address, Address), u128>,
}

#[derive(Debug, Clone, Default)]
struct Devnet {
    balances: HashMap<Address, u128>,
    tokens: HashMap<Address, Erc20>,
}

impl Ledger for Devnet {
    fn transfer_native(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), Revert> {
        let bal = self.balances.entry(*from).or_default();
        if *bal < amount {
            return Err(Revert::Other("insufficient funds for transfer".into()));
        }
        *bal -= amount;
        *self.balances.entry(*to).or_default() += amount;
        Ok(())
    }

    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), Revert> {
        let erc20 = self.tokens.entry(*token).or_default();
        let allowance = erc20.allowances.entry((*from, *spender)).or_default();
        if *allowance < amount {
            return Err(Revert::InsufficientAllowance);
        }
        *allowance -= amount;
        let bal = erc20.balances.entry(*from).or_default();
        if *bal < amount {
            return Err(Revert::InsufficientBalance);
        }
        *bal -= amount;
        *erc20.balances.entry(*to).or_default() += amount;
        Ok(())
    }
}

#[derive(Debug)]
struct MinedTx {
    outcome: ReceiptStatus,
    polls_left: u32,
}

#[derive(Debug)]
struct MockState {
    devnet: Devnet,
    chain_id: u64,
    connected: bool,
    block_number: u64,
    sent: Vec<TxRequest>,
    mined: HashMap<TxHash, MinedTx>,
    events: Vec<PaymentReceived>,
    behaviour: MockBehaviour,
}

/// In-process wallet backed by a tiny devnet. Transactions are executed on
/// submission, including calls into the receiver contract, and their receipts
/// appear after the configured number of polls.
pub struct MockWallet {
    account: Address,
    receiver: ReceiverContract,
    state: Mutex<MockState>,
}

impl MockWallet {
    pub fn new(account: Address, receiver: Address, chain_id: u64) -> Self {
        Self {
            account,
            receiver: ReceiverContract::new(receiver),
            state: Mutex::new(MockState {
                devnet: Devnet::default(),
                chain_id,
                connected: false,
                block_number: 0,
                sent: Vec::new(),
                mined: HashMap::new(),
                events: Vec::new(),
                behaviour: MockBehaviour::default(),
            }),
        }
    }

    /// A development wallet on the local chain holding 10 000 of the native
    /// coin and 10 000 of every token in the fixed table.
    pub fn funded_devnet(receiver: Address) -> Arc<Self> {
        let mut wallet = Self::new(DEV_ACCOUNT, receiver, LOCALHOST.id)
            .with_native_balance(DEV_ACCOUNT, 10_000 * 10u128.pow(18));
        for token in paylink_core::tokens::COMMON_TOKENS.iter().filter(|t| !t.is_native()) {
            wallet = wallet.with_token_balance(
                token.address,
                DEV_ACCOUNT,
                10_000 * 10u128.pow(token.decimals as u32),
            );
        }
        Arc::new(wallet)
    }

    pub fn with_native_balance(mut self, holder: Address, amount: u128) -> Self {
        self.state.get_mut().devnet.balances.insert(holder, amount);
        self
    }

    pub fn with_token_balance(mut self, token: Address, holder: Address, amount: u128) -> Self {
        self.state
            .get_mut()
            .devnet
            .tokens
            .entry(token)
            .or_default()
            .balances
            .insert(holder, amount);
        self
    }

    pub fn with_behaviour(mut self, behaviour: MockBehaviour) -> Self {
        self.state.get_mut().behaviour = behaviour;
        self
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub async fn set_behaviour(&self, behaviour: MockBehaviour) {
        self.state.lock().await.behaviour = behaviour;
    }

    pub async fn sent_transactions(&self) -> Vec<TxRequest> {
        self.state.lock().await.sent.clone()
    }

    pub async fn events(&self) -> Vec<PaymentReceived> {
        self.state.lock().await.events.clone()
    }

    pub async fn native_balance(&self, holder: &Address) -> u128 {
        let state = self.state.lock().await;
        state.devnet.balances.get(holder).copied().unwrap_or(0)
    }

    pub async fn token_balance(&self, token: &Address, holder: &Address) -> u128 {
        let state = self.state.lock().await;
        state
            .devnet
            .tokens
            .get(token)
            .and_then(|t| t.balances.get(holder))
            .copied()
            .unwrap_or(0)
    }

    pub async fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> u128 {
        let state = self.state.lock().await;
        state
            .devnet
            .tokens
            .get(token)
            .and_then(|t| t.allowances.get(&(*owner, *spender)))
            .copied()
            .unwrap_or(0)
    }

    fn execute(
        &self,
        devnet: &mut Devnet,
        tx: &TxRequest,
    ) -> Result<Option<PaymentReceived>, Revert> {
        if tx.data.is_empty() {
            devnet.transfer_native(&tx.from, &tx.to, tx.value)?;
            return Ok(None);
        }

        match decode_call(&tx.data) {
            Some(Call::Approve { spender, amount }) => {
                if tx.to == self.receiver.address() || tx.to.is_zero() {
                    return Err(Revert::Other("approve sent to a non-token address".into()));
                }
                devnet
                    .tokens
                    .entry(tx.to)
                    .or_default()
                    .allowances
                    .insert((tx.from, spender), amount);
                Ok(None)
            }
            Some(Call::Pay {
                merchant,
                token,
                amount,
            }) if tx.to == self.receiver.address() => {
                devnet.transfer_native(&tx.from, &tx.to, tx.value)?;
                let event =
                    self.receiver
                        .pay(devnet, &tx.from, tx.value, &merchant, &token, amount)?;
                Ok(Some(event))
            }
            _ => Err(Revert::Other("call to unknown function".into())),
        }
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn connect(&self) -> Result<Address> {
        let mut state = self.state.lock().await;
        if state.behaviour.reject_connect {
            bail!(USER_REJECTED);
        }
        state.connected = true;
        Ok(self.account)
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.state.lock().await.chain_id)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.behaviour.reject_switch {
            bail!(USER_REJECTED);
        }
        if !state.behaviour.supported_chains.contains(&chain_id) {
            bail!("Unrecognized chain ID {chain_id}");
        }
        state.chain_id = chain_id;
        Ok(())
    }

    async fn send_transaction(&self, tx: &TxRequest) -> Result<TxHash> {
        let mut state = self.state.lock().await;
        if !state.connected {
            bail!("wallet is not connected");
        }
        if tx.from != self.account {
            bail!("unknown account {}", tx.from);
        }
        let rejected = match decode_call(&tx.data) {
            Some(Call::Approve { .. }) => state.behaviour.reject_approvals,
            _ => state.behaviour.reject_payments,
        };
        if rejected {
            bail!(USER_REJECTED);
        }
        let available = state.devnet.balances.get(&tx.from).copied().unwrap_or(0);
        if available < tx.value {
            bail!("insufficient funds for transfer");
        }

        let hash = TxHash(rand::thread_rng().gen());
        let snapshot = state.devnet.clone();
        let outcome = match self.execute(&mut state.devnet, tx) {
            Ok(event) => {
                state.block_number += 1;
                if let Some(event) = event {
                    state.events.push(event);
                }
                ReceiptStatus::Confirmed {
                    block_number: state.block_number,
                }
            }
            Err(revert) => {
                state.devnet = snapshot;
                tracing::debug!(tx_hash = %hash, reason = %revert, "mock transaction reverted");
                ReceiptStatus::Reverted {
                    reason: Some(revert.to_string()),
                }
            }
        };

        let polls_left = state.behaviour.pending_polls;
        state.sent.push(tx.clone());
        state.mined.insert(hash, MinedTx { outcome, polls_left });
        Ok(hash)
    }

    async fn receipt(&self, tx_hash: &TxHash) -> Result<ReceiptStatus> {
        let mut state = self.state.lock().await;
        let Some(mined) = state.mined.get_mut(tx_hash) else {
            bail!("unknown transaction {tx_hash}");
        };
        if mined.polls_left > 0 {
            mined.polls_left -= 1;
            return Ok(ReceiptStatus::Pending);
        }
        Ok(mined.outcome.clone())
    }
}
