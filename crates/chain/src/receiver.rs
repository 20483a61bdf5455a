//! The payment receiver contract: forward native value or pull a pre-approved
//! token amount to the merchant, and announce it with `PaymentReceived`.
//! The contract keeps no state of its own.

use crate::abi::PaymentReceived;
use paylink_core::Address;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Revert {
    #[error("Incorrect value sent")]
    IncorrectValue,
    #[error("Transfer failed")]
    TransferFailed,
    #[error("ERC20: insufficient allowance")]
    InsufficientAllowance,
    #[error("ERC20: transfer amount exceeds balance")]
    InsufficientBalance,
    #[error("{0}")]
    Other(String),
}

/// Balance operations the contract performs against chain state.
pub trait Ledger {
    fn transfer_native(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), Revert>;

    /// ERC-20 `transferFrom` executed by `spender` on `token`.
    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), Revert>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverContract {
    address: Address,
}

impl ReceiverContract {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// `value` is the native amount attached to the call; the ledger has already
    /// credited it to the contract.
    pub fn pay<L: Ledger>(
        &self,
        ledger: &mut L,
        caller: &Address,
        value: u128,
        merchant: &Address,
        token: &Address,
        amount: u128,
    ) -> Result<PaymentReceived, Revert> {
        if token.is_zero() {
            if value != amount {
                return Err(Revert::IncorrectValue);
            }
            ledger
                .transfer_native(&self.address, merchant, amount)
                .map_err(|_| Revert::TransferFailed)?;
        } else {
            ledger.transfer_from(token, &self.address, caller, merchant, amount)?;
        }

        Ok(PaymentReceived {
            merchant: *merchant,
            payer: *caller,
            token: *token,
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct TestLedger {
        native: HashMap<Address, u128>,
        tokens: HashMap<(Address, Address), u128>,
        allowances: HashMap<(Address, Address, Address), u128>,
    }

    impl Ledger for TestLedger {
        fn transfer_native(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), Revert> {
            let bal = self.native.entry(*from).or_default();
            if *bal < amount {
                return Err(Revert::Other("insufficient funds".into()));
            }
            *bal -= amount;
            *self.native.entry(*to).or_default() += amount;
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
            let allowance = self.allowances.entry((*token, *from, *spender)).or_default();
            if *allowance < amount {
                return Err(Revert::InsufficientAllowance);
            }
            let bal = self.tokens.entry((*token, *from)).or_default();
            if *bal < amount {
                return Err(Revert::InsufficientBalance);
            }
            *bal -= amount;
            *allowance -= amount;
            *self.tokens.entry((*token, *to)).or_default() += amount;
            Ok(())
        }
    }

    fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    #[test]
    fn native_payment_forwards_exact_value() {
        let contract = ReceiverContract::new(addr(9));
        let mut ledger = TestLedger::default();
        ledger.native.insert(addr(9), 100);

        let event = contract
            .pay(&mut ledger, &addr(2), 100, &addr(1), &Address::ZERO, 100)
            .unwrap();
        assert_eq!(ledger.native[&addr(1)], 100);
        assert_eq!(ledger.native[&addr(9)], 0);
        assert_eq!(event.payer, addr(2));
        assert_eq!(event.token, Address::ZERO);
    }

    #[test]
    fn native_payment_with_wrong_value_reverts() {
        let contract = ReceiverContract::new(addr(9));
        let mut ledger = TestLedger::default();
        ledger.native.insert(addr(9), 50);
        let err = contract
            .pay(&mut ledger, &addr(2), 50, &addr(1), &Address::ZERO, 100)
            .unwrap_err();
        assert_eq!(err.to_string(), "Incorrect value sent");
    }

    #[test]
    fn token_payment_pulls_approved_amount() {
        let contract = ReceiverContract::new(addr(9));
        let token = addr(7);
        let mut ledger = TestLedger::default();
        ledger.tokens.insert((token, addr(2)), 500);
        ledger.allowances.insert((token, addr(2), addr(9)), 300);

        let event = contract
            .pay(&mut ledger, &addr(2), 0, &addr(1), &token, 300)
            .unwrap();
        assert_eq!(ledger.tokens[&(token, addr(1))], 300);
        assert_eq!(ledger.tokens[&(token, addr(2))], 200);
        assert_eq!(event.amount, 300);
    }

    #[test]
    fn token_payment_without_allowance_reverts() {
        let contract = ReceiverContract::new(addr(9));
        let token = addr(7);
        let mut ledger = TestLedger::default();
        ledger.tokens.insert((token, addr(2)), 500);
        let err = contract
            .pay(&mut ledger, &addr(2), 0, &addr(1), &token, 300)
            .unwrap_err();
        assert_eq!(err.to_string(), "ERC20: insufficient allowance");
    }
}
