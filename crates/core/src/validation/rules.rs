use crate::models::PaymentDescriptor;
use crate::parsing::{parse_units, check_decimal};
use crate::tokens::{lookup_for_payment, lookup_symbol, TokenLookup, FALLBACK_DECIMALS};

pub fn field_checks(d: &PaymentDescriptor) -> Result<(), Vec<String>> {
    let mut errs = Vec::new();

    if d.id.trim().is_empty() {
        errs.push("id: payment id is mandatory".to_string());
    }

    if let Err(e) = check_decimal(&d.amount) {
        errs.push(format!("amount: {e}"));
    }

    if d.merchant_address.is_zero() {
        errs.push("merchantAddress: recipient must not be the zero address".to_string());
    }

    if d.token_symbol.trim().is_empty() {
        errs.push("tokenSymbol: token symbol is mandatory".to_string());
    }

    if errs.is_empty() {
        Ok(())
    } else {
        Err(errs)
    }
}

pub fn token_consistency(d: &PaymentDescriptor) -> Result<(), Vec<String>> {
    let mut errs = Vec::new();

    match lookup_symbol(&d.token_symbol) {
        TokenLookup::Found(rec) if rec.address != d.token => {
            errs.push(format!(
                "token: {} is {} but descriptor names {}",
                rec.symbol, rec.address, d.token
            ));
        }
        TokenLookup::Found(rec) => {
            if let Err(e) = parse_units(&d.amount, rec.decimals) {
                errs.push(format!("amount: {e}"));
            }
        }
        TokenLookup::Unknown => {
            if d.token.is_zero() {
                errs.push(format!(
                    "token: {} is not a native currency of a supported chain",
                    d.token_symbol
                ));
            } else {
                // same resolution the payment uses, so load and pay agree on precision
                let decimals = match lookup_for_payment(&d.token_symbol, &d.token) {
                    TokenLookup::Found(rec) => rec.decimals,
                    TokenLookup::Unknown => FALLBACK_DECIMALS,
                };
                if let Err(e) = parse_units(&d.amount, decimals) {
                    errs.push(format!("amount: {e}"));
                }
            }
        }
    }

    if errs.is_empty() {
        Ok(())
    } else {
        Err(errs)
    }
}
