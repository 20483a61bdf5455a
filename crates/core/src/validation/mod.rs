mod rules;

use crate::models::PaymentDescriptor;

/// Run every descriptor rule, collecting all failures.
pub fn validate(descriptor: &PaymentDescriptor) -> Result<(), Vec<String>> {
    let mut errs = Vec::new();
    if let Err(mut re) = rules::field_checks(descriptor) {
        errs.append(&mut re);
    }
    if let Err(mut re) = rules::token_consistency(descriptor) {
        errs.append(&mut re);
    }
    if errs.is_empty() {
        Ok(())
    } else {
        Err(errs)
    }
}
