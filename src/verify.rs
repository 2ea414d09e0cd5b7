//! Chain-agnostic constraint verification.
//!
//! Applies the business checks shared by every chain family over the
//! normalized [`TransferIntent`] an adapter extracted, in a fixed order
//! with fail-fast, single-cause reporting: scheme/network, asset,
//! recipient, amount, validity window. Signature verification is the
//! adapter's job and runs only after these pass.

use crate::chain::TransferIntent;
use crate::types::{InvalidReason, PaymentPayload, PaymentRequirements, Scheme};
use crate::utils::{addresses_equal, current_timestamp, string_to_u256};

/// Runs the ordered constraint checks. The first failing check wins;
/// later checks are not evaluated.
pub fn check_constraints(
    payload: &PaymentPayload,
    requirements: &PaymentRequirements,
    intent: &TransferIntent,
) -> Result<(), InvalidReason> {
    check_constraints_at(payload, requirements, intent, current_timestamp())
}

/// Same as [`check_constraints`] with an explicit clock, so expiry
/// behavior is testable without waiting.
pub fn check_constraints_at(
    payload: &PaymentPayload,
    requirements: &PaymentRequirements,
    intent: &TransferIntent,
    now: u64,
) -> Result<(), InvalidReason> {
    if payload.scheme != requirements.scheme || payload.network != requirements.network {
        return Err(InvalidReason::SchemeOrNetworkMismatch);
    }

    // Account-based payloads bind the asset through the signature's
    // domain separator instead of naming it; only explicit assets are
    // compared here.
    if let Some(asset) = &intent.asset {
        if !addresses_equal(asset, &requirements.asset) {
            return Err(InvalidReason::AssetMismatch);
        }
    }

    if !addresses_equal(&intent.pay_to, &requirements.pay_to) {
        return Err(InvalidReason::RecipientMismatch);
    }

    let max_amount = string_to_u256(&requirements.max_amount_required)
        .map_err(|_| InvalidReason::MalformedPayload)?;
    if intent.amount > max_amount {
        return Err(InvalidReason::AmountExceedsMaximum);
    }
    if requirements.scheme == Scheme::Exact && intent.amount < max_amount {
        return Err(InvalidReason::AmountInsufficient);
    }

    // The window must hold strictly: validAfter < now < validBefore.
    if let Some(valid_after) = intent.valid_after {
        if now <= valid_after {
            return Err(InvalidReason::AuthorizationNotYetValid);
        }
    }
    if let Some(valid_before) = intent.valid_before {
        if now >= valid_before {
            return Err(InvalidReason::AuthorizationExpired);
        }
    }

    Ok(())
}
