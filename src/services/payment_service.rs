//! NOWPayments IPN verification.
//!
//! The provider signs the notification body as HMAC-SHA512 over the JSON
//! object re-serialized with its keys sorted, and sends the hex digest in the
//! `x-nowpayments-sig` header. `serde_json` maps are ordered by key, so
//! parsing into a `Value` and serializing again produces the signed form.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha512;

use crate::{error::AppError, models::payment::IpnNotification};

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_HEADER: &str = "x-nowpayments-sig";

/// Verify an IPN body and decode it.
///
/// # Errors
///
/// - `AppError::InvalidSignature` if no secret is configured, the signature
///   is missing or not hex, or the digest does not match
/// - `AppError::InvalidRequest` if the body is not a JSON object
pub fn verify_ipn(
    secret: Option<&str>,
    body: &[u8],
    signature: Option<&str>,
) -> Result<IpnNotification, AppError> {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        tracing::error!("IPN received but no IPN secret is configured");
        return Err(AppError::InvalidSignature);
    };
    let signature = signature.ok_or(AppError::InvalidSignature)?;

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidRequest(format!("Invalid IPN body: {e}")))?;
    if !value.is_object() {
        return Err(AppError::InvalidRequest(
            "IPN body must be a JSON object".to_string(),
        ));
    }

    let canonical = serde_json::to_string(&value)
        .map_err(|e| AppError::InvalidRequest(e.to_string()))?;
    verify_signature(secret, canonical.as_bytes(), signature)?;

    serde_json::from_value(value)
        .map_err(|e| AppError::InvalidRequest(format!("Invalid IPN body: {e}")))
}

/// Constant-time check of a hex HMAC-SHA512 digest.
fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> Result<(), AppError> {
    let expected = hex::decode(signature.trim()).map_err(|_| AppError::InvalidSignature)?;

    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::InvalidSignature)?;
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| AppError::InvalidSignature)
}
