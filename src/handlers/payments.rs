//! Payment provider callbacks.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};

use crate::{
    error::AppError,
    models::payment::IpnAck,
    services::payment_service::{self, SIGNATURE_HEADER},
    state::SharedState,
};

/// Receive a NOWPayments instant payment notification.
///
/// The raw body is needed to check the signature, so it is taken as bytes
/// and decoded only after verification.
///
/// # Errors
///
/// - `401 Unauthorized`: signature missing, invalid, or no IPN secret configured
/// - `400 Bad Request`: body is not a JSON object
pub async fn receive_ipn(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IpnAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let ipn = payment_service::verify_ipn(state.ipn_secret.as_deref(), &body, signature)
        .inspect_err(|err| tracing::warn!(error = %err, "Rejected IPN"))?;

    tracing::info!(
        payment_id = %ipn.payment_id_display(),
        status = ipn.payment_status.as_deref().unwrap_or("unknown"),
        amount = %ipn.amount_display(),
        currency = ipn.price_currency.as_deref().unwrap_or(""),
        order_id = ipn.order_id.as_deref().unwrap_or(""),
        settled = ipn.is_settled(),
        "IPN received"
    );

    Ok(Json(IpnAck::received()))
}
