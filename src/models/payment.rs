//! Payment notification models.
//!
//! NOWPayments posts an IPN (instant payment notification) whenever a
//! checkout changes state. Only the fields used for logging and settlement
//! detection are modeled; everything else is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// IPN body sent by the payment provider.
///
/// Identifiers and amounts arrive as numbers or strings depending on the
/// provider's "all strings" setting, so they are kept as raw JSON values.
#[derive(Debug, Clone, Deserialize)]
pub struct IpnNotification {
    #[serde(default, alias = "id")]
    pub payment_id: Option<Value>,

    #[serde(default, alias = "status")]
    pub payment_status: Option<String>,

    #[serde(default)]
    pub price_amount: Option<Value>,

    #[serde(default, alias = "currency")]
    pub price_currency: Option<String>,

    /// The checkout is created with the user id as the order id
    #[serde(default, alias = "orderId")]
    pub order_id: Option<String>,
}

impl IpnNotification {
    /// Whether the payment reached a final successful state.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("finished") | Some("confirmed")
        )
    }

    pub fn payment_id_display(&self) -> String {
        display_value(self.payment_id.as_ref(), "unknown_id")
    }

    pub fn amount_display(&self) -> String {
        display_value(self.price_amount.as_ref(), "0")
    }
}

fn display_value(value: Option<&Value>, fallback: &str) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => fallback.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Acknowledgement returned to the provider.
#[derive(Debug, Serialize)]
pub struct IpnAck {
    pub message: String,
    pub status: String,
}

impl IpnAck {
    pub fn received() -> Self {
        Self {
            message: "IPN received successfully".to_string(),
            status: "success".to_string(),
        }
    }
}
