//! Chart analysis request and trade plan types.
//!
//! This module defines:
//! - `AnalyzeChartsRequest`: Request body carrying the two chart screenshots
//! - `RawTradePlan`: The JSON object the model is asked to produce
//! - `TradePlan`: Response body returned to clients

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to analyze a pair of chart screenshots.
///
/// # JSON Example
///
/// ```json
/// {
///   "chart_15m": "data:image/jpeg;base64,/9j/4AAQ...",
///   "chart_1h": "/9j/4AAQ..."
/// }
/// ```
///
/// Either a bare base64 string or a data URL is accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeChartsRequest {
    /// 15 minute timeframe screenshot
    #[serde(alias = "15M")]
    pub chart_15m: String,

    /// 1 hour timeframe screenshot
    #[serde(alias = "1H")]
    pub chart_1h: String,
}

/// Direction of the proposed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionType {
    Long,
    Short,
}

/// Trade plan as produced by the model.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTradePlan {
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub position_type: PositionType,
    pub win_rate: f64,

    #[serde(default)]
    pub reasoning: String,

    #[serde(default)]
    pub confirmation_points: Vec<String>,

    #[serde(default)]
    pub entry_time: Option<String>,
}

/// Trade plan returned to the client.
///
/// # JSON Example
///
/// ```json
/// {
///   "tradeId": "550e8400-e29b-41d4-a716-446655440000",
///   "entryPrice": 50000.0,
///   "stopLoss": 48750.0,
///   "takeProfit": 52500.0,
///   "positionType": "LONG",
///   "winRate": 65.0,
///   "riskRewardRatio": 2.0,
///   "reasoning": "Price showing strong support with bullish momentum",
///   "confirmationPoints": ["Support level at 50000"]
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradePlan {
    pub trade_id: Uuid,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub position_type: PositionType,
    pub win_rate: f64,

    /// (take profit - entry) / (entry - stop loss), rounded to 2 decimals
    pub risk_reward_ratio: f64,

    pub reasoning: String,
    pub confirmation_points: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_time: Option<String>,
}

impl From<RawTradePlan> for TradePlan {
    fn from(raw: RawTradePlan) -> Self {
        let risk = raw.entry_price - raw.stop_loss;
        let reward = raw.take_profit - raw.entry_price;
        let ratio = if risk == 0.0 {
            0.0
        } else {
            (reward / risk * 100.0).round() / 100.0
        };

        Self {
            trade_id: Uuid::new_v4(),
            entry_price: raw.entry_price,
            stop_loss: raw.stop_loss,
            take_profit: raw.take_profit,
            position_type: raw.position_type,
            win_rate: raw.win_rate,
            risk_reward_ratio: ratio,
            reasoning: raw.reasoning,
            confirmation_points: raw.confirmation_points,
            entry_time: raw.entry_time,
        }
    }
}
